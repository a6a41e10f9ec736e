//! Singly linked task lists threaded through the task arena.

use super::task::{QueueTag, TaskId, TaskTable};

/// Head of a task list. Links live in [`Task::next`](super::task::Task);
/// every member carries this list's tag.
pub(crate) struct TaskQueue {
    head: Option<TaskId>,
    len: usize,
    tag: QueueTag,
}

impl TaskQueue {
    pub(crate) const fn new(tag: QueueTag) -> Self {
        Self {
            head: None,
            len: 0,
            tag,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert after every member whose priority is not greater than the new
    /// task's, so equal priorities stay first-in first-out.
    pub(crate) fn insert_by_priority(&mut self, tasks: &mut TaskTable, id: TaskId) {
        let priority = tasks[id].priority;
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            if tasks[node].priority > priority {
                break;
            }
            prev = Some(node);
            cursor = tasks[node].next;
        }
        self.link_after(tasks, prev, id);
    }

    pub(crate) fn push_back(&mut self, tasks: &mut TaskTable, id: TaskId) {
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(node) = cursor {
            prev = Some(node);
            cursor = tasks[node].next;
        }
        self.link_after(tasks, prev, id);
    }

    pub(crate) fn pop_front(&mut self, tasks: &mut TaskTable) -> Option<TaskId> {
        let id = self.head?;
        self.head = tasks[id].next;
        self.unlinked(tasks, id);
        Some(id)
    }

    /// Unlink `id` wherever it sits. `false` if it is not a member.
    pub(crate) fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) -> bool {
        if tasks.get(id).map(|task| task.queue) != Some(self.tag) {
            return false;
        }

        if self.head == Some(id) {
            return self.pop_front(tasks).is_some();
        }

        let mut cursor = self.head;
        while let Some(node) = cursor {
            let next = tasks[node].next;
            if next == Some(id) {
                tasks[node].next = tasks[id].next;
                self.unlinked(tasks, id);
                return true;
            }
            cursor = next;
        }
        false
    }

    pub(crate) fn iter<'a>(&self, tasks: &'a TaskTable) -> impl Iterator<Item = TaskId> + 'a {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = tasks.get(id).and_then(|task| task.next);
            Some(id)
        })
    }

    fn link_after(&mut self, tasks: &mut TaskTable, prev: Option<TaskId>, id: TaskId) {
        debug_assert_eq!(tasks[id].queue, QueueTag::None, "task {} already queued", id);
        match prev {
            None => {
                tasks[id].next = self.head;
                self.head = Some(id);
            }
            Some(prev) => {
                tasks[id].next = tasks[prev].next;
                tasks[prev].next = Some(id);
            }
        }
        tasks[id].queue = self.tag;
        self.len += 1;
    }

    fn unlinked(&mut self, tasks: &mut TaskTable, id: TaskId) {
        tasks[id].next = None;
        tasks[id].queue = QueueTag::None;
        self.len -= 1;
    }
}
