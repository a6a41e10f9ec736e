//! External interrupt handler registry, indexed by PLIC source id.

use crate::sync::SpinLock;

pub const MAX_IRQ_SOURCES: usize = 64;

pub type IrqHandler = fn(source: u32);

static HANDLERS: SpinLock<[Option<IrqHandler>; MAX_IRQ_SOURCES]> =
    SpinLock::new([None; MAX_IRQ_SOURCES]);

/// Register a callback for a PLIC source. Replaces any earlier handler.
///
/// # Panics
/// If `source` is out of range.
pub fn register_irq_handler(source: u32, handler: IrqHandler) {
    let slot = source as usize;
    if slot >= MAX_IRQ_SOURCES {
        panic!("register_irq_handler: source {} out of range", source);
    }
    HANDLERS.lock()[slot] = Some(handler);
    log::debug!(target: "irq", "handler registered for source {}", source);
}

pub fn unregister_irq_handler(source: u32) {
    if let Some(slot) = HANDLERS.lock().get_mut(source as usize) {
        *slot = None;
    }
}

pub fn clear_irq_handlers() {
    *HANDLERS.lock() = [None; MAX_IRQ_SOURCES];
}

/// Handler for `source`. The registry lock is released before the caller
/// runs it.
pub(crate) fn handler_for(source: u32) -> Option<IrqHandler> {
    HANDLERS.lock().get(source as usize).copied().flatten()
}
