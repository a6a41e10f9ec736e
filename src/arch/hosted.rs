//! Simulated hart for host builds.
//!
//! Every piece of hart state is thread-local, so each test thread owns an
//! independent "machine": its own interrupt-enable flag, pending software
//! interrupt, PLIC pending queue and UART buffers. Tests drive traps by hand
//! (build a [`TrapFrame`](crate::trap::TrapFrame) and call
//! [`trap::dispatch`](crate::trap::dispatch)) and inspect side effects through
//! the hook functions in each module.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

#[derive(Default)]
struct HostedHart {
    interrupts_enabled: bool,
    interrupt_sources_enabled: bool,
    trap_vector_installed: bool,
    software_pending: bool,
    software_raised: u64,
    time: u64,
    deadline: Option<u64>,
    deadlines_programmed: u64,
    plic_pending: VecDeque<u32>,
    plic_completed: Vec<u32>,
    plic_enabled: Vec<u32>,
    plic_threshold: u32,
    uart_tx: Vec<u8>,
    uart_rx: VecDeque<u8>,
}

std::thread_local! {
    static HART: RefCell<HostedHart> = RefCell::new(HostedHart::default());
}

fn with_hart<R>(f: impl FnOnce(&mut HostedHart) -> R) -> R {
    HART.with(|hart| f(&mut hart.borrow_mut()))
}

/// Reset this thread's hart to power-on state.
pub fn reset() {
    with_hart(|hart| *hart = HostedHart::default());
}

pub mod cpu {
    use super::with_hart;

    pub fn interrupts_enabled() -> bool {
        with_hart(|hart| hart.interrupts_enabled)
    }

    pub fn enable_interrupts() {
        with_hart(|hart| hart.interrupts_enabled = true);
    }

    pub fn disable_interrupts() {
        with_hart(|hart| hart.interrupts_enabled = false);
    }

    pub fn install_trap_vector() {
        with_hart(|hart| hart.trap_vector_installed = true);
    }

    pub fn enable_interrupt_sources() {
        with_hart(|hart| hart.interrupt_sources_enabled = true);
    }

    pub fn trap_vector_installed() -> bool {
        with_hart(|hart| hart.trap_vector_installed)
    }

    pub fn interrupt_sources_enabled() -> bool {
        with_hart(|hart| hart.interrupt_sources_enabled)
    }

    pub fn hart_id() -> usize {
        0
    }

    pub fn global_pointer() -> u64 {
        0
    }

    pub fn wait_for_interrupt() {
        std::thread::yield_now();
    }

    pub fn halt() -> ! {
        disable_interrupts();
        panic!("hart halted");
    }
}

pub mod clint {
    use super::with_hart;

    pub fn read_time() -> u64 {
        with_hart(|hart| hart.time)
    }

    pub fn program_next_tick(interval: u64) {
        with_hart(|hart| {
            hart.deadline = Some(hart.time.wrapping_add(interval));
            hart.deadlines_programmed += 1;
        });
    }

    pub fn raise_software_interrupt() {
        with_hart(|hart| {
            hart.software_pending = true;
            hart.software_raised += 1;
        });
    }

    pub fn clear_software_interrupt() {
        with_hart(|hart| hart.software_pending = false);
    }

    pub fn software_interrupt_pending() -> bool {
        with_hart(|hart| hart.software_pending)
    }

    /// Number of self-interrupts raised since the last reset.
    pub fn software_interrupts_raised() -> u64 {
        with_hart(|hart| hart.software_raised)
    }

    pub fn advance_time(cycles: u64) {
        with_hart(|hart| hart.time = hart.time.wrapping_add(cycles));
    }

    pub fn deadline() -> Option<u64> {
        with_hart(|hart| hart.deadline)
    }

    pub fn deadlines_programmed() -> u64 {
        with_hart(|hart| hart.deadlines_programmed)
    }
}

pub mod plic {
    use std::vec::Vec;

    use super::with_hart;

    pub fn set_priority(_source: u32, _level: u32) {}

    pub fn enable_source(source: u32) {
        with_hart(|hart| {
            if !hart.plic_enabled.contains(&source) {
                hart.plic_enabled.push(source);
            }
        });
    }

    pub fn set_threshold(threshold: u32) {
        with_hart(|hart| hart.plic_threshold = threshold);
    }

    pub fn claim() -> u32 {
        with_hart(|hart| hart.plic_pending.pop_front().unwrap_or(0))
    }

    pub fn complete(source: u32) {
        with_hart(|hart| hart.plic_completed.push(source));
    }

    /// Queue `source` as pending; the next `claim` returns it.
    pub fn raise(source: u32) {
        with_hart(|hart| hart.plic_pending.push_back(source));
    }

    pub fn completed() -> Vec<u32> {
        with_hart(|hart| hart.plic_completed.clone())
    }

    pub fn source_enabled(source: u32) -> bool {
        with_hart(|hart| hart.plic_enabled.contains(&source))
    }
}

pub mod uart {
    use std::vec::Vec;

    use super::with_hart;

    pub fn init() {}

    pub fn put_byte(byte: u8) {
        with_hart(|hart| hart.uart_tx.push(byte));
    }

    pub fn get_byte() -> Option<u8> {
        with_hart(|hart| hart.uart_rx.pop_front())
    }

    /// Bytes the receiver will hand out on subsequent `get_byte` calls.
    pub fn feed_input(bytes: &[u8]) {
        with_hart(|hart| hart.uart_rx.extend(bytes.iter().copied()));
    }

    /// Drain everything transmitted so far.
    pub fn take_output() -> Vec<u8> {
        with_hart(|hart| core::mem::take(&mut hart.uart_tx))
    }
}
