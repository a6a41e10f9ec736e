//! Machine-mode trap dispatch.
//!
//! `trap_vector` (see `arch::riscv64::entry`) pushes a [`TrapFrame`] on the
//! interrupted stack and calls [`dispatch`]. The frame pointer returned from
//! here is the one the exit path restores, so returning a different task's
//! frame is the context switch.
//!
//! | `mcause`           | action                                      |
//! |--------------------|---------------------------------------------|
//! | interrupt 3        | software interrupt: reschedule              |
//! | interrupt 7        | timer: re-arm, tick service                 |
//! | interrupt 11       | external: PLIC claim, handler, complete     |
//! | exception 8 / 11   | `ecall`: system call, skip the instruction  |
//! | any other exception| fatal, register dump                        |

pub mod frame;
pub mod irq;

pub use frame::{TrapFrame, TRAP_FRAME_SIZE};
pub use irq::{register_irq_handler, IrqHandler, MAX_IRQ_SOURCES};

use crate::arch::{clint, cpu, plic};
use crate::config;
use crate::scheduler;
use crate::syscall;

const MCAUSE_INTERRUPT: u64 = 1 << 63;

const IRQ_MACHINE_SOFTWARE: u64 = 3;
const IRQ_MACHINE_TIMER: u64 = 7;
const IRQ_MACHINE_EXTERNAL: u64 = 11;

const EXC_ECALL_USER: u64 = 8;
const EXC_ECALL_MACHINE: u64 = 11;

/// Decoded `mcause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    Interrupt(u64),
    Exception(u64),
}

impl TrapCause {
    pub fn from_mcause(mcause: u64) -> Self {
        let code = mcause & !MCAUSE_INTERRUPT;
        if mcause & MCAUSE_INTERRUPT != 0 {
            Self::Interrupt(code)
        } else {
            Self::Exception(code)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt(1) => "supervisor software interrupt",
            Self::Interrupt(IRQ_MACHINE_SOFTWARE) => "machine software interrupt",
            Self::Interrupt(5) => "supervisor timer interrupt",
            Self::Interrupt(IRQ_MACHINE_TIMER) => "machine timer interrupt",
            Self::Interrupt(9) => "supervisor external interrupt",
            Self::Interrupt(IRQ_MACHINE_EXTERNAL) => "machine external interrupt",
            Self::Interrupt(_) => "unknown interrupt",
            Self::Exception(0) => "instruction address misaligned",
            Self::Exception(1) => "instruction access fault",
            Self::Exception(2) => "illegal instruction",
            Self::Exception(3) => "breakpoint",
            Self::Exception(4) => "load address misaligned",
            Self::Exception(5) => "load access fault",
            Self::Exception(6) => "store/AMO address misaligned",
            Self::Exception(7) => "store/AMO access fault",
            Self::Exception(EXC_ECALL_USER) => "environment call from U-mode",
            Self::Exception(9) => "environment call from S-mode",
            Self::Exception(EXC_ECALL_MACHINE) => "environment call from M-mode",
            Self::Exception(12) => "instruction page fault",
            Self::Exception(13) => "load page fault",
            Self::Exception(15) => "store/AMO page fault",
            Self::Exception(_) => "unknown exception",
        }
    }
}

/// Install the trap vector and unmask the software, timer and external
/// interrupt classes. The global enable is left to the caller.
pub fn init() {
    cpu::install_trap_vector();
    cpu::enable_interrupt_sources();
}

/// Handle one trap and return the frame to resume.
pub fn dispatch(frame: &mut TrapFrame) -> *mut TrapFrame {
    match TrapCause::from_mcause(frame.mcause) {
        TrapCause::Interrupt(code) => dispatch_interrupt(code, frame),
        TrapCause::Exception(EXC_ECALL_USER | EXC_ECALL_MACHINE) => {
            frame.mepc += 4;
            syscall::handle(frame);
            frame
        }
        cause @ TrapCause::Exception(_) => fatal_exception(cause, frame),
    }
}

fn dispatch_interrupt(code: u64, frame: &mut TrapFrame) -> *mut TrapFrame {
    match code {
        IRQ_MACHINE_SOFTWARE => {
            clint::clear_software_interrupt();
            scheduler::on_software_interrupt(frame)
        }
        IRQ_MACHINE_TIMER => {
            clint::program_next_tick(config::get().tick_interval);
            scheduler::on_timer_tick(frame)
        }
        IRQ_MACHINE_EXTERNAL => {
            dispatch_external();
            frame
        }
        _ => {
            log::warn!(target: "trap", "ignoring interrupt code {}", code);
            frame
        }
    }
}

fn dispatch_external() {
    let source = plic::claim();
    if source == 0 {
        return;
    }
    if source as usize >= MAX_IRQ_SOURCES {
        panic!("external interrupt: source {} out of range", source);
    }

    match irq::handler_for(source) {
        Some(handler) => handler(source),
        None => log::warn!(target: "irq", "no handler for source {}", source),
    }
    plic::complete(source);
}

fn fatal_exception(cause: TrapCause, frame: &TrapFrame) -> ! {
    log::error!(
        target: "trap",
        "unhandled exception: {} (mcause={:#x} mepc={:#x} mtval={:#x})\n{:?}",
        cause.name(),
        frame.mcause,
        frame.mepc,
        frame.mtval,
        frame
    );
    panic!(
        "unhandled exception: {} at mepc={:#x} mtval={:#x}",
        cause.name(),
        frame.mepc,
        frame.mtval
    );
}
