//! Register snapshot pushed by the trap entry.

use core::fmt;

use static_assertions::const_assert_eq;

pub const REG_RA: usize = 1;
pub const REG_SP: usize = 2;
pub const REG_GP: usize = 3;
pub const REG_A0: usize = 10;
pub const REG_A7: usize = 17;

/// Previous privilege = machine; `mret` stays in M-mode.
pub const MSTATUS_MPP_MACHINE: u64 = 0b11 << 11;
/// Interrupts come back on after `mret`.
pub const MSTATUS_MPIE: u64 = 1 << 7;

pub const REGISTER_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// Saved hart state for one trap.
///
/// `regs[n]` holds `xn`; slot 0 is never written. `regs[2]` records the stack
/// pointer at the moment of the trap, but the exit path recomputes `sp` from
/// the frame address rather than loading it.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: [u64; 32],
    pub mepc: u64,
    pub mstatus: u64,
    pub mcause: u64,
    pub mtval: u64,
}

pub const TRAP_FRAME_SIZE: usize = 36 * 8;

const_assert_eq!(core::mem::size_of::<TrapFrame>(), TRAP_FRAME_SIZE);
const_assert_eq!(TRAP_FRAME_SIZE % 16, 0);

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; 32],
            mepc: 0,
            mstatus: 0,
            mcause: 0,
            mtval: 0,
        }
    }

    /// Synthetic frame for a task that has never run.
    ///
    /// Resuming it enters `entry(arg)` on a stack whose top is `stack_top`,
    /// with interrupts enabled and `ra` pointing at `return_address`.
    pub fn for_new_task(
        entry: usize,
        arg: usize,
        stack_top: usize,
        return_address: usize,
        global_pointer: u64,
    ) -> Self {
        let mut frame = Self::zeroed();
        frame.mepc = entry as u64;
        frame.mstatus = MSTATUS_MPP_MACHINE | MSTATUS_MPIE;
        frame.regs[REG_RA] = return_address as u64;
        frame.regs[REG_SP] = stack_top as u64;
        frame.regs[REG_GP] = global_pointer;
        frame.regs[REG_A0] = arg as u64;
        frame
    }

    /// System call number (`a7`).
    pub fn syscall_number(&self) -> u64 {
        self.regs[REG_A7]
    }

    /// System call arguments (`a0..a5`).
    pub fn syscall_args(&self) -> [u64; 6] {
        let mut args = [0; 6];
        args.copy_from_slice(&self.regs[REG_A0..REG_A0 + 6]);
        args
    }

    pub fn set_return_value(&mut self, value: i64) {
        self.regs[REG_A0] = value as u64;
    }

    pub fn return_value(&self) -> i64 {
        self.regs[REG_A0] as i64
    }
}

impl fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "mepc={:#018x} mstatus={:#018x} mcause={:#018x} mtval={:#018x}",
            self.mepc, self.mstatus, self.mcause, self.mtval
        )?;
        for (row, names) in REGISTER_NAMES.chunks(4).enumerate() {
            for (col, name) in names.iter().enumerate() {
                let reg = row * 4 + col;
                write!(f, "{:>4}={:#018x} ", name, self.regs[reg])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
