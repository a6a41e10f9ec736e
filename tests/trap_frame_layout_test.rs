//! TrapFrame layout checks. The trap entry assembly hard-codes these
//! offsets.

use core::mem::{offset_of, size_of};

use xinos_kernel::trap::frame::{
    MSTATUS_MPIE, MSTATUS_MPP_MACHINE, REGISTER_NAMES, REG_A0, REG_A7, REG_GP, REG_RA, REG_SP,
};
use xinos_kernel::trap::{TrapFrame, TRAP_FRAME_SIZE};

#[test]
fn frame_is_36_doublewords() {
    assert_eq!(size_of::<TrapFrame>(), 288);
    assert_eq!(TRAP_FRAME_SIZE, 288);
    assert_eq!(TRAP_FRAME_SIZE % 16, 0, "sp must stay 16-byte aligned");
}

#[test]
fn register_slots_precede_csrs() {
    assert_eq!(offset_of!(TrapFrame, regs), 0);
    assert_eq!(offset_of!(TrapFrame, mepc), 32 * 8);
    assert_eq!(offset_of!(TrapFrame, mstatus), 33 * 8);
    assert_eq!(offset_of!(TrapFrame, mcause), 34 * 8);
    assert_eq!(offset_of!(TrapFrame, mtval), 35 * 8);
}

#[test]
fn register_names_follow_abi_numbering() {
    assert_eq!(REGISTER_NAMES[REG_RA], "ra");
    assert_eq!(REGISTER_NAMES[REG_SP], "sp");
    assert_eq!(REGISTER_NAMES[REG_GP], "gp");
    assert_eq!(REGISTER_NAMES[REG_A0], "a0");
    assert_eq!(REGISTER_NAMES[REG_A7], "a7");
}

#[test]
fn new_task_frame_enters_entry_with_argument() {
    let frame = TrapFrame::for_new_task(0x8000_1000, 42, 0x8010_0000, 0x8000_2000, 0x8000_0800);

    assert_eq!(frame.mepc, 0x8000_1000);
    assert_eq!(frame.regs[REG_A0], 42);
    assert_eq!(frame.regs[REG_SP], 0x8010_0000);
    assert_eq!(frame.regs[REG_RA], 0x8000_2000);
    assert_eq!(frame.regs[REG_GP], 0x8000_0800);
    assert_eq!(frame.mstatus, MSTATUS_MPP_MACHINE | MSTATUS_MPIE);
    assert_eq!(frame.regs[0], 0);
}

#[test]
fn syscall_accessors_use_a7_and_a0_to_a5() {
    let mut frame = TrapFrame::zeroed();
    frame.regs[REG_A7] = 4;
    for (i, reg) in (REG_A0..REG_A0 + 6).enumerate() {
        frame.regs[reg] = 100 + i as u64;
    }

    assert_eq!(frame.syscall_number(), 4);
    assert_eq!(frame.syscall_args(), [100, 101, 102, 103, 104, 105]);

    frame.set_return_value(-22);
    assert_eq!(frame.return_value(), -22);
    assert_eq!(frame.regs[REG_A0], (-22i64) as u64);
}

#[test]
fn debug_dump_names_every_register() {
    let mut frame = TrapFrame::zeroed();
    frame.mepc = 0xdead_beef;
    let dump = format!("{:?}", frame);

    assert!(dump.contains("mepc=0x00000000deadbeef"));
    for name in REGISTER_NAMES {
        assert!(dump.contains(&format!("{}=", name)), "missing {}", name);
    }
}
