//! NS16550A UART at 0x1000_0000.
//!
//! Polled transmit, interrupt-driven receive. QEMU ignores the divisor but it
//! is programmed anyway so the same code works on real 16550 parts.

use super::Mmio;

const UART0_BASE: usize = 0x1000_0000;

const RHR: usize = 0; // receive holding (read)
const THR: usize = 0; // transmit holding (write)
const DLL: usize = 0; // divisor latch low (DLAB=1)
const IER: usize = 1; // interrupt enable
const DLM: usize = 1; // divisor latch high (DLAB=1)
const FCR: usize = 2; // FIFO control
const LCR: usize = 3; // line control
const LSR: usize = 5; // line status

const IER_RX_ENABLE: u8 = 1 << 0;
const LCR_EIGHT_BITS: u8 = 0x03;
const LCR_DLAB: u8 = 1 << 7;
const FCR_FIFO_ENABLE_CLEAR: u8 = 0x07;
const LSR_RX_READY: u8 = 1 << 0;
const LSR_TX_IDLE: u8 = 1 << 5;

const fn reg(offset: usize) -> Mmio {
    Mmio::new(UART0_BASE + offset)
}

/// 38.4k baud, 8N1, FIFOs on, receive interrupt enabled.
pub fn init() {
    reg(IER).write_u8(0x00);
    reg(LCR).write_u8(LCR_DLAB);
    reg(DLL).write_u8(0x03);
    reg(DLM).write_u8(0x00);
    reg(LCR).write_u8(LCR_EIGHT_BITS);
    reg(FCR).write_u8(FCR_FIFO_ENABLE_CLEAR);
    reg(IER).write_u8(IER_RX_ENABLE);
}

/// Blocks until the transmitter can take another byte.
pub fn put_byte(byte: u8) {
    while reg(LSR).read_u8() & LSR_TX_IDLE == 0 {
        core::hint::spin_loop();
    }
    reg(THR).write_u8(byte);
}

pub fn get_byte() -> Option<u8> {
    if reg(LSR).read_u8() & LSR_RX_READY != 0 {
        Some(reg(RHR).read_u8())
    } else {
        None
    }
}
