//! Kernel panic report.
//!
//! The `#[panic_handler]` lives in the binary; it hands the [`PanicInfo`] to
//! [`report`], which prints straight to the UART and stops the hart.

use core::fmt::Write;
use core::panic::PanicInfo;

use crate::arch::cpu;
use crate::console::Console;

pub fn report(info: &PanicInfo<'_>) -> ! {
    cpu::disable_interrupts();

    let mut console = Console;
    let _ = writeln!(console, "\n!!! KERNEL PANIC !!!");
    if let Some(location) = info.location() {
        let _ = writeln!(console, "Location: {}:{}", location.file(), location.line());
    }
    let _ = writeln!(console, "Message: {}", info.message());

    cpu::halt()
}
