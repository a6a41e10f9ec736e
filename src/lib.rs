//! Xinos kernel library.
//!
//! Everything except the boot entry and the panic handler lives here, so the
//! integration tests can drive the allocators, the scheduler and the trap
//! dispatcher on the development host through the hosted arch backend.

#![no_std]

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
extern crate std;

pub mod arch;
pub mod config;
pub mod console;
pub mod logging;
pub mod memory;
pub mod panic;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod trap;
