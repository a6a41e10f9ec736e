//! Architecture seam.
//!
//! On the QEMU `virt` RISC-V board the kernel drives the real CLINT, PLIC and
//! NS16550 UART from machine mode. Every other target gets [`hosted`], a
//! simulated hart with the same function surface, so the allocators, the
//! scheduler and the trap dispatcher run unchanged inside host test binaries.
//!
//! Each backend exports four modules:
//!
//! - `cpu`   - interrupt enable flag, trap vector, wfi/halt
//! - `clint` - tick source, next deadline, machine software interrupt
//! - `plic`  - external interrupt claim/complete and source enables
//! - `uart`  - byte output and receive

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod riscv64;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub use riscv64::{clint, cpu, plic, uart};

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub mod hosted;
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
pub use hosted::{clint, cpu, plic, uart};

/// PLIC source id of UART0 on the `virt` board.
pub const UART0_IRQ: u32 = 10;
