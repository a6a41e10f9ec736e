//! System call table and dispatcher entry point.
//!
//! The trap dispatcher hands `ecall` frames to [`handle`]. Numbers and error
//! codes live in `types`, kernel handlers in `dispatch`, and the task-side
//! `ecall` wrappers in `abi`/`user` (RISC-V only).

mod dispatch;
pub mod types;

#[cfg(target_arch = "riscv64")]
pub mod abi;

#[cfg(target_arch = "riscv64")]
pub mod user;

pub use dispatch::{dispatch, handle, SyscallFn};

pub use types::{
    decode_result, SysError, SyscallId, ERR_AGAIN, ERR_INVALID_ARG, ERR_NO_MEMORY,
    ERR_UNSUPPORTED, SYSCALL_OK, SYSCALL_TABLE_SIZE,
};
