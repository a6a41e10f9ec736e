//! Synchronization primitives.

pub mod critical;
pub mod lock;
pub mod spinlock;
pub mod waitqueue;

pub use critical::CriticalSection;
pub use lock::{Lock, LockGuard};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use waitqueue::WaitQueue;
