//! Boot-time kernel tunables.

use log::LevelFilter;

use crate::sync::SpinLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// CLINT cycles between two timer interrupts (10 MHz timebase on `virt`).
    pub tick_interval: u64,

    pub ticks_per_second: u64,

    /// Priority for tasks created without an explicit one.
    pub default_priority: u16,

    /// Timeslice in ticks for tasks created without an explicit one.
    pub default_timeslice: u64,

    pub log_level: LevelFilter,

    /// Log every page and block allocation at trace level.
    pub trace_allocations: bool,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            tick_interval: 10_000,
            ticks_per_second: 1000,
            default_priority: 128,
            default_timeslice: 10,
            log_level: if cfg!(feature = "verbose") {
                LevelFilter::Trace
            } else {
                LevelFilter::Info
            },
            trace_allocations: false,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

static CONFIG: SpinLock<KernelConfig> = SpinLock::new(KernelConfig::new());

pub fn get() -> KernelConfig {
    *CONFIG.lock()
}

pub fn set(config: KernelConfig) {
    *CONFIG.lock() = config;
}
