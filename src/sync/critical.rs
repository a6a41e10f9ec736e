//! Scoped interrupt masking.

use core::marker::PhantomData;

use crate::arch::cpu;

/// Masks interrupts on the current hart for as long as it lives.
///
/// Dropping it restores the interrupt-enable flag to whatever it was on
/// entry, so sections nest: only the outermost one turns interrupts back on.
#[must_use = "interrupts are unmasked again as soon as the section is dropped"]
pub struct CriticalSection {
    interrupts_were_enabled: bool,
    // tied to the hart that masked interrupts
    _not_send: PhantomData<*mut ()>,
}

impl CriticalSection {
    pub fn enter() -> Self {
        let interrupts_were_enabled = cpu::interrupts_enabled();
        cpu::disable_interrupts();
        Self {
            interrupts_were_enabled,
            _not_send: PhantomData,
        }
    }

    pub fn interrupts_were_enabled(&self) -> bool {
        self.interrupts_were_enabled
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if self.interrupts_were_enabled {
            cpu::enable_interrupts();
        }
    }
}

/// Run `f` with interrupts masked.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    let _section = CriticalSection::enter();
    f()
}
