//! Local interrupt masking
//!
//! Save/disable and restore of the local CPU's interrupt delivery state.
//! On bare-metal aarch64 this is the DAIF register. On hosted targets
//! there is no interrupt delivery to mask; masking degrades to a no-op
//! and [`IrqSpinMutex`](crate::IrqSpinMutex) behaves as a plain spinlock,
//! which is what the test environment needs.

/// Opaque saved interrupt state, as returned by [`disable_local`].
pub type IrqState = u64;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod imp {
    use aarch64_cpu::registers::*;
    use core::arch::asm;

    use super::IrqState;

    /// Disable all interrupts and return previous state
    #[must_use]
    #[inline]
    pub fn disable_local() -> IrqState {
        let daif = DAIF.get();
        // SAFETY: Reading and modifying DAIF is safe in kernel mode
        unsafe {
            asm!("msr daifset, #0xf", options(nomem, nostack));
        }
        daif
    }

    /// Restore interrupt state
    #[inline]
    pub fn restore_local(state: IrqState) {
        DAIF.set(state);
    }
}

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
mod imp {
    use super::IrqState;

    /// Disable all interrupts and return previous state (hosted: no-op)
    #[must_use]
    #[inline]
    pub fn disable_local() -> IrqState {
        0
    }

    /// Restore interrupt state (hosted: no-op)
    #[inline]
    pub fn restore_local(_state: IrqState) {}
}

pub use imp::{disable_local, restore_local};
