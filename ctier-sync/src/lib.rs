//! Interrupt-safe synchronisation for the ctier pool
//!
//! Provides [`IrqSpinMutex`], a spinlock that masks local interrupt
//! delivery for as long as its guard lives. The pool's free path can
//! run from interrupt context (an eviction writeback completion frees
//! the evicted chunk), and with an ordinary spinlock that interrupt
//! would deadlock against a holder on the same CPU.
//!
//! # Example
//!
//! ```ignore
//! use ctier_sync::IrqSpinMutex;
//!
//! static BYTES: IrqSpinMutex<u64> = IrqSpinMutex::new(0);
//!
//! fn charge(n: u64) {
//!     *BYTES.lock() += n;
//! }   // lock released, interrupt state restored
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod irq;

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{fence, AtomicBool, Ordering};

use crate::irq::{disable_local, restore_local, IrqState};

/// A spinlock whose critical sections run with local interrupts masked.
///
/// Interrupts are saved and disabled before the acquire spin even
/// starts; otherwise an interrupt could fire between the masking and
/// the acquisition and take the lock on the same CPU, which is the
/// exact deadlock this type exists to rule out.
///
/// # Safety Invariants
///
/// - Holders must not sleep or call anything that may sleep; release
///   the guard around blocking work.
/// - Critical sections are expected to be short. The pool drops the
///   lock around page allocation and every eviction callback.
pub struct IrqSpinMutex<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the lock serialises all access to `value`; the value itself
// is only reachable through a guard that proves the lock is held.
unsafe impl<T: Send> Sync for IrqSpinMutex<T> {}
unsafe impl<T: Send> Send for IrqSpinMutex<T> {}

impl<T> IrqSpinMutex<T> {
    /// Create a new mutex around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Spin until the lock is ours. Test-and-set with exponential
    /// backoff, suitable for the low-contention short sections the
    /// pool runs under this lock.
    fn acquire(&self) {
        let mut backoff = 1u32;
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            for _ in 0..backoff {
                spin_loop();
            }
            backoff = (backoff * 2).min(64);
        }
    }

    /// Acquire the lock, masking local interrupts first.
    #[must_use]
    pub fn lock(&self) -> IrqSpinMutexGuard<'_, T> {
        let saved = disable_local();
        self.acquire();
        IrqSpinMutexGuard {
            lock: self,
            saved,
            _not_send: PhantomData,
        }
    }

    /// Acquire the lock only if it is free right now.
    ///
    /// On failure the saved interrupt state is restored immediately and
    /// `None` is returned.
    #[must_use]
    pub fn try_lock(&self) -> Option<IrqSpinMutexGuard<'_, T>> {
        let saved = disable_local();
        match self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(IrqSpinMutexGuard {
                lock: self,
                saved,
                _not_send: PhantomData,
            }),
            Err(_) => {
                restore_local(saved);
                None
            }
        }
    }

    /// Whether the lock is held at this instant. Racy; debugging only.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Direct access through exclusive ownership, no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwrap the mutex into its value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Default> Default for IrqSpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for IrqSpinMutex<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("IrqSpinMutex");
        match self.try_lock() {
            Some(guard) => s.field("value", &*guard),
            None => s.field("value", &"<held>"),
        };
        s.finish()
    }
}

/// Exclusive access to the locked value.
///
/// Dropping the guard releases the lock and then restores the saved
/// interrupt state, in that order, so every write in the section is
/// published before an interrupt can observe the lock as free.
///
/// `!Send`: moving the guard to another thread would restore the
/// interrupt state on the wrong CPU.
pub struct IrqSpinMutexGuard<'a, T> {
    lock: &'a IrqSpinMutex<T>,
    saved: IrqState,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for IrqSpinMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists, therefore the lock is held.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for IrqSpinMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists, therefore the lock is held.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for IrqSpinMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
        fence(Ordering::SeqCst);
        restore_local(self.saved);
    }
}

// Shared references to the protected value may be shared onwards.
unsafe impl<T: Sync> Sync for IrqSpinMutexGuard<'_, T> {}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_lock_unlock() {
        let mutex = IrqSpinMutex::new(5u32);
        {
            let mut guard = mutex.lock();
            assert_eq!(*guard, 5);
            *guard = 7;
        }
        assert_eq!(*mutex.lock(), 7);
    }

    #[test]
    fn test_try_lock_contended() {
        let mutex = IrqSpinMutex::new(0u32);
        let guard = mutex.lock();
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_contended_counter() {
        let mutex = Arc::new(IrqSpinMutex::new(0u64));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let mutex = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    *mutex.lock() += 1;
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*mutex.lock(), 40_000);
    }

    #[test]
    fn test_into_inner() {
        let mutex = IrqSpinMutex::new(42u32);
        assert_eq!(mutex.into_inner(), 42);
    }

    #[test]
    fn test_get_mut() {
        let mut mutex = IrqSpinMutex::new(1u32);
        *mutex.get_mut() = 9;
        assert_eq!(*mutex.lock(), 9);
    }
}
