//! The kernel's one lock primitive: a spinning mutex that also disables
//! machine-mode interrupts for the duration of the critical section.
//!
//! The table lock (guarding [`crate::proc::ProcTable`]'s metadata) and each
//! slot's per-process lock are both ordinary [`Mutex`]s; nothing about the
//! type distinguishes the two lock classes described in the design, only
//! acquisition order (table before slot) does. Disabling interrupts while
//! held is what makes holding a lock and "this hart won't be preempted"
//! equivalent on this single-hart target. The nesting counter below is the
//! `push_off`/`pop_off` discipline that lets that hold across nested
//! `lock()` calls.

use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::riscv;

/// Per-hart nesting state for `push_off`/`pop_off`. There is exactly one
/// hart on this target, so this is a single global rather than a `[Cpu;
/// NCPU]` table.
struct HartState {
    /// Depth of nested `push_off()` calls.
    noff: Cell<usize>,
    /// Were interrupts enabled before the outermost `push_off()`?
    intena: Cell<bool>,
}

// Single-hart kernel: nothing here is actually shared across execution
// contexts, but the type needs to live in a `static`.
unsafe impl Sync for HartState {}

static HART: HartState = HartState {
    noff: Cell::new(0),
    intena: Cell::new(false),
};

fn push_off() {
    let was_enabled = riscv::intr_get();
    riscv::intr_off();
    if HART.noff.get() == 0 {
        HART.intena.set(was_enabled);
    }
    HART.noff.set(HART.noff.get() + 1);
}

fn pop_off() {
    debug_assert!(!riscv::intr_get(), "pop_off: interrupts enabled");
    debug_assert!(HART.noff.get() >= 1, "pop_off: not holding any lock");
    HART.noff.set(HART.noff.get() - 1);
    if HART.noff.get() == 0 && HART.intena.get() {
        riscv::intr_on();
    }
}

/// RAII interrupt-disable token; two nested instances require two drops
/// before interrupts come back on.
pub struct IntrLock {
    _private: (),
}

impl IntrLock {
    fn acquire() -> Self {
        push_off();
        IntrLock { _private: () }
    }
}

impl Drop for IntrLock {
    fn drop(&mut self) {
        pop_off();
    }
}

/// A mutual-exclusion lock that spins and disables interrupts while held.
pub struct Mutex<T: ?Sized> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T: ?Sized> {
    lock: &'a Mutex<T>,
    _intr_lock: IntrLock,
}

impl<T: ?Sized> !Send for MutexGuard<'_, T> {}
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T> Mutex<T> {
    pub const fn new(data: T, name: &'static str) -> Self {
        Mutex {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let intr_lock = IntrLock::acquire();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        MutexGuard {
            lock: self,
            _intr_lock: intr_lock,
        }
    }

    /// Bypass locking entirely. Used only by the panic path, which must be
    /// able to print even if this lock is (or looks) held.
    ///
    /// # Safety
    /// The caller must guarantee no other reference to the data is alive.
    pub unsafe fn get_mut(&self) -> &mut T {
        &mut *self.data.get()
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}
