//! Typed access to the machine-mode control/status registers this kernel
//! touches on every trap: `mstatus`, `mepc`, `mcause`, `mscratch`, `mie`.
//! Wraps the `riscv` crate's register accessors rather than hand rolling
//! `csrr`/`csrw` at every call site.
//!
//! `intr_on`/`intr_off`/`intr_get` back [`crate::spinlock`]'s nesting
//! discipline and are the one piece of this module [`crate::kalloc`] and
//! [`crate::proc`] need; everything else here is only reachable from
//! [`crate::trap`], which is itself `riscv64`-only. So the interrupt
//! toggles get a plain-data host fallback (used by `cargo test`) while the
//! rest stays real-hardware-only.

pub const PGSIZE: usize = crate::param::PAGE_SIZE;
pub const PGSHIFT: usize = 12;

pub const fn pg_round_up(addr: usize) -> usize {
    (addr + PGSIZE - 1) & !(PGSIZE - 1)
}

pub const fn pg_round_down(addr: usize) -> usize {
    addr & !(PGSIZE - 1)
}

#[cfg(target_arch = "riscv64")]
mod hw {
    use riscv::register::mstatus;

    /// Enable machine-mode interrupts globally (`mstatus.MIE`).
    #[inline]
    pub fn intr_on() {
        unsafe { mstatus::set_mie() }
    }

    /// Disable machine-mode interrupts globally (`mstatus.MIE`).
    #[inline]
    pub fn intr_off() {
        unsafe { mstatus::clear_mie() }
    }

    /// Are machine-mode interrupts currently enabled?
    #[inline]
    pub fn intr_get() -> bool {
        mstatus::read().mie()
    }
}

#[cfg(not(target_arch = "riscv64"))]
mod hw {
    //! Host stand-in so lock-nesting logic in `spinlock` and the
    //! page/process-table tests that sit on top of it can run off-target.
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(false);

    pub fn intr_on() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn intr_off() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn intr_get() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }
}

pub use hw::{intr_get, intr_off, intr_on};

#[cfg(target_arch = "riscv64")]
pub use csr::*;

#[cfg(target_arch = "riscv64")]
mod csr {
    use riscv::register::{mcause, mepc, mie, mscratch, mstatus};

    pub use mcause::{Exception, Interrupt, Trap};

    /// Enable the machine timer interrupt (`mie.MTIE`).
    #[inline]
    pub fn timer_intr_on() {
        unsafe { mie::set_mtimer() }
    }

    /// Read the `mscratch` CSR: the address of the shared trap frame.
    #[inline]
    pub fn r_mscratch() -> usize {
        mscratch::read()
    }

    /// Write the `mscratch` CSR.
    ///
    /// # Safety
    /// The caller must ensure `value` is a valid trap frame address, since
    /// the trap vector dereferences it unconditionally on the next trap.
    #[inline]
    pub unsafe fn w_mscratch(value: usize) {
        mscratch::write(value)
    }

    /// Read the saved user `pc` left by the last trap (`mepc`).
    #[inline]
    pub fn r_mepc() -> usize {
        mepc::read()
    }

    /// Write the `pc` the next `mret` will resume at.
    #[inline]
    pub fn w_mepc(value: usize) {
        unsafe { mepc::write(value) }
    }

    /// Classify the cause of the trap currently being handled.
    #[inline]
    pub fn r_mcause() -> Trap {
        mcause::read().cause()
    }

    /// Set `mstatus.MPP` to U-mode, so the next `mret` drops privilege.
    #[inline]
    pub fn set_mpp_user() {
        unsafe { mstatus::set_mpp(mstatus::MPP::User) }
    }

    /// Park the hart until the next interrupt. Used only by the
    /// scheduler's idle path, with `mstatus.MIE` set first so a pending
    /// timer actually wakes it.
    #[inline]
    pub fn wfi() {
        unsafe { riscv::asm::wfi() }
    }

    /// Point `mtvec` at `addr` in Direct mode, so every trap cause lands
    /// at the same vector.
    ///
    /// # Safety
    /// `addr` must be the address of a valid trap vector.
    #[inline]
    pub unsafe fn write_mtvec_direct(addr: usize) {
        riscv::register::mtvec::write(addr, riscv::register::mtvec::TrapMode::Direct)
    }
}
