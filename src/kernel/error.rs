//! The error surface syscall handlers return internally. The dispatcher in
//! [`crate::syscall`] is the single place that erases this back down to the
//! ABI's `-1`. A per-process `errno` channel is reserved but not
//! implemented, so today `KernelError` only ever improves kernel-internal
//! diagnostics and test assertions, never what a user program observes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The page allocator has no free frame.
    OutOfMemory,
    /// The process table has no `AVAILABLE` slot.
    TableFull,
    /// `execv` was given a name absent from the programs table.
    NotFound,
    /// A null filename, an out-of-range fd, or similar caller error.
    BadArgument,
}

pub type KernelResult<T> = Result<T, KernelError>;
