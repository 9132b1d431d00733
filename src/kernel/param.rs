//! Compile-time tunables for the kernel's fixed-capacity tables.

/// Maximum number of live processes (process table slots).
pub const MAX_PROCS: usize = 16;
/// Bytes in one physical page; the unit the page allocator hands out.
pub const PAGE_SIZE: usize = 4096;
/// Timer ticks between scheduler quanta.
pub const KERNEL_SCHEDULER_TICK_TIME: u64 = 100_000;
/// Timer ticks per millisecond of `sleep()`, derived from the platform's
/// fixed timebase.
pub const TICKS_PER_MS: u64 = 10;
