//! The syscall ABI: `a7` selects the call, `a0..a5` carry arguments, the
//! return value goes back in `a0` as `-1` (via [`KernelError`]) or a
//! non-negative result. [`crate::trap`] advances `pc` past the `ecall`
//! before calling [`dispatch`] once per trap.

use crate::error::KernelError;
use crate::sysproc;
use crate::trapframe::TrapFrame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SysCallNum {
    Restart = 0,
    Exit = 1,
    Fork = 2,
    Read = 3,
    Write = 4,
    Wait = 5,
    Execv = 6,
    Getpid = 7,
    Sysinfo = 8,
    Sleep = 9,
}

impl SysCallNum {
    fn from_u64(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Restart,
            1 => Self::Exit,
            2 => Self::Fork,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Wait,
            6 => Self::Execv,
            7 => Self::Getpid,
            8 => Self::Sysinfo,
            9 => Self::Sleep,
            _ => return None,
        })
    }
}

/// The ABI's "negative on error" convention, collapsed to the one error
/// code this kernel reports across the trap boundary: a per-process
/// `errno` channel is reserved (see `KernelError`) but not wired up yet.
fn encode(result: Result<u64, KernelError>) -> u64 {
    result.unwrap_or(u64::MAX)
}

/// Dispatch the syscall `idx` just trapped into, reading arguments from
/// `trap_frame` and writing the result back into `trap_frame.a0`. `now` is
/// the tick count at the time of the trap, needed by `sleep`.
///
/// Returns whether `idx` gave up the hart as part of handling this call
/// (`exit`/`wait`/`sleep`). [`crate::trap`] uses this to decide whether a
/// scheduling round is owed before returning to user mode. For those three
/// calls, `idx`'s slot is no longer `RUNNING` by the time this returns, so
/// the `a0` written here is moot: the next `schedule_user_process` call
/// discards `trap_frame` wholesale in favor of whatever process it picks
/// next.
pub fn dispatch(idx: usize, trap_frame: &mut TrapFrame, now: u64) -> bool {
    let num = trap_frame.syscall_num();
    let (result, yields) = match SysCallNum::from_u64(num) {
        Some(SysCallNum::Restart) => (sysproc::sys_restart(trap_frame.arg(0)), false),
        Some(SysCallNum::Exit) => (sysproc::sys_exit(idx, trap_frame.arg(0) as i32), true),
        Some(SysCallNum::Fork) => (sysproc::sys_fork(idx, trap_frame), false),
        Some(SysCallNum::Read) => (sysproc::sys_read(trap_frame.arg(0), trap_frame.arg(1), trap_frame.arg(2)), false),
        Some(SysCallNum::Write) => (sysproc::sys_write(trap_frame.arg(0), trap_frame.arg(1), trap_frame.arg(2)), false),
        Some(SysCallNum::Wait) => (sysproc::sys_wait(idx, trap_frame), true),
        Some(SysCallNum::Execv) => (sysproc::sys_execv(idx, trap_frame.arg(0), trap_frame.arg(1), trap_frame.arg(2)), false),
        Some(SysCallNum::Getpid) => (sysproc::sys_getpid(idx), false),
        Some(SysCallNum::Sysinfo) => (sysproc::sys_sysinfo(trap_frame.arg(0)), false),
        Some(SysCallNum::Sleep) => (sysproc::sys_sleep(idx, trap_frame, now, trap_frame.arg(0)), true),
        None => (Err(KernelError::BadArgument), false),
    };
    trap_frame.a0 = encode(result);
    yields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalloc::ALLOC_TEST_LOCK;
    use crate::proc::PROCS;
    use std::sync::MutexGuard;

    fn fresh() -> MutexGuard<'static, ()> {
        let guard = ALLOC_TEST_LOCK.lock().unwrap();
        PROCS.reset();
        guard
    }

    #[test]
    fn unknown_syscall_number_encodes_as_max() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        tf.a7 = 200;
        dispatch(0, &mut tf, 0);
        assert_eq!(tf.a0, u64::MAX);
    }

    #[test]
    fn getpid_dispatches_through_a7() {
        let _g = fresh();
        let pid = PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        tf.a7 = SysCallNum::Getpid as u64;
        dispatch(0, &mut tf, 0);
        assert_eq!(tf.a0, pid);
    }

    #[test]
    fn fork_dispatches_through_a7() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        tf.a7 = SysCallNum::Fork as u64;
        dispatch(0, &mut tf, 0);
        assert_ne!(tf.a0, 0);
        assert_eq!(PROCS.num_procs(), 2);
    }
}
