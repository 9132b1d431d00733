//! Process-related syscall bodies. Each takes whatever slice of `(idx,
//! trap_frame, now)` it needs and returns the value that belongs in `a0`,
//! or an error the ABI encodes as `-1`. [`crate::syscall::dispatch`] is the
//! only caller.

use crate::error::{KernelError, KernelResult};
use crate::param::TICKS_PER_MS;
use crate::proc::PROCS;
use crate::trapframe::TrapFrame;

pub fn sys_getpid(idx: usize) -> KernelResult<u64> {
    Ok(PROCS.with_slot(idx, |s| s.pid))
}

/// Release `idx`'s resources and wake its parent. Never returns to the
/// caller in the ordinary sense: by the time `dispatch` finishes, `idx`'s
/// slot is `AVAILABLE` and the next `schedule_user_process` call picks a
/// different process entirely.
pub fn sys_exit(idx: usize, _exit_code: i32) -> KernelResult<u64> {
    PROCS.exit(idx);
    Ok(0)
}

/// `trap_frame` is the live register state at the point of the `ecall`.
/// `ProcTable::fork` copies this into the child rather than the caller's
/// stored slot `context`, which wasn't refreshed since it was last
/// scheduled in.
pub fn sys_fork(idx: usize, trap_frame: &TrapFrame) -> KernelResult<u64> {
    PROCS.fork(idx, trap_frame)
}

/// Block the caller until a child calls `exit`. The pid that wakes it is
/// written into this slot's `a0` by [`crate::proc::ProcTable::exit`], not
/// here; at the point this runs, no child has exited yet.
pub fn sys_wait(idx: usize, trap_frame: &TrapFrame) -> KernelResult<u64> {
    PROCS.block(idx, trap_frame, 0);
    Ok(0)
}

/// Block the caller until at least `ms` milliseconds of ticks have
/// elapsed.
pub fn sys_sleep(idx: usize, trap_frame: &TrapFrame, now: u64, ms: u64) -> KernelResult<u64> {
    let wakeup_time = now + ms * TICKS_PER_MS;
    PROCS.block(idx, trap_frame, wakeup_time);
    Ok(0)
}

/// Count the entries in a null-terminated `argv` vector (an array of `u64`
/// pointers, the last of which is 0). `argv_ptr == 0` means "no argv",
/// so `argc = 0`.
fn argc_of(argv_ptr: u64) -> u64 {
    if argv_ptr == 0 {
        return 0;
    }
    let mut argc = 0u64;
    unsafe {
        let mut p = argv_ptr as *const u64;
        while *p != 0 {
            argc += 1;
            p = p.add(1);
        }
    }
    argc
}

/// Replace `idx` with the named program. `name_ptr`/`name_len` describe a
/// `&str` directly, not a user-space pointer requiring translation: with
/// no MMU, a process and the kernel share one address space. `argv_ptr` is
/// either 0 or a null-terminated array of pointers; compute `argc` by
/// walking the null-terminated `argv` rather than hard-coding it.
pub fn sys_execv(idx: usize, name_ptr: u64, name_len: u64, argv_ptr: u64) -> KernelResult<u64> {
    #[cfg(not(target_arch = "riscv64"))]
    {
        let _ = (idx, name_ptr, name_len, argv_ptr);
        unimplemented!("sys_execv: the programs table only exists on the riscv64 target")
    }
    #[cfg(target_arch = "riscv64")]
    {
        let name = unsafe {
            let bytes = core::slice::from_raw_parts(name_ptr as *const u8, name_len as usize);
            core::str::from_utf8(bytes).map_err(|_| KernelError::BadArgument)?
        };
        let program = crate::programs::find(name).ok_or(KernelError::NotFound)?;
        let new_page = crate::kalloc::allocate_page().ok_or(KernelError::OutOfMemory)?;
        let argc = argc_of(argv_ptr);
        PROCS.exec_into(idx, program.name, program.entry, new_page, argc, argv_ptr);
        Ok(0)
    }
}

pub fn sys_read(fd: u64, buf_ptr: u64, buf_len: u64) -> KernelResult<u64> {
    #[cfg(not(target_arch = "riscv64"))]
    {
        let _ = (fd, buf_ptr, buf_len);
        unimplemented!("sys_read: the console is only wired up on the riscv64 target")
    }
    #[cfg(target_arch = "riscv64")]
    {
        if fd != 0 {
            return Err(KernelError::BadArgument);
        }
        let dst = unsafe { core::slice::from_raw_parts_mut(buf_ptr as *mut u8, buf_len as usize) };
        Ok(crate::console::read(dst) as u64)
    }
}

pub fn sys_write(fd: u64, buf_ptr: u64, buf_len: u64) -> KernelResult<u64> {
    #[cfg(not(target_arch = "riscv64"))]
    {
        let _ = (fd, buf_ptr, buf_len);
        unimplemented!("sys_write: the console is only wired up on the riscv64 target")
    }
    #[cfg(target_arch = "riscv64")]
    {
        if fd != 1 && fd != 2 {
            return Err(KernelError::BadArgument);
        }
        let src = unsafe { core::slice::from_raw_parts(buf_ptr as *const u8, buf_len as usize) };
        Ok(crate::console::write(src) as u64)
    }
}

/// Fill in the `SysInfo` struct at `out_ptr`. No MMU means this is an
/// ordinary pointer write, not a `copyout`.
pub fn sys_sysinfo(out_ptr: u64) -> KernelResult<u64> {
    use zerocopy::AsBytes;

    let info = crate::sysinfo::SysInfo {
        totalram: crate::kalloc::total_pages() as u32,
        freeram: crate::kalloc::free_pages() as u32,
        procs: PROCS.num_procs() as u32,
    };
    let bytes = info.as_bytes();
    unsafe {
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), out_ptr as *mut u8, bytes.len());
    }
    Ok(0)
}

/// Ask the `sifive_test` finisher device to reset or power off the
/// machine. `code` is 0 for reset, anything else for poweroff.
pub fn sys_restart(code: u64) -> KernelResult<u64> {
    #[cfg(not(target_arch = "riscv64"))]
    {
        let _ = code;
        unimplemented!("sys_restart: the finisher device only exists on the riscv64 target")
    }
    #[cfg(target_arch = "riscv64")]
    {
        use crate::memlayout::{FINISHER_POWEROFF_CODE, FINISHER_RESET_CODE, TEST_FINISHER};
        use crate::mmio::Reg32;

        let finisher = unsafe { Reg32::new(TEST_FINISHER) };
        finisher.write(if code == 0 {
            FINISHER_RESET_CODE
        } else {
            FINISHER_POWEROFF_CODE
        });
        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalloc::ALLOC_TEST_LOCK;
    use crate::param::MAX_PROCS;
    use std::sync::MutexGuard;

    fn fresh() -> MutexGuard<'static, ()> {
        let guard = ALLOC_TEST_LOCK.lock().unwrap();
        PROCS.reset();
        guard
    }

    #[test]
    fn getpid_reports_the_slots_pid() {
        let _g = fresh();
        let pid = PROCS.spawn("a", 0x1000).unwrap();
        assert_eq!(sys_getpid(0).unwrap(), pid);
    }

    #[test]
    fn exit_then_getpid_on_freed_slot_reports_zero() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        sys_exit(0, 7).unwrap();
        assert_eq!(sys_getpid(0).unwrap(), 0);
        assert_eq!(PROCS.num_procs(), 0);
    }

    #[test]
    fn fork_returns_a_fresh_pid() {
        let _g = fresh();
        let parent_pid = PROCS.spawn("a", 0x1000).unwrap();
        let tf = PROCS.with_slot(0, |s| s.context);
        let child_pid = sys_fork(0, &tf).unwrap();
        assert_ne!(parent_pid, child_pid);
        assert_eq!(PROCS.num_procs(), 2);
    }

    #[test]
    fn wait_blocks_caller_until_a_child_exits() {
        let _g = fresh();
        PROCS.spawn("parent", 0x1000).unwrap();
        let tf = PROCS.with_slot(0, |s| s.context);
        let child_pid = sys_fork(0, &tf).unwrap();
        let child_idx = (0..MAX_PROCS)
            .find(|&i| PROCS.with_slot(i, |s| s.pid == child_pid))
            .unwrap();

        let tf = TrapFrame::zeroed();
        sys_wait(0, &tf).unwrap();
        PROCS.with_slot(0, |s| assert_eq!(s.state, crate::proc::ProcState::Sleeping));

        sys_exit(child_idx, 0).unwrap();
        PROCS.with_slot(0, |s| {
            assert_eq!(s.state, crate::proc::ProcState::Ready);
            assert_eq!(s.context.a0, child_pid);
        });
    }

    #[test]
    fn sleep_computes_an_absolute_wakeup_tick() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let tf = TrapFrame::zeroed();
        sys_sleep(0, &tf, 100, 5).unwrap();
        PROCS.with_slot(0, |s| {
            assert_eq!(s.state, crate::proc::ProcState::Sleeping);
            assert_eq!(s.wakeup_time, 100 + 5 * TICKS_PER_MS);
        });
    }

    #[test]
    fn argc_of_counts_up_to_the_null_terminator() {
        let argv: [u64; 4] = [0x1000, 0x2000, 0x3000, 0];
        assert_eq!(argc_of(argv.as_ptr() as u64), 3);
    }

    #[test]
    fn argc_of_null_argv_is_zero() {
        assert_eq!(argc_of(0), 0);
    }

    #[test]
    fn sysinfo_reports_process_and_page_counts() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut out = crate::sysinfo::SysInfo::default();
        sys_sysinfo(&mut out as *mut _ as u64).unwrap();
        assert_eq!(out.procs, 1);
        assert_eq!(out.totalram, crate::kalloc::total_pages() as u32);
    }
}
