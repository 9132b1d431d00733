//! The process table: lifecycle (spawn, fork, execv, exit, sleep/wake) and
//! the single lock protecting it.
//!
//! A table lock (protecting `curr_proc`, `pid_counter`, `num_procs`,
//! `is_idle`) and a per-slot lock are conceptually separate things, but on
//! a single hart with interrupts off for every critical section here, a
//! second lock class would only add an ordering rule with nothing
//! concurrent for it to guard against. Both collapse into the one
//! [`Mutex`] below.

use crate::error::{KernelError, KernelResult};
use crate::kalloc;
use crate::param::{MAX_PROCS, PAGE_SIZE};
use crate::spinlock::Mutex;
use crate::trapframe::TrapFrame;
use array_macro::array;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Available,
    Ready,
    Running,
    Sleeping,
}

pub struct ProcSlot {
    pub pid: u64,
    pub state: ProcState,
    pub name: &'static str,
    /// The parent's `pid`, not a slot index or pointer: a parent whose slot
    /// gets reused after it exits doesn't leave this dangling, and a stale
    /// pid simply fails the liveness check in [`ProcTable::exit`].
    pub parent: Option<u64>,
    pub context: TrapFrame,
    pub stack_page: Option<*mut u8>,
    /// Meaningful iff `state == Sleeping`. Zero means "asleep until woken
    /// explicitly" (blocked in `wait`), not "already due".
    pub wakeup_time: u64,
}

// The raw pointer is a page this slot owns exclusively; nothing else on
// this single-hart target touches it while the slot holds it.
unsafe impl Send for ProcSlot {}

impl ProcSlot {
    const fn empty() -> Self {
        ProcSlot {
            pid: 0,
            state: ProcState::Available,
            name: "",
            parent: None,
            context: TrapFrame::zeroed(),
            stack_page: None,
            wakeup_time: 0,
        }
    }
}

struct ProcTableInner {
    slots: [ProcSlot; MAX_PROCS],
    curr_proc: Option<usize>,
    pid_counter: u64,
    num_procs: usize,
    is_idle: bool,
}

pub struct ProcTable(Mutex<ProcTableInner>);

pub static PROCS: ProcTable = ProcTable(Mutex::new(
    ProcTableInner {
        slots: array![_ => ProcSlot::empty(); MAX_PROCS],
        curr_proc: None,
        pid_counter: 0,
        num_procs: 0,
        is_idle: true,
    },
    "proc_table",
));

impl ProcTable {
    /// Reset every slot to `AVAILABLE` and clear scheduling state.
    pub fn reset(&self) {
        let mut inner = self.0.lock();
        for slot in inner.slots.iter_mut() {
            *slot = ProcSlot::empty();
        }
        inner.curr_proc = None;
        inner.pid_counter = 0;
        inner.num_procs = 0;
        inner.is_idle = true;
    }

    fn next_pid(inner: &mut ProcTableInner) -> u64 {
        let pid = inner.pid_counter;
        inner.pid_counter += 1;
        pid
    }

    /// Atomic increment-and-return pid allocator. `spawn`/`fork` inline
    /// this against a lock they already hold; this standalone form exists
    /// for API symmetry and is what the host tests exercise directly.
    pub fn alloc_pid(&self) -> u64 {
        Self::next_pid(&mut self.0.lock())
    }

    /// Scan for the first `AVAILABLE` slot, skipping `skip`, and flip it to
    /// `READY`. The caller must finish initializing the slot before
    /// releasing `inner`: an explicit handoff under one lock acquisition,
    /// so there is no window where another caller could see a half-built
    /// slot.
    fn alloc_slot(inner: &mut ProcTableInner, skip: Option<usize>) -> Option<usize> {
        for i in 0..MAX_PROCS {
            if Some(i) == skip {
                continue;
            }
            if inner.slots[i].state == ProcState::Available {
                inner.slots[i].state = ProcState::Ready;
                inner.num_procs += 1;
                return Some(i);
            }
        }
        None
    }

    /// Allocate a slot, a pid, and a stack page, ready to run `entry` at
    /// the top of that page. Used to seed the initial programs.
    pub fn spawn(&self, name: &'static str, entry: usize) -> KernelResult<u64> {
        let page = kalloc::allocate_page().ok_or(KernelError::OutOfMemory)?;
        let mut inner = self.0.lock();
        match Self::alloc_slot(&mut inner, None) {
            Some(idx) => {
                let pid = Self::next_pid(&mut inner);
                let slot = &mut inner.slots[idx];
                slot.pid = pid;
                slot.name = name;
                slot.parent = None;
                slot.stack_page = Some(page);
                slot.wakeup_time = 0;
                slot.context = TrapFrame::zeroed();
                slot.context.pc = entry as u64;
                slot.context.sp = (page as usize + PAGE_SIZE) as u64;
                Ok(pid)
            }
            None => {
                drop(inner);
                unsafe { kalloc::release_page(page) };
                Err(KernelError::TableFull)
            }
        }
    }

    /// Duplicate `parent_idx` into a new slot with a copy of its stack
    /// page. `parent_context` is the live trap frame at the point of the
    /// `ecall`, not `parent_idx`'s stored `context` field: that field only
    /// gets refreshed on the next preempt/block, so by the time a running
    /// process reaches a syscall it has drifted from the process's actual
    /// registers. The child's `a0` is forced to 0 (the `fork` return value
    /// it observes); `sp` and `s0` are rebased by the page delta, since
    /// with no MMU every process addresses physical memory directly and a
    /// pointer into the parent's page means nothing in the child's.
    pub fn fork(&self, parent_idx: usize, parent_context: &TrapFrame) -> KernelResult<u64> {
        let child_page = kalloc::allocate_page().ok_or(KernelError::OutOfMemory)?;
        let mut inner = self.0.lock();
        let parent_pid = inner.slots[parent_idx].pid;
        let parent_name = inner.slots[parent_idx].name;
        let parent_page = inner.slots[parent_idx].stack_page;
        let parent_context = *parent_context;

        let child_idx = match Self::alloc_slot(&mut inner, Some(parent_idx)) {
            Some(idx) => idx,
            None => {
                drop(inner);
                unsafe { kalloc::release_page(child_page) };
                return Err(KernelError::TableFull);
            }
        };

        if let Some(parent_page) = parent_page {
            unsafe { core::ptr::copy_nonoverlapping(parent_page, child_page, PAGE_SIZE) };
        }

        let pid = Self::next_pid(&mut inner);
        let delta = child_page as i64 - parent_page.map_or(child_page as i64, |p| p as i64);
        let mut context = parent_context;
        context.sp = (context.sp as i64 + delta) as u64;
        context.s0 = (context.s0 as i64 + delta) as u64;
        context.a0 = 0;

        let slot = &mut inner.slots[child_idx];
        slot.pid = pid;
        slot.name = parent_name;
        slot.parent = Some(parent_pid);
        slot.context = context;
        slot.stack_page = Some(child_page);
        slot.wakeup_time = 0;
        Ok(pid)
    }

    /// Replace `idx`'s program image: release its old stack page, install
    /// `new_page` in its place, and reset its context to start `entry` at
    /// the top of that fresh page with `a0 = argc`, `a1 = argv`. `name`/
    /// `entry` are resolved against the programs table by the caller,
    /// keeping this arch-independent; `new_page` is allocated by the caller
    /// too, since only it knows whether to fail the whole call on OOM
    /// before touching the slot.
    pub fn exec_into(&self, idx: usize, name: &'static str, entry: usize, new_page: *mut u8, argc: u64, argv: u64) {
        let mut inner = self.0.lock();
        if let Some(old_page) = inner.slots[idx].stack_page.take() {
            unsafe { kalloc::release_page(old_page) };
        }
        let top = new_page as usize + PAGE_SIZE;
        let slot = &mut inner.slots[idx];
        slot.name = name;
        slot.stack_page = Some(new_page);
        slot.context = TrapFrame::zeroed();
        slot.context.pc = entry as u64;
        slot.context.ra = entry as u64;
        slot.context.sp = top as u64;
        slot.context.s0 = top as u64;
        slot.context.a0 = argc;
        slot.context.a1 = argv;
    }

    /// Release `idx`'s stack page, free its slot, and, if its parent is
    /// still a live slot with a matching pid, write `idx`'s pid into the
    /// parent's `a0` and mark it `READY`. That's the value the parent's
    /// `wait` appears to return once it's rescheduled; if several children
    /// exit before the parent runs again, the last one to call `exit` wins
    /// the race, a simplification this kernel accepts in place of a
    /// zombie/reap list.
    pub fn exit(&self, idx: usize) {
        let mut inner = self.0.lock();
        let pid = inner.slots[idx].pid;
        let parent_pid = inner.slots[idx].parent;
        if let Some(page) = inner.slots[idx].stack_page.take() {
            unsafe { kalloc::release_page(page) };
        }
        inner.slots[idx] = ProcSlot::empty();
        inner.num_procs -= 1;

        if let Some(parent_pid) = parent_pid {
            if let Some(parent) = inner
                .slots
                .iter_mut()
                .find(|s| s.state != ProcState::Available && s.pid == parent_pid)
            {
                parent.context.a0 = pid;
                parent.state = ProcState::Ready;
            }
        }
    }

    /// Put `idx` to sleep. `wakeup_time == 0` means "forever", woken only
    /// by a child's `exit`; otherwise it's the absolute tick
    /// `find_ready_proc` will promote it back to `READY` at.
    pub fn sleep(&self, idx: usize, wakeup_time: u64) {
        let mut inner = self.0.lock();
        inner.slots[idx].state = ProcState::Sleeping;
        inner.slots[idx].wakeup_time = wakeup_time;
    }

    /// Save `trap_frame` into `idx`'s context and put it to sleep in one
    /// step. This is what a blocking syscall (`wait`, `sleep`) calls on
    /// itself: by the time the scheduler runs next, `idx`'s state is
    /// already `Sleeping`, not `Running`, so [`Self::last_proc_for_schedule`]
    /// leaves it alone instead of re-saving and marking it `READY`.
    pub fn block(&self, idx: usize, trap_frame: &TrapFrame, wakeup_time: u64) {
        let mut inner = self.0.lock();
        inner.slots[idx].context = *trap_frame;
        inner.slots[idx].state = ProcState::Sleeping;
        inner.slots[idx].wakeup_time = wakeup_time;
    }

    /// Run `f` against the slot currently marked `RUNNING`, under one lock
    /// acquisition. Reading `curr_proc` and then re-locking to mutate its
    /// slot would leave a window where that process could exit or be
    /// replaced in between; this closes it.
    pub fn with_current<R>(&self, f: impl FnOnce(usize, &mut ProcSlot) -> R) -> Option<R> {
        let mut inner = self.0.lock();
        let idx = inner.curr_proc?;
        Some(f(idx, &mut inner.slots[idx]))
    }

    pub fn with_slot<R>(&self, idx: usize, f: impl FnOnce(&mut ProcSlot) -> R) -> R {
        let mut inner = self.0.lock();
        f(&mut inner.slots[idx])
    }

    pub fn num_procs(&self) -> usize {
        self.0.lock().num_procs
    }

    /// The slot the scheduling algorithm should treat as "last running":
    /// `None` unless `curr_proc` is still actually `RUNNING`. It may
    /// instead have exited, or already put itself to sleep via
    /// [`Self::block`], in which case there is nothing left to preempt.
    pub fn last_proc_for_schedule(&self) -> Option<usize> {
        let inner = self.0.lock();
        let idx = inner.curr_proc?;
        if inner.slots[idx].state == ProcState::Running {
            Some(idx)
        } else {
            None
        }
    }

    /// The table's notion of "the process the hart is currently running",
    /// regardless of its exact state. Unlike [`Self::last_proc_for_schedule`]
    /// this doesn't filter by `RUNNING`: the trap dispatcher needs the
    /// installed process's index to dispatch a syscall or tear it down on
    /// a fault, whatever state a prior step in the same trap left it in.
    pub fn current_idx(&self) -> Option<usize> {
        self.0.lock().curr_proc
    }

    /// Search start point: `curr_proc`, or slot 0 if there has never been
    /// one.
    pub fn effective_start(&self) -> usize {
        self.0.lock().curr_proc.unwrap_or(0)
    }

    /// Find the next runnable slot after `effective_start`, wrapping
    /// across the whole table exactly once, promoting any timed-out
    /// `SLEEPING` slot to `READY` in place. Updates `curr_proc` to the
    /// last-examined index even when nothing is found.
    pub fn find_ready_proc(&self, effective_start: usize, now: u64) -> Option<usize> {
        let mut inner = self.0.lock();
        for step in 1..=MAX_PROCS {
            let i = (effective_start + step) % MAX_PROCS;
            inner.curr_proc = Some(i);
            let slot = &mut inner.slots[i];
            let ready = match slot.state {
                ProcState::Ready => true,
                ProcState::Sleeping if slot.wakeup_time != 0 && slot.wakeup_time <= now => {
                    slot.state = ProcState::Ready;
                    true
                }
                _ => false,
            };
            if ready {
                return Some(i);
            }
        }
        None
    }

    /// Save `trap_frame` into `idx`'s context and mark it `READY`. Its
    /// time slice expired without it blocking.
    pub fn preempt(&self, idx: usize, trap_frame: &TrapFrame) {
        let mut inner = self.0.lock();
        inner.slots[idx].context = *trap_frame;
        inner.slots[idx].state = ProcState::Ready;
    }

    /// Load `idx`'s saved context into `trap_frame`, mark it `RUNNING`, and
    /// make it the new `curr_proc`.
    pub fn resume(&self, idx: usize, trap_frame: &mut TrapFrame) {
        let mut inner = self.0.lock();
        inner.slots[idx].state = ProcState::Running;
        *trap_frame = inner.slots[idx].context;
        inner.curr_proc = Some(idx);
        inner.is_idle = false;
    }

    pub fn set_idle(&self) {
        self.0.lock().is_idle = true;
    }

    pub fn is_idle(&self) -> bool {
        self.0.lock().is_idle
    }

    /// Seed the table at boot with `init`, the one program
    /// [`crate::programs::PROGRAMS`] runs unprompted. Everything else in
    /// that table (e.g. `child`) is reached only by `init` forking and
    /// `execv`-ing into it. Panics if the table can't even seat this one
    /// process, since there is nothing useful left to do at that point.
    #[cfg(target_arch = "riscv64")]
    pub fn init_process_table(&self) {
        let init = crate::programs::find("init").expect("init_process_table: no \"init\" program registered");
        self.spawn(init.name, init.entry)
            .expect("init_process_table: out of process slots at boot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalloc::ALLOC_TEST_LOCK;
    use std::sync::MutexGuard;

    fn fresh() -> MutexGuard<'static, ()> {
        let guard = ALLOC_TEST_LOCK.lock().unwrap();
        PROCS.reset();
        guard
    }

    #[test]
    fn spawn_allocates_unique_pid_and_stack() {
        let _g = fresh();
        let a = PROCS.spawn("a", 0x1000).unwrap();
        let b = PROCS.spawn("b", 0x2000).unwrap();
        assert_ne!(a, b);
        assert_eq!(PROCS.num_procs(), 2);
    }

    #[test]
    fn spawn_sets_pc_and_top_of_stack_sp() {
        let _g = fresh();
        PROCS.spawn("a", 0xdead).unwrap();
        PROCS.with_slot(0, |slot| {
            assert_eq!(slot.context.pc, 0xdead);
            assert_eq!(slot.state, ProcState::Ready);
            let base = slot.stack_page.unwrap() as u64;
            assert_eq!(slot.context.sp, base + PAGE_SIZE as u64);
        });
    }

    #[test]
    fn fork_clears_child_a0_and_rebases_sp() {
        let _g = fresh();
        let parent_pid = PROCS.spawn("parent", 0x1000).unwrap();
        let parent_idx = 0;
        assert_eq!(PROCS.with_slot(0, |s| s.pid), parent_pid);
        // the live trap frame at the ecall, not the slot's stale context:
        // sp/s0 sit somewhere inside the parent's own stack page, a0 holds
        // whatever the caller last computed before trapping into fork.
        let mut live = PROCS.with_slot(parent_idx, |s| s.context);
        live.a0 = 42;
        live.sp -= 64;
        live.s0 = live.sp;

        let child_pid = PROCS.fork(parent_idx, &live).unwrap();
        assert_ne!(child_pid, parent_pid);

        let child_idx = (0..MAX_PROCS)
            .find(|&i| PROCS.with_slot(i, |s| s.pid == child_pid))
            .unwrap();
        PROCS.with_slot(child_idx, |child| {
            assert_eq!(child.parent, Some(parent_pid));
            assert_eq!(child.context.a0, 0);
        });

        let parent_base = PROCS.with_slot(parent_idx, |s| s.stack_page.unwrap() as i64);
        let child_base = PROCS.with_slot(child_idx, |s| s.stack_page.unwrap() as i64);
        let child_sp = PROCS.with_slot(child_idx, |s| s.context.sp as i64);
        assert_eq!(child_sp - child_base, live.sp as i64 - parent_base);
    }

    #[test]
    fn exit_frees_slot_and_wakes_parent_with_child_pid() {
        let _g = fresh();
        let parent_pid = PROCS.spawn("parent", 0x1000).unwrap();
        let parent_idx = 0;
        assert_eq!(PROCS.with_slot(0, |s| s.pid), parent_pid);
        let live = PROCS.with_slot(parent_idx, |s| s.context);
        let child_pid = PROCS.fork(parent_idx, &live).unwrap();
        let child_idx = (0..MAX_PROCS)
            .find(|&i| PROCS.with_slot(i, |s| s.pid == child_pid))
            .unwrap();

        PROCS.sleep(parent_idx, 0);
        PROCS.exit(child_idx);

        PROCS.with_slot(child_idx, |s| assert_eq!(s.state, ProcState::Available));
        PROCS.with_slot(parent_idx, |s| {
            assert_eq!(s.state, ProcState::Ready);
            assert_eq!(s.context.a0, child_pid);
        });
        assert_eq!(PROCS.num_procs(), 1);
    }

    #[test]
    fn find_ready_proc_wraps_and_skips_unready_slots() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        PROCS.spawn("b", 0x2000).unwrap();
        PROCS.with_slot(0, |s| s.state = ProcState::Running);

        let next = PROCS.find_ready_proc(0, 100).unwrap();
        assert_eq!(next, 1);
    }

    #[test]
    fn find_ready_proc_returns_none_when_nothing_ready() {
        let _g = fresh();
        assert_eq!(PROCS.find_ready_proc(0, 100), None);
    }

    #[test]
    fn find_ready_proc_promotes_timed_out_sleeper_but_not_forever_sleeper() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        PROCS.spawn("b", 0x2000).unwrap();
        PROCS.sleep(0, 50); // due
        PROCS.sleep(1, 0); // forever

        let next = PROCS.find_ready_proc(10, 100);
        assert_eq!(next, Some(0));
        PROCS.with_slot(0, |s| assert_eq!(s.state, ProcState::Ready));
        PROCS.with_slot(1, |s| assert_eq!(s.state, ProcState::Sleeping));
    }

    #[test]
    fn find_ready_proc_does_not_promote_sleeper_not_yet_due() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        PROCS.sleep(0, 200);
        assert_eq!(PROCS.find_ready_proc(10, 100), None);
    }

    #[test]
    fn exec_into_resets_context_and_releases_old_stack_page() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let original_page = PROCS.with_slot(0, |s| s.stack_page).unwrap();
        let freeram_before = kalloc::free_pages();

        let new_page = kalloc::allocate_page().unwrap();
        PROCS.exec_into(0, "b", 0x3000, new_page, 3, 0x4000);

        // the old page went back to the allocator before the new one was
        // handed to exec_into, so total free count is unchanged.
        assert_eq!(kalloc::free_pages(), freeram_before);

        PROCS.with_slot(0, |s| {
            assert_eq!(s.name, "b");
            assert_eq!(s.context.pc, 0x3000);
            assert_eq!(s.context.ra, 0x3000);
            assert_eq!(s.context.a0, 3);
            assert_eq!(s.context.a1, 0x4000);
            assert_eq!(s.stack_page, Some(new_page));
            assert_ne!(s.stack_page, Some(original_page));
            let top = new_page as u64 + PAGE_SIZE as u64;
            assert_eq!(s.context.sp, top);
            assert_eq!(s.context.s0, top);
        });
    }

    #[test]
    fn table_full_returns_table_full_and_releases_page() {
        let _g = fresh();
        for i in 0..MAX_PROCS {
            PROCS.spawn("a", i as usize).unwrap();
        }
        assert_eq!(PROCS.spawn("overflow", 0), Err(KernelError::TableFull));
        for i in 0..MAX_PROCS {
            PROCS.exit(i);
        }
    }

    #[test]
    fn fork_against_a_full_table_fails_without_leaking_the_childs_page() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        for i in 1..MAX_PROCS {
            PROCS.spawn("filler", i as usize).unwrap();
        }
        let freeram_before = kalloc::free_pages();

        let live = PROCS.with_slot(0, |s| s.context);
        assert_eq!(PROCS.fork(0, &live), Err(KernelError::TableFull));

        assert_eq!(kalloc::free_pages(), freeram_before);
        for i in 0..MAX_PROCS {
            PROCS.exit(i);
        }
    }
}
