//! Timer-driven round-robin process selection.
//!
//! This is pure bookkeeping over [`crate::proc::PROCS`] and a borrowed
//! [`TrapFrame`]. No CSR access, no `wfi`, which is exactly what makes it
//! host-testable. [`crate::trap`] is the arch-gated glue that calls this on
//! every trap and turns its `None` result into an actual parked hart.

use crate::param::KERNEL_SCHEDULER_TICK_TIME;
use crate::proc::PROCS;
use crate::trapframe::TrapFrame;

/// Run one round of the scheduling algorithm: save the previously running
/// process's context if it's still live, then hand the hart to the next
/// `READY` (or timed-out `SLEEPING`) slot after it.
///
/// On `Some(idx)`, `trap_frame` now holds `idx`'s context and the caller
/// should `mret` into it. On `None`, nothing in the table is runnable;
/// `trap_frame` is left untouched and the caller should park the hart
/// until the next timer interrupt and call this again.
pub fn schedule_user_process(trap_frame: &mut TrapFrame, now: u64) -> Option<usize> {
    if let Some(last) = PROCS.last_proc_for_schedule() {
        PROCS.preempt(last, trap_frame);
    }
    let start = PROCS.effective_start();
    match PROCS.find_ready_proc(start, now) {
        Some(idx) => {
            PROCS.resume(idx, trap_frame);
            Some(idx)
        }
        None => {
            PROCS.set_idle();
            None
        }
    }
}

/// The absolute tick at which the next scheduler quantum should fire,
/// given the current tick count. Used to reprogram `mtimecmp`.
pub fn next_timer_deadline(now: u64) -> u64 {
    now + KERNEL_SCHEDULER_TICK_TIME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kalloc::ALLOC_TEST_LOCK;
    use crate::proc::ProcState;
    use std::sync::MutexGuard;

    fn fresh() -> MutexGuard<'static, ()> {
        let guard = ALLOC_TEST_LOCK.lock().unwrap();
        PROCS.reset();
        guard
    }

    #[test]
    fn no_processes_yields_none() {
        let _g = fresh();
        let mut tf = TrapFrame::zeroed();
        assert_eq!(schedule_user_process(&mut tf, 0), None);
    }

    #[test]
    fn first_schedule_picks_a_ready_process() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        let idx = schedule_user_process(&mut tf, 0).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(tf.pc, 0x1000);
        PROCS.with_slot(0, |s| assert_eq!(s.state, ProcState::Running));
    }

    #[test]
    fn round_robins_between_two_ready_processes() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        PROCS.spawn("b", 0x2000).unwrap();
        let mut tf = TrapFrame::zeroed();

        let first = schedule_user_process(&mut tf, 0).unwrap();
        let second = schedule_user_process(&mut tf, 1).unwrap();
        assert_ne!(first, second);

        // a full revolution returns to the first again.
        let third = schedule_user_process(&mut tf, 2).unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn sole_ready_process_is_reselected_every_tick() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        for tick in 0..5u64 {
            let idx = schedule_user_process(&mut tf, tick).unwrap();
            assert_eq!(idx, 0);
        }
    }

    #[test]
    fn sleeping_process_is_skipped_until_its_deadline() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        PROCS.spawn("b", 0x2000).unwrap();
        let mut tf = TrapFrame::zeroed();
        let first = schedule_user_process(&mut tf, 0).unwrap();
        PROCS.sleep(first, 10);

        // the sleeper isn't due yet: only the other process runs.
        let idx = schedule_user_process(&mut tf, 1).unwrap();
        assert_ne!(idx, first);

        // once due, it is promoted back into the rotation.
        let idx = schedule_user_process(&mut tf, 10).unwrap();
        assert_eq!(idx, first);
    }

    #[test]
    fn everything_asleep_parks_the_hart() {
        let _g = fresh();
        PROCS.spawn("a", 0x1000).unwrap();
        let mut tf = TrapFrame::zeroed();
        let idx = schedule_user_process(&mut tf, 0).unwrap();
        PROCS.sleep(idx, 0); // blocked in wait(), not time-based

        assert_eq!(schedule_user_process(&mut tf, 1000), None);
    }
}
