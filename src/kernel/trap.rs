//! Machine-mode trap entry/exit: the dispatcher and the one naked vector
//! that saves and restores user register state. Writing a process's
//! context into the trap frame is the act of switching to it; `mret`
//! picks up whatever is there.
//!
//! There is exactly one [`TrapFrame`] and `mscratch` points at it for the
//! entire life of the kernel ([`inithart`] sets this up once). The vector
//! never has to discover the address: it swaps it into `a0` for a moment
//! to get a free register to index through, then puts it straight back.
//! There is only one entry point here, not a separate user-trap and
//! kernel-trap path, because U-mode and M-mode share one address space:
//! there is no `satp` to switch, and no per-process kernel stack to
//! recover.

use crate::param::KERNEL_SCHEDULER_TICK_TIME;
use crate::proc::PROCS;
use crate::riscv::{self, Exception, Interrupt, Trap};
use crate::scheduler;
use crate::syscall;
use crate::trapframe::TrapFrame;
use core::arch::asm;

const KERNEL_STACK_SIZE: usize = 4096 * 4;

#[repr(align(16))]
struct KernelStack([u8; KERNEL_STACK_SIZE]);

/// The stack `mtrap_vector` switches onto before calling into Rust. There
/// is one hart, so there is one stack; a real SMP build would index this
/// by hart id.
static mut KERNEL_STACK: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

/// The kernel's one trap frame. `mscratch` holds its address from
/// [`inithart`] onward; [`crate::proc::ProcTable`] reads and writes it
/// directly as the mechanism for a context switch.
pub static mut TRAP_FRAME: TrapFrame = TrapFrame::zeroed();

/// Borrow the trap frame. Only ever called from `kmain`, after
/// [`inithart`]. There is exactly one hart, so there is no concurrent
/// access to guard against.
///
/// # Safety
/// The caller must not hold another `&mut TrapFrame` at the same time.
pub unsafe fn trap_frame() -> &'static mut TrapFrame {
    &mut *core::ptr::addr_of_mut!(TRAP_FRAME)
}

/// Install the trap vector and point `mscratch` at [`TRAP_FRAME`]. Called
/// once from `kmain`, before any process is scheduled.
pub fn inithart() {
    unsafe {
        riscv::write_mtvec_direct(mtrap_vector as usize);
        riscv::w_mscratch(core::ptr::addr_of_mut!(TRAP_FRAME) as usize);
    }
}

/// Read the free-running machine timer. This also serves as the kernel's
/// notion of "now" in ticks; there is no separate software tick counter,
/// `mtime` already is one.
pub fn now() -> u64 {
    use crate::memlayout::CLINT_MTIME;
    use crate::mmio::Reg64;
    unsafe { Reg64::new(CLINT_MTIME).read() }
}

/// Arm `mtimecmp` to fire `ticks` ticks from now. The scheduler calls this
/// on every exit path, including the idle path.
pub fn set_timer_after(ticks: u64) {
    use crate::memlayout::CLINT_MTIMECMP;
    use crate::mmio::Reg64;
    let deadline = now() + ticks;
    unsafe { Reg64::new(CLINT_MTIMECMP).write(deadline) };
}

/// The naked machine-trap vector. `mtvec` points here directly (`Direct`
/// mode, so every cause lands at the same address); `mcause` is decoded in
/// [`mtrap_handler`] once we're safely on the kernel stack.
///
/// Field offsets below must match [`TrapFrame`]'s `#[repr(C)]` layout
/// exactly; nothing here will catch a mismatch, which is exactly why that
/// struct's doc comment says not to reorder it without updating this.
#[naked]
#[no_mangle]
pub unsafe extern "C" fn mtrap_vector() -> ! {
    asm!(
        ".align 4",
        // a0 <- &TRAP_FRAME (held permanently in mscratch); the user's a0
        // goes nowhere yet, so park it there too for a moment.
        "csrrw a0, mscratch, a0",
        "sd ra,   0(a0)",
        "sd sp,   8(a0)",
        "sd gp,  16(a0)",
        "sd tp,  24(a0)",
        "sd t0,  32(a0)",
        "sd t1,  40(a0)",
        "sd t2,  48(a0)",
        "sd s0,  56(a0)",
        "sd s1,  64(a0)",
        "sd a1,  80(a0)",
        "sd a2,  88(a0)",
        "sd a3,  96(a0)",
        "sd a4, 104(a0)",
        "sd a5, 112(a0)",
        "sd a6, 120(a0)",
        "sd a7, 128(a0)",
        "sd s2, 136(a0)",
        "sd s3, 144(a0)",
        "sd s4, 152(a0)",
        "sd s5, 160(a0)",
        "sd s6, 168(a0)",
        "sd s7, 176(a0)",
        "sd s8, 184(a0)",
        "sd s9, 192(a0)",
        "sd s10,200(a0)",
        "sd s11,208(a0)",
        "sd t3, 216(a0)",
        "sd t4, 224(a0)",
        "sd t5, 232(a0)",
        "sd t6, 240(a0)",
        // recover the user's real a0 from mscratch, store it, then put
        // &TRAP_FRAME straight back so mscratch is stable for next time.
        "csrr t0, mscratch",
        "sd t0,  72(a0)",
        "csrw mscratch, a0",
        "csrr t0, mepc",
        "sd t0, 248(a0)",
        // onto the kernel stack. the only copy of the user sp left is
        // the one just saved above.
        "la t0, {stack}",
        "addi sp, t0, {stack_size}",
        "call {handler}",
        "j {return_to_user}",
        stack = sym KERNEL_STACK,
        stack_size = const KERNEL_STACK_SIZE,
        handler = sym mtrap_handler,
        return_to_user = sym return_to_user,
        options(noreturn),
    )
}

/// Reload every register from [`TRAP_FRAME`] and `mret`. Used both as the
/// tail of [`mtrap_vector`] and directly by `kmain` to drop into the first
/// process, since both cases reduce to "whatever is in the trap frame is
/// what runs next."
#[naked]
#[no_mangle]
pub unsafe extern "C" fn return_to_user() -> ! {
    asm!(
        "csrr a0, mscratch",
        "ld ra,   0(a0)",
        "ld sp,   8(a0)",
        "ld gp,  16(a0)",
        "ld tp,  24(a0)",
        "ld t0,  32(a0)",
        "ld t1,  40(a0)",
        "ld t2,  48(a0)",
        "ld s0,  56(a0)",
        "ld s1,  64(a0)",
        "ld a1,  80(a0)",
        "ld a2,  88(a0)",
        "ld a3,  96(a0)",
        "ld a4, 104(a0)",
        "ld a5, 112(a0)",
        "ld a6, 120(a0)",
        "ld a7, 128(a0)",
        "ld s2, 136(a0)",
        "ld s3, 144(a0)",
        "ld s4, 152(a0)",
        "ld s5, 160(a0)",
        "ld s6, 168(a0)",
        "ld s7, 176(a0)",
        "ld s8, 184(a0)",
        "ld s9, 192(a0)",
        "ld s10,200(a0)",
        "ld s11,208(a0)",
        "ld t3, 216(a0)",
        "ld t4, 224(a0)",
        "ld t5, 232(a0)",
        "ld t6, 240(a0)",
        "ld t1, 248(a0)",
        "csrw mepc, t1",
        "ld a0,  72(a0)",
        "mret",
        options(noreturn),
    )
}

/// Classify `mcause` and route to the scheduler or the syscall layer.
/// Called on the kernel stack with `tf` pointing at [`TRAP_FRAME`]; by the
/// time this returns, `tf` holds whatever context `return_to_user` should
/// load: the same process, a different one, or, if nothing is runnable,
/// this spins in [`park_until_ready`] until one shows up.
extern "C" fn mtrap_handler(tf: &mut TrapFrame) {
    match riscv::r_mcause() {
        Trap::Interrupt(Interrupt::MachineTimer) => {
            run_scheduler(tf, now());
        }
        Trap::Exception(Exception::UserEnvCall) => {
            // mepc points at the ecall itself; resume just past it.
            tf.pc += 4;
            let yielded = match PROCS.current_idx() {
                Some(idx) => syscall::dispatch(idx, tf, now()),
                None => false,
            };
            if yielded {
                run_scheduler(tf, now());
            }
        }
        cause => {
            crate::println!("mtrap_handler: fault {:?} at pc={:#x}", cause, tf.pc);
            if let Some(idx) = PROCS.current_idx() {
                PROCS.exit(idx);
            }
            run_scheduler(tf, now());
        }
    }
    // Whichever process is about to run, it runs in U-mode. A process
    // that never actually yielded (a plain, non-blocking syscall) was
    // already in U-mode, so this is a no-op for it; one freshly loaded by
    // the scheduler needs it set explicitly, since a nested trap taken
    // while this hart was parked in M-mode left mstatus.MPP = M.
    riscv::set_mpp_user();
}

/// Run one scheduling round; if nothing is runnable, park the hart and
/// try again on every subsequent timer interrupt until something is.
fn run_scheduler(tf: &mut TrapFrame, mut when: u64) {
    loop {
        if scheduler::schedule_user_process(tf, when).is_some() {
            set_timer_after(KERNEL_SCHEDULER_TICK_TIME);
            return;
        }
        set_timer_after(KERNEL_SCHEDULER_TICK_TIME);
        park_until_ready();
        // A genuine wakeup never reaches this line: the pending timer
        // interrupt is itself a trap, which re-enters `mtrap_vector` and,
        // once something is runnable, tail-jumps to `return_to_user`
        // without ever returning up through this call chain. Looping here
        // only guards the case where `wfi` resumes without a real trap.
        when = now();
    }
}

/// Enable interrupts and `wfi`.
fn park_until_ready() {
    riscv::intr_on();
    riscv::wfi();
    riscv::intr_off();
}
