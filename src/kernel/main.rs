#![no_std]
#![no_main]

use kernel::{kmain, param::KERNEL_SCHEDULER_TICK_TIME, println, proc::PROCS, riscv, scheduler, trap};

kmain!(kmain);

/// The kernel's single entry point, jumped to by the external bootstrap
/// stub once BSS is zeroed and the stack is set up. Never returns: the
/// last thing it does is load the first process's context and `mret` into
/// it via [`trap::return_to_user`].
extern "C" fn kmain() -> ! {
    kernel::uart::init();
    println!("");
    println!("rvquantum kernel is booting");
    println!("");

    trap::inithart();
    PROCS.init_process_table();

    // Borrow the one trap frame and hand it to the scheduler directly,
    // the same call `trap::mtrap_handler` makes on every subsequent timer
    // tick. There is nothing special about the first process beyond this
    // being the first time anything has been loaded into the frame.
    let tf = unsafe { trap::trap_frame() };
    let now = trap::now();
    scheduler::schedule_user_process(tf, now).expect("kmain: no process to schedule at boot");
    trap::set_timer_after(KERNEL_SCHEDULER_TICK_TIME);

    riscv::timer_intr_on();
    riscv::intr_on();

    unsafe { trap::return_to_user() }
}
