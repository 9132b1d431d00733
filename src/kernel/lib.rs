#![no_std]
#![feature(negative_impls)]
#![feature(naked_functions)]
#![feature(asm_const)]

// `cargo test` still links `std` for the harness; the process-table,
// scheduler, and page-allocator test modules below use it directly
// (`std::sync::Mutex` guards their shared statics between test runs).
#[cfg(test)]
extern crate std;

pub mod error;
pub mod kalloc;
pub mod memlayout;
pub mod mmio;
pub mod param;
pub mod proc;
pub mod riscv;
pub mod scheduler;
pub mod spinlock;
pub mod sysinfo;
pub mod syscall;
pub mod sysproc;
pub mod trapframe;

#[cfg(target_arch = "riscv64")]
pub mod console;
#[cfg(target_arch = "riscv64")]
#[macro_use]
pub mod printf;
#[cfg(target_arch = "riscv64")]
pub mod programs;
#[cfg(target_arch = "riscv64")]
pub mod trap;
#[cfg(target_arch = "riscv64")]
pub mod uart;
#[cfg(target_arch = "riscv64")]
pub mod userland;

#[macro_export]
macro_rules! kmain {
    ($path:path) => {
        #[export_name = "main"]
        pub extern "C" fn __main() -> ! {
            // type check the given path
            let f: extern "C" fn() -> ! = $path;

            f()
        }
    };
}
