//! The static program table `execv` resolves names against.
//!
//! There is no loader, no ELF, no filesystem: a "program" here is just a
//! name paired with the entry point of a function already linked into this
//! image. Anything richer (dynamic loading, argv beyond a flat pointer/len
//! pair) is out of scope; this table exists so `init` has something to
//! `execv` into and so the rest of the kernel has a realistic caller to
//! exercise `fork`/`execv`/`exit`/`wait` against.

/// One entry in the program table.
pub struct Program {
    pub name: &'static str,
    pub entry: usize,
}

/// Programs available to `execv`, and the ones `init_process_table` seeds
/// at boot. Entries beyond this table are a `KernelError::NotFound` to
/// `execv`.
pub static PROGRAMS: &[Program] = &[
    Program {
        name: "init",
        entry: crate::userland::init_main as usize,
    },
    Program {
        name: "child",
        entry: crate::userland::child_main as usize,
    },
];

/// Look up a program by name.
pub fn find(name: &str) -> Option<&'static Program> {
    PROGRAMS.iter().find(|p| p.name == name)
}
