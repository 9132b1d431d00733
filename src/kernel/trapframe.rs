//! The trap frame: 32 general-purpose registers plus the saved program
//! counter. One lives at a fixed kernel address; its address is published
//! to the trap vector via `mscratch`. A process's `context` field (see
//! [`crate::proc::Proc`]) is a byte-for-byte copy of this struct, and a
//! context switch is nothing more than copying one of these in or out.
//!
//! Field order and offsets match what `trapvec` (the `#[naked]` entry in
//! [`crate::trap`]) stores with `sd` / loads with `ld`; do not reorder
//! without updating the assembly.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    /*   0 */ pub ra: u64,
    /*   8 */ pub sp: u64,
    /*  16 */ pub gp: u64,
    /*  24 */ pub tp: u64,
    /*  32 */ pub t0: u64,
    /*  40 */ pub t1: u64,
    /*  48 */ pub t2: u64,
    /*  56 */ pub s0: u64, // frame pointer
    /*  64 */ pub s1: u64,
    /*  72 */ pub a0: u64,
    /*  80 */ pub a1: u64,
    /*  88 */ pub a2: u64,
    /*  96 */ pub a3: u64,
    /* 104 */ pub a4: u64,
    /* 112 */ pub a5: u64,
    /* 120 */ pub a6: u64,
    /* 128 */ pub a7: u64,
    /* 136 */ pub s2: u64,
    /* 144 */ pub s3: u64,
    /* 152 */ pub s4: u64,
    /* 160 */ pub s5: u64,
    /* 168 */ pub s6: u64,
    /* 176 */ pub s7: u64,
    /* 184 */ pub s8: u64,
    /* 192 */ pub s9: u64,
    /* 200 */ pub s10: u64,
    /* 208 */ pub s11: u64,
    /* 216 */ pub t3: u64,
    /* 224 */ pub t4: u64,
    /* 232 */ pub t5: u64,
    /* 240 */ pub t6: u64,
    /* 248 */ pub pc: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        TrapFrame {
            ra: 0,
            sp: 0,
            gp: 0,
            tp: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            s0: 0,
            s1: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
            pc: 0,
        }
    }

    /// Fetch syscall argument `n` (`a0..=a5`).
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.a0,
            1 => self.a1,
            2 => self.a2,
            3 => self.a3,
            4 => self.a4,
            5 => self.a5,
            _ => panic!("TrapFrame::arg: n out of range: {}", n),
        }
    }

    /// The syscall number, per the ABI (`a7`).
    pub fn syscall_num(&self) -> u64 {
        self.a7
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}
