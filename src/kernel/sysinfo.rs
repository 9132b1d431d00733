//! The `sysinfo()` on-wire struct. Deriving `zerocopy`'s `AsBytes` gives it
//! a guaranteed, stable little-endian byte layout without hand-writing a
//! serializer.

use zerocopy::{AsBytes, FromBytes};

#[derive(Clone, Copy, Debug, Default, AsBytes, FromBytes)]
#[repr(C)]
pub struct SysInfo {
    /// Total pages managed by the page allocator.
    pub totalram: u32,
    /// Pages currently free.
    pub freeram: u32,
    /// Processes in any non-`AVAILABLE` state.
    pub procs: u32,
}
