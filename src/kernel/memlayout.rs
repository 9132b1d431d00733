//! Physical memory map for the target SoC (SiFive FE310-class / QEMU
//! `virt`-class RV64 machines). All addresses below are treated as
//! `volatile` 32-bit cells by [`crate::mmio`] and [`crate::uart`].

/// UART0 MMIO base, FE310 layout.
pub const UART0_BASE: usize = 0x1001_3000;
/// Transmit data register. Bit 31 set while the TX FIFO is full.
pub const UART_TXDATA: usize = UART0_BASE + 0x00;
/// Receive data register. Bit 31 set while the RX FIFO is empty.
pub const UART_RXDATA: usize = UART0_BASE + 0x04;
/// Transmit control register (enable, stop bits, watermark).
pub const UART_TXCTRL: usize = UART0_BASE + 0x08;
/// Receive control register (enable, watermark).
pub const UART_RXCTRL: usize = UART0_BASE + 0x0c;
/// Baud rate divisor.
pub const UART_BAUD_RATE_DIVISOR: usize = UART0_BASE + 0x18;

/// CLINT base: the machine-mode timer and software-interrupt device.
pub const CLINT_BASE: usize = 0x0200_0000;
/// `mtimecmp` for hart 0. One per hart in a real multi-hart layout; this
/// kernel only ever programs hart 0's.
pub const CLINT_MTIMECMP: usize = CLINT_BASE + 0x4000;
/// Free-running `mtime` counter, shared by all harts.
pub const CLINT_MTIME: usize = CLINT_BASE + 0xbff8;

/// `sifive_test`-style finisher device: writing `RESET_CODE` here causes
/// QEMU (or the real SoC's watchdog-backed equivalent) to reset.
pub const TEST_FINISHER: usize = 0x0010_0000;
pub const FINISHER_RESET_CODE: u32 = 0x7777;
pub const FINISHER_POWEROFF_CODE: u32 = 0x5555;
