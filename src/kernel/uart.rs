//! Polled, byte-at-a-time FE310 UART0 driver.
//!
//! No TX/RX interrupts, no ring buffer: every byte in or out busy-waits on
//! the FIFO full/empty bit. That is enough for a kernel whose only console
//! traffic is `print!`/`println!` output and `read()`/`write()` on fd 0/1/2;
//! an interrupt-driven driver is the natural next step if that ever changes.

use crate::memlayout::{
    UART_BAUD_RATE_DIVISOR, UART_RXCTRL, UART_RXDATA, UART_TXCTRL, UART_TXDATA,
};
use crate::mmio::Reg32;
use bitflags::bitflags;

bitflags! {
    struct TxCtrl: u32 {
        /// Enable the transmitter.
        const TXEN = 1 << 0;
        /// Use two stop bits instead of one.
        const NSTOP = 1 << 1;
    }
}

bitflags! {
    struct RxCtrl: u32 {
        /// Enable the receiver.
        const RXEN = 1 << 0;
    }
}

const TXDATA: Reg32 = unsafe { Reg32::new(UART_TXDATA) };
const RXDATA: Reg32 = unsafe { Reg32::new(UART_RXDATA) };
const TXCTRL: Reg32 = unsafe { Reg32::new(UART_TXCTRL) };
const RXCTRL: Reg32 = unsafe { Reg32::new(UART_RXCTRL) };
const BAUD_RATE_DIVISOR: Reg32 = unsafe { Reg32::new(UART_BAUD_RATE_DIVISOR) };

/// Bit 31 of TXDATA/RXDATA marks FIFO-full / FIFO-empty respectively.
const FIFO_FLAG: u32 = 1 << 31;

/// Bring up the transmitter and receiver at a divisor tuned for QEMU's
/// fixed input clock. A real FE310 board would derive this from its clock
/// tree; this kernel only ever targets the emulator.
pub fn init() {
    TXCTRL.write(TxCtrl::TXEN.bits());
    RXCTRL.write(RxCtrl::RXEN.bits());
    BAUD_RATE_DIVISOR.write(0);
}

/// Send one byte, blocking while the TX FIFO is full.
pub fn putc(byte: u8) {
    while TXDATA.read() & FIFO_FLAG != 0 {
        core::hint::spin_loop();
    }
    TXDATA.write(byte as u32);
}

/// Receive one byte, blocking while the RX FIFO is empty.
pub fn getc() -> u8 {
    loop {
        let word = RXDATA.read();
        if word & FIFO_FLAG == 0 {
            return word as u8;
        }
        core::hint::spin_loop();
    }
}

/// Non-blocking receive: `None` if the RX FIFO is currently empty.
pub fn try_getc() -> Option<u8> {
    let word = RXDATA.read();
    if word & FIFO_FLAG == 0 {
        Some(word as u8)
    } else {
        None
    }
}
