//! Memory-mapped 16550-compatible UART used for early boot output
//!
//! The MIPS reference platform this kernel targets exposes its UART as
//! plain memory-mapped registers, not I/O ports, so this is hand-rolled
//! rather than pulled from a port-based serial crate.

use core::fmt;

const UART_BASE: usize = 0xBFD0_3000;
const REG_THR: usize = 0x00;
const REG_LSR: usize = 0x05;
const LSR_THR_EMPTY: u8 = 1 << 5;

pub struct SerialPort;

impl SerialPort {
    pub const fn new() -> Self {
        Self
    }

    fn write_byte(&mut self, byte: u8) {
        // SAFETY: UART_BASE is the platform's fixed MMIO UART window; the
        // LSR poll below guarantees the transmit holding register is empty
        // before writing into it.
        unsafe {
            let lsr = (UART_BASE + REG_LSR) as *const u8;
            while core::ptr::read_volatile(lsr) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            let thr = (UART_BASE + REG_THR) as *mut u8;
            core::ptr::write_volatile(thr, byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

static SERIAL: spin::Mutex<SerialPort> = spin::Mutex::new(SerialPort::new());

pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _ = SERIAL.lock().write_fmt(args);
}
