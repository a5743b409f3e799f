//! Device emulation and port routing for the VMM.
//!
//! Each device owns its own state and is oblivious to the others; this
//! module's [`Devices`] ties them to the port map and implements
//! [`crate::kvm::IoHandler`] so the VM-exit loop can hand it straight to
//! [`crate::kvm::VcpuFd::run_with_io`].

mod console;
mod keyboard;
mod timer;

pub use console::Console;
pub use keyboard::Keyboard;
pub use timer::Timer;

use crate::clock::Clock;
use crate::kvm::{IoData, IoHandler};

/// Console output.
pub const PORT_CONSOLE: u16 = 0x42;
/// Keyboard character read.
pub const PORT_KBD_CHAR: u16 = 0x44;
/// Keyboard status read / character ack.
pub const PORT_KBD_STATUS: u16 = 0x45;
/// Timer interval write.
pub const PORT_TIMER_INTERVAL: u16 = 0x46;
/// Timer status read / enable-ack write.
pub const PORT_TIMER_ENABLE: u16 = 0x47;

type TimerClock = Box<dyn Fn() -> u64 + Send>;

/// Aggregates every emulated device and routes guest port I/O to them.
pub struct Devices {
    console: Console,
    keyboard: Keyboard,
    timer: Timer<TimerClock>,
}

impl Devices {
    pub fn new(clock: Clock) -> Self {
        Self {
            console: Console::new(),
            keyboard: Keyboard::spawn(),
            timer: Timer::new(Box::new(move || clock.now_ms())),
        }
    }
}

impl IoHandler for Devices {
    fn io_read(&mut self, port: u16, data: &mut IoData) {
        match port {
            PORT_KBD_CHAR if data.len() == 1 => data.set(0, self.keyboard.char_read()),
            PORT_KBD_STATUS if data.len() == 1 => data.set(0, self.keyboard.status_read()),
            PORT_TIMER_ENABLE if data.len() == 1 => data.set(0, self.timer.status()),
            _ => {
                log::warn!(
                    "[devices] unhandled port-in 0x{port:x} (width {}), returning 0",
                    data.len()
                );
            }
        }
    }

    fn io_write(&mut self, port: u16, data: &IoData) {
        match (port, data.len()) {
            (PORT_CONSOLE, 1) => {
                if let Err(e) = self.console.write(data.as_slice()[0]) {
                    log::error!("[devices] console write failed: {e}");
                    std::process::exit(1);
                }
            }
            (PORT_KBD_STATUS, 1) => self.keyboard.ack_write(data.as_slice()[0]),
            (PORT_TIMER_INTERVAL, 2) => {
                let bytes = data.as_slice();
                let value = u16::from_le_bytes([bytes[0], bytes[1]]);
                self.timer.set_interval(value);
            }
            (PORT_TIMER_ENABLE, 1) => self.timer.write_enable(data.as_slice()[0]),
            (port, width) => {
                log::warn!("[devices] unhandled port-out 0x{port:x} (width {width}), ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the router through [`IoHandler`] directly, the way the
    /// VM-exit loop would, but without a vCPU: no KVM dependency is needed
    /// because every device behind the router is a plain state machine.
    fn devices() -> Devices {
        Devices::new(crate::clock::Clock::new())
    }

    #[test]
    fn console_write_is_routed_to_the_console_device() {
        let mut d = devices();
        let data = IoData::from_slice(&[b'\n']);
        d.io_write(PORT_CONSOLE, &data);
    }

    #[test]
    fn unknown_port_read_leaves_the_zero_initialized_exit_buffer_untouched() {
        // `run_with_io` always hands handlers a fresh, zero-initialized
        // `IoData` (see `kvm::VcpuFd::run_with_io`); an unhandled port must
        // not write anything, so the vCPU observes zero rather than
        // uninitialized memory.
        let mut d = devices();
        let mut data = IoData::new(1);
        d.io_read(0x50, &mut data);
        assert_eq!(data.as_slice(), &[0]);
    }

    #[test]
    fn unknown_port_write_does_not_panic_and_next_io_still_works() {
        let mut d = devices();
        d.io_write(0x50, &IoData::from_slice(&[1]));

        // the router keeps running after an unhandled port (S5).
        let mut status = IoData::new(1);
        d.io_read(PORT_TIMER_ENABLE, &mut status);
        assert_eq!(status.as_slice(), &[0]);
    }

    #[test]
    fn mismatched_width_on_a_known_port_is_ignored() {
        let mut d = devices();
        // timer interval is a width-2 port; a width-1 write must not be
        // routed to it.
        d.io_write(PORT_TIMER_INTERVAL, &IoData::from_slice(&[5]));

        let mut status = IoData::new(1);
        d.io_read(PORT_TIMER_ENABLE, &mut status);
        assert_eq!(status.as_slice(), &[0], "still disabled: the bad-width write never set an interval");
    }

    #[test]
    fn timer_interval_and_enable_are_routed_through_the_ports() {
        let mut d = devices();
        d.io_write(PORT_TIMER_INTERVAL, &IoData::from_slice(&5000u16.to_le_bytes()));
        d.io_write(PORT_TIMER_ENABLE, &IoData::from_slice(&[0x01]));

        let mut status = IoData::new(1);
        d.io_read(PORT_TIMER_ENABLE, &mut status);
        assert_eq!(status.as_slice(), &[0b01], "enabled but not yet firing immediately after enable");
    }

    #[test]
    fn keyboard_status_is_not_ready_with_no_published_line() {
        let mut d = devices();
        let mut status = IoData::new(1);
        d.io_read(PORT_KBD_STATUS, &mut status);
        assert_eq!(status.as_slice(), &[0]);
    }
}
