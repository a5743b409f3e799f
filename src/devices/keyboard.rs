//! Line-buffered keyboard pipe.
//!
//! A host reader thread blocks on standard input, one character at a time,
//! and assembles complete lines. A guest-facing view is published once per
//! line so the VM-exit thread can hand bytes to the guest through a
//! polling, non-blocking port interface.
//!
//! The reader and the VM-exit thread share only the guest-facing view. The
//! original program this design is based on used a plain shared page and an
//! ordinary flag for that handoff, with no memory ordering guarantees -
//! that is a defect this implementation does not repeat. The view is
//! guarded by a [`Mutex`], so every read and write of `bytes`, `read_ptr`,
//! `size`, and `available` is synchronized.

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

/// Maximum length of a buffered line, including the terminating byte.
pub const LINE_CAPACITY: usize = 256;

/// The guest-facing view: the current line available for the guest to
/// drain, one byte at a time.
struct GuestView {
    bytes: [u8; LINE_CAPACITY],
    read_ptr: usize,
    size: usize,
    available: bool,
}

impl GuestView {
    fn new() -> Self {
        Self {
            bytes: [0; LINE_CAPACITY],
            read_ptr: 0,
            size: 0,
            available: false,
        }
    }
}

/// Host-side line-buffered keyboard device.
///
/// Owns the shared guest-facing view and the reader thread that feeds it.
/// The reader thread is intentionally detached: there is no portable way to
/// cancel a thread blocked in a stdin read, so the VMM exits the process
/// directly on guest halt rather than joining it (see the VM-exit loop).
pub struct Keyboard {
    view: Arc<Mutex<GuestView>>,
}

impl Keyboard {
    /// Spawn the host reader thread and return the guest-facing handle.
    pub fn spawn() -> Self {
        let view = Arc::new(Mutex::new(GuestView::new()));
        let reader_view = Arc::clone(&view);

        thread::spawn(move || reader_loop(reader_view));

        Self { view }
    }

    /// Port `0x45`, in, width 1: status read.
    ///
    /// Returns 1 if a byte is ready, 0 otherwise. Clears `available` once
    /// the line has been fully drained, which lets the reader deliver the
    /// next line.
    pub fn status_read(&self) -> u8 {
        let mut view = self.view.lock().unwrap();
        if view.read_ptr >= view.size {
            view.available = false;
        }
        (view.available && view.read_ptr < view.size) as u8
    }

    /// Port `0x44`, in, width 1: character read. Does not advance `read_ptr`.
    pub fn char_read(&self) -> u8 {
        let view = self.view.lock().unwrap();
        if view.read_ptr < view.size {
            view.bytes[view.read_ptr]
        } else {
            0
        }
    }

    /// Port `0x45`, out, width 1: character ack.
    ///
    /// Only value 0 advances `read_ptr`; any other value is reserved and has
    /// no effect.
    pub fn ack_write(&self, value: u8) {
        if value != 0 {
            return;
        }
        let mut view = self.view.lock().unwrap();
        if view.read_ptr < view.size {
            view.read_ptr += 1;
        }
    }
}

/// Blocking host-input loop run on the reader thread.
fn reader_loop(view: Arc<Mutex<GuestView>>) {
    let mut host_buf = [0u8; LINE_CAPACITY];
    let mut host_len = 0usize;
    let mut stdin = std::io::stdin();
    let mut byte = [0u8; 1];

    loop {
        match stdin.read(&mut byte) {
            Ok(0) => return, // EOF: nothing more to deliver.
            Ok(_) => {}
            Err(e) => {
                log::warn!("[keyboard] stdin read failed: {e}");
                return;
            }
        }

        if host_len < LINE_CAPACITY {
            host_buf[host_len] = byte[0];
            host_len += 1;
        } else {
            log::warn!("[keyboard] line exceeds {LINE_CAPACITY} bytes, truncating");
        }

        if byte[0] == b'\n' {
            if host_len < LINE_CAPACITY {
                host_buf[host_len] = 0;
                host_len += 1;
            } else {
                host_buf[LINE_CAPACITY - 1] = 0;
            }

            loop {
                let mut guard = view.lock().unwrap();
                if !guard.available {
                    guard.bytes[..host_len].copy_from_slice(&host_buf[..host_len]);
                    guard.size = host_len;
                    guard.read_ptr = 0;
                    guard.available = true;
                    break;
                }
                drop(guard);
                thread::yield_now();
            }

            host_len = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(view: &Arc<Mutex<GuestView>>, line: &[u8]) {
        let mut guard = view.lock().unwrap();
        guard.bytes[..line.len()].copy_from_slice(line);
        guard.size = line.len();
        guard.read_ptr = 0;
        guard.available = true;
    }

    #[test]
    fn drains_published_line_in_order_with_acks() {
        let view = Arc::new(Mutex::new(GuestView::new()));
        publish(&view, b"hi\0");
        let kbd = Keyboard { view };

        for expected in b"hi\0" {
            assert_eq!(kbd.status_read(), 1);
            assert_eq!(kbd.char_read(), *expected);
            kbd.ack_write(0);
        }
        assert_eq!(kbd.status_read(), 0, "available clears once drained");
    }

    #[test]
    fn reserved_ack_values_have_no_effect() {
        let view = Arc::new(Mutex::new(GuestView::new()));
        publish(&view, b"x");
        let kbd = Keyboard { view };

        kbd.ack_write(0xFF);
        assert_eq!(kbd.char_read(), b'x', "read_ptr did not advance");
    }

    #[test]
    fn missed_ack_rereads_same_byte() {
        let view = Arc::new(Mutex::new(GuestView::new()));
        publish(&view, b"ab");
        let kbd = Keyboard { view };

        assert_eq!(kbd.char_read(), b'a');
        assert_eq!(kbd.char_read(), b'a', "no advancement without ack");
        kbd.ack_write(0);
        assert_eq!(kbd.char_read(), b'b');
    }
}
