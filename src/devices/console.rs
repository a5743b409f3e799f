//! Character console sink.
//!
//! The guest writes one byte at a time to port `0x42`. Bytes accumulate in a
//! line buffer; a newline flushes the buffer to the host's standard output
//! in a single write call and clears it.

use std::io::{self, Write};

/// Maximum number of bytes the console will buffer before a newline.
pub const LINE_CAPACITY: usize = 256;

/// Buffers guest console output and flushes complete lines to stdout.
pub struct Console {
    buffer: [u8; LINE_CAPACITY],
    count: usize,
}

impl Console {
    pub fn new() -> Self {
        Self {
            buffer: [0; LINE_CAPACITY],
            count: 0,
        }
    }

    /// Handle one byte written by the guest.
    ///
    /// Returns an error only if the host-side flush fails; per the error
    /// handling policy that is fatal to the VMM.
    pub fn write(&mut self, byte: u8) -> io::Result<()> {
        if self.count >= LINE_CAPACITY {
            log::warn!("[console] line exceeds {LINE_CAPACITY} bytes without newline, dropping byte");
            return Ok(());
        }

        self.buffer[self.count] = byte;
        self.count += 1;

        if byte == b'\n' {
            self.flush()?;
        }

        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(&self.buffer[..self.count])?;
        stdout.flush()?;
        self.count = 0;
        Ok(())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_until_newline() {
        let mut console = Console::new();
        console.write(b'h').unwrap();
        console.write(b'i').unwrap();
        assert_eq!(console.count, 2);
        console.write(b'\n').unwrap();
        assert_eq!(console.count, 0, "buffer clears after flush");
    }

    #[test]
    fn empty_line_flushes_just_newline() {
        let mut console = Console::new();
        console.write(b'\n').unwrap();
        assert_eq!(console.count, 0);
    }

    #[test]
    fn overflow_without_newline_is_dropped_not_panicking() {
        let mut console = Console::new();
        for _ in 0..(LINE_CAPACITY + 10) {
            console.write(b'x').unwrap();
        }
        assert_eq!(console.count, LINE_CAPACITY);
    }
}
