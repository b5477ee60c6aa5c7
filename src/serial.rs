//! Operator serial channel
//!
//! Incoming bytes are assembled into lines by [`LineBuffer`]; outgoing text
//! goes through the [`SerialPort`] trait so the router runs unchanged over
//! USB CDC on hardware and over an in-memory sink in tests.

use heapless::String;

use crate::config::{MAX_LINE_LEN, SERIAL_BUFFER_SIZE};

/// Text sink for the operator
#[allow(async_fn_in_trait)]
pub trait SerialPort {
    /// Write `text` as-is (no terminator added)
    ///
    /// Returns `false` if any part of `text` was dropped.
    async fn write_str(&mut self, text: &str) -> bool;
}

/// Assembles newline-terminated lines from a byte stream
///
/// `\r` is dropped, empty lines are skipped and a line longer than
/// [`MAX_LINE_LEN`] is abandoned whole, up to its terminator.
pub struct LineBuffer {
    buffer: [u8; SERIAL_BUFFER_SIZE],
    read_pos: usize,
    write_pos: usize,
    discarding: bool,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0; SERIAL_BUFFER_SIZE],
            read_pos: 0,
            write_pos: 0,
            discarding: false,
        }
    }

    /// Push received bytes, returns how many were accepted
    ///
    /// Bytes belonging to an abandoned line count as accepted.
    pub fn push(&mut self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.discarding {
                if byte == b'\n' {
                    self.discarding = false;
                }
                accepted += 1;
                continue;
            }
            if byte == b'\r' {
                accepted += 1;
                continue;
            }
            if self.write_pos == SERIAL_BUFFER_SIZE {
                self.compact();
            }
            if self.write_pos == SERIAL_BUFFER_SIZE {
                break;
            }
            self.buffer[self.write_pos] = byte;
            self.write_pos += 1;
            accepted += 1;
        }
        accepted
    }

    /// Take the next complete line, if any
    pub fn read_line(&mut self) -> Option<String<MAX_LINE_LEN>> {
        loop {
            let pending = &self.buffer[self.read_pos..self.write_pos];
            let Some(pos) = pending.iter().position(|&b| b == b'\n') else {
                if pending.len() > MAX_LINE_LEN {
                    warn!("Buffer overflow: serial line longer than {} bytes", MAX_LINE_LEN);
                    self.clear();
                    self.discarding = true;
                }
                return None;
            };

            let start = self.read_pos;
            self.read_pos += pos + 1;
            let raw = &self.buffer[start..start + pos];

            if raw.len() > MAX_LINE_LEN {
                warn!("Buffer overflow: serial line of {} bytes dropped", raw.len());
                self.compact_if_needed();
                continue;
            }

            let Ok(text) = core::str::from_utf8(raw) else {
                warn!("Serial line is not valid UTF-8, dropped");
                self.compact_if_needed();
                continue;
            };

            if text.trim().is_empty() {
                self.compact_if_needed();
                continue;
            }

            let mut line = String::new();
            // Length checked above
            let _ = line.push_str(text);
            self.compact_if_needed();
            return Some(line);
        }
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Bytes waiting for a terminator
    #[must_use]
    pub const fn available(&self) -> usize {
        self.write_pos - self.read_pos
    }

    fn compact_if_needed(&mut self) {
        if self.read_pos >= SERIAL_BUFFER_SIZE / 2 || self.read_pos == self.write_pos {
            self.compact();
        }
    }

    fn compact(&mut self) {
        if self.read_pos > 0 {
            let remaining = self.write_pos - self.read_pos;
            self.buffer.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = remaining;
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_lines() {
        let mut buf = LineBuffer::new();
        buf.push(b"help\r\ndata 1\r\n");
        assert_eq!(buf.read_line().as_deref(), Some("help"));
        assert_eq!(buf.read_line().as_deref(), Some("data 1"));
        assert_eq!(buf.read_line(), None);
        assert_eq!(buf.available(), 0);
    }

    #[test]
    fn partial_line_waits() {
        let mut buf = LineBuffer::new();
        buf.push(b"comm");
        assert_eq!(buf.read_line(), None);
        buf.push(b"and mode\n");
        assert_eq!(buf.read_line().as_deref(), Some("command mode"));
    }
}
