//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Per-connection input buffer
//!
//! Decoded text accumulates between `start` and `end`. In line mode a command
//! is complete once a NUL terminator follows it; the Telnet decoder writes
//! one for every newline. Leading NULs are empty commands and are skipped.

use tracing::{debug, warn};

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// Fixed-capacity command buffer with start/end cursors
#[derive(Debug)]
pub struct InputBuffer {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl InputBuffer {
    /// Creates an empty buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        InputBuffer {
            buf: vec![0; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unconsumed bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Unconsumed bytes, for inspection
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Discards everything
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Largest raw read that is guaranteed to fit once each byte has grown
    /// by up to `expansion` decoded bytes.
    ///
    /// When space runs low the unconsumed tail is moved to the front; if that
    /// does not free enough, the unterminated data is thrown away.
    pub fn read_allowance(&mut self, expansion: usize) -> usize {
        let threshold = self.capacity() / 16;
        if self.raw_space(expansion) < threshold {
            self.compact();
            if self.raw_space(expansion) < threshold {
                warn!(
                    discarded = self.len(),
                    "Input buffer full without a complete command, discarding"
                );
                self.clear();
            }
        }
        self.raw_space(expansion)
    }

    fn raw_space(&self, expansion: usize) -> usize {
        (self.capacity() - self.end).saturating_sub(1) / expansion.max(1)
    }

    /// Moves the unconsumed tail to offset 0
    pub fn compact(&mut self) {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    /// Appends decoded bytes. Returns how many fit.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let room = self.capacity() - self.end;
        let count = bytes.len().min(room);
        if count < bytes.len() {
            warn!(dropped = bytes.len() - count, "Input overflow");
        }
        self.buf[self.end..self.end + count].copy_from_slice(&bytes[..count]);
        self.end += count;
        count
    }

    fn skip_terminators(&mut self) {
        while self.start < self.end && self.buf[self.start] == 0 {
            self.start += 1;
        }
        if self.start == self.end {
            self.clear();
        }
    }

    /// Whether a complete command is buffered
    pub fn has_command(&mut self, single_char: bool) -> bool {
        self.skip_terminators();
        if self.is_empty() {
            return false;
        }
        single_char || self.pending().contains(&0)
    }

    /// Takes the next complete command, with backspaces resolved.
    ///
    /// In single-character mode everything buffered up to the next
    /// terminator counts, complete or not.
    pub fn first_command(&mut self, single_char: bool) -> Option<Vec<u8>> {
        if !self.has_command(single_char) {
            return None;
        }
        let (length, consumed) = match self.pending().iter().position(|&byte| byte == 0) {
            Some(nul) => (nul, nul + 1),
            None => (self.len(), self.len()),
        };
        let command = resolve_backspaces(&self.buf[self.start..self.start + length]);
        self.start += consumed;
        self.skip_terminators();
        if !single_char && !self.is_empty() && !self.pending().contains(&0) {
            // Only a partial command is left, move it down for the next read
            self.compact();
        }
        debug!(length = command.len(), "Command taken from input buffer");
        Some(command)
    }

    /// Takes the next newline-terminated line, without its newline
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.pending().iter().position(|&byte| byte == b'\n')?;
        let line = self.buf[self.start..self.start + newline].to_vec();
        self.start += newline + 1;
        if self.start == self.end {
            self.clear();
        }
        Some(line)
    }
}

/// Applies backspace and delete: each one removes the byte before it.
pub fn resolve_backspaces(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        match byte {
            BACKSPACE | DELETE => {
                out.pop();
            }
            _ => out.push(byte),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudwire_telnetcodec::LINE_TERMINATOR;

    fn line(text: &[u8]) -> Vec<u8> {
        let mut bytes = text.to_vec();
        bytes.extend_from_slice(LINE_TERMINATOR);
        bytes
    }

    // ============================================================================
    // Command Extraction Tests
    // ============================================================================

    #[test]
    fn test_complete_command() {
        let mut input = InputBuffer::new(64);
        input.push(&line(b"look"));

        assert!(input.has_command(false));
        assert_eq!(input.first_command(false).unwrap(), b"look");
        assert!(input.first_command(false).is_none());
        assert!(input.is_empty());
    }

    #[test]
    fn test_partial_command_waits() {
        let mut input = InputBuffer::new(64);
        input.push(b"loo");

        assert!(!input.has_command(false));
        assert!(input.first_command(false).is_none());

        input.push(&line(b"k"));
        assert_eq!(input.first_command(false).unwrap(), b"look");
    }

    #[test]
    fn test_empty_commands_skipped() {
        let mut input = InputBuffer::new(64);
        input.push(b"\0\0\0");
        assert!(!input.has_command(false));
        assert!(input.is_empty());
    }

    #[test]
    fn test_empty_line_is_a_command() {
        let mut input = InputBuffer::new(64);
        input.push(&line(b""));
        assert_eq!(input.first_command(false).unwrap(), b"");
    }

    #[test]
    fn test_two_commands_in_order() {
        let mut input = InputBuffer::new(64);
        input.push(&line(b"north"));
        input.push(&line(b"south"));

        assert_eq!(input.first_command(false).unwrap(), b"north");
        assert_eq!(input.first_command(false).unwrap(), b"south");
        assert!(!input.has_command(false));
    }

    #[test]
    fn test_partial_tail_moved_to_front() {
        let mut input = InputBuffer::new(64);
        input.push(&line(b"say hi"));
        input.push(b"par");

        assert_eq!(input.first_command(false).unwrap(), b"say hi");
        assert_eq!(input.start, 0);
        assert_eq!(input.pending(), b"par");
    }

    #[test]
    fn test_single_char_mode() {
        let mut input = InputBuffer::new(64);
        input.push(b"y");

        assert!(!input.has_command(false));
        assert!(input.has_command(true));
        assert_eq!(input.first_command(true).unwrap(), b"y");
        assert!(input.is_empty());
    }

    #[test]
    fn test_backspace_resolution() {
        assert_eq!(resolve_backspaces(b"lo\x08ook"), b"look");
        assert_eq!(resolve_backspaces(b"\x08\x7fab\x7f"), b"a");
        assert_eq!(resolve_backspaces(b"x \x08"), b"x");
    }

    // ============================================================================
    // Space Management Tests
    // ============================================================================

    #[test]
    fn test_read_allowance_accounts_for_expansion() {
        let mut input = InputBuffer::new(64);
        assert_eq!(input.read_allowance(3), 21);
        assert_eq!(input.read_allowance(1), 63);
    }

    #[test]
    fn test_read_allowance_compacts() {
        let mut input = InputBuffer::new(64);
        let mut data = line(b"0123456789012345678901234567890123456789012345678901234");
        data.extend_from_slice(b"ab");
        input.push(&data);
        input.first_command(false).unwrap();

        // The partial tail is already at the front after the command was taken
        assert_eq!(input.pending(), b"ab");
        assert_eq!(input.read_allowance(3), 20);
    }

    #[test]
    fn test_read_allowance_resets_when_full() {
        let mut input = InputBuffer::new(64);
        input.push(&[b'x'; 62]);

        let allowance = input.read_allowance(3);
        assert!(input.is_empty());
        assert_eq!(allowance, 21);
    }

    #[test]
    fn test_push_never_exceeds_capacity() {
        let mut input = InputBuffer::new(16);
        assert_eq!(input.push(&[b'a'; 40]), 16);
        assert_eq!(input.len(), 16);
    }

    // ============================================================================
    // Line Mode Tests
    // ============================================================================

    #[test]
    fn test_next_line() {
        let mut input = InputBuffer::new(64);
        input.push(b"one\r\ntwo\nthr");

        assert_eq!(input.next_line().unwrap(), b"one\r");
        assert_eq!(input.next_line().unwrap(), b"two");
        assert!(input.next_line().is_none());
        assert_eq!(input.pending(), b"thr");
    }
}
