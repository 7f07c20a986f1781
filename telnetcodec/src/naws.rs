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


//! Negotiate About Window Size
//!

use crate::consts::ZERO_SENTINEL;

/// Terminal window dimensions reported through NAWS.
///
/// # Format
/// The payload carries four bytes in big-endian order:
/// - 2 bytes for columns (width)
/// - 2 bytes for rows (height)
///
/// # Example
/// ```
/// use mudwire_telnetcodec::naws::WindowSize;
///
/// let size = WindowSize::new(80, 24);
/// assert_eq!(size.cols, 80);
/// assert_eq!(size.rows, 24);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    /// The number of columns (characters) in the terminal window
    pub cols: u16,
    /// The number of rows (lines) in the terminal window
    pub rows: u16,
}

impl WindowSize {
    /// Creates a new `WindowSize` with the specified columns and rows.
    pub fn new(cols: u16, rows: u16) -> Self {
        WindowSize { cols, rows }
    }

    /// Decodes the payload that followed `IAC SB NAWS` in the scratch buffer.
    ///
    /// Zero bytes were stored as the sentinel character, so the sentinel reads
    /// back as zero. Missing bytes also read as zero.
    ///
    /// ```
    /// use mudwire_telnetcodec::naws::WindowSize;
    ///
    /// let size = WindowSize::from_subnegotiation(b"IPI\x18");
    /// assert_eq!(size, WindowSize::new(80, 24));
    /// ```
    pub fn from_subnegotiation(payload: &[u8]) -> Self {
        let byte = |index: usize| -> u16 {
            match payload.get(index) {
                Some(&ZERO_SENTINEL) | None => 0,
                Some(&value) => u16::from(value),
            }
        };
        WindowSize {
            cols: (byte(0) << 8) | byte(1),
            rows: (byte(2) << 8) | byte(3),
        }
    }
}

impl Default for WindowSize {
    /// Traditional 80x24 terminal.
    fn default() -> Self {
        WindowSize { cols: 80, rows: 24 }
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.cols, self.rows)
    }
}
