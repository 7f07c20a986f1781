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


//! Telnet protocol byte values (RFC 854 and option RFCs)

/// Interpret As Command
pub const IAC: u8 = 255;
/// Refuse to let the peer use an option
pub const DONT: u8 = 254;
/// Ask the peer to use an option
pub const DO: u8 = 253;
/// Refuse to use an option
pub const WONT: u8 = 252;
/// Offer to use an option
pub const WILL: u8 = 251;
/// Subnegotiation Begin
pub const SB: u8 = 250;
/// Go Ahead
pub const GA: u8 = 249;
/// Erase Line
pub const EL: u8 = 248;
/// Erase Character
pub const EC: u8 = 247;
/// Are You There
pub const AYT: u8 = 246;
/// Abort Output
pub const AO: u8 = 245;
/// Interrupt Process
pub const IP: u8 = 244;
/// Break
pub const BRK: u8 = 243;
/// Data Mark
pub const DM: u8 = 242;
/// No Operation
pub const NOP: u8 = 241;
/// Subnegotiation End
pub const SE: u8 = 240;

/// Telnet option codes understood by the driver
pub mod option {
    /// Echo (RFC 857)
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead (RFC 858)
    pub const SGA: u8 = 3;
    /// Timing Mark (RFC 860)
    pub const TM: u8 = 6;
    /// Terminal Type (RFC 1091)
    pub const TTYPE: u8 = 24;
    /// Negotiate About Window Size (RFC 1073)
    pub const NAWS: u8 = 31;
}

/// Terminal type subnegotiation qualifier: the value follows
pub const TTYPE_IS: u8 = 0;
/// Terminal type subnegotiation qualifier: please send the value
pub const TTYPE_SEND: u8 = 1;

/// Stored in the subnegotiation scratch buffer in place of a zero byte.
pub const ZERO_SENTINEL: u8 = b'I';

/// Default capacity of the subnegotiation scratch buffer.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 100;
