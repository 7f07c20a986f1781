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


use crate::TelnetReply;
use crate::naws::WindowSize;
use bytes::Bytes;

///
/// `TelnetEvent` is what the decoder hands to the connection layer.
///
/// Clean text is batched into `Data` runs; everything else is a side effect
/// the connection must apply (queue a reply, record that the peer speaks
/// Telnet, or notify the session about negotiated terminal properties).
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Clean command text for the input buffer
    Data(Bytes),
    /// Reply to queue on the connection's output buffer
    Reply(TelnetReply),
    /// First negotiation answer received from the peer
    TelnetDetected,
    /// Terminal type reported with `IAC SB TTYPE IS ... IAC SE`
    TerminalType(String),
    /// Window size reported with `IAC SB NAWS ... IAC SE`
    WindowSize(WindowSize),
    /// Any other subnegotiation payload, option byte first, zero bytes
    /// stored as the sentinel character
    Subnegotiation(Bytes),
}
