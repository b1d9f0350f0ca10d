// Copyright (c) 2023 Huawei Device Co., Ltd.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! [`HTTP/2`] frame layer.
//!
//! [`HTTP/2`]: https://httpwg.org/specs/rfc9113.html
//!
//! - [`frame`]: the typed frame model.
//! - [`codec`]: frame header and payload serialization.
//! - [`hpack`]: the simplified HPACK header codec.
//! - [`error`]: RFC 9113 stream and connection error codes.

mod codec;
mod error;
mod frame;

pub mod hpack;

pub use codec::{
    decode_frame_header, FrameDecoder, FrameEncoder, FrameHeader, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_LENGTH,
};
pub use error::{ErrorCode, H2Error};
pub use frame::{
    Data, Frame, FrameFlags, FrameType, Goaway, Headers as HeadersPayload, Payload, Ping,
    Priority, RstStream, Setting, Settings, SettingsBuilder, StreamId, Unknown, WindowUpdate,
};

/// The client connection preface. These 24 octets are the first bytes a
/// client sends on a fresh HTTP/2 connection.
pub const CONNECTION_PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// The maximum legal flow-control window, `2^31 - 1`.
pub const MAX_FLOW_CONTROL_WINDOW: u32 = 0x7fff_ffff;

/// The connection-level flow-control window every connection starts
/// with before any SETTINGS exchange.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;
