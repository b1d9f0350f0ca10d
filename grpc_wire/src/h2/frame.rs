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

//! HTTP/2 frame model ([RFC 9113 Section 6]).
//!
//! [RFC 9113 Section 6]: https://httpwg.org/specs/rfc9113.html#FrameTypes

/// Type StreamId.
/// In HTTP/2, streams are identified by an unsigned 31-bit integer.
pub type StreamId = u32;

/// Mask for the END_STREAM flag.
/// When set, indicates that the sender will not send further frames for
/// this stream.
pub(crate) const END_STREAM_MASK: u8 = 0x01;

/// Mask for the ACK flag, shared by SETTINGS and PING.
pub(crate) const ACK_MASK: u8 = 0x01;

/// Mask for the END_HEADERS flag.
/// When set, indicates that this frame contains an entire header block
/// and not a fragment.
pub(crate) const END_HEADERS_MASK: u8 = 0x04;

/// Mask for the PADDED flag.
/// When set, indicates that the frame payload is followed by a padding
/// field.
pub(crate) const PADDED_MASK: u8 = 0x08;

/// Mask for the PRIORITY flag on a HEADERS frame.
pub(crate) const HEADERS_PRIORITY_MASK: u8 = 0x20;

/// HTTP/2 frame structure: stream id, flags and a typed payload. This
/// is the fundamental unit of communication in HTTP/2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    id: StreamId,
    flags: FrameFlags,
    payload: Payload,
}

/// Enum representing the type of an HTTP/2 frame.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// Enum representing the payload of an HTTP/2 frame.
/// The payload differs based on the type of frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// DATA frame payload.
    Data(Data),
    /// HEADERS frame payload, carrying the still-compressed header
    /// block fragment. HPACK decoding happens above the frame layer.
    Headers(Headers),
    /// PRIORITY frame payload.
    Priority(Priority),
    /// RST_STREAM frame payload.
    RstStream(RstStream),
    /// SETTINGS frame payload.
    Settings(Settings),
    /// PING frame payload.
    Ping(Ping),
    /// GOAWAY frame payload.
    Goaway(Goaway),
    /// WINDOW_UPDATE frame payload.
    WindowUpdate(WindowUpdate),
    /// A frame of a type this client does not consume (PUSH_PROMISE,
    /// CONTINUATION, or an extension type). Carried through verbatim so
    /// the caller can ignore it.
    Unknown(Unknown),
}

/// HTTP/2 frame flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFlags(u8);

/// HTTP/2 DATA frame's payload, with any padding already removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Data {
    data: Vec<u8>,
}

/// HTTP/2 HEADERS frame's payload: the raw HPACK-encoded header block
/// with padding and any priority section already stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Headers {
    block: Vec<u8>,
}

/// Represents the PRIORITY frame payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Priority {
    exclusive: bool,
    stream_dependency: u32,
    weight: u8,
}

/// The RST_STREAM frame allows for immediate termination of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RstStream {
    error_code: u32,
}

/// Represents the SETTINGS frame payload: a list of identifier/value
/// pairs that affect how the endpoints communicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    settings: Vec<Setting>,
}

/// Enum representing a single setting in a SETTINGS frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Setting {
    /// SETTINGS_HEADER_TABLE_SIZE
    HeaderTableSize(u32),
    /// SETTINGS_ENABLE_PUSH
    EnablePush(bool),
    /// SETTINGS_MAX_CONCURRENT_STREAMS
    MaxConcurrentStreams(u32),
    /// SETTINGS_INITIAL_WINDOW_SIZE
    InitialWindowSize(u32),
    /// SETTINGS_MAX_FRAME_SIZE
    MaxFrameSize(u32),
    /// SETTINGS_MAX_HEADER_LIST_SIZE
    MaxHeaderListSize(u32),
}

/// Represents the PING frame payload: 8 bytes of opaque data used to
/// measure a minimal round-trip time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ping {
    /// The opaque data of PING.
    pub data: [u8; 8],
}

/// Represents the GOAWAY frame payload, used to initiate shutdown of a
/// connection or to signal serious error conditions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Goaway {
    error_code: u32,
    last_stream_id: StreamId,
    debug_data: Vec<u8>,
}

/// Represents the WINDOW_UPDATE frame payload, used to implement flow
/// control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowUpdate {
    window_size_increment: u32,
}

/// A frame this client passes through undecoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unknown {
    frame_type: u8,
    payload: Vec<u8>,
}

/// A Builder of SETTINGS payload.
pub struct SettingsBuilder {
    settings: Vec<Setting>,
}

impl Frame {
    /// Constructs a new `Frame` with the given `StreamId`, `FrameFlags`
    /// and `Payload`.
    pub fn new(id: StreamId, flags: FrameFlags, payload: Payload) -> Self {
        Frame { id, flags, payload }
    }

    /// Returns the stream identifier of the frame.
    pub fn stream_id(&self) -> StreamId {
        self.id
    }

    /// Returns a reference to the frame's flags.
    pub fn flags(&self) -> &FrameFlags {
        &self.flags
    }

    /// Returns a reference to the frame's payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl FrameFlags {
    /// Creates a new `FrameFlags` instance with the given flags byte.
    pub fn new(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Creates a new `FrameFlags` instance with no flags set.
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Judges the END_STREAM flag is true.
    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM_MASK == END_STREAM_MASK
    }

    /// Judges the END_HEADERS flag is true.
    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS_MASK == END_HEADERS_MASK
    }

    /// Judges the PADDED flag is true.
    pub fn is_padded(&self) -> bool {
        self.0 & PADDED_MASK == PADDED_MASK
    }

    /// Judges the ACK flag is true.
    pub fn is_ack(&self) -> bool {
        self.0 & ACK_MASK == ACK_MASK
    }

    /// Gets the flags octet.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Sets the END_STREAM flag.
    pub fn set_end_stream(&mut self, end_stream: bool) {
        if end_stream {
            self.0 |= END_STREAM_MASK;
        } else {
            self.0 &= !END_STREAM_MASK;
        }
    }

    /// Sets the END_HEADERS flag.
    pub fn set_end_headers(&mut self, end_headers: bool) {
        if end_headers {
            self.0 |= END_HEADERS_MASK;
        } else {
            self.0 &= !END_HEADERS_MASK;
        }
    }
}

impl Payload {
    /// Returns the `FrameType` this payload is associated with, or
    /// `None` for an undecoded payload carrying an extension type.
    pub fn frame_type(&self) -> Option<FrameType> {
        match self {
            Payload::Data(_) => Some(FrameType::Data),
            Payload::Headers(_) => Some(FrameType::Headers),
            Payload::Priority(_) => Some(FrameType::Priority),
            Payload::RstStream(_) => Some(FrameType::RstStream),
            Payload::Settings(_) => Some(FrameType::Settings),
            Payload::Ping(_) => Some(FrameType::Ping),
            Payload::Goaway(_) => Some(FrameType::Goaway),
            Payload::WindowUpdate(_) => Some(FrameType::WindowUpdate),
            Payload::Unknown(unknown) => FrameType::try_from(unknown.frame_type).ok(),
        }
    }
}

impl Data {
    /// Creates a new `Data` instance containing the provided data.
    pub fn new(data: Vec<u8>) -> Self {
        Data { data }
    }

    /// Returns the data payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the number of bytes in the `Data` payload.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Headers {
    /// Creates a new `Headers` payload from a raw HPACK header block.
    pub fn new(block: Vec<u8>) -> Self {
        Headers { block }
    }

    /// Returns the raw HPACK-encoded header block.
    pub fn block(&self) -> &[u8] {
        &self.block
    }
}

impl Settings {
    /// Creates a new `Settings` instance containing the provided
    /// settings.
    pub fn new(settings: Vec<Setting>) -> Self {
        Settings { settings }
    }

    /// Returns a slice of the settings.
    pub fn get_settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Returns the total length of the settings when encoded.
    /// Each setting occupies a 2-byte identifier and a 4-byte value.
    pub fn encoded_len(&self) -> usize {
        self.settings.len() * 6
    }

    /// Returns an ACK SETTINGS frame.
    pub fn ack() -> Frame {
        Frame::new(
            0,
            FrameFlags::new(ACK_MASK),
            Payload::Settings(Settings::new(vec![])),
        )
    }
}

impl Setting {
    /// Returns the identifier associated with the setting.
    pub fn setting_identifier(&self) -> u16 {
        match self {
            Setting::HeaderTableSize(_) => 0x01,
            Setting::EnablePush(_) => 0x02,
            Setting::MaxConcurrentStreams(_) => 0x03,
            Setting::InitialWindowSize(_) => 0x04,
            Setting::MaxFrameSize(_) => 0x05,
            Setting::MaxHeaderListSize(_) => 0x06,
        }
    }

    /// Returns the 32-bit value carried by the setting.
    pub fn value(&self) -> u32 {
        match *self {
            Setting::HeaderTableSize(v) => v,
            Setting::EnablePush(v) => v as u32,
            Setting::MaxConcurrentStreams(v) => v,
            Setting::InitialWindowSize(v) => v,
            Setting::MaxFrameSize(v) => v,
            Setting::MaxHeaderListSize(v) => v,
        }
    }
}

impl SettingsBuilder {
    /// `SettingsBuilder` constructor.
    pub fn new() -> Self {
        SettingsBuilder { settings: vec![] }
    }

    /// SETTINGS_HEADER_TABLE_SIZE (0x01) setting.
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.push(Setting::HeaderTableSize(size));
        self
    }

    /// SETTINGS_ENABLE_PUSH (0x02) setting.
    pub fn enable_push(mut self, is_enable: bool) -> Self {
        self.settings.push(Setting::EnablePush(is_enable));
        self
    }

    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x03) setting.
    pub fn max_concurrent_streams(mut self, num: u32) -> Self {
        self.settings.push(Setting::MaxConcurrentStreams(num));
        self
    }

    /// SETTINGS_INITIAL_WINDOW_SIZE (0x04) setting.
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.push(Setting::InitialWindowSize(size));
        self
    }

    /// SETTINGS_MAX_FRAME_SIZE (0x05) setting.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.push(Setting::MaxFrameSize(size));
        self
    }

    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x06) setting.
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.push(Setting::MaxHeaderListSize(size));
        self
    }

    /// Consumes the builder and constructs a SETTINGS payload.
    pub fn build(self) -> Settings {
        Settings::new(self.settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Ping {
    /// Creates a new `Ping` instance with the provided data.
    pub fn new(data: [u8; 8]) -> Self {
        Ping { data }
    }

    /// Returns the data associated with the `Ping`.
    pub fn data(&self) -> [u8; 8] {
        self.data
    }

    /// Returns an ACK PING frame echoing the given payload.
    pub fn ack(ping: Ping) -> Frame {
        Frame::new(0, FrameFlags::new(ACK_MASK), Payload::Ping(ping))
    }
}

impl Goaway {
    /// Creates a new `Goaway` instance with the provided error code,
    /// last stream id, and debug data.
    pub fn new(error_code: u32, last_stream_id: StreamId, debug_data: Vec<u8>) -> Self {
        Goaway {
            error_code,
            last_stream_id,
            debug_data,
        }
    }

    /// Returns a slice of the debug data.
    pub fn get_debug_data(&self) -> &[u8] {
        &self.debug_data
    }

    /// Returns the identifier of the last stream processed by the
    /// sender.
    pub fn get_last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    /// Returns the error code.
    pub fn get_error_code(&self) -> u32 {
        self.error_code
    }
}

impl WindowUpdate {
    /// Creates a new `WindowUpdate` instance with the provided window
    /// size increment.
    pub fn new(window_size_increment: u32) -> Self {
        WindowUpdate {
            window_size_increment,
        }
    }

    /// Returns the window size increment.
    pub fn get_increment(&self) -> u32 {
        self.window_size_increment
    }
}

impl Priority {
    /// Creates a new `Priority` instance.
    pub fn new(exclusive: bool, stream_dependency: u32, weight: u8) -> Self {
        Priority {
            exclusive,
            stream_dependency,
            weight,
        }
    }

    /// Returns whether the dependency is exclusive.
    pub fn get_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Returns the stream dependency.
    pub fn get_stream_dependency(&self) -> u32 {
        self.stream_dependency
    }

    /// Returns the weight of the stream.
    pub fn get_weight(&self) -> u8 {
        self.weight
    }
}

impl RstStream {
    /// Creates a new `RstStream` instance with the provided error code.
    pub fn new(error_code: u32) -> Self {
        Self { error_code }
    }

    /// Returns the error code associated with the `RstStream`.
    pub fn error_code(&self) -> u32 {
        self.error_code
    }

    /// Returns whether the error code is 0, i.e. benign stream closure.
    pub fn is_no_error(&self) -> bool {
        self.error_code == 0
    }
}

impl Unknown {
    /// Creates a new `Unknown` payload carrying the raw frame type and
    /// bytes.
    pub fn new(frame_type: u8, payload: Vec<u8>) -> Self {
        Unknown {
            frame_type,
            payload,
        }
    }

    /// Returns the raw frame type octet.
    pub fn raw_type(&self) -> u8 {
        self.frame_type
    }

    /// Returns the raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
