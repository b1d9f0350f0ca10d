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

//! HTTP/2 frame serialization and deserialization.
//!
//! [`FrameEncoder`] turns a [`Frame`] into the 9-byte frame header plus
//! payload. [`FrameDecoder`] accumulates raw transport bytes and slices
//! complete frames out of them, one at a time.

use std::convert::TryFrom;

use super::error::{ErrorCode, H2Error};
use super::frame::{
    Data, Frame, FrameFlags, Goaway, Headers, Payload, Ping, Priority, RstStream, Setting,
    Settings, StreamId, Unknown, WindowUpdate, HEADERS_PRIORITY_MASK,
};

/// The length of an HTTP/2 frame header.
pub const FRAME_HEADER_LENGTH: usize = 9;

/// The default value of SETTINGS_MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024;

/// The decoded fields of a 9-byte frame header. The frame type is kept
/// as its raw octet so unknown extension types pass through undisturbed.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct FrameHeader {
    /// Payload length in bytes (24-bit on the wire).
    pub length: usize,
    /// Raw frame type octet.
    pub frame_type: u8,
    /// Raw flags octet.
    pub flags: u8,
    /// Stream identifier with the reserved top bit masked off.
    pub stream_id: StreamId,
}

/// Decodes a 9-byte HTTP/2 frame header.
///
/// Fails with a `FrameSizeError` connection error when fewer than 9
/// bytes are supplied. The frame type is not validated against the
/// known enumeration.
pub fn decode_frame_header(buf: &[u8]) -> Result<FrameHeader, H2Error> {
    if buf.len() < FRAME_HEADER_LENGTH {
        return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
    }
    let length = ((buf[0] as usize) << 16) | ((buf[1] as usize) << 8) | (buf[2] as usize);
    let stream_id =
        u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
    Ok(FrameHeader {
        length,
        frame_type: buf[3],
        flags: buf[4],
        stream_id,
    })
}

/// Frame serializer. Stateless apart from nothing at all; kept as a
/// struct so the write side mirrors the read side.
pub struct FrameEncoder;

impl FrameEncoder {
    /// Serializes a frame into the 9-byte header followed by the
    /// payload bytes. Fails when the payload exceeds the 24-bit length
    /// field.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, H2Error> {
        let payload = Self::encode_payload(frame.payload())?;
        if payload.len() > 0xff_ffff {
            return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
        }
        let mut buf = Vec::with_capacity(FRAME_HEADER_LENGTH + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes()[1..]);
        buf.push(frame_type_octet(frame.payload()));
        buf.push(frame.flags().bits());
        buf.extend_from_slice(&(frame.stream_id() & 0x7fff_ffff).to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    fn encode_payload(payload: &Payload) -> Result<Vec<u8>, H2Error> {
        let bytes = match payload {
            Payload::Data(data) => data.data().to_vec(),
            Payload::Headers(headers) => headers.block().to_vec(),
            Payload::Priority(priority) => {
                let mut dependency = priority.get_stream_dependency() & 0x7fff_ffff;
                if priority.get_exclusive() {
                    dependency |= 0x8000_0000;
                }
                let mut buf = dependency.to_be_bytes().to_vec();
                buf.push(priority.get_weight());
                buf
            }
            Payload::RstStream(reset) => reset.error_code().to_be_bytes().to_vec(),
            Payload::Settings(settings) => {
                let mut buf = Vec::with_capacity(settings.encoded_len());
                for setting in settings.get_settings() {
                    buf.extend_from_slice(&setting.setting_identifier().to_be_bytes());
                    buf.extend_from_slice(&setting.value().to_be_bytes());
                }
                buf
            }
            Payload::Ping(ping) => ping.data().to_vec(),
            Payload::Goaway(goaway) => {
                let mut buf = (goaway.get_last_stream_id() & 0x7fff_ffff)
                    .to_be_bytes()
                    .to_vec();
                buf.extend_from_slice(&goaway.get_error_code().to_be_bytes());
                buf.extend_from_slice(goaway.get_debug_data());
                buf
            }
            Payload::WindowUpdate(update) => {
                (update.get_increment() & 0x7fff_ffff).to_be_bytes().to_vec()
            }
            Payload::Unknown(unknown) => unknown.payload().to_vec(),
        };
        Ok(bytes)
    }
}

fn frame_type_octet(payload: &Payload) -> u8 {
    match payload {
        Payload::Data(_) => 0x0,
        Payload::Headers(_) => 0x1,
        Payload::Priority(_) => 0x2,
        Payload::RstStream(_) => 0x3,
        Payload::Settings(_) => 0x4,
        Payload::Ping(_) => 0x6,
        Payload::Goaway(_) => 0x7,
        Payload::WindowUpdate(_) => 0x8,
        Payload::Unknown(unknown) => unknown.raw_type(),
    }
}

/// Incremental frame deserializer.
///
/// Callers feed it transport reads of arbitrary size through
/// [`FrameDecoder::push`] and drain complete frames through
/// [`FrameDecoder::next_frame`]. Bytes belonging to an incomplete frame
/// stay buffered until the rest arrives.
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_size: u32,
}

impl FrameDecoder {
    /// Creates a decoder that rejects frames longer than
    /// `max_frame_size`.
    pub fn new(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
        }
    }

    /// Updates the frame size limit, from a SETTINGS_MAX_FRAME_SIZE the
    /// local endpoint advertised.
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// Appends raw transport bytes to the accumulation buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Slices the next complete frame out of the buffer. Returns
    /// `Ok(None)` when the buffered bytes do not yet contain a full
    /// frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, H2Error> {
        if self.buffer.len() < FRAME_HEADER_LENGTH {
            return Ok(None);
        }
        let header = decode_frame_header(&self.buffer)?;
        if header.length > self.max_frame_size as usize {
            return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
        }
        let total = FRAME_HEADER_LENGTH + header.length;
        if self.buffer.len() < total {
            return Ok(None);
        }
        let payload: Vec<u8> = self
            .buffer
            .drain(..total)
            .skip(FRAME_HEADER_LENGTH)
            .collect();
        Self::decode_payload(header, payload)
    }

    fn decode_payload(header: FrameHeader, payload: Vec<u8>) -> Result<Option<Frame>, H2Error> {
        let flags = FrameFlags::new(header.flags);
        let payload = match header.frame_type {
            0x0 => {
                if header.stream_id == 0 {
                    return Err(H2Error::ConnectionError(ErrorCode::ProtocolError));
                }
                Payload::Data(Data::new(strip_padding(&flags, payload)?))
            }
            0x1 => {
                if header.stream_id == 0 {
                    return Err(H2Error::ConnectionError(ErrorCode::ProtocolError));
                }
                let mut block = strip_padding(&flags, payload)?;
                if header.flags & HEADERS_PRIORITY_MASK == HEADERS_PRIORITY_MASK {
                    if block.len() < 5 {
                        return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                    }
                    block.drain(..5);
                }
                Payload::Headers(Headers::new(block))
            }
            0x2 => {
                if payload.len() != 5 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                let word = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Payload::Priority(Priority::new(
                    word & 0x8000_0000 != 0,
                    word & 0x7fff_ffff,
                    payload[4],
                ))
            }
            0x3 => {
                if payload.len() != 4 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Payload::RstStream(RstStream::new(code))
            }
            0x4 => {
                if header.stream_id != 0 {
                    return Err(H2Error::ConnectionError(ErrorCode::ProtocolError));
                }
                if payload.len() % 6 != 0 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                Payload::Settings(decode_settings(&payload)?)
            }
            0x6 => {
                if payload.len() != 8 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(&payload);
                Payload::Ping(Ping::new(data))
            }
            0x7 => {
                if payload.len() < 8 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                let last_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                    & 0x7fff_ffff;
                let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
                Payload::Goaway(Goaway::new(code, last_id, payload[8..].to_vec()))
            }
            0x8 => {
                if payload.len() != 4 {
                    return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
                }
                let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                    & 0x7fff_ffff;
                Payload::WindowUpdate(WindowUpdate::new(increment))
            }
            other => Payload::Unknown(Unknown::new(other, payload)),
        };
        Ok(Some(Frame::new(header.stream_id, flags, payload)))
    }
}

fn strip_padding(flags: &FrameFlags, mut payload: Vec<u8>) -> Result<Vec<u8>, H2Error> {
    if !flags.is_padded() {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(H2Error::ConnectionError(ErrorCode::FrameSizeError));
    }
    let pad_length = payload[0] as usize;
    if pad_length >= payload.len() {
        return Err(H2Error::ConnectionError(ErrorCode::ProtocolError));
    }
    payload.truncate(payload.len() - pad_length);
    payload.remove(0);
    Ok(payload)
}

fn decode_settings(payload: &[u8]) -> Result<Settings, H2Error> {
    let mut settings = Vec::with_capacity(payload.len() / 6);
    for pair in payload.chunks_exact(6) {
        let id = u16::from_be_bytes([pair[0], pair[1]]);
        let value = u32::from_be_bytes([pair[2], pair[3], pair[4], pair[5]]);
        let setting = match id {
            0x01 => Setting::HeaderTableSize(value),
            0x02 => match value {
                0 => Setting::EnablePush(false),
                1 => Setting::EnablePush(true),
                _ => return Err(H2Error::ConnectionError(ErrorCode::ProtocolError)),
            },
            0x03 => Setting::MaxConcurrentStreams(value),
            0x04 => {
                if value > 0x7fff_ffff {
                    return Err(H2Error::ConnectionError(ErrorCode::FlowControlError));
                }
                Setting::InitialWindowSize(value)
            }
            0x05 => {
                if !(0x4000..=0xff_ffff).contains(&value) {
                    return Err(H2Error::ConnectionError(ErrorCode::ProtocolError));
                }
                Setting::MaxFrameSize(value)
            }
            0x06 => Setting::MaxHeaderListSize(value),
            // Unknown identifiers must be ignored.
            _ => continue,
        };
        settings.push(setting);
    }
    Ok(Settings::new(settings))
}

impl TryFrom<u8> for super::frame::FrameType {
    type Error = H2Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use super::frame::FrameType;
        let frame_type = match value {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::Goaway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            _ => return Err(H2Error::ConnectionError(ErrorCode::ProtocolError)),
        };
        Ok(frame_type)
    }
}

#[cfg(test)]
mod ut_codec {
    use super::*;
    use crate::h2::frame::{FrameType, SettingsBuilder};

    /// UT test cases for `decode_frame_header`.
    ///
    /// # Brief
    /// 1. Decodes a valid 9-byte frame header.
    /// 2. Checks length, type, flags and masked stream id.
    /// 3. Decodes a buffer shorter than 9 bytes and checks the error.
    #[test]
    fn ut_decode_frame_header() {
        let bytes = [0x00, 0x00, 0x08, 0x06, 0x01, 0x80, 0x00, 0x00, 0x00];
        let header = decode_frame_header(&bytes).unwrap();
        assert_eq!(header.length, 8);
        assert_eq!(header.frame_type, 0x06);
        assert_eq!(header.flags, 0x01);
        // The reserved top bit of the stream id is masked off.
        assert_eq!(header.stream_id, 0);

        let short = [0x00, 0x00, 0x08, 0x06];
        assert_eq!(
            decode_frame_header(&short),
            Err(H2Error::ConnectionError(ErrorCode::FrameSizeError))
        );
    }

    /// UT test cases for frame round-trips through `FrameEncoder` and
    /// `FrameDecoder`.
    ///
    /// # Brief
    /// 1. Encodes a DATA frame with END_STREAM set.
    /// 2. Feeds the bytes to a `FrameDecoder` in two pieces.
    /// 3. Checks that no frame is produced before the payload is
    ///    complete and exactly one after.
    #[test]
    fn ut_data_frame_round_trip() {
        let frame = Frame::new(
            1,
            FrameFlags::new(0x01),
            Payload::Data(Data::new(b"hello".to_vec())),
        );
        let bytes = FrameEncoder::encode(&frame).unwrap();
        assert_eq!(bytes.len(), FRAME_HEADER_LENGTH + 5);

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&bytes[..10]);
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.push(&bytes[10..]);
        let decoded = decoder.next_frame().unwrap().unwrap();
        assert_eq!(decoded.stream_id(), 1);
        assert!(decoded.flags().is_end_stream());
        match decoded.payload() {
            Payload::Data(data) => assert_eq!(data.data(), b"hello"),
            _ => panic!("wrong payload type"),
        }
        assert!(decoder.next_frame().unwrap().is_none());
    }

    /// UT test cases for SETTINGS frame decoding.
    ///
    /// # Brief
    /// 1. Encodes a SETTINGS frame with several settings.
    /// 2. Decodes it and checks the settings list survives.
    /// 3. Decodes a SETTINGS frame whose length is not a multiple of 6
    ///    and checks the error.
    #[test]
    fn ut_settings_round_trip() {
        let settings = SettingsBuilder::new()
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build();
        let frame = Frame::new(0, FrameFlags::empty(), Payload::Settings(settings));
        let bytes = FrameEncoder::encode(&frame).unwrap();

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&bytes);
        let decoded = decoder.next_frame().unwrap().unwrap();
        match decoded.payload() {
            Payload::Settings(settings) => {
                assert_eq!(
                    settings.get_settings(),
                    &[
                        Setting::InitialWindowSize(65535),
                        Setting::MaxFrameSize(16384)
                    ]
                );
            }
            _ => panic!("wrong payload type"),
        }

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&[0x00, 0x00, 0x05, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);
        decoder.push(&[0u8; 5]);
        assert_eq!(
            decoder.next_frame(),
            Err(H2Error::ConnectionError(ErrorCode::FrameSizeError))
        );
    }

    /// UT test cases for padded DATA frame decoding.
    ///
    /// # Brief
    /// 1. Builds a padded DATA frame by hand.
    /// 2. Checks that the decoder strips the pad length octet and the
    ///    trailing padding.
    /// 3. Builds a frame whose pad length covers the whole payload and
    ///    checks the error.
    #[test]
    fn ut_padded_data() {
        let mut bytes = vec![0x00, 0x00, 0x08, 0x00, 0x08, 0x00, 0x00, 0x00, 0x03];
        bytes.extend_from_slice(&[0x02, b'h', b'i', b'y', b'a', b'!', 0x00, 0x00]);
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&bytes);
        let decoded = decoder.next_frame().unwrap().unwrap();
        match decoded.payload() {
            Payload::Data(data) => assert_eq!(data.data(), b"hiya!"),
            _ => panic!("wrong payload type"),
        }

        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&[0x00, 0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0x00, 0x03]);
        decoder.push(&[0x05, 0x00]);
        assert_eq!(
            decoder.next_frame(),
            Err(H2Error::ConnectionError(ErrorCode::ProtocolError))
        );
    }

    /// UT test cases for frames exceeding the advertised max frame
    /// size.
    ///
    /// # Brief
    /// 1. Creates a decoder with a small frame size limit.
    /// 2. Feeds a frame header announcing a longer payload.
    /// 3. Checks the `FrameSizeError` connection error.
    #[test]
    fn ut_oversized_frame() {
        let mut decoder = FrameDecoder::new(16);
        decoder.push(&[0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            decoder.next_frame(),
            Err(H2Error::ConnectionError(ErrorCode::FrameSizeError))
        );
    }

    /// UT test cases for unknown frame type passthrough.
    ///
    /// # Brief
    /// 1. Feeds a frame with an extension type octet.
    /// 2. Checks the payload is surfaced verbatim as `Unknown`.
    #[test]
    fn ut_unknown_frame_type() {
        let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE);
        decoder.push(&[0x00, 0x00, 0x02, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00]);
        decoder.push(&[0xde, 0xad]);
        let decoded = decoder.next_frame().unwrap().unwrap();
        match decoded.payload() {
            Payload::Unknown(unknown) => {
                assert_eq!(unknown.raw_type(), 0x0a);
                assert_eq!(unknown.payload(), &[0xde, 0xad]);
            }
            _ => panic!("wrong payload type"),
        }
    }

    /// UT test cases for `FrameType::try_from`.
    ///
    /// # Brief
    /// 1. Converts every defined frame type octet.
    /// 2. Converts an extension octet and checks the error.
    #[test]
    fn ut_frame_type_try_from() {
        assert_eq!(FrameType::try_from(0x0).unwrap(), FrameType::Data);
        assert_eq!(FrameType::try_from(0x9).unwrap(), FrameType::Continuation);
        assert!(FrameType::try_from(0x0a).is_err());
    }
}
