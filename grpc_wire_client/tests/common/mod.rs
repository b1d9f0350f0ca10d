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

//! A scripted HTTP/2 server for exercising the client end to end over
//! a real socket. Each test accepts one connection, performs the
//! preface exchange, and then plays its own frame script.

#![allow(dead_code)]

use grpc_wire::grpc::encode_message;
use grpc_wire::h2::{
    Data, Frame, FrameDecoder, FrameEncoder, FrameFlags, HeadersPayload, Payload, Settings,
    SettingsBuilder, StreamId, DEFAULT_MAX_FRAME_SIZE,
};
use grpc_wire::{h2::hpack, Headers};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockServer {
    socket: TcpStream,
    decoder: FrameDecoder,
}

/// Binds a listener on an ephemeral port and returns it with its
/// `host:port` address.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

impl MockServer {
    /// Accepts one connection and performs the server side of the
    /// preface exchange: consumes the 24-byte preface, sends the
    /// server SETTINGS, and acks the client SETTINGS once it arrives.
    pub async fn accept(listener: &TcpListener) -> Self {
        let (socket, _) = listener.accept().await.unwrap();
        let mut server = Self {
            socket,
            decoder: FrameDecoder::new(DEFAULT_MAX_FRAME_SIZE),
        };

        let mut preface = [0u8; 24];
        server.socket.read_exact(&mut preface).await.unwrap();
        assert_eq!(&preface, grpc_wire::h2::CONNECTION_PREFACE);

        let settings = SettingsBuilder::new()
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build();
        server
            .send_frame(Frame::new(0, FrameFlags::empty(), Payload::Settings(settings)))
            .await;

        let frame = server.recv_frame().await;
        assert!(matches!(frame.payload(), Payload::Settings(_)));
        assert!(!frame.flags().is_ack());
        server.send_frame(Settings::ack()).await;
        server
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        let bytes = FrameEncoder::encode(&frame).unwrap();
        self.socket.write_all(&bytes).await.unwrap();
    }

    pub async fn recv_frame(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.decoder.next_frame().unwrap() {
                return frame;
            }
            let mut buf = [0u8; 4096];
            let n = self.socket.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "client closed the connection mid-script");
            self.decoder.push(&buf[..n]);
        }
    }

    /// Reads frames until the client half-closes the request stream,
    /// returning the decoded request headers and the concatenated DATA
    /// payloads. Control frames (settings acks, window updates, pings)
    /// are answered or skipped.
    pub async fn recv_request(&mut self) -> (StreamId, Headers, Vec<u8>) {
        let mut stream_id = 0;
        let mut headers = Headers::new();
        let mut body = Vec::new();
        loop {
            let frame = self.recv_frame().await;
            match frame.payload() {
                Payload::Headers(payload) => {
                    stream_id = frame.stream_id();
                    headers = hpack::decode_headers(payload.block()).unwrap();
                    if frame.flags().is_end_stream() {
                        return (stream_id, headers, body);
                    }
                }
                Payload::Data(data) => {
                    stream_id = frame.stream_id();
                    body.extend_from_slice(data.data());
                    if frame.flags().is_end_stream() {
                        return (stream_id, headers, body);
                    }
                }
                Payload::Ping(ping) => {
                    let ping = ping.clone();
                    self.send_frame(grpc_wire::h2::Ping::ack(ping)).await;
                }
                _ => {}
            }
        }
    }

    /// Sends a HEADERS frame built from `(name, value)` pairs.
    pub async fn send_headers(
        &mut self,
        stream_id: StreamId,
        fields: &[(&str, &str)],
        end_stream: bool,
    ) {
        let headers: Headers = fields.iter().copied().collect();
        let block = hpack::encode_headers(&headers);
        let mut flags = FrameFlags::empty();
        flags.set_end_headers(true);
        flags.set_end_stream(end_stream);
        self.send_frame(Frame::new(
            stream_id,
            flags,
            Payload::Headers(HeadersPayload::new(block)),
        ))
        .await;
    }

    /// Sends one gRPC-enveloped message as a DATA frame.
    pub async fn send_message(&mut self, stream_id: StreamId, message: &[u8]) {
        self.send_frame(Frame::new(
            stream_id,
            FrameFlags::empty(),
            Payload::Data(Data::new(encode_message(message))),
        ))
        .await;
    }

    /// Sends the standard response tail: a trailers HEADERS frame with
    /// the given `grpc-status` and END_STREAM set.
    pub async fn send_trailers(&mut self, stream_id: StreamId, status: u32) {
        let status = status.to_string();
        self.send_headers(stream_id, &[("grpc-status", status.as_str())], true)
            .await;
    }
}
