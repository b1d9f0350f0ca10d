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

//! The gRPC semantics layer: pseudo-headers, the per-message envelope,
//! `grpc-status` trailer handling, and the four call shapes derived
//! from one `invoke` primitive.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use grpc_wire::grpc::{decode_message, encode_message, GrpcStatus};
use grpc_wire::h2::ErrorCode;
use grpc_wire::Headers;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, ErrorKind};
use crate::stream::{Stream, StreamEvent};

/// Per-call options: an optional deadline and caller metadata merged
/// into the request headers.
#[derive(Default)]
pub struct CallOptions {
    /// Bounds every wait for a response frame. Also advertised to the
    /// server in the `grpc-timeout` header.
    pub timeout: Option<Duration>,
    /// Extra request headers, typically `authorization` and tracing
    /// fields.
    pub metadata: Vec<(String, String)>,
}

/// A gRPC channel over one HTTP/2 connection.
#[derive(Clone)]
pub struct GrpcChannel {
    conn: Connection,
    authority: String,
}

impl GrpcChannel {
    /// Connects to `addr` (a `host:port` string) over plaintext and
    /// performs the HTTP/2 handshake.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let conn = Connection::connect(addr).await?;
        Ok(Self {
            conn,
            authority: addr.to_string(),
        })
    }

    /// Measures a connection round trip with an HTTP/2 PING.
    pub async fn ping(&self) -> Result<Duration, ClientError> {
        self.conn.ping().await
    }

    /// Closes the underlying connection gracefully.
    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Unary-unary: one request message, exactly one response message.
    /// A response stream carrying zero or more than one message fails
    /// the call rather than being silently truncated.
    pub async fn unary_unary(
        &self,
        method: &str,
        request: Vec<u8>,
        options: CallOptions,
    ) -> Result<Vec<u8>, ClientError> {
        let responses = self.invoke(method, [request], options).await?;
        Self::expect_single(responses).await
    }

    /// Unary-stream: one request message, a stream of responses.
    pub async fn unary_stream(
        &self,
        method: &str,
        request: Vec<u8>,
        options: CallOptions,
    ) -> Result<ResponseStream, ClientError> {
        self.invoke(method, [request], options).await
    }

    /// Stream-unary: a stream of requests, exactly one response
    /// message.
    pub async fn stream_unary<I>(
        &self,
        method: &str,
        requests: I,
        options: CallOptions,
    ) -> Result<Vec<u8>, ClientError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let responses = self.invoke(method, requests, options).await?;
        Self::expect_single(responses).await
    }

    /// Stream-stream: bidirectional streaming.
    pub async fn stream_stream<I>(
        &self,
        method: &str,
        requests: I,
        options: CallOptions,
    ) -> Result<ResponseStream, ClientError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        self.invoke(method, requests, options).await
    }

    /// Drives a full request exchange: opens a stream, sends headers
    /// and every enveloped request message, half-closes, and returns
    /// the lazily-consumed response side.
    async fn invoke<I>(
        &self,
        method: &str,
        requests: I,
        options: CallOptions,
    ) -> Result<ResponseStream, ClientError>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        if !self.conn.is_running() {
            return Err(ClientError::new(ErrorKind::ConnectionClosed));
        }
        let stream = self.conn.create_stream();
        debug!(method, stream_id = stream.shared.id(), "starting call");

        let headers = build_request_headers(method, &self.authority, &options);
        self.conn
            .send_headers(&stream.shared, &headers, false)
            .await?;

        for request in requests {
            let envelope = encode_message(&request);
            self.conn
                .send_data(&stream.shared, &envelope, false)
                .await?;
        }
        // Half-close with an empty DATA frame.
        self.conn.send_data(&stream.shared, &[], true).await?;

        Ok(ResponseStream {
            stream,
            read_timeout: options.timeout,
            headers: None,
            trailers: None,
            finished: false,
        })
    }

    async fn expect_single(mut responses: ResponseStream) -> Result<Vec<u8>, ClientError> {
        let message = responses.next_message().await?.ok_or_else(|| {
            ClientError::from_grpc_status(
                GrpcStatus::Unknown,
                "server closed the stream without a response message".to_string(),
            )
        })?;
        if responses.next_message().await?.is_some() {
            return Err(ClientError::from_str(
                ErrorKind::Rpc,
                "unary call received more than one response message",
            ));
        }
        Ok(message)
    }
}

pub(crate) fn build_request_headers(
    method: &str,
    authority: &str,
    options: &CallOptions,
) -> Headers {
    let mut headers = Headers::new();
    headers.insert(":method", "POST");
    headers.insert(":path", method);
    headers.insert(":scheme", "http");
    headers.insert(":authority", authority);
    headers.insert("content-type", "application/grpc");
    headers.insert("te", "trailers");
    headers.insert("grpc-accept-encoding", "gzip,identity");
    if let Some(timeout) = options.timeout {
        headers.insert("grpc-timeout", &format!("{}m", timeout.as_millis()));
    }
    for (name, value) in &options.metadata {
        headers.insert(name, value);
    }
    headers
}

/// The lazily-consumed response side of a call.
///
/// Each [`ResponseStream::next_message`] call drains stream events
/// until a message, the end of the stream, or a failure. `Ok(None)`
/// means the server finished the call with `grpc-status: 0` (or, for
/// legacy peers, with no status trailer at all).
pub struct ResponseStream {
    stream: Stream,
    read_timeout: Option<Duration>,
    headers: Option<Headers>,
    trailers: Option<Headers>,
    finished: bool,
}

impl ResponseStream {
    /// The initial response headers, available once the first HEADERS
    /// frame has been consumed.
    pub fn headers(&self) -> Option<&Headers> {
        self.headers.as_ref()
    }

    /// The trailers, available once the stream has finished.
    pub fn trailers(&self) -> Option<&Headers> {
        self.trailers.as_ref()
    }

    /// Produces the next decoded response message.
    pub async fn next_message(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let event = self.read_event().await?;
            match event {
                StreamEvent::Headers { fields, end_stream } => {
                    if self.on_headers(fields, end_stream)? {
                        return Ok(None);
                    }
                }
                StreamEvent::Data { payload, end_stream } => {
                    if end_stream {
                        self.finished = true;
                    }
                    if payload.is_empty() {
                        if self.finished {
                            return Ok(None);
                        }
                        continue;
                    }
                    let message = self.decode_data(&payload)?;
                    return Ok(Some(message));
                }
                StreamEvent::Reset { code } => {
                    self.finished = true;
                    let code = ErrorCode::try_from(code).unwrap_or(ErrorCode::ProtocolError);
                    return Err(ClientError::from_grpc_status(
                        GrpcStatus::Unavailable,
                        format!("stream reset by peer: {code:?}"),
                    ));
                }
                StreamEvent::ConnectionClosed => {
                    self.finished = true;
                    return Err(ClientError::new(ErrorKind::ConnectionClosed));
                }
            }
        }
    }

    async fn read_event(&mut self) -> Result<StreamEvent, ClientError> {
        let event = match self.read_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.stream.next_event()).await {
                Ok(event) => event,
                Err(_) => {
                    self.finished = true;
                    return Err(ClientError::from_str(ErrorKind::Timeout, "deadline exceeded"));
                }
            },
            None => self.stream.next_event().await,
        };
        match event {
            Some(event) => Ok(event),
            None => {
                self.finished = true;
                Err(ClientError::new(ErrorKind::ConnectionClosed))
            }
        }
    }

    /// Classifies a HEADERS event. Returns `Ok(true)` when the frame
    /// finishes the call successfully, `Ok(false)` when reading should
    /// continue.
    fn on_headers(&mut self, fields: Headers, end_stream: bool) -> Result<bool, ClientError> {
        if self.headers.is_none() && !end_stream {
            // Initial response headers.
            self.headers = Some(fields);
            return Ok(false);
        }
        // Trailers, or a trailers-only response when no initial
        // headers preceded them.
        self.finished = true;
        let status = fields
            .get("grpc-status")
            .and_then(GrpcStatus::from_trailer_value);
        let message = fields.get("grpc-message").unwrap_or("").to_string();
        self.trailers = Some(fields);
        match status {
            // Absence of grpc-status is treated as success with no
            // further data.
            None | Some(GrpcStatus::Ok) => Ok(true),
            Some(status) => Err(ClientError::from_grpc_status(status, message)),
        }
    }

    /// Unwraps one envelope and decompresses the message if the
    /// compression flag is set.
    fn decode_data(&self, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let message = decode_message(payload)
            .map_err(|e| ClientError::from_error(ErrorKind::BodyDecode, e))?;
        if !message.compressed {
            return Ok(message.payload);
        }
        let encoding = self
            .headers
            .as_ref()
            .and_then(|headers| headers.get("grpc-encoding"))
            .unwrap_or("identity");
        match encoding {
            "gzip" => {
                let mut decoder = GzDecoder::new(message.payload.as_slice());
                let mut decompressed = Vec::new();
                decoder
                    .read_to_end(&mut decompressed)
                    .map_err(|e| ClientError::from_io_error(ErrorKind::BodyDecode, e))?;
                Ok(decompressed)
            }
            _ => Err(ClientError::from_str(
                ErrorKind::BodyDecode,
                "compressed message with an unsupported grpc-encoding",
            )),
        }
    }
}
