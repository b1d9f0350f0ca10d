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

//! The HTTP/2 connection: socket ownership, the preface exchange, and
//! the background receive loop that demultiplexes inbound frames to
//! streams or to connection-level handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use grpc_wire::h2::{
    hpack, Data, ErrorCode, Frame, FrameDecoder, FrameEncoder, FrameFlags, Goaway, H2Error,
    Payload, Ping, Settings, StreamId, WindowUpdate, CONNECTION_PREFACE,
    DEFAULT_INITIAL_WINDOW_SIZE,
};
use grpc_wire::Headers;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, trace, warn};

use crate::error::{ClientError, ErrorKind};
use crate::settings::{ConnSettings, PING_TIMEOUT, SETTINGS_HANDSHAKE_TIMEOUT};
use crate::stream::{Stream, StreamEvent, StreamShared, StreamStore};
use crate::window::{RecvWindow, SendWindow};

/// A plaintext HTTP/2 connection with a dedicated receive task.
///
/// Cheap to clone; all clones drive the same socket. Frames from
/// different streams never interleave mid-write because every write
/// goes through one lock.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

pub(crate) struct ConnInner {
    writer: Mutex<OwnedWriteHalf>,
    streams: StdMutex<StreamStore>,
    /// Settings advertised by this endpoint; fixed after the preface.
    local_settings: ConnSettings,
    /// Settings the peer has advertised so far.
    peer_settings: StdMutex<ConnSettings>,
    conn_send_window: SendWindow,
    conn_recv_window: RecvWindow,
    running: AtomicBool,
    ping_counter: AtomicU64,
    pings: StdMutex<HashMap<[u8; 8], oneshot::Sender<()>>>,
    ready: StdMutex<Option<oneshot::Sender<()>>>,
}

impl Connection {
    /// Opens a TCP connection to `addr`, writes the connection preface
    /// and the local SETTINGS frame, starts the receive loop, and
    /// resolves once the peer's first SETTINGS frame arrives.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::from_io_error(ErrorKind::Connect, e))?;
        let (reader, mut writer) = stream.into_split();

        let local_settings = ConnSettings::default();
        writer
            .write_all(CONNECTION_PREFACE)
            .await
            .map_err(|e| ClientError::from_io_error(ErrorKind::Connect, e))?;
        let settings_frame = FrameEncoder::encode(&local_settings.to_frame())
            .map_err(|e| ClientError::from_h2_error(ErrorKind::Connect, e))?;
        writer
            .write_all(&settings_frame)
            .await
            .map_err(|e| ClientError::from_io_error(ErrorKind::Connect, e))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let inner = Arc::new(ConnInner {
            writer: Mutex::new(writer),
            streams: StdMutex::new(StreamStore::new()),
            local_settings,
            peer_settings: StdMutex::new(ConnSettings::default()),
            conn_send_window: SendWindow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            conn_recv_window: RecvWindow::new(DEFAULT_INITIAL_WINDOW_SIZE),
            running: AtomicBool::new(true),
            ping_counter: AtomicU64::new(1),
            pings: StdMutex::new(HashMap::new()),
            ready: StdMutex::new(Some(ready_tx)),
        });

        tokio::spawn(recv_loop(Arc::clone(&inner), reader));

        match tokio::time::timeout(SETTINGS_HANDSHAKE_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                debug!(addr, "h2 connection established");
                Ok(Self { inner })
            }
            Ok(Err(_)) => Err(ClientError::from_str(
                ErrorKind::Connect,
                "connection closed before the server sent its settings",
            )),
            Err(_) => {
                inner.teardown().await;
                Err(ClientError::from_str(
                    ErrorKind::Connect,
                    "timed out waiting for the server settings",
                ))
            }
        }
    }

    /// Whether the receive loop is still alive.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    /// Measures a round trip by sending a PING and waiting for the ack
    /// that echoes the same token. Acks for other tokens do not
    /// satisfy the wait.
    pub async fn ping(&self) -> Result<Duration, ClientError> {
        if !self.is_running() {
            return Err(ClientError::new(ErrorKind::ConnectionClosed));
        }
        let counter = self.inner.ping_counter.fetch_add(1, Ordering::Relaxed);
        let token = counter.to_be_bytes();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner.pings.lock().unwrap().insert(token, ack_tx);

        let start = Instant::now();
        let frame = Frame::new(0, FrameFlags::empty(), Payload::Ping(Ping::new(token)));
        if let Err(err) = self.inner.send_frame(&frame).await {
            self.inner.pings.lock().unwrap().remove(&token);
            return Err(err);
        }

        match tokio::time::timeout(PING_TIMEOUT, ack_rx).await {
            Ok(Ok(())) => Ok(start.elapsed()),
            Ok(Err(_)) => Err(ClientError::new(ErrorKind::ConnectionClosed)),
            Err(_) => {
                self.inner.pings.lock().unwrap().remove(&token);
                Err(ClientError::from_str(ErrorKind::Timeout, "ping ack"))
            }
        }
    }

    /// Stops the receive loop, advertises the highest allocated stream
    /// id in a GOAWAY, and closes the socket.
    pub async fn close(&self) {
        if !self.inner.running.swap(false, Ordering::Relaxed) {
            return;
        }
        let last_id = self.inner.streams.lock().unwrap().last_allocated_id();
        let goaway = Frame::new(
            0,
            FrameFlags::empty(),
            Payload::Goaway(Goaway::new(ErrorCode::NoError.into_code(), last_id, vec![])),
        );
        if let Err(err) = self.inner.send_frame(&goaway).await {
            debug!("goaway not delivered: {err}");
        }
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        drop(writer);
        self.inner.fail_pending();
    }

    /// Allocates the next client stream, seeding its send window from
    /// the peer's initial-window-size setting.
    pub(crate) fn create_stream(&self) -> Stream {
        let send_window = self.inner.peer_settings.lock().unwrap().initial_window_size;
        let recv_window = self.inner.local_settings.initial_window_size;
        self.inner
            .streams
            .lock()
            .unwrap()
            .create_stream(send_window, recv_window)
    }

    /// Encodes `headers` and sends them as a HEADERS frame with
    /// END_HEADERS set and END_STREAM per `end_stream`.
    pub(crate) async fn send_headers(
        &self,
        stream: &StreamShared,
        headers: &Headers,
        end_stream: bool,
    ) -> Result<(), ClientError> {
        let block = hpack::encode_headers(headers);
        let mut flags = FrameFlags::empty();
        flags.set_end_headers(true);
        flags.set_end_stream(end_stream);
        let frame = Frame::new(
            stream.id(),
            flags,
            Payload::Headers(grpc_wire::h2::HeadersPayload::new(block)),
        );
        self.inner.send_frame(&frame).await?;
        stream.on_send(end_stream);
        Ok(())
    }

    /// Sends a payload as DATA frames, splitting it into chunks no
    /// larger than the peer's max frame size and suspending until the
    /// stream and connection windows admit each chunk. END_STREAM is
    /// applied only to the final chunk.
    pub(crate) async fn send_data(
        &self,
        stream: &StreamShared,
        payload: &[u8],
        end_stream: bool,
    ) -> Result<(), ClientError> {
        if payload.is_empty() {
            return self.send_data_chunk(stream, &[], end_stream).await;
        }
        let max_frame_size = self.inner.peer_settings.lock().unwrap().max_frame_size as usize;
        let mut chunks = payload.chunks(max_frame_size).peekable();
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            self.acquire_send_credit(stream, chunk.len() as u32).await?;
            self.send_data_chunk(stream, chunk, end_stream && last)
                .await?;
        }
        Ok(())
    }

    /// Suspends until both the stream window and the connection window
    /// admit `size` bytes. Wakes with an error if the connection dies
    /// while waiting.
    async fn acquire_send_credit(
        &self,
        stream: &StreamShared,
        size: u32,
    ) -> Result<(), ClientError> {
        self.wait_window(&stream.send_window, size).await?;
        self.wait_window(&self.inner.conn_send_window, size).await
    }

    async fn wait_window(&self, window: &SendWindow, size: u32) -> Result<(), ClientError> {
        loop {
            if !self.is_running() {
                return Err(ClientError::new(ErrorKind::ConnectionClosed));
            }
            let replenished = window.notified();
            if window.try_consume(size) {
                return Ok(());
            }
            trace!(size, "sender suspended on flow control");
            replenished.await;
        }
    }

    async fn send_data_chunk(
        &self,
        stream: &StreamShared,
        chunk: &[u8],
        end_stream: bool,
    ) -> Result<(), ClientError> {
        let mut flags = FrameFlags::empty();
        flags.set_end_stream(end_stream);
        let frame = Frame::new(stream.id(), flags, Payload::Data(Data::new(chunk.to_vec())));
        self.inner.send_frame(&frame).await?;
        stream.on_send(end_stream);
        Ok(())
    }
}

impl ConnInner {
    /// Serializes a frame and writes it under the connection-wide
    /// write lock.
    async fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        let bytes = FrameEncoder::encode(frame)
            .map_err(|e| ClientError::from_h2_error(ErrorKind::Request, e))?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| ClientError::from_io_error(ErrorKind::Request, e))
    }

    /// Drops the handshake signal and every outstanding ping waiter.
    fn fail_pending(&self) {
        self.ready.lock().unwrap().take();
        self.pings.lock().unwrap().clear();
    }

    /// Marks the connection dead and unblocks everything waiting on
    /// it: stream readers get a `ConnectionClosed` event, suspended
    /// senders wake to observe the cleared running flag.
    async fn teardown(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.fail_pending();
        let streams = self.streams.lock().unwrap().take_all();
        for stream in streams {
            stream.push_event(StreamEvent::ConnectionClosed);
            stream.send_window.wake_all();
        }
        self.conn_send_window.wake_all();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    /// Handles one inbound frame. Returns `false` when the receive
    /// loop should stop.
    async fn dispatch(&self, frame: Frame) -> Result<bool, H2Error> {
        match frame.payload() {
            Payload::Settings(settings) => self.on_settings(settings, frame.flags()).await?,
            Payload::Ping(ping) => self.on_ping(ping, frame.flags()).await?,
            Payload::WindowUpdate(update) => {
                self.on_window_update(frame.stream_id(), update.get_increment())?
            }
            Payload::Goaway(goaway) => {
                warn!(
                    last_stream_id = goaway.get_last_stream_id(),
                    error_code = goaway.get_error_code(),
                    debug_data = %String::from_utf8_lossy(goaway.get_debug_data()),
                    "received goaway"
                );
                return Ok(false);
            }
            Payload::RstStream(reset) => self.on_rst_stream(frame.stream_id(), reset.error_code()),
            Payload::Headers(headers) => {
                self.on_headers(
                    frame.stream_id(),
                    headers.block(),
                    frame.flags().is_end_stream(),
                )?;
            }
            Payload::Data(data) => {
                self.on_data(frame.stream_id(), data.data(), frame.flags().is_end_stream())
                    .await?;
            }
            Payload::Priority(_) | Payload::Unknown(_) => {
                trace!(
                    stream_id = frame.stream_id(),
                    "ignoring frame type this client does not consume"
                );
            }
        }
        Ok(true)
    }

    async fn on_settings(&self, settings: &Settings, flags: &FrameFlags) -> Result<(), H2Error> {
        if flags.is_ack() {
            trace!("settings acknowledged by peer");
            return Ok(());
        }
        self.peer_settings.lock().unwrap().update(settings);
        debug!(settings = ?self.peer_settings.lock().unwrap(), "merged peer settings");
        // Connection-ready is the peer's first SETTINGS, not a delay.
        if let Some(ready) = self.ready.lock().unwrap().take() {
            let _ = ready.send(());
        }
        self.send_frame(&Settings::ack())
            .await
            .map_err(|_| H2Error::ConnectionError(ErrorCode::InternalError))
    }

    async fn on_ping(&self, ping: &Ping, flags: &FrameFlags) -> Result<(), H2Error> {
        if flags.is_ack() {
            match self.pings.lock().unwrap().remove(&ping.data()) {
                Some(waiter) => {
                    let _ = waiter.send(());
                }
                None => debug!("dropping ping ack with no matching waiter"),
            }
            return Ok(());
        }
        self.send_frame(&Ping::ack(ping.clone()))
            .await
            .map_err(|_| H2Error::ConnectionError(ErrorCode::InternalError))
    }

    fn on_window_update(&self, stream_id: StreamId, increment: u32) -> Result<(), H2Error> {
        if stream_id == 0 {
            self.conn_send_window.update(increment)?;
            return Ok(());
        }
        match self.streams.lock().unwrap().get(stream_id) {
            Some(stream) => stream.send_window.update(increment)?,
            None => trace!(stream_id, "window update for unknown stream"),
        }
        Ok(())
    }

    fn on_rst_stream(&self, stream_id: StreamId, error_code: u32) {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.get(stream_id);
        streams.evict(stream_id);
        drop(streams);
        match stream {
            Some(stream) if error_code != 0 => {
                debug!(stream_id, error_code, "stream reset by peer");
                stream.push_event(StreamEvent::Reset { code: error_code });
            }
            Some(_) => debug!(stream_id, "stream closed by peer without error"),
            None => trace!(stream_id, "reset for unknown stream"),
        }
    }

    fn on_headers(
        &self,
        stream_id: StreamId,
        block: &[u8],
        end_stream: bool,
    ) -> Result<(), H2Error> {
        let stream = self.resolve_stream(stream_id);
        let Some(stream) = stream else {
            trace!(stream_id, "headers for unknown stream");
            return Ok(());
        };
        let fields = hpack::decode_headers(block)?;
        trace!(stream_id, end_stream, count = fields.len(), "headers received");
        stream.push_event(StreamEvent::Headers { fields, end_stream });
        if stream.end_stream_received() {
            self.streams.lock().unwrap().evict(stream_id);
        }
        Ok(())
    }

    async fn on_data(
        &self,
        stream_id: StreamId,
        payload: &[u8],
        end_stream: bool,
    ) -> Result<(), H2Error> {
        let stream = self.resolve_stream(stream_id);
        let Some(stream) = stream else {
            trace!(stream_id, "data for unknown stream");
            return Ok(());
        };
        let size = payload.len() as u32;
        if size > 0 {
            // Both the connection-level and stream-level receive
            // windows are debited by every DATA payload.
            if let Some(increment) = self.conn_recv_window.recv_data(size) {
                self.send_window_update(0, increment).await?;
            }
            if let Some(increment) = stream.recv_window.recv_data(size) {
                if !end_stream {
                    self.send_window_update(stream_id, increment).await?;
                }
            }
        }
        stream.push_event(StreamEvent::Data {
            payload: payload.to_vec(),
            end_stream,
        });
        if stream.end_stream_received() {
            self.streams.lock().unwrap().evict(stream_id);
        }
        Ok(())
    }

    async fn send_window_update(&self, stream_id: StreamId, increment: u32) -> Result<(), H2Error> {
        trace!(stream_id, increment, "replenishing receive window");
        let frame = Frame::new(
            stream_id,
            FrameFlags::empty(),
            Payload::WindowUpdate(WindowUpdate::new(increment)),
        );
        self.send_frame(&frame)
            .await
            .map_err(|_| H2Error::ConnectionError(ErrorCode::InternalError))
    }

    /// Looks up the target stream, lazily registering server-initiated
    /// (even id) streams the first time a frame mentions them.
    fn resolve_stream(&self, stream_id: StreamId) -> Option<Arc<StreamShared>> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(stream) = streams.get(stream_id) {
            return Some(stream);
        }
        if stream_id % 2 == 0 && stream_id != 0 {
            let send_window = self.peer_settings.lock().unwrap().initial_window_size;
            let recv_window = self.local_settings.initial_window_size;
            return Some(streams.register_remote(stream_id, send_window, recv_window));
        }
        None
    }
}

/// The background receive loop: reads transport chunks, slices frames
/// out of them, and dispatches each one. Exits on EOF, read errors,
/// GOAWAY, protocol errors, or the running flag clearing.
async fn recv_loop(inner: Arc<ConnInner>, mut reader: OwnedReadHalf) {
    let mut decoder = FrameDecoder::new(inner.local_settings.max_frame_size);
    let mut buf = vec![0u8; 16 * 1024];
    'outer: while inner.running.load(Ordering::Relaxed) {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                break;
            }
            Ok(n) => decoder.push(&buf[..n]),
            Err(err) => {
                if inner.running.load(Ordering::Relaxed) {
                    warn!("read failed: {err}");
                }
                break;
            }
        }
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => match inner.dispatch(frame).await {
                    Ok(true) => {}
                    Ok(false) => break 'outer,
                    Err(err) => {
                        error!("frame dispatch failed: {err}");
                        break 'outer;
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    error!("frame decoding failed: {err}");
                    break 'outer;
                }
            }
        }
    }
    inner.teardown().await;
}
