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

//! Per-call stream state.
//!
//! A stream is one logical request/response exchange. The receive loop
//! demultiplexes inbound frames into [`StreamEvent`]s pushed onto the
//! stream's queue; the RPC layer drains the queue from the caller's
//! task. The local lifecycle is tracked as a simplified state machine
//! driven by the sending side; remote completion is observed through
//! the `end_stream_received` latch and the events themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use grpc_wire::h2::StreamId;
use grpc_wire::Headers;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::window::{RecvWindow, SendWindow};

/// An inbound frame, decoded and demultiplexed for one stream.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    /// A HEADERS frame, already run through the HPACK decoder.
    Headers {
        fields: Headers,
        end_stream: bool,
    },
    /// A DATA frame's payload.
    Data {
        payload: Vec<u8>,
        end_stream: bool,
    },
    /// An RST_STREAM with a nonzero error code.
    Reset { code: u32 },
    /// The receive loop exited; nothing further will arrive on this
    /// stream.
    ConnectionClosed,
}

/// Simplified stream states, tracked for the local (sending) side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// Stream state shared between the receive loop and the caller's task.
pub(crate) struct StreamShared {
    id: StreamId,
    state: Mutex<StreamState>,
    pub(crate) send_window: SendWindow,
    pub(crate) recv_window: RecvWindow,
    events: UnboundedSender<StreamEvent>,
    end_stream_received: AtomicBool,
}

impl StreamShared {
    /// Returns the stream identifier.
    pub(crate) fn id(&self) -> StreamId {
        self.id
    }

    /// Records the local side sending a frame, driving
    /// `IDLE -> OPEN -> HALF_CLOSED_LOCAL`.
    pub(crate) fn on_send(&self, end_stream: bool) {
        let mut state = self.state.lock().unwrap();
        *state = match (*state, end_stream) {
            (StreamState::Idle, false) => StreamState::Open,
            (StreamState::Idle, true) | (StreamState::Open, true) => StreamState::HalfClosedLocal,
            (StreamState::HalfClosedRemote, true) => StreamState::Closed,
            (current, _) => current,
        };
    }

    /// Returns the current lifecycle state.
    #[cfg(test)]
    pub(crate) fn state(&self) -> StreamState {
        *self.state.lock().unwrap()
    }

    /// Pushes an inbound event onto the stream's queue, latching
    /// remote completion. Events for an abandoned stream are dropped.
    pub(crate) fn push_event(&self, event: StreamEvent) {
        match &event {
            StreamEvent::Data { end_stream, .. } | StreamEvent::Headers { end_stream, .. } => {
                if *end_stream {
                    self.on_remote_close();
                }
            }
            StreamEvent::Reset { .. } | StreamEvent::ConnectionClosed => {
                self.end_stream_received.store(true, Ordering::Relaxed);
                *self.state.lock().unwrap() = StreamState::Closed;
            }
        }
        let _ = self.events.send(event);
    }

    /// Records the remote side half-closing via END_STREAM.
    fn on_remote_close(&self) {
        self.end_stream_received.store(true, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        *state = match *state {
            StreamState::HalfClosedLocal | StreamState::Closed => StreamState::Closed,
            _ => StreamState::HalfClosedRemote,
        };
    }

    /// Whether any inbound frame carried END_STREAM (or the stream was
    /// reset). The receive loop evicts a stream from the registry once
    /// this latches.
    pub(crate) fn end_stream_received(&self) -> bool {
        self.end_stream_received.load(Ordering::Relaxed)
    }
}

/// The caller-side handle: the receive half of the event queue plus
/// the shared state.
pub(crate) struct Stream {
    pub(crate) shared: Arc<StreamShared>,
    events: UnboundedReceiver<StreamEvent>,
}

impl Stream {
    /// Receives the next inbound event. Returns `None` only if the
    /// stream was evicted with no further events queued.
    pub(crate) async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

/// The connection's registry of live streams and its client stream id
/// allocator. Client stream ids start at 1 and grow by 2.
pub(crate) struct StreamStore {
    next_id: StreamId,
    streams: HashMap<StreamId, Arc<StreamShared>>,
}

impl StreamStore {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            streams: HashMap::new(),
        }
    }

    /// Allocates the next client (odd) stream id and registers a new
    /// stream seeded with the given send window.
    pub(crate) fn create_stream(&mut self, initial_send_window: u32, recv_window: u32) -> Stream {
        let id = self.next_id;
        self.next_id += 2;
        let (stream, shared) = Self::build(id, initial_send_window, recv_window);
        self.streams.insert(id, shared);
        stream
    }

    /// Registers a server-initiated (even id) stream discovered by the
    /// receive loop. The caller-side handle is dropped on the spot, so
    /// pushed events vanish; this client never consumes pushes.
    pub(crate) fn register_remote(
        &mut self,
        id: StreamId,
        initial_send_window: u32,
        recv_window: u32,
    ) -> Arc<StreamShared> {
        let (_, shared) = Self::build(id, initial_send_window, recv_window);
        self.streams.insert(id, Arc::clone(&shared));
        shared
    }

    /// Looks up a live stream.
    pub(crate) fn get(&self, id: StreamId) -> Option<Arc<StreamShared>> {
        self.streams.get(&id).map(Arc::clone)
    }

    /// Evicts a completed stream from the registry. Frames that arrive
    /// for it afterwards are ignored as unknown.
    pub(crate) fn evict(&mut self, id: StreamId) {
        self.streams.remove(&id);
    }

    /// The highest stream id already allocated, advertised in GOAWAY.
    pub(crate) fn last_allocated_id(&self) -> StreamId {
        self.next_id.saturating_sub(2)
    }

    /// Drains every live stream, for connection teardown.
    pub(crate) fn take_all(&mut self) -> Vec<Arc<StreamShared>> {
        self.streams.drain().map(|(_, shared)| shared).collect()
    }

    fn build(
        id: StreamId,
        initial_send_window: u32,
        recv_window: u32,
    ) -> (Stream, Arc<StreamShared>) {
        let (events_tx, events_rx) = unbounded_channel();
        let shared = Arc::new(StreamShared {
            id,
            state: Mutex::new(StreamState::Idle),
            send_window: SendWindow::new(initial_send_window),
            recv_window: RecvWindow::new(recv_window),
            events: events_tx,
            end_stream_received: AtomicBool::new(false),
        });
        (
            Stream {
                shared: Arc::clone(&shared),
                events: events_rx,
            },
            shared,
        )
    }
}

#[cfg(test)]
mod ut_stream {
    use super::*;

    /// UT test cases for the local stream state machine.
    ///
    /// # Brief
    /// 1. Creates a stream and checks it starts `Idle`.
    /// 2. Sends headers without END_STREAM and checks `Open`.
    /// 3. Sends a final frame and checks `HalfClosedLocal`.
    #[test]
    fn ut_stream_state_machine() {
        let mut store = StreamStore::new();
        let stream = store.create_stream(65535, 65535);
        assert_eq!(stream.shared.id(), 1);
        assert_eq!(stream.shared.state(), StreamState::Idle);

        stream.shared.on_send(false);
        assert_eq!(stream.shared.state(), StreamState::Open);
        stream.shared.on_send(false);
        assert_eq!(stream.shared.state(), StreamState::Open);
        stream.shared.on_send(true);
        assert_eq!(stream.shared.state(), StreamState::HalfClosedLocal);
        stream.shared.on_send(true);
        assert_eq!(stream.shared.state(), StreamState::HalfClosedLocal);
    }

    /// UT test cases for stream id allocation and eviction.
    ///
    /// # Brief
    /// 1. Creates three streams and checks odd ids incrementing by 2.
    /// 2. Evicts one and checks lookups fail for it but succeed for the
    ///    rest.
    #[test]
    fn ut_stream_store() {
        let mut store = StreamStore::new();
        assert_eq!(store.last_allocated_id(), 0);
        let first = store.create_stream(65535, 65535);
        let second = store.create_stream(65535, 65535);
        let third = store.create_stream(65535, 65535);
        assert_eq!(first.shared.id(), 1);
        assert_eq!(second.shared.id(), 3);
        assert_eq!(third.shared.id(), 5);
        assert_eq!(store.last_allocated_id(), 5);

        store.evict(3);
        assert!(store.get(3).is_none());
        assert!(store.get(1).is_some());
        assert!(store.get(5).is_some());
    }

    /// UT test cases for event queueing and the completion latch.
    ///
    /// # Brief
    /// 1. Pushes a DATA event without END_STREAM and checks the
    ///    completion latch stays clear.
    /// 2. Pushes a HEADERS event with END_STREAM and checks completion.
    /// 3. Drains the queue and checks event order survives.
    #[tokio::test]
    async fn ut_stream_events() {
        let mut store = StreamStore::new();
        let mut stream = store.create_stream(65535, 65535);

        stream.shared.push_event(StreamEvent::Data {
            payload: b"body".to_vec(),
            end_stream: false,
        });
        assert!(!stream.shared.end_stream_received());

        stream.shared.push_event(StreamEvent::Headers {
            fields: Headers::new(),
            end_stream: true,
        });
        assert!(stream.shared.end_stream_received());

        match stream.next_event().await {
            Some(StreamEvent::Data { payload, .. }) => assert_eq!(payload, b"body"),
            _ => panic!("expected the data event first"),
        }
        match stream.next_event().await {
            Some(StreamEvent::Headers { end_stream, .. }) => assert!(end_stream),
            _ => panic!("expected the headers event"),
        }
    }
}
