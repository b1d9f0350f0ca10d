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

//! Flow-control windows.
//!
//! [`SendWindow`] tracks how many bytes the peer currently admits;
//! senders consume it before writing DATA and suspend on its `Notify`
//! until a WINDOW_UPDATE replenishes it. [`RecvWindow`] tracks how many
//! bytes we have admitted to the peer and decides when to hand credit
//! back. One instance of each exists per stream and per connection.

use std::sync::Mutex;

use grpc_wire::h2::{ErrorCode, H2Error, MAX_FLOW_CONTROL_WINDOW};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// The peer-granted window for outbound DATA.
pub(crate) struct SendWindow {
    size: Mutex<i64>,
    notify: Notify,
}

impl SendWindow {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            size: Mutex::new(size as i64),
            notify: Notify::new(),
        }
    }

    /// Atomically debits `size` bytes if the whole amount is available,
    /// leaving the window unchanged otherwise.
    pub(crate) fn try_consume(&self, size: u32) -> bool {
        let mut window = self.size.lock().unwrap();
        if *window >= size as i64 {
            *window -= size as i64;
            true
        } else {
            false
        }
    }

    /// Returns a future completed by the next replenishment. Callers
    /// must obtain it before a failed `try_consume` so a concurrent
    /// update cannot slip between the check and the wait.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Credits the window from a peer WINDOW_UPDATE and wakes suspended
    /// senders. Rejects an increment that would push the window past
    /// `2^31 - 1`.
    pub(crate) fn update(&self, increment: u32) -> Result<(), H2Error> {
        let mut window = self.size.lock().unwrap();
        let updated = *window + increment as i64;
        if updated > MAX_FLOW_CONTROL_WINDOW as i64 {
            return Err(H2Error::ConnectionError(ErrorCode::FlowControlError));
        }
        *window = updated;
        drop(window);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Wakes every suspended sender without granting credit, so a
    /// sender blocked on a dead connection can observe the shutdown.
    pub(crate) fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn size(&self) -> i64 {
        *self.size.lock().unwrap()
    }
}

/// The window we grant the peer for inbound DATA.
///
/// `target` is the full window we advertise; `actual` is what remains
/// after debiting inbound payloads. Once more than half the window is
/// unreleased, the whole unreleased amount is handed back at once in a
/// single WINDOW_UPDATE rather than dribbling out a frame per DATA.
pub(crate) struct RecvWindow {
    state: Mutex<RecvState>,
}

struct RecvState {
    target: u32,
    actual: i64,
}

impl RecvWindow {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            state: Mutex::new(RecvState {
                target: size,
                actual: size as i64,
            }),
        }
    }

    /// Debits an inbound DATA payload and returns the increment to
    /// send back in a WINDOW_UPDATE, if replenishment is due.
    pub(crate) fn recv_data(&self, size: u32) -> Option<u32> {
        let mut state = self.state.lock().unwrap();
        state.actual -= size as i64;
        let unreleased = state.target as i64 - state.actual;
        if unreleased * 2 > state.target as i64 {
            let increment = unreleased as u32;
            state.actual = state.target as i64;
            Some(increment)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn actual(&self) -> i64 {
        self.state.lock().unwrap().actual
    }
}
