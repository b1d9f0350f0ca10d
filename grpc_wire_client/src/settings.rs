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

//! The connection settings table: local defaults advertised during the
//! preface exchange and the peer values merged in from inbound
//! SETTINGS frames.

use std::time::Duration;

use grpc_wire::h2::{Frame, FrameFlags, Payload, Setting, Settings, SettingsBuilder};

/// How long `connect` waits for the peer's first SETTINGS frame before
/// giving up on the handshake.
pub(crate) const SETTINGS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `send_ping` waits for the matching ack.
pub(crate) const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// The settings table of one connection. Starts at the RFC defaults
/// adjusted for a client that never accepts pushes, and is mutated only
/// by processing inbound non-ack SETTINGS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnSettings {
    pub(crate) header_table_size: u32,
    pub(crate) enable_push: bool,
    pub(crate) max_concurrent_streams: u32,
    pub(crate) initial_window_size: u32,
    pub(crate) max_frame_size: u32,
    pub(crate) max_header_list_size: u32,
}

impl Default for ConnSettings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: 100,
            initial_window_size: 65535,
            max_frame_size: 16384,
            max_header_list_size: 8192,
        }
    }
}

impl ConnSettings {
    /// Builds the SETTINGS frame advertising this table, sent right
    /// after the connection preface.
    pub(crate) fn to_frame(&self) -> Frame {
        let settings = SettingsBuilder::new()
            .header_table_size(self.header_table_size)
            .enable_push(self.enable_push)
            .max_concurrent_streams(self.max_concurrent_streams)
            .initial_window_size(self.initial_window_size)
            .max_frame_size(self.max_frame_size)
            .max_header_list_size(self.max_header_list_size)
            .build();
        Frame::new(0, FrameFlags::empty(), Payload::Settings(settings))
    }

    /// Merges a peer SETTINGS payload into the table.
    pub(crate) fn update(&mut self, settings: &Settings) {
        for setting in settings.get_settings() {
            match *setting {
                Setting::HeaderTableSize(size) => self.header_table_size = size,
                Setting::EnablePush(enable) => self.enable_push = enable,
                Setting::MaxConcurrentStreams(num) => self.max_concurrent_streams = num,
                Setting::InitialWindowSize(size) => self.initial_window_size = size,
                Setting::MaxFrameSize(size) => self.max_frame_size = size,
                Setting::MaxHeaderListSize(size) => self.max_header_list_size = size,
            }
        }
    }
}

#[cfg(test)]
mod ut_settings {
    use super::*;

    /// UT test cases for `ConnSettings::update`.
    ///
    /// # Brief
    /// 1. Starts from the default table.
    /// 2. Merges a peer SETTINGS payload touching two identifiers.
    /// 3. Checks the touched values change and the rest stay at their
    ///    defaults.
    #[test]
    fn ut_conn_settings_update() {
        let mut settings = ConnSettings::default();
        assert_eq!(settings.max_frame_size, 16384);

        let peer = SettingsBuilder::new()
            .initial_window_size(1048576)
            .max_frame_size(32768)
            .build();
        settings.update(&peer);
        assert_eq!(settings.initial_window_size, 1048576);
        assert_eq!(settings.max_frame_size, 32768);
        assert_eq!(settings.max_concurrent_streams, 100);
        assert_eq!(settings.header_table_size, 4096);
    }

    /// UT test cases for `ConnSettings::to_frame`.
    ///
    /// # Brief
    /// 1. Builds the advertised SETTINGS frame from the default table.
    /// 2. Checks the frame targets stream 0, carries no flags and
    ///    holds all six settings.
    #[test]
    fn ut_conn_settings_to_frame() {
        let frame = ConnSettings::default().to_frame();
        assert_eq!(frame.stream_id(), 0);
        assert!(!frame.flags().is_ack());
        match frame.payload() {
            Payload::Settings(settings) => {
                assert_eq!(settings.get_settings().len(), 6);
                assert_eq!(settings.encoded_len(), 36);
            }
            _ => panic!("wrong payload type"),
        }
    }
}
