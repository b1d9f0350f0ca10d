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

//! `grpc_wire` is the wire-format half of a hand-built gRPC client. It
//! contains everything that can be specified without doing IO:
//!
//! - [`h2`]: HTTP/2 frame model, frame codec and a simplified HPACK
//!   header codec (static table and literal representations only).
//! - [`grpc`]: the gRPC per-message envelope and the gRPC status codes.
//! - [`Headers`]: an ordered, case-insensitive header field collection.
//!
//! The crate is sans-IO on purpose: callers feed it complete byte
//! slices and take encoded bytes out. The companion `grpc_wire_client`
//! crate owns the socket, the receive loop and the RPC semantics.

pub mod grpc;
pub mod h2;

mod headers;

pub use headers::Headers;
