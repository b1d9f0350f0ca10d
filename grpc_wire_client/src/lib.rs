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

//! A gRPC client that speaks HTTP/2 directly over a raw TCP socket,
//! without delegating framing, header compression, flow control or RPC
//! semantics to an RPC runtime.
//!
//! - [`Connection`]: socket ownership, the preface exchange and the
//!   background receive loop.
//! - [`GrpcChannel`]: the four gRPC call shapes layered on top.
//!
//! The caller supplies and consumes opaque encoded message bytes; the
//! payload codec that produces them is an external collaborator.
//!
//! ```no_run
//! use grpc_wire_client::{CallOptions, GrpcChannel};
//!
//! # async fn call() -> Result<(), grpc_wire_client::ClientError> {
//! let channel = GrpcChannel::connect("localhost:50051").await?;
//! let reply = channel
//!     .unary_unary("/TestService/SimpleTest", b"request".to_vec(), CallOptions::default())
//!     .await?;
//! channel.close().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod connection;
mod error;
mod settings;
mod stream;
mod window;

pub use channel::{CallOptions, GrpcChannel, ResponseStream};
pub use connection::Connection;
pub use error::{ClientError, ErrorKind};
