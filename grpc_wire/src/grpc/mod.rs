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

//! gRPC wire conventions layered on HTTP/2: the per-message envelope
//! and the status codes carried in `grpc-status` trailers.

mod message;
mod status;

pub use message::{
    decode_message, encode_message, GrpcMessage, MessageError, MESSAGE_HEADER_LENGTH,
};
pub use status::GrpcStatus;
