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

//! Errors that may occur in this crate.

use core::fmt;
use std::error::Error;
use std::io;

use grpc_wire::grpc::GrpcStatus;
use grpc_wire::h2::H2Error;

/// The structure encapsulates errors that can be encountered when
/// working with the client: an [`ErrorKind`] naming the phase that
/// failed and a cause carrying the detail.
pub struct ClientError {
    kind: ErrorKind,
    cause: Cause,
}

/// Error kinds which can indicate the type of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Errors during connection establishment.
    Connect,

    /// Errors while sending the request side of a call.
    Request,

    /// A bounded wait exceeded its deadline.
    Timeout,

    /// The peer answered the call with a nonzero `grpc-status`.
    Rpc,

    /// Errors while decoding the response body.
    BodyDecode,

    /// The connection is no longer usable.
    ConnectionClosed,

    /// Other errors.
    Other,
}

enum Cause {
    NoReason,
    Msg(&'static str),
    Io(io::Error),
    H2(H2Error),
    Rpc {
        status: GrpcStatus,
        message: String,
    },
    Other(Box<dyn Error + Send + Sync>),
}

impl ClientError {
    /// Creates a `ClientError` from the given [`ErrorKind`] with no
    /// further detail.
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            cause: Cause::NoReason,
        }
    }

    /// Creates a `ClientError` from the given [`ErrorKind`] and a
    /// static message.
    pub(crate) fn from_str(kind: ErrorKind, msg: &'static str) -> Self {
        Self {
            kind,
            cause: Cause::Msg(msg),
        }
    }

    /// Creates a `ClientError` from an [`io::Error`].
    pub(crate) fn from_io_error(kind: ErrorKind, err: io::Error) -> Self {
        Self {
            kind,
            cause: Cause::Io(err),
        }
    }

    /// Creates a `ClientError` from an [`H2Error`].
    pub(crate) fn from_h2_error(kind: ErrorKind, err: H2Error) -> Self {
        Self {
            kind,
            cause: Cause::H2(err),
        }
    }

    /// Creates a `ClientError` carrying a peer-reported gRPC status.
    pub(crate) fn from_grpc_status(status: GrpcStatus, message: String) -> Self {
        Self {
            kind: ErrorKind::Rpc,
            cause: Cause::Rpc { status, message },
        }
    }

    /// Creates a `ClientError` from any boxed error.
    pub(crate) fn from_error<E>(kind: ErrorKind, err: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self {
            kind,
            cause: Cause::Other(err.into()),
        }
    }

    /// Gets the [`ErrorKind`] of this error.
    pub fn error_kind(&self) -> ErrorKind {
        self.kind
    }

    /// Gets the gRPC status this error maps to, for callers that want
    /// to treat every failure uniformly as a status code. Timeouts map
    /// to `DeadlineExceeded`; failures the peer never saw map to
    /// `Unavailable` or `Unknown`.
    pub fn grpc_status(&self) -> GrpcStatus {
        match (&self.kind, &self.cause) {
            (_, Cause::Rpc { status, .. }) => *status,
            (ErrorKind::Timeout, _) => GrpcStatus::DeadlineExceeded,
            (ErrorKind::Connect | ErrorKind::ConnectionClosed, _) => GrpcStatus::Unavailable,
            _ => GrpcStatus::Unknown,
        }
    }

    /// Gets the peer-supplied `grpc-message` text, if this error came
    /// from a nonzero `grpc-status` trailer.
    pub fn grpc_message(&self) -> Option<&str> {
        match &self.cause {
            Cause::Rpc { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("ClientError");
        builder.field("ErrorKind", &self.kind);
        match &self.cause {
            Cause::NoReason => {}
            Cause::Msg(msg) => {
                builder.field("Cause", msg);
            }
            Cause::Io(err) => {
                builder.field("Cause", err);
            }
            Cause::H2(err) => {
                builder.field("Cause", err);
            }
            Cause::Rpc { status, message } => {
                builder.field("Status", status);
                builder.field("Message", message);
            }
            Cause::Other(err) => {
                builder.field("Cause", err);
            }
        }
        builder.finish()
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.kind.as_str())?;
        match &self.cause {
            Cause::NoReason => write!(f, "no reason"),
            Cause::Msg(msg) => write!(f, "{msg}"),
            Cause::Io(err) => write!(f, "{err}"),
            Cause::H2(err) => write!(f, "{err}"),
            Cause::Rpc { status, message } => {
                write!(f, "grpc-status {} ({status}): {message}", status.code())
            }
            Cause::Other(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Cause::Io(err) => Some(err),
            Cause::H2(err) => Some(err),
            Cause::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl ErrorKind {
    /// Gets the string info of this `ErrorKind`.
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connect => "Connect Error",
            ErrorKind::Request => "Request Error",
            ErrorKind::Timeout => "Timeout Error",
            ErrorKind::Rpc => "Rpc Error",
            ErrorKind::BodyDecode => "Body Decode Error",
            ErrorKind::ConnectionClosed => "Connection Closed",
            ErrorKind::Other => "Other Error",
        }
    }
}

#[cfg(test)]
mod ut_error {
    use super::*;

    /// UT test cases for `ClientError` construction and accessors.
    ///
    /// # Brief
    /// 1. Creates errors through each constructor.
    /// 2. Checks `error_kind`, `grpc_status` and `grpc_message`.
    #[test]
    fn ut_client_error() {
        let err = ClientError::from_str(ErrorKind::Connect, "connection refused");
        assert_eq!(err.error_kind(), ErrorKind::Connect);
        assert_eq!(err.grpc_status(), GrpcStatus::Unavailable);
        assert!(err.grpc_message().is_none());
        assert_eq!(format!("{err}"), "Connect Error: connection refused");

        let err = ClientError::new(ErrorKind::Timeout);
        assert_eq!(err.grpc_status(), GrpcStatus::DeadlineExceeded);

        let err = ClientError::from_grpc_status(GrpcStatus::NotFound, "no such method".to_string());
        assert_eq!(err.error_kind(), ErrorKind::Rpc);
        assert_eq!(err.grpc_status(), GrpcStatus::NotFound);
        assert_eq!(err.grpc_message(), Some("no such method"));
    }
}
