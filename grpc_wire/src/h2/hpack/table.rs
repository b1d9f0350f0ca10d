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

//! The HPACK static table subset this codec resolves indices against.
//!
//! The table covers the entries a gRPC exchange actually references:
//! the request pseudo-headers, the common `:status` values, and the
//! gRPC framing headers. Index 0 is reserved by HPACK and never
//! resolves. There is no dynamic table; a peer that emits dynamic
//! back-references is not interoperable with this codec.

/// Static (name, value) entries, addressed from index 1.
static STATIC_TABLE: [(&str, &str); 16] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-encoding", ""),
    ("content-type", "application/grpc"),
    ("te", "trailers"),
];

/// Resolves an index to its static table entry. Returns `None` for
/// index 0 and for indices past the end of the table.
pub(crate) fn field(index: usize) -> Option<(&'static str, &'static str)> {
    if index == 0 {
        return None;
    }
    STATIC_TABLE.get(index - 1).copied()
}

/// Resolves an index to a header name only, for literal representations
/// that take their name from the table.
pub(crate) fn field_name(index: usize) -> Option<&'static str> {
    field(index).map(|(name, _)| name)
}

#[cfg(test)]
mod ut_table {
    use super::*;

    /// UT test cases for static table lookups.
    ///
    /// # Brief
    /// 1. Resolves indices at the table boundaries and in the middle.
    /// 2. Checks index 0 and out-of-range indices resolve to `None`.
    #[test]
    fn ut_static_table_field() {
        assert_eq!(field(1), Some((":authority", "")));
        assert_eq!(field(2), Some((":method", "GET")));
        assert_eq!(field(8), Some((":status", "200")));
        assert_eq!(field(15), Some(("content-type", "application/grpc")));
        assert_eq!(field(16), Some(("te", "trailers")));
        assert_eq!(field(0), None);
        assert_eq!(field(17), None);
        assert_eq!(field_name(3), Some(":method"));
        assert_eq!(field_name(62), None);
    }
}
