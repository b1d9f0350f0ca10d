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

//! [HPACK] header codec, reduced to the subset a gRPC client needs.
//!
//! [HPACK]: https://httpwg.org/specs/rfc7541.html
//!
//! The encoder always emits the "literal header field without
//! indexing" representation with a literal name, so correctness never
//! depends on peer table state. The decoder resolves indexed
//! representations against a fixed static table ([`table`]) and
//! understands all four literal forms, but never inserts into a
//! dynamic table and never decodes Huffman-coded strings. Both are
//! surfaced as `CompressionError` rather than mis-resolved.

mod integer;
mod table;

use integer::{decode_integer, encode_integer};

use crate::h2::{ErrorCode, H2Error};
use crate::Headers;

/// Encodes a header list as a sequence of "literal header field
/// without indexing" representations with literal names.
pub fn encode_headers(headers: &Headers) -> Vec<u8> {
    let mut buf = Vec::new();
    for (name, value) in headers.iter() {
        buf.push(0x00);
        encode_integer(name.len(), 7, 0, &mut buf);
        buf.extend_from_slice(name.as_bytes());
        encode_integer(value.len(), 7, 0, &mut buf);
        buf.extend_from_slice(value.as_bytes());
    }
    buf
}

/// Decodes a complete HPACK header block into a header list.
///
/// Representation dispatch follows the first octet's pattern bits:
/// `1xxxxxxx` indexed, `01xxxxxx` literal with incremental indexing,
/// `001xxxxx` dynamic table size update (decoded and discarded),
/// `0000xxxx`/`0001xxxx` literal without indexing / never indexed.
pub fn decode_headers(block: &[u8]) -> Result<Headers, H2Error> {
    let mut headers = Headers::new();
    let mut pos = 0;
    while pos < block.len() {
        let tag = block[pos];
        if tag & 0x80 == 0x80 {
            let (index, consumed) = decode_integer(&block[pos..], 7)?;
            pos += consumed;
            let (name, value) = table::field(index)
                .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
            headers.insert(name, value);
        } else if tag & 0x40 == 0x40 {
            let name = decode_name(block, &mut pos, 6)?;
            let value = decode_string(block, &mut pos)?;
            // The entry is not remembered: there is no dynamic table.
            headers.insert(&name, &value);
        } else if tag & 0x20 == 0x20 {
            let (_, consumed) = decode_integer(&block[pos..], 5)?;
            pos += consumed;
        } else {
            let name = decode_name(block, &mut pos, 4)?;
            let value = decode_string(block, &mut pos)?;
            headers.insert(&name, &value);
        }
    }
    Ok(headers)
}

/// Decodes a literal representation's name: a table reference when the
/// prefix holds a nonzero index, a literal string when it holds 0.
fn decode_name(block: &[u8], pos: &mut usize, prefix_bits: u8) -> Result<String, H2Error> {
    let (index, consumed) = decode_integer(&block[*pos..], prefix_bits)?;
    *pos += consumed;
    if index == 0 {
        return decode_string(block, pos);
    }
    let name =
        table::field_name(index).ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
    Ok(name.to_string())
}

/// Decodes a length-prefixed string literal. Huffman-coded strings are
/// rejected.
fn decode_string(block: &[u8], pos: &mut usize) -> Result<String, H2Error> {
    let first = *block
        .get(*pos)
        .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
    if first & 0x80 == 0x80 {
        return Err(H2Error::ConnectionError(ErrorCode::CompressionError));
    }
    let (length, consumed) = decode_integer(&block[*pos..], 7)?;
    *pos += consumed;
    let end = pos
        .checked_add(length)
        .filter(|end| *end <= block.len())
        .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
    let string = String::from_utf8(block[*pos..end].to_vec())
        .map_err(|_| H2Error::ConnectionError(ErrorCode::CompressionError))?;
    *pos = end;
    Ok(string)
}

#[cfg(test)]
mod ut_hpack {
    use super::*;

    /// UT test cases for header list encoding.
    ///
    /// # Brief
    /// 1. Encodes a two-field header list.
    /// 2. Checks every field uses the zero-tag literal representation
    ///    with length-prefixed name and value.
    /// 3. Decodes the block back and checks the fields survive.
    #[test]
    fn ut_encode_headers() {
        let mut headers = Headers::new();
        headers.insert(":method", "POST");
        headers.insert("te", "trailers");
        let block = encode_headers(&headers);

        let mut expected = vec![0x00, 0x07];
        expected.extend_from_slice(b":method");
        expected.extend_from_slice(&[0x04]);
        expected.extend_from_slice(b"POST");
        expected.extend_from_slice(&[0x00, 0x02]);
        expected.extend_from_slice(b"te");
        expected.extend_from_slice(&[0x08]);
        expected.extend_from_slice(b"trailers");
        assert_eq!(block, expected);

        let decoded = decode_headers(&block).unwrap();
        assert_eq!(decoded.get(":method"), Some("POST"));
        assert_eq!(decoded.get("te"), Some("trailers"));
    }

    /// UT test cases for indexed representation decoding.
    ///
    /// # Brief
    /// 1. Decodes single indexed octets for static indices 2 and 8.
    /// 2. Checks they resolve to `:method: GET` and `:status: 200`.
    /// 3. Decodes an index past the static table and checks the error.
    #[test]
    fn ut_decode_indexed() {
        let decoded = decode_headers(&[0x82]).unwrap();
        assert_eq!(decoded.get(":method"), Some("GET"));

        let decoded = decode_headers(&[0x88]).unwrap();
        assert_eq!(decoded.get(":status"), Some("200"));

        assert_eq!(
            decode_headers(&[0xbe]),
            Err(H2Error::ConnectionError(ErrorCode::CompressionError))
        );
    }

    /// UT test cases for literal representations with a table-indexed
    /// name.
    ///
    /// # Brief
    /// 1. Decodes a literal-without-indexing field whose name is static
    ///    index 8 (`:status`).
    /// 2. Checks the literal value overrides the table value.
    #[test]
    fn ut_decode_literal_indexed_name() {
        let mut block = vec![0x08, 0x03];
        block.extend_from_slice(b"503");
        let decoded = decode_headers(&block).unwrap();
        assert_eq!(decoded.get(":status"), Some("503"));
    }

    /// UT test cases for consecutive incrementally-indexed literals.
    ///
    /// # Brief
    /// 1. Encodes two back-to-back literal-with-incremental-indexing
    ///    fields with literal names of different lengths.
    /// 2. Decodes the block.
    /// 3. Checks both fields decode correctly, i.e. the cursor advances
    ///    by the value length after each field.
    #[test]
    fn ut_decode_consecutive_incremental_literals() {
        let mut block = vec![0x40, 0x0b];
        block.extend_from_slice(b"grpc-status");
        block.extend_from_slice(&[0x01]);
        block.extend_from_slice(b"0");
        block.extend_from_slice(&[0x40, 0x0c]);
        block.extend_from_slice(b"grpc-message");
        block.extend_from_slice(&[0x02]);
        block.extend_from_slice(b"ok");

        let decoded = decode_headers(&block).unwrap();
        assert_eq!(decoded.get("grpc-status"), Some("0"));
        assert_eq!(decoded.get("grpc-message"), Some("ok"));
    }

    /// UT test cases for dynamic table size updates.
    ///
    /// # Brief
    /// 1. Decodes a block beginning with a size update followed by an
    ///    indexed field.
    /// 2. Checks the update is skipped without effect and the field
    ///    still decodes.
    #[test]
    fn ut_decode_size_update_skipped() {
        let decoded = decode_headers(&[0x3f, 0xe1, 0x1f, 0x82]).unwrap();
        assert_eq!(decoded.get(":method"), Some("GET"));
        assert_eq!(decoded.len(), 1);
    }

    /// UT test cases for unsupported and malformed blocks.
    ///
    /// # Brief
    /// 1. Decodes a Huffman-flagged string literal.
    /// 2. Decodes a string literal whose length runs past the block.
    /// 3. Checks both fail with a `CompressionError`.
    #[test]
    fn ut_decode_headers_malformed() {
        // 0x00 tag, then a Huffman-flagged name length.
        assert_eq!(
            decode_headers(&[0x00, 0x83, 0x01, 0x02, 0x03]),
            Err(H2Error::ConnectionError(ErrorCode::CompressionError))
        );
        // Name length promises more bytes than the block holds.
        assert_eq!(
            decode_headers(&[0x00, 0x7e, b'a']),
            Err(H2Error::ConnectionError(ErrorCode::CompressionError))
        );
    }
}
