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

//! [Integer Representation] of HPACK.
//!
//! [Integer Representation]: https://httpwg.org/specs/rfc7541.html#integer.representation
//!
//! An integer is encoded in an N-bit prefix; a value that does not fit
//! the prefix is continued in following octets, 7 bits per octet in
//! little-endian group order, with the top bit marking continuation.

use crate::h2::{ErrorCode, H2Error};

/// Appends an integer representation to `dst`. `tag` holds the
/// representation's pattern bits above the prefix and is merged into
/// the first octet.
pub(crate) fn encode_integer(value: usize, prefix_bits: u8, tag: u8, dst: &mut Vec<u8>) {
    let max_prefix = (1usize << prefix_bits) - 1;
    if value < max_prefix {
        dst.push(tag | value as u8);
        return;
    }
    dst.push(tag | max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 128 {
        dst.push((rest & 0x7f) as u8 | 0x80);
        rest >>= 7;
    }
    dst.push(rest as u8);
}

/// Decodes an integer representation from the front of `buf`. Returns
/// the value and the number of octets consumed.
///
/// Fails with a `CompressionError` when the buffer ends inside a
/// continuation sequence or the value overflows `usize`.
pub(crate) fn decode_integer(buf: &[u8], prefix_bits: u8) -> Result<(usize, usize), H2Error> {
    if buf.is_empty() {
        return Err(H2Error::ConnectionError(ErrorCode::CompressionError));
    }
    let max_prefix = (1usize << prefix_bits) - 1;
    let first = (buf[0] as usize) & max_prefix;
    if first < max_prefix {
        return Ok((first, 1));
    }
    let mut value = max_prefix;
    let mut shift = 0u32;
    let mut consumed = 1;
    loop {
        let byte = *buf
            .get(consumed)
            .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
        consumed += 1;
        let group = ((byte & 0x7f) as usize)
            .checked_shl(shift)
            .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
        value = value
            .checked_add(group)
            .ok_or(H2Error::ConnectionError(ErrorCode::CompressionError))?;
        if byte & 0x80 == 0 {
            return Ok((value, consumed));
        }
        shift += 7;
    }
}

#[cfg(test)]
mod ut_integer {
    use super::*;

    /// UT test cases for integer encoding, following the examples in
    /// RFC 7541 Appendix C.1.
    ///
    /// # Brief
    /// 1. Encodes 10 with a 5-bit prefix.
    /// 2. Encodes 1337 with a 5-bit prefix.
    /// 3. Encodes 42 with an 8-bit prefix.
    /// 4. Checks the produced octets against the RFC examples.
    #[test]
    fn ut_encode_integer() {
        let mut buf = Vec::new();
        encode_integer(10, 5, 0, &mut buf);
        assert_eq!(buf, [0x0a]);

        let mut buf = Vec::new();
        encode_integer(1337, 5, 0, &mut buf);
        assert_eq!(buf, [0x1f, 0x9a, 0x0a]);

        let mut buf = Vec::new();
        encode_integer(42, 8, 0, &mut buf);
        assert_eq!(buf, [0x2a]);
    }

    /// UT test cases for integer codec round-trips.
    ///
    /// # Brief
    /// 1. Encodes assorted values at every prefix width the codec
    ///    uses.
    /// 2. Decodes the produced octets.
    /// 3. Checks the value survives and exactly the produced octets are
    ///    consumed.
    #[test]
    fn ut_integer_round_trip() {
        for prefix in [4u8, 5, 6, 7] {
            for value in [0usize, 1, 14, 15, 16, 126, 127, 128, 1337, 65535, 1 << 20] {
                let mut buf = Vec::new();
                encode_integer(value, prefix, 0, &mut buf);
                let (decoded, consumed) = decode_integer(&buf, prefix).unwrap();
                assert_eq!(decoded, value);
                assert_eq!(consumed, buf.len());
            }
        }
    }

    /// UT test cases for malformed integer representations.
    ///
    /// # Brief
    /// 1. Decodes an empty buffer.
    /// 2. Decodes a prefix that promises continuation octets which
    ///    never arrive.
    /// 3. Checks both fail with a `CompressionError`.
    #[test]
    fn ut_decode_integer_truncated() {
        assert!(decode_integer(&[], 7).is_err());
        assert!(decode_integer(&[0x7f, 0x80], 7).is_err());
        assert!(decode_integer(&[0x7f, 0x80, 0x80], 7).is_err());
    }
}
