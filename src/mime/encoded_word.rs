//-
// Copyright (c) 2020, 2024, Jason Lingle
//
// This file is part of Ferrymap.
//
// Ferrymap is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ferrymap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Ferrymap. If not, see <http://www.gnu.org/licenses/>.

//! Production of RFC 2047 "encoded words".
//!
//! Headers synthesised from stored message data may contain arbitrary
//! Unicode, but header fields are only allowed to carry ASCII. Text which is
//! not plain printable ASCII is converted into one or more `Q`-encoded words
//! in UTF-8.

use std::borrow::Cow;
use std::fmt::Write as _;

/// Encoded words may be at most 75 characters long; `=?utf-8?q?` and `?=`
/// take up 12 of them.
const MAX_ENCODED_PAYLOAD: usize = 75 - 12;

/// Encode `text` for use in an unstructured header or display name.
///
/// Returns the input unchanged if it is already safe to put in a header,
/// i.e., it is printable ASCII and doesn't contain anything that looks like
/// an encoded word.
pub fn ew_encode(text: &str) -> Cow<str> {
    if is_header_safe(text) {
        return Cow::Borrowed(text);
    }

    let mut out = String::new();
    let mut word = String::new();
    let mut buf = [0u8; 4];

    for ch in text.chars() {
        let mut encoded_char = String::new();
        for &b in ch.encode_utf8(&mut buf).as_bytes() {
            q_encode_byte(&mut encoded_char, b);
        }

        // Multi-byte characters must not be split between words.
        if word.len() + encoded_char.len() > MAX_ENCODED_PAYLOAD {
            flush_word(&mut out, &word);
            word.clear();
        }
        word.push_str(&encoded_char);
    }

    flush_word(&mut out, &word);
    Cow::Owned(out)
}

fn is_header_safe(text: &str) -> bool {
    !text.contains("=?")
        && text.bytes().all(|b| match b {
            b' ' | b'\t' => true,
            33..=126 => true,
            _ => false,
        })
}

fn q_encode_byte(dst: &mut String, b: u8) {
    match b {
        b' ' => dst.push('_'),
        b'a'..=b'z'
        | b'A'..=b'Z'
        | b'0'..=b'9'
        | b'!'
        | b'*'
        | b'+'
        | b'-'
        | b'/' => dst.push(b as char),
        _ => {
            let _ = write!(dst, "={:02X}", b);
        }
    }
}

fn flush_word(dst: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }

    if !dst.is_empty() {
        dst.push(' ');
    }
    dst.push_str("=?utf-8?q?");
    dst.push_str(word);
    dst.push_str("?=");
}
