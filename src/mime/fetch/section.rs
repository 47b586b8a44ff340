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

use std::fmt;

use crate::account::model::MessageRecord;
use crate::mime::encoded_word::ew_encode;
use crate::mime::message::{
    format_address_list, format_date, Mailbox, ParsedMessage,
};

use super::envelope::synthetic_message_id;

/// Describes which portion of a part to process.
///
/// See the module documentation of `crate::mime::fetch` for how these map
/// onto the synthesised message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LeafType {
    /// The entire message.
    Full,
    /// The header block, re-emitted from the parsed fields.
    Headers,
    /// The `Content-*` headers of the part. At top level, same as `Headers`.
    Mime,
    /// The content of the part.
    Content,
    /// The content of the part. At top level, the entire message.
    Text,
}

/// Identifies a particular portion of the body to fetch.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct BodySection {
    /// Which subscripts to traverse to find the part in question.
    pub subscripts: Vec<u32>,
    /// Which subsection of the part to read.
    pub leaf_type: LeafType,
    /// Apply filtering to these header names.
    pub header_filter: Vec<String>,
    /// If true, discard headers matching `header_filter`.
    ///
    /// If false, keep only headers matching that filter.
    pub discard_matching_headers: bool,
    /// If set, slice the binary data produced by the above to this range,
    /// clamping each endpoint.
    pub partial: Option<(u64, u64)>,
    /// If true, fetching this section does not set `\Seen`.
    pub peek: bool,
    /// If set, report this section using the given legacy IMAP2 name (e.g.
    /// `RFC822.HEADER` instead of `BODY[HEADER]`).
    pub report_as_legacy: Option<Imap2Section>,
}

impl Default for BodySection {
    fn default() -> Self {
        BodySection {
            subscripts: vec![],
            leaf_type: LeafType::Full,
            header_filter: vec![],
            discard_matching_headers: false,
            partial: None,
            peek: false,
            report_as_legacy: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Imap2Section {
    Rfc822,
    Rfc822Header,
    Rfc822Text,
}

/// Everything a section can be produced from.
#[derive(Clone, Copy, Debug)]
pub struct SectionSource<'a> {
    pub record: &'a MessageRecord,
    pub message: &'a ParsedMessage,
    /// `message.serialize()`, computed once per message.
    pub serialized: &'a [u8],
    /// The server domain, for the synthetic message id.
    pub domain: &'a str,
}

/// The header fields a header section can contain, in the order they are
/// produced.
const HEADER_FIELDS: &[&str] = &[
    "Date",
    "Subject",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "Content-Type",
];

impl BodySection {
    /// Produce the bytes of this section.
    ///
    /// A subscript path that does not resolve to a part produces an empty
    /// section.
    pub fn fetch(&self, src: &SectionSource<'_>) -> Vec<u8> {
        let data = if self.subscripts.is_empty() {
            match self.leaf_type {
                LeafType::Headers | LeafType::Mime => self.header_block(src),
                LeafType::Full | LeafType::Content | LeafType::Text => {
                    src.serialized.to_vec()
                }
            }
        } else {
            let found = match self.leaf_type {
                LeafType::Headers => src
                    .message
                    .resolve_part(&self.subscripts)
                    .map(|_| self.header_block(src)),
                LeafType::Mime => {
                    src.message.resolve_part_headers(&self.subscripts)
                }
                LeafType::Full | LeafType::Content | LeafType::Text => {
                    src.message.resolve_part(&self.subscripts)
                }
            };
            found.unwrap_or_default()
        };

        self.apply_partial(data)
    }

    /// Synthesise the header block, honouring the header filter.
    fn header_block(&self, src: &SectionSource<'_>) -> Vec<u8> {
        let mut out = Vec::new();
        for &name in HEADER_FIELDS {
            if !self.wants_header(name) {
                continue;
            }

            if "Content-Type" == name {
                out.extend_from_slice(content_type_lines(src.serialized));
                continue;
            }

            if let Some(value) = header_value(name, src) {
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b": ");
                out.extend_from_slice(value.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    fn wants_header(&self, name: &str) -> bool {
        if self.header_filter.is_empty() {
            return true;
        }

        let listed = self
            .header_filter
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name));
        listed != self.discard_matching_headers
    }

    fn apply_partial(&self, mut data: Vec<u8>) -> Vec<u8> {
        if let Some((start, end)) = self.partial {
            let len = data.len() as u64;
            let start = start.min(len) as usize;
            let end = end.min(len).max(start as u64) as usize;
            data.truncate(end);
            data.drain(..start);
        }
        data
    }
}

fn header_value(name: &str, src: &SectionSource<'_>) -> Option<String> {
    let message = src.message;
    let list = |l: &[Mailbox]| {
        if l.is_empty() {
            None
        } else {
            Some(format_address_list(l))
        }
    };

    match name {
        "Date" => Some(format_date(&src.record.send_date)),
        "Subject" => message
            .subject
            .as_ref()
            .map(|s| ew_encode(s).into_owned()),
        "From" => list(&message.from),
        "Sender" => {
            if message.sender.is_empty() {
                list(&message.from)
            } else {
                list(&message.sender)
            }
        }
        "Reply-To" => list(&message.reply_to),
        "To" => list(&message.to),
        "Cc" => list(&message.cc),
        "Bcc" => list(&message.bcc),
        "Message-ID" => Some(synthetic_message_id(src.record, src.domain)),
        _ => None,
    }
}

/// Return the first two lines, CRLFs included, of the serialised message,
/// which is where it keeps its folded `Content-Type` header.
fn content_type_lines(serialized: &[u8]) -> &[u8] {
    let mut end = 0;
    for _ in 0..2 {
        match memchr::memchr(b'\n', &serialized[end..]) {
            Some(lf) => end += lf + 1,
            None => return serialized,
        }
    }
    &serialized[..end]
}

/// Formats the section as it is named in the response, e.g.
/// `BODY[1.HEADER.FIELDS (SUBJECT)]<0>` or `RFC822.TEXT`.
impl fmt::Display for BodySection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.report_as_legacy {
            Some(Imap2Section::Rfc822) => return write!(f, "RFC822"),
            Some(Imap2Section::Rfc822Header) => {
                return write!(f, "RFC822.HEADER")
            }
            Some(Imap2Section::Rfc822Text) => return write!(f, "RFC822.TEXT"),
            None => (),
        }

        write!(f, "BODY[")?;
        for (ix, subscript) in self.subscripts.iter().enumerate() {
            if 0 != ix {
                write!(f, ".")?;
            }
            write!(f, "{}", subscript)?;
        }

        let text = match (self.subscripts.is_empty(), self.leaf_type) {
            (true, LeafType::Full) => None,
            (true, LeafType::Content) => Some("TEXT"),
            (false, LeafType::Full) | (false, LeafType::Content) => None,
            (_, LeafType::Text) => Some("TEXT"),
            (_, LeafType::Mime) => Some("MIME"),
            (_, LeafType::Headers) if self.header_filter.is_empty() => {
                Some("HEADER")
            }
            (_, LeafType::Headers) if self.discard_matching_headers => {
                Some("HEADER.FIELDS.NOT")
            }
            (_, LeafType::Headers) => Some("HEADER.FIELDS"),
        };

        if let Some(text) = text {
            if !self.subscripts.is_empty() {
                write!(f, ".")?;
            }
            write!(f, "{}", text)?;
        }

        if !self.header_filter.is_empty() {
            write!(f, " (")?;
            for (ix, header) in self.header_filter.iter().enumerate() {
                if 0 != ix {
                    write!(f, " ")?;
                }
                if is_atom(header) {
                    write!(f, "{}", header)?;
                } else {
                    write!(
                        f,
                        "\"{}\"",
                        header.replace('\\', "\\\\").replace('"', "\\\"")
                    )?;
                }
            }
            write!(f, ")")?;
        }

        write!(f, "]")?;
        if let Some((start, _)) = self.partial {
            write!(f, "<{}>", start)?;
        }

        Ok(())
    }
}

fn is_atom(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"(){%*\"\\]".contains(&b)
        })
}
