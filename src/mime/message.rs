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

//! The in-memory form of a message's content.
//!
//! A `ParsedMessage` is built from raw RFC 822 data with `mail-parser` and
//! keeps only what SEARCH and FETCH can report on: the address lists, the
//! subject and date, the plain-text and HTML bodies, and the attachments.
//!
//! The MIME layout the message is presented with is synthesised rather than
//! copied from the original. `mime_tree()` produces that layout, and both
//! the `BODYSTRUCTURE` and the serialised message are derived from it, so
//! part numbers, sizes and section contents always agree with each other.
//!
//! The layout is:
//!
//! - Without attachments, a `multipart/alternative` holding the text body
//!   and/or the HTML body, in that order.
//!
//! - With attachments, a `multipart/mixed` whose first part is the above
//!   `multipart/alternative` and whose remaining parts are the attachments.
//!
//! A multipart must have at least one child, so a message with neither a
//! text nor an HTML body gets an empty `text/plain` part in its
//! `multipart/alternative`.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::prelude::*;
use mail_parser::{Addr, Address, MessageParser, MimeHeaders, PartType};

use super::encoded_word::ew_encode;
use crate::support::error::Error;

/// A single mailbox (in the RFC 5322 sense) from an address list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// The display name, decoded.
    pub name: Option<String>,
    /// The full `local@domain` address.
    pub address: String,
}

impl Mailbox {
    pub fn new(name: Option<&str>, address: &str) -> Self {
        Mailbox {
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
            address: address.to_owned(),
        }
    }

    /// Split the address into its local part and domain at the last `@`.
    ///
    /// An address with no `@` is all local part.
    pub fn split_address(&self) -> (&str, Option<&str>) {
        match self.address.rfind('@') {
            Some(at) => (&self.address[..at], Some(&self.address[at + 1..])),
            None => (&self.address, None),
        }
    }
}

/// Formats the mailbox as it would appear in a header, with the display name
/// encoded or quoted as needed.
impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name {
            None => write!(f, "{}", self.address),
            Some(ref name) => {
                let encoded = ew_encode(name);
                if encoded != name.as_str() || !needs_quoting(name) {
                    write!(f, "{} <{}>", encoded, self.address)
                } else {
                    write!(f, "\"{}\" <{}>", quote_escape(name), self.address)
                }
            }
        }
    }
}

fn needs_quoting(name: &str) -> bool {
    name.chars().any(|c| "()<>[]:;@\\,.\"".contains(c))
}

fn quote_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render an address list as a header value.
pub fn format_address_list(list: &[Mailbox]) -> String {
    list.iter()
        .map(Mailbox::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub filename: String,
    /// The declared content type, as `type/subtype`. May be empty or
    /// malformed; consumers fall back to `application/octet-stream`.
    pub content_type: String,
    /// The decoded content.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Return the content type split into type and subtype, lowercased, or
    /// `application/octet-stream` if it is missing or malformed.
    pub fn media_type(&self) -> (String, String) {
        let mut parts = self.content_type.splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(typ), Some(subtype))
                if is_token(typ.trim()) && is_token(subtype.trim()) =>
            {
                (
                    typ.trim().to_ascii_lowercase(),
                    subtype.trim().to_ascii_lowercase(),
                )
            }
            _ => ("application".to_owned(), "octet-stream".to_owned()),
        }
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub date: Option<DateTime<FixedOffset>>,
    pub subject: Option<String>,
    pub from: Vec<Mailbox>,
    pub sender: Vec<Mailbox>,
    pub reply_to: Vec<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    /// The `text/plain` body, decoded.
    pub text: Option<String>,
    /// The `text/html` body, decoded.
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl ParsedMessage {
    /// Parse a raw RFC 822 message.
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or(Error::UnparseableMessage)?;

        let text = message
            .text_body
            .iter()
            .filter_map(|&id| message.part(id))
            .find_map(|part| match part.body {
                PartType::Text(ref text) => Some(text.to_string()),
                _ => None,
            });
        let html = message
            .html_body
            .iter()
            .filter_map(|&id| message.part(id))
            .find_map(|part| match part.body {
                PartType::Html(ref html) => Some(html.to_string()),
                _ => None,
            });

        let attachments = message
            .attachments()
            .map(|part| Attachment {
                filename: part
                    .attachment_name()
                    .unwrap_or("attachment")
                    .to_owned(),
                content_type: part
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                        None => ct.ctype().to_owned(),
                    })
                    .unwrap_or_default(),
                content: part.contents().to_vec(),
            })
            .collect();

        Ok(ParsedMessage {
            date: message
                .date()
                .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok()),
            subject: message.subject().map(str::to_owned),
            from: mailboxes(message.from()),
            sender: mailboxes(message.sender()),
            reply_to: mailboxes(message.reply_to()),
            to: mailboxes(message.to()),
            cc: mailboxes(message.cc()),
            bcc: mailboxes(message.bcc()),
            text,
            html,
            attachments,
        })
    }

    /// Build the MIME layout this message is presented with.
    pub fn mime_tree(&self) -> MimeNode {
        let fingerprint = self.fingerprint();

        let mut alternatives = Vec::new();
        if let Some(text) = self.text.as_ref().filter(|t| !t.is_empty()) {
            alternatives.push(MimeNode::text("plain", text));
        }
        if let Some(html) = self.html.as_ref().filter(|h| !h.is_empty()) {
            alternatives.push(MimeNode::text("html", html));
        }
        if alternatives.is_empty() {
            alternatives.push(MimeNode::text("plain", ""));
        }

        let alternative = MimeNode::Multipart(Multipart {
            subtype: "alternative",
            boundary: boundary(fingerprint, 1),
            children: alternatives,
        });

        if self.attachments.is_empty() {
            alternative
        } else {
            let mut children = Vec::with_capacity(1 + self.attachments.len());
            children.push(alternative);
            children.extend(self.attachments.iter().map(MimeNode::attachment));

            MimeNode::Multipart(Multipart {
                subtype: "mixed",
                boundary: boundary(fingerprint, 0),
                children,
            })
        }
    }

    /// Serialise the whole message.
    ///
    /// The output always starts with the top-level `Content-Type` header,
    /// folded over exactly two lines.
    pub fn serialize(&self) -> Vec<u8> {
        let tree = self.mime_tree();
        let mut out = tree.header_block();
        out.extend_from_slice(b"MIME-Version: 1.0\r\n");
        for (name, value) in self.headers() {
            push_header(&mut out, name, &value);
        }
        out.extend_from_slice(b"\r\n");
        tree.write_content(&mut out);
        out
    }

    /// Return the content of the part at the given 1-based path, or `None`
    /// if there is no such part.
    pub fn resolve_part(&self, path: &[u32]) -> Option<Vec<u8>> {
        let tree = self.mime_tree();
        let node = tree.descend(path)?;
        let mut out = Vec::new();
        node.write_content(&mut out);
        Some(out)
    }

    /// Return the MIME header block (including the terminating blank line)
    /// of the part at the given 1-based path, or `None` if there is no such
    /// part.
    pub fn resolve_part_headers(&self, path: &[u32]) -> Option<Vec<u8>> {
        let tree = self.mime_tree();
        let node = tree.descend(path)?;
        let mut out = node.header_block();
        out.extend_from_slice(b"\r\n");
        Some(out)
    }

    /// The informational headers written into the serialised message.
    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(date) = self.date {
            headers.push(("Date", format_date(&date)));
        }
        if let Some(ref subject) = self.subject {
            headers.push(("Subject", ew_encode(subject).into_owned()));
        }
        let lists: [(&'static str, &[Mailbox]); 6] = [
            ("From", &self.from),
            ("Sender", &self.sender),
            ("Reply-To", &self.reply_to),
            ("To", &self.to),
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
        ];
        for &(name, list) in &lists {
            if !list.is_empty() {
                headers.push((name, format_address_list(list)));
            }
        }
        headers
    }

    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.subject.hash(&mut hasher);
        self.from.hash(&mut hasher);
        self.text.hash(&mut hasher);
        self.html.hash(&mut hasher);
        self.attachments.hash(&mut hasher);
        hasher.finish()
    }
}

/// Format a timestamp the way the `Date` header wants it.
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

fn boundary(fingerprint: u64, depth: u32) -> String {
    format!("=_ferrymap_{:016x}_{}", fingerprint, depth)
}

fn push_header(dst: &mut Vec<u8>, name: &str, value: &str) {
    dst.extend_from_slice(name.as_bytes());
    dst.extend_from_slice(b": ");
    dst.extend_from_slice(value.as_bytes());
    dst.extend_from_slice(b"\r\n");
}

fn mailboxes(address: Option<&Address<'_>>) -> Vec<Mailbox> {
    fn push(dst: &mut Vec<Mailbox>, addr: &Addr<'_>) {
        if let Some(address) = addr.address.as_deref() {
            dst.push(Mailbox::new(addr.name.as_deref(), address));
        }
    }

    let mut out = Vec::new();
    match address {
        Some(Address::List(list)) => {
            for addr in list {
                push(&mut out, addr);
            }
        }
        Some(Address::Group(groups)) => {
            for group in groups {
                for addr in &group.addresses {
                    push(&mut out, addr);
                }
            }
        }
        None => (),
    }
    out
}

/// A node of the synthesised MIME layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MimeNode {
    Leaf(Leaf),
    Multipart(Multipart),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    /// Type and subtype, lowercase.
    pub media_type: (String, String),
    pub content_type_parms: Vec<(String, String)>,
    /// The disposition and its parameters, if any.
    pub disposition: Option<(String, Vec<(String, String)>)>,
    pub content_transfer_encoding: &'static str,
    /// Whether this is a text part for which line counts are reported.
    pub is_text: bool,
    /// The content, in its transfer encoding.
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multipart {
    pub subtype: &'static str,
    pub boundary: String,
    pub children: Vec<MimeNode>,
}

impl MimeNode {
    fn text(subtype: &str, content: &str) -> Self {
        MimeNode::Leaf(Leaf {
            media_type: ("text".to_owned(), subtype.to_owned()),
            content_type_parms: vec![("charset".to_owned(), "utf-8".to_owned())],
            disposition: None,
            content_transfer_encoding: "8bit",
            is_text: true,
            body: content.as_bytes().to_vec(),
        })
    }

    fn attachment(attachment: &Attachment) -> Self {
        MimeNode::Leaf(Leaf {
            media_type: attachment.media_type(),
            content_type_parms: vec![(
                "name".to_owned(),
                attachment.filename.clone(),
            )],
            disposition: Some((
                "attachment".to_owned(),
                vec![("filename".to_owned(), attachment.filename.clone())],
            )),
            content_transfer_encoding: "base64",
            is_text: false,
            body: base64_lines(&attachment.content),
        })
    }

    /// Walk down the tree along a 1-based path.
    pub fn descend(&self, path: &[u32]) -> Option<&MimeNode> {
        if path.is_empty() {
            return None;
        }

        let mut node = self;
        for &subscript in path {
            node = match *node {
                MimeNode::Multipart(ref mp) => mp
                    .children
                    .get((subscript as usize).checked_sub(1)?)?,
                MimeNode::Leaf(_) => return None,
            };
        }

        Some(node)
    }

    /// The `Content-*` headers describing this node, without the trailing
    /// blank line.
    pub fn header_block(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match *self {
            MimeNode::Multipart(ref mp) => {
                out.extend_from_slice(
                    format!(
                        "Content-Type: multipart/{};\r\n boundary=\"{}\"\r\n",
                        mp.subtype, mp.boundary
                    )
                    .as_bytes(),
                );
            }
            MimeNode::Leaf(ref leaf) => {
                let mut ct =
                    format!("{}/{}", leaf.media_type.0, leaf.media_type.1);
                push_parms(&mut ct, &leaf.content_type_parms);
                push_header(&mut out, "Content-Type", &ct);
                push_header(
                    &mut out,
                    "Content-Transfer-Encoding",
                    leaf.content_transfer_encoding,
                );
                if let Some((ref disposition, ref parms)) = leaf.disposition {
                    let mut cd = disposition.clone();
                    push_parms(&mut cd, parms);
                    push_header(&mut out, "Content-Disposition", &cd);
                }
            }
        }
        out
    }

    /// Write the content of this node, i.e. everything after its header
    /// block.
    pub fn write_content(&self, dst: &mut Vec<u8>) {
        match *self {
            MimeNode::Leaf(ref leaf) => dst.extend_from_slice(&leaf.body),
            MimeNode::Multipart(ref mp) => {
                for child in &mp.children {
                    dst.extend_from_slice(b"--");
                    dst.extend_from_slice(mp.boundary.as_bytes());
                    dst.extend_from_slice(b"\r\n");
                    dst.extend_from_slice(&child.header_block());
                    dst.extend_from_slice(b"\r\n");
                    child.write_content(dst);
                    dst.extend_from_slice(b"\r\n");
                }
                dst.extend_from_slice(b"--");
                dst.extend_from_slice(mp.boundary.as_bytes());
                dst.extend_from_slice(b"--\r\n");
            }
        }
    }
}

fn push_parms(dst: &mut String, parms: &[(String, String)]) {
    for &(ref name, ref value) in parms {
        dst.push_str("; ");
        dst.push_str(name);
        dst.push_str("=\"");
        dst.push_str(&quote_escape(&ew_encode(value)));
        dst.push('"');
    }
}

fn base64_lines(content: &[u8]) -> Vec<u8> {
    let encoded = base64::encode(content);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 38);
    for (ix, line) in encoded.as_bytes().chunks(76).enumerate() {
        if 0 != ix {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(line);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::*;

    #[test]
    fn parse_simple_message() {
        let message = ParsedMessage::parse(SIMPLE_TEXT).unwrap();
        assert_eq!(Some("Invoice #4"), message.subject.as_deref());
        assert_eq!(
            vec![Mailbox::new(Some("Alice Example"), "alice@example.com")],
            message.from
        );
        assert_eq!(
            vec![
                Mailbox::new(None, "bob@example.org"),
                Mailbox::new(Some("Carol"), "carol@example.net"),
            ],
            message.to
        );
        assert!(message.sender.is_empty());
        assert!(message.text.as_deref().unwrap().contains("amount due"));
        assert_eq!(None, message.html);
        assert!(message.attachments.is_empty());
        assert_eq!(
            FixedOffset::east(3600).ymd(2020, 3, 14).and_hms(9, 26, 53),
            message.date.unwrap()
        );
    }

    #[test]
    fn parse_multipart_with_attachment() {
        let message = ParsedMessage::parse(WITH_ATTACHMENT).unwrap();
        assert_eq!(Some("Quarterly report"), message.subject.as_deref());
        assert!(message.text.as_deref().unwrap().contains("See attached"));
        assert!(message.html.as_deref().unwrap().contains("<b>attached</b>"));
        assert_eq!(1, message.attachments.len());
        let att = &message.attachments[0];
        assert_eq!("report.pdf", att.filename);
        assert_eq!(
            ("application".to_owned(), "pdf".to_owned()),
            att.media_type()
        );
        assert_eq!(b"%PDF-1.4 fake".to_vec(), att.content);
    }

    #[test]
    fn unparseable_message_is_an_error() {
        assert_matches!(
            Err(Error::UnparseableMessage),
            ParsedMessage::parse(b"")
        );
    }

    #[test]
    fn malformed_content_type_falls_back_to_octet_stream() {
        for ct in &["", "garbage", "/x", "text/", "te xt/plain"] {
            let att = Attachment {
                content_type: (*ct).to_owned(),
                ..Attachment::default()
            };
            assert_eq!(
                ("application".to_owned(), "octet-stream".to_owned()),
                att.media_type(),
                "for {:?}",
                ct
            );
        }
    }

    #[test]
    fn address_splitting() {
        let m = Mailbox::new(None, "odd@local@example.com");
        assert_eq!(("odd@local", Some("example.com")), m.split_address());
        let m = Mailbox::new(None, "postmaster");
        assert_eq!(("postmaster", None), m.split_address());
    }

    #[test]
    fn mailbox_display_forms() {
        assert_eq!("a@b.com", Mailbox::new(None, "a@b.com").to_string());
        assert_eq!("A <a@b.com>", Mailbox::new(Some("A"), "a@b.com").to_string());
        assert_eq!(
            "\"Last, First\" <a@b.com>",
            Mailbox::new(Some("Last, First"), "a@b.com").to_string()
        );
        assert_eq!(
            "=?utf-8?q?J=C3=B6rg?= <j@b.com>",
            Mailbox::new(Some("Jörg"), "j@b.com").to_string()
        );
    }

    #[test]
    fn empty_message_gets_placeholder_part() {
        let message = ParsedMessage::default();
        match message.mime_tree() {
            MimeNode::Multipart(ref mp) => {
                assert_eq!("alternative", mp.subtype);
                assert_eq!(1, mp.children.len());
                assert_matches!(MimeNode::Leaf(_), &mp.children[0]);
            }
            other => panic!("Unexpected tree: {:?}", other),
        }
        assert_eq!(Some(vec![]), message.resolve_part(&[1]));
    }

    #[test]
    fn serialization_layout() {
        let message = ParsedMessage {
            subject: Some("Hi".to_owned()),
            from: vec![Mailbox::new(Some("A"), "a@b.com")],
            text: Some("hello\r\nworld".to_owned()),
            html: Some("<p>hello</p>".to_owned()),
            attachments: vec![Attachment {
                filename: "a.txt".to_owned(),
                content_type: "text/plain".to_owned(),
                content: b"attached".to_vec(),
            }],
            ..ParsedMessage::default()
        };

        let raw = String::from_utf8(message.serialize()).unwrap();
        let mut lines = raw.split("\r\n");
        assert_eq!(Some("Content-Type: multipart/mixed;"), lines.next());
        assert!(lines.next().unwrap().starts_with(" boundary=\"=_ferrymap_"));
        assert_eq!(Some("MIME-Version: 1.0"), lines.next());
        assert_eq!(Some("Subject: Hi"), lines.next());
        assert_eq!(Some("From: A <a@b.com>"), lines.next());
        assert_eq!(Some(""), lines.next());

        // Boundaries are derived from content, so serialisation is stable.
        assert_eq!(raw.as_bytes(), &message.serialize()[..]);
        assert_eq!(
            Some(b"hello\r\nworld".to_vec()),
            message.resolve_part(&[1, 1])
        );
        assert_eq!(
            Some(b"<p>hello</p>".to_vec()),
            message.resolve_part(&[1, 2])
        );
        assert_eq!(
            Some(base64::encode("attached").into_bytes()),
            message.resolve_part(&[2])
        );
        assert_eq!(None, message.resolve_part(&[3]));
        assert_eq!(None, message.resolve_part(&[1, 1, 1]));
        assert_eq!(None, message.resolve_part(&[0]));
        assert_eq!(None, message.resolve_part(&[]));

        let headers =
            String::from_utf8(message.resolve_part_headers(&[2]).unwrap())
                .unwrap();
        assert_eq!(
            "Content-Type: text/plain; name=\"a.txt\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"a.txt\"\r\n\r\n",
            headers
        );

        // The nested multipart's content is its full body, boundaries and
        // all, and it appears verbatim in the whole message.
        let alternative =
            String::from_utf8(message.resolve_part(&[1]).unwrap()).unwrap();
        assert!(alternative.starts_with("--=_ferrymap_"));
        assert!(raw.contains(&alternative));
    }

    #[test]
    fn serialized_message_parses_back() {
        let original = ParsedMessage::parse(WITH_ATTACHMENT).unwrap();
        let reparsed = ParsedMessage::parse(&original.serialize()).unwrap();
        assert_eq!(original.subject, reparsed.subject);
        assert_eq!(original.from, reparsed.from);
        assert_eq!(original.attachments, reparsed.attachments);
    }
}
