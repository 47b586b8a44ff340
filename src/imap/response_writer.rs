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

//! The response side of the wire protocol.
//!
//! Responses are built as a small AST by the command processor and then
//! rendered through a `LexWriter`, which decides between atoms, quoted
//! strings and literals and handles downgrading non-ASCII text for clients
//! that are not Unicode-aware.

use std::borrow::Cow;
use std::io::{self, Write};

use super::lex::LexWriter;
use crate::account::model::Seqnum;
use crate::mime::fetch::bodystructure::BodyStructure;
use crate::mime::fetch::envelope::{Envelope, EnvelopeAddress};
use crate::mime::fetch::FetchedItem;

/// A complete response line.
#[derive(Clone, Debug)]
pub struct ResponseLine {
    /// The tag of the command being completed, or `None` for untagged
    /// (`*`) responses.
    pub tag: Option<String>,
    pub response: Response,
}

#[derive(Clone, Debug)]
pub enum Response {
    Cond(CondResponse),
    /// `* SEARCH`, with the hits in mailbox order.
    Search(Vec<u32>),
    Esearch(EsearchResponse),
    Fetch(FetchResponse),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespCondType {
    Ok,
    No,
    Bad,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondResponse {
    pub cond: RespCondType,
    pub code: Option<RespTextCode>,
    pub quip: Option<Cow<'static, str>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RespTextCode {
    BadCharset(Vec<&'static str>),
    ClientBug,
    Nonexistent,
    Parse,
    ServerBug,
}

/// RFC 4731 `ESEARCH` response data.
///
/// Only the fields that were requested are set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EsearchResponse {
    pub tag: String,
    pub uid: bool,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub count: Option<usize>,
    /// The hits, already rendered as a sequence set.
    pub all: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub seqnum: Seqnum,
    pub items: Vec<FetchedItem>,
}

impl ResponseLine {
    /// Write this line, including the terminating CRLF.
    pub fn write_to(&self, w: &mut LexWriter<impl Write>) -> io::Result<()> {
        match self.tag {
            Some(ref tag) => w.verbatim(tag)?,
            None => w.verbatim("*")?,
        }
        w.verbatim(" ")?;
        self.response.write_to(w)?;
        w.verbatim("\r\n")
    }
}

impl Response {
    pub fn write_to(&self, w: &mut LexWriter<impl Write>) -> io::Result<()> {
        match *self {
            Response::Cond(ref cr) => cr.write_to(w),
            Response::Search(ref hits) => {
                w.verbatim("SEARCH")?;
                for &hit in hits {
                    w.verbatim(" ")?;
                    w.num_u32(hit)?;
                }
                Ok(())
            }
            Response::Esearch(ref es) => es.write_to(w),
            Response::Fetch(ref fr) => fr.write_to(w),
        }
    }
}

impl CondResponse {
    fn write_to(&self, w: &mut LexWriter<impl Write>) -> io::Result<()> {
        w.verbatim(match self.cond {
            RespCondType::Ok => "OK",
            RespCondType::No => "NO",
            RespCondType::Bad => "BAD",
        })?;

        if let Some(ref code) = self.code {
            w.verbatim(" [")?;
            match *code {
                RespTextCode::BadCharset(ref charsets) => {
                    w.verbatim("BADCHARSET (")?;
                    w.verbatim(&charsets.join(" "))?;
                    w.verbatim(")")?;
                }
                RespTextCode::ClientBug => w.verbatim("CLIENTBUG")?,
                RespTextCode::Nonexistent => w.verbatim("NONEXISTENT")?,
                RespTextCode::Parse => w.verbatim("PARSE")?,
                RespTextCode::ServerBug => w.verbatim("SERVERBUG")?,
            }
            w.verbatim("]")?;
        }

        w.verbatim(" ")?;
        w.verbatim(self.quip.as_deref().unwrap_or("Done"))
    }
}

impl EsearchResponse {
    fn write_to(&self, w: &mut LexWriter<impl Write>) -> io::Result<()> {
        w.verbatim("ESEARCH (TAG ")?;
        w.censored_string(&self.tag)?;
        w.verbatim(")")?;
        if self.uid {
            w.verbatim(" UID")?;
        }
        if let Some(min) = self.min {
            w.verbatim(" MIN ")?;
            w.num_u32(min)?;
        }
        if let Some(max) = self.max {
            w.verbatim(" MAX ")?;
            w.num_u32(max)?;
        }
        if let Some(count) = self.count {
            w.verbatim(" COUNT ")?;
            w.num_u64(count as u64)?;
        }
        if let Some(ref all) = self.all {
            w.verbatim(" ALL ")?;
            w.verbatim(all)?;
        }
        Ok(())
    }
}

impl FetchResponse {
    fn write_to(&self, w: &mut LexWriter<impl Write>) -> io::Result<()> {
        w.num_u32(self.seqnum.0.get())?;
        w.verbatim(" FETCH (")?;
        for (ix, item) in self.items.iter().enumerate() {
            if 0 != ix {
                w.verbatim(" ")?;
            }
            write_fetched_item(w, item)?;
        }
        w.verbatim(")")
    }
}

fn write_fetched_item(
    w: &mut LexWriter<impl Write>,
    item: &FetchedItem,
) -> io::Result<()> {
    match *item {
        FetchedItem::Uid(uid) => {
            w.verbatim("UID ")?;
            w.num_u32(uid.0.get())
        }
        FetchedItem::Envelope(ref envelope) => {
            w.verbatim("ENVELOPE ")?;
            write_envelope(w, envelope)
        }
        FetchedItem::BodyStructure(ref bs) => {
            w.verbatim(if bs.extended {
                "BODYSTRUCTURE "
            } else {
                "BODY "
            })?;
            write_body_structure(w, bs)
        }
        FetchedItem::Rfc822Size(size) => {
            w.verbatim("RFC822.SIZE ")?;
            w.num_u32(size)
        }
        FetchedItem::Flags(ref flags) => {
            w.verbatim("FLAGS (")?;
            for (ix, flag) in flags.iter().enumerate() {
                if 0 != ix {
                    w.verbatim(" ")?;
                }
                w.flag(flag)?;
            }
            w.verbatim(")")
        }
        FetchedItem::InternalDate(ref datetime) => {
            w.verbatim("INTERNALDATE ")?;
            w.datetime(datetime)
        }
        FetchedItem::BodySection((ref section, ref data)) => {
            w.verbatim(&section.to_string())?;
            w.verbatim(" ")?;
            w.literal(data)
        }
    }
}

fn write_envelope(
    w: &mut LexWriter<impl Write>,
    envelope: &Envelope,
) -> io::Result<()> {
    w.verbatim("(")?;
    w.censored_nstring(&envelope.date)?;
    w.verbatim(" ")?;
    w.encoded_nstring(&envelope.subject)?;
    for list in &[
        &envelope.from,
        &envelope.sender,
        &envelope.reply_to,
        &envelope.to,
        &envelope.cc,
        &envelope.bcc,
    ] {
        w.verbatim(" ")?;
        write_address_list(w, list)?;
    }
    w.verbatim(" ")?;
    w.censored_nstring(&envelope.in_reply_to)?;
    w.verbatim(" ")?;
    w.censored_nstring(&envelope.message_id)?;
    w.verbatim(")")
}

fn write_address_list(
    w: &mut LexWriter<impl Write>,
    list: &[EnvelopeAddress],
) -> io::Result<()> {
    if list.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for address in list {
        w.verbatim("(")?;
        w.encoded_nstring(&address.name)?;
        w.verbatim(" NIL ")?;
        w.censored_string(&address.local)?;
        w.verbatim(" ")?;
        w.censored_nstring(&address.domain)?;
        w.verbatim(")")?;
    }
    w.verbatim(")")
}

fn write_body_structure(
    w: &mut LexWriter<impl Write>,
    bs: &BodyStructure,
) -> io::Result<()> {
    w.verbatim("(")?;
    if bs.is_multipart() {
        for child in &bs.children {
            write_body_structure(w, child)?;
        }
        w.verbatim(" ")?;
        w.censored_string(&bs.content_type.1)?;
        if bs.extended {
            w.verbatim(" ")?;
            write_parms(w, &bs.content_type_parms)?;
            // Disposition, language, location
            w.verbatim(" NIL NIL NIL")?;
        }
    } else {
        w.censored_string(&bs.content_type.0)?;
        w.verbatim(" ")?;
        w.censored_string(&bs.content_type.1)?;
        w.verbatim(" ")?;
        write_parms(w, &bs.content_type_parms)?;
        // Content-ID and Content-Description are never retained.
        w.verbatim(" NIL NIL ")?;
        w.censored_string(&bs.content_transfer_encoding)?;
        w.verbatim(" ")?;
        w.num_u64(bs.size_octets)?;
        if bs.is_text() {
            w.verbatim(" ")?;
            w.num_u64(bs.size_lines)?;
        }

        if bs.extended {
            // MD5
            w.verbatim(" NIL ")?;
            match bs.content_disposition {
                None => w.nil()?,
                Some(ref disposition) => {
                    w.verbatim("(")?;
                    w.censored_string(disposition)?;
                    w.verbatim(" ")?;
                    write_parms(w, &bs.content_disposition_parms)?;
                    w.verbatim(")")?;
                }
            }
            // Language, location
            w.verbatim(" NIL NIL")?;
        }
    }
    w.verbatim(")")
}

fn write_parms(
    w: &mut LexWriter<impl Write>,
    parms: &[(String, String)],
) -> io::Result<()> {
    if parms.is_empty() {
        return w.nil();
    }

    w.verbatim("(")?;
    for (ix, &(ref name, ref value)) in parms.iter().enumerate() {
        if 0 != ix {
            w.verbatim(" ")?;
        }
        w.censored_string(name)?;
        w.verbatim(" ")?;
        w.encoded_nstring(&Some(value))?;
    }
    w.verbatim(")")
}

#[cfg(test)]
mod test {
    use chrono::prelude::*;

    use super::*;
    use crate::account::model::*;
    use crate::mime::fetch::section::{BodySection, LeafType};

    fn render(unicode: bool, line: ResponseLine) -> String {
        let mut w = LexWriter::new(Vec::<u8>::new(), unicode);
        line.write_to(&mut w).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    fn untagged(response: Response) -> String {
        render(false, ResponseLine {
            tag: None,
            response,
        })
    }

    fn leaf(typ: &str, subtype: &str, extended: bool) -> BodyStructure {
        BodyStructure {
            content_type: (typ.to_owned(), subtype.to_owned()),
            content_type_parms: vec![],
            content_disposition: None,
            content_disposition_parms: vec![],
            content_transfer_encoding: "8bit".to_owned(),
            size_octets: 12,
            size_lines: 2,
            extended,
            children: vec![],
        }
    }

    #[test]
    fn cond_responses() {
        assert_eq!(
            "a1 OK Done\r\n",
            render(false, ResponseLine {
                tag: Some("a1".to_owned()),
                response: Response::Cond(CondResponse {
                    cond: RespCondType::Ok,
                    code: None,
                    quip: None,
                }),
            })
        );
        assert_eq!(
            "a2 NO [BADCHARSET (us-ascii utf-8)] Unsupported charset\r\n",
            render(false, ResponseLine {
                tag: Some("a2".to_owned()),
                response: Response::Cond(CondResponse {
                    cond: RespCondType::No,
                    code: Some(RespTextCode::BadCharset(vec![
                        "us-ascii", "utf-8",
                    ])),
                    quip: Some(Cow::Borrowed("Unsupported charset")),
                }),
            })
        );
    }

    #[test]
    fn search_responses() {
        assert_eq!("* SEARCH\r\n", untagged(Response::Search(vec![])));
        assert_eq!(
            "* SEARCH 2 3 10\r\n",
            untagged(Response::Search(vec![2, 3, 10]))
        );
    }

    #[test]
    fn esearch_responses() {
        assert_eq!(
            "* ESEARCH (TAG \"t1\") UID MIN 2 MAX 10 COUNT 3 ALL 2:3,10\r\n",
            untagged(Response::Esearch(EsearchResponse {
                tag: "t1".to_owned(),
                uid: true,
                min: Some(2),
                max: Some(10),
                count: Some(3),
                all: Some("2:3,10".to_owned()),
            }))
        );
        assert_eq!(
            "* ESEARCH (TAG \"t2\") COUNT 0\r\n",
            untagged(Response::Esearch(EsearchResponse {
                tag: "t2".to_owned(),
                count: Some(0),
                ..EsearchResponse::default()
            }))
        );
    }

    #[test]
    fn fetch_simple_items() {
        let date = FixedOffset::east(3600).ymd(2020, 3, 14).and_hms(9, 26, 53);
        assert_eq!(
            "* 3 FETCH (UID 12 RFC822.SIZE 345 FLAGS (\\Seen $Junk) \
             INTERNALDATE \"14-Mar-2020 09:26:53 +0100\")\r\n",
            untagged(Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(3),
                items: vec![
                    FetchedItem::Uid(Uid::u(12)),
                    FetchedItem::Rfc822Size(345),
                    FetchedItem::Flags(vec![Flag::Seen, Flag::junk()]),
                    FetchedItem::InternalDate(date),
                ],
            }))
        );
    }

    #[test]
    fn fetch_section_is_a_literal() {
        let section = BodySection {
            subscripts: vec![1],
            leaf_type: LeafType::Content,
            partial: Some((2, 100)),
            peek: true,
            ..BodySection::default()
        };
        assert_eq!(
            "* 1 FETCH (BODY[1]<2> {5}\r\nhello)\r\n",
            untagged(Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(1),
                items: vec![FetchedItem::BodySection((
                    section,
                    b"hello".to_vec()
                ))],
            }))
        );
    }

    #[test]
    fn envelope_rendering() {
        let envelope = Envelope {
            date: Some("Sat, 14 Mar 2020 09:26:53 +0100".to_owned()),
            subject: Some("Grüße".to_owned()),
            from: vec![EnvelopeAddress {
                name: Some("Jörg".to_owned()),
                routing: (),
                local: "joerg".to_owned(),
                domain: Some("example.de".to_owned()),
            }],
            sender: vec![],
            reply_to: vec![],
            to: vec![EnvelopeAddress {
                name: None,
                routing: (),
                local: "bob".to_owned(),
                domain: None,
            }],
            cc: vec![],
            bcc: vec![],
            in_reply_to: None,
            message_id: Some("<7@mx.example>".to_owned()),
        };

        assert_eq!(
            "* 1 FETCH (ENVELOPE (\"Sat, 14 Mar 2020 09:26:53 +0100\" \
             \"=?utf-8?q?Gr=C3=BC=C3=9Fe?=\" \
             ((\"=?utf-8?q?J=C3=B6rg?=\" NIL \"joerg\" \"example.de\")) \
             NIL NIL ((NIL NIL \"bob\" NIL)) NIL NIL NIL \
             \"<7@mx.example>\"))\r\n",
            untagged(Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(1),
                items: vec![FetchedItem::Envelope(Box::new(envelope.clone()))],
            }))
        );

        let unicode = render(true, ResponseLine {
            tag: None,
            response: Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(1),
                items: vec![FetchedItem::Envelope(Box::new(envelope))],
            }),
        });
        assert!(unicode.contains("\"Grüße\" ((\"Jörg\" NIL"));
    }

    #[test]
    fn body_structure_basic_form() {
        let mut bs = leaf("multipart", "alternative", false);
        bs.content_type_parms =
            vec![("boundary".to_owned(), "b1".to_owned())];
        bs.children = vec![
            leaf("text", "plain", false),
            leaf("application", "pdf", false),
        ];

        assert_eq!(
            "* 1 FETCH (BODY ((\"text\" \"plain\" NIL NIL NIL \"8bit\" 12 2)\
             (\"application\" \"pdf\" NIL NIL NIL \"8bit\" 12) \
             \"alternative\"))\r\n",
            untagged(Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(1),
                items: vec![FetchedItem::BodyStructure(Box::new(bs))],
            }))
        );
    }

    #[test]
    fn body_structure_extended_form() {
        let mut attachment = leaf("application", "pdf", true);
        attachment.content_type_parms =
            vec![("name".to_owned(), "report.pdf".to_owned())];
        attachment.content_disposition = Some("attachment".to_owned());
        attachment.content_disposition_parms =
            vec![("filename".to_owned(), "report.pdf".to_owned())];
        attachment.content_transfer_encoding = "base64".to_owned();

        let mut bs = leaf("multipart", "mixed", true);
        bs.content_type_parms =
            vec![("boundary".to_owned(), "b1".to_owned())];
        bs.children = vec![leaf("text", "plain", true), attachment];

        assert_eq!(
            "* 1 FETCH (BODYSTRUCTURE (\
             (\"text\" \"plain\" NIL NIL NIL \"8bit\" 12 2 NIL NIL NIL NIL)\
             (\"application\" \"pdf\" (\"name\" \"report.pdf\") NIL NIL \
             \"base64\" 12 NIL (\"attachment\" (\"filename\" \"report.pdf\")) \
             NIL NIL) \
             \"mixed\" (\"boundary\" \"b1\") NIL NIL NIL))\r\n",
            untagged(Response::Fetch(FetchResponse {
                seqnum: Seqnum::u(1),
                items: vec![FetchedItem::BodyStructure(Box::new(bs))],
            }))
        );
    }
}
