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

//! Parser for the subset of IMAP request syntax that Ferrymap understands.
//!
//! Parsing produces a raw AST which closely mirrors the formal syntax of RFC
//! 3501 (plus the RFC 4731 `RETURN` clause). Turning the AST into requests
//! against a mailbox is the job of the command processor, since that needs
//! the mailbox snapshot to resolve `*` in sequence sets.
//!
//! The parsers here accept a single command line, with literals inlined. A
//! trailing CRLF is optional.

use std::borrow::Cow;
use std::str;

use chrono::prelude::*;
use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag, tag_no_case as kw},
    combinator::{all_consuming, map, map_opt, opt},
    error::ErrorKind,
    *,
};

use crate::account::model::Flag;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub tag: Cow<'a, str>,
    pub cmd: Command<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Search(SearchCommand<'a>),
    Fetch(FetchCommand<'a>),
    Uid(UidCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UidCommand<'a> {
    Search(SearchCommand<'a>),
    Fetch(FetchCommand<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchCommand<'a> {
    /// `None` for a classic `SEARCH`. An empty list is `RETURN ()`.
    pub return_opts: Option<Vec<SearchReturnOpt>>,
    pub charset: Option<Cow<'a, str>>,
    pub keys: Vec<SearchKey<'a>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchReturnOpt {
    Min,
    Max,
    Count,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleSearchKey {
    All,
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unseen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextSearchKeyType {
    Bcc,
    Body,
    Cc,
    From,
    Subject,
    Text,
    To,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSearchKey<'a> {
    pub typ: TextSearchKeyType,
    pub value: Cow<'a, str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateSearchKeyType {
    Before,
    On,
    Since,
    SentBefore,
    SentOn,
    SentSince,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateSearchKey {
    pub typ: DateSearchKeyType,
    pub date: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchKeyHeader<'a> {
    pub header: Cow<'a, str>,
    pub value: Cow<'a, str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchKeyOr<'a> {
    pub a: Box<SearchKey<'a>>,
    pub b: Box<SearchKey<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKey<'a> {
    Simple(SimpleSearchKey),
    Text(TextSearchKey<'a>),
    Date(DateSearchKey),
    Keyword(Flag),
    Unkeyword(Flag),
    Header(SearchKeyHeader<'a>),
    Larger(u32),
    Not(Box<SearchKey<'a>>),
    Or(SearchKeyOr<'a>),
    Smaller(u32),
    Uid(Cow<'a, str>),
    Seqnum(Cow<'a, str>),
    And(Vec<SearchKey<'a>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCommand<'a> {
    pub messages: Cow<'a, str>,
    pub target: FetchCommandTarget<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchCommandTarget<'a> {
    All,
    Fast,
    Full,
    Single(FetchAtt<'a>),
    Multi(Vec<FetchAtt<'a>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchAtt<'a> {
    Envelope,
    Flags,
    InternalDate,
    Rfc822,
    Rfc822Header,
    Rfc822Size,
    Rfc822Text,
    /// `BODY` without a section: the non-extensible body structure.
    ShortBodyStructure,
    ExtendedBodyStructure,
    Uid,
    Body(FetchAttBody<'a>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchAttBody<'a> {
    pub peek: bool,
    pub section: Option<SectionSpec<'a>>,
    /// `<start.length>`
    pub slice: Option<(u32, u32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionSpec<'a> {
    /// The part path, possibly empty.
    pub subscripts: Vec<u32>,
    pub text: Option<SectionText<'a>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionText<'a> {
    Header,
    HeaderFields(Vec<Cow<'a, str>>),
    HeaderFieldsNot(Vec<Cow<'a, str>>),
    Text,
    Mime,
}

impl<'a> CommandLine<'a> {
    /// Parse a complete command line.
    pub fn parse(i: &'a [u8]) -> Result<Self, ()> {
        all_consuming(sequence::terminated(
            command_line,
            opt(tag("\r\n")),
        ))(i)
        .map(|(_, cl)| cl)
        .map_err(|_| ())
    }

    /// Extract just the tag of a command line, for reporting errors on
    /// lines that don't otherwise parse.
    pub fn parse_tag(i: &'a [u8]) -> Option<Cow<'a, str>> {
        sequence::terminated(tag_atom, tag(" "))(i)
            .ok()
            .map(|(_, t)| t)
    }
}

fn command_line(i: &[u8]) -> IResult<&[u8], CommandLine<'_>> {
    map(
        sequence::pair(sequence::terminated(tag_atom, tag(" ")), command),
        |(tag, cmd)| CommandLine { tag, cmd },
    )(i)
}

fn command(i: &[u8]) -> IResult<&[u8], Command<'_>> {
    alt((
        map(search_command, Command::Search),
        map(fetch_command, Command::Fetch),
        map(
            sequence::preceded(
                kw("UID "),
                alt((
                    map(search_command, UidCommand::Search),
                    map(fetch_command, UidCommand::Fetch),
                )),
            ),
            Command::Uid,
        ),
    ))(i)
}

// ==================== SEARCH ====================

fn search_command(i: &[u8]) -> IResult<&[u8], SearchCommand<'_>> {
    map(
        sequence::preceded(
            kw("SEARCH "),
            sequence::tuple((
                opt(sequence::terminated(search_return_opts, tag(" "))),
                opt(sequence::delimited(kw("CHARSET "), astring, tag(" "))),
                multi::separated_nonempty_list(tag(" "), search_key),
            )),
        ),
        |(return_opts, charset, keys)| SearchCommand {
            return_opts,
            charset,
            keys,
        },
    )(i)
}

fn search_return_opts(i: &[u8]) -> IResult<&[u8], Vec<SearchReturnOpt>> {
    sequence::delimited(
        kw("RETURN ("),
        multi::separated_list(
            tag(" "),
            alt((
                map(word("MIN"), |_| SearchReturnOpt::Min),
                map(word("MAX"), |_| SearchReturnOpt::Max),
                map(word("COUNT"), |_| SearchReturnOpt::Count),
                map(word("ALL"), |_| SearchReturnOpt::All),
            )),
        ),
        tag(")"),
    )(i)
}

/// Maximum nesting of `NOT`, `OR` and parenthesised keys.
const MAX_SEARCH_DEPTH: u32 = 64;

fn search_key(i: &[u8]) -> IResult<&[u8], SearchKey<'_>> {
    search_key_at(i, 0)
}

fn search_key_at(i: &[u8], depth: u32) -> IResult<&[u8], SearchKey<'_>> {
    if depth > MAX_SEARCH_DEPTH {
        return Err(nom::Err::Failure((i, ErrorKind::TooLarge)));
    }

    // Broken up to keep the alt() expansions manageable.
    alt((
        map(simple_search_key, SearchKey::Simple),
        map(text_search_key, SearchKey::Text),
        map(date_search_key, SearchKey::Date),
        move |i| compound_search_key(i, depth),
    ))(i)
}

fn simple_search_key(i: &[u8]) -> IResult<&[u8], SimpleSearchKey> {
    alt((
        map(word("ALL"), |_| SimpleSearchKey::All),
        map(word("ANSWERED"), |_| SimpleSearchKey::Answered),
        map(word("DELETED"), |_| SimpleSearchKey::Deleted),
        map(word("DRAFT"), |_| SimpleSearchKey::Draft),
        map(word("FLAGGED"), |_| SimpleSearchKey::Flagged),
        map(word("SEEN"), |_| SimpleSearchKey::Seen),
        map(word("UNANSWERED"), |_| SimpleSearchKey::Unanswered),
        map(word("UNDELETED"), |_| SimpleSearchKey::Undeleted),
        map(word("UNDRAFT"), |_| SimpleSearchKey::Undraft),
        map(word("UNFLAGGED"), |_| SimpleSearchKey::Unflagged),
        map(word("UNSEEN"), |_| SimpleSearchKey::Unseen),
    ))(i)
}

fn text_search_key(i: &[u8]) -> IResult<&[u8], TextSearchKey<'_>> {
    map(
        sequence::pair(
            sequence::terminated(
                alt((
                    map(kw("BCC"), |_| TextSearchKeyType::Bcc),
                    map(kw("BODY"), |_| TextSearchKeyType::Body),
                    map(kw("CC"), |_| TextSearchKeyType::Cc),
                    map(kw("FROM"), |_| TextSearchKeyType::From),
                    map(kw("SUBJECT"), |_| TextSearchKeyType::Subject),
                    map(kw("TEXT"), |_| TextSearchKeyType::Text),
                    map(kw("TO"), |_| TextSearchKeyType::To),
                )),
                tag(" "),
            ),
            astring,
        ),
        |(typ, value)| TextSearchKey { typ, value },
    )(i)
}

fn date_search_key(i: &[u8]) -> IResult<&[u8], DateSearchKey> {
    map(
        sequence::pair(
            sequence::terminated(
                alt((
                    map(kw("BEFORE"), |_| DateSearchKeyType::Before),
                    map(kw("ON"), |_| DateSearchKeyType::On),
                    map(kw("SINCE"), |_| DateSearchKeyType::Since),
                    map(kw("SENTBEFORE"), |_| DateSearchKeyType::SentBefore),
                    map(kw("SENTON"), |_| DateSearchKeyType::SentOn),
                    map(kw("SENTSINCE"), |_| DateSearchKeyType::SentSince),
                )),
                tag(" "),
            ),
            date,
        ),
        |(typ, date)| DateSearchKey { typ, date },
    )(i)
}

fn compound_search_key(
    i: &[u8],
    depth: u32,
) -> IResult<&[u8], SearchKey<'_>> {
    let nested = move |i| search_key_at(i, depth + 1);
    alt((
        map(sequence::preceded(kw("KEYWORD "), keyword), SearchKey::Keyword),
        map(
            sequence::preceded(kw("UNKEYWORD "), keyword),
            SearchKey::Unkeyword,
        ),
        map(
            sequence::preceded(
                kw("HEADER "),
                sequence::pair(
                    sequence::terminated(astring, tag(" ")),
                    astring,
                ),
            ),
            |(header, value)| {
                SearchKey::Header(SearchKeyHeader { header, value })
            },
        ),
        map(sequence::preceded(kw("LARGER "), number), SearchKey::Larger),
        map(sequence::preceded(kw("SMALLER "), number), SearchKey::Smaller),
        map(sequence::preceded(kw("NOT "), nested), |k| {
            SearchKey::Not(Box::new(k))
        }),
        map(
            sequence::preceded(
                kw("OR "),
                sequence::pair(
                    sequence::terminated(nested, tag(" ")),
                    nested,
                ),
            ),
            |(a, b)| {
                SearchKey::Or(SearchKeyOr {
                    a: Box::new(a),
                    b: Box::new(b),
                })
            },
        ),
        map(sequence::preceded(kw("UID "), sequence_set), SearchKey::Uid),
        map(sequence_set, SearchKey::Seqnum),
        map(
            sequence::delimited(
                tag("("),
                multi::separated_nonempty_list(tag(" "), nested),
                tag(")"),
            ),
            SearchKey::And,
        ),
    ))(i)
}

// ==================== FETCH ====================

fn fetch_command(i: &[u8]) -> IResult<&[u8], FetchCommand<'_>> {
    map(
        sequence::preceded(
            kw("FETCH "),
            sequence::pair(
                sequence::terminated(sequence_set, tag(" ")),
                fetch_command_target,
            ),
        ),
        |(messages, target)| FetchCommand { messages, target },
    )(i)
}

fn fetch_command_target(i: &[u8]) -> IResult<&[u8], FetchCommandTarget<'_>> {
    alt((
        map(word("ALL"), |_| FetchCommandTarget::All),
        map(word("FAST"), |_| FetchCommandTarget::Fast),
        map(word("FULL"), |_| FetchCommandTarget::Full),
        map(fetch_att, FetchCommandTarget::Single),
        map(
            sequence::delimited(
                tag("("),
                multi::separated_nonempty_list(tag(" "), fetch_att),
                tag(")"),
            ),
            FetchCommandTarget::Multi,
        ),
    ))(i)
}

fn fetch_att(i: &[u8]) -> IResult<&[u8], FetchAtt<'_>> {
    // Order matters: the section forms must be tried before bare `BODY`, and
    // the `RFC822.*` forms before bare `RFC822`.
    alt((
        map(fetch_att_body, FetchAtt::Body),
        map(word("BODYSTRUCTURE"), |_| FetchAtt::ExtendedBodyStructure),
        map(word("BODY"), |_| FetchAtt::ShortBodyStructure),
        map(word("ENVELOPE"), |_| FetchAtt::Envelope),
        map(word("FLAGS"), |_| FetchAtt::Flags),
        map(word("INTERNALDATE"), |_| FetchAtt::InternalDate),
        map(word("RFC822.HEADER"), |_| FetchAtt::Rfc822Header),
        map(word("RFC822.SIZE"), |_| FetchAtt::Rfc822Size),
        map(word("RFC822.TEXT"), |_| FetchAtt::Rfc822Text),
        map(word("RFC822"), |_| FetchAtt::Rfc822),
        map(word("UID"), |_| FetchAtt::Uid),
    ))(i)
}

fn fetch_att_body(i: &[u8]) -> IResult<&[u8], FetchAttBody<'_>> {
    map(
        sequence::tuple((
            alt((map(kw("BODY.PEEK["), |_| true), map(kw("BODY["), |_| false))),
            opt(section_spec),
            tag("]"),
            opt(sequence::delimited(
                tag("<"),
                sequence::separated_pair(number, tag("."), number),
                tag(">"),
            )),
        )),
        |(peek, section, _, slice)| FetchAttBody {
            peek,
            section,
            slice,
        },
    )(i)
}

fn section_spec(i: &[u8]) -> IResult<&[u8], SectionSpec<'_>> {
    alt((
        map(
            sequence::pair(
                multi::separated_nonempty_list(tag("."), number),
                opt(sequence::preceded(tag("."), section_text)),
            ),
            |(subscripts, text)| SectionSpec { subscripts, text },
        ),
        map(section_text, |text| SectionSpec {
            subscripts: vec![],
            text: Some(text),
        }),
    ))(i)
}

fn section_text(i: &[u8]) -> IResult<&[u8], SectionText<'_>> {
    alt((
        map(
            sequence::preceded(kw("HEADER.FIELDS.NOT "), header_list),
            SectionText::HeaderFieldsNot,
        ),
        map(
            sequence::preceded(kw("HEADER.FIELDS "), header_list),
            SectionText::HeaderFields,
        ),
        map(word("HEADER"), |_| SectionText::Header),
        map(word("TEXT"), |_| SectionText::Text),
        map(word("MIME"), |_| SectionText::Mime),
    ))(i)
}

fn header_list(i: &[u8]) -> IResult<&[u8], Vec<Cow<'_, str>>> {
    sequence::delimited(
        tag("("),
        multi::separated_nonempty_list(tag(" "), astring),
        tag(")"),
    )(i)
}

// ==================== PRIMITIVE PARSERS ====================

/// Match the keyword `w` case-insensitively, but only as a whole word.
fn word(w: &'static str) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |i| {
        let (rest, matched) = kw(w)(i)?;
        match rest.first() {
            Some(&b) if b.is_ascii_alphanumeric() || b'.' == b || b'-' == b => {
                Err(nom::Err::Error((i, ErrorKind::Tag)))
            }
            _ => Ok((rest, matched)),
        }
    }
}

fn normal_atom(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    map(
        bytes::complete::take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

fn astring_atom(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    map(
        bytes::complete::take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

fn tag_atom(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    map(
        bytes::complete::take_while1(|b| match b {
            0..=b' ' => false,
            127..=255 => false,
            b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b'+' => false,
            _ => true,
        }),
        String::from_utf8_lossy,
    )(i)
}

fn number(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(character::complete::digit1, |s| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

fn literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    let (i, len) = sequence::delimited(
        tag("{"),
        number,
        alt((tag("+}\r\n"), tag("}\r\n"))),
    )(i)?;
    bytes::complete::take(len)(i)
}

fn quoted_char(i: &[u8]) -> IResult<&[u8], &[u8]> {
    sequence::preceded(tag("\\"), alt((tag("\\"), tag("\""))))(i)
}

fn quoted_string_content(i: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((quoted_char, is_not("\r\n\"\\")))(i)
}

fn quoted(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    sequence::delimited(
        tag("\""),
        multi::fold_many0(
            map(quoted_string_content, String::from_utf8_lossy),
            Cow::Owned(String::new()),
            |mut accum: Cow<str>, piece| {
                if accum.is_empty() {
                    piece
                } else {
                    Cow::to_mut(&mut accum).push_str(&piece);
                    accum
                }
            },
        ),
        tag("\""),
    )(i)
}

fn string(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    alt((quoted, map(literal, String::from_utf8_lossy)))(i)
}

fn astring(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    alt((astring_atom, string))(i)
}

fn sequence_set(i: &[u8]) -> IResult<&[u8], Cow<str>> {
    map(is_a("0123456789:*,"), String::from_utf8_lossy)(i)
}

fn keyword(i: &[u8]) -> IResult<&[u8], Flag> {
    map_opt(normal_atom, |a| a.parse::<Flag>().ok())(i)
}

fn one_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(bytes::complete::take_while_m_n(1, 1, character::is_digit), |s| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

fn two_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(bytes::complete::take_while_m_n(2, 2, character::is_digit), |s| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

fn four_digit(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(bytes::complete::take_while_m_n(4, 4, character::is_digit), |s| {
        str::from_utf8(s).ok().and_then(|s| s.parse::<u32>().ok())
    })(i)
}

static MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct",
    "nov", "dec",
];
fn month(i: &[u8]) -> IResult<&[u8], u32> {
    map_opt(bytes::complete::take(3usize), |name| {
        str::from_utf8(name).ok().and_then(|name| {
            MONTH_NAMES
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
                .map(|ix| ix as u32 + 1)
        })
    })(i)
}

fn date_text(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    map_opt(
        sequence::tuple((
            sequence::terminated(alt((two_digit, one_digit)), tag("-")),
            sequence::terminated(month, tag("-")),
            four_digit,
        )),
        |(d, m, y)| NaiveDate::from_ymd_opt(y as i32, m, d),
    )(i)
}

fn date(i: &[u8]) -> IResult<&[u8], NaiveDate> {
    alt((
        date_text,
        sequence::delimited(tag("\""), date_text, tag("\"")),
    ))(i)
}
