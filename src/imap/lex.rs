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

//! Lexical primitives for writing IMAP responses.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::prelude::*;

use crate::account::model::Flag;
use crate::mime::encoded_word::ew_encode;

/// Writes IMAP lexical tokens to an underlying writer.
///
/// Strings come in two flavours. "Censored" strings are written as-is when
/// the client is Unicode-aware and otherwise have every non-ASCII character
/// replaced with `X`; they are used for things like address local parts,
/// where an encoded word would be meaningless. "Encoded" strings are
/// downgraded to RFC 2047 encoded words for clients that are not
/// Unicode-aware.
pub struct LexWriter<W> {
    writer: W,
    unicode_aware: bool,
}

impl<W: Write> LexWriter<W> {
    pub fn new(writer: W, unicode_aware: bool) -> Self {
        LexWriter {
            writer,
            unicode_aware,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn verbatim(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }

    pub fn nil(&mut self) -> io::Result<()> {
        self.verbatim("NIL")
    }

    pub fn censored_nstring(
        &mut self,
        s: &Option<impl AsRef<str>>,
    ) -> io::Result<()> {
        match s.as_ref() {
            None => self.nil(),
            Some(s) => self.censored_string(s.as_ref()),
        }
    }

    pub fn encoded_nstring(
        &mut self,
        s: &Option<impl AsRef<str>>,
    ) -> io::Result<()> {
        match s.as_ref() {
            None => self.nil(),
            Some(s) => {
                let s = self.encode(s.as_ref());
                self.string(&s)
            }
        }
    }

    pub fn censored_string(&mut self, s: &str) -> io::Result<()> {
        let s = self.censor(s);
        self.string(&s)
    }

    /// Write `data` as a synchronising literal.
    pub fn literal(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.writer, "{{{}}}\r\n", data.len())?;
        self.writer.write_all(data)
    }

    pub fn flag(&mut self, flag: &Flag) -> io::Result<()> {
        write!(self.writer, "{}", flag)
    }

    pub fn datetime(
        &mut self,
        datetime: &DateTime<FixedOffset>,
    ) -> io::Result<()> {
        write!(
            self.writer,
            "\"{}\"",
            datetime.format("%_d-%b-%Y %H:%M:%S %z")
        )
    }

    pub fn num_u32(&mut self, n: u32) -> io::Result<()> {
        write!(self.writer, "{}", n)
    }

    pub fn num_u64(&mut self, n: u64) -> io::Result<()> {
        write!(self.writer, "{}", n)
    }

    fn string(&mut self, s: &str) -> io::Result<()> {
        if self.is_quotable(s) {
            write!(self.writer, "\"{}\"", s)
        } else {
            self.literal(s.as_bytes())
        }
    }

    fn censor<'a>(&self, s: &'a str) -> Cow<'a, str> {
        if self.unicode_aware || s.is_ascii() {
            Cow::Borrowed(s)
        } else {
            Cow::Owned(s.replace(|ch| ch > '\u{7f}', "X"))
        }
    }

    fn encode<'a>(&self, s: &'a str) -> Cow<'a, str> {
        if self.unicode_aware {
            Cow::Borrowed(s)
        } else {
            ew_encode(s)
        }
    }

    fn is_quotable(&self, s: &str) -> bool {
        s.len() < 100
            && s.bytes().all(|b| match b {
                0..=31 | 127 | b'\\' | b'"' => false,
                128..=255 => self.unicode_aware,
                _ => true,
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn to_str(l: LexWriter<Vec<u8>>) -> String {
        String::from_utf8(l.into_inner()).unwrap()
    }

    #[test]
    fn nil_and_numbers() {
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.nil().unwrap();
        l.verbatim(" ").unwrap();
        l.num_u32(42).unwrap();
        l.verbatim(" ").unwrap();
        l.num_u64(1 << 40).unwrap();
        assert_eq!("NIL 42 1099511627776", to_str(l));
    }

    #[test]
    fn censored_strings_non_unicode() {
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.censored_string("foo").unwrap();
        l.verbatim(" ").unwrap();
        l.censored_string("foo bar").unwrap();
        l.verbatim(" ").unwrap();
        l.censored_string("foo\\ bar").unwrap();
        l.verbatim(" ").unwrap();
        l.censored_string("föö").unwrap();

        assert_eq!("\"foo\" \"foo bar\" {8}\r\nfoo\\ bar \"fXX\"", to_str(l));
    }

    #[test]
    fn censored_strings_unicode() {
        let mut l = LexWriter::new(Vec::<u8>::new(), true);
        l.censored_string("föö").unwrap();
        l.verbatim(" ").unwrap();
        l.censored_nstring(&None::<&str>).unwrap();
        l.verbatim(" ").unwrap();
        l.censored_nstring(&Some("jörg")).unwrap();

        assert_eq!("\"föö\" NIL \"jörg\"", to_str(l));
    }

    #[test]
    fn encoded_nstring_downgrades_non_ascii() {
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.encoded_nstring(&Some("plain")).unwrap();
        l.verbatim(" ").unwrap();
        l.encoded_nstring(&Some("Grüße")).unwrap();
        assert_eq!("\"plain\" \"=?utf-8?q?Gr=C3=BC=C3=9Fe?=\"", to_str(l));

        let mut l = LexWriter::new(Vec::<u8>::new(), true);
        l.encoded_nstring(&Some("Grüße")).unwrap();
        assert_eq!("\"Grüße\"", to_str(l));
    }

    #[test]
    fn long_strings_become_literals() {
        let long = "x".repeat(120);
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.censored_string(&long).unwrap();
        assert_eq!(format!("{{120}}\r\n{}", long), to_str(l));
    }

    #[test]
    fn literal_is_written_raw() {
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.literal(b"a\r\nb").unwrap();
        assert_eq!("{4}\r\na\r\nb", to_str(l));
    }

    #[test]
    fn flags_and_dates() {
        let mut l = LexWriter::new(Vec::<u8>::new(), false);
        l.flag(&Flag::Seen).unwrap();
        l.verbatim(" ").unwrap();
        l.flag(&Flag::junk()).unwrap();
        l.verbatim(" ").unwrap();
        l.datetime(&FixedOffset::east(3600).ymd(2020, 3, 4).and_hms(9, 5, 0))
            .unwrap();

        assert_eq!("\\Seen $Junk \" 4-Mar-2020 09:05:00 +0100\"", to_str(l));
    }
}
