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

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::str::FromStr;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mime::fetch::section::BodySection;
use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are delivered to
/// the mailbox. UIDs are never reused, so expunging a message leaves a gap.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Uid {
    fn default() -> Self {
        Uid::MIN
    }
}

impl Uid {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Uid(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self = unsafe { Uid(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        self.0.get().checked_add(1).and_then(Uid::of)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl Into<u32> for Uid {
    fn into(self) -> u32 {
        self.0.get()
    }
}

/// The position of a message within one mailbox snapshot, starting from 1.
///
/// Unlike UIDs, sequence numbers are dense: a snapshot of N messages always
/// numbers them 1 through N in UID order. This means that any expunge shifts
/// the sequence numbers of every later message, so they are only meaningful
/// relative to a particular snapshot.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Seqnum(pub NonZeroU32);

// This isn't a useful default implementation, but is here so that things
// containing SeqRange<ID> can still derive Default.
impl Default for Seqnum {
    fn default() -> Self {
        Seqnum::MIN
    }
}

impl Seqnum {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Seqnum(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { Seqnum(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Convert a 0-based index into a sequence number.
    ///
    /// Returns `None` if the index is beyond what a sequence number can
    /// represent.
    pub fn from_index(ix: usize) -> Option<Self> {
        ix.checked_add(1)
            .and_then(|n| u32::try_from(n).ok())
            .and_then(Seqnum::of)
    }
}

impl TryFrom<u32> for Seqnum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl Into<u32> for Seqnum {
    fn into(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

/// The identifier the message store uses for a message's content.
///
/// This is independent of any mailbox; it is what `mark_read` and
/// `fetch_emails_by_id` operate on, and is also the numeric part of the
/// synthesised `Message-ID`.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct EmailId(pub u64);

impl fmt::Debug for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EmailId({})", self.0)
    }
}

impl Default for EmailId {
    fn default() -> Self {
        EmailId(0)
    }
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A "sequence set range" of sequence numbers or UIDs.
///
/// Internally, this is maintained as a minimal sorted set of inclusive ranges.
/// It does not maintain information on the original fragmentation, ordering,
/// or duplication.
///
/// There is no support for removal.
///
/// The `Display` format puts this into minimal IMAP wire format. Note that
/// IMAP does not have a way to represent an empty sequence set. `Display`
/// produces an empty string in that case, which is invalid.
#[derive(Clone, PartialEq, Eq)]
pub struct SeqRange<T> {
    parts: BTreeMap<u32, u32>,
    _t: PhantomData<T>,
}

impl<T> SeqRange<T> {
    /// Create a new, empty range.
    pub fn new() -> Self {
        SeqRange {
            parts: BTreeMap::new(),
            _t: PhantomData,
        }
    }
}

impl<T: TryFrom<u32> + Into<u32> + PartialOrd> SeqRange<T> {
    /// Create a range containing just the given item.
    #[cfg(test)]
    pub fn just(item: T) -> Self {
        let mut this = SeqRange::new();
        this.append(item);
        this
    }

    /// Create a range containing just a single, simple range.
    #[cfg(test)]
    pub fn range(start: T, end: T) -> Self {
        let mut this = SeqRange::new();
        this.insert(start, end);
        this
    }

    /// Append a single item to this range.
    ///
    /// The item must be strictly greater than all other items already
    /// inserted.
    pub fn append(&mut self, item: T) {
        let item: u32 = item.into();

        if let Some(end) = self.parts.values_mut().next_back() {
            assert!(item > *end);

            if item == *end + 1 {
                *end = item;
                return;
            }
        }

        self.parts.insert(item, item);
    }

    /// Insert the given inclusive range (which must be in the correct order)
    /// into this sequence set.
    #[cfg(test)]
    pub fn insert(&mut self, start_incl: T, end_incl: T) {
        assert!(end_incl >= start_incl);
        self.insert_raw(start_incl.into(), end_incl.into());
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // Fuse any later ranges that overlap or abut the new one.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end.saturating_add(1) >= start_incl {
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        self.parts.insert(start_incl, end_incl);
    }

    /// Return whether the given item is present in this set.
    pub fn contains(&self, v: T) -> bool {
        let v: u32 = v.into();
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Return the inclusive ranges making up this set, in ascending order.
    pub fn ranges<'a>(&'a self) -> impl Iterator<Item = (u32, u32)> + 'a {
        self.parts.iter().map(|(&start, &end)| (start, end))
    }

    /// Parse the IMAP-format of the sequence set.
    ///
    /// `splat` is used as the value of elements which specify `*`.
    pub fn parse(raw: &str, splat: T) -> Option<Self> {
        fn do_parse(r: &str, splat: u32) -> Option<u32> {
            if "*" == r {
                Some(splat)
            } else {
                r.parse().ok().filter(|&n| 0 != n)
            }
        }

        let splat = splat.into();

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split(':');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only, splat)?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end), None) => {
                    let start = do_parse(start, splat)?;
                    let end = do_parse(end, splat)?;
                    // RFC 3501 allows the endpoints to be in either order
                    this.insert_raw(start.min(end), end.max(start));
                }
                _ => return None,
            }
        }

        Some(this)
    }

    /// Return the total size of the sequence set.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(&start, &end)| (end - start) as usize + 1)
            .sum()
    }
}

impl<T> SeqRange<T> {
    /// Return whether this range is empty (invalid for IMAP wire format).
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl<T> fmt::Display for SeqRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}:{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange<Seqnum> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Seqnum {}]", self)
    }
}

impl fmt::Debug for SeqRange<Uid> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {}]", self)
    }
}

impl<T> Default for SeqRange<T> {
    fn default() -> Self {
        SeqRange::new()
    }
}

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
///
/// `\Recent` is not represented by this enum since it isn't _really_ a flag.
#[derive(Clone, Serialize, Deserialize)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Keyword(String),
}

/// The keyword clients use to mark junk mail (RFC 5788 registry).
pub const JUNK_KEYWORD: &str = "$Junk";

impl Flag {
    pub fn junk() -> Self {
        Flag::Keyword(JUNK_KEYWORD.to_owned())
    }

    pub fn is_junk(&self) -> bool {
        match *self {
            Flag::Keyword(ref kw) => kw.eq_ignore_ascii_case(JUNK_KEYWORD),
            _ => false,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Flag::Answered => write!(f, "\\Answered"),
            &Flag::Deleted => write!(f, "\\Deleted"),
            &Flag::Draft => write!(f, "\\Draft"),
            &Flag::Flagged => write!(f, "\\Flagged"),
            &Flag::Seen => write!(f, "\\Seen"),
            &Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.starts_with('\\') {
            Err(Error::NxFlag)
        } else if !s.is_empty() && s.as_bytes().iter().copied().all(is_atom_char)
        {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::UnsafeName)
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    match ch {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            // Keywords are compared ASCII-case-insensitively, which is what
            // clients expect even though RFC 3501 does not require it.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => false,
        }
    }
}

impl Eq for Flag {}

/// The disposition of a message as tracked by the store.
///
/// Only one of these applies to a message at a time; they map onto the
/// `\Deleted`, `\Draft` and `$Junk` flags respectively.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
)]
pub enum MessageStatus {
    Normal,
    Deleted,
    Draft,
    Junk,
}

impl Default for MessageStatus {
    fn default() -> Self {
        MessageStatus::Normal
    }
}

/// One entry in a mailbox snapshot.
///
/// Records are produced fresh for each request and are never mutated by the
/// search or fetch logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    /// The stable identifier of this message within its mailbox.
    pub uid: Uid,
    /// The position of this message within the snapshot it came from.
    pub seqnum: Seqnum,
    /// The store's identifier for the message content.
    pub email_id: EmailId,
    /// Whether the message has been read, i.e. carries `\Seen`.
    pub is_read: bool,
    pub status: MessageStatus,
    /// When the message was delivered. This is the IMAP "internal date".
    pub create_time: DateTime<FixedOffset>,
    /// The value of the `Date` header, or `create_time` if there was none.
    pub send_date: DateTime<FixedOffset>,
    /// The length of the stored raw message, in bytes.
    pub size: u32,
}

impl MessageRecord {
    /// Return whether this message currently has the given flag.
    ///
    /// Flags the store does not track, such as `\Answered` or arbitrary
    /// keywords, are never present.
    pub fn has_flag(&self, flag: &Flag) -> bool {
        match *flag {
            Flag::Seen => self.is_read,
            Flag::Deleted => MessageStatus::Deleted == self.status,
            Flag::Draft => MessageStatus::Draft == self.status,
            ref kw if kw.is_junk() => MessageStatus::Junk == self.status,
            _ => false,
        }
    }

    /// Return the flags to report for this message.
    pub fn flags(&self) -> Vec<Flag> {
        let mut flags = Vec::new();
        if self.is_read {
            flags.push(Flag::Seen);
        }
        match self.status {
            MessageStatus::Normal => (),
            MessageStatus::Deleted => flags.push(Flag::Deleted),
            MessageStatus::Draft => flags.push(Flag::Draft),
            MessageStatus::Junk => flags.push(Flag::junk()),
        }
        flags
    }
}

/// The searchable content of a message, as returned by the store.
///
/// Address fields hold the whole rendered address list (e.g.
/// `A <a@example.com>, b@example.com`) since they are only used for
/// substring matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailRow {
    pub id: EmailId,
    pub subject: String,
    pub from_name: String,
    pub from_address: String,
    pub sender: String,
    pub reply_to: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    /// The `text/plain` body, if the message had one.
    pub text: Option<String>,
    /// The `text/html` body, if the message had one.
    pub html: Option<String>,
    /// The message exactly as it was delivered.
    pub raw: Vec<u8>,
}

/// A header predicate in a search, e.g. `HEADER Subject invoice`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderPredicate {
    /// The header name, as given by the client.
    pub key: String,
    /// The substring to look for.
    pub value: String,
}

/// One node of a search query.
///
/// Every populated field must match for the node to match, and a node with
/// nothing populated matches every message. `not` and `or` hold nested
/// nodes of the same shape, to arbitrary depth.
#[derive(Clone, Debug, Default)]
pub struct SearchCriteria {
    /// The message must be in every one of these UID sets.
    pub uid: Vec<SeqRange<Uid>>,
    /// The message must be in every one of these sequence sets.
    pub seqnum: Vec<SeqRange<Seqnum>>,
    /// Internal date, by day, must be on or after this.
    pub since: Option<NaiveDate>,
    /// Internal date, by day, must be strictly before this.
    pub before: Option<NaiveDate>,
    /// `Date` header, by day, must be on or after this.
    pub sent_since: Option<NaiveDate>,
    /// `Date` header, by day, must be strictly before this.
    pub sent_before: Option<NaiveDate>,
    pub header: Vec<HeaderPredicate>,
    /// Substrings to find in the body.
    pub body: Vec<String>,
    /// Substrings to find in the headers or the body.
    pub text: Vec<String>,
    /// Flags the message must have.
    pub flag: Vec<Flag>,
    /// Flags the message must not have.
    pub not_flag: Vec<Flag>,
    /// The message must be strictly larger than this many bytes.
    pub larger: Option<u32>,
    /// The message must be strictly smaller than this many bytes.
    pub smaller: Option<u32>,
    /// Messages matching any of these are excluded.
    pub not: Vec<SearchCriteria>,
    /// For each pair, the message must match at least one side.
    pub or: Vec<(SearchCriteria, SearchCriteria)>,
}

impl SearchCriteria {
    /// Return whether this node has no constraints at all.
    pub fn is_empty(&self) -> bool {
        self.uid.is_empty()
            && self.seqnum.is_empty()
            && self.since.is_none()
            && self.before.is_none()
            && self.sent_since.is_none()
            && self.sent_before.is_none()
            && self.header.is_empty()
            && self.body.is_empty()
            && self.text.is_empty()
            && self.flag.is_empty()
            && self.not_flag.is_empty()
            && self.larger.is_none()
            && self.smaller.is_none()
            && self.not.is_empty()
            && self.or.is_empty()
    }
}

/// The RFC 4731 `RETURN` options of an extended search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchReturnOpts {
    pub min: bool,
    pub max: bool,
    pub count: bool,
    pub all: bool,
}

/// The `SEARCH` command.
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    pub criteria: SearchCriteria,
    /// If set, respond with `ESEARCH` (RFC 4731) instead of `SEARCH`.
    pub return_opts: Option<SearchReturnOpts>,
}

/// The response to a `SEARCH` or `UID SEARCH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResponse<ID> {
    /// The matching ids, in mailbox order.
    pub hits: Vec<ID>,
    /// The number of hits.
    pub count: usize,
    /// The smallest hit, or `None` if there are no hits.
    pub min: Option<ID>,
    /// The largest hit, or `None` if there are no hits.
    pub max: Option<ID>,
}

impl<ID: Copy + Ord> SearchResponse<ID> {
    pub fn new(hits: Vec<ID>) -> Self {
        let mut min = None;
        let mut max = None;
        for &hit in &hits {
            if min.map_or(true, |m| hit < m) {
                min = Some(hit);
            }
            if max.map_or(true, |m| hit > m) {
                max = Some(hit);
            }
        }

        SearchResponse {
            count: hits.len(),
            hits,
            min,
            max,
        }
    }
}

/// The `FETCH` command.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest<ID>
where
    SeqRange<ID>: fmt::Debug,
{
    /// The ids to fetch.
    pub ids: SeqRange<ID>,
    /// Return UIDs?
    pub uid: bool,
    /// Return flags?
    pub flags: bool,
    /// Return "RFC 822 size"?
    pub rfc822size: bool,
    /// Return internal date?
    pub internal_date: bool,
    /// Return envelope?
    pub envelope: bool,
    /// Return bodystructure?
    pub bodystructure: bool,
    /// If returning bodystructure, include the extension fields
    /// (`BODYSTRUCTURE` rather than `BODY`)?
    pub extended_body_structure: bool,
    /// Any sections to be fetched
    pub sections: Vec<BodySection>,
}

impl<ID> FetchRequest<ID>
where
    SeqRange<ID>: fmt::Debug,
{
    /// Return whether fetching this request implicitly sets `\Seen`.
    pub fn sets_seen(&self) -> bool {
        self.sections.iter().any(|s| !s.peek)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_sr(
        expected_content: &[u32],
        expected_string: &str,
        seqrange: SeqRange<Uid>,
    ) {
        let actual: Vec<u32> =
            (1..=20).filter(|&u| seqrange.contains(Uid::u(u))).collect();
        assert_eq!(expected_content, &actual[..]);
        assert_eq!(expected_string, &seqrange.to_string());
    }

    #[test]
    fn seqrange_parsing() {
        assert_sr(&[1], "1", SeqRange::parse("1", Uid::u(10)).unwrap());
        assert_sr(&[10], "10", SeqRange::parse("*", Uid::u(10)).unwrap());
        assert_sr(&[1, 2], "1:2", SeqRange::parse("2:1", Uid::u(10)).unwrap());
        assert_sr(
            &[9, 10],
            "9:10",
            SeqRange::parse("*:9", Uid::u(10)).unwrap(),
        );
        assert_sr(
            &[1, 3, 5],
            "1,3,5",
            SeqRange::parse("3,5,1", Uid::u(10)).unwrap(),
        );
        assert_sr(
            &[1, 2, 3, 4],
            "1:4",
            SeqRange::parse("1,2:3,4", Uid::u(10)).unwrap(),
        );
        assert_sr(
            &[1, 2, 3, 4],
            "1:4",
            SeqRange::parse("2,4:1,3", Uid::u(10)).unwrap(),
        );

        assert!(SeqRange::parse("0", Uid::u(10)).is_none());
        assert!(SeqRange::parse("1:2:3", Uid::u(10)).is_none());
        assert!(SeqRange::parse("x", Uid::u(10)).is_none());
        assert!(SeqRange::parse("", Uid::u(10)).is_none());
    }

    #[test]
    fn seqrange_append() {
        let mut seqrange = SeqRange::new();
        seqrange.append(Uid::u(1));
        assert_eq!("1", &seqrange.to_string());
        seqrange.append(Uid::u(2));
        assert_eq!("1:2", &seqrange.to_string());
        seqrange.append(Uid::u(5));
        assert_eq!("1:2,5", &seqrange.to_string());
        assert_eq!(3, seqrange.len());
    }

    #[test]
    fn flag_parsing_and_junk() {
        assert_eq!(Flag::Seen, "\\SEEN".parse::<Flag>().unwrap());
        assert_eq!(Flag::junk(), "$junk".parse::<Flag>().unwrap());
        assert!("$JUNK".parse::<Flag>().unwrap().is_junk());
        assert_matches!(Err(Error::NxFlag), "\\Recent".parse::<Flag>());
        assert_matches!(Err(Error::UnsafeName), "a b".parse::<Flag>());
    }

    fn record(is_read: bool, status: MessageStatus) -> MessageRecord {
        let now = FixedOffset::east(0).ymd(2020, 1, 1).and_hms(0, 0, 0);
        MessageRecord {
            uid: Uid::u(1),
            seqnum: Seqnum::u(1),
            email_id: EmailId(1),
            is_read,
            status,
            create_time: now,
            send_date: now,
            size: 0,
        }
    }

    #[test]
    fn record_flag_mapping() {
        let r = record(true, MessageStatus::Junk);
        assert!(r.has_flag(&Flag::Seen));
        assert!(r.has_flag(&Flag::junk()));
        assert!(!r.has_flag(&Flag::Deleted));
        assert!(!r.has_flag(&Flag::Answered));
        assert!(!r.has_flag(&Flag::Flagged));
        assert!(!r.has_flag(&Flag::Keyword("other".to_owned())));
        assert_eq!(vec![Flag::Seen, Flag::junk()], r.flags());

        let r = record(false, MessageStatus::Draft);
        assert!(!r.has_flag(&Flag::Seen));
        assert!(r.has_flag(&Flag::Draft));
        assert_eq!(vec![Flag::Draft], r.flags());
    }

    #[test]
    fn search_response_aggregates() {
        let response = SearchResponse::new(vec![Uid::u(4), Uid::u(2)]);
        assert_eq!(2, response.count);
        assert_eq!(Some(Uid::u(2)), response.min);
        assert_eq!(Some(Uid::u(4)), response.max);

        let empty = SearchResponse::<Uid>::new(vec![]);
        assert_eq!(0, empty.count);
        assert_eq!(None, empty.min);
        assert_eq!(None, empty.max);
    }

    proptest! {
        #[test]
        fn seqrange_properties(
            ranges in prop::collection::vec((1u32..30, 1u32..=10), 1..=5)
        ) {
            let mut expected = Vec::new();
            let mut seqrange = SeqRange::new();

            for &(start, extent) in &ranges {
                seqrange.insert(Uid::u(start), Uid::u(start + extent));
                expected.extend(start..=start + extent);
            }

            expected.sort();
            expected.dedup();

            assert_eq!(expected.len(), seqrange.len());

            for i in 1..50 {
                assert_eq!(
                    expected.contains(&i),
                    seqrange.contains(Uid::u(i)),
                    "Bad contains result for {}",
                    i
                );
            }

            assert_eq!(
                seqrange,
                SeqRange::parse(&seqrange.to_string(), Uid::MAX).unwrap());
        }
    }
}
