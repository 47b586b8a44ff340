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

//! Backend for evaluating the content predicates of a search.
//!
//! Header, body and text predicates are compiled once per search node into
//! a list of `Op`s, which are then evaluated against each candidate's
//! content row. All ops must match.
//!
//! Regex matching is unanchored and case-insensitive.

use regex::{self, Regex};

use crate::account::model::*;

/// The header fields a `HEADER` predicate can look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderKey {
    Subject,
    From,
    To,
    Cc,
    Bcc,
    ReplyTo,
    Sender,
}

impl HeaderKey {
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        match &name[..] {
            "subject" => Some(HeaderKey::Subject),
            "from" => Some(HeaderKey::From),
            "to" => Some(HeaderKey::To),
            "cc" => Some(HeaderKey::Cc),
            "bcc" => Some(HeaderKey::Bcc),
            "reply-to" => Some(HeaderKey::ReplyTo),
            "sender" => Some(HeaderKey::Sender),
            _ => None,
        }
    }
}

/// A single content predicate.
#[derive(Debug)]
pub enum Op {
    /// Never matches. Unrecognised headers compile to this.
    False,
    Header(HeaderKey, Regex),
    /// Matches the text body or the HTML body.
    Body(Regex),
    /// Matches the subject, sender name or address, recipients, or body.
    Text(Regex),
}

/// Compile the content predicates of `criteria`. Nested nodes are not
/// included.
pub fn compile(criteria: &SearchCriteria) -> Vec<Op> {
    let mut ops = Vec::new();

    for predicate in &criteria.header {
        ops.push(
            match (HeaderKey::parse(&predicate.key), to_regex(&predicate.value))
            {
                (Some(key), Some(regex)) => Op::Header(key, regex),
                _ => Op::False,
            },
        );
    }

    for pat in &criteria.body {
        ops.push(to_regex(pat).map_or(Op::False, Op::Body));
    }

    for pat in &criteria.text {
        ops.push(to_regex(pat).map_or(Op::False, Op::Text));
    }

    ops
}

/// Evaluate whether `row` satisfies every op in `ops`.
pub fn eval(ops: &[Op], row: &EmailRow) -> bool {
    ops.iter().all(|op| eval_one(op, row))
}

fn eval_one(op: &Op, row: &EmailRow) -> bool {
    match *op {
        Op::False => false,
        Op::Header(key, ref regex) => match key {
            HeaderKey::Subject => regex.is_match(&row.subject),
            HeaderKey::From => {
                regex.is_match(&row.from_address)
                    || regex.is_match(&row.from_name)
            }
            HeaderKey::To => regex.is_match(&row.to),
            HeaderKey::Cc => regex.is_match(&row.cc),
            HeaderKey::Bcc => regex.is_match(&row.bcc),
            HeaderKey::ReplyTo => regex.is_match(&row.reply_to),
            HeaderKey::Sender => regex.is_match(&row.sender),
        },
        Op::Body(ref regex) => body_matches(regex, row),
        Op::Text(ref regex) => {
            regex.is_match(&row.subject)
                || regex.is_match(&row.from_address)
                || regex.is_match(&row.from_name)
                || regex.is_match(&row.to)
                || regex.is_match(&row.cc)
                || regex.is_match(&row.bcc)
                || body_matches(regex, row)
        }
    }
}

fn body_matches(regex: &Regex, row: &EmailRow) -> bool {
    row.text.as_deref().map_or(false, |t| regex.is_match(t))
        || row.html.as_deref().map_or(false, |h| regex.is_match(h))
}

/// We use the regex library for substring matching both for its excellent
/// performance and to take advantage of its Unicode-aware case insensitivity.
///
/// The whole pattern, whitespace included, must appear verbatim (up to case)
/// in the searched text. An empty pattern matches everything.
///
/// Returns `None` only if the pattern is too large to compile.
pub fn to_regex(pat: &str) -> Option<Regex> {
    regex::RegexBuilder::new(&regex::escape(pat))
        .case_insensitive(true)
        .build()
        .ok()
}
