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

//! Everything needed to produce the items of an IMAP `FETCH` response.
//!
//! ## Regarding message layout
//!
//! Messages are not served as they were stored. The store keeps a content
//! row per message, and what FETCH reports is synthesised from the parsed
//! form of that content (see `crate::mime::message`). The layout is fixed:
//! a `multipart/alternative` of the text and HTML bodies, wrapped in a
//! `multipart/mixed` together with the attachments if there are any.
//!
//! IMAP addresses parts by subscripts starting at 1, so `1.2` is the second
//! child of the first part. In the synthesised layout, `1` is always the
//! first body alternative if the message has no attachments, and the
//! `multipart/alternative` itself if it does.
//!
//! After zero or more subscripts comes a subsection specifier, one of
//! `LeafType`:
//!
//! - `Full`. The whole message. Only meaningful at top level.
//!
//! - `Headers`. A header block re-emitted from the parsed fields, possibly
//!   filtered. Headers which are not retained by the store (`References`,
//!   `In-Reply-To`, arbitrary `X-` headers) are never produced.
//!
//! - `Mime`. The `Content-*` headers of a part. At top level this is treated
//!   the same as `Headers`.
//!
//! - `Content`. The content of a part. At top level, the whole message.
//!
//! - `Text`. The content of a part. At top level, the whole message.
//!
//! A subscript path which does not name a part produces an empty section
//! rather than an error.

use chrono::prelude::*;

use self::bodystructure::BodyStructure;
use self::envelope::Envelope;
use self::section::BodySection;
use crate::account::model::{Flag, Uid};

pub mod bodystructure;
pub mod envelope;
pub mod section;

/// A single item produced for one message of a FETCH.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedItem {
    Uid(Uid),
    Envelope(Box<Envelope>),
    BodyStructure(Box<BodyStructure>),
    Rfc822Size(u32),
    Flags(Vec<Flag>),
    InternalDate(DateTime<FixedOffset>),
    BodySection((BodySection, Vec<u8>)),
}
