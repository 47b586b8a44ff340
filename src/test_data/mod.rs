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

/// A plain-text message with a display-named sender and a mixed `To` list.
pub static SIMPLE_TEXT: &[u8] = include_bytes!("simple-text.eml");

/// A `multipart/mixed` holding a text/HTML alternative and a PDF attachment,
/// with every address header set.
pub static WITH_ATTACHMENT: &[u8] = include_bytes!("with-attachment.eml");

/// A single-part `text/html` message.
pub static HTML_ONLY: &[u8] = include_bytes!("html-only.eml");

/// A message whose subject and sender name are RFC 2047 encoded.
pub static UNICODE_SUBJECT: &[u8] = include_bytes!("unicode-subject.eml");

/// A message with headers but no content at all.
pub static NO_BODY: &[u8] = include_bytes!("no-body.eml");
