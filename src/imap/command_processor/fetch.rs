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

use log::info;

use super::*;
use crate::account::mailbox::FetchReceiver;
use crate::mime::fetch::section::{BodySection, Imap2Section, LeafType};

impl CommandProcessor {
    pub(super) fn cmd_fetch(
        &mut self,
        cmd: s::FetchCommand<'_>,
        sender: SendResponse<'_>,
    ) -> CmdResult {
        let mailbox = self.open_selected()?;
        let ids = parse_seqnum_range(&mailbox, &cmd.messages)?;
        let request = fetch_request_from_ast(ids, cmd.target, false);
        self.fetch(sender, |receiver| mailbox.seqnum_fetch(&request, receiver))
    }

    pub(super) fn cmd_uid_fetch(
        &mut self,
        cmd: s::FetchCommand<'_>,
        sender: SendResponse<'_>,
    ) -> CmdResult {
        let mailbox = self.open_selected()?;
        let ids = parse_uid_range(&mailbox, &cmd.messages)?;
        // RFC 3501: UID FETCH always returns the UID, whether requested or
        // not.
        let request = fetch_request_from_ast(ids, cmd.target, true);
        self.fetch(sender, |receiver| mailbox.fetch(&request, receiver))
    }

    fn fetch(
        &mut self,
        sender: SendResponse<'_>,
        f: impl FnOnce(FetchReceiver<'_>) -> Result<(), Error>,
    ) -> CmdResult {
        let mut count = 0usize;
        f(&mut |seqnum, items| {
            count += 1;
            sender(r::Response::Fetch(r::FetchResponse { seqnum, items }));
        })
        .map_err(map_error!(self))?;

        info!("{} FETCH returned {} messages", self.log_prefix, count);
        success()
    }
}

fn fetch_request_from_ast<ID: Default>(
    ids: SeqRange<ID>,
    target: s::FetchCommandTarget<'_>,
    force_uid: bool,
) -> FetchRequest<ID>
where
    SeqRange<ID>: fmt::Debug,
{
    let mut request = FetchRequest {
        ids,
        uid: force_uid,
        ..FetchRequest::default()
    };

    match target {
        s::FetchCommandTarget::All => {
            request.flags = true;
            request.internal_date = true;
            request.rfc822size = true;
            request.envelope = true;
        }
        s::FetchCommandTarget::Fast => {
            request.flags = true;
            request.internal_date = true;
            request.rfc822size = true;
        }
        s::FetchCommandTarget::Full => {
            request.flags = true;
            request.internal_date = true;
            request.rfc822size = true;
            request.envelope = true;
            request.bodystructure = true;
        }
        s::FetchCommandTarget::Single(att) => {
            fetch_att_from_ast(&mut request, att);
        }
        s::FetchCommandTarget::Multi(atts) => {
            for att in atts {
                fetch_att_from_ast(&mut request, att);
            }
        }
    }

    request
}

fn fetch_att_from_ast<ID>(request: &mut FetchRequest<ID>, att: s::FetchAtt<'_>)
where
    SeqRange<ID>: fmt::Debug,
{
    match att {
        s::FetchAtt::Envelope => request.envelope = true,
        s::FetchAtt::Flags => request.flags = true,
        s::FetchAtt::InternalDate => request.internal_date = true,
        s::FetchAtt::Rfc822Size => request.rfc822size = true,
        s::FetchAtt::Uid => request.uid = true,
        s::FetchAtt::ShortBodyStructure => request.bodystructure = true,
        // Only one body structure is reported per message, so asking for
        // both forms gets the extended one.
        s::FetchAtt::ExtendedBodyStructure => {
            request.bodystructure = true;
            request.extended_body_structure = true;
        }
        s::FetchAtt::Rfc822 => request.sections.push(BodySection {
            leaf_type: LeafType::Full,
            report_as_legacy: Some(Imap2Section::Rfc822),
            ..BodySection::default()
        }),
        // RFC 3501 defines RFC822.HEADER as BODY.PEEK[HEADER].
        s::FetchAtt::Rfc822Header => request.sections.push(BodySection {
            leaf_type: LeafType::Headers,
            peek: true,
            report_as_legacy: Some(Imap2Section::Rfc822Header),
            ..BodySection::default()
        }),
        s::FetchAtt::Rfc822Text => request.sections.push(BodySection {
            leaf_type: LeafType::Content,
            report_as_legacy: Some(Imap2Section::Rfc822Text),
            ..BodySection::default()
        }),
        s::FetchAtt::Body(body) => {
            request.sections.push(section_from_ast(body))
        }
    }
}

fn section_from_ast(body: s::FetchAttBody<'_>) -> BodySection {
    let mut section = BodySection {
        peek: body.peek,
        ..BodySection::default()
    };

    if let Some(spec) = body.section {
        section.subscripts = spec.subscripts;
        section.leaf_type = match spec.text {
            Some(s::SectionText::Header) => LeafType::Headers,
            Some(s::SectionText::HeaderFields(fields)) => {
                section.header_filter =
                    fields.into_iter().map(Cow::into_owned).collect();
                LeafType::Headers
            }
            Some(s::SectionText::HeaderFieldsNot(fields)) => {
                section.header_filter =
                    fields.into_iter().map(Cow::into_owned).collect();
                section.discard_matching_headers = true;
                LeafType::Headers
            }
            Some(s::SectionText::Text) => LeafType::Text,
            Some(s::SectionText::Mime) => LeafType::Mime,
            None => LeafType::Content,
        };
    }

    if let Some((start, length)) = body.slice {
        let start = u64::from(start);
        section.partial = Some((start, start + u64::from(length)));
    }

    section
}
