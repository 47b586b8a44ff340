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

//! Implements the IMAP commands Ferrymap understands, translating between
//! the raw request AST of `syntax` and the response AST of
//! `response_writer`.
//!
//! Every command opens a fresh `Mailbox`, so each one works from its own
//! snapshot of the selected mailbox.

macro_rules! map_error {
    ($this:expr) => {{
        let log_prefix = &$this.log_prefix;
        move |e| catch_all_error_handling(log_prefix, e)
    }};

    ($this:expr, $($($kind:ident)|+ => ($cond:ident, $code:expr),)+) => {{
        let log_prefix = &$this.log_prefix;
        move |e| match e {
            $($(Error::$kind)|* => r::Response::Cond(r::CondResponse {
                cond: r::RespCondType::$cond,
                code: $code,
                quip: Some(Cow::Owned(e.to_string())),
            }),)*
            e => catch_all_error_handling(log_prefix, e),
        }
    }};
}

mod fetch;
mod search;

use std::borrow::Cow;
use std::sync::Arc;

use log::{error, info, warn};

use crate::account::mailbox::Mailbox;
use crate::account::model::*;
use crate::account::store::MessageStore;
use crate::imap::response_writer as r;
use crate::imap::syntax as s;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

/// Receives untagged responses as they are produced.
pub type SendResponse<'a> = &'a mut dyn FnMut(r::Response);

/// Used just for the convenient `?` operator. We mostly don't distinguish `Ok`
/// from `Err`; the contained value is the tagged response either way.
type CmdResult = Result<r::Response, r::Response>;

/// Return value from an operation that can either succeed with a value, or
/// fail with an IMAP response.
type PartialResult<T> = Result<T, r::Response>;

/// Receives command lines and produces responses.
///
/// The processor remembers which mailbox is selected, but nothing about its
/// contents; those are snapshotted afresh for each command.
pub struct CommandProcessor {
    log_prefix: LogPrefix,
    system_config: Arc<SystemConfig>,
    store: Arc<dyn MessageStore>,
    selected: Option<String>,
}

impl CommandProcessor {
    pub fn new(
        log_prefix: LogPrefix,
        system_config: Arc<SystemConfig>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        CommandProcessor {
            log_prefix,
            system_config,
            store,
            selected: None,
        }
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// Whether responses should be written for a Unicode-aware client.
    pub fn unicode_aware(&self) -> bool {
        self.system_config.server.unicode_aware
    }

    /// Select `mailbox` for subsequent commands.
    ///
    /// Returns the number of messages currently visible in it.
    pub fn select(&mut self, mailbox: &str) -> Result<usize, Error> {
        let count = self.store.list_visible_messages(mailbox)?.len();
        self.selected = Some(mailbox.to_owned());
        self.log_prefix.set_mailbox(Some(mailbox.to_owned()));
        info!("{} Selected with {} messages", self.log_prefix, count);
        Ok(count)
    }

    /// Handle one command line.
    ///
    /// `sender` is called with each untagged response as it becomes
    /// available. Returns the final, tagged response.
    pub fn handle_line(
        &mut self,
        line: &[u8],
        sender: SendResponse<'_>,
    ) -> r::ResponseLine {
        let command_line = match s::CommandLine::parse(line) {
            Ok(command_line) => command_line,
            Err(()) => {
                warn!("{} Rejected unparsable command", self.log_prefix);
                return r::ResponseLine {
                    tag: s::CommandLine::parse_tag(line).map(Cow::into_owned),
                    response: r::Response::Cond(r::CondResponse {
                        cond: r::RespCondType::Bad,
                        code: Some(r::RespTextCode::Parse),
                        quip: Some(Cow::Borrowed(
                            "Unrecognised command syntax",
                        )),
                    }),
                };
            }
        };

        let tag = &command_line.tag;
        let res = match command_line.cmd {
            s::Command::Search(cmd) => self.cmd_search(tag, cmd, sender),
            s::Command::Fetch(cmd) => self.cmd_fetch(cmd, sender),
            s::Command::Uid(s::UidCommand::Search(cmd)) => {
                self.cmd_uid_search(tag, cmd, sender)
            }
            s::Command::Uid(s::UidCommand::Fetch(cmd)) => {
                self.cmd_uid_fetch(cmd, sender)
            }
        };

        r::ResponseLine {
            tag: Some(command_line.tag.clone().into_owned()),
            response: match res {
                Ok(res) => res,
                Err(res) => res,
            },
        }
    }

    fn open_selected(&self) -> PartialResult<Mailbox> {
        let name = self.selected.as_ref().ok_or_else(|| {
            r::Response::Cond(r::CondResponse {
                cond: r::RespCondType::Bad,
                code: Some(r::RespTextCode::ClientBug),
                quip: Some(Cow::Borrowed("No mailbox selected")),
            })
        })?;

        Mailbox::open(
            Arc::clone(&self.store),
            name,
            &self.system_config.server.domain,
            self.log_prefix.clone(),
        )
        .map_err(map_error! {
            self,
            NxMailbox => (No, Some(r::RespTextCode::Nonexistent)),
        })
    }
}

fn success() -> CmdResult {
    Ok(r::Response::Cond(r::CondResponse {
        cond: r::RespCondType::Ok,
        code: None,
        quip: None,
    }))
}

fn unparsable_sequence_set() -> r::Response {
    r::Response::Cond(r::CondResponse {
        cond: r::RespCondType::Bad,
        code: Some(r::RespTextCode::Parse),
        quip: Some(Cow::Borrowed("Unparsable sequence set")),
    })
}

/// Parse a sequence set of sequence numbers, with `*` standing for the last
/// message in the snapshot.
fn parse_seqnum_range(
    mailbox: &Mailbox,
    raw: &str,
) -> PartialResult<SeqRange<Seqnum>> {
    let max = mailbox.snapshot().max_seqnum().unwrap_or(Seqnum::MIN);
    SeqRange::parse(raw, max).ok_or_else(unparsable_sequence_set)
}

/// Parse a sequence set of UIDs, with `*` standing for the greatest UID in
/// the snapshot.
///
/// The client is explicitly allowed to name UIDs that don't exist, so there
/// is nothing else to validate.
fn parse_uid_range(
    mailbox: &Mailbox,
    raw: &str,
) -> PartialResult<SeqRange<Uid>> {
    let max = mailbox.snapshot().max_uid().unwrap_or(Uid::MIN);
    SeqRange::parse(raw, max).ok_or_else(unparsable_sequence_set)
}

fn catch_all_error_handling(log_prefix: &LogPrefix, e: Error) -> r::Response {
    error!("{} Unhandled internal error: {}", log_prefix, e);

    r::Response::Cond(r::CondResponse {
        cond: r::RespCondType::No,
        code: Some(r::RespTextCode::ServerBug),
        quip: Some(Cow::Borrowed(
            "Unexpected error; check server logs for details",
        )),
    })
}
