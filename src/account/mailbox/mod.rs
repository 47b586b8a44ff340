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

//! Support for working with a single mailbox.
//!
//! A `Mailbox` is one request's view of a mailbox. Opening it takes a
//! snapshot of the visible messages from the store, and everything the
//! request does afterwards (including every level of a recursive search)
//! works from that one snapshot. Messages delivered or expunged meanwhile
//! are not seen until the next request opens a new `Mailbox`.
//!
//! The snapshot is the only place sequence numbers are defined. A sequence
//! number is a 1-based position in the snapshot; a UID is whatever the store
//! assigned. Both directions of the mapping are built once when the
//! snapshot is taken.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use super::model::*;
use super::store::MessageStore;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

mod fetch;
mod search;
mod search_backend;

pub use self::fetch::FetchReceiver;

/// The ordered set of messages visible in a mailbox at one point in time.
#[derive(Clone, Debug, Default)]
pub struct MailboxSnapshot {
    messages: Vec<MessageRecord>,
    uid_index: HashMap<Uid, usize>,
}

impl MailboxSnapshot {
    /// Build a snapshot from what the store reported.
    ///
    /// The records are put into strictly ascending UID order, and their
    /// sequence numbers are reassigned from their positions, so the
    /// snapshot is consistent even if the store is not.
    pub fn new(
        mut messages: Vec<MessageRecord>,
        log_prefix: &LogPrefix,
    ) -> Self {
        let sorted = messages.windows(2).all(|w| w[0].uid < w[1].uid);
        if !sorted {
            warn!(
                "{} Store returned messages out of UID order or with \
                 duplicate UIDs; normalising",
                log_prefix
            );
            messages.sort_by_key(|m| m.uid);
            messages.dedup_by_key(|m| m.uid);
        }

        let mut uid_index = HashMap::with_capacity(messages.len());
        let mut kept = Vec::with_capacity(messages.len());
        for mut message in messages {
            let seqnum = match Seqnum::from_index(kept.len()) {
                Some(seqnum) => seqnum,
                None => break,
            };
            if seqnum != message.seqnum && sorted {
                warn!(
                    "{} Store reported UID {} at sequence number {}, \
                     expected {}",
                    log_prefix,
                    message.uid.0.get(),
                    message.seqnum.0.get(),
                    seqnum.0.get()
                );
            }
            message.seqnum = seqnum;
            uid_index.insert(message.uid, kept.len());
            kept.push(message);
        }

        MailboxSnapshot {
            messages: kept,
            uid_index,
        }
    }

    /// All messages, in sequence number order.
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The greatest UID in the snapshot, which is what `*` means in a UID
    /// set.
    pub fn max_uid(&self) -> Option<Uid> {
        self.messages.last().map(|m| m.uid)
    }

    /// The greatest sequence number in the snapshot.
    pub fn max_seqnum(&self) -> Option<Seqnum> {
        self.messages.last().map(|m| m.seqnum)
    }

    pub fn by_uid(&self, uid: Uid) -> Option<&MessageRecord> {
        self.uid_index.get(&uid).map(|&ix| &self.messages[ix])
    }

    pub fn by_seqnum(&self, seqnum: Seqnum) -> Option<&MessageRecord> {
        self.messages.get(seqnum.to_index())
    }

    /// Return the messages whose UIDs are in `uids`, in order.
    ///
    /// UIDs in the set which are not in the snapshot are ignored. Ranges no
    /// larger than the snapshot are looked up one by one in the UID index;
    /// larger ones are cut out of the snapshot by binary search.
    pub fn resolve_uids(&self, uids: &SeqRange<Uid>) -> Vec<&MessageRecord> {
        let max = match self.max_uid() {
            Some(max) => max.0.get(),
            None => return Vec::new(),
        };

        let mut resolved = Vec::new();
        for (start, end) in uids.ranges() {
            if start > max {
                break;
            }

            let end = end.min(max);
            if ((end - start) as usize) < self.messages.len() {
                resolved.extend(
                    (start..=end)
                        .filter_map(Uid::of)
                        .filter_map(|uid| self.by_uid(uid)),
                );
            } else {
                let lo =
                    self.messages.partition_point(|m| m.uid.0.get() < start);
                let hi =
                    self.messages.partition_point(|m| m.uid.0.get() <= end);
                resolved.extend(&self.messages[lo..hi]);
            }
        }

        resolved
    }

    /// Return the messages whose sequence numbers are in `seqnums`, in
    /// order.
    ///
    /// Sequence numbers beyond the end of the snapshot are ignored.
    pub fn resolve_seqnums(
        &self,
        seqnums: &SeqRange<Seqnum>,
    ) -> Vec<&MessageRecord> {
        let len = self.messages.len() as u64;
        let mut resolved = Vec::new();
        for (start, end) in seqnums.ranges() {
            if u64::from(start) > len {
                break;
            }

            let end = u64::from(end).min(len) as u32;
            resolved.extend(
                (start..=end)
                    .filter_map(Seqnum::of)
                    .filter_map(|seqnum| self.by_seqnum(seqnum)),
            );
        }

        resolved
    }
}

/// One request's view of a mailbox.
pub struct Mailbox {
    store: Arc<dyn MessageStore>,
    snapshot: MailboxSnapshot,
    /// The domain used for synthetic message ids.
    domain: String,
    log_prefix: LogPrefix,
}

impl Mailbox {
    /// Open `name` in `store`, taking a snapshot of its visible messages.
    pub fn open(
        store: Arc<dyn MessageStore>,
        name: &str,
        domain: &str,
        log_prefix: LogPrefix,
    ) -> Result<Self, Error> {
        let records = store.list_visible_messages(name)?;
        let snapshot = MailboxSnapshot::new(records, &log_prefix);

        Ok(Mailbox {
            store,
            snapshot,
            domain: domain.to_owned(),
            log_prefix,
        })
    }

    pub fn snapshot(&self) -> &MailboxSnapshot {
        &self.snapshot
    }
}
