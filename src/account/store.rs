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

//! The storage seam.
//!
//! SEARCH and FETCH never touch storage directly. Everything they need goes
//! through `MessageStore`, which is deliberately narrow: list what is
//! visible in a mailbox, fetch content rows by id, and set the read state.
//!
//! `MemoryStore` is the implementation used by the command line front-end
//! and by tests.

use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::prelude::*;
use log::{info, warn};

use super::model::*;
use crate::mime::message::{Mailbox as Addressee, ParsedMessage};
use crate::support::error::Error;

/// The storage collaborator behind SEARCH and FETCH.
///
/// Implementations must be safe to share between sessions. Consistency
/// across calls is the implementation's own business; callers take one
/// snapshot per request and work from that.
pub trait MessageStore: Send + Sync {
    /// Return the messages currently visible in `mailbox`, in ascending UID
    /// order, with sequence numbers assigned by position.
    fn list_visible_messages(
        &self,
        mailbox: &str,
    ) -> Result<Vec<MessageRecord>, Error>;

    /// Return the content rows for the given ids.
    ///
    /// Ids which do not exist are silently omitted. The order of the result
    /// is unspecified.
    fn fetch_emails_by_id(&self, ids: &[EmailId])
        -> Result<Vec<EmailRow>, Error>;

    /// Set or clear the read state of a message.
    fn mark_read(&self, id: EmailId, read: bool) -> Result<(), Error>;
}

/// A `MessageStore` held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    mailboxes: BTreeMap<String, StoredMailbox>,
    emails: HashMap<EmailId, StoredEmail>,
    next_email_id: u64,
}

struct StoredMailbox {
    next_uid: Option<Uid>,
    /// (uid, email id), in UID order.
    messages: Vec<(Uid, EmailId)>,
}

impl Default for StoredMailbox {
    fn default() -> Self {
        StoredMailbox {
            next_uid: Some(Uid::MIN),
            messages: vec![],
        }
    }
}

struct StoredEmail {
    row: EmailRow,
    is_read: bool,
    status: MessageStatus,
    create_time: DateTime<FixedOffset>,
    send_date: DateTime<FixedOffset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a raw RFC 822 message to `mailbox`, creating the mailbox if
    /// needed.
    ///
    /// The message is parsed immediately to fill its content row; messages
    /// that cannot be parsed are rejected.
    pub fn deliver(
        &self,
        mailbox: &str,
        raw: &[u8],
        create_time: DateTime<FixedOffset>,
    ) -> Result<Uid, Error> {
        check_mailbox_name(mailbox)?;
        let parsed = ParsedMessage::parse(raw)?;

        let mut inner = self.write()?;
        inner.next_email_id += 1;
        let email_id = EmailId(inner.next_email_id);

        let mb = inner.mailboxes.entry(mailbox.to_owned()).or_default();
        let uid = mb.next_uid.ok_or(Error::UidOutOfRange)?;
        mb.next_uid = uid.next();
        mb.messages.push((uid, email_id));

        inner.emails.insert(
            email_id,
            StoredEmail {
                row: content_row(email_id, &parsed, raw),
                is_read: false,
                status: MessageStatus::Normal,
                create_time,
                send_date: parsed.date.unwrap_or(create_time),
            },
        );

        Ok(uid)
    }

    /// Create `mailbox` if it does not already exist.
    pub fn create_mailbox(&self, mailbox: &str) -> Result<(), Error> {
        check_mailbox_name(mailbox)?;
        self.write()?
            .mailboxes
            .entry(mailbox.to_owned())
            .or_default();
        Ok(())
    }

    /// Remove the message with the given UID from `mailbox`.
    ///
    /// The UID is not reused.
    #[cfg(test)]
    pub fn expunge(&self, mailbox: &str, uid: Uid) -> Result<(), Error> {
        let mut inner = self.write()?;
        let mb = inner.mailboxes.get_mut(mailbox).ok_or(Error::NxMailbox)?;
        let ix = mb
            .messages
            .binary_search_by_key(&uid, |&(u, _)| u)
            .map_err(|_| Error::NxMessage)?;
        let (_, email_id) = mb.messages.remove(ix);
        inner.emails.remove(&email_id);
        Ok(())
    }

    /// Change the status of the message with the given UID.
    #[cfg(test)]
    pub fn set_status(
        &self,
        mailbox: &str,
        uid: Uid,
        status: MessageStatus,
    ) -> Result<(), Error> {
        let mut inner = self.write()?;
        let email_id = inner.email_id(mailbox, uid)?;
        inner
            .emails
            .get_mut(&email_id)
            .ok_or(Error::NxMessage)?
            .status = status;
        Ok(())
    }

    /// Deliver every `*.eml` file in `dir` to `mailbox`, in file name order.
    ///
    /// The internal date of each message is the modification time of its
    /// file. Files that cannot be parsed are skipped with a warning. Returns
    /// the number of messages delivered.
    pub fn load_dir(&self, mailbox: &str, dir: &Path) -> Result<usize, Error> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| "eml" == e) {
                paths.push(path);
            }
        }
        paths.sort();

        self.create_mailbox(mailbox)?;

        let mut delivered = 0;
        for path in paths {
            let raw = fs::read(&path)?;
            let create_time: DateTime<FixedOffset> =
                DateTime::<Utc>::from(fs::metadata(&path)?.modified()?)
                    .into();

            match self.deliver(mailbox, &raw, create_time) {
                Ok(uid) => {
                    info!("Loaded {} as UID {}", path.display(), uid.0.get());
                    delivered += 1;
                }
                Err(Error::UnparseableMessage) => {
                    warn!("Skipping unparseable {}", path.display());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(delivered)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::Storage("lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::Storage("lock poisoned".to_owned()))
    }
}

#[cfg(test)]
impl Inner {
    fn email_id(&self, mailbox: &str, uid: Uid) -> Result<EmailId, Error> {
        let mb = self.mailboxes.get(mailbox).ok_or(Error::NxMailbox)?;
        mb.messages
            .binary_search_by_key(&uid, |&(u, _)| u)
            .map(|ix| mb.messages[ix].1)
            .map_err(|_| Error::NxMessage)
    }
}

impl MessageStore for MemoryStore {
    fn list_visible_messages(
        &self,
        mailbox: &str,
    ) -> Result<Vec<MessageRecord>, Error> {
        let inner = self.read()?;
        let mb = inner.mailboxes.get(mailbox).ok_or(Error::NxMailbox)?;

        let mut records = Vec::with_capacity(mb.messages.len());
        for &(uid, email_id) in &mb.messages {
            let email =
                inner.emails.get(&email_id).ok_or(Error::NxMessage)?;
            let seqnum = Seqnum::from_index(records.len())
                .ok_or(Error::UidOutOfRange)?;
            records.push(MessageRecord {
                uid,
                seqnum,
                email_id,
                is_read: email.is_read,
                status: email.status,
                create_time: email.create_time,
                send_date: email.send_date,
                size: stored_size(email.row.raw.len()),
            });
        }

        Ok(records)
    }

    fn fetch_emails_by_id(
        &self,
        ids: &[EmailId],
    ) -> Result<Vec<EmailRow>, Error> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.emails.get(id))
            .map(|email| email.row.clone())
            .collect())
    }

    fn mark_read(&self, id: EmailId, read: bool) -> Result<(), Error> {
        self.write()?
            .emails
            .get_mut(&id)
            .ok_or(Error::NxMessage)?
            .is_read = read;
        Ok(())
    }
}

fn check_mailbox_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.chars().any(char::is_control) {
        Err(Error::UnsafeName)
    } else {
        Ok(())
    }
}

/// Build the searchable content row of a message.
fn content_row(id: EmailId, parsed: &ParsedMessage, raw: &[u8]) -> EmailRow {
    // Rendered without encoded words, since these are only ever matched
    // against search strings.
    fn render(list: &[Addressee]) -> String {
        list.iter()
            .map(|a| match a.name {
                Some(ref name) => format!("{} <{}>", name, a.address),
                None => a.address.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    EmailRow {
        id,
        subject: parsed.subject.clone().unwrap_or_default(),
        from_name: parsed
            .from
            .iter()
            .filter_map(|a| a.name.as_deref())
            .collect::<Vec<_>>()
            .join(", "),
        from_address: parsed
            .from
            .iter()
            .map(|a| a.address.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        sender: render(&parsed.sender),
        reply_to: render(&parsed.reply_to),
        to: render(&parsed.to),
        cc: render(&parsed.cc),
        bcc: render(&parsed.bcc),
        text: parsed.text.clone(),
        html: parsed.html.clone(),
        raw: raw.to_vec(),
    }
}

/// Message sizes are reported as 32-bit; anything larger saturates.
fn stored_size(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
