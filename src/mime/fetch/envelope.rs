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

use crate::account::model::MessageRecord;
use crate::mime::message::{format_date, Mailbox, ParsedMessage};

/// The `ENVELOPE` structure defined by RFC 3501, in the order the fields are
/// to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// The send date, formatted as an RFC 5322 `Date` header.
    pub date: Option<String>,
    /// The `Subject` header, decoded.
    pub subject: Option<String>,
    /// The `From` header, decoded.
    ///
    /// RFC 3501 says this can't be NIL, but messages without an intelligible
    /// `From` header exist anyway. For these, we return NIL.
    pub from: Vec<EnvelopeAddress>,
    /// The `Sender` header, decoded.
    ///
    /// If the message has none, a copy of `from`.
    pub sender: Vec<EnvelopeAddress>,
    /// The `Reply-To` header, decoded.
    ///
    /// If the message has none, a copy of `from`.
    pub reply_to: Vec<EnvelopeAddress>,
    pub to: Vec<EnvelopeAddress>,
    pub cc: Vec<EnvelopeAddress>,
    pub bcc: Vec<EnvelopeAddress>,
    /// Always `None`; `In-Reply-To` is not retained.
    pub in_reply_to: Option<String>,
    /// The synthetic message id, `<email-id@domain>`.
    pub message_id: Option<String>,
}

/// Representation of an email address in an RFC 3501 `ENVELOPE`.
///
/// Groups are flattened into their members when the message is parsed, so
/// there are never any group delimiters here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeAddress {
    /// The display name if present, decoded.
    pub name: Option<String>,
    /// RFC 3501 includes the RFC 822 routing information, which is always
    /// NIL. The () is here as a token reminder.
    pub routing: (),
    /// The local part of the email (RFC 3501 calls it "mailbox name").
    pub local: String,
    /// The domain of the email (RFC 3501 calls it "host"), if there is one.
    pub domain: Option<String>,
}

impl From<&Mailbox> for EnvelopeAddress {
    fn from(mailbox: &Mailbox) -> Self {
        let (local, domain) = mailbox.split_address();
        EnvelopeAddress {
            name: mailbox.name.clone(),
            routing: (),
            local: local.to_owned(),
            domain: domain.map(str::to_owned),
        }
    }
}

/// Build the `ENVELOPE` of the message described by `record` and `message`.
///
/// `domain` is the server domain used for the synthetic message id.
pub fn build_envelope(
    record: &MessageRecord,
    message: &ParsedMessage,
    domain: &str,
) -> Envelope {
    fn convert(list: &[Mailbox]) -> Vec<EnvelopeAddress> {
        list.iter().map(EnvelopeAddress::from).collect()
    }

    let from = convert(&message.from);
    Envelope {
        date: Some(format_date(&record.send_date)),
        subject: message.subject.clone(),
        sender: if message.sender.is_empty() {
            from.clone()
        } else {
            convert(&message.sender)
        },
        reply_to: if message.reply_to.is_empty() {
            from.clone()
        } else {
            convert(&message.reply_to)
        },
        from,
        to: convert(&message.to),
        cc: convert(&message.cc),
        bcc: convert(&message.bcc),
        in_reply_to: None,
        message_id: Some(synthetic_message_id(record, domain)),
    }
}

/// The message id reported for a message, which is derived from the store's
/// id rather than taken from the `Message-ID` header.
pub fn synthetic_message_id(record: &MessageRecord, domain: &str) -> String {
    format!("<{}@{}>", record.email_id, domain)
}
