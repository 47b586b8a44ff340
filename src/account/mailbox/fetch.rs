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

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

use log::warn;
use rayon::prelude::*;

use super::Mailbox;
use crate::account::model::*;
use crate::mime::fetch::bodystructure::build_body_structure;
use crate::mime::fetch::envelope::build_envelope;
use crate::mime::fetch::section::SectionSource;
use crate::mime::fetch::FetchedItem;
use crate::mime::message::ParsedMessage;
use crate::support::error::Error;

/// Receives the items fetched for each message, in snapshot order.
pub type FetchReceiver<'a> = &'a mut dyn FnMut(Seqnum, Vec<FetchedItem>);

impl Mailbox {
    /// The `FETCH` command.
    pub fn seqnum_fetch(
        &self,
        request: &FetchRequest<Seqnum>,
        receiver: FetchReceiver<'_>,
    ) -> Result<(), Error> {
        let targets = self.snapshot.resolve_seqnums(&request.ids);
        self.fetch_records(request, targets, receiver)
    }

    /// The `UID FETCH` command.
    pub fn fetch(
        &self,
        request: &FetchRequest<Uid>,
        receiver: FetchReceiver<'_>,
    ) -> Result<(), Error> {
        let targets = self.snapshot.resolve_uids(&request.ids);
        self.fetch_records(request, targets, receiver)
    }

    fn fetch_records<ID>(
        &self,
        request: &FetchRequest<ID>,
        targets: Vec<&MessageRecord>,
        receiver: FetchReceiver<'_>,
    ) -> Result<(), Error>
    where
        SeqRange<ID>: fmt::Debug,
        ID: Sync,
    {
        // Any non-.PEEK section implicitly sets \Seen. This is done once
        // per message, before any content is read, no matter how many
        // sections ask for it. It is only best-effort.
        let sets_seen = request.sets_seen();
        let targets = targets
            .into_iter()
            .cloned()
            .map(|mut record| {
                if sets_seen {
                    match self.store.mark_read(record.email_id, true) {
                        Ok(()) => record.is_read = true,
                        Err(e) => warn!(
                            "{} Implicit STORE \\Seen on UID {} failed: {}",
                            self.log_prefix,
                            record.uid.0.get(),
                            e
                        ),
                    }
                }
                record
            })
            .collect::<Vec<_>>();

        let rows = if needs_content(request) {
            self.fetch_rows(&targets)
        } else {
            HashMap::new()
        };

        let fetched = targets
            .par_iter()
            .map(|record| {
                let row = rows.get(&record.email_id);
                (record.seqnum, self.fetch_single(request, record, row))
            })
            .collect::<Vec<_>>();

        for (seqnum, items) in fetched {
            if !items.is_empty() {
                receiver(seqnum, items);
            }
        }

        Ok(())
    }

    /// Fetch the content rows of `targets` in one batch.
    ///
    /// A failure is logged and treated as every row being missing.
    fn fetch_rows(
        &self,
        targets: &[MessageRecord],
    ) -> HashMap<EmailId, EmailRow> {
        let ids = targets.iter().map(|m| m.email_id).collect::<Vec<_>>();
        match self.store.fetch_emails_by_id(&ids) {
            Ok(rows) => rows.into_iter().map(|row| (row.id, row)).collect(),
            Err(e) => {
                warn!(
                    "{} Failed to fetch content of {} messages, \
                     omitting content items from FETCH: {}",
                    self.log_prefix,
                    ids.len(),
                    e
                );
                HashMap::new()
            }
        }
    }

    /// Produce the items for one message, in the order they are sent.
    ///
    /// If the content is needed but unavailable, only the items that can be
    /// derived from the record are produced. An empty result means the
    /// message is not reported at all.
    fn fetch_single<ID>(
        &self,
        request: &FetchRequest<ID>,
        record: &MessageRecord,
        row: Option<&EmailRow>,
    ) -> Vec<FetchedItem>
    where
        SeqRange<ID>: fmt::Debug,
    {
        let content = if needs_content(request) {
            self.parse_content(record, row)
        } else {
            None
        };

        let mut items = Vec::new();
        if request.uid {
            items.push(FetchedItem::Uid(record.uid));
        }

        if let Some((ref parsed, _)) = content {
            if request.envelope {
                items.push(FetchedItem::Envelope(Box::new(build_envelope(
                    record,
                    parsed,
                    &self.domain,
                ))));
            }
            if request.bodystructure {
                items.push(FetchedItem::BodyStructure(Box::new(
                    build_body_structure(
                        parsed,
                        request.extended_body_structure,
                    ),
                )));
            }
        }

        if request.rfc822size {
            // Without the content, the stored size is the best available.
            let size = match content {
                Some((_, ref serialized)) => {
                    u32::try_from(serialized.len()).unwrap_or(u32::MAX)
                }
                None => record.size,
            };
            items.push(FetchedItem::Rfc822Size(size));
        }

        if request.flags {
            items.push(FetchedItem::Flags(record.flags()));
        }
        if request.internal_date {
            items.push(FetchedItem::InternalDate(record.create_time));
        }

        if let Some((ref parsed, ref serialized)) = content {
            let src = SectionSource {
                record,
                message: parsed,
                serialized,
                domain: &self.domain,
            };
            for section in &request.sections {
                items.push(FetchedItem::BodySection((
                    section.clone(),
                    section.fetch(&src),
                )));
            }
        }

        items
    }

    fn parse_content(
        &self,
        record: &MessageRecord,
        row: Option<&EmailRow>,
    ) -> Option<(ParsedMessage, Vec<u8>)> {
        let row = match row {
            Some(row) => row,
            None => {
                warn!(
                    "{} No content for UID {}, omitting content items",
                    self.log_prefix,
                    record.uid.0.get()
                );
                return None;
            }
        };

        match ParsedMessage::parse(&row.raw) {
            Ok(parsed) => {
                let serialized = parsed.serialize();
                Some((parsed, serialized))
            }
            Err(e) => {
                warn!(
                    "{} Unable to parse UID {}, omitting content items: {}",
                    self.log_prefix,
                    record.uid.0.get(),
                    e
                );
                None
            }
        }
    }
}

fn needs_content<ID>(request: &FetchRequest<ID>) -> bool
where
    SeqRange<ID>: fmt::Debug,
{
    request.envelope
        || request.bodystructure
        || request.rfc822size
        || !request.sections.is_empty()
}

#[cfg(test)]
mod test {
    use super::super::test::*;
    use super::*;
    use crate::mime::fetch::section::*;
    use crate::test_data::*;

    fn content(id: u64, raw: &[u8]) -> EmailRow {
        EmailRow {
            id: EmailId(id),
            raw: raw.to_vec(),
            ..EmailRow::default()
        }
    }

    fn fixture() -> FixtureStore {
        FixtureStore::new(vec![record(3, 1), record(5, 2), record(8, 3)])
            .with_row(content(3, SIMPLE_TEXT))
            .with_row(content(5, WITH_ATTACHMENT))
            .with_row(content(8, NO_BODY))
    }

    fn collect<ID>(
        mailbox: &Mailbox,
        request: &FetchRequest<ID>,
        f: impl FnOnce(
            &Mailbox,
            &FetchRequest<ID>,
            FetchReceiver<'_>,
        ) -> Result<(), Error>,
    ) -> Vec<(Seqnum, Vec<FetchedItem>)>
    where
        SeqRange<ID>: fmt::Debug,
    {
        let mut out = Vec::new();
        f(mailbox, request, &mut |seqnum, items| out.push((seqnum, items)))
            .unwrap();
        out
    }

    fn uid_fetch(
        mailbox: &Mailbox,
        request: &FetchRequest<Uid>,
    ) -> Vec<(Seqnum, Vec<FetchedItem>)> {
        collect(mailbox, request, |m, r, recv| m.fetch(r, recv))
    }

    fn section(subscripts: Vec<u32>, peek: bool) -> BodySection {
        BodySection {
            subscripts,
            leaf_type: LeafType::Content,
            peek,
            ..BodySection::default()
        }
    }

    #[test]
    fn items_are_produced_in_order() {
        let (_, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::just(Uid::u(3)),
            uid: true,
            flags: true,
            rfc822size: true,
            internal_date: true,
            envelope: true,
            bodystructure: true,
            sections: vec![section(vec![1], true)],
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        assert_eq!(1, fetched.len());
        let (seqnum, ref items) = fetched[0];
        assert_eq!(Seqnum::u(1), seqnum);
        assert_eq!(7, items.len());
        assert_matches!(FetchedItem::Uid(_), &items[0]);
        assert_matches!(FetchedItem::Envelope(_), &items[1]);
        assert_matches!(FetchedItem::BodyStructure(_), &items[2]);
        assert_matches!(FetchedItem::Rfc822Size(_), &items[3]);
        assert_matches!(FetchedItem::Flags(_), &items[4]);
        assert_matches!(FetchedItem::InternalDate(_), &items[5]);
        assert_matches!(FetchedItem::BodySection(_), &items[6]);

        let serialized = ParsedMessage::parse(SIMPLE_TEXT).unwrap().serialize();
        assert_eq!(
            FetchedItem::Rfc822Size(serialized.len() as u32),
            items[3]
        );
        match items[1] {
            FetchedItem::Envelope(ref env) => assert_eq!(
                Some("<3@mx.example>"),
                env.message_id.as_deref()
            ),
            ref other => panic!("Unexpected item: {:?}", other),
        }
        match items[6] {
            FetchedItem::BodySection((_, ref data)) => {
                let data = String::from_utf8_lossy(data);
                assert!(data.contains("amount due"));
            }
            ref other => panic!("Unexpected item: {:?}", other),
        }
    }

    #[test]
    fn overlapping_sections_mark_read_once() {
        let (store, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::range(Uid::u(3), Uid::u(5)),
            flags: true,
            sections: vec![
                section(vec![], false),
                section(vec![1], false),
                BodySection {
                    leaf_type: LeafType::Headers,
                    header_filter: vec!["Subject".to_owned()],
                    ..BodySection::default()
                },
            ],
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        assert_eq!(2, fetched.len());
        assert_eq!(
            vec![(EmailId(3), true), (EmailId(5), true)],
            store.mark_read_calls()
        );
        for (_, items) in fetched {
            assert_eq!(FetchedItem::Flags(vec![Flag::Seen]), items[0]);
        }
    }

    #[test]
    fn peek_does_not_mark_read() {
        let (store, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::just(Uid::u(5)),
            flags: true,
            sections: vec![section(vec![], true), section(vec![2], true)],
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        assert_eq!(FetchedItem::Flags(vec![]), fetched[0].1[0]);
        assert!(store.mark_read_calls().is_empty());
    }

    #[test]
    fn mark_read_failure_does_not_abort() {
        let mut store = fixture();
        store.fail_mark_read = true;
        let (store, mailbox) = store.open();
        let request = FetchRequest {
            ids: SeqRange::just(Uid::u(8)),
            flags: true,
            sections: vec![section(vec![], false)],
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        assert_eq!(1, fetched.len());
        assert_eq!(FetchedItem::Flags(vec![]), fetched[0].1[0]);
        assert_eq!(1, store.mark_read_calls().len());
    }

    #[test]
    fn missing_part_is_empty_section() {
        let (_, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::just(Uid::u(3)),
            sections: vec![section(vec![4, 2], true)],
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        match fetched[0].1[0] {
            FetchedItem::BodySection((ref s, ref data)) => {
                assert_eq!(vec![4, 2], s.subscripts);
                assert!(data.is_empty());
            }
            ref other => panic!("Unexpected item: {:?}", other),
        }
    }

    #[test]
    fn sequence_numbers_and_unknown_ids() {
        let (store, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::parse("2:9", Seqnum::u(3)).unwrap(),
            uid: true,
            ..FetchRequest::default()
        };

        let fetched = collect(&mailbox, &request, |m, r, recv| {
            m.seqnum_fetch(r, recv)
        });
        assert_eq!(
            vec![
                (Seqnum::u(2), vec![FetchedItem::Uid(Uid::u(5))]),
                (Seqnum::u(3), vec![FetchedItem::Uid(Uid::u(8))]),
            ],
            fetched
        );
        // Nothing needed content.
        assert_eq!(
            0,
            store
                .fetch_calls
                .load(std::sync::atomic::Ordering::SeqCst)
        );

        let request = FetchRequest {
            ids: SeqRange::range(Uid::u(6), Uid::u(7)),
            uid: true,
            ..FetchRequest::default()
        };
        assert!(uid_fetch(&mailbox, &request).is_empty());
    }

    #[test]
    fn content_failure_keeps_metadata() {
        let mut store = fixture();
        store.fail_fetch = true;
        let (_, mailbox) = store.open();
        let request = FetchRequest {
            ids: SeqRange::range(Uid::u(3), Uid::u(5)),
            uid: true,
            flags: true,
            envelope: true,
            bodystructure: true,
            sections: vec![section(vec![1], true)],
            ..FetchRequest::default()
        };

        assert_eq!(
            vec![
                (
                    Seqnum::u(1),
                    vec![
                        FetchedItem::Uid(Uid::u(3)),
                        FetchedItem::Flags(vec![]),
                    ]
                ),
                (
                    Seqnum::u(2),
                    vec![
                        FetchedItem::Uid(Uid::u(5)),
                        FetchedItem::Flags(vec![]),
                    ]
                ),
            ],
            uid_fetch(&mailbox, &request)
        );
    }

    #[test]
    fn messages_without_content_keep_metadata() {
        let mut records = vec![record(1, 1), record(2, 2), record(3, 3)];
        records[0].size = 77;
        let (_, mailbox) = FixtureStore::new(records)
            .with_row(content(2, SIMPLE_TEXT))
            .with_row(content(1, b""))
            .open();
        let request = FetchRequest {
            ids: SeqRange::range(Uid::u(1), Uid::u(3)),
            uid: true,
            rfc822size: true,
            internal_date: true,
            envelope: true,
            ..FetchRequest::default()
        };

        let fetched = uid_fetch(&mailbox, &request);
        assert_eq!(3, fetched.len());

        // Unparseable content: the stored size stands in.
        assert_eq!(
            vec![
                FetchedItem::Uid(Uid::u(1)),
                FetchedItem::Rfc822Size(77),
                FetchedItem::InternalDate(record(1, 1).create_time),
            ],
            fetched[0].1
        );

        assert_matches!(FetchedItem::Envelope(_), &fetched[1].1[1]);
        assert_eq!(4, fetched[1].1.len());

        // No row at all.
        assert_eq!(
            vec![
                FetchedItem::Uid(Uid::u(3)),
                FetchedItem::Rfc822Size(0),
                FetchedItem::InternalDate(record(3, 3).create_time),
            ],
            fetched[2].1
        );
    }

    #[test]
    fn content_only_requests_skip_messages_without_content() {
        let (_, mailbox) = FixtureStore::new(vec![record(1, 1), record(2, 2)])
            .with_row(content(2, SIMPLE_TEXT))
            .open();
        let request = FetchRequest {
            ids: SeqRange::range(Seqnum::u(1), Seqnum::u(2)),
            envelope: true,
            ..FetchRequest::default()
        };

        let fetched = collect(&mailbox, &request, |m, r, recv| {
            m.seqnum_fetch(r, recv)
        });
        assert_eq!(1, fetched.len());
        assert_eq!(Seqnum::u(2), fetched[0].0);
    }

    #[test]
    fn mark_read_precedes_content_fetch() {
        let (store, mailbox) = fixture().open();
        let request = FetchRequest {
            ids: SeqRange::range(Uid::u(3), Uid::u(5)),
            sections: vec![section(vec![1], false)],
            ..FetchRequest::default()
        };

        uid_fetch(&mailbox, &request);
        assert_eq!(
            vec!["mark_read", "mark_read", "fetch_emails_by_id"],
            store.call_log()
        );
    }
}
