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

use std::collections::{HashMap, HashSet};

use chrono::prelude::*;
use log::warn;
use rayon::prelude::*;

use super::search_backend;
use super::Mailbox;
use crate::account::model::*;

impl Mailbox {
    /// The `SEARCH` command.
    pub fn seqnum_search(
        &self,
        request: &SearchRequest,
    ) -> SearchResponse<Seqnum> {
        SearchResponse::new(
            self.evaluate(&request.criteria)
                .into_iter()
                .map(|m| m.seqnum)
                .collect(),
        )
    }

    /// The `UID SEARCH` command.
    pub fn search(&self, request: &SearchRequest) -> SearchResponse<Uid> {
        SearchResponse::new(
            self.evaluate(&request.criteria)
                .into_iter()
                .map(|m| m.uid)
                .collect(),
        )
    }

    /// Return the messages in the snapshot matching `criteria`, in snapshot
    /// order.
    ///
    /// Evaluation is a pipeline of passes, each of which only removes
    /// candidates:
    ///
    /// 1. An empty node matches everything.
    /// 2. UID sets.
    /// 3. Sequence number sets.
    /// 4. Dates, sizes and content, as a single conjunctive pass. Content
    ///    is only fetched for the candidates that survived so far.
    /// 5. Required and excluded flags.
    /// 6. Each `NOT` child, evaluated against the whole snapshot.
    /// 7. Each `OR` pair, evaluated against the whole snapshot. The
    ///    candidates are narrowed to those matching either side, so several
    ///    pairs compose as an intersection of unions.
    pub fn evaluate(&self, criteria: &SearchCriteria) -> Vec<&MessageRecord> {
        let base = self.snapshot.messages();
        let mut candidates = base.iter().collect::<Vec<_>>();
        if criteria.is_empty() {
            return candidates;
        }

        for uids in &criteria.uid {
            candidates.retain(|m| uids.contains(m.uid));
        }

        for seqnums in &criteria.seqnum {
            candidates.retain(|m| seqnums.contains(m.seqnum));
        }

        if has_record_or_content_predicates(criteria) {
            candidates = self.filter_by_content(candidates, criteria);
        }

        candidates.retain(|m| {
            criteria.flag.iter().all(|f| m.has_flag(f))
                && !criteria.not_flag.iter().any(|f| m.has_flag(f))
        });

        for not in &criteria.not {
            let excluded = self.matching_uids(not);
            candidates.retain(|m| !excluded.contains(&m.uid));
        }

        for &(ref a, ref b) in &criteria.or {
            let mut either = self.matching_uids(a);
            either.extend(self.matching_uids(b));
            candidates.retain(|m| either.contains(&m.uid));
        }

        candidates
    }

    fn matching_uids(&self, criteria: &SearchCriteria) -> HashSet<Uid> {
        self.evaluate(criteria).into_iter().map(|m| m.uid).collect()
    }

    /// Pass 4.
    ///
    /// If the content of the candidates cannot be fetched, the whole pass is
    /// skipped and every candidate survives it.
    fn filter_by_content<'a>(
        &self,
        candidates: Vec<&'a MessageRecord>,
        criteria: &SearchCriteria,
    ) -> Vec<&'a MessageRecord> {
        let ops = search_backend::compile(criteria);

        let rows: HashMap<EmailId, EmailRow> = if ops.is_empty() {
            HashMap::new()
        } else {
            let ids = candidates.iter().map(|m| m.email_id).collect::<Vec<_>>();
            match self.store.fetch_emails_by_id(&ids) {
                Ok(rows) => rows.into_iter().map(|r| (r.id, r)).collect(),
                Err(e) => {
                    warn!(
                        "{} Failed to fetch content of {} messages for \
                         search, not filtering by content: {}",
                        self.log_prefix,
                        ids.len(),
                        e
                    );
                    return candidates;
                }
            }
        };

        candidates
            .into_par_iter()
            .filter(|m| {
                record_matches(m, criteria)
                    && (ops.is_empty()
                        || rows.get(&m.email_id).map_or(false, |row| {
                            search_backend::eval(&ops, row)
                        }))
            })
            .collect()
    }
}

fn has_record_or_content_predicates(criteria: &SearchCriteria) -> bool {
    criteria.since.is_some()
        || criteria.before.is_some()
        || criteria.sent_since.is_some()
        || criteria.sent_before.is_some()
        || criteria.larger.is_some()
        || criteria.smaller.is_some()
        || !criteria.header.is_empty()
        || !criteria.body.is_empty()
        || !criteria.text.is_empty()
}

/// Evaluate the date and size predicates, which only need the record.
fn record_matches(record: &MessageRecord, criteria: &SearchCriteria) -> bool {
    date_in_range(&record.create_time, criteria.since, criteria.before)
        && date_in_range(
            &record.send_date,
            criteria.sent_since,
            criteria.sent_before,
        )
        && criteria.larger.map_or(true, |n| record.size > n)
        && criteria.smaller.map_or(true, |n| record.size < n)
}

/// Compare by calendar date only, as seen in the timestamp's own zone.
fn date_in_range(
    timestamp: &DateTime<FixedOffset>,
    since: Option<NaiveDate>,
    before: Option<NaiveDate>,
) -> bool {
    let date = timestamp.naive_local().date();
    since.map_or(true, |since| date >= since)
        && before.map_or(true, |before| date < before)
}
