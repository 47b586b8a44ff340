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

use std::convert::TryFrom;

use log::info;

use super::*;

impl CommandProcessor {
    pub(super) fn cmd_search(
        &mut self,
        tag: &str,
        cmd: s::SearchCommand<'_>,
        sender: SendResponse<'_>,
    ) -> CmdResult {
        self.search(tag, cmd, sender, false, Mailbox::seqnum_search)
    }

    pub(super) fn cmd_uid_search(
        &mut self,
        tag: &str,
        cmd: s::SearchCommand<'_>,
        sender: SendResponse<'_>,
    ) -> CmdResult {
        self.search(tag, cmd, sender, true, Mailbox::search)
    }

    fn search<T>(
        &mut self,
        tag: &str,
        cmd: s::SearchCommand<'_>,
        sender: SendResponse<'_>,
        uid: bool,
        f: impl FnOnce(&Mailbox, &SearchRequest) -> SearchResponse<T>,
    ) -> CmdResult
    where
        T: TryFrom<u32> + Into<u32> + PartialOrd + Copy,
    {
        if let Some(ref charset) = cmd.charset {
            // Everything is UTF-8 internally, and US-ASCII is a subset of
            // it, so those are the only charsets that can be honoured.
            if !charset.eq_ignore_ascii_case("us-ascii")
                && !charset.eq_ignore_ascii_case("utf-8")
            {
                return Err(r::Response::Cond(r::CondResponse {
                    cond: r::RespCondType::No,
                    code: Some(r::RespTextCode::BadCharset(vec![
                        "us-ascii", "utf-8",
                    ])),
                    quip: Some(Cow::Borrowed("Unsupported charset")),
                }));
            }
        }

        let mailbox = self.open_selected()?;
        let request = search_request_from_ast(&mailbox, cmd)?;
        let response = f(&mailbox, &request);
        info!(
            "{} {}SEARCH matched {} of {} messages",
            self.log_prefix,
            if uid { "UID " } else { "" },
            response.count,
            mailbox.snapshot().len()
        );

        sender(match request.return_opts {
            None => r::Response::Search(
                response.hits.into_iter().map(Into::into).collect(),
            ),
            Some(opts) => {
                r::Response::Esearch(esearch_response(tag, uid, opts, response))
            }
        });
        success()
    }
}

fn esearch_response<T>(
    tag: &str,
    uid: bool,
    opts: SearchReturnOpts,
    response: SearchResponse<T>,
) -> r::EsearchResponse
where
    T: TryFrom<u32> + Into<u32> + PartialOrd + Copy,
{
    let all = if opts.all {
        let mut set = SeqRange::<T>::new();
        for &hit in &response.hits {
            set.append(hit);
        }
        Some(set).filter(|s| !s.is_empty()).map(|s| s.to_string())
    } else {
        None
    };

    r::EsearchResponse {
        tag: tag.to_owned(),
        uid,
        min: response.min.filter(|_| opts.min).map(Into::into),
        max: response.max.filter(|_| opts.max).map(Into::into),
        count: Some(response.count).filter(|_| opts.count),
        all,
    }
}

fn search_request_from_ast(
    mailbox: &Mailbox,
    cmd: s::SearchCommand<'_>,
) -> PartialResult<SearchRequest> {
    let mut criteria = SearchCriteria::default();
    for key in cmd.keys {
        apply_search_key(mailbox, &mut criteria, key)?;
    }

    let return_opts = cmd.return_opts.map(|opts| {
        let mut ret = SearchReturnOpts::default();
        for opt in &opts {
            match *opt {
                s::SearchReturnOpt::Min => ret.min = true,
                s::SearchReturnOpt::Max => ret.max = true,
                s::SearchReturnOpt::Count => ret.count = true,
                s::SearchReturnOpt::All => ret.all = true,
            }
        }
        // RFC 4731: `RETURN ()` is the same as `RETURN (ALL)`.
        if opts.is_empty() {
            ret.all = true;
        }
        ret
    });

    Ok(SearchRequest {
        criteria,
        return_opts,
    })
}

/// Add the constraint of `key` to `criteria`.
///
/// Every constraint of a criteria node is conjunctive, so a sequence of keys
/// (including a parenthesised group) is folded into a single node. `NOT` and
/// `OR` produce nested nodes.
fn apply_search_key(
    mailbox: &Mailbox,
    criteria: &mut SearchCriteria,
    key: s::SearchKey<'_>,
) -> PartialResult<()> {
    match key {
        s::SearchKey::Simple(simple) => match simple {
            s::SimpleSearchKey::All => (),
            s::SimpleSearchKey::Answered => criteria.flag.push(Flag::Answered),
            s::SimpleSearchKey::Deleted => criteria.flag.push(Flag::Deleted),
            s::SimpleSearchKey::Draft => criteria.flag.push(Flag::Draft),
            s::SimpleSearchKey::Flagged => criteria.flag.push(Flag::Flagged),
            s::SimpleSearchKey::Seen => criteria.flag.push(Flag::Seen),
            s::SimpleSearchKey::Unanswered => {
                criteria.not_flag.push(Flag::Answered)
            }
            s::SimpleSearchKey::Undeleted => {
                criteria.not_flag.push(Flag::Deleted)
            }
            s::SimpleSearchKey::Undraft => criteria.not_flag.push(Flag::Draft),
            s::SimpleSearchKey::Unflagged => {
                criteria.not_flag.push(Flag::Flagged)
            }
            s::SimpleSearchKey::Unseen => criteria.not_flag.push(Flag::Seen),
        },

        s::SearchKey::Text(text_key) => {
            let value = text_key.value.into_owned();
            let header = |key: &str| HeaderPredicate {
                key: key.to_owned(),
                value: value.clone(),
            };
            match text_key.typ {
                s::TextSearchKeyType::Bcc => criteria.header.push(header("Bcc")),
                s::TextSearchKeyType::Cc => criteria.header.push(header("Cc")),
                s::TextSearchKeyType::From => {
                    criteria.header.push(header("From"))
                }
                s::TextSearchKeyType::Subject => {
                    criteria.header.push(header("Subject"))
                }
                s::TextSearchKeyType::To => criteria.header.push(header("To")),
                s::TextSearchKeyType::Body => criteria.body.push(value),
                s::TextSearchKeyType::Text => criteria.text.push(value),
            }
        }

        s::SearchKey::Date(date_key) => {
            let date = date_key.date;
            match date_key.typ {
                s::DateSearchKeyType::Before => {
                    lower(&mut criteria.before, date)
                }
                s::DateSearchKeyType::Since => raise(&mut criteria.since, date),
                s::DateSearchKeyType::On => {
                    raise(&mut criteria.since, date);
                    if let Some(next) = date.succ_opt() {
                        lower(&mut criteria.before, next);
                    }
                }
                s::DateSearchKeyType::SentBefore => {
                    lower(&mut criteria.sent_before, date)
                }
                s::DateSearchKeyType::SentSince => {
                    raise(&mut criteria.sent_since, date)
                }
                s::DateSearchKeyType::SentOn => {
                    raise(&mut criteria.sent_since, date);
                    if let Some(next) = date.succ_opt() {
                        lower(&mut criteria.sent_before, next);
                    }
                }
            }
        }

        s::SearchKey::Keyword(flag) => criteria.flag.push(flag),
        s::SearchKey::Unkeyword(flag) => criteria.not_flag.push(flag),
        s::SearchKey::Header(header) => criteria.header.push(HeaderPredicate {
            key: header.header.into_owned(),
            value: header.value.into_owned(),
        }),
        s::SearchKey::Larger(n) => raise(&mut criteria.larger, n),
        s::SearchKey::Smaller(n) => lower(&mut criteria.smaller, n),

        s::SearchKey::Not(sub) => {
            let mut node = SearchCriteria::default();
            apply_search_key(mailbox, &mut node, *sub)?;
            criteria.not.push(node);
        }

        s::SearchKey::Or(or) => {
            let mut a = SearchCriteria::default();
            apply_search_key(mailbox, &mut a, *or.a)?;
            let mut b = SearchCriteria::default();
            apply_search_key(mailbox, &mut b, *or.b)?;
            criteria.or.push((a, b));
        }

        s::SearchKey::Uid(ss) => {
            criteria.uid.push(parse_uid_range(mailbox, &ss)?)
        }
        s::SearchKey::Seqnum(ss) => {
            criteria.seqnum.push(parse_seqnum_range(mailbox, &ss)?)
        }

        s::SearchKey::And(keys) => {
            for key in keys {
                apply_search_key(mailbox, criteria, key)?;
            }
        }
    }

    Ok(())
}

/// Tighten a lower bound.
fn raise<T: Ord>(slot: &mut Option<T>, value: T) {
    *slot = Some(match slot.take() {
        Some(prev) => prev.max(value),
        None => value,
    });
}

/// Tighten an upper bound.
fn lower<T: Ord>(slot: &mut Option<T>, value: T) {
    *slot = Some(match slot.take() {
        Some(prev) => prev.min(value),
        None => value,
    });
}
