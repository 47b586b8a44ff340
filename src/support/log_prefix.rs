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
use std::sync::{Arc, Mutex};

/// Tracks text that should be included in at the start of every log statement.
///
/// Clones of a `LogPrefix` share the same underlying data, so a command
/// processor can update the selected mailbox and have every component that
/// logs on its behalf pick up the change.
#[derive(Clone)]
pub struct LogPrefix {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone)]
struct Inner {
    protocol: String,
    mailbox: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: String) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                protocol,
                mailbox: None,
            })),
        }
    }

    pub fn set_mailbox(&self, mailbox: Option<String>) {
        self.lock().mailbox = mailbox.map(sanitise);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave `Inner` half-updated,
        // so poisoning is irrelevant here.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.lock();
        write!(f, "{}", inner.protocol)?;
        if let Some(ref mailbox) = inner.mailbox {
            write!(f, "[mailbox={}]", mailbox)?;
        }

        Ok(())
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formats_context() {
        let prefix = LogPrefix::new("imap".to_owned());
        assert_eq!("imap", prefix.to_string());

        let shared = prefix.clone();
        shared.set_mailbox(Some("INBOX".to_owned()));
        assert_eq!("imap[mailbox=INBOX]", prefix.to_string());

        prefix.set_mailbox(Some("Arch\u{7}ive".to_owned()));
        assert_eq!("imap[mailbox=Archive]", shared.to_string());

        prefix.set_mailbox(None);
        assert_eq!("imap", prefix.to_string());
    }

    #[test]
    fn truncates_long_values() {
        let prefix = LogPrefix::new("cli".to_owned());
        prefix.set_mailbox(Some("x".repeat(100)));
        assert_eq!(
            format!("cli[mailbox={}]", "x".repeat(64)),
            prefix.to_string()
        );
    }
}
