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

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use structopt::StructOpt;

use crate::account::store::MemoryStore;
use crate::imap::command_processor::CommandProcessor;
use crate::imap::lex::LexWriter;
use crate::imap::response_writer as r;
use crate::support::log_prefix::LogPrefix;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

/// Run IMAP SEARCH and FETCH commands against a directory of messages.
///
/// Every `*.eml` file in the message directory is loaded into a transient
/// mailbox, in file name order, so that the first file gets UID 1. The
/// command is then executed against that mailbox and the raw IMAP responses
/// are written to standard output.
#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Execute a SEARCH command.
    ///
    /// The remaining arguments are joined with spaces and used as the
    /// search criteria, for example `ferrymap search -d msgs FROM alice
    /// SINCE 1-Jan-2020`.
    Search(QueryOptions),
    /// Execute a FETCH command.
    ///
    /// The remaining arguments are joined with spaces and used as the
    /// sequence set and fetch attributes, for example
    /// `ferrymap fetch -d msgs 1:* (FLAGS ENVELOPE)`.
    Fetch(QueryOptions),
}

#[derive(StructOpt, Default)]
struct QueryOptions {
    /// Path to the Ferrymap configuration root.
    ///
    /// `ferrymap.toml` and `logging.toml` are read from here if present.
    #[structopt(long, parse(from_os_str), default_value = ".")]
    root: PathBuf,

    /// Directory containing the `*.eml` files to load.
    #[structopt(short = "d", long, parse(from_os_str))]
    mailbox_dir: PathBuf,

    /// Name of the mailbox the messages are loaded into.
    #[structopt(long, default_value = "INBOX")]
    mailbox: String,

    /// Address messages by UID instead of by sequence number.
    #[structopt(long)]
    uid: bool,

    /// The arguments of the IMAP command.
    #[structopt(required = true)]
    args: Vec<String>,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let (verb, options) = match cmd {
        Command::Search(options) => ("SEARCH", options),
        Command::Fetch(options) => ("FETCH", options),
    };

    if let Err(exit) = query(verb, options) {
        exit.exit();
    }
}

fn query(verb: &str, options: QueryOptions) -> Result<(), Sysexit> {
    let system_config = match SystemConfig::load(&options.root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error in config under '{}': {}",
                options.root.display(),
                e
            );
            return Err(EX_CONFIG);
        }
    };

    init_log(&system_config, &options)?;

    let store = Arc::new(MemoryStore::new());
    match store.load_dir(&options.mailbox, &options.mailbox_dir) {
        Ok(n) => info!(
            "Loaded {} messages from '{}'",
            n,
            options.mailbox_dir.display()
        ),
        Err(e) => {
            eprintln!(
                "Failed to load '{}': {}",
                options.mailbox_dir.display(),
                e
            );
            return Err(Sysexit::from(&e));
        }
    }

    let mut processor = CommandProcessor::new(
        LogPrefix::new("cli".to_owned()),
        Arc::new(system_config),
        store,
    );
    if let Err(e) = processor.select(&options.mailbox) {
        eprintln!("Failed to select '{}': {}", options.mailbox, e);
        return Err(Sysexit::from(&e));
    }

    let line = command_line(verb, &options);
    let stdout = io::stdout();
    let mut writer = LexWriter::new(stdout.lock(), processor.unicode_aware());
    let mut write_error: Option<io::Error> = None;

    let final_response = processor.handle_line(line.as_bytes(), &mut |response| {
        if write_error.is_some() {
            return;
        }

        let line = r::ResponseLine {
            tag: None,
            response,
        };
        if let Err(e) = line.write_to(&mut writer) {
            write_error = Some(e);
        }
    });

    let result = match write_error {
        Some(e) => Err(e),
        None => final_response
            .write_to(&mut writer)
            .and_then(|_| writer.into_inner().flush()),
    };
    if let Err(e) = result {
        error!("Failed to write responses: {}", e);
        return Err(EX_IOERR);
    }

    match final_response.response {
        r::Response::Cond(r::CondResponse {
            cond: r::RespCondType::Ok,
            ..
        }) => Ok(()),
        _ => Err(EX_SOFTWARE),
    }
}

fn init_log(
    system_config: &SystemConfig,
    options: &QueryOptions,
) -> Result<(), Sysexit> {
    match system_config.log_config_path(&options.root) {
        Some(path) => {
            if let Err(e) =
                log4rs::init_file(&path, log4rs::file::Deserializers::new())
            {
                eprintln!(
                    "Failed to initialise logging from '{}': {}",
                    path.display(),
                    e
                );
                return Err(EX_CONFIG);
            }
        }
        None => crate::init_simple_log(),
    }

    Ok(())
}

fn command_line(verb: &str, options: &QueryOptions) -> String {
    format!(
        "cli1 {}{} {}",
        if options.uid { "UID " } else { "" },
        verb,
        options.args.join(" ")
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_lines() {
        let mut options = QueryOptions {
            args: vec!["FROM".to_owned(), "alice".to_owned()],
            ..QueryOptions::default()
        };
        assert_eq!("cli1 SEARCH FROM alice", command_line("SEARCH", &options));

        options.uid = true;
        options.args = vec!["1:*".to_owned(), "(FLAGS UID)".to_owned()];
        assert_eq!(
            "cli1 UID FETCH 1:* (FLAGS UID)",
            command_line("FETCH", &options)
        );
    }

    #[test]
    fn cli_definition_parses() {
        let cmd = Command::from_iter_safe(&[
            "ferrymap",
            "search",
            "-d",
            "msgs",
            "--uid",
            "NOT",
            "SEEN",
        ])
        .unwrap();
        match cmd {
            Command::Search(options) => {
                assert!(options.uid);
                assert_eq!("INBOX", options.mailbox);
                assert_eq!(PathBuf::from("."), options.root);
                assert_eq!(vec!["NOT", "SEEN"], options.args);
            }
            Command::Fetch(..) => panic!("parsed as fetch"),
        }
    }

    #[test]
    fn end_to_end_against_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("0001.eml"),
            crate::test_data::SIMPLE_TEXT,
        )
        .unwrap();

        let store = Arc::new(MemoryStore::new());
        assert_eq!(1, store.load_dir("INBOX", dir.path()).unwrap());

        let mut processor = CommandProcessor::new(
            LogPrefix::new("cli".to_owned()),
            Arc::new(SystemConfig::default()),
            store,
        );
        processor.select("INBOX").unwrap();

        let mut out = Vec::new();
        let mut writer = LexWriter::new(&mut out, false);
        let mut responses = Vec::new();
        let final_response = processor
            .handle_line(b"cli1 UID SEARCH ALL", &mut |r| responses.push(r));
        for response in responses {
            r::ResponseLine {
                tag: None,
                response,
            }
            .write_to(&mut writer)
            .unwrap();
        }
        final_response.write_to(&mut writer).unwrap();

        assert_eq!(
            "* SEARCH 1\r\ncli1 OK Done\r\n",
            std::str::from_utf8(&out).unwrap()
        );
    }
}
