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

//! Constants from `sysexits.h`
//!
//! The command-line front end reports failures using these codes so that it
//! composes with scripts following the sendmail conventions.

use super::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl<'a> From<&'a Error> for Sysexit {
    fn from(e: &'a Error) -> Self {
        match *e {
            Error::NxMailbox => EX_NOINPUT,
            Error::UnparseableMessage => EX_DATAERR,
            Error::Config(_) => EX_CONFIG,
            Error::Io(_) => EX_IOERR,
            _ => EX_SOFTWARE,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errors_map_to_exit_codes() {
        assert_eq!(EX_NOINPUT, Sysexit::from(&Error::NxMailbox));
        assert_eq!(EX_DATAERR, Sysexit::from(&Error::UnparseableMessage));
        assert_eq!(
            EX_IOERR,
            Sysexit::from(&Error::Io(std::io::ErrorKind::NotFound.into()))
        );
        assert_eq!(
            EX_SOFTWARE,
            Sysexit::from(&Error::Storage("down".to_owned()))
        );
    }
}
