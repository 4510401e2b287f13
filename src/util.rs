/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Miscellaneous utility functions shared across the save and restore paths.

use std::env;
use std::env::ArgsOs;
use std::fmt;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the command's name along with an iterator over its remaining
/// arguments.
pub fn args() -> (String, ArgsOs) {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| error("gfs2meta", "missing binary name"));
    (bin, args)
}

/// Writes an error to stderr, then exits with status 1.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Returns the current timestamp since the Unix epoch.
pub fn get_timestamp() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock panic!")
}

/// Structure representing a number of bytes, for human-readable display.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 7] = ["KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB"];

        if self.0 < 1024 {
            return write!(fmt, "{} bytes", self.0);
        }
        let mut val = self.0 as f64 / 1024.;
        let mut unit = UNITS[0];
        for u in &UNITS[1..] {
            if val < 1024. {
                break;
            }
            val /= 1024.;
            unit = u;
        }
        write!(fmt, "{:.2} {}", val, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)), "0 bytes");
        assert_eq!(format!("{}", ByteSize(1023)), "1023 bytes");
        assert_eq!(format!("{}", ByteSize(1024)), "1.00 KiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024)), "1.00 MiB");
        assert_eq!(format!("{}", ByteSize(3 * 1024 * 1024 * 1024)), "3.00 GiB");
    }
}
