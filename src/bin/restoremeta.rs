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

//! `restoremeta <archive> <device> | --print [block]`: restores the
//! metadata blocks from `<archive>` onto `<device>`, or dumps them to
//! stdout in print-only mode.

use std::env::ArgsOs;
use std::fs::File;
use std::path::PathBuf;

use gfs2meta::gfs2::device::RestoreTarget;
use gfs2meta::restore;
use gfs2meta::restore::RestoreOptions;
use gfs2meta::util;

#[derive(Default)]
struct Args {
    archive_path: Option<PathBuf>,
    device_path: Option<PathBuf>,
    print_only: bool,
    print_block: Option<u64>,
}

fn parse_args(args: ArgsOs, bin: &str) -> Args {
    let mut res = Args::default();
    let mut positional = Vec::new();
    let mut iter = args.peekable();
    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("--print") => {
                res.print_only = true;
                if let Some(next) = iter.peek() {
                    if let Some(n) = next.to_str().and_then(|s| s.parse().ok()) {
                        res.print_block = Some(n);
                        iter.next();
                    }
                }
            }
            Some("-h" | "--help") => {
                println!("usage: {bin} <archive> <device> | --print [block]");
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let mut positional = positional.into_iter();
    res.archive_path = positional.next();
    res.device_path = positional.next();
    res
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let (bin, argv) = util::args();
    let args = parse_args(argv, &bin);

    let archive_path = args
        .archive_path
        .unwrap_or_else(|| util::error(&bin, "usage: restoremeta <archive> <device> | --print [block]"));
    let archive = File::open(&archive_path)
        .unwrap_or_else(|e| util::error(&bin, format_args!("{}: {e}", archive_path.display())));

    let destination = if args.print_only {
        None
    } else {
        let device_path = args
            .device_path
            .unwrap_or_else(|| util::error(&bin, "usage: restoremeta <archive> <device> | --print [block]"));
        Some(RestoreTarget::open_rw(&device_path).unwrap_or_else(|e| util::error(&bin, e)))
    };

    let opts = RestoreOptions {
        print_only: args.print_only,
        print_block: args.print_block,
    };
    restore::restore(archive, destination, opts).unwrap_or_else(|e| util::error(&bin, e));
}
