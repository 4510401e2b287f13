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

//! `savemeta <device> <file> [--level N] [--rgs-only]`: archives the
//! metadata blocks of `<device>` into `<file>`.

use std::env::ArgsOs;
use std::fs::File;
use std::path::PathBuf;

use gfs2meta::gfs2::device::Device;
use gfs2meta::save;
use gfs2meta::save::SaveOptions;
use gfs2meta::sink::Sink;
use gfs2meta::util;

#[derive(Default)]
struct Args {
    device_path: Option<PathBuf>,
    out_path: Option<PathBuf>,
    level: u32,
    rgs_only: bool,
}

fn parse_args(args: ArgsOs, bin: &str) -> Args {
    let mut res = Args::default();
    let mut positional = Vec::new();
    let mut iter = args.peekable();
    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("--level") => {
                let val = iter.next().unwrap_or_else(|| util::error(bin, "--level requires a value"));
                res.level = val
                    .to_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| util::error(bin, "--level expects an integer 0-9"));
            }
            Some("--rgs-only") => res.rgs_only = true,
            Some("-h" | "--help") => {
                println!("usage: {bin} <device> <file> [--level N] [--rgs-only]");
                std::process::exit(0);
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let mut positional = positional.into_iter();
    res.device_path = positional.next();
    res.out_path = positional.next();
    res
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let (bin, argv) = util::args();
    let args = parse_args(argv, &bin);

    let device_path = args
        .device_path
        .unwrap_or_else(|| util::error(&bin, "usage: savemeta <device> <file> [--level N] [--rgs-only]"));
    let out_path = args
        .out_path
        .unwrap_or_else(|| util::error(&bin, "usage: savemeta <device> <file> [--level N] [--rgs-only]"));

    let device = Device::open(&device_path).unwrap_or_else(|e| util::error(&bin, e));
    let out = File::create(&out_path).unwrap_or_else(|e| util::error(&bin, format_args!("{}: {e}", out_path.display())));
    let sink = if args.level == 0 {
        Sink::raw(out)
    } else {
        Sink::gzip(out, args.level)
    };

    let opts = SaveOptions {
        level: args.level,
        rgs_only: args.rgs_only,
    };
    save::save(device, sink, opts).unwrap_or_else(|e| util::error(&bin, e));
}
