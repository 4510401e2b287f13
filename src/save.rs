//! C9: the Save Orchestrator, grounded on `main`'s save path in
//! `gfs2/edit/savemeta.c`: open sink, write the header, archive the
//! superblock (and, for the legacy variant, the rindex and journal
//! ranges), then walk every resource group.

use log::info;

use crate::block_reader;
use crate::error::Result;
use crate::gfs2::device::Device;
use crate::gfs2::device::RawRead;
use crate::gfs2::BitmapScanner;
use crate::gfs2::InodeReader;
use crate::gfs2::RgrpIndex;
use crate::gfs2::SuperblockSource;
use crate::gfs2::GFS2_SB_ADDR;
use crate::journal_registry::JournalRegistry;
use crate::progress::Progress;
use crate::record;
use crate::rgrp_walker;
use crate::sink::Sink;

/// Options controlling a save run.
#[derive(Debug, Clone, Copy)]
pub struct SaveOptions {
    /// Gzip compression level; `0` selects the raw (uncompressed) sink.
    pub level: u32,
    /// When true, archive only resource-group header/bitmap spans, skipping
    /// every dinode and its descendants.
    pub rgs_only: bool,
}

/// Drives a full save of `device` into `sink`, per the seven-step order in
/// the component design.
pub fn save(mut device: Device, mut sink: Sink, opts: SaveOptions) -> Result<()> {
    let bsize = SuperblockSource::bsize(&device);
    let fssize = SuperblockSource::fssize(&device);
    let fs_bytes = fssize * bsize as u64;
    let gfs1 = device.gfs1();

    let mut journals = JournalRegistry::new();
    if SuperblockSource::jindex_addr(&device) != 0 {
        let jindex_addr = SuperblockSource::jindex_addr(&device);
        if let Ok(jindex) = device.read_inode(jindex_addr) {
            let _ = journals.discover_journals(&mut device, &jindex, |_| None);
        }
    }
    if SuperblockSource::per_node_addr(&device) != 0 {
        let per_node_addr = SuperblockSource::per_node_addr(&device);
        if let Ok(per_node) = device.read_inode(per_node_addr) {
            let _ = journals.discover_per_node(&mut device, &per_node);
        }
    }
    // The handful of other well-known system files, matching
    // `block_is_systemfile` in the original implementation.
    journals.register_system_file(SuperblockSource::jindex_addr(&device));
    journals.register_system_file(SuperblockSource::per_node_addr(&device));
    journals.register_system_file(SuperblockSource::rindex_addr(&device));
    journals.register_system_file(SuperblockSource::inum_addr(&device));
    journals.register_system_file(SuperblockSource::statfs_addr(&device));
    journals.register_system_file(SuperblockSource::quota_addr(&device));

    record::write_header(&mut sink, fs_bytes)?;

    let mut progress = Progress::new(fssize);

    let sb_addr = GFS2_SB_ADDR / (bsize as u64 / crate::gfs2::GFS2_BASIC_BLOCK).max(1);
    let sb_range = block_reader::read_range(&mut device, sb_addr, 1, gfs1, |_| true, |_| None);
    for i in 0..sb_range.len as usize {
        record::write_record(&mut sink, sb_range.start + i as u64, sb_range.slot(i), sb_range.bsize as usize)?;
        progress.record(true);
    }

    if gfs1 {
        let rindex_addr = SuperblockSource::rindex_addr(&device);
        if rindex_addr != 0 {
            let rindex_range = block_reader::read_range(&mut device, rindex_addr, 1, gfs1, |_| true, |_| None);
            for i in 0..rindex_range.len as usize {
                record::write_record(&mut sink, rindex_range.start + i as u64, rindex_range.slot(i), rindex_range.bsize as usize)?;
                progress.record(true);
            }
        }
        for journal in journals.journals().to_vec() {
            let len = journal.segments.saturating_mul(16);
            if len == 0 {
                continue;
            }
            let range = block_reader::read_range(&mut device, journal.addr, len, gfs1, |_| true, |_| None);
            for i in 0..range.len as usize {
                record::write_record(&mut sink, range.start + i as u64, range.slot(i), range.bsize as usize)?;
                progress.record(true);
            }
        }
    }

    let rgrps = RgrpIndex::resource_groups(&mut device)?;
    info!("archiving {} resource groups", rgrps.len());
    for rgd in rgrps {
        rgrp_walker::save_rgrp(&mut device, &mut sink, &mut progress, &rgd, gfs1, !opts.rgs_only, &journals)?;
    }

    progress.finish();
    sink.close()
}
