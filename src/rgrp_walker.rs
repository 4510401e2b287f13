//! C8: iterates one resource group's header/bitmap span, then (optionally)
//! its dinodes, grounded on `save_rgrp` in `gfs2/edit/savemeta.c`.

use crate::block_reader;
use crate::block_typer::BlockKind;
use crate::error::Result;
use crate::gfs2::device::RawRead;
use crate::gfs2::BitmapScanner;
use crate::gfs2::BlockState;
use crate::gfs2::DinodeView;
use crate::gfs2::InodeReader;
use crate::gfs2::RgrpDescriptor;
use crate::inode_walker;
use crate::inode_walker::WalkContext;
use crate::journal_registry::JournalRegistry;
use crate::progress::Progress;
use crate::record;
use crate::sink::Sink;

/// Saves `rgd`'s header/bitmap span and, if `with_contents`, every dinode
/// (and the legacy variant's unlinked blocks) it contains. `journals` gives
/// the SystemFiles membership (spec's §3 significant-length policy keys off
/// whether a dinode is itself a system file).
pub fn save_rgrp<R: RawRead + BitmapScanner + InodeReader>(
    reader: &mut R,
    sink: &mut Sink,
    progress: &mut Progress,
    rgd: &RgrpDescriptor,
    gfs1: bool,
    with_contents: bool,
    journals: &JournalRegistry,
) -> Result<()> {
    let range = block_reader::read_range(reader, rgd.addr, rgd.length, gfs1, |_| true, |_| None);
    for i in 0..range.len as usize {
        let addr = range.start + i as u64;
        record::write_record(sink, addr, range.slot(i), range.bsize as usize)?;
        progress.record(true);
    }

    if !with_contents {
        return Ok(());
    }

    let dinode_addrs = reader.scan(rgd, BlockState::Dinode)?;
    for (start, len) in coalesce_addrs(&dinode_addrs) {
        let dinode_range = block_reader::read_range(reader, start, len, gfs1, |addr| journals.is_system(addr), |_| None);
        for i in 0..dinode_range.len as usize {
            let addr = dinode_range.start + i as u64;
            if dinode_range.kinds[i] != BlockKind::Dinode {
                continue;
            }
            let mut buf = vec![0u8; dinode_range.bsize as usize];
            buf.copy_from_slice(dinode_range.slot(i));
            let dinode = match reader.read_inode(addr) {
                Ok(dn) => dn,
                Err(_) => continue,
            };
            let is_owner_system = journals.is_system(addr) || dinode.is_system();
            record::write_record(sink, addr, &buf, dinode_range.lengths[i])?;
            progress.record(dinode_range.lengths[i] > 0);

            let ctx = WalkContext {
                gfs1,
                is_owner_system,
            };
            inode_walker::save_inode_data(reader, sink, progress, &buf, &dinode, ctx)?;
        }
    }

    if gfs1 {
        let unlinked_addrs = reader.scan(rgd, BlockState::Unlinked)?;
        for (start, len) in coalesce_addrs(&unlinked_addrs) {
            let range = block_reader::read_range(reader, start, len, gfs1, |_| true, |_| None);
            for i in 0..range.len as usize {
                record::write_record(sink, range.start + i as u64, range.slot(i), range.bsize as usize)?;
                progress.record(true);
            }
        }
    }

    Ok(())
}

fn coalesce_addrs(addrs: &[u64]) -> Vec<(u64, u32)> {
    let mut out: Vec<(u64, u32)> = Vec::new();
    for &addr in addrs {
        match out.last_mut() {
            Some((start, len)) if *start + *len as u64 == addr => *len += 1,
            _ => out.push((addr, 1)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfs2::metatype;
    use crate::gfs2::GFS2_MAGIC;

    struct FakeDevice {
        bsize: u32,
        fssize: u64,
        data: Vec<u8>,
        dinode_states: Vec<u64>,
    }

    impl RawRead for FakeDevice {
        fn bsize(&self) -> u32 {
            self.bsize
        }
        fn fssize(&self) -> u64 {
            self.fssize
        }
        fn pread_blocks(&mut self, start: u64, len: u32, buf: &mut [u8]) -> Result<()> {
            let bsize = self.bsize as usize;
            let off = start as usize * bsize;
            let n = len as usize * bsize;
            buf[..n].copy_from_slice(&self.data[off..off + n]);
            Ok(())
        }
    }

    impl InodeReader for FakeDevice {
        fn read_inode(&mut self, addr: u64) -> Result<DinodeView> {
            Ok(DinodeView {
                addr,
                height: 0,
                mode: libc::S_IFREG as u32,
                flags: 0,
                eattr: 0,
            })
        }
    }

    impl BitmapScanner for FakeDevice {
        fn scan(&mut self, _rgd: &RgrpDescriptor, state: BlockState) -> Result<Vec<u64>> {
            if state == BlockState::Dinode {
                Ok(self.dinode_states.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[test]
    fn empty_rgrp_archives_only_its_header_span() {
        let bsize = 512u32;
        let mut data = vec![0u8; 1000 * bsize as usize];
        let off = 17 * bsize as usize;
        data[off..off + 4].copy_from_slice(&GFS2_MAGIC.to_be_bytes());
        data[off + 4..off + 8].copy_from_slice(&metatype::RG.to_be_bytes());
        let mut dev = FakeDevice {
            bsize,
            fssize: 1000,
            data,
            dinode_states: Vec::new(),
        };
        let rgd = RgrpDescriptor {
            addr: 17,
            length: 1,
            data_start: 18,
            data_count: 0,
        };
        let mut sink = Sink::raw(tempfile::tempfile().unwrap());
        let mut progress = Progress::new(10);
        let journals = JournalRegistry::new();
        save_rgrp(&mut dev, &mut sink, &mut progress, &rgd, false, true, &journals).unwrap();
        sink.close().unwrap();
    }
}
