//! C3: reads a contiguous run of blocks and classifies every slot in one
//! shot, grounded on `block_is_a_*` + the range-read loops throughout
//! `gfs2/edit/savemeta.c`'s `save_indirect_blocks`/`save_leaf_chain`.

use log::warn;

use crate::block_typer;
use crate::block_typer::BlockKind;
use crate::gfs2::device::RawRead;
use crate::gfs2::DinodeView;
use crate::gfs2::GFS2_SB_ADDR;

/// A contiguous, classified run of blocks: one read, one classification
/// pass, entirely owned by the caller.
pub struct BlockRange {
    pub start: u64,
    pub len: u32,
    pub bsize: u32,
    pub buf: Vec<u8>,
    pub kinds: Vec<BlockKind>,
    /// Per-slot significant length; `0` means "do not archive this slot".
    pub lengths: Vec<usize>,
}

impl BlockRange {
    /// Byte slice of slot `i` in the range (the full block, regardless of
    /// its significant length).
    pub fn slot(&self, i: usize) -> &[u8] {
        let bsize = self.bsize as usize;
        &self.buf[i * bsize..(i + 1) * bsize]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Reads `[start, start+len)` and classifies every slot. `owner_is_system`
/// tells the classifier, per block address, whether that slot still belongs
/// to a system file and must be archived whole (a coalesced run may mix
/// system and non-system dinodes, so this is queried per slot rather than
/// once for the whole range); `dinode_for` supplies an already-parsed
/// [`DinodeView`] for any slot the caller knows is a dinode (avoids
/// re-parsing it here).
pub fn read_range<R: RawRead>(
    reader: &mut R,
    start: u64,
    len: u32,
    gfs1: bool,
    owner_is_system: impl Fn(u64) -> bool,
    dinode_for: impl Fn(u64) -> Option<DinodeView>,
) -> BlockRange {
    let bsize = reader.bsize();
    let fssize = reader.fssize();
    let empty = || BlockRange {
        start,
        len: 0,
        bsize,
        buf: Vec::new(),
        kinds: Vec::new(),
        lengths: Vec::new(),
    };

    if len == 0 {
        return empty();
    }
    if start < GFS2_SB_ADDR || start + len as u64 > fssize {
        warn!("read_range: [{start}, {}) is outside [{GFS2_SB_ADDR}, {fssize})", start + len as u64);
        return empty();
    }

    let mut buf = vec![0u8; len as usize * bsize as usize];
    if let Err(err) = reader.pread_blocks(start, len, &mut buf) {
        warn!("read_range: short read at block {start} (len {len}): {err}");
        return empty();
    }

    let mut kinds = Vec::with_capacity(len as usize);
    let mut lengths = Vec::with_capacity(len as usize);
    for i in 0..len as usize {
        let addr = start + i as u64;
        let slot = &buf[i * bsize as usize..(i + 1) * bsize as usize];
        let dinode = dinode_for(addr);
        let owner = owner_is_system(addr);
        let ctx = block_typer::ClassifyContext {
            bsize,
            gfs1,
            is_system: owner,
            is_journal_owned: owner,
        };
        let (kind, sig_len) = block_typer::classify(slot, ctx, dinode.as_ref());
        let sig_len = if kind == BlockKind::Unknown {
            block_typer::unknown_significant_length(bsize, owner)
        } else {
            sig_len
        };
        kinds.push(kind);
        lengths.push(sig_len);
    }

    BlockRange {
        start,
        len,
        bsize,
        buf,
        kinds,
        lengths,
    }
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
    }

    impl RawRead for FakeDevice {
        fn bsize(&self) -> u32 {
            self.bsize
        }
        fn fssize(&self) -> u64 {
            self.fssize
        }
        fn pread_blocks(&mut self, start: u64, len: u32, buf: &mut [u8]) -> crate::error::Result<()> {
            let bsize = self.bsize as usize;
            let off = start as usize * bsize;
            let n = len as usize * bsize;
            buf[..n].copy_from_slice(&self.data[off..off + n]);
            Ok(())
        }
    }

    fn device_with_rgrp_at(addr: u64, bsize: u32, fssize: u64) -> FakeDevice {
        let mut data = vec![0u8; fssize as usize * bsize as usize];
        let off = addr as usize * bsize as usize;
        data[off..off + 4].copy_from_slice(&GFS2_MAGIC.to_be_bytes());
        data[off + 4..off + 8].copy_from_slice(&metatype::RG.to_be_bytes());
        FakeDevice { bsize, fssize, data }
    }

    #[test]
    fn classifies_a_run_of_blocks() {
        let mut dev = device_with_rgrp_at(200, 512, 1000);
        let range = read_range(&mut dev, 200, 1, false, |_| false, |_| None);
        assert_eq!(range.len, 1);
        assert_eq!(range.kinds[0], BlockKind::Rgrp);
        assert_eq!(range.lengths[0], 512);
    }

    #[test]
    fn out_of_range_start_returns_empty() {
        let mut dev = device_with_rgrp_at(200, 512, 1000);
        let range = read_range(&mut dev, 2000, 1, false, |_| false, |_| None);
        assert!(range.is_empty());
    }

    #[test]
    fn unknown_block_owned_by_user_has_zero_length() {
        let mut dev = FakeDevice {
            bsize: 512,
            fssize: 1000,
            data: vec![0u8; 1000 * 512],
        };
        let range = read_range(&mut dev, 200, 1, false, |_| false, |_| None);
        assert_eq!(range.kinds[0], BlockKind::Unknown);
        assert_eq!(range.lengths[0], 0);
    }

    #[test]
    fn unknown_block_owned_by_system_is_archived_whole() {
        let mut dev = FakeDevice {
            bsize: 512,
            fssize: 1000,
            data: vec![0u8; 1000 * 512],
        };
        let range = read_range(&mut dev, 200, 1, false, |_| true, |_| None);
        assert_eq!(range.lengths[0], 512);
    }
}
