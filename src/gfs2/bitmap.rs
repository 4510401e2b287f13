//! Resource-group bitmaps: 2 bits per block, packed 4-to-a-byte, encoding
//! `Free/Used/Dinode/Unlinked`. The first bitmap bytes live directly after
//! the resource group header's own fields in block 0 of the group; every
//! subsequent block in the group is a pure bitmap block starting right
//! after its metadata header.

use super::BlockState;
use super::RgrpDescriptor;
use super::META_HEADER_LEN;

/// Offset within the resource group's first block (the header block) at
/// which its portion of the bitmap begins.
pub const RGRP_HEADER_LEN: usize = 96;

/// Decodes the allocation state of every data block in `rgd`, given the raw
/// bytes of its full on-disk span (`rgd.length` bitmap blocks of `bsize`
/// each). The bitmap is packed 4 states per byte across the header block's
/// trailer and every subsequent bitmap block, but it describes the group's
/// `rgd.data_count` *data* blocks starting at `rgd.data_start`, not the
/// bitmap blocks themselves.
pub fn decode_states(buf: &[u8], rgd: &RgrpDescriptor, bsize: u32) -> Vec<(u64, BlockState)> {
    let bsize = bsize as usize;
    let mut states = Vec::with_capacity(rgd.data_count as usize);
    'blocks: for i in 0..rgd.length as usize {
        let base = i * bsize;
        if base + bsize > buf.len() {
            break;
        }
        let block = &buf[base..base + bsize];
        let start = if i == 0 { RGRP_HEADER_LEN } else { META_HEADER_LEN };
        for &byte in &block[start.min(block.len())..] {
            for shift in [6u8, 4, 2, 0] {
                if states.len() == rgd.data_count as usize {
                    break 'blocks;
                }
                states.push(BlockState::from_bits(byte >> shift));
            }
        }
    }
    states
        .into_iter()
        .enumerate()
        .map(|(i, s)| (rgd.data_start + i as u64, s))
        .collect()
}

/// Filters `decode_states` down to the addresses matching `state`.
pub fn scan(buf: &[u8], rgd: &RgrpDescriptor, bsize: u32, state: BlockState) -> Vec<u64> {
    decode_states(buf, rgd, bsize)
        .into_iter()
        .filter(|(_, s)| *s == state)
        .map(|(addr, _)| addr)
        .collect()
}
