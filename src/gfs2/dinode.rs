//! The on-disk inode, `struct gfs2_dinode`, grounded on the field list used
//! by `di_save_len`/`save_inode_data` in `gfs2/edit/savemeta.c`
//! (`di_height`, `di_mode`, `di_flags`, `di_eattr`).

use super::be16;
use super::be32;
use super::be64;
use super::leaf;
use super::metatype;
use super::DINODE_HEADER_LEN;
use super::DirEntry;
use super::DinodeView;
use super::MetaHeader;
use crate::error::Error;
use crate::error::Result;

const OFF_MODE: usize = 40;
const OFF_FLAGS: usize = 128;
const OFF_HEIGHT: usize = 136;
const OFF_EATTR: usize = 160;

const DIRENT_HEADER_LEN: usize = 32;
const OFF_DE_ADDR: usize = 8;
const OFF_DE_REC_LEN: usize = 20;
const OFF_DE_NAME_LEN: usize = 22;

/// Parses the fixed portion of a dinode out of its block buffer.
pub fn parse(buf: &[u8], addr: u64) -> Result<DinodeView> {
    if buf.len() < DINODE_HEADER_LEN {
        return Err(Error::BadSuperblock(format!(
            "short dinode buffer for block {addr}"
        )));
    }
    let mh = MetaHeader::parse(buf)
        .ok_or_else(|| Error::BadSuperblock(format!("block {addr} is not metadata")))?;
    if mh.mh_type != metatype::DI {
        return Err(Error::BadSuperblock(format!(
            "block {addr} is not a dinode (type {})",
            mh.mh_type
        )));
    }
    Ok(DinodeView {
        addr,
        height: be16(buf, OFF_HEIGHT) as u32,
        mode: be32(buf, OFF_MODE),
        flags: be32(buf, OFF_FLAGS),
        eattr: be64(buf, OFF_EATTR),
    })
}

/// Parses a run of `gfs2_dirent` records starting at `off` within `buf`,
/// stopping at the end of the buffer. Entries with a zero address are
/// unused slots and are skipped.
fn parse_dirents(buf: &[u8], mut off: usize) -> Vec<DirEntry> {
    let mut out = Vec::new();
    while off + DIRENT_HEADER_LEN <= buf.len() {
        let rec_len = be16(buf, off + OFF_DE_REC_LEN) as usize;
        let name_len = be16(buf, off + OFF_DE_NAME_LEN) as usize;
        let de_addr = be64(buf, off + OFF_DE_ADDR);
        if rec_len == 0 {
            break;
        }
        if de_addr != 0 && name_len > 0 && off + DIRENT_HEADER_LEN + name_len <= buf.len() {
            let name = buf[off + DIRENT_HEADER_LEN..off + DIRENT_HEADER_LEN + name_len].to_vec();
            out.push(DirEntry { name, addr: de_addr });
        }
        off += rec_len;
    }
    out
}

/// Lists the children of a directory dinode.
///
/// Supports the two shapes real directories take: "stuffed" (dirents packed
/// directly after the dinode header, `height == 0`) and hashed (`EXHASH`,
/// where the pointer area is a hash table whose slots reference leaf
/// chains). Non-hashed directories with `height > 0` don't occur in this
/// filesystem's mainline format and aren't handled.
pub fn children<R: super::device::RawRead>(
    reader: &mut R,
    bsize: u32,
    dinode_buf: &[u8],
    dinode: &DinodeView,
) -> Result<Vec<DirEntry>> {
    if !dinode.is_exhash() {
        return Ok(parse_dirents(dinode_buf, DINODE_HEADER_LEN));
    }

    // The pointer area holds a (possibly multi-level) hash table; every
    // unique leaf address it references is the head of a leaf chain.
    let mut leaf_heads = Vec::new();
    let mut last = 0u64;
    let mut ptr_off = DINODE_HEADER_LEN;
    while ptr_off + 8 <= bsize as usize && ptr_off + 8 <= dinode_buf.len() {
        let p = be64(dinode_buf, ptr_off);
        if p != 0 && p != last {
            leaf_heads.push(p);
            last = p;
        }
        ptr_off += 8;
    }

    let mut out = Vec::new();
    let mut visited = std::collections::BTreeSet::new();
    for head in leaf_heads {
        let mut blk = head;
        let mut hops = 0u64;
        while blk != 0 && visited.insert(blk) && hops < reader.fssize() {
            let mut buf = vec![0u8; bsize as usize];
            if reader.pread_blocks(blk, 1, &mut buf).is_err() {
                break;
            }
            out.extend(parse_dirents(&buf, leaf::LEAF_HEADER_LEN));
            blk = leaf::next_ptr(&buf);
            hops += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dinode_buf(height: u16, mode: u32, flags: u32, eattr: u64) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        buf[0..4].copy_from_slice(&super::super::GFS2_MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&metatype::DI.to_be_bytes());
        buf[OFF_MODE..OFF_MODE + 4].copy_from_slice(&mode.to_be_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 4].copy_from_slice(&flags.to_be_bytes());
        buf[OFF_HEIGHT..OFF_HEIGHT + 2].copy_from_slice(&height.to_be_bytes());
        buf[OFF_EATTR..OFF_EATTR + 8].copy_from_slice(&eattr.to_be_bytes());
        buf
    }

    #[test]
    fn parses_directory_flags() {
        let buf = dinode_buf(0, libc::S_IFDIR as u32 | 0o755, super::super::GFS2_DIF_EXHASH, 0);
        let dn = parse(&buf, 7).unwrap();
        assert!(dn.is_dir());
        assert!(dn.is_exhash());
        assert_eq!(dn.addr, 7);
    }

    #[test]
    fn stuffed_dirents_roundtrip() {
        let mut buf = dinode_buf(0, libc::S_IFDIR as u32 | 0o755, 0, 0);
        write_dirent(&mut buf, DINODE_HEADER_LEN, b"jindex", 55);
        write_dirent(&mut buf, DINODE_HEADER_LEN + 40, b"x", 0); // terminator: rec_len 0
        let dn = parse(&buf, 3).unwrap();
        let entries = parse_dirents(&buf, DINODE_HEADER_LEN);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, b"jindex");
        assert_eq!(entries[0].addr, 55);
        assert!(!dn.is_exhash());
    }

    fn write_dirent(buf: &mut [u8], off: usize, name: &[u8], addr: u64) {
        if addr == 0 {
            return;
        }
        buf[off + OFF_DE_ADDR..off + OFF_DE_ADDR + 8].copy_from_slice(&addr.to_be_bytes());
        let rec_len = (DIRENT_HEADER_LEN + name.len()) as u16;
        buf[off + OFF_DE_REC_LEN..off + OFF_DE_REC_LEN + 2].copy_from_slice(&rec_len.to_be_bytes());
        buf[off + OFF_DE_NAME_LEN..off + OFF_DE_NAME_LEN + 2]
            .copy_from_slice(&(name.len() as u16).to_be_bytes());
        buf[off + DIRENT_HEADER_LEN..off + DIRENT_HEADER_LEN + name.len()].copy_from_slice(name);
    }
}
