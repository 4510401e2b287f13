//! The concrete, device-backed implementation of every external
//! collaborator trait the save/restore pipeline consumes. This is the
//! `SaveContext`-style value (design note in the spec) that replaces what
//! would otherwise be global state: one `Device` owns the open file
//! descriptor, the parsed superblock, the journal/per-node discovery
//! results, and every read against the underlying block device or archive
//! target goes through it.

use std::fs::File;
use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;
use std::path::Path;

use super::dinode;
use super::rindex;
use super::superblock::Superblock;
use super::superblock::SB_RECORD_LEN;
use super::BitmapScanner;
use super::BlockState;
use super::DinodeView;
use super::DirEntry;
use super::DirectoryIterator;
use super::InodeReader;
use super::RgrpDescriptor;
use super::RgrpIndex;
use super::SuperblockSource;
use super::GFS2_BASIC_BLOCK;
use super::GFS2_SB_ADDR;
use crate::error::Error;
use crate::error::Result;

/// A minimal positioned-read capability, used so traversal code
/// (`dinode::children`) can be written against a trait instead of the
/// concrete `Device`.
pub trait RawRead {
    fn bsize(&self) -> u32;
    fn fssize(&self) -> u64;
    fn pread_blocks(&mut self, start: u64, len: u32, buf: &mut [u8]) -> Result<()>;
}

/// An opened filesystem image plus everything discovered about it: the
/// superblock, and the well-known system-file addresses hanging off its
/// master directory.
pub struct Device {
    file: File,
    sb: Superblock,
    master_dir_addr: u64,
    jindex_addr: u64,
    per_node_addr: u64,
    rindex_addr: u64,
    inum_addr: u64,
    statfs_addr: u64,
    quota_addr: u64,
    fssize: u64,
}

impl Device {
    /// Opens `path` for save. The device must already hold a valid
    /// superblock; restore targets use [`RestoreTarget`] instead, since a
    /// blank destination has none yet.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: File) -> Result<Self> {
        let mut raw = vec![0u8; SB_RECORD_LEN];
        let sb_off = GFS2_SB_ADDR * GFS2_BASIC_BLOCK;
        file.read_exact_at(&mut raw, sb_off)?;
        let sb = Superblock::parse(&raw)?;

        let device_bytes = crate::disk::get_size(&file)?;
        let fssize = device_bytes / sb.bsize as u64;

        let mut dev = Self {
            file,
            master_dir_addr: sb.master_dir_addr,
            jindex_addr: 0,
            per_node_addr: 0,
            rindex_addr: 0,
            inum_addr: 0,
            statfs_addr: 0,
            quota_addr: 0,
            fssize,
            sb,
        };
        dev.discover_system_files()?;
        Ok(dev)
    }

    fn discover_system_files(&mut self) -> Result<()> {
        let master_addr = self.master_dir_addr;
        if master_addr == 0 {
            return Ok(());
        }
        let master = self.read_inode(master_addr)?;
        for entry in self.children(&master)? {
            match entry.name.as_slice() {
                b"jindex" => self.jindex_addr = entry.addr,
                b"per_node" => self.per_node_addr = entry.addr,
                b"rindex" => self.rindex_addr = entry.addr,
                b"inum" => self.inum_addr = entry.addr,
                b"statfs" => self.statfs_addr = entry.addr,
                b"quota" => self.quota_addr = entry.addr,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn gfs1(&self) -> bool {
        self.sb.gfs1
    }

    /// Reads `buf.len()` raw bytes starting at block `addr`, without any
    /// classification. Used to relocate the superblock on restore.
    pub fn pread_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let off = addr * self.sb.bsize as u64;
        self.file.read_exact_at(buf, off)?;
        Ok(())
    }

    /// Reads the whole contents of a flat (non-directory) system file, by
    /// walking its indirect-pointer tree if any and concatenating every
    /// data block in logical order. Good enough for `rindex`, which is a
    /// simple packed array of fixed-length records.
    pub fn read_flat_file(&self, dinode_buf: &[u8], dinode: &DinodeView) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.collect_data(dinode_buf, dinode.height, &mut out)?;
        Ok(out)
    }

    fn collect_data(&self, buf: &[u8], height: u32, out: &mut Vec<u8>) -> Result<()> {
        if height == 0 {
            out.extend_from_slice(&buf[super::DINODE_HEADER_LEN..]);
            return Ok(());
        }
        let ptr_area = &buf[super::DINODE_HEADER_LEN..];
        self.walk_pointers(ptr_area, height, out)
    }

    fn walk_pointers(&self, ptr_area: &[u8], level: u32, out: &mut Vec<u8>) -> Result<()> {
        let bsize = self.sb.bsize as usize;
        for chunk in ptr_area.chunks_exact(8) {
            let p = u64::from_be_bytes(chunk.try_into().unwrap());
            if p == 0 {
                continue;
            }
            let mut child = vec![0u8; bsize];
            if self.pread_raw(p, &mut child).is_err() {
                continue;
            }
            if level == 1 {
                out.extend_from_slice(&child[super::META_HEADER_LEN..]);
            } else {
                self.walk_pointers(&child[super::META_HEADER_LEN..], level - 1, out)?;
            }
        }
        Ok(())
    }
}

/// A restore destination: a raw file or block device that does not yet
/// (necessarily) hold valid filesystem metadata, so unlike [`Device`] it
/// never tries to parse a superblock on open. `fssize` is derived from the
/// device's byte size once the restored archive's `bsize` is known.
pub struct RestoreTarget {
    file: File,
    byte_size: u64,
}

impl RestoreTarget {
    pub fn open_rw(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let byte_size = crate::disk::get_size(&file)?;
        Ok(Self { file, byte_size })
    }

    pub fn fssize(&self, bsize: u32) -> u64 {
        self.byte_size / bsize as u64
    }

    pub fn pwrite_block(&self, addr: u64, bsize: u32, buf: &[u8]) -> Result<()> {
        let off = addr * bsize as u64;
        self.file.write_all_at(buf, off)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

impl RawRead for Device {
    fn bsize(&self) -> u32 {
        self.sb.bsize
    }

    fn fssize(&self) -> u64 {
        self.fssize
    }

    fn pread_blocks(&mut self, start: u64, len: u32, buf: &mut [u8]) -> Result<()> {
        let off = start * self.sb.bsize as u64;
        self.file.read_exact_at(&mut buf[..len as usize * self.sb.bsize as usize], off)?;
        Ok(())
    }
}

impl SuperblockSource for Device {
    fn bsize(&self) -> u32 {
        self.sb.bsize
    }

    fn fssize(&self) -> u64 {
        self.fssize
    }

    fn jindex_addr(&self) -> u64 {
        self.jindex_addr
    }

    fn per_node_addr(&self) -> u64 {
        self.per_node_addr
    }

    fn rindex_addr(&self) -> u64 {
        self.rindex_addr
    }

    fn inum_addr(&self) -> u64 {
        self.inum_addr
    }

    fn statfs_addr(&self) -> u64 {
        self.statfs_addr
    }

    fn quota_addr(&self) -> u64 {
        self.quota_addr
    }
}

impl InodeReader for Device {
    fn read_inode(&mut self, addr: u64) -> Result<DinodeView> {
        let bsize = self.sb.bsize as usize;
        let mut buf = vec![0u8; bsize];
        self.pread_raw(addr, &mut buf)?;
        dinode::parse(&buf, addr)
    }
}

impl DirectoryIterator for Device {
    fn children(&mut self, dir: &DinodeView) -> Result<Vec<DirEntry>> {
        let bsize = self.sb.bsize;
        let mut buf = vec![0u8; bsize as usize];
        self.pread_raw(dir.addr, &mut buf)?;
        dinode::children(self, bsize, &buf, dir)
    }
}

impl RgrpIndex for Device {
    fn resource_groups(&mut self) -> Result<Vec<RgrpDescriptor>> {
        if self.rindex_addr == 0 {
            return Ok(Vec::new());
        }
        let addr = self.rindex_addr;
        let dinode = self.read_inode(addr)?;
        let bsize = self.sb.bsize as usize;
        let mut buf = vec![0u8; bsize];
        self.pread_raw(addr, &mut buf)?;
        let data = self.read_flat_file(&buf, &dinode)?;
        Ok(rindex::parse_all(&data))
    }
}

impl BitmapScanner for Device {
    fn scan(&mut self, rgd: &RgrpDescriptor, state: BlockState) -> Result<Vec<u64>> {
        let bsize = self.sb.bsize;
        let mut buf = vec![0u8; rgd.length as usize * bsize as usize];
        self.pread_blocks(rgd.addr, rgd.length, &mut buf)?;
        Ok(super::bitmap::scan(&buf, rgd, bsize, state))
    }
}
