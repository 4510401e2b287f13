//! C2: tracks which block addresses belong to the journal/per_node system
//! files, grounded on `per_node_hash`/`journal_blocks`-style bookkeeping in
//! `gfs2/edit/savemeta.c`. Kept as a small owned value rather than process
//! globals, per the design's `SaveContext` note.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::gfs2::DinodeView;
use crate::gfs2::DirectoryIterator;
use crate::gfs2::InodeReader;

/// One discovered journal: its head block address and, for the legacy
/// variant, the segment count used to bound the whole-journal-range archive
/// in the Save Orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct Journal {
    pub addr: u64,
    /// Number of 16-block segments the legacy variant journal spans. Zero
    /// for the modern variant, where journals aren't walked as flat ranges.
    pub segments: u32,
}

/// Membership bookkeeping for the handful of well-known system files plus
/// whatever this filesystem's journals and `per_node` children turn out to
/// be, queried by address during the save walk.
#[derive(Debug, Default)]
pub struct JournalRegistry {
    journals: Vec<Journal>,
    journal_addrs: BTreeSet<u64>,
    per_node_children: BTreeSet<u64>,
    /// The handful of other well-known system-file addresses
    /// (jindex/inum/statfs/quota/rindex, and `per_node` itself), registered
    /// directly by the save orchestrator since they come straight off the
    /// superblock rather than from a directory walk.
    system_addrs: BTreeSet<u64>,
}

impl JournalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerates `jindex`'s directory entries in order, recording each
    /// journal's head block address. `segment_len` is the legacy variant's
    /// per-journal size in 16-block segments, read from the journal's own
    /// dinode by the caller; `None` means "don't know / modern variant" and
    /// is recorded as zero segments.
    pub fn discover_journals<R: InodeReader + DirectoryIterator>(
        &mut self,
        reader: &mut R,
        jindex: &DinodeView,
        segment_len: impl Fn(u64) -> Option<u32>,
    ) -> Result<()> {
        for entry in reader.children(jindex)? {
            let segments = segment_len(entry.addr).unwrap_or(0);
            self.journal_addrs.insert(entry.addr);
            self.journals.push(Journal {
                addr: entry.addr,
                segments,
            });
        }
        Ok(())
    }

    /// Enumerates `per_node`'s child dinodes into the membership set.
    pub fn discover_per_node<R: DirectoryIterator>(
        &mut self,
        reader: &mut R,
        per_node: &DinodeView,
    ) -> Result<()> {
        for entry in reader.children(per_node)? {
            self.per_node_children.insert(entry.addr);
        }
        Ok(())
    }

    pub fn journals(&self) -> &[Journal] {
        &self.journals
    }

    pub fn is_journal(&self, addr: u64) -> bool {
        self.journal_addrs.contains(&addr)
    }

    pub fn is_per_node_child(&self, addr: u64) -> bool {
        self.per_node_children.contains(&addr)
    }

    /// Records one of the well-known system-file addresses
    /// (jindex/inum/statfs/quota/rindex/per_node) the save orchestrator
    /// reads directly off the superblock. A zero address (not present on
    /// this filesystem variant) is ignored.
    pub fn register_system_file(&mut self, addr: u64) {
        if addr != 0 {
            self.system_addrs.insert(addr);
        }
    }

    /// Whether `addr` belongs to any of the tracked system files: a journal
    /// head, a `per_node` child, or one of the explicitly registered
    /// jindex/inum/statfs/quota/rindex/per_node addresses — matching
    /// `block_is_systemfile` in the original implementation.
    pub fn is_system(&self, addr: u64) -> bool {
        self.is_journal(addr) || self.is_per_node_child(addr) || self.system_addrs.contains(&addr)
    }
}
