//! A rate-limited progress printer, grounded on `warm_fuzzy_stuff` in
//! `gfs2/edit/savemeta.c`: at most one line per wall-clock second, plus one
//! forced line at completion.

use std::time::Instant;

/// Tracks processed/archived block counts and throttles stderr output to at
/// most once per second.
pub struct Progress {
    processed: u64,
    archived: u64,
    total: u64,
    last_print: Option<Instant>,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            processed: 0,
            archived: 0,
            total,
            last_print: None,
        }
    }

    pub fn record(&mut self, archived: bool) {
        self.processed += 1;
        if archived {
            self.archived += 1;
        }
        if self
            .last_print
            .map(|t| t.elapsed().as_secs() >= 1)
            .unwrap_or(true)
        {
            self.print();
        }
    }

    /// Forces a line out regardless of the one-second throttle; call once
    /// after the walk completes.
    pub fn finish(&mut self) {
        self.print();
    }

    fn print(&mut self) {
        let pct = if self.total > 0 {
            self.processed as f64 / self.total as f64 * 100.0
        } else {
            100.0
        };
        eprint!(
            "\r{:.1}% ({} of {} blocks, {} archived)   ",
            pct, self.processed, self.total, self.archived
        );
        self.last_print = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_processed_and_archived_counts() {
        let mut p = Progress::new(10);
        p.record(true);
        p.record(false);
        assert_eq!(p.processed, 2);
        assert_eq!(p.archived, 1);
    }
}
