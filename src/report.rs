//! Structured, per-archive recovery reporting: a proper record of what
//! happened during reassembly (member count, page counts, gaps,
//! diagnostics) and a one-line human-readable summary of it.

use crate::pipeline::Diagnostic;
use crate::reassemble::Gap;

/// A complete account of one archive's reconstruction.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Members found in the archive's (re-parsed, authoritative) central
    /// directory.
    pub member_count: usize,
    /// Pages recovered as part of the central directory run (pass 1).
    pub cd_page_count: usize,
    /// Pages whose local file header was placed unambiguously (pass 2).
    pub lfh_placed_count: usize,
    /// Total pages in the archive's reconstructed page array.
    pub page_count: usize,
    /// Remaining gaps after both passes and gap-filling, ascending by
    /// length.
    pub gaps: Vec<Gap>,
    /// Everything non-fatal that happened along the way.
    pub diagnostics: Vec<Diagnostic>,
    /// MD5 fingerprint used to name the output file.
    pub fingerprint: String,
}

impl RecoveryReport {
    /// Percentage of the archive's pages that were filled in, `0.0..=100.0`.
    /// An archive with a zero-length page array (shouldn't happen for an
    /// accepted EOCD, but guarded here) reports full recovery.
    pub fn recovery_percentage(&self) -> f64 {
        if self.page_count == 0 {
            return 100.0;
        }
        let present = self.page_count - self.gaps.iter().map(|g| g.length).sum::<usize>();
        100.0 * present as f64 / self.page_count as f64
    }

    /// `true` if at least one slot in the reconstructed archive is absent —
    /// not a failure, just a note that the render is partial.
    pub fn is_partial(&self) -> bool {
        !self.gaps.is_empty()
    }

    /// One human-readable summary line, logged by the CLI at `info!` after
    /// each archive is rendered.
    pub fn summary(&self) -> String {
        format!(
            "recovered_{}.zip: {} member(s), {:.1}% recovered ({} gap(s)), {} diagnostic(s)",
            self.fingerprint,
            self.member_count,
            self.recovery_percentage(),
            self.gaps.len(),
            self.diagnostics.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(page_count: usize, gaps: Vec<Gap>) -> RecoveryReport {
        RecoveryReport {
            member_count: 4,
            cd_page_count: 1,
            lfh_placed_count: 3,
            page_count,
            gaps,
            diagnostics: Vec::new(),
            fingerprint: "deadbeef".into(),
        }
    }

    #[test]
    fn full_recovery_has_no_gaps() {
        let r = report(10, Vec::new());
        assert_eq!(r.recovery_percentage(), 100.0);
        assert!(!r.is_partial());
    }

    #[test]
    fn partial_recovery_percentage() {
        let r = report(4, vec![Gap { start_index: 2, length: 1 }]);
        assert_eq!(r.recovery_percentage(), 75.0);
        assert!(r.is_partial());
    }

    #[test]
    fn summary_mentions_fingerprint_and_member_count() {
        let r = report(4, Vec::new());
        let s = r.summary();
        assert!(s.contains("deadbeef"));
        assert!(s.contains('4'));
    }
}
