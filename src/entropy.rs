//! Shannon entropy over a page's byte histogram.
//!
//! Used to cheaply reject pages of near-uniform content as gap-filling
//! candidates — it is never used to reject a magic-matched page.

/// A page with every byte value identical has zero entropy.
pub const NEAR_EMPTY_THRESHOLD: f64 = 0.35;

/// A page below this entropy is a weak data candidate.
pub const WEAK_DATA_THRESHOLD: f64 = 1.0;

/// Shannon entropy (natural log, i.e. nats) of a page's byte distribution.
///
/// `H = -sum(p_i * ln(p_i))` for `p_i` the empirical frequency of each
/// distinct byte value in `page`.
pub fn entropy(page: &[u8]) -> f64 {
    if page.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u32; 256];
    for &b in page {
        histogram[b as usize] += 1;
    }

    let total = page.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.ln()
        })
        .sum()
}

/// `true` if the page's entropy is low enough to be considered near-empty
/// and thus a poor gap-filling candidate.
pub fn is_near_empty(page: &[u8]) -> bool {
    entropy(page) < NEAR_EMPTY_THRESHOLD
}

/// `true` if the page's entropy is low enough to be a weak data candidate.
pub fn is_weak_candidate(page: &[u8]) -> bool {
    entropy(page) < WEAK_DATA_THRESHOLD
}
