use crate::models::{Evaluated, RankedEntry};

/// Orders evaluated submissions by score, highest first, and numbers them
/// 1..=N. Equal scores keep their input order.
pub fn rank(evaluated: Vec<Evaluated>) -> Vec<RankedEntry> {
    let mut evaluated = evaluated;
    // sort_by is stable
    evaluated.sort_by(|a, b| b.result.score.total_cmp(&a.result.score));

    evaluated
        .into_iter()
        .zip(1u32..)
        .map(|(item, rank)| RankedEntry {
            rank,
            submission: item.submission,
            result: item.result,
        })
        .collect()
}

pub fn top(ranked: &[RankedEntry], n: usize) -> &[RankedEntry] {
    &ranked[..ranked.len().min(n)]
}
