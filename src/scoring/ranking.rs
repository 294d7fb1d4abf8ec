//! First-to-finish ranking.

use std::collections::HashSet;

use crate::models::Submission;

/// Rank-based score. The rank is the number of distinct other members whose
/// submission was created strictly before the current one; ranks beyond the
/// score array earn its last element.
pub fn score(siblings: &[Submission], current: &Submission, scores: &[u32]) -> f64 {
    let rank = siblings
        .iter()
        .filter(|sibling| {
            sibling.member_id != current.member_id && sibling.created < current.created
        })
        .map(|sibling| sibling.member_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let points = scores.get(rank).or_else(|| scores.last()).copied();
    f64::from(points.unwrap_or(0))
}
