//! Removal of time-overlapping clips.
//!
//! [`dedupe`] is greedy by score: walk the ranked list and keep a clip only if
//! none of its segments intersects a segment already kept. It favors the best
//! clips and is fast, but does not maximize total score or clip count.
//! [`dedupe_optimal`] solves weighted interval scheduling exactly over each
//! clip's hull `[start_time, end_time)`.

use serde::{Deserialize, Serialize};

use crate::types::ViralClip;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapStrategy {
    #[default]
    Greedy,
    Optimal,
}

impl std::str::FromStr for OverlapStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Ok(OverlapStrategy::Greedy),
            "optimal" => Ok(OverlapStrategy::Optimal),
            other => Err(format!("unknown overlap strategy '{other}' (expected greedy or optimal)")),
        }
    }
}

pub fn resolve_overlaps(ranked: Vec<ViralClip>, strategy: OverlapStrategy) -> Vec<ViralClip> {
    match strategy {
        OverlapStrategy::Greedy => dedupe(ranked),
        OverlapStrategy::Optimal => dedupe_optimal(ranked),
    }
}

/// Greedy selection over rank-sorted input. Output keeps input order.
pub fn dedupe(ranked: Vec<ViralClip>) -> Vec<ViralClip> {
    let mut accepted: Vec<ViralClip> = Vec::with_capacity(ranked.len());
    for clip in ranked {
        if accepted.iter().all(|kept| !kept.overlaps(&clip)) {
            accepted.push(clip);
        }
    }
    accepted
}

/// Maximum total-score subset of non-overlapping clip hulls. Output keeps input order.
pub fn dedupe_optimal(ranked: Vec<ViralClip>) -> Vec<ViralClip> {
    let n = ranked.len();
    if n < 2 {
        return ranked;
    }

    let mut by_end: Vec<usize> = (0..n).collect();
    by_end.sort_by(|&a, &b| {
        ranked[a]
            .end_time
            .total_cmp(&ranked[b].end_time)
            .then(ranked[a].start_time.total_cmp(&ranked[b].start_time))
    });
    let ends: Vec<f64> = by_end.iter().map(|&i| ranked[i].end_time).collect();

    // compatible[j]: how many clips (in end order) finish at or before clip j starts
    let compatible: Vec<usize> = by_end
        .iter()
        .enumerate()
        .map(|(j, &i)| ends[..j].partition_point(|&end| end <= ranked[i].start_time))
        .collect();

    let mut best = vec![0.0f64; n + 1];
    for j in 0..n {
        let take = ranked[by_end[j]].viral_score + best[compatible[j]];
        best[j + 1] = if take > best[j] { take } else { best[j] };
    }

    let mut keep = vec![false; n];
    let mut j = n;
    while j > 0 {
        let take = ranked[by_end[j - 1]].viral_score + best[compatible[j - 1]];
        if take > best[j - 1] {
            keep[by_end[j - 1]] = true;
            j = compatible[j - 1];
        } else {
            j -= 1;
        }
    }

    ranked
        .into_iter()
        .zip(keep)
        .filter_map(|(clip, kept)| kept.then_some(clip))
        .collect()
}
