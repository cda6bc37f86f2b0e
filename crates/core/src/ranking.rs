use crate::{
    options::{AnalyzeOptions, OutputPolicy},
    types::ViralClip,
};

/// Absorbs float noise in `end - start` so a clip of exactly the minimum length stays valid.
const DURATION_EPSILON: f64 = 1e-6;

/// Duration bounds are inclusive on both ends.
pub fn is_valid(clip: &ViralClip, options: &AnalyzeOptions) -> bool {
    let duration = clip.duration();
    clip.start_time >= 0.0
        && clip.end_time > clip.start_time
        && duration + DURATION_EPSILON >= options.min_clip_duration
        && duration - DURATION_EPSILON <= options.max_clip_duration
}

pub fn passes_score_threshold(clip: &ViralClip, options: &AnalyzeOptions) -> bool {
    options
        .min_viral_score
        .is_none_or(|min| clip.viral_score >= min)
}

/// Descending by score; equal scores keep their input order.
pub fn rank(mut clips: Vec<ViralClip>) -> Vec<ViralClip> {
    clips.sort_by(|a, b| b.viral_score.total_cmp(&a.viral_score));
    clips
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub candidates: usize,
    pub rejected_invalid: usize,
    pub rejected_score: usize,
}

pub fn filter_clips(clips: Vec<ViralClip>, options: &AnalyzeOptions) -> (Vec<ViralClip>, FilterStats) {
    let mut stats = FilterStats {
        candidates: clips.len(),
        ..Default::default()
    };

    let kept = clips
        .into_iter()
        .filter(|clip| {
            if !is_valid(clip, options) {
                stats.rejected_invalid += 1;
                false
            } else if !passes_score_threshold(clip, options) {
                stats.rejected_score += 1;
                false
            } else {
                true
            }
        })
        .collect();

    (kept, stats)
}

/// Cut a ranked, deduplicated list down according to `policy`. Output stays ranked.
pub fn apply_output_policy(ranked: Vec<ViralClip>, policy: OutputPolicy) -> Vec<ViralClip> {
    match policy {
        OutputPolicy::All => ranked,
        OutputPolicy::TargetCount(n) => ranked.into_iter().take(n).collect(),
        OutputPolicy::Tiered {
            high,
            medium,
            max_medium,
        } => {
            let (top, rest): (Vec<_>, Vec<_>) =
                ranked.into_iter().partition(|c| c.viral_score >= high);
            let middle = rest
                .into_iter()
                .filter(|c| c.viral_score >= medium)
                .take(max_medium);
            rank(top.into_iter().chain(middle).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ViralFactors;

    fn clip(start: f64, end: f64, score: f64) -> ViralClip {
        ViralClip {
            start_time: start,
            end_time: end,
            text: format!("{start}-{end}"),
            viral_score: score,
            factors: ViralFactors::new(),
            segments: Vec::new(),
            suggested_title: String::new(),
            hashtags: Vec::new(),
            reasoning: String::new(),
            hook_suggestion: None,
            is_reordered: false,
        }
    }

    #[test]
    fn min_duration_is_inclusive() {
        let options = AnalyzeOptions::default();
        assert!(is_valid(&clip(5.0, 20.0, 50.0), &options));
        assert!(!is_valid(&clip(5.0, 19.999, 50.0), &options));
        assert!(is_valid(&clip(0.3, 15.3, 50.0), &options));
    }

    #[test]
    fn max_duration_is_inclusive() {
        let options = AnalyzeOptions::default();
        assert!(is_valid(&clip(10.0, 100.0, 50.0), &options));
        assert!(!is_valid(&clip(10.0, 100.001, 50.0), &options));
    }

    #[test]
    fn negative_or_inverted_ranges_are_invalid() {
        let options = AnalyzeOptions::default();
        assert!(!is_valid(&clip(-5.0, 20.0, 50.0), &options));
        assert!(!is_valid(&clip(40.0, 20.0, 50.0), &options));
    }

    #[test]
    fn score_threshold_is_optional() {
        let mut options = AnalyzeOptions::default();
        assert!(!passes_score_threshold(&clip(0.0, 20.0, 49.0), &options));
        assert!(passes_score_threshold(&clip(0.0, 20.0, 50.0), &options));
        options.min_viral_score = None;
        assert!(passes_score_threshold(&clip(0.0, 20.0, 1.0), &options));
    }

    #[test]
    fn rank_is_stable_for_ties() {
        let ranked = rank(vec![
            clip(0.0, 20.0, 70.0),
            clip(30.0, 50.0, 90.0),
            clip(60.0, 80.0, 70.0),
        ]);
        let starts: Vec<_> = ranked.iter().map(|c| c.start_time).collect();
        assert_eq!(starts, [30.0, 0.0, 60.0]);
    }

    #[test]
    fn filter_reports_rejections() {
        let (kept, stats) = filter_clips(
            vec![clip(0.0, 5.0, 90.0), clip(0.0, 20.0, 10.0), clip(0.0, 20.0, 60.0)],
            &AnalyzeOptions::default(),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(
            stats,
            FilterStats {
                candidates: 3,
                rejected_invalid: 1,
                rejected_score: 1
            }
        );
    }

    #[test]
    fn target_count_truncates() {
        let ranked = rank(vec![clip(0.0, 20.0, 90.0), clip(30.0, 50.0, 80.0), clip(60.0, 80.0, 70.0)]);
        assert_eq!(apply_output_policy(ranked, OutputPolicy::TargetCount(2)).len(), 2);
    }

    #[test]
    fn tiered_keeps_all_high_and_caps_medium() {
        let ranked = rank(vec![
            clip(0.0, 20.0, 95.0),
            clip(30.0, 50.0, 72.0),
            clip(60.0, 80.0, 65.0),
            clip(90.0, 110.0, 60.0),
            clip(120.0, 140.0, 55.0),
            clip(150.0, 170.0, 20.0),
        ]);
        let out = apply_output_policy(
            ranked,
            OutputPolicy::Tiered {
                high: 70.0,
                medium: 50.0,
                max_medium: 2,
            },
        );
        let scores: Vec<_> = out.iter().map(|c| c.viral_score).collect();
        assert_eq!(scores, [95.0, 72.0, 65.0, 60.0]);
    }
}
