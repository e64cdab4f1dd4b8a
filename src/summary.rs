use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::norm::NormalizedSeries;

/// One retained track, reduced to its summary-window mean.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub genotype: String,
    pub track: String,
    pub mean: f64,
}

/// Per-track summary values of one genotype.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub values: Vec<f64>,
}

impl Group {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Mean of the defined values with Time in the closed window [low, high].
pub fn window_mean(series: &NormalizedSeries, low: f64, high: f64) -> Option<f64> {
    let (sum, count) = series
        .time
        .iter()
        .zip(&series.values)
        .filter(|(t, _)| **t >= low && **t <= high)
        .filter_map(|(_, v)| *v)
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));

    (count > 0).then(|| sum / count as f64)
}

/// Summarize every track of a genotype; tracks with nothing in the window are dropped.
pub fn summarize_group(
    genotype: &str,
    series: &[NormalizedSeries],
    config: &AnalysisConfig,
) -> Vec<TrackSummary> {
    series
        .par_iter()
        .filter_map(|s| {
            window_mean(s, config.window_low, config.window_high).map(|mean| TrackSummary {
                genotype: genotype.to_string(),
                track: s.track.clone(),
                mean,
            })
        })
        .collect()
}

/// Gather summary values per genotype in the given order. Genotypes without rows get
/// an empty group.
pub fn collect_groups(summaries: &[TrackSummary], genotypes: &[String]) -> Vec<Group> {
    genotypes
        .iter()
        .map(|g| {
            let values = summaries
                .iter()
                .filter(|s| &s.genotype == g)
                .map(|s| s.mean)
                .collect();
            Group::new(g.clone(), values)
        })
        .collect()
}

/// Genotype names in sorted order, deduplicated.
pub fn sorted_genotypes(summaries: &[TrackSummary]) -> Vec<String> {
    let mut names: Vec<String> = summaries.iter().map(|s| s.genotype.clone()).collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(track: &str, time: Vec<f64>, values: Vec<Option<f64>>) -> NormalizedSeries {
        NormalizedSeries {
            track: track.into(),
            time,
            baseline: Some(1.0),
            values,
        }
    }

    #[test]
    fn window_is_closed_and_skips_undefined() {
        let s = norm(
            "t",
            vec![499.0, 500.0, 550.0, 600.0, 601.0],
            vec![Some(1000.0), Some(90.0), None, Some(110.0), Some(1000.0)],
        );
        assert_eq!(window_mean(&s, 500.0, 600.0), Some(100.0));
    }

    #[test]
    fn track_without_window_samples_is_dropped() {
        let kept = norm("kept", vec![0.0, 550.0], vec![Some(100.0), Some(80.0)]);
        let outside = norm("outside", vec![0.0, 700.0], vec![Some(100.0), Some(80.0)]);
        let undefined = norm("undefined", vec![0.0, 550.0], vec![None, None]);

        let rows = summarize_group(
            "WT",
            &[kept, outside, undefined],
            &AnalysisConfig::default(),
        );
        assert_eq!(
            rows,
            vec![TrackSummary {
                genotype: "WT".into(),
                track: "kept".into(),
                mean: 80.0
            }]
        );
    }

    #[test]
    fn groups_follow_requested_order() {
        let rows = vec![
            TrackSummary { genotype: "b".into(), track: "1".into(), mean: 1.0 },
            TrackSummary { genotype: "a".into(), track: "2".into(), mean: 2.0 },
            TrackSummary { genotype: "b".into(), track: "3".into(), mean: 3.0 },
        ];
        let groups = collect_groups(&rows, &["b".to_string(), "a".to_string(), "c".to_string()]);
        assert_eq!(groups[0], Group::new("b", vec![1.0, 3.0]));
        assert_eq!(groups[1], Group::new("a", vec![2.0]));
        assert!(groups[2].values.is_empty());
        assert_eq!(sorted_genotypes(&rows), vec!["a", "b"]);
    }
}
