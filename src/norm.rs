use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::volume::VolumeSeries;

/// Volume series rescaled to a percentage of the track's own baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub track: String,
    pub time: Vec<f64>,
    /// `None` when the track has no usable baseline; every value is then undefined
    pub baseline: Option<f64>,
    pub values: Vec<Option<f64>>,
}

/// Mean of the defined volumes with Time <= `max_time`.
/// Undefined when no sample contributes.
pub fn baseline(series: &VolumeSeries, max_time: f64) -> Option<f64> {
    let (sum, count) = series
        .time
        .iter()
        .zip(&series.volume)
        .filter(|(t, _)| **t <= max_time)
        .filter_map(|(_, v)| *v)
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn normalize_track(series: &VolumeSeries, max_time: f64) -> NormalizedSeries {
    // Non-positive baselines would invert or blow up the percentages
    let baseline = baseline(series, max_time).filter(|b| b.is_finite() && *b > 0.0);

    let values = match baseline {
        Some(b) => series
            .volume
            .iter()
            .map(|v| v.map(|v| v / b * 100.0))
            .collect(),
        None => vec![None; series.volume.len()],
    };

    NormalizedSeries {
        track: series.track.clone(),
        time: series.time.clone(),
        baseline,
        values,
    }
}

pub fn normalize_group(series: &[VolumeSeries], config: &AnalysisConfig) -> Vec<NormalizedSeries> {
    series
        .par_iter()
        .map(|s| normalize_track(s, config.baseline_max_time))
        .collect()
}
