use std::f64::consts::PI;

use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::error::{Notice, NoticeKind};
use crate::tables::GroupTables;

/// Derived per-track volume; `None` marks an undefined sample.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSeries {
    pub track: String,
    pub time: Vec<f64>,
    pub volume: Vec<Option<f64>>,
}

/// Volume of a sample from its area and length: pi * area^2 / (4 * length).
/// Undefined unless both inputs are present and length is positive.
pub fn volume_at(area: Option<f64>, length: Option<f64>) -> Option<f64> {
    match (area, length) {
        (Some(a), Some(l)) if l > 0.0 => Some(PI * a * a / (4.0 * l)),
        _ => None,
    }
}

/// A sample is kept unless its fit value is strictly below the threshold.
/// An undefined fit value does not discard the sample.
pub fn passes_fit(fit: Option<f64>, threshold: f64) -> bool {
    !matches!(fit, Some(f) if f < threshold)
}

pub fn derive_track(
    track: &str,
    time: &[f64],
    area: &[Option<f64>],
    length: Option<&[Option<f64>]>,
    fit: Option<&[Option<f64>]>,
    fit_threshold: f64,
) -> VolumeSeries {
    let volume = (0..time.len())
        .map(|i| {
            let a = area.get(i).copied().flatten();
            let l = length.and_then(|col| col.get(i).copied().flatten());
            let f = fit.and_then(|col| col.get(i).copied().flatten());
            if passes_fit(f, fit_threshold) {
                volume_at(a, l)
            } else {
                None
            }
        })
        .collect();

    VolumeSeries {
        track: track.to_string(),
        time: time.to_vec(),
        volume,
    }
}

/// Derive the volume series of every track in a genotype's area table.
pub fn derive_group(tables: &GroupTables, config: &AnalysisConfig) -> (Vec<VolumeSeries>, Vec<Notice>) {
    let notices = tables
        .area
        .tracks
        .iter()
        .filter(|track| tables.length.column(track).is_none())
        .map(|track| {
            Notice::new(
                NoticeKind::MissingTrack,
                format!(
                    "{}: track '{}' has no length column; its volume is undefined",
                    tables.genotype, track
                ),
            )
        })
        .collect();

    let series = tables
        .area
        .tracks
        .par_iter()
        .filter_map(|track| {
            let area = tables.area.column(track)?;
            Some(derive_track(
                track,
                &tables.area.time,
                area,
                tables.length.column(track),
                tables.fit.column(track),
                config.fit_threshold,
            ))
        })
        .collect();

    (series, notices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::MetricTable;

    #[test]
    fn volume_uses_same_sample_length() {
        let series = derive_track(
            "t1",
            &[0.0, 1.0],
            &[Some(10.0), Some(20.0)],
            Some(&[Some(5.0), Some(5.0)][..]),
            Some(&[Some(1.0), Some(1.0)][..]),
            0.9,
        );
        let v: Vec<f64> = series.volume.iter().map(|v| v.unwrap()).collect();
        assert!((v[0] - PI * 100.0 / 20.0).abs() < 1e-12);
        assert!((v[1] - PI * 400.0 / 20.0).abs() < 1e-12);
        assert!((v[0] - 15.70796).abs() < 1e-4);
        assert!((v[1] - 62.83185).abs() < 1e-4);
    }

    #[test]
    fn low_fit_sample_is_undefined() {
        let series = derive_track(
            "t1",
            &[0.0, 1.0],
            &[Some(10.0), Some(10.0)],
            Some(&[Some(5.0), Some(5.0)][..]),
            Some(&[Some(0.5), Some(0.9)][..]),
            0.9,
        );
        assert_eq!(series.volume[0], None);
        assert!(series.volume[1].is_some());
    }

    #[test]
    fn non_positive_or_missing_length_is_undefined() {
        assert_eq!(volume_at(Some(3.0), Some(0.0)), None);
        assert_eq!(volume_at(Some(3.0), Some(-1.0)), None);
        assert_eq!(volume_at(Some(3.0), None), None);
        assert_eq!(volume_at(None, Some(2.0)), None);
    }

    #[test]
    fn undefined_fit_keeps_sample() {
        assert!(passes_fit(None, 0.9));
        assert!(passes_fit(Some(0.9), 0.9));
        assert!(!passes_fit(Some(0.899), 0.9));
    }

    #[test]
    fn track_without_length_column_is_reported() {
        let mut area = MetricTable::new(vec![0.0, 1.0]);
        area.insert_track("a", vec![Some(1.0), Some(2.0)]);
        area.insert_track("b", vec![Some(1.0), Some(2.0)]);
        let mut length = MetricTable::new(vec![0.0, 1.0]);
        length.insert_track("a", vec![Some(1.0), Some(1.0)]);
        let fit = MetricTable::new(vec![0.0, 1.0]);
        let tables = GroupTables {
            genotype: "WT".into(),
            area,
            length,
            fit,
        };

        let (series, notices) = derive_group(&tables, &AnalysisConfig::default());
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].track, "a");
        assert!(series[0].volume.iter().all(|v| v.is_some()));
        assert!(series[1].volume.iter().all(|v| v.is_none()));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::MissingTrack);
    }
}
