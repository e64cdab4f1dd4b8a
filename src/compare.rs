use std::error::Error;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::config::Capabilities;
use crate::error::{AppError, Notice, NoticeKind};
use crate::hypothesis::mann_whitney_u;
use crate::multitest::holm;
use crate::summary::{collect_groups, sorted_genotypes, TrackSummary};
use crate::tables;

pub const REFERENCE_HEADER: [&str; 9] = [
    "Genotype",
    "n_ref",
    "n_group",
    "U",
    "rank_biserial",
    "p_uncorrected",
    "p_adj",
    "significant",
    "note",
];

/// One group compared against the reference group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceComparison {
    #[serde(rename = "Genotype")]
    pub genotype: String,
    pub n_ref: usize,
    pub n_group: usize,
    #[serde(rename = "U")]
    pub u: Option<f64>,
    pub rank_biserial: Option<f64>,
    pub p_uncorrected: Option<f64>,
    pub p_adj: Option<f64>,
    pub significant: bool,
    pub note: String,
}

/// r = 1 - 2U / (n_ref * n_group), with U computed for the reference sample
pub fn rank_biserial(u: f64, n_ref: usize, n_group: usize) -> f64 {
    1.0 - 2.0 * u / (n_ref as f64 * n_group as f64)
}

/// Mann-Whitney U of every other genotype against `reference`, with one Holm
/// correction across the comparisons that could be computed.
pub fn compare_to_reference(
    summaries: &[TrackSummary],
    reference: &str,
    caps: Capabilities,
    alpha: f64,
) -> Result<(Vec<ReferenceComparison>, Vec<Notice>), AppError> {
    let genotypes = sorted_genotypes(summaries);
    if !genotypes.iter().any(|g| g == reference) {
        return Err(AppError::MissingReference(reference.to_string()));
    }

    let groups = collect_groups(summaries, &genotypes);
    let ref_values: &[f64] = groups
        .iter()
        .find(|g| g.name == reference)
        .map(|g| g.values.as_slice())
        .unwrap_or(&[]);
    let n_ref = ref_values.len();

    let mut rows = Vec::new();
    let mut notices = Vec::new();
    for group in groups.iter().filter(|g| g.name != reference) {
        let n_group = group.len();
        if n_ref < 2 || n_group < 2 {
            notices.push(Notice::new(
                NoticeKind::InsufficientSample,
                format!(
                    "{} vs {}: n_ref = {}, n_group = {}; comparison skipped",
                    group.name, reference, n_ref, n_group
                ),
            ));
            rows.push(ReferenceComparison {
                genotype: group.name.clone(),
                n_ref,
                n_group,
                u: None,
                rank_biserial: None,
                p_uncorrected: None,
                p_adj: None,
                significant: false,
                note: "insufficient_n".to_string(),
            });
            continue;
        }

        let result = mann_whitney_u(ref_values, &group.values);
        rows.push(ReferenceComparison {
            genotype: group.name.clone(),
            n_ref,
            n_group,
            u: Some(result.statistic),
            rank_biserial: Some(rank_biserial(result.statistic, n_ref, n_group)),
            p_uncorrected: Some(result.p_value),
            p_adj: None,
            significant: false,
            note: String::new(),
        });
    }

    let tested: Vec<usize> = (0..rows.len())
        .filter(|&i| rows[i].p_uncorrected.is_some())
        .collect();
    if caps.correction {
        let raw: Vec<f64> = tested
            .iter()
            .filter_map(|&i| rows[i].p_uncorrected)
            .collect();
        for (&i, adj) in tested.iter().zip(holm(&raw)) {
            rows[i].p_adj = adj;
            rows[i].significant = adj.map_or(false, |p| p < alpha);
        }
    } else if !tested.is_empty() {
        notices.push(Notice::new(
            NoticeKind::MissingCapability,
            "p-value correction not available; reference comparisons carry no adjusted p-values",
        ));
    }

    Ok((rows, notices))
}

pub fn reference_output_path(output_dir: &Path, reference: &str) -> std::path::PathBuf {
    output_dir.join(format!("pairwise_{}_results.csv", reference))
}

/// Write the reference comparison table and report it.
pub fn write_reference_results(
    rows: &[ReferenceComparison],
    output_dir: &Path,
    reference: &str,
    logger: &mut crate::Logger,
) -> Result<(), Box<dyn Error>> {
    let path = reference_output_path(output_dir, reference);
    tables::write_records(&path, &REFERENCE_HEADER, rows)?;

    println!("[Reference comparison]");
    for row in rows {
        match (row.u, row.p_uncorrected) {
            (Some(u), Some(p)) => println!(
                "    {} vs {}: U={:.1}, r={:.3}, p={:.4}, p_adj={}, significant={}",
                row.genotype,
                reference,
                u,
                row.rank_biserial.unwrap_or(f64::NAN),
                p,
                row.p_adj.map_or("NA".to_string(), |p| format!("{:.4}", p)),
                row.significant
            ),
            _ => println!("    {} vs {}: {}", row.genotype, reference, row.note),
        }
    }
    println!("    Output: {}", path.display());
    println!();

    logger.log(&format!("Reference comparison written to {}", path.display()))?;
    Ok(())
}

/// Standalone reference comparison over a previously written per-track table.
pub fn compare_reference_groups(
    per_track_file: &Path,
    output_dir: &Path,
    reference: &str,
    caps: Capabilities,
    alpha: f64,
    logger: &mut crate::Logger,
) -> Result<Vec<Notice>, Box<dyn Error>> {
    let start_time = Instant::now();

    logger.log("=== VolStat Reference Comparison ===")?;
    logger.log(&format!("Per-track file: {}", per_track_file.display()))?;
    logger.log(&format!("Reference group: {}", reference))?;
    logger.log(&format!("Alpha: {}", alpha))?;
    logger.log(&format!("Capabilities: {:?}", caps))?;

    println!("[Loading data]");
    println!("    Per-track means: {}", per_track_file.display());
    println!();

    let summaries = tables::read_per_track(per_track_file)?;
    logger.log(&format!("Loaded {} per-track rows", summaries.len()))?;

    let (rows, notices) = compare_to_reference(&summaries, reference, caps, alpha)?;
    write_reference_results(&rows, output_dir, reference, logger)?;

    crate::pipeline::print_notices(&notices, logger)?;

    let elapsed = start_time.elapsed();
    println!("{}", crate::progress::format_time_used(elapsed));
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;

    Ok(notices)
}
