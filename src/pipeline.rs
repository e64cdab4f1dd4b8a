use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::analyze::{self, DistributionReport, NORMALITY_HEADER};
use crate::compare::{self, ReferenceComparison};
use crate::config::{AnalysisConfig, Capabilities};
use crate::error::{AppError, Notice, NoticeKind};
use crate::norm;
use crate::posthoc::{DUNN_HEADER, TUKEY_HEADER};
use crate::router::{self, OmnibusResult, Pairwise, RouterOutcome, WELCH_HEADER, WELCH_UNADJ_HEADER};
use crate::summary::{self, TrackSummary};
use crate::tables::{self, GroupInput};
use crate::volume;

pub const PER_TRACK_FILE: &str = "per_track_means.csv";
pub const NORMALITY_FILE: &str = "normality_tests.csv";
pub const SUMMARY_FILE: &str = "stats_results_summary.csv";
pub const TUKEY_FILE: &str = "tukey_hsd_results.csv";
pub const DUNN_FILE: &str = "dunn_posthoc_results.csv";
pub const WELCH_FILE: &str = "pairwise_welch_results.csv";
pub const WELCH_UNADJ_FILE: &str = "pairwise_welch_results_unadj.csv";

/// Everything a `stats` run produced.
#[derive(Debug)]
pub struct StatsRun {
    pub summaries: Vec<TrackSummary>,
    pub distribution: DistributionReport,
    pub outcome: RouterOutcome,
    pub reference: Option<Vec<ReferenceComparison>>,
    pub notices: Vec<Notice>,
    pub outputs: Vec<PathBuf>,
}

impl StatsRun {
    pub fn log_summary(&self, logger: &mut crate::Logger) -> std::io::Result<()> {
        logger.log(&format!(
            "Stats completed: {} track summaries, {} notice(s)",
            self.summaries.len(),
            self.notices.len()
        ))?;
        logger.log(&format!(
            "Groups compared: {}; verdict {:?}",
            self.distribution.normality.len(),
            self.distribution.verdict
        ))?;
        logger.log(&format!("Route: {:?}", self.outcome.plan))?;
        if let Some(rows) = &self.reference {
            logger.log(&format!("Reference comparisons: {}", rows.len()))?;
        }
        logger.log(&format!("Output files: {}", self.outputs.len()))?;
        Ok(())
    }
}

/// Metric Deriver -> Baseline Normalizer -> Window Summarizer for one genotype.
/// Absent input tables give an empty set and a notice.
pub fn summarize_genotype(
    data_dir: &Path,
    genotype: &str,
    config: &AnalysisConfig,
) -> Result<(Vec<TrackSummary>, Vec<Notice>), AppError> {
    let tables = match tables::load_group_tables(data_dir, genotype)? {
        GroupInput::Loaded(tables) => tables,
        GroupInput::Missing(paths) => {
            let listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
            let notice = Notice::new(
                NoticeKind::MissingInput,
                format!("Missing files for genotype {}: {}", genotype, listed.join(", ")),
            );
            return Ok((Vec::new(), vec![notice]));
        }
    };

    let (volumes, notices) = volume::derive_group(&tables, config);
    let normalized = norm::normalize_group(&volumes, config);
    let summaries = summary::summarize_group(genotype, &normalized, config);
    Ok((summaries, notices))
}

fn write_omnibus_summary(path: &Path, omnibus: Option<&OmnibusResult>) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;
    match omnibus {
        Some(result) => {
            writer.write_record(["test", result.statistic_name, "p"])?;
            let statistic = result.statistic.to_string();
            let p = result.p_value.to_string();
            writer.write_record([result.test, statistic.as_str(), p.as_str()])?;
        }
        None => writer.write_record(["test", "p"])?,
    }
    writer.flush()?;
    Ok(())
}

/// Persist the router's tables; returns the paths written.
fn write_router_outputs(outcome: &RouterOutcome, output_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();

    let summary_path = output_dir.join(SUMMARY_FILE);
    write_omnibus_summary(&summary_path, outcome.omnibus.as_ref())?;
    written.push(summary_path);

    match &outcome.pairwise {
        Pairwise::Tukey(rows) => {
            let path = output_dir.join(TUKEY_FILE);
            tables::write_records(&path, &TUKEY_HEADER, rows)?;
            written.push(path);
        }
        Pairwise::Dunn(rows) => {
            let path = output_dir.join(DUNN_FILE);
            tables::write_records(&path, &DUNN_HEADER, rows)?;
            written.push(path);
        }
        Pairwise::Welch { rows, adjusted: true } => {
            let path = output_dir.join(WELCH_FILE);
            tables::write_records(&path, &WELCH_HEADER, rows)?;
            written.push(path);
        }
        Pairwise::Welch { rows, adjusted: false } => {
            let path = output_dir.join(WELCH_UNADJ_FILE);
            let unadjusted: Vec<(&str, &str, f64, f64, f64)> = rows
                .iter()
                .map(|r| (r.group1.as_str(), r.group2.as_str(), r.t, r.df, r.p))
                .collect();
            tables::write_records(&path, &WELCH_UNADJ_HEADER, &unadjusted)?;
            written.push(path);
        }
        Pairwise::Unavailable => {}
    }
    Ok(written)
}

fn print_distribution(report: &DistributionReport) {
    println!("[Distribution checks]");
    println!("    Shapiro-Wilk normality tests (statistic, p-value):");
    for check in &report.normality {
        match (check.w, check.p) {
            (Some(w), Some(p)) => println!("      {}: {:.4}, p={:.4}", check.genotype, w, p),
            _ => println!("      {}: indeterminate (n={})", check.genotype, check.n),
        }
    }
    println!(
        "    Levene test for equal variances: stat={:.4}, p={:.4}",
        report.levene.statistic, report.levene.p_value
    );
    println!();
}

fn print_outcome(outcome: &RouterOutcome) {
    println!("[Decision]");
    println!("    {}", outcome.plan.describe());
    if let Some(omnibus) = &outcome.omnibus {
        println!(
            "    {} {}={:.4}, p={:.4}",
            omnibus.test, omnibus.statistic_name, omnibus.statistic, omnibus.p_value
        );
    }
    println!();
}

/// Full batch: per-track summaries, distribution checks, routed group comparison
/// and optionally the reference comparison.
pub fn run_stats(
    config: &AnalysisConfig,
    caps: Capabilities,
    data_dir: &Path,
    output_dir: &Path,
    with_reference: bool,
    logger: &mut crate::Logger,
) -> Result<StatsRun, Box<dyn Error>> {
    let start_time = Instant::now();
    std::fs::create_dir_all(output_dir)?;

    println!("[Loading data]");
    println!("    Data directory: {}", data_dir.display());
    println!("    Genotypes: {}", config.genotypes.join(", "));
    println!();

    let mut notices = Vec::new();
    let mut summaries = Vec::new();
    for genotype in &config.genotypes {
        logger.log_and_progress(&format!("[Progressing] Summarizing {}...", genotype))?;
        let (rows, group_notices) = summarize_genotype(data_dir, genotype, config)?;
        logger.log(&format!("{}: {} track(s) retained", genotype, rows.len()))?;
        summaries.extend(rows);
        notices.extend(group_notices);
    }
    logger.finish_progress()?;

    let mut outputs = Vec::new();
    let per_track_path = output_dir.join(PER_TRACK_FILE);
    tables::write_per_track(&per_track_path, &config.summary_column(), &summaries)?;
    logger.log(&format!("Saved per-track means to {}", per_track_path.display()))?;
    outputs.push(per_track_path);

    let groups = summary::collect_groups(&summaries, &config.genotypes);
    let (eligible, insufficient) = analyze::eligible_groups(&groups);
    notices.extend(insufficient);
    if eligible.len() < 2 {
        print_notices(&notices, logger)?;
        return Err(AppError::InsufficientGroups {
            usable: eligible.len(),
        }
        .into());
    }

    let distribution = analyze::analyze(&eligible, config.alpha);
    print_distribution(&distribution);
    logger.log(&format!(
        "Levene: stat={}, p={}; verdict {:?}",
        distribution.levene.statistic, distribution.levene.p_value, distribution.verdict
    ))?;
    let normality_path = output_dir.join(NORMALITY_FILE);
    tables::write_records(&normality_path, &NORMALITY_HEADER, &distribution.normality)?;
    outputs.push(normality_path);

    let plan = router::select_plan(distribution.verdict);
    logger.log(&format!("Selected plan: {:?}", plan))?;
    let outcome = router::execute(plan, &eligible, caps, config.alpha);
    print_outcome(&outcome);
    notices.extend(outcome.notices.iter().cloned());
    outputs.extend(write_router_outputs(&outcome, output_dir)?);

    let reference = if with_reference {
        let (rows, reference_notices) =
            compare::compare_to_reference(&summaries, &config.reference, caps, config.alpha)?;
        compare::write_reference_results(&rows, output_dir, &config.reference, logger)?;
        outputs.push(compare::reference_output_path(output_dir, &config.reference));
        notices.extend(reference_notices);
        Some(rows)
    } else {
        None
    };

    println!("[Output]");
    for path in &outputs {
        println!("    {}", path.display());
        logger.log(&format!("Wrote {}", path.display()))?;
    }
    println!();
    print_notices(&notices, logger)?;

    let elapsed = start_time.elapsed();
    println!("{}", crate::progress::format_time_used(elapsed));
    logger.log(&format!("Total time: {:.2}s", elapsed.as_secs_f64()))?;

    Ok(StatsRun {
        summaries,
        distribution,
        outcome,
        reference,
        notices,
        outputs,
    })
}

pub fn print_notices(notices: &[Notice], logger: &mut crate::Logger) -> std::io::Result<()> {
    if notices.is_empty() {
        return Ok(());
    }
    println!("[Notices]");
    for notice in notices {
        println!("    {}", notice);
        logger.log(&notice.to_string())?;
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::TestPlan;
    use std::fmt::Write as _;

    fn logger() -> crate::Logger {
        crate::Logger::new(tempfile::tempfile().unwrap())
    }

    /// Write area/length/fit tables where each track's window level is `levels[i]`
    /// percent of its baseline.
    fn write_genotype(dir: &Path, genotype: &str, levels: &[f64]) {
        let times = [0.0, 2.5, 5.0, 500.0, 550.0, 600.0];
        let mut area = String::from("Frame,Time");
        let mut length = String::from("Frame,Time");
        let mut fit = String::from("Frame,Time");
        for i in 0..levels.len() {
            for table in [&mut area, &mut length, &mut fit] {
                write!(table, ",{}_Track{}", genotype.replace(' ', "_"), i).unwrap();
            }
        }
        for (frame, t) in times.iter().enumerate() {
            for table in [&mut area, &mut length, &mut fit] {
                write!(table, "\n{},{}", frame + 1, t).unwrap();
            }
            for level in levels {
                // volume = pi * a^2 / (4 * l) with l = pi / 4 gives volume = a^2
                let volume = if *t <= 5.0 { 100.0 } else { *level };
                write!(area, ",{}", volume.sqrt()).unwrap();
                write!(length, ",{}", std::f64::consts::PI / 4.0).unwrap();
                write!(fit, ",0.95").unwrap();
            }
        }
        for (metric, body) in [("area", area), ("length", length), ("fit", fit)] {
            std::fs::write(tables::metric_path(dir, genotype, metric), body + "\n").unwrap();
        }
    }

    fn config(genotypes: &[&str]) -> AnalysisConfig {
        AnalysisConfig {
            genotypes: genotypes.iter().map(|g| g.to_string()).collect(),
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn summarizes_tracks_relative_to_baseline() {
        let dir = tempfile::tempdir().unwrap();
        write_genotype(dir.path(), "WT", &[120.0, 80.0]);
        let (rows, notices) =
            summarize_genotype(dir.path(), "WT", &AnalysisConfig::default()).unwrap();
        assert!(notices.is_empty());
        assert_eq!(rows.len(), 2);
        assert!((rows[0].mean - 120.0).abs() < 1e-6);
        assert!((rows[1].mean - 80.0).abs() < 1e-6);
        assert_eq!(rows[0].track, "WT_Track0");
    }

    #[test]
    fn missing_genotype_files_become_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (rows, notices) =
            summarize_genotype(dir.path(), "dr170", &AnalysisConfig::default()).unwrap();
        assert!(rows.is_empty());
        assert_eq!(notices[0].kind, NoticeKind::MissingInput);
    }

    #[test]
    fn full_run_writes_reports() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_genotype(data.path(), "WT", &[100.0, 104.0, 97.0, 101.0, 99.0, 102.0]);
        write_genotype(data.path(), "dr170", &[80.0, 83.0, 79.0, 81.0, 78.0, 82.0]);
        write_genotype(data.path(), "dr180", &[95.0]);
        let cfg = config(&["WT", "dr170", "dr180", "osm6p811"]);

        let run = run_stats(
            &cfg,
            Capabilities::full(),
            data.path(),
            out.path(),
            true,
            &mut logger(),
        )
        .unwrap();

        assert_eq!(run.summaries.len(), 13);
        assert_eq!(run.distribution.normality.len(), 2);
        assert!(run
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::MissingInput && n.message.contains("osm6p811")));
        assert!(run
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::InsufficientSample && n.message.contains("dr180")));

        let per_track = std::fs::read_to_string(out.path().join(PER_TRACK_FILE)).unwrap();
        assert!(per_track.starts_with("Genotype,Track,Mean500_600"));
        assert!(out.path().join(SUMMARY_FILE).exists());
        assert!(out.path().join(NORMALITY_FILE).exists());
        assert!(out.path().join("pairwise_WT_results.csv").exists());

        let reference = run.reference.unwrap();
        assert_eq!(reference.len(), 2);
        assert_eq!(reference[0].genotype, "dr170");
        assert_eq!(reference[0].rank_biserial, Some(-1.0));
        assert_eq!(reference[1].note, "insufficient_n");

        // both groups symmetric with similar spread
        assert_eq!(run.outcome.plan, TestPlan::Parametric);
        let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("test,F,p\nANOVA,"));
        let tukey = std::fs::read_to_string(out.path().join(TUKEY_FILE)).unwrap();
        assert!(tukey.starts_with("group1,group2,meandiff,p_adj,lower,upper,reject\nWT,dr170,"));
    }

    #[test]
    fn outlier_group_routes_to_kruskal_and_dunn() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_genotype(data.path(), "WT", &[80.0, 81.0, 79.0, 82.0, 78.0, 80.5, 79.5, 200.0]);
        write_genotype(data.path(), "dr170", &[90.0, 91.0, 89.0, 92.0, 88.0, 90.5, 89.5, 91.5]);
        write_genotype(data.path(), "dr180", &[70.0, 71.0, 69.0, 72.0, 68.0, 70.5, 69.5, 71.5]);
        let cfg = config(&["WT", "dr170", "dr180"]);

        let log = tempfile::NamedTempFile::new().unwrap();
        let mut logger = crate::Logger::new(log.reopen().unwrap());
        let run = run_stats(&cfg, Capabilities::full(), data.path(), out.path(), false, &mut logger)
            .unwrap();
        run.log_summary(&mut logger).unwrap();

        let wt = &run.distribution.normality[0];
        assert_eq!(wt.genotype, "WT");
        assert!(wt.p.unwrap() < 0.05);
        assert_eq!(run.outcome.plan, TestPlan::NonParametric);

        let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("test,H,p\nKruskal-Wallis,"));
        let dunn = std::fs::read_to_string(out.path().join(DUNN_FILE)).unwrap();
        assert!(dunn.starts_with("group1,group2,z,p,p_adj\n"));
        assert_eq!(dunn.lines().count(), 4);
        assert!(!out.path().join(TUKEY_FILE).exists());
        assert!(run.reference.is_none());

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("Route: NonParametric"));
        assert!(text.contains("Output files: 4"));
    }

    #[test]
    fn unequal_spread_routes_to_pairwise_welch() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // expected normal order statistics for n = 10
        let scores = [-1.547, -1.0, -0.655, -0.375, -0.123, 0.123, 0.375, 0.655, 1.0, 1.547];
        let narrow: Vec<f64> = scores.iter().map(|z| 100.0 + z).collect();
        let wide: Vec<f64> = scores.iter().map(|z| 80.0 + 20.0 * z).collect();
        write_genotype(data.path(), "WT", &narrow);
        write_genotype(data.path(), "dr170", &wide);
        let cfg = config(&["WT", "dr170"]);

        let run = run_stats(&cfg, Capabilities::full(), data.path(), out.path(), false, &mut logger())
            .unwrap();
        assert!(run.distribution.verdict.all_normal);
        assert!(!run.distribution.verdict.homogeneous);
        assert_eq!(run.outcome.plan, TestPlan::Heterogeneous);

        let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary, "test,p\n");
        let welch = std::fs::read_to_string(out.path().join(WELCH_FILE)).unwrap();
        assert!(welch.starts_with("group1,group2,t,df,p,p_adj\nWT,dr170,"));
        assert!(!out.path().join(TUKEY_FILE).exists());
        assert!(!out.path().join(DUNN_FILE).exists());
    }

    #[test]
    fn anova_without_posthoc_writes_no_tukey_table() {
        let out = tempfile::tempdir().unwrap();
        let groups = vec![
            summary::Group::new("WT", vec![100.0, 102.0, 98.0, 101.0, 99.0]),
            summary::Group::new("dr170", vec![90.0, 93.0, 88.0, 91.0, 92.0]),
        ];
        let caps = Capabilities {
            posthoc: false,
            correction: true,
        };
        let outcome = router::execute(TestPlan::Parametric, &groups, caps, 0.05);
        let written = write_router_outputs(&outcome, out.path()).unwrap();

        assert_eq!(written, vec![out.path().join(SUMMARY_FILE)]);
        let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap();
        assert!(summary.starts_with("test,F,p\nANOVA,"));
        assert!(!out.path().join(TUKEY_FILE).exists());
    }

    #[test]
    fn too_few_usable_groups_aborts_after_per_track_table() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_genotype(data.path(), "WT", &[100.0, 101.0, 99.0]);
        let cfg = config(&["WT", "dr170"]);

        let err = run_stats(&cfg, Capabilities::full(), data.path(), out.path(), false, &mut logger())
            .unwrap_err();
        assert!(err.to_string().contains("Not enough groups"));
        assert!(out.path().join(PER_TRACK_FILE).exists());
        assert!(!out.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn unadjusted_welch_goes_to_its_own_file() {
        let out = tempfile::tempdir().unwrap();
        let outcome = RouterOutcome {
            plan: TestPlan::Heterogeneous,
            omnibus: None,
            pairwise: Pairwise::Welch {
                rows: vec![router::WelchRow {
                    group1: "WT".into(),
                    group2: "dr170".into(),
                    t: 2.5,
                    df: 7.1,
                    p: 0.04,
                    p_adj: None,
                }],
                adjusted: false,
            },
            notices: Vec::new(),
        };
        let written = write_router_outputs(&outcome, out.path()).unwrap();
        assert_eq!(written.len(), 2);

        let summary = std::fs::read_to_string(out.path().join(SUMMARY_FILE)).unwrap();
        assert_eq!(summary, "test,p\n");
        let welch = std::fs::read_to_string(out.path().join(WELCH_UNADJ_FILE)).unwrap();
        assert_eq!(welch, "group1,group2,t,df,p\nWT,dr170,2.5,7.1,0.04\n");
        assert!(!out.path().join(WELCH_FILE).exists());
    }
}
