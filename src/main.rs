// Version information constants
const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::error::Error;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::{Args, Parser, Subcommand};

mod analyze;
mod compare;
mod config;
mod error;
mod hypothesis;
mod multitest;
mod norm;
mod pipeline;
mod posthoc;
mod progress;
mod router;
mod studentized;
mod summary;
mod tables;
mod volume;

use config::{AnalysisConfig, Capabilities};

/// Logger manager supporting dynamic progress display and detailed logging
pub struct Logger {
    writer: BufWriter<std::fs::File>,
    last_progress: String,
}

impl Logger {
    pub fn new(file: std::fs::File) -> Self {
        Self {
            writer: BufWriter::new(file),
            last_progress: String::new(),
        }
    }

    /// Record detailed log information
    pub fn log(&mut self, message: &str) -> std::io::Result<()> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.writer, "[{}] {}", timestamp, message)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Display dynamic progress information (overwrite previous line)
    pub fn progress(&mut self, message: &str) -> std::io::Result<()> {
        if !self.last_progress.is_empty() {
            print!("\r{}", " ".repeat(self.last_progress.len()));
        }
        print!("\r{}", message);
        std::io::stdout().flush()?;

        self.last_progress = message.to_string();
        Ok(())
    }

    /// Finish progress display
    pub fn finish_progress(&mut self) -> std::io::Result<()> {
        if !self.last_progress.is_empty() {
            println!();
            self.last_progress.clear();
        }
        Ok(())
    }

    /// Record log and display progress simultaneously
    pub fn log_and_progress(&mut self, message: &str) -> std::io::Result<()> {
        self.log(message)?;
        self.progress(message)?;
        Ok(())
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive per-track volume summaries and compare genotypes
    Stats(StatsArgs),
    /// Compare every genotype against the reference group from a per-track table
    Reference(ReferenceArgs),
}

#[derive(Args)]
struct StatsArgs {
    /// Directory holding `<genotype> compiled_<metric>.csv` tables
    #[arg(short = 'd', long = "data-dir", default_value = ".")]
    pub data_dir: String,
    /// Output directory
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: String,
    /// Genotypes to analyze, comma-separated
    #[arg(
        short = 'g',
        long = "genotypes",
        value_delimiter = ',',
        default_value = "WT,dr170,dr180,dr170 dr180,osm6p811"
    )]
    pub genotypes: Vec<String>,
    /// Reference genotype for --with-reference
    #[arg(short = 'r', long = "reference", default_value = "WT")]
    pub reference: String,
    /// Samples with a fit value below this are discarded
    #[arg(long = "fit-threshold", default_value_t = 0.9)]
    pub fit_threshold: f64,
    /// Baseline is the mean over Time <= this value
    #[arg(long = "baseline-max-time", default_value_t = 5.0)]
    pub baseline_max_time: f64,
    /// Lower bound of the summary window
    #[arg(long = "window-low", default_value_t = 500.0)]
    pub window_low: f64,
    /// Upper bound of the summary window
    #[arg(long = "window-high", default_value_t = 600.0)]
    pub window_high: f64,
    /// Significance level
    #[arg(short = 'a', long = "alpha", default_value_t = 0.05)]
    pub alpha: f64,
    /// Also run the reference comparison on the summaries
    #[arg(long = "with-reference")]
    pub with_reference: bool,
    /// Skip Tukey HSD and Dunn post-hoc tests
    #[arg(long = "no-posthoc")]
    pub no_posthoc: bool,
    /// Skip Holm p-value correction
    #[arg(long = "no-correction")]
    pub no_correction: bool,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

#[derive(Args)]
struct ReferenceArgs {
    /// Per-track summary CSV written by `stats`
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Output directory
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: String,
    /// Reference genotype
    #[arg(short = 'r', long = "reference", default_value = "WT")]
    pub reference: String,
    /// Significance level
    #[arg(short = 'a', long = "alpha", default_value_t = 0.05)]
    pub alpha: f64,
    /// Skip Holm p-value correction
    #[arg(long = "no-correction")]
    pub no_correction: bool,
    /// Log file path (optional)
    #[arg(short = 'l', long = "log")]
    pub log: Option<String>,
}

impl StatsArgs {
    fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            fit_threshold: self.fit_threshold,
            baseline_max_time: self.baseline_max_time,
            window_low: self.window_low,
            window_high: self.window_high,
            alpha: self.alpha,
            reference: self.reference.trim().to_string(),
            genotypes: self
                .genotypes
                .iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
        }
    }
}

fn open_log(path: &Option<String>, default: &str) -> std::io::Result<Logger> {
    let log_file = match path {
        Some(log_path) => std::fs::File::create(log_path)?,
        None => std::fs::File::create(default)?,
    };
    Ok(Logger::new(log_file))
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Stats(args) => {
            validate_stats_args(&args)?;
            let mut logger = open_log(&args.log, "stats.log")?;

            let config = args.analysis_config();
            let caps = Capabilities::probe_with(args.no_posthoc, args.no_correction);

            logger.log("=== VolStat Stats Function Log ===")?;
            logger.log(&format!("Software Version: v{}", VERSION))?;
            logger.log(&format!("Runtime: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")))?;
            logger.log(&format!("Data Directory: {}", args.data_dir))?;
            logger.log(&format!("Output Directory: {}", args.output_dir))?;
            logger.log(&format!("Genotypes: {}", config.genotypes.join(", ")))?;
            logger.log(&format!("Reference: {}", config.reference))?;
            logger.log(&format!("Fit Threshold: {}", config.fit_threshold))?;
            logger.log(&format!("Baseline Max Time: {}", config.baseline_max_time))?;
            logger.log(&format!("Window: [{}, {}]", config.window_low, config.window_high))?;
            logger.log(&format!("Alpha: {}", config.alpha))?;
            logger.log(&format!("Capabilities: {:?}", caps))?;

            let result = pipeline::run_stats(
                &config,
                caps,
                Path::new(&args.data_dir),
                Path::new(&args.output_dir),
                args.with_reference,
                &mut logger,
            );

            match &result {
                Ok(run) => run.log_summary(&mut logger)?,
                Err(e) => logger.log(&format!("Stats failed: {}", e))?,
            }
            result.map(|_| ())
        }
        Commands::Reference(args) => {
            validate_reference_args(&args)?;
            let mut logger = open_log(&args.log, "reference.log")?;
            let caps = Capabilities::probe_with(false, args.no_correction);

            logger.log("=== VolStat Reference Function Log ===")?;
            logger.log(&format!("Software Version: v{}", VERSION))?;
            logger.log(&format!("Runtime: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")))?;
            logger.log(&format!("Output Directory: {}", args.output_dir))?;

            std::fs::create_dir_all(&args.output_dir)?;
            let result = compare::compare_reference_groups(
                Path::new(&args.input),
                Path::new(&args.output_dir),
                args.reference.trim(),
                caps,
                args.alpha,
                &mut logger,
            );

            match &result {
                Ok(notices) => logger.log(&format!(
                    "Reference comparison completed with {} notice(s)",
                    notices.len()
                ))?,
                Err(e) => logger.log(&format!("Reference comparison failed: {}", e))?,
            }
            result.map(|_| ())
        }
    }
}

fn validate_alpha(alpha: f64) -> Result<(), Box<dyn Error>> {
    if !alpha.is_finite() || alpha <= 0.0 || alpha >= 1.0 {
        return Err(format!("Error: alpha must be between 0 and 1 (current: {})", alpha).into());
    }
    Ok(())
}

fn validate_reference_name(reference: &str) -> Result<(), Box<dyn Error>> {
    if reference.trim().is_empty() {
        return Err("Error: reference genotype cannot be empty".into());
    }
    Ok(())
}

/// Validate stats command parameters
fn validate_stats_args(args: &StatsArgs) -> Result<(), Box<dyn Error>> {
    if args.data_dir.trim().is_empty() {
        return Err("Error: data directory cannot be empty".into());
    }
    if !Path::new(&args.data_dir).is_dir() {
        return Err(format!("Error: data directory does not exist: {}", args.data_dir).into());
    }
    if args.output_dir.trim().is_empty() {
        return Err("Error: output directory cannot be empty".into());
    }
    if args.genotypes.iter().all(|g| g.trim().is_empty()) {
        return Err("Error: at least one genotype is required".into());
    }
    validate_reference_name(&args.reference)?;

    for (name, value) in [
        ("fit threshold", args.fit_threshold),
        ("baseline max time", args.baseline_max_time),
        ("window low", args.window_low),
        ("window high", args.window_high),
    ] {
        if !value.is_finite() {
            return Err(format!("Error: {} must be a finite number (current: {})", name, value).into());
        }
    }
    if args.window_low > args.window_high {
        return Err(format!(
            "Error: window low must not exceed window high (current: {} > {})",
            args.window_low, args.window_high
        )
        .into());
    }
    validate_alpha(args.alpha)?;

    Ok(())
}

/// Validate reference command parameters
fn validate_reference_args(args: &ReferenceArgs) -> Result<(), Box<dyn Error>> {
    if args.input.trim().is_empty() {
        return Err("Error: per-track file path cannot be empty".into());
    }
    if !Path::new(&args.input).exists() {
        return Err(format!("Error: per-track file does not exist: {}", args.input).into());
    }
    if !args.input.ends_with(".csv") {
        return Err(format!("Error: per-track file path must end with .csv: {}", args.input).into());
    }
    if args.output_dir.trim().is_empty() {
        return Err("Error: output directory cannot be empty".into());
    }
    validate_reference_name(&args.reference)?;
    validate_alpha(args.alpha)?;

    Ok(())
}
