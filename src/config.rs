/// Run-wide parameters, fixed for the duration of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Samples whose fit value is strictly below this are discarded
    pub fit_threshold: f64,
    /// Baseline window is Time <= this value
    pub baseline_max_time: f64,
    /// Summary window is the closed interval [window_low, window_high]
    pub window_low: f64,
    pub window_high: f64,
    /// Significance level for normality, homogeneity and significance decisions
    pub alpha: f64,
    pub reference: String,
    pub genotypes: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fit_threshold: 0.9,
            baseline_max_time: 5.0,
            window_low: 500.0,
            window_high: 600.0,
            alpha: 0.05,
            reference: "WT".to_string(),
            genotypes: ["WT", "dr170", "dr180", "dr170 dr180", "osm6p811"]
                .iter()
                .map(|g| g.to_string())
                .collect(),
        }
    }
}

impl AnalysisConfig {
    /// Column name of the per-track summary value, e.g. `Mean500_600`
    pub fn summary_column(&self) -> String {
        format!("Mean{}_{}", self.window_low, self.window_high)
    }
}

/// Optional analysis capabilities, probed once at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Tukey HSD and Dunn post-hoc tests
    pub posthoc: bool,
    /// Holm p-value correction
    pub correction: bool,
}

impl Capabilities {
    /// Capabilities compiled into this build
    pub fn probe() -> Self {
        Self {
            posthoc: cfg!(feature = "posthoc"),
            correction: cfg!(feature = "multitest"),
        }
    }

    /// Probe, then switch off anything disabled for this run
    pub fn probe_with(disable_posthoc: bool, disable_correction: bool) -> Self {
        let probed = Self::probe();
        Self {
            posthoc: probed.posthoc && !disable_posthoc,
            correction: probed.correction && !disable_correction,
        }
    }

    #[cfg(test)]
    pub fn full() -> Self {
        Self {
            posthoc: true,
            correction: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.fit_threshold, 0.9);
        assert_eq!(cfg.baseline_max_time, 5.0);
        assert_eq!((cfg.window_low, cfg.window_high), (500.0, 600.0));
        assert_eq!(cfg.alpha, 0.05);
        assert_eq!(cfg.reference, "WT");
        assert_eq!(cfg.genotypes.len(), 5);
        assert_eq!(cfg.summary_column(), "Mean500_600");
    }

    #[test]
    fn disabled_capabilities_stay_off() {
        let caps = Capabilities::probe_with(true, true);
        assert!(!caps.posthoc);
        assert!(!caps.correction);
    }
}
