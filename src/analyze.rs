use serde::Serialize;

use crate::error::{Notice, NoticeKind};
use crate::hypothesis::{levene_median, shapiro_wilk, TestResult};
use crate::summary::Group;

pub const NORMALITY_HEADER: [&str; 4] = ["Genotype", "n", "W", "p"];

/// Shapiro-Wilk result for one group; `W`/`p` are empty when indeterminate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalityCheck {
    #[serde(rename = "Genotype")]
    pub genotype: String,
    pub n: usize,
    #[serde(rename = "W")]
    pub w: Option<f64>,
    pub p: Option<f64>,
}

impl NormalityCheck {
    /// Indeterminate results never reject normality
    pub fn is_normal(&self, alpha: f64) -> bool {
        match self.p {
            Some(p) if !p.is_nan() => p > alpha,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub all_normal: bool,
    pub homogeneous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionReport {
    pub normality: Vec<NormalityCheck>,
    pub levene: TestResult,
    pub verdict: Verdict,
}

/// Split groups into those usable for comparison (at least two values) and a
/// notice for each one that is not.
pub fn eligible_groups(groups: &[Group]) -> (Vec<Group>, Vec<Notice>) {
    let mut eligible = Vec::new();
    let mut notices = Vec::new();
    for g in groups {
        if g.len() >= 2 {
            eligible.push(g.clone());
        } else {
            notices.push(Notice::new(
                NoticeKind::InsufficientSample,
                format!(
                    "{}: {} summary value(s); excluded from group comparisons",
                    g.name,
                    g.len()
                ),
            ));
        }
    }
    (eligible, notices)
}

pub fn check_normality(group: &Group) -> NormalityCheck {
    let result = shapiro_wilk(&group.values);
    NormalityCheck {
        genotype: group.name.clone(),
        n: group.len(),
        w: result.map(|r| r.statistic),
        p: result.map(|r| r.p_value),
    }
}

pub fn compose_verdict(normality: &[NormalityCheck], levene: &TestResult, alpha: f64) -> Verdict {
    Verdict {
        all_normal: normality.iter().all(|c| c.is_normal(alpha)),
        // NaN p-values compare false, so an undefined Levene result is heterogeneous
        homogeneous: levene.p_value > alpha,
    }
}

/// Normality per group and variance homogeneity across all eligible groups.
pub fn analyze(groups: &[Group], alpha: f64) -> DistributionReport {
    let normality: Vec<NormalityCheck> = groups.iter().map(check_normality).collect();
    let slices: Vec<&[f64]> = groups.iter().map(|g| g.values.as_slice()).collect();
    let levene = levene_median(&slices);
    let verdict = compose_verdict(&normality, &levene, alpha);

    DistributionReport {
        normality,
        levene,
        verdict,
    }
}
