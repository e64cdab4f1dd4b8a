use serde::Serialize;

use crate::analyze::Verdict;
use crate::config::Capabilities;
use crate::error::{Notice, NoticeKind};
use crate::hypothesis::{kruskal_wallis, one_way_anova, welch_t_test};
use crate::multitest::holm;
use crate::posthoc::{dunn, tukey_hsd, DunnRow, TukeyRow};
use crate::summary::Group;

pub const WELCH_HEADER: [&str; 6] = ["group1", "group2", "t", "df", "p", "p_adj"];
pub const WELCH_UNADJ_HEADER: [&str; 5] = ["group1", "group2", "t", "df", "p"];

/// Comparison pipeline chosen from the distribution verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPlan {
    /// One-way ANOVA, then Tukey HSD
    Parametric,
    /// Kruskal-Wallis, then Dunn with Holm adjustment
    NonParametric,
    /// Pairwise Welch t-tests with one Holm correction over all pairs
    Heterogeneous,
}

impl TestPlan {
    pub fn describe(&self) -> &'static str {
        match self {
            TestPlan::Parametric => {
                "All groups approx normal and variances homogeneous -> one-way ANOVA and Tukey HSD"
            }
            TestPlan::NonParametric => {
                "Not all groups pass normality -> Kruskal-Wallis and Dunn post-hoc"
            }
            TestPlan::Heterogeneous => {
                "Data approx normal but variances unequal -> pairwise Welch t-tests with Holm correction"
            }
        }
    }
}

/// Non-normality wins over everything; homogeneity only splits the normal case.
pub fn select_plan(verdict: Verdict) -> TestPlan {
    if !verdict.all_normal {
        TestPlan::NonParametric
    } else if verdict.homogeneous {
        TestPlan::Parametric
    } else {
        TestPlan::Heterogeneous
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OmnibusResult {
    pub test: &'static str,
    pub statistic_name: &'static str,
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WelchRow {
    pub group1: String,
    pub group2: String,
    pub t: f64,
    pub df: f64,
    pub p: f64,
    pub p_adj: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pairwise {
    Tukey(Vec<TukeyRow>),
    Dunn(Vec<DunnRow>),
    Welch { rows: Vec<WelchRow>, adjusted: bool },
    /// Post-hoc capability missing; only the omnibus result exists
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterOutcome {
    pub plan: TestPlan,
    pub omnibus: Option<OmnibusResult>,
    pub pairwise: Pairwise,
    pub notices: Vec<Notice>,
}

fn slices(groups: &[Group]) -> Vec<&[f64]> {
    groups.iter().map(|g| g.values.as_slice()).collect()
}

fn run_parametric(groups: &[Group], caps: Capabilities, alpha: f64) -> RouterOutcome {
    let anova = one_way_anova(&slices(groups));
    let mut notices = Vec::new();
    let pairwise = if caps.posthoc {
        Pairwise::Tukey(tukey_hsd(groups, alpha))
    } else {
        notices.push(Notice::new(
            NoticeKind::MissingCapability,
            "post-hoc tests not available; cannot run Tukey HSD, reporting ANOVA only",
        ));
        Pairwise::Unavailable
    };
    RouterOutcome {
        plan: TestPlan::Parametric,
        omnibus: Some(OmnibusResult {
            test: "ANOVA",
            statistic_name: "F",
            statistic: anova.statistic,
            p_value: anova.p_value,
        }),
        pairwise,
        notices,
    }
}

fn run_nonparametric(groups: &[Group], caps: Capabilities) -> RouterOutcome {
    let kruskal = kruskal_wallis(&slices(groups));
    let mut notices = Vec::new();
    let pairwise = if caps.posthoc {
        Pairwise::Dunn(dunn(groups))
    } else {
        notices.push(Notice::new(
            NoticeKind::MissingCapability,
            "post-hoc tests not available; cannot run Dunn post-hoc, reporting Kruskal-Wallis only",
        ));
        Pairwise::Unavailable
    };
    RouterOutcome {
        plan: TestPlan::NonParametric,
        omnibus: Some(OmnibusResult {
            test: "Kruskal-Wallis",
            statistic_name: "H",
            statistic: kruskal.statistic,
            p_value: kruskal.p_value,
        }),
        pairwise,
        notices,
    }
}

/// Every unordered pair in group order, no omnibus test first.
fn run_heterogeneous(groups: &[Group], caps: Capabilities) -> RouterOutcome {
    let mut rows = Vec::new();
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let welch = welch_t_test(&groups[i].values, &groups[j].values);
            rows.push(WelchRow {
                group1: groups[i].name.clone(),
                group2: groups[j].name.clone(),
                t: welch.t,
                df: welch.df,
                p: welch.p_value,
                p_adj: None,
            });
        }
    }

    let mut notices = Vec::new();
    if caps.correction {
        let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
        for (row, adj) in rows.iter_mut().zip(holm(&raw)) {
            row.p_adj = adj;
        }
    } else {
        notices.push(Notice::new(
            NoticeKind::MissingCapability,
            "p-value correction not available; saving unadjusted pairwise p-values",
        ));
    }

    RouterOutcome {
        plan: TestPlan::Heterogeneous,
        omnibus: None,
        pairwise: Pairwise::Welch {
            rows,
            adjusted: caps.correction,
        },
        notices,
    }
}

pub fn execute(plan: TestPlan, groups: &[Group], caps: Capabilities, alpha: f64) -> RouterOutcome {
    let mut outcome = match plan {
        TestPlan::Parametric => run_parametric(groups, caps, alpha),
        TestPlan::NonParametric => run_nonparametric(groups, caps),
        TestPlan::Heterogeneous => run_heterogeneous(groups, caps),
    };
    if let Some(omnibus) = &outcome.omnibus {
        if omnibus.p_value.is_nan() {
            outcome.notices.push(Notice::new(
                NoticeKind::UndefinedStatistic,
                format!("{} statistic is undefined for these groups", omnibus.test),
            ));
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn groups() -> Vec<Group> {
        vec![
            Group::new("WT", vec![100.0, 102.0, 98.0, 101.0, 99.0]),
            Group::new("dr170", vec![90.0, 93.0, 88.0, 91.0, 92.0]),
            Group::new("dr180", vec![80.0, 120.0, 60.0, 140.0, 100.0]),
        ]
    }

    #[test]
    fn normal_and_homogeneous_selects_anova() {
        let plan = select_plan(Verdict {
            all_normal: true,
            homogeneous: true,
        });
        assert_eq!(plan, TestPlan::Parametric);
    }

    #[test]
    fn non_normal_overrides_homogeneity() {
        for homogeneous in [true, false] {
            let plan = select_plan(Verdict {
                all_normal: false,
                homogeneous,
            });
            assert_eq!(plan, TestPlan::NonParametric);
        }
    }

    #[test]
    fn normal_but_heterogeneous_selects_welch() {
        let plan = select_plan(Verdict {
            all_normal: true,
            homogeneous: false,
        });
        assert_eq!(plan, TestPlan::Heterogeneous);
    }

    #[test]
    fn parametric_path_runs_anova_and_tukey() {
        let out = execute(TestPlan::Parametric, &groups(), Capabilities::full(), 0.05);
        let omnibus = out.omnibus.unwrap();
        assert_eq!(omnibus.test, "ANOVA");
        assert_eq!(omnibus.statistic_name, "F");
        match out.pairwise {
            Pairwise::Tukey(rows) => assert_eq!(rows.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert!(out.notices.is_empty());
    }

    #[test]
    fn missing_posthoc_reports_omnibus_only() {
        let caps = Capabilities {
            posthoc: false,
            correction: true,
        };
        let out = execute(TestPlan::NonParametric, &groups(), caps, 0.05);
        assert_eq!(out.omnibus.unwrap().test, "Kruskal-Wallis");
        assert_eq!(out.pairwise, Pairwise::Unavailable);
        assert_eq!(out.notices.len(), 1);
        assert_eq!(out.notices[0].kind, NoticeKind::MissingCapability);
    }

    #[test]
    fn missing_posthoc_leaves_anova_alone() {
        let caps = Capabilities {
            posthoc: false,
            correction: true,
        };
        let out = execute(TestPlan::Parametric, &groups(), caps, 0.05);
        let omnibus = out.omnibus.unwrap();
        assert_eq!(omnibus.test, "ANOVA");
        assert_eq!(omnibus.statistic_name, "F");
        assert_eq!(out.pairwise, Pairwise::Unavailable);
        assert_eq!(out.notices.len(), 1);
        assert_eq!(out.notices[0].kind, NoticeKind::MissingCapability);
        assert!(out.notices[0].message.contains("Tukey"));
    }

    #[test]
    fn welch_path_corrects_across_all_pairs() {
        let out = execute(TestPlan::Heterogeneous, &groups(), Capabilities::full(), 0.05);
        assert!(out.omnibus.is_none());
        match out.pairwise {
            Pairwise::Welch { rows, adjusted } => {
                assert!(adjusted);
                assert_eq!(rows.len(), 3);
                assert_eq!((rows[0].group1.as_str(), rows[0].group2.as_str()), ("WT", "dr170"));
                let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
                let expected = holm(&raw);
                for (row, e) in rows.iter().zip(expected) {
                    assert_eq!(row.p_adj, e);
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn welch_without_correction_keeps_raw_values() {
        let caps = Capabilities {
            posthoc: true,
            correction: false,
        };
        let out = execute(TestPlan::Heterogeneous, &groups(), caps, 0.05);
        match out.pairwise {
            Pairwise::Welch { rows, adjusted } => {
                assert!(!adjusted);
                assert!(rows.iter().all(|r| r.p_adj.is_none()));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(out.notices[0].kind, NoticeKind::MissingCapability);
    }

    proptest! {
        #[test]
        fn selection_is_total_and_deterministic(all_normal: bool, homogeneous: bool) {
            let verdict = Verdict { all_normal, homogeneous };
            let plan = select_plan(verdict);
            prop_assert_eq!(plan, select_plan(verdict));
            if !all_normal {
                prop_assert_eq!(plan, TestPlan::NonParametric);
            }
        }
    }
}
