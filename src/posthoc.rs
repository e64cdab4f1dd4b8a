use serde::Serialize;

use crate::hypothesis::{mean, normal_sf, rank_with_ties, tie_sum};
use crate::multitest::holm;
use crate::studentized::{ptukey, qtukey};
use crate::summary::Group;

pub const TUKEY_HEADER: [&str; 7] = ["group1", "group2", "meandiff", "p_adj", "lower", "upper", "reject"];
pub const DUNN_HEADER: [&str; 5] = ["group1", "group2", "z", "p", "p_adj"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TukeyRow {
    pub group1: String,
    pub group2: String,
    /// mean(group2) - mean(group1)
    pub meandiff: f64,
    pub p_adj: f64,
    pub lower: f64,
    pub upper: f64,
    pub reject: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DunnRow {
    pub group1: String,
    pub group2: String,
    pub z: f64,
    pub p: f64,
    pub p_adj: Option<f64>,
}

fn sorted_by_name(groups: &[Group]) -> Vec<&Group> {
    let mut sorted: Vec<&Group> = groups.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// Tukey HSD over every pair of groups (Tukey-Kramer for unequal sizes),
/// confidence intervals at 1 - alpha.
pub fn tukey_hsd(groups: &[Group], alpha: f64) -> Vec<TukeyRow> {
    let sorted = sorted_by_name(groups);
    let k = sorted.len();
    let n_total: usize = sorted.iter().map(|g| g.len()).sum();
    let df = (n_total - k) as f64;

    let means: Vec<f64> = sorted.iter().map(|g| mean(&g.values)).collect();
    let ss_within: f64 = sorted
        .iter()
        .zip(&means)
        .map(|(g, m)| g.values.iter().map(|v| (v - m).powi(2)).sum::<f64>())
        .sum();
    let mse = ss_within / df;
    let q_crit = qtukey(1.0 - alpha, k, df);

    let mut rows = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            let diff = means[j] - means[i];
            let se = (mse / 2.0 * (1.0 / sorted[i].len() as f64 + 1.0 / sorted[j].len() as f64)).sqrt();
            let q = if se > 0.0 {
                diff.abs() / se
            } else if diff == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            let p_adj = (1.0 - ptukey(q, k, df)).clamp(0.0, 1.0);
            rows.push(TukeyRow {
                group1: sorted[i].name.clone(),
                group2: sorted[j].name.clone(),
                meandiff: diff,
                p_adj,
                lower: diff - q_crit * se,
                upper: diff + q_crit * se,
                reject: p_adj < alpha,
            });
        }
    }
    rows
}

/// Dunn's test on mean ranks with tie correction, Holm-adjusted across all pairs.
pub fn dunn(groups: &[Group]) -> Vec<DunnRow> {
    let sorted = sorted_by_name(groups);
    let all: Vec<f64> = sorted.iter().flat_map(|g| g.values.iter().copied()).collect();
    let n = all.len() as f64;
    let (ranks, ties) = rank_with_ties(&all);

    let mut mean_ranks = Vec::with_capacity(sorted.len());
    let mut offset = 0;
    for g in &sorted {
        mean_ranks.push(mean(&ranks[offset..offset + g.len()]));
        offset += g.len();
    }

    let a = n * (n + 1.0) / 12.0;
    let tie_term = tie_sum(&ties) / (12.0 * (n - 1.0));

    let mut rows = Vec::new();
    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            let b = 1.0 / sorted[i].len() as f64 + 1.0 / sorted[j].len() as f64;
            let z = (mean_ranks[i] - mean_ranks[j]).abs() / ((a - tie_term) * b).sqrt();
            rows.push(DunnRow {
                group1: sorted[i].name.clone(),
                group2: sorted[j].name.clone(),
                z,
                p: (2.0 * normal_sf(z)).min(1.0),
                p_adj: None,
            });
        }
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
    for (row, adj) in rows.iter_mut().zip(holm(&raw)) {
        row.p_adj = adj;
    }
    rows
}
