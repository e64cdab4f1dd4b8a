//! Hypothesis tests used by the group comparisons.
//!
//! All tests return NaN p-values rather than failing when their inputs are
//! degenerate (for example, zero variance everywhere); callers decide how an
//! undefined result is reported.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchResult {
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased (n - 1) variance
pub fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

pub fn median(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let n = v.len();
    if n == 0 {
        f64::NAN
    } else if n % 2 == 0 {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    } else {
        v[n / 2]
    }
}

/// Average ranks (1-based) of `values`, plus the size of every tie block.
pub fn rank_with_ties(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg_rank;
        }
        ties.push(j - i);
        i = j;
    }
    (ranks, ties)
}

/// Sum of t^3 - t over tie blocks
pub fn tie_sum(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

/// Upper tail of the standard normal
pub fn normal_sf(z: f64) -> f64 {
    if z.is_nan() {
        f64::NAN
    } else if z == f64::INFINITY {
        0.0
    } else if z == f64::NEG_INFINITY {
        1.0
    } else {
        Normal::new(0.0, 1.0).map(|n| n.sf(z)).unwrap_or(f64::NAN)
    }
}

pub fn normal_cdf(z: f64) -> f64 {
    1.0 - normal_sf(z)
}

fn normal_ppf(p: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(p))
        .unwrap_or(f64::NAN)
}

fn f_sf(f: f64, d1: f64, d2: f64) -> f64 {
    if f.is_nan() {
        return f64::NAN;
    }
    if f == f64::INFINITY {
        return 0.0;
    }
    FisherSnedecor::new(d1, d2)
        .map(|d| d.sf(f.max(0.0)))
        .unwrap_or(f64::NAN)
}

fn chi2_sf(x: f64, df: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x == f64::INFINITY {
        return 0.0;
    }
    ChiSquared::new(df)
        .map(|d| d.sf(x.max(0.0)))
        .unwrap_or(f64::NAN)
}

fn t_sf(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() {
        return f64::NAN;
    }
    if t == f64::INFINITY {
        return 0.0;
    }
    StudentsT::new(0.0, 1.0, df)
        .map(|d| d.sf(t))
        .unwrap_or(f64::NAN)
}

/// Horner evaluation of cc[0] + cc[1] x + ...
fn poly(cc: &[f64], x: f64) -> f64 {
    cc.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

const SW_C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const SW_C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const SW_C3: [f64; 4] = [0.544, -0.39978, 0.025054, -6.714e-4];
const SW_C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const SW_C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const SW_C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const SW_G: [f64; 2] = [-2.273, 0.459];

/// Royston's approximation of the Shapiro-Wilk coefficients for the upper half
/// of the order statistics.
fn shapiro_coefficients(n: usize) -> Vec<f64> {
    if n == 3 {
        return vec![FRAC_1_SQRT_2];
    }
    let an25 = n as f64 + 0.25;
    let mut a: Vec<f64> = (1..=n / 2)
        .map(|i| normal_ppf((i as f64 - 0.375) / an25))
        .collect();

    let summ2 = 2.0 * a.iter().map(|m| m * m).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();
    let a1 = poly(&SW_C1, rsn) - a[0] / ssumm2;

    let (first_scaled, fac) = if n > 5 {
        let a2 = -a[1] / ssumm2 + poly(&SW_C2, rsn);
        let fac = ((summ2 - 2.0 * a[0] * a[0] - 2.0 * a[1] * a[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        a[1] = a2;
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * a[0] * a[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };
    a[0] = a1;
    for c in a.iter_mut().skip(first_scaled) {
        *c /= -fac;
    }
    a
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    if n == 3 {
        let p = 6.0 / PI * (w.sqrt().asin() - PI / 3.0);
        return p.clamp(0.0, 1.0);
    }
    let an = n as f64;
    let mut w1 = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&SW_G, an);
        if w1 >= gamma {
            return 1e-99;
        }
        w1 = -(gamma - w1).ln();
        (poly(&SW_C3, an), poly(&SW_C4, an).exp())
    } else {
        let xx = an.ln();
        (poly(&SW_C5, xx), poly(&SW_C6, xx).exp())
    };
    normal_sf((w1 - m) / s)
}

/// Shapiro-Wilk normality test. `None` outside 3 <= n <= 5000, where the
/// approximation does not apply. A constant sample gives W = 1, p = 1.
pub fn shapiro_wilk(values: &[f64]) -> Option<TestResult> {
    let n = values.len();
    if !(3..=5000).contains(&n) {
        return None;
    }
    let mut x = values.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));

    let range = x[n - 1] - x[0];
    if range <= 0.0 {
        return Some(TestResult {
            statistic: 1.0,
            p_value: 1.0,
        });
    }

    let a = shapiro_coefficients(n);
    // scale by the range to keep the sums well conditioned
    let scaled: Vec<f64> = x.iter().map(|v| v / range).collect();
    let m = mean(&scaled);
    let ssq: f64 = scaled.iter().map(|v| (v - m).powi(2)).sum();
    let numer: f64 = a
        .iter()
        .enumerate()
        .map(|(i, c)| c * (scaled[n - 1 - i] - scaled[i]))
        .sum();
    let w = (numer * numer / ssq).min(1.0);

    Some(TestResult {
        statistic: w,
        p_value: shapiro_p_value(w, n),
    })
}

/// Brown-Forsythe variant of Levene's test (deviations from group medians).
pub fn levene_median(groups: &[&[f64]]) -> TestResult {
    let k = groups.len() as f64;
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    let n = n_total as f64;

    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let med = median(g);
            g.iter().map(|v| (v - med).abs()).collect()
        })
        .collect();
    let group_means: Vec<f64> = deviations.iter().map(|z| mean(z)).collect();
    let grand_mean = deviations.iter().flatten().sum::<f64>() / n;

    let between: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.len() as f64 * (zm - grand_mean).powi(2))
        .sum();
    let within: f64 = deviations
        .iter()
        .zip(&group_means)
        .map(|(z, zm)| z.iter().map(|v| (v - zm).powi(2)).sum::<f64>())
        .sum();

    let statistic = (n - k) / (k - 1.0) * between / within;
    TestResult {
        statistic,
        p_value: f_sf(statistic, k - 1.0, n - k),
    }
}

/// One-way ANOVA F test.
pub fn one_way_anova(groups: &[&[f64]]) -> TestResult {
    let k = groups.len() as f64;
    let n: f64 = groups.iter().map(|g| g.len() as f64).sum();
    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n;

    let ss_between: f64 = groups
        .iter()
        .map(|g| g.len() as f64 * (mean(g) - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .map(|g| {
            let m = mean(g);
            g.iter().map(|v| (v - m).powi(2)).sum::<f64>()
        })
        .sum();

    let statistic = (ss_between / (k - 1.0)) / (ss_within / (n - k));
    TestResult {
        statistic,
        p_value: f_sf(statistic, k - 1.0, n - k),
    }
}

/// Kruskal-Wallis H test with tie correction.
pub fn kruskal_wallis(groups: &[&[f64]]) -> TestResult {
    let all: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = all.len() as f64;
    let (ranks, ties) = rank_with_ties(&all);

    let mut offset = 0;
    let mut h = 0.0;
    for g in groups {
        let rank_sum: f64 = ranks[offset..offset + g.len()].iter().sum();
        h += rank_sum * rank_sum / g.len() as f64;
        offset += g.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_sum(&ties) / (n * n * n - n);
    let statistic = if correction > 0.0 { h / correction } else { f64::NAN };
    TestResult {
        statistic,
        p_value: chi2_sf(statistic, groups.len() as f64 - 1.0),
    }
}

/// Two-sided Welch t-test (unequal variances). Non-finite values are omitted.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> WelchResult {
    let a: Vec<f64> = a.iter().copied().filter(|v| v.is_finite()).collect();
    let b: Vec<f64> = b.iter().copied().filter(|v| v.is_finite()).collect();
    let (n1, n2) = (a.len() as f64, b.len() as f64);

    let se1 = sample_variance(&a) / n1;
    let se2 = sample_variance(&b) / n2;
    let se = (se1 + se2).sqrt();
    let t = (mean(&a) - mean(&b)) / se;
    let df = (se1 + se2).powi(2) / (se1 * se1 / (n1 - 1.0) + se2 * se2 / (n2 - 1.0));

    WelchResult {
        t,
        df,
        p_value: (2.0 * t_sf(t.abs(), df)).min(1.0),
    }
}

/// C(m + n, m), or `None` when it does not fit in an i128
fn binomial(m: usize, n: usize) -> Option<i128> {
    let mut c: i128 = 1;
    for i in 1..=m.min(n) {
        // c * (k + i) / i stays integral at every step
        c = c.checked_mul((m.max(n) + i) as i128)? / i as i128;
    }
    Some(c)
}

/// Coefficients of the Gaussian binomial [m + n choose m]: entry u counts the
/// arrangements whose Mann-Whitney U equals u.
fn mann_whitney_counts(m: usize, n: usize) -> Option<Vec<i128>> {
    let max_u = m * n;
    let mut counts = vec![0i128; max_u + 1];
    counts[0] = 1;
    for i in 1..=m {
        // multiply by (1 - q^(n + i)), then divide by (1 - q^i)
        let shift = n + i;
        for k in (shift..=max_u).rev() {
            counts[k] = counts[k].checked_sub(counts[k - shift])?;
        }
        for k in i..=max_u {
            counts[k] = counts[k].checked_add(counts[k - i])?;
        }
    }
    Some(counts)
}

/// P(U >= u) under the null for samples of size m and n. `None` when the
/// permutation counts overflow, so the caller falls back to the normal
/// approximation.
fn mann_whitney_exact_sf(u: f64, m: usize, n: usize) -> Option<f64> {
    let total = binomial(m, n)?;
    let counts = mann_whitney_counts(m.min(n), m.max(n))?;
    let start = u.ceil().max(0.0) as usize;
    let upper = counts
        .iter()
        .skip(start)
        .try_fold(0i128, |acc, &c| acc.checked_add(c))?;
    Some(upper as f64 / total as f64)
}

/// Two-sided Mann-Whitney U test. The statistic is U for `x`.
///
/// Exact p-values are used when there are no ties and at least one sample has
/// at most 8 values; otherwise the tie-corrected normal approximation with
/// continuity correction.
pub fn mann_whitney_u(x: &[f64], y: &[f64]) -> TestResult {
    let (n1, n2) = (x.len(), y.len());
    let combined: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, ties) = rank_with_ties(&combined);

    let r1: f64 = ranks[..n1].iter().sum();
    let (f1, f2) = (n1 as f64, n2 as f64);
    let u1 = r1 - f1 * (f1 + 1.0) / 2.0;
    let u2 = f1 * f2 - u1;
    let u = u1.max(u2);

    let has_ties = ties.iter().any(|&t| t > 1);
    let exact = if (n1 <= 8 || n2 <= 8) && !has_ties {
        mann_whitney_exact_sf(u, n1, n2)
    } else {
        None
    };
    let p = if let Some(sf) = exact {
        2.0 * sf
    } else {
        let n = f1 + f2;
        let mu = f1 * f2 / 2.0;
        let sigma = (f1 * f2 / 12.0 * ((n + 1.0) - tie_sum(&ties) / (n * (n - 1.0)))).sqrt();
        let z = (u - mu - 0.5) / sigma;
        2.0 * normal_sf(z)
    };

    TestResult {
        statistic: u1,
        p_value: p.clamp(0.0, 1.0),
    }
}
