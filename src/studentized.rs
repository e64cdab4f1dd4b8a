//! Distribution of the studentized range, by Gauss-Legendre quadrature
//! (Copenhaver & Holland, 1988).

use std::f64::consts::LN_2;

use statrs::function::gamma::ln_gamma;

use crate::hypothesis::normal_cdf;

const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

const XLEG: [f64; 6] = [
    0.981560634246719250690549090149,
    0.904117256370474856678465866119,
    0.769902674194304687036893833213,
    0.587317954286617447296702418941,
    0.367831498998180193752691536644,
    0.125233408511468915472441369464,
];
const ALEG: [f64; 6] = [
    0.047175336386511827194615961485,
    0.106939325995318430960254718194,
    0.160078328543346226334652529543,
    0.203167426723065921749064455810,
    0.233492536538354808760849898925,
    0.249147045813402785000562436043,
];

const XLEGQ: [f64; 8] = [
    0.989400934991649932596154173450,
    0.944575023073232576077988415535,
    0.865631202387831743880467897712,
    0.755404408355003033895101194847,
    0.617876244402643748446671764049,
    0.458016777657227386342419442984,
    0.281603550779258913230460501460,
    0.950125098376374401853193354250e-1,
];
const ALEGQ: [f64; 8] = [
    0.271524594117540948517805724560e-1,
    0.622535239386478928628438369944e-1,
    0.951585116824927848099251076022e-1,
    0.124628971255533872052476282192,
    0.149595988816576732081501730547,
    0.169156519395002538189312079030,
    0.182603415044923588866763667969,
    0.189450610455068496285396723208,
];

/// P(range of `cc` standard normals < w), i.e. the infinite-df case.
fn range_prob(w: f64, cc: f64) -> f64 {
    const BB: f64 = 8.0;
    const C1: f64 = -30.0;
    const C2: f64 = -50.0;
    const C3: f64 = 60.0;

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    let mut pr_w = 2.0 * normal_cdf(qsqz) - 1.0;
    pr_w = if pr_w >= (C2 / cc).exp() {
        pr_w.powf(cc)
    } else {
        0.0
    };

    let wincr: f64 = if w > 3.0 { 2.0 } else { 3.0 };
    let mut blb = qsqz;
    let binc = (BB - qsqz) / wincr;
    let mut bub = blb + binc;
    let mut einsum = 0.0;
    let cc1 = cc - 1.0;

    for _ in 0..wincr as usize {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);

        for jj in 0..12 {
            let (j, xx) = if jj >= 6 {
                (11 - jj, XLEG[11 - jj])
            } else {
                (jj, -XLEG[jj])
            };
            let ac = a + b * xx;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }
            let pplus = 2.0 * normal_cdf(ac);
            let pminus = 2.0 * normal_cdf(ac - w);
            let rinsum = pplus * 0.5 - pminus * 0.5;
            if rinsum >= (C1 / cc1).exp() {
                elsum += ALEG[j] * (-(0.5 * qexpo)).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= 2.0 * b * cc / SQRT_2PI;
        einsum += elsum;
        blb = bub;
        bub += binc;
    }

    pr_w += einsum;
    if pr_w <= (C1 / 1.0f64).exp() {
        return 0.0;
    }
    pr_w.min(1.0)
}

/// CDF of the studentized range for `k` means and `df` degrees of freedom.
pub fn ptukey(q: f64, k: usize, df: f64) -> f64 {
    if q.is_nan() || df < 2.0 || k < 2 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    let cc = k as f64;
    if df > 25000.0 {
        return range_prob(q, cc);
    }

    let f2 = df * 0.5;
    let mut f2lf = f2 * df.ln() - df * LN_2 - ln_gamma(f2);
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;
    let ulen: f64 = if df <= 100.0 {
        1.0
    } else if df <= 800.0 {
        0.5
    } else if df <= 5000.0 {
        0.25
    } else {
        0.125
    };
    f2lf += ulen.ln();

    let mut ans = 0.0;
    for i in 1..=50 {
        let mut otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;

        for jj in 0..16 {
            let (j, upper) = if jj >= 8 { (jj - 8, true) } else { (jj, false) };
            let offset = XLEGQ[j] * ulen;
            let t1 = if upper {
                f2lf + f21 * (twa1 + offset).ln() - (offset + twa1) * ff4
            } else {
                f2lf + f21 * (twa1 - offset).ln() + (offset - twa1) * ff4
            };
            if t1 >= -30.0 {
                let qsqz = if upper {
                    q * ((offset + twa1) * 0.5).sqrt()
                } else {
                    q * ((twa1 - offset) * 0.5).sqrt()
                };
                otsum += range_prob(qsqz, cc) * ALEGQ[j] * t1.exp();
            }
        }

        if i as f64 * ulen >= 1.0 && otsum <= 1e-14 {
            break;
        }
        ans += otsum;
    }
    ans.min(1.0)
}

/// Quantile of the studentized range, by bisection on `ptukey`.
pub fn qtukey(p: f64, k: usize, df: f64) -> f64 {
    if !(0.0..1.0).contains(&p) || df < 2.0 || k < 2 {
        return f64::NAN;
    }
    let mut lo = 0.0;
    let mut hi = 1.0;
    while ptukey(hi, k, df) < p && hi < 1e4 {
        lo = hi;
        hi *= 2.0;
    }
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        if ptukey(mid, k, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-10 {
            break;
        }
    }
    0.5 * (lo + hi)
}
