//! Statistical primitives for proportion comparisons.
//!
//! Chi-square test of independence on a 2x2 contingency table (with
//! Yates continuity correction applied unconditionally) and a
//! normal-approximation confidence interval for the difference in
//! proportions. Pure functions, no allocation.

/// Result of a 2x2 chi-square test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
}

/// Chi-square test of independence for two proportions.
///
/// Table rows are (successes, failures) for control (`n1`, `x1`) and
/// treatment (`n2`, `x2`). Returns `None` for degenerate tables (an
/// empty group, or a zero success/failure column) where the expected
/// frequencies contain zeros and the test is undefined.
pub fn chi_square_2x2(n1: u64, x1: u64, n2: u64, x2: u64) -> Option<ChiSquareResult> {
    if n1 == 0 || n2 == 0 || x1 > n1 || x2 > n2 {
        return None;
    }

    let successes = x1 + x2;
    let failures = (n1 - x1) + (n2 - x2);
    if successes == 0 || failures == 0 {
        // A zero column marginal makes an expected frequency zero
        return None;
    }

    let n1 = n1 as f64;
    let x1 = x1 as f64;
    let n2 = n2 as f64;
    let x2 = x2 as f64;
    let total = n1 + n2;
    let p_pooled = (x1 + x2) / total;

    let observed = [x1, n1 - x1, x2, n2 - x2];
    let expected = [
        n1 * p_pooled,
        n1 * (1.0 - p_pooled),
        n2 * p_pooled,
        n2 * (1.0 - p_pooled),
    ];

    // Yates continuity correction for the 2x2 case
    let statistic: f64 = observed
        .iter()
        .zip(&expected)
        .map(|(o, e)| {
            let diff = ((o - e).abs() - 0.5).max(0.0);
            diff * diff / e
        })
        .sum();

    Some(ChiSquareResult {
        statistic,
        p_value: chi_square_p_value_df1(statistic),
    })
}

/// Upper-tail p-value for the chi-square distribution with df=1.
///
/// For df=1, P(X > x) = erfc(sqrt(x/2)).
pub fn chi_square_p_value_df1(statistic: f64) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    (1.0 - erf((statistic / 2.0).sqrt())).clamp(0.0, 1.0)
}

/// 95% confidence interval for the difference in proportions
/// (treatment minus control): diff +/- 1.96 * SE.
pub fn diff_confidence_interval(n1: u64, x1: u64, n2: u64, x2: u64) -> (f64, f64) {
    if n1 == 0 || n2 == 0 {
        return (0.0, 0.0);
    }

    let p1 = x1 as f64 / n1 as f64;
    let p2 = x2 as f64 / n2 as f64;
    let diff = p2 - p1;

    let se = ((p1 * (1.0 - p1) / n1 as f64) + (p2 * (1.0 - p2) / n2 as f64)).sqrt();
    let margin = 1.96 * se;

    (diff - margin, diff + margin)
}

/// Error function approximation (Abramowitz & Stegun 7.1.26,
/// max error ~1.5e-7)
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
