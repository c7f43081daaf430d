//! Statistical analysis over per-fold metric samples.
//!
//! The Student-t machinery is computed in-crate: the CDF goes through the
//! regularized incomplete beta function (continued-fraction form) and the
//! critical value is recovered by bisection. Everything is deterministic.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mean, spread and confidence interval of one metric's samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Number of samples.
    pub n: usize,
    /// Sample mean.
    pub mean: f64,
    /// Sample standard deviation (n-1 denominator); 0.0 for n < 2.
    pub std_dev: f64,
    /// Standard error of the mean; 0.0 for n < 2.
    pub std_error: f64,
    /// Two-sided `(1 - alpha)` confidence interval.
    ///
    /// `None` (not zero) when fewer than two samples exist.
    pub confidence_interval: Option<(f64, f64)>,
}

/// Result of an independent two-sample t-test between two models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// The t statistic (pooled variance, `n1 + n2 - 2` df).
    pub t_statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Whether `p_value < alpha`.
    pub significant: bool,
    /// Effect size: `|m1 - m2| / sqrt((v1 + v2) / 2)`.
    pub effect_size: f64,
    /// Degrees of freedom used.
    pub degrees_of_freedom: usize,
}

/// Summarize a metric sample vector at significance level `alpha`.
pub fn summarize(samples: &[f64], alpha: f64) -> SampleSummary {
    let n = samples.len();
    let mean = mean(samples);
    if n < 2 {
        return SampleSummary {
            n,
            mean,
            std_dev: 0.0,
            std_error: 0.0,
            confidence_interval: None,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    let std_dev = variance(samples, mean).sqrt();
    let std_error = std_dev / nf.sqrt();
    let critical = t_critical(n - 1, alpha);
    let half_width = critical * std_error;

    SampleSummary {
        n,
        mean,
        std_dev,
        std_error,
        confidence_interval: Some((mean - half_width, mean + half_width)),
    }
}

/// Independent two-sample t-test (pooled variance) between two models'
/// metric samples. Each side needs at least two samples.
pub fn t_test(a: &[f64], b: &[f64], alpha: f64) -> Result<TTestResult> {
    for samples in [a, b] {
        if samples.len() < 2 {
            return Err(Error::InsufficientSamples {
                operation: "two-sample t-test",
                needed: 2,
                got: samples.len(),
            });
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a), mean(b));
    let (v1, v2) = (variance(a, m1), variance(b, m2));

    let df = a.len() + b.len() - 2;
    #[allow(clippy::cast_precision_loss)]
    let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df as f64;
    let std_error = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();

    // Identical constant samples: no variance, no evidence either way.
    let t_statistic = if std_error > 0.0 {
        (m1 - m2) / std_error
    } else if (m1 - m2).abs() > 0.0 {
        f64::INFINITY * (m1 - m2).signum()
    } else {
        0.0
    };

    let p_value = two_sided_p(t_statistic, df);
    let spread = ((v1 + v2) / 2.0).sqrt();
    let effect_size = if spread > 0.0 {
        (m1 - m2).abs() / spread
    } else {
        0.0
    };

    Ok(TTestResult {
        t_statistic,
        p_value,
        significant: p_value < alpha,
        effect_size,
        degrees_of_freedom: df,
    })
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    samples.iter().sum::<f64>() / n
}

/// Sample variance with n-1 denominator. Caller guarantees n >= 2.
fn variance(samples: &[f64], mean: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

/// Two-sided p-value for a t statistic with the given degrees of freedom.
///
/// `P(|T| >= |t|) = I_{df / (df + t^2)}(df/2, 1/2)`.
fn two_sided_p(t: f64, df: usize) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let dff = df as f64;
    let x = dff / (dff + t * t);
    regularized_incomplete_beta(dff / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Two-sided critical value: t such that `P(|T| >= t) = alpha`.
///
/// Bisection on the monotone p-value; 64 iterations pin the root far
/// below the precision any reported interval needs.
fn t_critical(df: usize, alpha: f64) -> f64 {
    let mut low = 0.0;
    let mut high = 1000.0;
    for _ in 0..64 {
        let mid = (low + high) / 2.0;
        if two_sided_p(mid, df) > alpha {
            low = mid;
        } else {
            high = mid;
        }
    }
    (low + high) / 2.0
}

/// Regularized incomplete beta function `I_x(a, b)`.
///
/// Continued-fraction evaluation in the convergent region, with the
/// symmetry transform `I_x(a,b) = 1 - I_{1-x}(b,a)` otherwise.
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz's algorithm for the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 1e-15;
    const TINY: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut result = d;

    for m in 1..=MAX_ITERATIONS {
        #[allow(clippy::cast_precision_loss)]
        let mf = m as f64;

        // Even step.
        let numerator = mf * (b - mf) * x / ((qam + 2.0 * mf) * (a + 2.0 * mf));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        result *= d * c;

        // Odd step.
        let numerator = -(a + mf) * (qab + mf) * x / ((a + 2.0 * mf) * (qap + 2.0 * mf));
        d = 1.0 + numerator * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + numerator / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        result *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    result
}

/// Natural log of the gamma function (Lanczos approximation, g = 7).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula.
        return std::f64::consts::PI.ln()
            - (std::f64::consts::PI * x).sin().ln()
            - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &coefficient) in COEFFICIENTS.iter().enumerate().skip(1) {
        #[allow(clippy::cast_precision_loss)]
        let if64 = i as f64;
        sum += coefficient / (x + if64);
    }

    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}
