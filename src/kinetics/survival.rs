/********** Censored single-exponential model **********
* An exponential process with rate k observed through a window of length T.
* Intervals cut by one window edge (class 1 and 3) follow the truncated
* exponential. Complete intervals (class 2) carry an extra factor (T - t)
* because a longer interval has fewer positions where it fits in the window.
**********/

use super::events::CensoringClass;

// 1 - e^{-kT}
fn truncation_mass(rate: f64, window: f64) -> f64 {
    -(-rate * window).exp_m1()
}

// kT - 1 + e^{-kT}
fn complete_norm(rate: f64, window: f64) -> f64 {
    rate * window + (-rate * window).exp_m1()
}

pub fn pdf(rate: f64, window: f64, t: f64, class: CensoringClass) -> f64 {
    match class {
        CensoringClass::Complete => {
            rate * (rate * window - rate * t) * (-rate * t).exp() / complete_norm(rate, window)
        }
        _ => rate * (-rate * t).exp() / truncation_mass(rate, window),
    }
}

/// Probability that an interval of this class lasts at least `t`.
pub fn survival(rate: f64, window: f64, t: f64, class: CensoringClass) -> f64 {
    match class {
        CensoringClass::Complete => {
            let a = rate * window - 1.0;
            1.0 - ((-rate * t).exp() * (rate * t - a) + a) / ((-rate * window).exp() + a)
        }
        _ => ((-rate * t).exp() - (-rate * window).exp()) / truncation_mass(rate, window),
    }
}

/// Log-likelihood of a sample of durations.
///
/// The rate enters through its absolute value, so the function is symmetric
/// in the sign of `rate`.
pub fn log_likelihood(rate: f64, window: f64, samples: &[f64], class: CensoringClass) -> f64 {
    let k = rate.abs();

    match class {
        CensoringClass::Complete => {
            let log_norm = complete_norm(k, window).ln();
            samples.iter()
                .map(|&t| (k * window - k * t).ln() - log_norm + k.ln() - k * t)
                .sum()
        }
        _ => {
            let log_mass = truncation_mass(k, window).ln();
            samples.iter()
                .map(|&t| k.ln() - k * t - log_mass)
                .sum()
        }
    }
}

/// Fraction of samples at least as long as each grid point `0, dt, 2dt, ...`
/// up to the longest sample.
pub fn empirical_survival(samples: &[f64], dt: f64) -> (Vec<f64>, Vec<f64>) {
    if samples.is_empty() || !(dt > 0.0) {
        return (Vec::new(), Vec::new());
    }

    let longest = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let num_points = (longest / dt).floor() as usize + 1;
    let n = samples.len() as f64;

    let grid: Vec<f64> = (0..num_points).map(|i| i as f64 * dt).collect();
    let fractions: Vec<f64> = (0..num_points)
        .map(|i| samples.iter().filter(|&&t| i as f64 <= t / dt).count() as f64 / n)
        .collect();

    (grid, fractions)
}

pub fn model_survival_curve(rate: f64, window: f64, grid: &[f64], class: CensoringClass) -> Vec<f64> {
    grid.iter().map(|&t| survival(rate, window, t, class)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Composite Simpson rule
    fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
        let h = (b - a) / intervals as f64;
        let mut sum = f(a) + f(b);
        for i in 1..intervals {
            let weight = if i % 2 == 1 {4.0} else {2.0};
            sum += weight * f(a + i as f64 * h);
        }
        sum * h / 3.0
    }

    #[test]
    fn test_pdf_normalized() {
        for &(rate, window) in &[(0.1, 5.0), (1.0, 10.0), (2.5, 3.0), (0.01, 50.0)] {
            for class in CensoringClass::ALL {
                let total = integrate(|t| pdf(rate, window, t, class), 0.0, window, 10_000);
                assert!((total - 1.0).abs() < 1e-8, "class {:?}, k = {}, T = {}: {}", class, rate, window, total);
            }
        }
    }

    #[test]
    fn test_survival_boundaries() {
        for &(rate, window) in &[(0.1, 5.0), (1.0, 10.0), (3.0, 2.0)] {
            for class in CensoringClass::ALL {
                assert!((survival(rate, window, 0.0, class) - 1.0).abs() < 1e-12);
                assert!(survival(rate, window, window, class).abs() < 1e-12);
            }
        }
    }

    // Survival is one minus the integrated density
    #[test]
    fn test_survival_matches_pdf() {
        let (rate, window, t) = (0.4, 8.0, 3.0);
        for class in CensoringClass::ALL {
            let mass = integrate(|s| pdf(rate, window, s, class), 0.0, t, 10_000);
            assert!((survival(rate, window, t, class) - (1.0 - mass)).abs() < 1e-8);
        }
    }

    #[test]
    fn test_log_likelihood_sign_symmetric() {
        let samples = [0.5, 1.2, 3.3, 0.1];
        for class in CensoringClass::ALL {
            let positive = log_likelihood(0.7, 6.0, &samples, class);
            let negative = log_likelihood(-0.7, 6.0, &samples, class);
            assert_eq!(positive, negative);

            let direct: f64 = samples.iter().map(|&t| pdf(0.7, 6.0, t, class).ln()).sum();
            assert!((positive - direct).abs() < 1e-10);
        }
    }

    #[test]
    fn test_empirical_survival() {
        let (grid, fractions) = empirical_survival(&[1.0, 2.0, 2.0, 4.0], 1.0);
        assert_eq!(grid, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(fractions, vec![1.0, 1.0, 0.75, 0.25, 0.25]);

        let (grid, fractions) = empirical_survival(&[], 1.0);
        assert!(grid.is_empty() && fractions.is_empty());
    }

    #[test]
    fn test_model_curve_decreasing() {
        let grid: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        for class in CensoringClass::ALL {
            let curve = model_survival_curve(0.3, 10.0, &grid, class);
            assert!(curve.windows(2).all(|pair| pair[1] <= pair[0] + 1e-15));
        }
    }
}
