use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::events::CensoringClass;
use super::survival::log_likelihood;
use crate::optimization::golden_section::GoldenSection;
use crate::optimization::optimizer::Optimizer;

// Relative step of the second difference used for the observed information
const INFORMATION_STEP: f64 = 0.01;

// Below this k*T the likelihood is flat in k and the optimum sits on the k = 0 boundary
const MIN_RATE_WINDOW_PRODUCT: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateEstimate {
    pub rate: f64,
    pub standard_error: f64,
    pub sample_count: usize,
}

impl RateEstimate {
    pub fn undefined(sample_count: usize) -> Self {
        Self { rate: f64::NAN, standard_error: f64::NAN, sample_count }
    }

    pub fn is_defined(&self) -> bool {
        self.rate.is_finite() && self.rate > 0.0
    }

    // Mean lifetime 1/k in seconds
    pub fn time_constant(&self) -> f64 {
        1.0 / self.rate
    }

    pub fn time_constant_error(&self) -> f64 {
        self.standard_error / (self.rate * self.rate)
    }
}

/// Observed Fisher information at `rate`, from a central second difference
/// of the log-likelihood with step `rate / 100`.
pub fn fisher_information(rate: f64, window: f64, samples: &[f64], class: CensoringClass) -> f64 {
    let dk = rate * INFORMATION_STEP;
    let centre = log_likelihood(rate, window, samples, class);
    let above = log_likelihood(rate + dk, window, samples, class);
    let below = log_likelihood(rate - dk, window, samples, class);

    (above + below - 2.0 * centre).abs() / (dk * dk)
}

/// Maximum-likelihood rate for one class of durations observed through a
/// window of length `window`.
///
/// The search runs over `ln k` starting from `1 / mean(samples)`. An empty
/// sample, a failed search, or an optimum that is not interior gives an
/// undefined estimate. The last case is a rate pushed towards zero
/// (`k * window` below 1e-3) or an error that is not finite and positive.
pub fn estimate_rate(window: f64, samples: &[f64], class: CensoringClass) -> RateEstimate {
    let sample_count = samples.len();
    if sample_count == 0 || !(window > 0.0) {
        return RateEstimate::undefined(sample_count);
    }

    let mean = samples.iter().sum::<f64>() / sample_count as f64;
    let initial_rate = 1.0 / mean;

    let mut search = GoldenSection::new(|log_rate: f64| log_likelihood(log_rate.exp(), window, samples, class));
    let outcome = search.set_initial_value(initial_rate.ln()).and_then(|_| search.run());

    if let Err(error) = outcome {
        warn!("Rate search failed for class {} ({} samples): {}", class.number(), sample_count, error);
        return RateEstimate::undefined(sample_count);
    }

    let rate = match search.get_best_solution() {
        Some((log_rate, fitness)) if fitness.is_finite() => log_rate.exp(),
        _ => f64::NAN,
    };
    if !(rate.is_finite() && rate > 0.0) {
        warn!("Rate search for class {} ended on a non-finite rate", class.number());
        return RateEstimate::undefined(sample_count);
    }

    if rate * window < MIN_RATE_WINDOW_PRODUCT {
        warn!(
            "Class {} rate search ran to the k = 0 boundary (k = {:e}, mean duration {:.3} of window {:.3}), discarding",
            class.number(), rate, mean, window
        );
        return RateEstimate::undefined(sample_count);
    }

    let information = fisher_information(rate, window, samples, class);
    let standard_error = information.powf(-0.5);
    if !(standard_error.is_finite() && standard_error > 0.0) {
        warn!("Class {} estimate k = {:.4} has no usable error ({}), discarding", class.number(), rate, standard_error);
        return RateEstimate::undefined(sample_count);
    }

    debug!(
        "Class {} estimate: k = {:.4} +/- {:.4} from {} samples ({} search steps)",
        class.number(), rate, standard_error, sample_count, search.get_iterations()
    );

    RateEstimate { rate, standard_error, sample_count }
}
