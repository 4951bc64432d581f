use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal_analysis::hmm::optimization_tracker::{OptimizationTracker, TerminationCriterium};
use crate::trace_selection::tools::{compute_mean_and_std, median};

use super::kmeans::k_means_1_d;

pub const GMM_TERMINATION_DEFAULT: TerminationCriterium =
    TerminationCriterium::OneStepConvergenceAbsolute { epsilon: 1e-3, max_iterations: Some(100) };

const KMEANS_MAX_ITERS: usize = 100;
const KMEANS_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    pub weight: f64,
    pub mean: f64,
    pub variance: f64,
}

impl GaussianComponent {
    fn log_density(&self, x: f64) -> f64 {
        -0.5 * (2.0 * std::f64::consts::PI * self.variance).ln() - (x - self.mean).powi(2) / (2.0 * self.variance)
    }
}

/// One-dimensional Gaussian mixture fitted by expectation-maximisation.
///
/// Components are stored in ascending order of their means, so label 0 is
/// always the lowest-intensity group.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture1D {
    components: Vec<GaussianComponent>,
}

impl GaussianMixture1D {
    pub fn fit(data: &[f64], num_components: usize) -> Result<Self, GaussianMixtureError> {
        Self::fit_with(data, num_components, GMM_TERMINATION_DEFAULT)
    }

    pub fn fit_with(
        data: &[f64],
        num_components: usize,
        termination_criterium: TerminationCriterium,
    ) -> Result<Self, GaussianMixtureError> {
        if num_components == 0 {
            return Err(GaussianMixtureError::InvalidNumberOfComponents);
        }
        if data.iter().any(|value| !value.is_finite()) {
            return Err(GaussianMixtureError::NonFiniteData);
        }

        let mut distinct: Vec<f64> = data.to_vec();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();
        if distinct.len() < num_components {
            return Err(GaussianMixtureError::InsufficientData { distinct: distinct.len(), required: num_components });
        }

        let [_, data_std] = compute_mean_and_std(data);
        let variance_floor = (1e-6 * data_std * data_std).max(1e-12);

        // Start from the k-means partition
        let (centers, assignments) = k_means_1_d(data, num_components, KMEANS_MAX_ITERS, KMEANS_TOLERANCE);
        let mut components: Vec<GaussianComponent> = (0..num_components)
            .map(|label| {
                let members: Vec<f64> = data.iter()
                    .zip(&assignments)
                    .filter(|(_, assignment)| **assignment == label)
                    .map(|(&value, _)| value)
                    .collect();
                let [_, std] = compute_mean_and_std(&members);
                GaussianComponent {
                    weight: (members.len().max(1)) as f64 / data.len() as f64,
                    mean: centers[label],
                    variance: if std.is_finite() {(std * std).max(variance_floor)} else {data_std * data_std},
                }
            })
            .collect();
        normalize_weights(&mut components);

        let mut tracker = OptimizationTracker::new(termination_criterium);
        let mut responsibilities = vec![vec![0.0; num_components]; data.len()];

        loop {
            // E step
            let mut total_log_likelihood = 0.0;
            for (i, &x) in data.iter().enumerate() {
                let log_terms: Vec<f64> = components.iter()
                    .map(|component| component.weight.ln() + component.log_density(x))
                    .collect();
                let max_log = log_terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let sum: f64 = log_terms.iter().map(|term| (term - max_log).exp()).sum();

                for (k, term) in log_terms.iter().enumerate() {
                    responsibilities[i][k] = (term - max_log).exp() / sum;
                }
                total_log_likelihood += max_log + sum.ln();
            }

            if !total_log_likelihood.is_finite() {
                return Err(GaussianMixtureError::NonFiniteLikelihood);
            }

            if tracker.step(total_log_likelihood / data.len() as f64) {break}

            // M step
            for (k, component) in components.iter_mut().enumerate() {
                let weight_sum: f64 = responsibilities.iter().map(|resp| resp[k]).sum();
                if !(weight_sum > 0.0) {continue}

                let mean = responsibilities.iter().zip(data)
                    .map(|(resp, x)| resp[k] * x)
                    .sum::<f64>() / weight_sum;
                let variance = responsibilities.iter().zip(data)
                    .map(|(resp, x)| resp[k] * (x - mean).powi(2))
                    .sum::<f64>() / weight_sum;

                component.weight = weight_sum / data.len() as f64;
                component.mean = mean;
                component.variance = variance.max(variance_floor);
            }
            normalize_weights(&mut components);
        }

        components.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        debug!("Gaussian mixture converged after {} iterations: {:?}", tracker.iterations(), components);

        Ok(Self { components })
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    // Label of the most probable component for each value
    pub fn predict(&self, data: &[f64]) -> Vec<usize> {
        data.iter()
            .map(|&x| {
                self.components.iter()
                    .enumerate()
                    .map(|(k, component)| (k, component.weight.ln() + component.log_density(x)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(k, _)| k)
                    .unwrap_or(0)
            })
            .collect()
    }
}

fn normalize_weights(components: &mut [GaussianComponent]) {
    let total: f64 = components.iter().map(|component| component.weight).sum();
    for component in components.iter_mut() {
        component.weight /= total;
    }
}

/// Robust summary of one labelled group: median, population std and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub median: f64,
    pub std: f64,
    pub count: usize,
}

impl ClusterSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let [_, std] = compute_mean_and_std(values);
        Self { median: median(values), std, count: values.len() }
    }
}

// Split data by label and summarize each group
pub fn summarize_groups(data: &[f64], labels: &[usize], num_groups: usize) -> Vec<ClusterSummary> {
    (0..num_groups)
        .map(|group| {
            let members: Vec<f64> = data.iter()
                .zip(labels)
                .filter(|(_, label)| **label == group)
                .map(|(&value, _)| value)
                .collect();
            ClusterSummary::from_values(&members)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GaussianMixtureError {
    #[error("number of components must be positive")]
    InvalidNumberOfComponents,
    #[error("data contains non-finite values")]
    NonFiniteData,
    #[error("{distinct} distinct values cannot support {required} components")]
    InsufficientData { distinct: usize, required: usize },
    #[error("mixture log-likelihood became non-finite")]
    NonFiniteLikelihood,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[test]
    fn test_two_component_fit() {
        let mut rng = StdRng::seed_from_u64(3);
        let low = Normal::new(100.0, 10.0).unwrap();
        let high = Normal::new(300.0, 20.0).unwrap();

        let mut data: Vec<f64> = (0..3000).map(|_| low.sample(&mut rng)).collect();
        data.extend((0..1000).map(|_| high.sample(&mut rng)));

        let gmm = GaussianMixture1D::fit(&data, 2).unwrap();
        let components = gmm.components();

        assert!((components[0].mean - 100.0).abs() < 2.0);
        assert!((components[1].mean - 300.0).abs() < 4.0);
        assert!((components[0].weight - 0.75).abs() < 0.02);
        assert!((components[1].variance.sqrt() - 20.0).abs() < 2.0);

        let labels = gmm.predict(&[90.0, 310.0]);
        assert_eq!(labels, vec![0, 1]);
    }

    #[test]
    fn test_constant_data_rejected() {
        let result = GaussianMixture1D::fit(&[5.0; 10], 2);
        assert_eq!(result, Err(GaussianMixtureError::InsufficientData { distinct: 1, required: 2 }));
    }

    #[test]
    fn test_summarize_groups() {
        let data = [1.0, 2.0, 3.0, 10.0, 12.0];
        let summaries = summarize_groups(&data, &[0, 0, 0, 1, 1], 2);

        assert_eq!(summaries[0].median, 2.0);
        assert_eq!(summaries[0].count, 3);
        assert_eq!(summaries[1].median, 11.0);
        assert!((summaries[1].std - 1.0).abs() < 1e-12);
    }
}
