use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hmm::baum_welch::{BaumWelch, BaumWelchError};
use super::hmm::initialization::gaussian_mixture::{summarize_groups, ClusterSummary, GaussianMixture1D, GaussianMixtureError};
use super::hmm::optimization_tracker::TerminationCriterium;
use super::hmm::viterbi::{Viterbi, ViterbiError};
use super::hmm::*;
use crate::trace_selection::filter::{is_inlier, FilterTest};
use crate::trace_selection::individual_trace::IntensityTrace;
use crate::trace_selection::tools::*;

const VARIANCE_FLOOR_FRACTION: f64 = 1e-3;
const MIN_VARIANCE_FLOOR: f64 = 1e-12;

/// Intensity statistics pooled over every trace of one experiment.
///
/// Computed once, before any trace is segmented, and shared read-only by
/// all segmentation calls. Cluster 0 is always the lower-intensity group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationContext {
    pub unbound: ClusterSummary,
    pub bound: ClusterSummary,
    pub pooled_variance: f64,
}

impl PopulationContext {
    pub fn from_traces(traces: &[IntensityTrace]) -> Result<Self, SegmentationError> {
        let pooled: Vec<f64> = traces.iter().flat_map(|trace| trace.get_values().iter().copied()).collect();

        let gmm = GaussianMixture1D::fit(&pooled, 2).map_err(|error| SegmentationError::PopulationClustering { error })?;
        let labels = gmm.predict(&pooled);
        let mut groups = summarize_groups(&pooled, &labels, 2);

        // A component that wins no sample keeps its mixture parameters
        for (group, component) in groups.iter_mut().zip(gmm.components()) {
            if group.count == 0 {
                group.median = component.mean;
                group.std = component.variance.sqrt();
            }
        }

        let [_, pooled_std] = compute_mean_and_std(&pooled);
        let context = Self { unbound: groups[0], bound: groups[1], pooled_variance: pooled_std * pooled_std };

        info!(
            "Pooled {} intensity samples: unbound median {:.2} (n = {}), bound median {:.2} (n = {})",
            pooled.len(), context.unbound.median, context.unbound.count, context.bound.median, context.bound.count
        );

        Ok(context)
    }

    pub fn variance_floor(&self) -> f64 {
        (VARIANCE_FLOOR_FRACTION * self.pooled_variance).max(MIN_VARIANCE_FLOOR)
    }

    pub fn initial_states(&self) -> Result<Vec<State>, SegmentationError> {
        let floor = self.variance_floor();

        [self.unbound, self.bound].iter()
            .enumerate()
            .map(|(id, cluster)| {
                State::from_variance(id, cluster.median, (cluster.std * cluster.std).max(floor))
                    .map_err(|error| SegmentationError::InvalidInitialState { error })
            })
            .collect()
    }

    pub fn initial_start_matrix(&self) -> StartMatrix {
        StartMatrix::from_counts(&[self.unbound.count, self.bound.count])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSettings {
    pub max_iterations: u32,
    pub stay_unbound: f64,
    pub stay_bound: f64,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        Self { max_iterations: 100, stay_unbound: 0.98, stay_bound: 0.80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityCutoffs {
    pub rmsd: f64,
    pub unbound: f64,
    pub bound: f64,
}

/// Two-state fit of one trace before the population outlier test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFit {
    pub state_sequence: Vec<usize>,
    pub fit_trace: Vec<f64>,
    pub unbound_mean: f64,
    pub bound_mean: f64,
    pub rmsd: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub state_sequence: Vec<usize>,
    pub fit_trace: Vec<f64>,
    pub unbound_mean: f64,
    pub bound_mean: f64,
    pub rmsd: f64,
    pub is_inlier: bool,
    pub failed_tests: Vec<FilterTest>,
}

pub struct TraceSegmenter {
    baum_welch: BaumWelch,
    initial_states: Vec<State>,
    initial_start_matrix: StartMatrix,
    initial_transition_matrix: TransitionMatrix,
}

impl TraceSegmenter {
    pub fn new(context: &PopulationContext, settings: &SegmentSettings) -> Result<Self, SegmentationError> {
        let initial_states = context.initial_states()?;
        let initial_start_matrix = context.initial_start_matrix();
        let initial_transition_matrix = TransitionMatrix::persistent_two_state(settings.stay_unbound, settings.stay_bound);

        let mut baum_welch = BaumWelch::new(2);
        baum_welch.set_termination_criterium(TerminationCriterium::OneStepConvergenceAbsolute {
            epsilon: 1e-2,
            max_iterations: Some(settings.max_iterations),
        });
        let wrap = |error| SegmentationError::InvalidSetup { error };
        baum_welch.set_variance_floor(context.variance_floor()).map_err(wrap)?;
        baum_welch.set_initial_states(initial_states.clone()).map_err(wrap)?;
        baum_welch.set_initial_start_matrix(initial_start_matrix.clone()).map_err(wrap)?;
        baum_welch.set_initial_transition_matrix(initial_transition_matrix.clone()).map_err(wrap)?;

        Ok(Self { baum_welch, initial_states, initial_start_matrix, initial_transition_matrix })
    }

    pub fn fit(&self, trace: &IntensityTrace) -> Result<TraceFit, SegmentationError> {
        let values = trace.get_values();

        let trained = match self.baum_welch.run_optimization(values) {
            Ok(output) => Some((output.states, output.start_matrix, output.transition_matrix)),
            Err(error) => {
                warn!("Baum-Welch failed on a trace of {} frames ({}), decoding with initial parameters", values.len(), error);
                None
            }
        };

        self.decode(values, trained)
    }

    // Training or decoding failures fall back to the population initialisation
    fn decode(&self, values: &[f64], trained: Option<(Vec<State>, StartMatrix, TransitionMatrix)>) -> Result<TraceFit, SegmentationError> {
        if let Some((states, start_matrix, transition_matrix)) = trained {
            match Viterbi::new(&states, &start_matrix, &transition_matrix).run(values) {
                Ok(raw_sequence) => return Ok(canonical_fit(values, raw_sequence, states[0].value, states[1].value, true)),
                Err(error) => warn!(
                    "Decoding with trained parameters failed on a trace of {} frames ({}), using initial parameters",
                    values.len(), error
                ),
            }
        }

        let viterbi = Viterbi::new(&self.initial_states, &self.initial_start_matrix, &self.initial_transition_matrix);
        let raw_sequence = viterbi.run(values).map_err(|error| SegmentationError::Decoding { error })?;

        Ok(canonical_fit(values, raw_sequence, self.initial_states[0].value, self.initial_states[1].value, false))
    }

    pub fn fit_all(&self, traces: &[IntensityTrace]) -> Result<Vec<TraceFit>, SegmentationError> {
        let fits: Vec<TraceFit> = traces.par_iter()
            .map(|trace| self.fit(trace))
            .collect::<Result<Vec<_>, _>>()?;

        let not_converged = fits.iter().filter(|fit| !fit.converged).count();
        if not_converged > 0 {
            warn!("{} of {} traces kept their initial HMM parameters", not_converged, fits.len());
        }

        Ok(fits)
    }

    // Fit every trace, then flag outliers against the whole population
    pub fn segment_all(&self, traces: &[IntensityTrace], cutoffs: &QualityCutoffs) -> Result<Vec<SegmentationResult>, SegmentationError> {
        let fits = self.fit_all(traces)?;

        Ok(classify_inliers(fits, cutoffs))
    }
}

// State 0 is relabelled to the lower mean
fn canonical_fit(values: &[f64], raw_sequence: Vec<usize>, mean_0: f64, mean_1: f64, converged: bool) -> TraceFit {
    let swap = mean_0 > mean_1;
    let (unbound_mean, bound_mean) = if swap {(mean_1, mean_0)} else {(mean_0, mean_1)};

    let state_sequence: Vec<usize> = if swap {
        raw_sequence.into_iter().map(|state| 1 - state).collect()
    } else {
        raw_sequence
    };

    let fit_trace: Vec<f64> = state_sequence.iter()
        .map(|&state| if state == 0 {unbound_mean} else {bound_mean})
        .collect();
    let rmsd = root_mean_square_deviation(values, &fit_trace);

    TraceFit { state_sequence, fit_trace, unbound_mean, bound_mean, rmsd, converged }
}

/// Population-level quality test over all fits of one experiment.
///
/// A trace is kept only if its rmsd, unbound mean and bound mean each pass
/// the median-absolute-deviation test with their own cutoff.
pub fn classify_inliers(fits: Vec<TraceFit>, cutoffs: &QualityCutoffs) -> Vec<SegmentationResult> {
    let rmsds: Vec<f64> = fits.iter().map(|fit| fit.rmsd).collect();
    let unbound_means: Vec<f64> = fits.iter().map(|fit| fit.unbound_mean).collect();
    let bound_means: Vec<f64> = fits.iter().map(|fit| fit.bound_mean).collect();

    let rmsd_ok = is_inlier(&rmsds, cutoffs.rmsd);
    let unbound_ok = is_inlier(&unbound_means, cutoffs.unbound);
    let bound_ok = is_inlier(&bound_means, cutoffs.bound);

    let results: Vec<SegmentationResult> = fits.into_iter()
        .enumerate()
        .map(|(i, fit)| {
            let mut failed_tests = Vec::new();
            if !rmsd_ok[i] {failed_tests.push(FilterTest::Rmsd)}
            if !unbound_ok[i] {failed_tests.push(FilterTest::UnboundIntensity)}
            if !bound_ok[i] {failed_tests.push(FilterTest::BoundIntensity)}

            SegmentationResult {
                state_sequence: fit.state_sequence,
                fit_trace: fit.fit_trace,
                unbound_mean: fit.unbound_mean,
                bound_mean: fit.bound_mean,
                rmsd: fit.rmsd,
                is_inlier: failed_tests.is_empty(),
                failed_tests,
            }
        })
        .collect();

    let rejected = results.iter().filter(|result| !result.is_inlier).count();
    debug!("Rejected {} of {} segmented traces as outliers", rejected, results.len());

    results
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentationError {
    #[error("pooled intensity clustering failed: {error}")]
    PopulationClustering { error: GaussianMixtureError },
    #[error("invalid initial state: {error}")]
    InvalidInitialState { error: StateError },
    #[error("invalid HMM setup: {error}")]
    InvalidSetup { error: BaumWelchError },
    #[error("state decoding failed: {error}")]
    Decoding { error: ViterbiError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn telegraph(levels: (f64, f64), pattern: &[(usize, usize)]) -> IntensityTrace {
        let mut values = Vec::new();
        for &(state, len) in pattern {
            let level = if state == 0 {levels.0} else {levels.1};
            values.extend(std::iter::repeat(level).take(len));
        }
        IntensityTrace::new(values).unwrap()
    }

    #[test]
    fn test_noiseless_two_level_round_trip() {
        let trace = telegraph((100.0, 250.0), &[(0, 30), (1, 10), (0, 40), (1, 20)]);
        let context = PopulationContext::from_traces(std::slice::from_ref(&trace)).unwrap();
        let segmenter = TraceSegmenter::new(&context, &SegmentSettings::default()).unwrap();

        let fit = segmenter.fit(&trace).unwrap();

        assert!((fit.unbound_mean - 100.0).abs() < 1e-9);
        assert!((fit.bound_mean - 250.0).abs() < 1e-9);
        assert!(fit.rmsd < 1e-9);

        let expected: Vec<usize> = trace.get_values().iter().map(|&v| if v > 150.0 {1} else {0}).collect();
        assert_eq!(fit.state_sequence, expected);
    }

    #[test]
    fn test_canonical_fit_swaps_labels() {
        let values = [5.0, 5.0, 1.0, 1.0];
        let fit = canonical_fit(&values, vec![0, 0, 1, 1], 5.0, 1.0, true);

        assert_eq!(fit.state_sequence, vec![1, 1, 0, 0]);
        assert_eq!(fit.unbound_mean, 1.0);
        assert_eq!(fit.bound_mean, 5.0);
        assert_eq!(fit.fit_trace, vec![5.0, 5.0, 1.0, 1.0]);
        assert_eq!(fit.rmsd, 0.0);
    }

    #[test]
    fn test_noisy_traces_keep_order() {
        let states = vec![State::new(0, 100.0, 8.0).unwrap(), State::new(1, 180.0, 10.0).unwrap()];
        let start = StartMatrix::new(vec![0.7, 0.3]);
        let transition = TransitionMatrix::persistent_two_state(0.97, 0.9);
        let mut rng = StdRng::seed_from_u64(11);

        let traces: Vec<IntensityTrace> = (0..12)
            .map(|_| IntensityTrace::new(HMM::gen_sequence(&states, &start, &transition, 300, &mut rng).1).unwrap())
            .collect();

        let context = PopulationContext::from_traces(&traces).unwrap();
        assert!(context.unbound.median < context.bound.median);

        let segmenter = TraceSegmenter::new(&context, &SegmentSettings::default()).unwrap();
        let fits = segmenter.fit_all(&traces).unwrap();

        for (fit, trace) in fits.iter().zip(&traces) {
            assert!(fit.unbound_mean <= fit.bound_mean);
            assert_eq!(fit.state_sequence.len(), trace.get_len());
            assert_eq!(fit.fit_trace.len(), trace.get_len());
        }
    }

    // A flat trace still gets a canonical two-state result
    #[test]
    fn test_degenerate_constant_trace() {
        let normal = telegraph((100.0, 200.0), &[(0, 20), (1, 20)]);
        let flat = IntensityTrace::new(vec![100.0; 40]).unwrap();
        let context = PopulationContext::from_traces(&[normal, flat.clone()]).unwrap();
        let segmenter = TraceSegmenter::new(&context, &SegmentSettings::default()).unwrap();

        let fit = segmenter.fit(&flat).unwrap();

        assert!(fit.unbound_mean <= fit.bound_mean);
        assert_eq!(fit.state_sequence.len(), 40);
        assert!(fit.rmsd.is_finite());
    }

    // Trained parameters that cannot be decoded do not fail the trace
    #[test]
    fn test_decoding_failure_uses_initial_parameters() {
        let trace = telegraph((100.0, 250.0), &[(0, 30), (1, 10), (0, 40)]);
        let context = PopulationContext::from_traces(std::slice::from_ref(&trace)).unwrap();
        let segmenter = TraceSegmenter::new(&context, &SegmentSettings::default()).unwrap();

        let states = vec![State::new(0, 100.0, 1.0).unwrap(), State::new(1, 250.0, 1.0).unwrap()];
        let broken = (states, StartMatrix::new(vec![0.5, 0.5]), TransitionMatrix::new(vec![vec![1.0]]));
        let fit = segmenter.decode(trace.get_values(), Some(broken)).unwrap();

        assert!(!fit.converged);
        assert_eq!(fit.state_sequence.len(), 80);
        assert!(fit.unbound_mean <= fit.bound_mean);
        assert_eq!(&fit.state_sequence[28..32], &[0, 0, 1, 1]);
    }

    #[test]
    fn test_classify_inliers() {
        let fit = |rmsd: f64, unbound: f64, bound: f64| TraceFit {
            state_sequence: vec![0, 1],
            fit_trace: vec![unbound, bound],
            unbound_mean: unbound,
            bound_mean: bound,
            rmsd,
            converged: true,
        };
        let fits = vec![
            fit(5.0, 100.0, 200.0),
            fit(5.2, 101.0, 198.0),
            fit(4.9, 99.0, 203.0),
            fit(5.1, 100.5, 201.0),
            fit(5.0, 100.0, 100.0),
        ];
        let cutoffs = QualityCutoffs { rmsd: 5.0, unbound: 5.0, bound: 5.0 };

        let results = classify_inliers(fits, &cutoffs);

        assert!(results[..4].iter().all(|result| result.is_inlier));
        assert!(!results[4].is_inlier);
        assert_eq!(results[4].failed_tests, vec![FilterTest::BoundIntensity]);
    }
}
