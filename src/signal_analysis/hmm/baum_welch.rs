use log::debug;
use thiserror::Error;

use super::hmm_matrices::*;
use super::optimization_tracker::{OptimizationTracker, TerminationCriterium};
use super::probability_matrices::ForwardBackward;
use super::state::*;

pub const BAUM_WELCH_TERMINATION_DEFAULT: TerminationCriterium =
    TerminationCriterium::OneStepConvergenceAbsolute { epsilon: 1e-2, max_iterations: Some(100) };

#[derive(Debug, Clone)]
pub struct BaumWelch {
    num_states: usize,
    termination_criterium: TerminationCriterium,
    variance_floor: f64,

    initial_states: Option<Vec<State>>,
    initial_start_matrix: Option<StartMatrix>,
    initial_transition_matrix: Option<TransitionMatrix>,
}

#[derive(Debug, Clone)]
pub struct BaumWelchOutput {
    pub states: Vec<State>,
    pub start_matrix: StartMatrix,
    pub transition_matrix: TransitionMatrix,
    pub log_likelihood: f64,
    pub iterations: u32,
}

impl BaumWelch {
    pub fn new(num_states: usize) -> Self {
        Self {
            num_states,
            termination_criterium: BAUM_WELCH_TERMINATION_DEFAULT,
            variance_floor: MIN_NOISE_STD * MIN_NOISE_STD,

            initial_states: None,
            initial_start_matrix: None,
            initial_transition_matrix: None,
        }
    }

    pub fn set_termination_criterium(&mut self, termination_criterium: TerminationCriterium) {
        self.termination_criterium = termination_criterium;
    }

    pub fn set_variance_floor(&mut self, variance_floor: f64) -> Result<(), BaumWelchError> {
        if !(variance_floor > 0.0) || !variance_floor.is_finite() {
            return Err(BaumWelchError::InvalidVarianceFloor { value: variance_floor });
        }
        self.variance_floor = variance_floor;

        Ok(())
    }

    pub fn set_initial_states(&mut self, states: Vec<State>) -> Result<(), BaumWelchError> {
        if states.len() != self.num_states {
            return Err(BaumWelchError::IncorrectNumberOfInitialStates { expected: self.num_states, given: states.len() });
        }
        if states.iter().enumerate().any(|(i, state)| state.id != i) {
            return Err(BaumWelchError::InvalidStateIdSequence);
        }

        self.initial_states = Some(states);

        Ok(())
    }

    pub fn set_initial_start_matrix(&mut self, start_matrix: StartMatrix) -> Result<(), BaumWelchError> {
        if start_matrix.len() != self.num_states {
            return Err(BaumWelchError::IncompatibleDimensions { expected: self.num_states, given: start_matrix.len() });
        }
        start_matrix.validate().map_err(|error| BaumWelchError::InvalidInitialStartMatrix { error })?;

        self.initial_start_matrix = Some(start_matrix);

        Ok(())
    }

    pub fn set_initial_transition_matrix(&mut self, transition_matrix: TransitionMatrix) -> Result<(), BaumWelchError> {
        if transition_matrix.len() != self.num_states {
            return Err(BaumWelchError::IncompatibleDimensions { expected: self.num_states, given: transition_matrix.len() });
        }
        transition_matrix.validate().map_err(|error| BaumWelchError::InvalidInitialTransitionMatrix { error })?;

        self.initial_transition_matrix = Some(transition_matrix);

        Ok(())
    }

    pub fn update_start_matrix(fb: &ForwardBackward, start_matrix: &mut StartMatrix) {
        for state in 0..start_matrix.len() {
            start_matrix[state] = fb.gammas[(state, 0)];
        }
    }

    pub fn update_transition_matrix(fb: &ForwardBackward, transition_matrix: &mut TransitionMatrix) {
        let num_states = transition_matrix.len();

        for from in 0..num_states {
            let row_total: f64 = (0..num_states).map(|to| fb.xi_sums[(from, to)]).sum();

            // A state that is never left nor entered keeps its previous row
            if !(row_total > 0.0) {continue}

            for to in 0..num_states {
                transition_matrix[(from, to)] = fb.xi_sums[(from, to)] / row_total;
            }
        }
    }

    pub fn update_states(fb: &ForwardBackward, observations: &[f64], states: &mut [State], variance_floor: f64) {
        for state in states.iter_mut() {
            let weights = fb.gammas.row(state.id);
            let total_weight: f64 = weights.sum();

            if !(total_weight > 0.0) {continue}

            let mean: f64 = weights.iter()
                .zip(observations)
                .map(|(weight, value)| weight * value)
                .sum::<f64>() / total_weight;

            let variance: f64 = weights.iter()
                .zip(observations)
                .map(|(weight, value)| weight * (value - mean).powi(2))
                .sum::<f64>() / total_weight;

            state.value = mean;
            state.noise_std = variance.max(variance_floor).sqrt();
        }
    }

    pub fn run_optimization(&self, observations: &[f64]) -> Result<BaumWelchOutput, BaumWelchError> {
        if observations.len() < 2 {
            return Err(BaumWelchError::InvalidSequence { len: observations.len() });
        }

        let mut states = self.initial_states.clone().ok_or(BaumWelchError::InitialStatesNotSet)?;
        let mut start_matrix = self.initial_start_matrix.clone().ok_or(BaumWelchError::InitialStartMatrixNotSet)?;
        let mut transition_matrix = self.initial_transition_matrix.clone().ok_or(BaumWelchError::InitialTransitionMatrixNotSet)?;

        let mut tracker = OptimizationTracker::new(self.termination_criterium.clone());

        loop {
            // E step
            let fb = ForwardBackward::run(&states, &start_matrix, &transition_matrix, observations);

            if !fb.log_likelihood.is_finite() {
                return Err(BaumWelchError::NonFiniteLikelihood { iteration: tracker.iterations() });
            }

            let stop = tracker.step(fb.log_likelihood);
            if stop {break}

            // M step
            Self::update_start_matrix(&fb, &mut start_matrix);
            Self::update_transition_matrix(&fb, &mut transition_matrix);
            Self::update_states(&fb, observations, &mut states, self.variance_floor);
        }

        let log_likelihood = tracker.last_eval().unwrap_or(f64::NAN);
        debug!("Baum-Welch stopped after {} iterations, log-likelihood {:.3}", tracker.iterations(), log_likelihood);

        Ok(BaumWelchOutput {
            states,
            start_matrix,
            transition_matrix,
            log_likelihood,
            iterations: tracker.iterations(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BaumWelchError {
    #[error("expected {expected} initial states, got {given}")]
    IncorrectNumberOfInitialStates { expected: usize, given: usize },
    #[error("state ids must run 0..N in order")]
    InvalidStateIdSequence,
    #[error("expected a {expected}-state matrix, got {given}")]
    IncompatibleDimensions { expected: usize, given: usize },
    #[error("invalid initial start matrix: {error}")]
    InvalidInitialStartMatrix { error: MatrixValidationError },
    #[error("invalid initial transition matrix: {error}")]
    InvalidInitialTransitionMatrix { error: MatrixValidationError },
    #[error("variance floor must be positive, got {value}")]
    InvalidVarianceFloor { value: f64 },
    #[error("initial states not set")]
    InitialStatesNotSet,
    #[error("initial start matrix not set")]
    InitialStartMatrixNotSet,
    #[error("initial transition matrix not set")]
    InitialTransitionMatrixNotSet,
    #[error("sequence of length {len} is too short")]
    InvalidSequence { len: usize },
    #[error("log-likelihood became non-finite at iteration {iteration}")]
    NonFiniteLikelihood { iteration: u32 },
}
