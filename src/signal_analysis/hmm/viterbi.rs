use thiserror::Error;

use super::hmm_matrices::*;
use super::state::*;

// Most likely state path, computed in log space so long traces do not underflow
pub struct Viterbi<'a> {
    states: &'a [State],
    start_matrix: &'a StartMatrix,
    transition_matrix: &'a TransitionMatrix,
}

impl<'a> Viterbi<'a> {
    pub fn new(states: &'a [State], start_matrix: &'a StartMatrix, transition_matrix: &'a TransitionMatrix) -> Self {
        Self { states, start_matrix, transition_matrix }
    }

    pub fn pre_run_validity(&self) -> Result<(), ViterbiError> {
        let dim_states = self.states.len();

        if dim_states == 0 {
            return Err(ViterbiError::UndefinedStates);
        }
        if !(dim_states == self.start_matrix.len() && dim_states == self.transition_matrix.len()) {
            return Err(ViterbiError::IncompatibleDimensions {
                dim_states,
                dim_start_matrix: self.start_matrix.len(),
                dim_transition_matrix: self.transition_matrix.len(),
            });
        }

        self.start_matrix.validate().map_err(|error| ViterbiError::InvalidMatrix { error })?;
        self.transition_matrix.validate().map_err(|error| ViterbiError::InvalidMatrix { error })?;

        Ok(())
    }

    pub fn run(&self, time_trace: &[f64]) -> Result<Vec<usize>, ViterbiError> {
        self.pre_run_validity()?;

        if time_trace.is_empty() {
            return Err(ViterbiError::EmptySequence);
        }

        let num_states = self.states.len();
        let num_steps = time_trace.len();

        let log_start: Vec<f64> = self.start_matrix.matrix.iter().map(|prob| prob.ln()).collect();
        let log_transition: Vec<Vec<f64>> = self.transition_matrix.matrix.iter()
            .map(|row| row.iter().map(|prob| prob.ln()).collect())
            .collect();

        let mut viterbi_probs = vec![vec![f64::NEG_INFINITY; num_steps]; num_states];
        let mut backtrace = vec![vec![0_usize; num_steps]; num_states];

        for state in self.states {
            viterbi_probs[state.id][0] = log_start[state.id] + state.log_emission_probability(time_trace[0]);
        }

        for t in 1..num_steps {
            for next_state in self.states {
                let emission = next_state.log_emission_probability(time_trace[t]);

                let mut best_prob = f64::NEG_INFINITY;
                let mut best_prev_state = 0;
                for previous_state in self.states {
                    let total = viterbi_probs[previous_state.id][t - 1] + log_transition[previous_state.id][next_state.id];
                    if total > best_prob {
                        best_prob = total;
                        best_prev_state = previous_state.id;
                    }
                }

                viterbi_probs[next_state.id][t] = best_prob + emission;
                backtrace[next_state.id][t] = best_prev_state;
            }
        }

        // Find best last state
        let mut last_state = 0;
        let mut max_final_prob = f64::NEG_INFINITY;
        for state in self.states {
            if viterbi_probs[state.id][num_steps - 1] > max_final_prob {
                max_final_prob = viterbi_probs[state.id][num_steps - 1];
                last_state = state.id;
            }
        }

        // Follow the backtrace backwards
        let mut ml_path = vec![0_usize; num_steps];
        ml_path[num_steps - 1] = last_state;
        for t in (1..num_steps).rev() {
            ml_path[t - 1] = backtrace[ml_path[t]][t];
        }

        Ok(ml_path)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViterbiError {
    #[error("no states defined")]
    UndefinedStates,
    #[error("dimensions do not match: {dim_states} states, start {dim_start_matrix}, transition {dim_transition_matrix}")]
    IncompatibleDimensions {
        dim_states: usize,
        dim_start_matrix: usize,
        dim_transition_matrix: usize,
    },
    #[error("invalid probability matrix: {error}")]
    InvalidMatrix { error: MatrixValidationError },
    #[error("cannot decode an empty sequence")]
    EmptySequence,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> (Vec<State>, StartMatrix, TransitionMatrix) {
        (
            vec![State::new(0, 10.0, 1.0).unwrap(), State::new(1, 20.0, 1.0).unwrap()],
            StartMatrix::new(vec![0.5, 0.5]),
            TransitionMatrix::persistent_two_state(0.98, 0.80),
        )
    }

    #[test]
    fn test_clean_two_level_path() {
        let (states, start, transition) = model();
        let viterbi = Viterbi::new(&states, &start, &transition);

        let trace = [10.1, 9.8, 20.2, 19.9, 20.1, 10.0];
        assert_eq!(viterbi.run(&trace).unwrap(), vec![0, 0, 1, 1, 1, 0]);
    }

    // Persistence smooths over a single ambiguous frame
    #[test]
    fn test_persistence_smoothing() {
        let (states, start, transition) = model();
        let viterbi = Viterbi::new(&states, &start, &transition);

        let trace = [10.0, 10.2, 9.9, 15.2, 10.1, 9.8];
        assert_eq!(viterbi.run(&trace).unwrap(), vec![0; 6]);
    }

    // Very long traces must not underflow
    #[test]
    fn test_long_trace() {
        let (states, start, transition) = model();
        let viterbi = Viterbi::new(&states, &start, &transition);

        let trace: Vec<f64> = (0..20_000).map(|i| if i < 10_000 {10.0} else {20.0}).collect();
        let path = viterbi.run(&trace).unwrap();
        assert_eq!(path[9_999], 0);
        assert_eq!(path[10_000], 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (states, _, transition) = model();
        let start = StartMatrix::new(vec![1.0]);
        let viterbi = Viterbi::new(&states, &start, &transition);
        assert!(matches!(viterbi.run(&[1.0]), Err(ViterbiError::IncompatibleDimensions { .. })));
    }
}
