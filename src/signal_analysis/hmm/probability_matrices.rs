use nalgebra::DMatrix;

use super::hmm_matrices::*;
use super::state::*;

// Emission densities for every (state, time step), rescaled per time step so the
// most likely state has density 1. The removed log offsets are returned so the
// log-likelihood can be reconstructed exactly.
pub fn compute_scaled_emissions(states: &[State], observations: &[f64]) -> (DMatrix<f64>, Vec<f64>) {
    let mut emissions = DMatrix::<f64>::zeros(states.len(), observations.len());
    let mut offsets: Vec<f64> = Vec::with_capacity(observations.len());

    for (t, &observation) in observations.iter().enumerate() {
        let log_probs: Vec<f64> = states.iter()
            .map(|state| state.log_emission_probability(observation))
            .collect();
        let max_log = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        for (state, log_prob) in states.iter().zip(&log_probs) {
            emissions[(state.id, t)] = (log_prob - max_log).exp();
        }
        offsets.push(max_log);
    }

    (emissions, offsets)
}

pub fn compute_scaled_alphas(
    start_matrix: &StartMatrix,
    transition_matrix: &TransitionMatrix,
    emissions: &DMatrix<f64>,
) -> (DMatrix<f64>, Vec<f64>) {
    let (num_states, num_steps) = emissions.shape();
    let mut alphas = DMatrix::<f64>::zeros(num_states, num_steps);
    let mut scaling_factors: Vec<f64> = Vec::with_capacity(num_steps);

    for t in 0..num_steps {
        let mut normalization = 0.0;
        for state in 0..num_states {
            let value = if t == 0 {
                start_matrix[state] * emissions[(state, 0)]
            } else {
                let mut incoming = 0.0;
                for previous in 0..num_states {
                    incoming += alphas[(previous, t - 1)] * transition_matrix[(previous, state)];
                }
                incoming * emissions[(state, t)]
            };
            alphas[(state, t)] = value;
            normalization += value;
        }

        if normalization == 0.0 {normalization = f64::EPSILON}

        for state in 0..num_states {
            alphas[(state, t)] /= normalization;
        }
        scaling_factors.push(normalization);
    }

    (alphas, scaling_factors)
}

pub fn compute_scaled_betas(
    transition_matrix: &TransitionMatrix,
    emissions: &DMatrix<f64>,
    scaling_factors: &[f64],
) -> DMatrix<f64> {
    let (num_states, num_steps) = emissions.shape();
    let mut betas = DMatrix::<f64>::zeros(num_states, num_steps);

    for state in 0..num_states {
        betas[(state, num_steps - 1)] = 1.0;
    }

    for t in (0..num_steps - 1).rev() {
        for state in 0..num_states {
            let mut sum = 0.0;
            for next in 0..num_states {
                sum += transition_matrix[(state, next)] * emissions[(next, t + 1)] * betas[(next, t + 1)];
            }
            betas[(state, t)] = sum / scaling_factors[t + 1];
        }
    }

    betas
}

// Posterior state probabilities per time step
pub fn compute_gammas(alphas: &DMatrix<f64>, betas: &DMatrix<f64>) -> DMatrix<f64> {
    let mut gammas = alphas.component_mul(betas);

    for mut column in gammas.column_iter_mut() {
        let sum: f64 = column.sum();
        if sum > 0.0 {
            column /= sum;
        }
    }

    gammas
}

// Expected transition counts i -> j summed over all time steps
pub fn compute_xi_sums(
    alphas: &DMatrix<f64>,
    betas: &DMatrix<f64>,
    transition_matrix: &TransitionMatrix,
    emissions: &DMatrix<f64>,
) -> DMatrix<f64> {
    let (num_states, num_steps) = emissions.shape();
    let mut xi_sums = DMatrix::<f64>::zeros(num_states, num_states);
    let mut xi_t = DMatrix::<f64>::zeros(num_states, num_states);

    for t in 0..num_steps.saturating_sub(1) {
        let mut total = 0.0;
        for from in 0..num_states {
            for to in 0..num_states {
                let value = alphas[(from, t)]
                    * transition_matrix[(from, to)]
                    * emissions[(to, t + 1)]
                    * betas[(to, t + 1)];
                xi_t[(from, to)] = value;
                total += value;
            }
        }

        if total > 0.0 {
            xi_sums += &xi_t / total;
        }
    }

    xi_sums
}

#[derive(Debug, Clone)]
pub struct ForwardBackward {
    pub gammas: DMatrix<f64>,
    pub xi_sums: DMatrix<f64>,
    pub log_likelihood: f64,
}

impl ForwardBackward {
    pub fn run(
        states: &[State],
        start_matrix: &StartMatrix,
        transition_matrix: &TransitionMatrix,
        observations: &[f64],
    ) -> Self {
        let (emissions, offsets) = compute_scaled_emissions(states, observations);
        let (alphas, scaling_factors) = compute_scaled_alphas(start_matrix, transition_matrix, &emissions);
        let betas = compute_scaled_betas(transition_matrix, &emissions, &scaling_factors);

        let gammas = compute_gammas(&alphas, &betas);
        let xi_sums = compute_xi_sums(&alphas, &betas, transition_matrix, &emissions);

        let log_likelihood = scaling_factors.iter().map(|factor| factor.ln()).sum::<f64>()
            + offsets.iter().sum::<f64>();

        Self { gammas, xi_sums, log_likelihood }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_states() -> Vec<State> {
        vec![State::new(0, 0.0, 1.0).unwrap(), State::new(1, 10.0, 1.0).unwrap()]
    }

    // Posterior probabilities must be normalized at every time step
    #[test]
    fn test_gammas_normalized() {
        let states = two_states();
        let start = StartMatrix::new(vec![0.5, 0.5]);
        let transition = TransitionMatrix::persistent_two_state(0.9, 0.9);
        let observations = [0.1, -0.3, 9.8, 10.2, 0.4];

        let result = ForwardBackward::run(&states, &start, &transition, &observations);

        for column in result.gammas.column_iter() {
            assert!((column.sum() - 1.0).abs() < 1e-9);
        }
        assert!(result.gammas[(0, 0)] > 0.99);
        assert!(result.gammas[(1, 2)] > 0.99);
    }

    // Expected transitions sum to the number of time step pairs
    #[test]
    fn test_xi_sums_total() {
        let states = two_states();
        let start = StartMatrix::new(vec![0.5, 0.5]);
        let transition = TransitionMatrix::persistent_two_state(0.9, 0.9);
        let observations = [0.1, -0.3, 9.8, 10.2, 0.4];

        let result = ForwardBackward::run(&states, &start, &transition, &observations);
        assert!((result.xi_sums.sum() - 4.0).abs() < 1e-9);
    }

    // For a single observation the likelihood is the mixture density
    #[test]
    fn test_log_likelihood_single_observation() {
        let states = two_states();
        let start = StartMatrix::new(vec![0.25, 0.75]);
        let transition = TransitionMatrix::persistent_two_state(0.9, 0.9);

        let result = ForwardBackward::run(&states, &start, &transition, &[1.0]);
        let expected = (0.25 * states[0].log_emission_probability(1.0).exp()
            + 0.75 * states[1].log_emission_probability(1.0).exp()).ln();

        assert!((result.log_likelihood - expected).abs() < 1e-9);
    }
}
