/********** Two-state Gaussian Hidden Markov Model **********
* Segments a single-molecule intensity trace into unbound (low) and bound (high)
* frames. Training is Baum-Welch on the scaled forward/backward recursions and
* decoding is log-space Viterbi.
**********/

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

pub mod state;
pub mod hmm_matrices;
pub mod probability_matrices;
pub mod optimization_tracker;
pub mod baum_welch;
pub mod viterbi;
pub mod initialization;

pub use state::*;
pub use hmm_matrices::*;

pub struct HMM;

impl HMM {
    // Sample a state path and the matching noisy observations
    pub fn gen_sequence<R: Rng + ?Sized>(
        states: &[State],
        start_matrix: &StartMatrix,
        transition_matrix: &TransitionMatrix,
        time_steps: usize,
        rng: &mut R,
    ) -> (Vec<usize>, Vec<f64>) {
        let mut sequence = Vec::with_capacity(time_steps);
        let mut values = Vec::with_capacity(time_steps);

        if time_steps == 0 || states.is_empty() {
            return (sequence, values);
        }

        let mut current_state = sample_index(&start_matrix.matrix, rng);
        sequence.push(current_state);
        values.push(sample_emission(&states[current_state], rng));

        for _ in 1..time_steps {
            current_state = sample_index(&transition_matrix.matrix[current_state], rng);
            sequence.push(current_state);
            values.push(sample_emission(&states[current_state], rng));
        }

        (sequence, values)
    }
}

fn sample_emission<R: Rng + ?Sized>(state: &State, rng: &mut R) -> f64 {
    let z: f64 = StandardNormal.sample(rng);
    state.value + state.noise_std * z
}

// Draw an index from a discrete probability vector
fn sample_index<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> usize {
    let random_value: f64 = rng.gen_range(0.0..1.0);
    let mut cumulative_prob = 0.0;

    for (index, &prob) in probabilities.iter().enumerate() {
        cumulative_prob += prob;
        if random_value < cumulative_prob {
            return index;
        }
    }

    probabilities.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gen_sequence_lengths() {
        let states = vec![State::new(0, 10.0, 1.0).unwrap(), State::new(1, 20.0, 2.0).unwrap()];
        let start = StartMatrix::new(vec![1.0, 0.0]);
        let transition = TransitionMatrix::persistent_two_state(0.9, 0.9);
        let mut rng = StdRng::seed_from_u64(1);

        let (ids, values) = HMM::gen_sequence(&states, &start, &transition, 500, &mut rng);

        assert_eq!(ids.len(), 500);
        assert_eq!(values.len(), 500);
        assert_eq!(ids[0], 0);
        assert!(ids.iter().any(|&id| id == 1));
    }
}
