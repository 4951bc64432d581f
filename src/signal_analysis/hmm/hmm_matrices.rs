use std::ops::{Index, IndexMut};

use thiserror::Error;

// Tolerance when checking that probabilities sum to one
const PROBABILITY_MARGIN: f64 = 1e-4;

pub trait ProbabilityMatrix {
    fn validate(&self) -> Result<(), MatrixValidationError>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixValidationError {
    #[error("transition matrix is not square")]
    IncorrectShape,
    #[error("probability vector does not sum to one: {values:?}")]
    VectorIncorrectValues { values: Vec<f64> },
    #[error("rows {rows:?} do not sum to one")]
    RowsIncorrectValues { rows: Vec<usize> },
    #[error("matrix is empty")]
    MatrixEmpty,
    #[error("value outside of [0, 1]")]
    InvalidValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartMatrix {
    pub matrix: Vec<f64>,
}

impl StartMatrix {
    pub fn new(matrix: Vec<f64>) -> Self {
        Self { matrix }
    }

    // Start probabilities proportional to population sizes
    pub fn from_counts(counts: &[usize]) -> Self {
        let total: usize = counts.iter().sum();
        if total == 0 {
            return Self { matrix: vec![1.0 / counts.len() as f64; counts.len()] };
        }

        Self { matrix: counts.iter().map(|&count| count as f64 / total as f64).collect() }
    }

    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

impl ProbabilityMatrix for StartMatrix {
    fn validate(&self) -> Result<(), MatrixValidationError> {
        if self.matrix.is_empty() || self.matrix.iter().all(|&val| val == 0.0) {
            return Err(MatrixValidationError::MatrixEmpty);
        }

        if self.matrix.iter().any(|&val| !(0.0..=1.0 + PROBABILITY_MARGIN).contains(&val)) {
            return Err(MatrixValidationError::InvalidValue);
        }

        let total: f64 = self.matrix.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_MARGIN {
            return Err(MatrixValidationError::VectorIncorrectValues { values: self.matrix.clone() });
        }

        Ok(())
    }
}

impl Index<usize> for StartMatrix {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.matrix[index]
    }
}

impl IndexMut<usize> for StartMatrix {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.matrix[index]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    pub matrix: Vec<Vec<f64>>,
}

impl TransitionMatrix {
    pub fn new(matrix: Vec<Vec<f64>>) -> Self {
        Self { matrix }
    }

    // Two-state matrix with the given probabilities of staying in each state
    pub fn persistent_two_state(stay_low: f64, stay_high: f64) -> Self {
        Self {
            matrix: vec![
                vec![stay_low, 1.0 - stay_low],
                vec![1.0 - stay_high, stay_high],
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

impl ProbabilityMatrix for TransitionMatrix {
    fn validate(&self) -> Result<(), MatrixValidationError> {
        if self.matrix.is_empty() {
            return Err(MatrixValidationError::MatrixEmpty);
        }
        if self.matrix.iter().any(|row| row.len() != self.matrix.len()) {
            return Err(MatrixValidationError::IncorrectShape);
        }

        let mut incorrect_rows = Vec::<usize>::new();

        for (i, row) in self.matrix.iter().enumerate() {
            if row.iter().any(|&val| !(0.0..=1.0 + PROBABILITY_MARGIN).contains(&val)) {
                return Err(MatrixValidationError::InvalidValue);
            }

            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > PROBABILITY_MARGIN {
                incorrect_rows.push(i);
            }
        }

        if !incorrect_rows.is_empty() {
            return Err(MatrixValidationError::RowsIncorrectValues { rows: incorrect_rows });
        }

        Ok(())
    }
}

impl Index<(usize, usize)> for TransitionMatrix {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (from, to) = index;
        &self.matrix[from][to]
    }
}

impl IndexMut<(usize, usize)> for TransitionMatrix {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (from, to) = index;
        &mut self.matrix[from][to]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_matrix_from_counts() {
        let start = StartMatrix::from_counts(&[30, 10]);
        assert_eq!(start.matrix, vec![0.75, 0.25]);
        assert!(start.validate().is_ok());
    }

    #[test]
    fn test_start_matrix_invalid_sum() {
        let start = StartMatrix::new(vec![0.5, 0.6]);
        assert!(matches!(start.validate(), Err(MatrixValidationError::VectorIncorrectValues { .. })));
    }

    #[test]
    fn test_persistent_two_state() {
        let transition = TransitionMatrix::persistent_two_state(0.98, 0.80);
        assert!(transition.validate().is_ok());
        assert!((transition[(0, 1)] - 0.02).abs() < 1e-12);
        assert!((transition[(1, 0)] - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_transition_matrix_rows() {
        let transition = TransitionMatrix::new(vec![vec![0.5, 0.5], vec![0.3, 0.6]]);
        assert_eq!(
            transition.validate(),
            Err(MatrixValidationError::RowsIncorrectValues { rows: vec![1] })
        );
    }

    #[test]
    fn test_transition_matrix_shape() {
        let transition = TransitionMatrix::new(vec![vec![1.0], vec![0.5, 0.5]]);
        assert_eq!(transition.validate(), Err(MatrixValidationError::IncorrectShape));
    }
}
