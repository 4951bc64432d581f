use thiserror::Error;

// Smallest standard deviation a state may have. Keeps emission densities finite
// when a state collapses onto a single repeated intensity.
pub const MIN_NOISE_STD: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: usize,
    pub value: f64,
    pub noise_std: f64,
}

impl State {
    pub fn new(id: usize, value: f64, noise_std: f64) -> Result<Self, StateError> {
        if !value.is_finite() {
            return Err(StateError::InvalidValueInput { input: value });
        }
        if !(noise_std > 0.0) || !noise_std.is_finite() {
            return Err(StateError::InvalidNoiseInput { input: noise_std });
        }

        Ok(State { id, value, noise_std })
    }

    // Build from a variance, flooring it so the state stays a proper Gaussian
    pub fn from_variance(id: usize, value: f64, variance: f64) -> Result<Self, StateError> {
        let noise_std = if variance.is_finite() {
            variance.max(0.0).sqrt().max(MIN_NOISE_STD)
        } else {
            f64::NAN
        };

        Self::new(id, value, noise_std)
    }

    pub fn variance(&self) -> f64 {
        self.noise_std * self.noise_std
    }

    pub fn log_emission_probability(&self, observed: f64) -> f64 {
        let variance = self.variance();
        -0.5 * (2.0 * std::f64::consts::PI * variance).ln()
            - (observed - self.value).powi(2) / (2.0 * variance)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("state noise must be positive and finite, got {input}")]
    InvalidNoiseInput { input: f64 },
    #[error("state value must be finite, got {input}")]
    InvalidValueInput { input: f64 },
}
