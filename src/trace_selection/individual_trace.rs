use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tools::*;

/// Per-frame intensity values of one candidate spot.
///
/// Validated on construction and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityTrace {
    values: Vec<f64>,
}

impl IntensityTrace {
    pub fn new(values: Vec<f64>) -> Result<Self, IntensityTraceError> {
        check_trace_validity(&values)?;

        Ok(Self { values })
    }

    pub fn get_values(&self) -> &[f64] {
        &self.values
    }

    pub fn get_len(&self) -> usize {
        self.values.len()
    }

    pub fn min_value(&self) -> f64 {
        min_max(&self.values)[0]
    }

    pub fn max_value(&self) -> f64 {
        min_max(&self.values)[1]
    }
}

// A trace must have at least two frames (one transition slot) and finite values
pub fn check_trace_validity(values: &[f64]) -> Result<(), IntensityTraceError> {
    if values.len() < 2 {
        return Err(IntensityTraceError::NotEnoughValues { len: values.len() });
    }

    if let Some(frame) = values.iter().position(|value| !value.is_finite()) {
        return Err(IntensityTraceError::NonFiniteValue { frame });
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntensityTraceError {
    #[error("trace has {len} frames, at least 2 are required")]
    NotEnoughValues { len: usize },
    #[error("trace has a non-finite intensity at frame {frame}")]
    NonFiniteValue { frame: usize },
    #[error("trace has {found} frames but the experiment has {expected}")]
    InconsistentLength { expected: usize, found: usize },
}
