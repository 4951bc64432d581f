use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal_analysis::segmentation::QualityCutoffs;

pub const INFO_FILE_NAME: &str = "info.txt";

/// Per-experiment calibration values. Every field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub time_interval: f64,
    pub spot_size: u32,
    pub frame_offset: u32,
    pub intensity_min_cutoff: f64,
    pub intensity_max_cutoff: f64,
    pub hmm_rmsd_cutoff: f64,
    pub hmm_unbound_cutoff: f64,
    pub hmm_bound_cutoff: f64,
}

impl Calibration {
    // `key = value` per line, keys case-insensitive, unknown keys ignored
    pub fn parse(text: &str) -> Result<Self, CalibrationError> {
        let mut entries: HashMap<String, String> = HashMap::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {continue}

            let (key, value) = line.split_once('=')
                .ok_or(CalibrationError::InvalidLine { line_num: index + 1, line: line.to_string() })?;
            entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let calibration = Self {
            time_interval: get_float(&entries, "time_interval")?,
            spot_size: get_count(&entries, "spot_size")?,
            frame_offset: get_count(&entries, "frame_offset")?,
            intensity_min_cutoff: get_float(&entries, "intensity_min_cutoff")?,
            intensity_max_cutoff: get_float(&entries, "intensity_max_cutoff")?,
            hmm_rmsd_cutoff: get_float(&entries, "hmm_rmsd_cutoff")?,
            hmm_unbound_cutoff: get_float(&entries, "hmm_unbound_cutoff")?,
            hmm_bound_cutoff: get_float(&entries, "hmm_bound_cutoff")?,
        };
        calibration.validate()?;

        Ok(calibration)
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = fs::read_to_string(path).map_err(|_| CalibrationError::FailedToLoadFile { file: path.display().to_string() })?;

        Self::parse(&text)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.time_interval > 0.0) || !self.time_interval.is_finite() {
            return Err(CalibrationError::OutOfRange { key: "time_interval".to_string(), value: self.time_interval });
        }
        if self.spot_size < 1 {
            return Err(CalibrationError::OutOfRange { key: "spot_size".to_string(), value: self.spot_size as f64 });
        }

        let cutoffs = [
            ("intensity_min_cutoff", self.intensity_min_cutoff),
            ("intensity_max_cutoff", self.intensity_max_cutoff),
            ("hmm_rmsd_cutoff", self.hmm_rmsd_cutoff),
            ("hmm_unbound_cutoff", self.hmm_unbound_cutoff),
            ("hmm_bound_cutoff", self.hmm_bound_cutoff),
        ];
        for (key, value) in cutoffs {
            if !(value > 0.0) || !value.is_finite() {
                return Err(CalibrationError::OutOfRange { key: key.to_string(), value });
            }
        }

        Ok(())
    }

    pub fn quality_cutoffs(&self) -> QualityCutoffs {
        QualityCutoffs {
            rmsd: self.hmm_rmsd_cutoff,
            unbound: self.hmm_unbound_cutoff,
            bound: self.hmm_bound_cutoff,
        }
    }
}

fn get_raw<'a>(entries: &'a HashMap<String, String>, key: &str) -> Result<&'a str, CalibrationError> {
    entries.get(key)
        .map(|value| value.as_str())
        .ok_or(CalibrationError::MissingKey { key: key.to_string() })
}

fn get_float(entries: &HashMap<String, String>, key: &str) -> Result<f64, CalibrationError> {
    let raw = get_raw(entries, key)?;
    raw.parse::<f64>().map_err(|_| CalibrationError::InvalidValue { key: key.to_string(), value: raw.to_string() })
}

// Non-negative integer. Negative values are out of range rather than malformed.
fn get_count(entries: &HashMap<String, String>, key: &str) -> Result<u32, CalibrationError> {
    let raw = get_raw(entries, key)?;
    let value = raw.parse::<i64>().map_err(|_| CalibrationError::InvalidValue { key: key.to_string(), value: raw.to_string() })?;

    u32::try_from(value).map_err(|_| CalibrationError::OutOfRange { key: key.to_string(), value: value as f64 })
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("failed to read {file}")]
    FailedToLoadFile { file: String },
    #[error("line {line_num} is not a key = value pair: '{line}'")]
    InvalidLine { line_num: usize, line: String },
    #[error("missing calibration value '{key}'")]
    MissingKey { key: String },
    #[error("calibration value '{key}' = '{value}' is malformed")]
    InvalidValue { key: String, value: String },
    #[error("calibration value '{key}' = {value} is out of range")]
    OutOfRange { key: String, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "
        time_interval = 0.5
        spot_size = 3
        frame_offset = 1
        flatfield_correct = True
        intensity_min_cutoff = 5
        intensity_max_cutoff = 4
        HMM_RMSD_cutoff = 3
        HMM_unbound_cutoff = 3.5
        HMM_bound_cutoff = 2.5
        save_trace = 10
    ";

    #[test]
    fn test_parse_info() {
        let calibration = Calibration::parse(INFO).unwrap();

        assert_eq!(calibration.time_interval, 0.5);
        assert_eq!(calibration.spot_size, 3);
        assert_eq!(calibration.frame_offset, 1);
        assert_eq!(calibration.hmm_rmsd_cutoff, 3.0);
        assert_eq!(calibration.quality_cutoffs().unbound, 3.5);
        assert_eq!(calibration.quality_cutoffs().bound, 2.5);
    }

    #[test]
    fn test_missing_key() {
        let text = INFO.replace("HMM_bound_cutoff = 2.5", "");
        assert_eq!(
            Calibration::parse(&text),
            Err(CalibrationError::MissingKey { key: "hmm_bound_cutoff".to_string() })
        );
    }

    #[test]
    fn test_malformed_value() {
        let text = INFO.replace("time_interval = 0.5", "time_interval = fast");
        assert!(matches!(Calibration::parse(&text), Err(CalibrationError::InvalidValue { .. })));
    }

    #[test]
    fn test_out_of_range() {
        let text = INFO.replace("frame_offset = 1", "frame_offset = -2");
        assert!(matches!(Calibration::parse(&text), Err(CalibrationError::OutOfRange { .. })));

        let text = INFO.replace("time_interval = 0.5", "time_interval = 0");
        assert!(matches!(Calibration::parse(&text), Err(CalibrationError::OutOfRange { .. })));
    }

    #[test]
    fn test_invalid_line() {
        let text = format!("{}\nnot a pair\n", INFO);
        assert!(matches!(Calibration::parse(&text), Err(CalibrationError::InvalidLine { .. })));
    }
}
