use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use super::individual_trace::*;

pub const TRACES_FILE_NAME: &str = "traces.csv";

// One trace per row, comma separated intensities, no header
pub fn parse_traces<R: io::Read>(reader: R) -> Result<Vec<IntensityTrace>, TraceLoaderError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut traces = Vec::new();
    let mut expected_len: Option<usize> = None;

    for (row, record) in csv_reader.records().enumerate() {
        let record = record.map_err(|error| TraceLoaderError::InvalidRecord { row, reason: error.to_string() })?;

        let values: Vec<f64> = record.iter()
            .enumerate()
            .filter(|(_, token)| !token.is_empty())
            .map(|(column, token)| {
                token.parse::<f64>().map_err(|_| TraceLoaderError::InvalidValue { row, column, value: token.to_string() })
            })
            .collect::<Result<_, _>>()?;

        if values.is_empty() {continue}

        match expected_len {
            Some(len) if len != values.len() => {
                return Err(TraceLoaderError::LineHasDifferentLength { row, num_values: values.len(), expected: len });
            }
            _ => expected_len = Some(values.len()),
        }

        let trace = IntensityTrace::new(values).map_err(|error| TraceLoaderError::InvalidTrace { row, error })?;
        traces.push(trace);
    }

    Ok(traces)
}

pub fn load_traces(path: &Path) -> Result<Vec<IntensityTrace>, TraceLoaderError> {
    let file = fs::File::open(path).map_err(|_| TraceLoaderError::FailedToLoadFile { file: path.display().to_string() })?;
    let traces = parse_traces(io::BufReader::new(file))?;
    debug!("Loaded {} traces from {}", traces.len(), path.display());

    Ok(traces)
}

// Every directory under `root` (itself included) holding a traces file, sorted
pub fn find_experiment_dirs(root: &Path) -> Result<Vec<PathBuf>, TraceLoaderError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|_| TraceLoaderError::InvalidDirectoryName { dir: dir.display().to_string() })?;

        for entry in entries {
            let entry = entry.map_err(|_| TraceLoaderError::InvalidDirectoryName { dir: dir.display().to_string() })?;
            let path = entry.path();

            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().map_or(false, |name| name == TRACES_FILE_NAME) {
                found.push(dir.clone());
            }
        }
    }

    found.sort();

    Ok(found)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceLoaderError {
    #[error("failed to open {file}")]
    FailedToLoadFile { file: String },
    #[error("cannot read directory {dir}")]
    InvalidDirectoryName { dir: String },
    #[error("row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },
    #[error("row {row}, column {column}: '{value}' is not a number")]
    InvalidValue { row: usize, column: usize, value: String },
    #[error("row {row} has {num_values} values, expected {expected}")]
    LineHasDifferentLength { row: usize, num_values: usize, expected: usize },
    #[error("row {row}: {error}")]
    InvalidTrace { row: usize, error: IntensityTraceError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_traces() {
        let input = "1.0, 2.0, 3.0\n4,5,6\n\n7.5,8.5,9.5\n";
        let traces = parse_traces(input.as_bytes()).unwrap();

        assert_eq!(traces.len(), 3);
        assert_eq!(traces[1].get_values(), &[4.0, 5.0, 6.0]);
        assert_eq!(traces[2].get_len(), 3);
    }

    #[test]
    fn test_parse_traces_length_mismatch() {
        let input = "1,2,3\n4,5\n";
        let result = parse_traces(input.as_bytes());
        assert_eq!(result, Err(TraceLoaderError::LineHasDifferentLength { row: 1, num_values: 2, expected: 3 }));
    }

    #[test]
    fn test_parse_traces_bad_value() {
        let input = "1,2,x\n";
        assert!(matches!(parse_traces(input.as_bytes()), Err(TraceLoaderError::InvalidValue { row: 0, column: 2, .. })));
    }

    #[test]
    fn test_find_experiment_dirs() {
        let root = std::env::temp_dir().join(format!("binding_kinetics_loader_{}", std::process::id()));
        let nested = root.join("day1").join("movie2");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(nested.join(TRACES_FILE_NAME), "1,2\n").unwrap();
        fs::write(root.join(TRACES_FILE_NAME), "1,2\n").unwrap();

        let dirs = find_experiment_dirs(&root).unwrap();
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(dirs, vec![root.clone(), nested]);
    }
}
