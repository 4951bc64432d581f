use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::kinetics::events::{CensoringClass, EventKind};
use crate::pipeline::{ExperimentOutcome, KindSummary, SurvivalCurve};

pub const TEXT_REPORT_NAME: &str = "result.txt";
pub const JSON_REPORT_NAME: &str = "result.json";

const INSUFFICIENT_DATA: &str = "insufficient data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateReport {
    // None for the combined estimate
    pub class: Option<u8>,
    pub rate: f64,
    pub rate_error: f64,
    pub time_constant: f64,
    pub time_constant_error: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub kind: EventKind,
    pub classes: Vec<EstimateReport>,
    pub combined: EstimateReport,
    pub survival_curves: Vec<SurvivalCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub name: String,
    pub time_interval: f64,
    pub n_frame: usize,
    pub num_candidates: usize,
    pub num_spots: usize,
    pub finished_at: String,
    pub elapsed_seconds: f64,
    pub kinetics: Vec<KindReport>,
}

impl ExperimentReport {
    pub fn from_outcome(outcome: &ExperimentOutcome) -> Self {
        let kinetics = EventKind::ALL.iter()
            .map(|&kind| kind_report(outcome, outcome.summary(kind)))
            .collect();

        Self {
            name: outcome.name.clone(),
            time_interval: outcome.time_interval,
            n_frame: outcome.n_frame,
            num_candidates: outcome.num_candidates,
            num_spots: outcome.num_inliers,
            finished_at: outcome.finished_at.clone(),
            elapsed_seconds: outcome.elapsed_seconds,
            kinetics,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn kind_report(outcome: &ExperimentOutcome, summary: &KindSummary) -> KindReport {
    let classes = CensoringClass::ALL.iter()
        .map(|&class| {
            let estimate = summary.class(class);
            EstimateReport {
                class: Some(class.number()),
                rate: estimate.rate,
                rate_error: estimate.standard_error,
                time_constant: estimate.time_constant(),
                time_constant_error: estimate.time_constant_error(),
                sample_count: estimate.sample_count,
            }
        })
        .collect();

    let combined = EstimateReport {
        class: None,
        rate: summary.combined.rate,
        rate_error: summary.combined.standard_error,
        time_constant: summary.combined.time_constant(),
        time_constant_error: summary.combined.time_constant_error(),
        sample_count: summary.combined.sample_count,
    };

    let survival_curves = CensoringClass::ALL.iter()
        .map(|&class| outcome.survival_curve(summary.kind, class))
        .collect();

    KindReport { kind: summary.kind, classes, combined, survival_curves }
}

fn value_with_error(value: f64, error: f64, unit: &str) -> String {
    if value.is_finite() {
        format!("{:.2} +/- {:.2} [{}]", value, error, unit)
    } else {
        INSUFFICIENT_DATA.to_string()
    }
}

/// Plain-text summary with the same line layout for every experiment.
pub fn text_report(report: &ExperimentReport, directory: &str) -> Result<String, fmt::Error> {
    let mut text = String::new();
    write_text_report(&mut text, report, directory)?;

    Ok(text)
}

fn write_text_report<W: Write>(out: &mut W, report: &ExperimentReport, directory: &str) -> fmt::Result {
    writeln!(out, "directory = {}", directory)?;
    writeln!(out, "name = {}", report.name)?;
    writeln!(out, "analysed at = {}", report.finished_at)?;
    writeln!(out, "analysis time = {:.2} [s]", report.elapsed_seconds)?;
    writeln!(out, "time interval = {:.2} [s]", report.time_interval)?;
    writeln!(out, "number of frame = {}", report.n_frame)?;
    writeln!(out, "number of candidates = {}", report.num_candidates)?;
    writeln!(out, "number of spots = {}", report.num_spots)?;

    for kind_report in &report.kinetics {
        let kind = kind_report.kind.name();
        let label = |estimate: &EstimateReport| match estimate.class {
            Some(class) => format!("class {}", class),
            None => "combined".to_string(),
        };
        let rows: Vec<&EstimateReport> = kind_report.classes.iter().chain(std::iter::once(&kind_report.combined)).collect();

        writeln!(out)?;
        for &estimate in &rows {
            writeln!(
                out,
                "{} time ({}) = {} (N = {})",
                kind,
                label(estimate),
                value_with_error(estimate.time_constant, estimate.time_constant_error, "s"),
                estimate.sample_count
            )?;
        }
        for &estimate in &rows {
            writeln!(
                out,
                "{} rate ({}) = {}",
                kind,
                label(estimate),
                value_with_error(estimate.rate, estimate.rate_error, "1/s")
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(class: Option<u8>, rate: f64, rate_error: f64, sample_count: usize) -> EstimateReport {
        EstimateReport {
            class,
            rate,
            rate_error,
            time_constant: 1.0 / rate,
            time_constant_error: rate_error / (rate * rate),
            sample_count,
        }
    }

    fn report() -> ExperimentReport {
        let dwell = KindReport {
            kind: EventKind::Dwell,
            classes: vec![estimate(Some(1), 0.5, 0.05, 12), estimate(Some(2), f64::NAN, f64::NAN, 0), estimate(Some(3), 0.25, 0.1, 4)],
            combined: estimate(None, 0.4, 0.04, 16),
            survival_curves: Vec::new(),
        };

        ExperimentReport {
            name: "movie".to_string(),
            time_interval: 0.1,
            n_frame: 500,
            num_candidates: 40,
            num_spots: 30,
            finished_at: "2024-03-01 12:00:00".to_string(),
            elapsed_seconds: 4.2,
            kinetics: vec![dwell],
        }
    }

    #[test]
    fn test_text_report_lines() {
        let text = text_report(&report(), "/data/movie").unwrap();

        assert!(text.contains("analysed at = 2024-03-01 12:00:00"));
        assert!(text.contains("analysis time = 4.20 [s]"));
        assert!(text.contains("time interval = 0.10 [s]"));
        assert!(text.contains("number of spots = 30"));
        assert!(text.contains("dwell time (class 1) = 2.00 +/- 0.20 [s] (N = 12)"));
        assert!(text.contains("dwell time (class 2) = insufficient data (N = 0)"));
        assert!(text.contains("dwell time (combined) = 2.50 +/- 0.25 [s] (N = 16)"));
        assert!(text.contains("dwell rate (class 3) = 0.25 +/- 0.10 [1/s]"));
    }

    #[test]
    fn test_json_nan_is_null() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value["kinetics"][0]["classes"][1]["rate"].is_null());
        assert_eq!(value["kinetics"][0]["classes"][0]["sample_count"], 12);
        assert_eq!(value["elapsed_seconds"], 4.2);
    }
}
