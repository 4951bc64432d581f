use std::time::Instant;

use chrono::Local;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Calibration, CalibrationError};
use crate::kinetics::combine::{combine, CombinedEstimate};
use crate::kinetics::estimation::{estimate_rate, RateEstimate};
use crate::kinetics::events::{extract_events, CensoringClass, Event, EventKind, EventPools};
use crate::kinetics::survival::{empirical_survival, model_survival_curve};
use crate::signal_analysis::segmentation::*;
use crate::trace_selection::filter::select_spots;
use crate::trace_selection::individual_trace::{IntensityTrace, IntensityTraceError};
use crate::trace_selection::trace_loader::TraceLoaderError;

/// Tunables that are fixed across experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub segment: SegmentSettings,
    // Events at or above this multiple of their pool median are dropped
    pub long_event_factor: f64,
    // Added to the calibrated frame offset before short events are cut
    pub sub_frame_offset: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            segment: SegmentSettings::default(),
            long_event_factor: 10.0,
            sub_frame_offset: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentInput {
    pub name: String,
    pub traces: Vec<IntensityTrace>,
    pub calibration: Calibration,
    // Skip spot preselection when the traces are already the chosen spots
    pub preselected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: EventKind,
    pub classes: [RateEstimate; 3],
    pub combined: CombinedEstimate,
}

impl KindSummary {
    pub fn class(&self, class: CensoringClass) -> &RateEstimate {
        &self.classes[class.number() as usize - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalCurve {
    pub time: Vec<f64>,
    pub empirical: Vec<f64>,
    pub model: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    pub name: String,
    pub time_interval: f64,
    pub n_frame: usize,
    pub window: f64,
    pub num_candidates: usize,
    pub num_spots: usize,
    pub num_inliers: usize,
    pub population: PopulationContext,
    pub segmentations: Vec<SegmentationResult>,
    // Events of each spot, empty for outliers
    pub events: Vec<Vec<Event>>,
    // Filtered durations in seconds
    pub durations: EventPools,
    pub dwell: KindSummary,
    pub wait: KindSummary,
    // Local time the analysis finished and its wall-clock duration
    pub finished_at: String,
    pub elapsed_seconds: f64,
}

impl ExperimentOutcome {
    pub fn summary(&self, kind: EventKind) -> &KindSummary {
        match kind {
            EventKind::Dwell => &self.dwell,
            EventKind::Wait => &self.wait,
        }
    }

    // Empirical and fitted survival on a grid of one frame interval
    pub fn survival_curve(&self, kind: EventKind, class: CensoringClass) -> SurvivalCurve {
        let samples = self.durations.get(kind, class);
        let (time, empirical) = empirical_survival(samples, self.time_interval);
        let rate = self.summary(kind).class(class).rate;
        let model = if rate.is_finite() {
            model_survival_curve(rate, self.window, &time, class)
        } else {
            vec![f64::NAN; time.len()]
        };

        SurvivalCurve { time, empirical, model }
    }
}

pub struct KineticsPipeline {
    settings: PipelineSettings,
}

impl KineticsPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    pub fn run(&self, input: &ExperimentInput) -> Result<ExperimentOutcome, ExperimentError> {
        let started = Instant::now();
        input.calibration.validate().map_err(|error| ExperimentError::Calibration { error })?;
        if input.traces.is_empty() {
            return Err(ExperimentError::NoTraces);
        }

        let spots = if input.preselected {
            input.traces.clone()
        } else {
            let calibration = &input.calibration;
            let selection = select_spots(&input.traces, calibration.intensity_min_cutoff, calibration.intensity_max_cutoff);
            selection.select(&input.traces)
        };

        let mut outcome = self.analyze_spots(&input.name, &spots, &input.calibration)?;
        outcome.num_candidates = input.traces.len();
        outcome.elapsed_seconds = started.elapsed().as_secs_f64();
        info!("{}: analysed in {:.2} s", input.name, outcome.elapsed_seconds);

        Ok(outcome)
    }

    /// Segment the given spots, extract and filter their events, and fit the
    /// six class/kind rates plus the two combined rates.
    pub fn analyze_spots(&self, name: &str, spots: &[IntensityTrace], calibration: &Calibration) -> Result<ExperimentOutcome, ExperimentError> {
        let started = Instant::now();
        let n_frame = check_trace_lengths(spots)?;
        let window = n_frame as f64 * calibration.time_interval;

        let population = PopulationContext::from_traces(spots).map_err(|error| ExperimentError::Segmentation { error })?;
        let segmenter = TraceSegmenter::new(&population, &self.settings.segment)
            .map_err(|error| ExperimentError::Segmentation { error })?;
        let segmentations = segmenter.segment_all(spots, &calibration.quality_cutoffs())
            .map_err(|error| ExperimentError::Segmentation { error })?;

        let num_inliers = segmentations.iter().filter(|result| result.is_inlier).count();
        info!("{}: {} of {} spots passed the HMM quality tests", name, num_inliers, spots.len());

        let events: Vec<Vec<Event>> = segmentations.iter()
            .map(|result| if result.is_inlier {extract_events(&result.state_sequence)} else {Vec::new()})
            .collect();

        let offset_frames = calibration.frame_offset as f64 + self.settings.sub_frame_offset;
        let durations = EventPools::from_events(events.iter().flatten())
            .exclude_short(offset_frames, calibration.time_interval)
            .exclude_long(self.settings.long_event_factor);

        let (dwell, wait) = estimate_kinetics(name, window, &durations);

        Ok(ExperimentOutcome {
            name: name.to_string(),
            time_interval: calibration.time_interval,
            n_frame,
            window,
            num_candidates: spots.len(),
            num_spots: spots.len(),
            num_inliers,
            population,
            segmentations,
            events,
            durations,
            dwell,
            wait,
            finished_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }

    // Each experiment succeeds or fails on its own
    pub fn run_batch<T, F>(&self, sources: &[T], load: F) -> Vec<Result<ExperimentOutcome, ExperimentError>>
    where
        T: Sync,
        F: Fn(&T) -> Result<ExperimentInput, ExperimentError> + Sync,
    {
        sources.par_iter()
            .map(|source| load(source).and_then(|input| self.run(&input)))
            .collect()
    }
}

// The six class/kind fits are independent; a failed one only leaves its own class undefined
fn estimate_kinetics(name: &str, window: f64, durations: &EventPools) -> (KindSummary, KindSummary) {
    let tasks: Vec<(EventKind, CensoringClass)> = EventKind::ALL.iter()
        .flat_map(|&kind| CensoringClass::ALL.iter().map(move |&class| (kind, class)))
        .collect();
    let estimates: Vec<RateEstimate> = tasks.par_iter()
        .map(|&(kind, class)| {
            let estimate = estimate_rate(window, durations.get(kind, class), class);
            debug!("{}: {} class {} from {} events", name, kind.name(), class.number(), estimate.sample_count);
            estimate
        })
        .collect();

    let dwell = summarize_kind(EventKind::Dwell, &estimates[0..3]);
    let wait = summarize_kind(EventKind::Wait, &estimates[3..6]);

    for summary in [&dwell, &wait] {
        if !summary.combined.is_defined() {
            warn!("{}: insufficient data for the combined {} rate", name, summary.kind.name());
        }
    }

    (dwell, wait)
}

fn summarize_kind(kind: EventKind, estimates: &[RateEstimate]) -> KindSummary {
    let classes = [estimates[0], estimates[1], estimates[2]];

    KindSummary { kind, classes, combined: combine(&classes) }
}

// All spots of one recording share the frame count
fn check_trace_lengths(spots: &[IntensityTrace]) -> Result<usize, ExperimentError> {
    let n_frame = spots.first().map(|trace| trace.get_len()).ok_or(ExperimentError::NoTraces)?;

    if let Some(index) = spots.iter().position(|trace| trace.get_len() != n_frame) {
        return Err(ExperimentError::InvalidTrace {
            index,
            error: IntensityTraceError::InconsistentLength { expected: n_frame, found: spots[index].get_len() },
        });
    }

    Ok(n_frame)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExperimentError {
    #[error("calibration error: {error}")]
    Calibration { error: CalibrationError },
    #[error("failed to load traces: {error}")]
    Loading { error: TraceLoaderError },
    #[error("no usable traces")]
    NoTraces,
    #[error("trace {index}: {error}")]
    InvalidTrace { index: usize, error: IntensityTraceError },
    #[error("segmentation failed: {error}")]
    Segmentation { error: SegmentationError },
}
