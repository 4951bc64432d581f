pub mod trace_selection;
pub mod signal_analysis;
pub mod optimization;
pub mod kinetics;
pub mod config;
pub mod pipeline;
pub mod report;
