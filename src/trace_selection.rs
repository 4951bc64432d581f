pub mod individual_trace;
pub mod tools;
pub mod filter;
pub mod trace_loader;
