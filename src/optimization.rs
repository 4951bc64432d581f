pub mod optimizer;
pub mod golden_section;
