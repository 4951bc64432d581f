pub mod hmm;
pub mod segmentation;
