pub mod kmeans;
pub mod gaussian_mixture;
