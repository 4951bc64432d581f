// Median of a slice. NaN values are ordered last so they never split the sample.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// Population mean and standard deviation (divides by n, not n - 1)
pub fn compute_mean_and_std(values: &[f64]) -> [f64; 2] {
    if values.is_empty() {
        return [f64::NAN, f64::NAN];
    }

    let n = values.len() as f64;
    let mean: f64 = values.iter().sum::<f64>() / n;
    let variance: f64 = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    [mean, variance.sqrt()]
}

// Median of the absolute deviations from the median
pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|value| (value - center).abs()).collect();

    median(&deviations)
}

pub fn min_max(values: &[f64]) -> [f64; 2] {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    [min, max]
}

pub fn root_mean_square_deviation(values: &[f64], reference: &[f64]) -> f64 {
    if values.is_empty() || values.len() != reference.len() {
        return f64::NAN;
    }

    let sum_sq: f64 = values.iter()
        .zip(reference)
        .map(|(value, fit)| (value - fit).powi(2))
        .sum();

    (sum_sq / values.len() as f64).sqrt()
}
