// 1-D k-means with deterministic starting centres spread evenly between the
// data minimum and maximum, so repeated runs over the same data agree.
pub fn k_means_1_d(data: &[f64], k: usize, max_iterations: usize, tolerance: f64) -> (Vec<f64>, Vec<usize>) {
    if data.is_empty() || k == 0 {
        return (Vec::new(), Vec::new());
    }

    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut centers: Vec<f64> = if k == 1 {
        vec![(min + max) / 2.0]
    } else {
        (0..k).map(|i| min + (max - min) * i as f64 / (k - 1) as f64).collect()
    };

    let mut assignments = vec![0; data.len()];
    let mut iter = 0;

    loop {
        let mut changes = 0;

        // Assign points to the nearest cluster center
        for (i, &point) in data.iter().enumerate() {
            let closest_center = centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - point).abs().total_cmp(&(*b - point).abs()))
                .map(|(idx, _)| idx)
                .unwrap_or(0);

            if assignments[i] != closest_center {
                changes += 1;
                assignments[i] = closest_center;
            }
        }

        // Recompute cluster centers as the mean of assigned points
        let mut new_centers = vec![0.0; k];
        let mut counts = vec![0; k];

        for (assignment, &point) in assignments.iter().zip(data.iter()) {
            new_centers[*assignment] += point;
            counts[*assignment] += 1;
        }

        for i in 0..k {
            if counts[i] > 0 {
                new_centers[i] /= counts[i] as f64;
            } else {
                new_centers[i] = centers[i];
            }
        }

        let max_shift = centers
            .iter()
            .zip(&new_centers)
            .map(|(old, new)| (old - new).abs())
            .fold(0.0, f64::max);

        centers = new_centers;

        iter += 1;
        if max_shift < tolerance || (changes == 0 && iter > 1) || iter >= max_iterations {
            break;
        }
    }

    (centers, assignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_means_1_d() {
        let data = vec![1.0, 1.1, 1.2, 5.0, 5.1, 5.2, 10.0, 10.1, 10.2];
        let (centers, assignments) = k_means_1_d(&data, 3, 100, 1e-4);

        assert_eq!(centers.len(), 3);

        // Every point is closest to its assigned center
        for (i, &point) in data.iter().enumerate() {
            let assigned_center = centers[assignments[i]];
            for &center in &centers {
                assert!((point - assigned_center).abs() <= (point - center).abs());
            }
        }
    }

    #[test]
    fn test_two_clusters_ordered() {
        let data = vec![2.0, 2.1, 1.9, 8.0, 8.2, 7.8, 2.05];
        let (centers, assignments) = k_means_1_d(&data, 2, 100, 1e-6);

        assert!(centers[0] < centers[1]);
        assert_eq!(assignments, vec![0, 0, 0, 1, 1, 1, 0]);
    }
}
