use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut2, Axis};

/// Computes softmax along the last dimension of a 2D array
pub fn softmax_2d(matrix: &mut ArrayViewMut2<f32>) {
    for mut row in matrix.rows_mut() {
        // Find max value, ignoring NaNs and infinities
        let max = row.fold(f32::NEG_INFINITY, |a, &b| {
            if b.is_nan() || b.is_infinite() { a } else { a.max(b) }
        });

        // If we got -inf (all values were non-finite), set to uniform distribution
        if max == f32::NEG_INFINITY {
            row.fill(1.0 / row.len() as f32);
            continue;
        }

        let mut sum = 0.0f32;
        for val in row.iter_mut() {
            *val = (*val - max).exp();
            sum += *val;
        }

        sum = sum.max(1e-20);
        for val in row.iter_mut() {
            *val /= sum;
        }
    }
}

/// Index of the largest entry of every row (first one wins on ties)
pub fn argmax_rows(matrix: ArrayView2<f32>) -> Array1<usize> {
    matrix.map_axis(Axis(1), |row| {
        let mut best = 0;
        for (i, &v) in row.iter().enumerate() {
            if v > row[best] {
                best = i;
            }
        }
        best
    })
}

/// Rows whose target vector has any non-zero entry.
///
/// Unlabeled examples are encoded as an all-zero target row.
pub fn labeled_rows(targets: ArrayView2<f32>) -> Vec<usize> {
    targets
        .outer_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&v| v != 0.0))
        .map(|(i, _)| i)
        .collect()
}

/// Gathers the given rows of `matrix` into a new array
pub fn select_rows(matrix: ArrayView2<f32>, rows: &[usize]) -> Array2<f32> {
    matrix.select(Axis(0), rows)
}

/// Sign function with `sign(0) == 0`, matching the subgradient of `|x|`
#[inline]
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
