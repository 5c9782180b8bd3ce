use nalgebra::linalg::QR;
use nalgebra::DMatrix;

/// QR decomposition with a non-negative diagonal in `R`.
///
/// Plain Householder QR is only unique up to column signs; flipping each
/// negative `R[i, i]` together with column `i` of `Q` makes the result
/// deterministic. Tall `D × k` input yields the thin factorization
/// (`Q` is `D × k`, `R` is `k × k`).
///
/// Rank-deficient input is not rejected: the corresponding diagonal entries
/// are zero or tiny and their logarithms show up as very negative values.
pub fn positive_qr(matrix: DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
    let (mut q, mut r) = QR::new(matrix).unpack();
    for i in 0..r.nrows().min(r.ncols()) {
        if r[(i, i)] < 0.0 {
            for row in 0..q.nrows() {
                q[(row, i)] = -q[(row, i)];
            }
            for col in i..r.ncols() {
                r[(i, col)] = -r[(i, col)];
            }
        }
    }
    (q, r)
}

/// Adds `ln R[i, i]` to `accum[i]` for every tracked direction.
pub fn accumulate_log_diagonal(r: &DMatrix<f64>, accum: &mut [f64]) {
    for (i, sum) in accum.iter_mut().enumerate() {
        // Non-negative after `positive_qr`; a zero entry contributes -inf.
        *sum += r[(i, i)].abs().ln();
    }
}

/// Returns the exponents ordered from largest to smallest.
///
/// Estimators report exponents in QR column order, which is usually but not
/// necessarily descending.
pub fn sorted_descending(exponents: &[f64]) -> Vec<f64> {
    let mut sorted = exponents.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted
}

#[cfg(test)]
mod tests {
    use super::{accumulate_log_diagonal, positive_qr, sorted_descending};
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    #[test]
    fn positive_qr_reconstructs_input_with_non_negative_diagonal() {
        let matrix = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.5, -3.0, 4.0, 1.0, 0.0, -2.0, 5.0]);
        let (q, r) = positive_qr(matrix.clone());

        for i in 0..3 {
            assert!(r[(i, i)] >= 0.0);
            for j in 0..i {
                assert_eq!(r[(i, j)], 0.0);
            }
        }
        let qtq = q.transpose() * &q;
        let identity = DMatrix::<f64>::identity(3, 3);
        assert!((qtq - identity).amax() < 1e-12);
        assert!((&q * &r - matrix).amax() < 1e-12);
    }

    #[test]
    fn positive_qr_is_bit_identical_across_calls() {
        let matrix = DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, 3.0, -4.0]);
        let first = positive_qr(matrix.clone());
        let second = positive_qr(matrix);
        assert_eq!(first.0.as_slice(), second.0.as_slice());
        assert_eq!(first.1.as_slice(), second.1.as_slice());
    }

    #[test]
    fn positive_qr_handles_tall_frames() {
        let matrix = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, -2.0, 0.0, 0.0]);
        let (q, r) = positive_qr(matrix);
        assert_eq!(q.shape(), (3, 2));
        assert_eq!(r.shape(), (2, 2));
        assert_abs_diff_eq!(r[(0, 0)], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(r[(1, 1)], 2.0, epsilon = 1e-15);
        assert_abs_diff_eq!(q[(1, 1)], -1.0, epsilon = 1e-15);
    }

    #[test]
    fn singular_matrix_degrades_to_negative_infinity() {
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let (_, r) = positive_qr(matrix);
        let mut accum = vec![0.0; 2];
        accumulate_log_diagonal(&r, &mut accum);
        assert_abs_diff_eq!(accum[0], 2.0_f64.sqrt().ln(), epsilon = 1e-12);
        assert!(accum[1] < -30.0);
    }

    #[test]
    fn sorted_descending_orders_largest_first() {
        assert_eq!(sorted_descending(&[-1.0, 0.5, 0.0]), vec![0.5, 0.0, -1.0]);
    }
}
