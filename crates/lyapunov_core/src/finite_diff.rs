//! Forward-difference Jacobians for systems that do not provide one.

use crate::traits::DynamicalSystem;
use finitediff::FiniteDiff;

/// Approximates the row-major Jacobian of `system.apply` at `x` with forward
/// differences.
///
/// `FiniteDiff::forward_jacobian` returns one inner vector per perturbed
/// coordinate, i.e. columns of the Jacobian; they are transposed into `out`.
pub fn forward_jacobian<S: DynamicalSystem + ?Sized>(
    system: &S,
    t: f64,
    x: &[f64],
    out: &mut [f64],
) {
    let n = x.len();
    let point = x.to_vec();
    let evaluate = |p: &Vec<f64>| -> Vec<f64> {
        let mut value = vec![0.0; n];
        system.apply(t, p, &mut value);
        value
    };
    let columns = point.forward_jacobian(&evaluate);

    for (j, column) in columns.iter().enumerate() {
        for (i, derivative) in column.iter().enumerate() {
            out[i * n + j] = *derivative;
        }
    }
}
