//! Rescale policies for the Benettin estimators.

use crate::system::{displaced_state, euclidean_distance};
use crate::traits::RescalePolicy;

/// Moves the shadow back along the current displacement:
/// `shadow ← primary + (shadow − primary) · d0 / |shadow − primary|`.
///
/// A zero displacement carries no direction; the shadow is then re-seeded
/// along the diagonal offset used for the initial perturbation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearRescale;

impl RescalePolicy for LinearRescale {
    fn rescale(&mut self, shadow: &mut [f64], primary: &[f64], d0: f64) {
        let distance = euclidean_distance(shadow, primary);
        if distance == 0.0 || !distance.is_finite() {
            shadow.copy_from_slice(&displaced_state(primary, d0));
            return;
        }
        let ratio = d0 / distance;
        for (s, p) in shadow.iter_mut().zip(primary) {
            *s = p + (*s - p) * ratio;
        }
    }
}

impl<F> RescalePolicy for F
where
    F: FnMut(&mut [f64], &[f64], f64),
{
    fn rescale(&mut self, shadow: &mut [f64], primary: &[f64], d0: f64) {
        self(shadow, primary, d0)
    }
}
