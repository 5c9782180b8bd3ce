use crate::finite_diff::forward_jacobian;
use anyhow::Result;

/// A caller-supplied map `x ↦ f(t, x)` or vector field `dx/dt = f(t, x)`.
pub trait DynamicalSystem {
    fn dimension(&self) -> usize;

    /// Writes `f(t, x)` into `out`. For maps `t` is the iteration count.
    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]);

    /// Writes the Jacobian of `apply` at `x` into `out` as a row-major
    /// `dimension × dimension` matrix.
    ///
    /// Systems without an analytic Jacobian can rely on the forward-difference default.
    fn jacobian(&self, t: f64, x: &[f64], out: &mut [f64]) {
        forward_jacobian(self, t, x, out);
    }
}

impl<S: DynamicalSystem + ?Sized> DynamicalSystem for &S {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (**self).apply(t, x, out)
    }

    fn jacobian(&self, t: f64, x: &[f64], out: &mut [f64]) {
        (**self).jacobian(t, x, out)
    }
}

/// Fixed-step solvers. `t` and `state` are advanced in place.
pub trait Steppable {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64);
}

/// An ODE integrator that advances to checkpoints and exposes its state buffer.
///
/// Estimators only rely on this contract; step-size control, stage storage and
/// error norms stay internal to the implementation.
pub trait Integrator {
    /// Current internal clock.
    fn time(&self) -> f64;

    fn state(&self) -> &[f64];

    /// Direct write access to the state. The next `advance_to` continues from
    /// whatever is written here.
    fn state_mut(&mut self) -> &mut [f64];

    /// Integrates until the clock equals `checkpoint` exactly, taking as many
    /// internal substeps as needed.
    fn advance_to(&mut self, checkpoint: f64) -> Result<()>;

    /// Step size the integrator would attempt next.
    fn proposed_step(&self) -> f64;

    fn set_proposed_step(&mut self, dt: f64);
}

/// Repositions a shadow trajectory at distance `d0` from its primary after a
/// Benettin divergence event.
pub trait RescalePolicy {
    fn rescale(&mut self, shadow: &mut [f64], primary: &[f64], d0: f64);
}
