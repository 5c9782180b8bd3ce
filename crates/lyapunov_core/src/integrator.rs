//! Checkpointed ODE integration.
//!
//! `OdeIntegrator` wraps the steppers in [`crate::solvers`] behind the
//! [`Integrator`] contract used by the continuous estimators: advance to a
//! checkpoint, then read or overwrite the state buffer.

use crate::{
    error::LyapunovError,
    solvers::{Tsit5, RK4},
    traits::{DynamicalSystem, Integrator, Steppable},
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegratorMethod {
    /// Adaptive Tsitouras 5(4) controlled by `abstol`/`reltol`.
    Tsit5,
    /// Fixed-step RK4; tolerances are ignored.
    Rk4 { step: f64 },
}

/// Settings shared by every integrator an estimator creates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: IntegratorMethod,
    pub abstol: f64,
    pub reltol: f64,
    /// First step attempted by the adaptive method. Estimated from the vector
    /// field when absent.
    pub initial_step: Option<f64>,
    /// Upper bound on substeps (accepted or rejected) per `advance_to` call.
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: IntegratorMethod::Tsit5,
            abstol: 1e-9,
            reltol: 1e-9,
            initial_step: None,
            max_steps: 1_000_000,
        }
    }
}

impl IntegratorSettings {
    pub fn is_adaptive(&self) -> bool {
        matches!(self.method, IntegratorMethod::Tsit5)
    }

    pub fn validate(&self) -> Result<()> {
        let tolerance_ok = |v: f64| v.is_finite() && v > 0.0;
        if self.is_adaptive() && !(tolerance_ok(self.abstol) && tolerance_ok(self.reltol)) {
            return Err(LyapunovError::InvalidTolerance {
                abstol: self.abstol,
                reltol: self.reltol,
            }
            .into());
        }
        if let IntegratorMethod::Rk4 { step } = self.method {
            if !step.is_finite() || step <= 0.0 {
                bail!("RK4 step must be positive and finite, got {step}.");
            }
        }
        if let Some(step) = self.initial_step {
            if !step.is_finite() || step <= 0.0 {
                bail!("Initial step must be positive and finite, got {step}.");
            }
        }
        if self.max_steps == 0 {
            return Err(LyapunovError::EmptyBudget("max_steps").into());
        }
        Ok(())
    }

    /// Creates an integrator for `system` starting from `state` at time `t0`.
    pub fn build<S: DynamicalSystem>(
        &self,
        system: S,
        t0: f64,
        state: Vec<f64>,
    ) -> Result<OdeIntegrator<S>> {
        self.validate()?;
        let dim = system.dimension();
        if state.len() != dim {
            return Err(LyapunovError::DimensionMismatch {
                expected: dim,
                found: state.len(),
            }
            .into());
        }
        let (stepper, proposed) = match self.method {
            IntegratorMethod::Rk4 { step } => (InternalStepper::Rk4(RK4::new(dim)), step),
            IntegratorMethod::Tsit5 => {
                let proposed = match self.initial_step {
                    Some(step) => step,
                    None => initial_step(&system, t0, &state, self.abstol, self.reltol),
                };
                (InternalStepper::Tsit5(Tsit5::new(dim)), proposed)
            }
        };
        Ok(OdeIntegrator {
            system,
            stepper,
            settings: *self,
            t: t0,
            state,
            proposed,
        })
    }
}

enum InternalStepper {
    Rk4(RK4),
    Tsit5(Tsit5),
}

/// Integrator over an owned (or borrowed, via `&S`) system.
pub struct OdeIntegrator<S> {
    system: S,
    stepper: InternalStepper,
    settings: IntegratorSettings,
    t: f64,
    state: Vec<f64>,
    proposed: f64,
}

impl<S: DynamicalSystem> OdeIntegrator<S> {
    fn failure(&self, reason: impl Into<String>) -> anyhow::Error {
        LyapunovError::IntegrationFailed {
            time: self.t,
            reason: reason.into(),
        }
        .into()
    }
}

impl<S: DynamicalSystem> Integrator for OdeIntegrator<S> {
    fn time(&self) -> f64 {
        self.t
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }

    fn advance_to(&mut self, checkpoint: f64) -> Result<()> {
        if !checkpoint.is_finite() {
            return Err(self.failure(format!("checkpoint {checkpoint} is not finite")));
        }
        if checkpoint < self.t {
            return Err(self.failure(format!(
                "checkpoint {checkpoint} lies behind the integrator clock"
            )));
        }

        // Remainders below this are absorbed by snapping the clock.
        let snap = 1e-12 * checkpoint.abs().max(1.0);
        let mut substeps = 0usize;

        while checkpoint - self.t > snap {
            if substeps >= self.settings.max_steps {
                return Err(self.failure(format!(
                    "exceeded {} substeps before reaching {checkpoint}",
                    self.settings.max_steps
                )));
            }
            substeps += 1;

            let remaining = checkpoint - self.t;
            let clipped = self.proposed >= remaining;
            let dt = if clipped { remaining } else { self.proposed };
            if dt <= f64::EPSILON * self.t.abs().max(1.0) {
                return Err(self.failure(format!("step size underflow (dt = {dt:e})")));
            }

            match &mut self.stepper {
                InternalStepper::Rk4(rk4) => {
                    rk4.step(&self.system, &mut self.t, &mut self.state, dt);
                }
                InternalStepper::Tsit5(tsit5) => {
                    let err = tsit5.attempt(
                        &self.system,
                        self.t,
                        &self.state,
                        dt,
                        self.settings.abstol,
                        self.settings.reltol,
                    );
                    if err <= 1.0 {
                        self.state.copy_from_slice(tsit5.candidate());
                        self.t += dt;
                        let factor = if err == 0.0 {
                            MAX_FACTOR
                        } else {
                            (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                        };
                        // A step shortened to hit the checkpoint should not shrink the proposal.
                        self.proposed = if clipped {
                            self.proposed.max(dt * factor)
                        } else {
                            dt * factor
                        };
                    } else {
                        let factor = if err.is_finite() {
                            (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                        } else {
                            MIN_FACTOR
                        };
                        trace!(t = self.t, dt, err, "rejected step");
                        self.proposed = dt * factor;
                    }
                }
            }
            if self.state.iter().any(|v| !v.is_finite()) {
                return Err(self.failure("state became non-finite"));
            }
        }

        self.t = checkpoint;
        Ok(())
    }

    fn proposed_step(&self) -> f64 {
        self.proposed
    }

    fn set_proposed_step(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.proposed = dt;
        }
    }
}

/// Starting step estimate after Hairer, Nørsett & Wanner (II.4).
fn initial_step<S: DynamicalSystem>(
    system: &S,
    t0: f64,
    state: &[f64],
    abstol: f64,
    reltol: f64,
) -> f64 {
    let n = state.len();
    let rms = |v: &[f64]| -> f64 {
        let sum: f64 = v
            .iter()
            .zip(state)
            .map(|(x, y0)| {
                let r = x / (abstol + reltol * y0.abs());
                r * r
            })
            .sum();
        (sum / n as f64).sqrt()
    };

    let mut f0 = vec![0.0; n];
    system.apply(t0, state, &mut f0);
    let d0 = rms(state);
    let d1 = rms(f0.as_slice());
    let h0 = if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    };

    let y1: Vec<f64> = state.iter().zip(&f0).map(|(y, f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; n];
    system.apply(t0 + h0, &y1, &mut f1);
    let diff: Vec<f64> = f1.iter().zip(&f0).map(|(a, b)| a - b).collect();
    let d2 = rms(diff.as_slice()) / h0;

    let dmax = d1.max(d2);
    let h1 = if dmax <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / dmax).powf(0.2)
    };
    let h = (100.0 * h0).min(h1);
    if h.is_finite() && h > 0.0 {
        h
    } else {
        1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::{IntegratorMethod, IntegratorSettings};
    use crate::error::LyapunovError;
    use crate::traits::{DynamicalSystem, Integrator};
    use approx::assert_abs_diff_eq;

    struct Oscillator;

    impl DynamicalSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    #[test]
    fn adaptive_integrator_lands_exactly_on_checkpoints() {
        let settings = IntegratorSettings::default();
        let mut integrator = settings.build(Oscillator, 0.0, vec![1.0, 0.0]).unwrap();
        for k in 1..=10 {
            let checkpoint = 0.3 * k as f64;
            integrator.advance_to(checkpoint).unwrap();
            assert_eq!(integrator.time(), checkpoint);
        }
        let t = integrator.time();
        assert_abs_diff_eq!(integrator.state()[0], t.cos(), epsilon = 1e-7);
        assert_abs_diff_eq!(integrator.state()[1], -t.sin(), epsilon = 1e-7);
    }

    #[test]
    fn fixed_step_integrator_matches_solution() {
        let settings = IntegratorSettings {
            method: IntegratorMethod::Rk4 { step: 0.01 },
            ..IntegratorSettings::default()
        };
        let mut integrator = settings.build(Oscillator, 0.0, vec![1.0, 0.0]).unwrap();
        integrator.advance_to(1.234).unwrap();
        assert_eq!(integrator.time(), 1.234);
        assert_abs_diff_eq!(integrator.state()[0], 1.234_f64.cos(), epsilon = 1e-8);
    }

    #[test]
    fn state_mutation_restarts_from_written_state() {
        let settings = IntegratorSettings::default();
        let mut integrator = settings.build(Oscillator, 0.0, vec![1.0, 0.0]).unwrap();
        integrator.advance_to(1.0).unwrap();
        integrator.state_mut().copy_from_slice(&[0.0, 1.0]);
        integrator.advance_to(1.5).unwrap();
        // Started from (0, 1) at t = 1: x = sin(0.5), v = cos(0.5).
        assert_abs_diff_eq!(integrator.state()[0], 0.5_f64.sin(), epsilon = 1e-7);
        assert_abs_diff_eq!(integrator.state()[1], 0.5_f64.cos(), epsilon = 1e-7);
    }

    #[test]
    fn advance_to_rejects_past_checkpoints() {
        let settings = IntegratorSettings::default();
        let mut integrator = settings.build(Oscillator, 1.0, vec![1.0, 0.0]).unwrap();
        let err = integrator.advance_to(0.5).expect_err("cannot integrate backwards");
        assert!(matches!(
            err.downcast_ref::<LyapunovError>(),
            Some(LyapunovError::IntegrationFailed { .. })
        ));
    }

    #[test]
    fn max_steps_guard_aborts_long_integrations() {
        let settings = IntegratorSettings {
            method: IntegratorMethod::Rk4 { step: 0.1 },
            max_steps: 5,
            ..IntegratorSettings::default()
        };
        let mut integrator = settings.build(Oscillator, 0.0, vec![1.0, 0.0]).unwrap();
        assert!(integrator.advance_to(0.4).is_ok());
        assert!(integrator.advance_to(10.0).is_err());
    }

    #[test]
    fn validate_rejects_non_positive_tolerances() {
        let settings = IntegratorSettings {
            abstol: 0.0,
            ..IntegratorSettings::default()
        };
        let err = settings.validate().expect_err("zero abstol is invalid");
        assert!(matches!(
            err.downcast_ref::<LyapunovError>(),
            Some(LyapunovError::InvalidTolerance { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_step_sizes() {
        let fixed = IntegratorSettings {
            method: IntegratorMethod::Rk4 { step: 0.0 },
            ..IntegratorSettings::default()
        };
        let err = fixed.validate().expect_err("zero RK4 step is invalid");
        assert!(err.to_string().contains("RK4 step"));

        let adaptive = IntegratorSettings {
            initial_step: Some(f64::NAN),
            ..IntegratorSettings::default()
        };
        let err = adaptive.validate().expect_err("NaN initial step is invalid");
        assert!(err.to_string().contains("Initial step"));
    }

    #[test]
    fn proposed_step_can_be_overridden() {
        let settings = IntegratorSettings::default();
        let mut integrator = settings.build(Oscillator, 0.0, vec![1.0, 0.0]).unwrap();
        integrator.set_proposed_step(0.025);
        assert_eq!(integrator.proposed_step(), 0.025);
        integrator.set_proposed_step(-1.0);
        assert_eq!(integrator.proposed_step(), 0.025);
    }
}
