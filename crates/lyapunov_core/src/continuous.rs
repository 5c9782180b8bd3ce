//! Lyapunov exponents of continuous flows.
//!
//! Both estimators drive [`Integrator`]s through fixed checkpoints: the
//! spectrum estimator integrates a [`TangentBundle`] and re-orthonormalizes its
//! tangent block at every checkpoint, the Benettin estimator advances a
//! primary/shadow pair in lock-step and rescales on divergence.

use crate::{
    error::LyapunovError,
    integrator::IntegratorSettings,
    qr::{accumulate_log_diagonal, positive_qr},
    settings::{ContinuousBenettinSettings, ContinuousSpectrumSettings},
    system::{displaced_state, euclidean_distance, Dynamics, SystemKind},
    tangent::TangentBundle,
    traits::{DynamicalSystem, Integrator, RescalePolicy},
    validation::{exponent_count, validate_rescaling, ToleranceWarning},
};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use serde::Serialize;
use tracing::debug;

/// Running exponent recorded at every rescale, measured from the end of the
/// transient.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvergenceTrace {
    pub times: Vec<f64>,
    pub exponents: Vec<f64>,
}

impl ConvergenceTrace {
    fn push(&mut self, time: f64, exponent: f64) {
        self.times.push(time);
        self.exponents.push(exponent);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenettinOutcome {
    /// Running exponent at the last rescale; `0.0` when none occurred.
    pub exponent: f64,
    pub rescales: usize,
    /// Present when `record_trace` was requested.
    pub trace: Option<ConvergenceTrace>,
    /// Tolerance findings from validation; the run proceeds regardless.
    pub warnings: Vec<ToleranceWarning>,
}

/// Lyapunov spectrum of a flow via the tangent bundle and QR at each of
/// `checkpoints` equally spaced times.
///
/// Exponents are returned in QR column order.
pub fn continuous_spectrum<S: DynamicalSystem>(
    dynamics: &Dynamics<S>,
    settings: &ContinuousSpectrumSettings,
) -> Result<Vec<f64>> {
    dynamics.expect_kind(SystemKind::Flow)?;
    if settings.checkpoints == 0 {
        return Err(LyapunovError::EmptyBudget("checkpoints").into());
    }
    check_spacing(settings.dt)?;
    check_transient(settings.transient)?;
    settings.integrator.validate()?;
    let dim = dynamics.dimension();
    let count = exponent_count(settings.exponents, dim)?;

    debug!(
        dimension = dim,
        exponents = count,
        checkpoints = settings.checkpoints,
        dt = settings.dt,
        transient = settings.transient,
        "continuous spectrum"
    );

    let (start, state) = settle(dynamics, settings.transient, &settings.integrator)?;

    let bundle = TangentBundle::new(dynamics.system(), count);
    let mut frame = DMatrix::identity(dim, count);
    let buffer = bundle.pack(&state, &frame);
    let mut integrator = settings.integrator.build(&bundle, start, buffer)?;

    let mut accum = vec![0.0; bundle.columns()];
    for idx in 1..=settings.checkpoints {
        bundle.write_frame(integrator.state_mut(), &frame);
        integrator.advance_to(start + idx as f64 * settings.dt)?;
        let (q, r) = positive_qr(bundle.frame(integrator.state()));
        accumulate_log_diagonal(&r, &mut accum);
        frame = q;
    }

    let elapsed = settings.checkpoints as f64 * settings.dt;
    for value in &mut accum {
        *value /= elapsed;
    }
    Ok(accum)
}

/// Maximal exponent of a flow with the Benettin two-trajectory method.
///
/// Separation parameters and tolerances are validated before anything is
/// integrated. Distances are compared at checkpoints `dt, 2dt, …` up to the
/// horizon; a threshold crossing at the first checkpoint after the start or
/// after a rescale means `dt` is too coarse and fails with
/// [`LyapunovError::SameStepDivergence`].
pub fn continuous_benettin<S, R>(
    dynamics: &Dynamics<S>,
    settings: &ContinuousBenettinSettings,
    mut rescale: R,
) -> Result<BenettinOutcome>
where
    S: DynamicalSystem,
    R: RescalePolicy,
{
    dynamics.expect_kind(SystemKind::Flow)?;
    let warnings =
        validate_rescaling(settings.d0, settings.threshold, Some(&settings.integrator))?;
    if !settings.horizon.is_finite() || settings.horizon <= 0.0 {
        return Err(LyapunovError::EmptyBudget("horizon").into());
    }
    check_spacing(settings.dt)?;
    check_transient(settings.transient)?;
    settings.integrator.validate()?;

    let d0 = settings.d0;
    let threshold = settings.threshold;
    let (start, state) = settle(dynamics, settings.transient, &settings.integrator)?;
    let shadow_state = displaced_state(&state, d0);
    let mut primary = settings.integrator.build(dynamics.system(), start, state)?;
    let mut shadow = settings
        .integrator
        .build(dynamics.system(), start, shadow_state)?;
    shadow.set_proposed_step(primary.proposed_step());

    let end = start + settings.horizon;
    let checkpoints = ((settings.horizon / settings.dt) - 1e-9).ceil().max(1.0) as usize;

    let mut log_sum = 0.0;
    let mut exponent = 0.0;
    let mut rescales = 0usize;
    let mut since_rescale = 0usize;
    let mut trace = settings.record_trace.then(ConvergenceTrace::default);

    for idx in 1..=checkpoints {
        let checkpoint = (start + idx as f64 * settings.dt).min(end);
        primary.advance_to(checkpoint)?;
        shadow.advance_to(checkpoint)?;
        since_rescale += 1;

        let distance = euclidean_distance(primary.state(), shadow.state());
        if distance < threshold {
            continue;
        }
        if since_rescale == 1 {
            return Err(LyapunovError::SameStepDivergence {
                time: checkpoint,
                distance,
                threshold,
            }
            .into());
        }

        log_sum += (distance / d0).ln();
        let elapsed = checkpoint - start;
        exponent = log_sum / elapsed;
        rescales += 1;
        if let Some(trace) = trace.as_mut() {
            trace.push(elapsed, exponent);
        }
        debug!(time = checkpoint, distance, exponent, "rescale");

        rescale.rescale(shadow.state_mut(), primary.state(), d0);
        shadow.set_proposed_step(primary.proposed_step());
        since_rescale = 0;
    }

    debug!(exponent, rescales, horizon = settings.horizon, "continuous benettin");
    Ok(BenettinOutcome {
        exponent,
        rescales,
        trace,
        warnings,
    })
}

/// Integrates the plain flow through the transient; returns the clock and
/// state at its end.
fn settle<S: DynamicalSystem>(
    dynamics: &Dynamics<S>,
    transient: f64,
    integrator: &IntegratorSettings,
) -> Result<(f64, Vec<f64>)> {
    let t0 = dynamics.time();
    if transient == 0.0 {
        return Ok((t0, dynamics.state().to_vec()));
    }
    let mut flow = integrator.build(dynamics.system(), t0, dynamics.state().to_vec())?;
    flow.advance_to(t0 + transient)?;
    Ok((flow.time(), flow.state().to_vec()))
}

fn check_spacing(dt: f64) -> Result<()> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(LyapunovError::InvalidCheckpointSpacing(dt).into());
    }
    Ok(())
}

fn check_transient(transient: f64) -> Result<()> {
    if !transient.is_finite() || transient < 0.0 {
        bail!("Transient time must be non-negative, got {transient}.");
    }
    Ok(())
}
