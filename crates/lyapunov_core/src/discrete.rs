//! Lyapunov exponents of discrete maps.

use crate::{
    error::LyapunovError,
    qr::accumulate_log_diagonal,
    rescale::LinearRescale,
    settings::{DiscreteBenettinSettings, DiscreteSpectrumSettings},
    solvers::DiscreteMap,
    system::{displaced_state, euclidean_distance, Dynamics, SystemKind},
    tangent::DiscreteTangentIterator,
    traits::{DynamicalSystem, RescalePolicy, Steppable},
    validation::{exponent_count, validate_rescaling},
};
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use tracing::debug;

/// Lyapunov spectrum of a map via repeated QR re-orthonormalization.
///
/// The transient is iterated with the bare map; the tangent frame starts at
/// the identity afterwards. Exponents are returned per iteration in QR
/// column order, which is not guaranteed to be descending (see
/// [`crate::qr::sorted_descending`]).
pub fn discrete_spectrum<S: DynamicalSystem>(
    dynamics: &Dynamics<S>,
    settings: &DiscreteSpectrumSettings,
) -> Result<Vec<f64>> {
    dynamics.expect_kind(SystemKind::Map)?;
    if settings.steps == 0 {
        return Err(LyapunovError::EmptyBudget("steps").into());
    }
    let dim = dynamics.dimension();
    let count = exponent_count(settings.exponents, dim)?;
    if dim == 1 {
        let exponent = lyapunov_1d(dynamics, settings.steps, settings.transient_steps)?;
        return Ok(vec![exponent]);
    }

    debug!(
        dimension = dim,
        exponents = count,
        steps = settings.steps,
        transient = settings.transient_steps,
        "discrete spectrum"
    );

    let (t, state) = burn_in(dynamics, settings.transient_steps);
    let mut iterator =
        DiscreteTangentIterator::new(dynamics.system(), t, state, DMatrix::identity(dim, count));
    let mut accum = vec![0.0; count];
    for _ in 0..settings.steps {
        let r = iterator.step();
        accumulate_log_diagonal(&r, &mut accum);
    }

    let steps = settings.steps as f64;
    for value in &mut accum {
        *value /= steps;
    }
    Ok(accum)
}

/// Maximal exponent of a map with the Benettin two-trajectory method and the
/// linear rescale.
pub fn discrete_benettin<S: DynamicalSystem>(
    dynamics: &Dynamics<S>,
    settings: &DiscreteBenettinSettings,
) -> Result<f64> {
    discrete_benettin_with(dynamics, settings, LinearRescale)
}

/// [`discrete_benettin`] with a caller-supplied rescale policy.
///
/// `threshold ≤ d0` is rejected before the map is evaluated. The result is
/// the accumulated `ln(distance / d0)` divided by the number of elementary
/// steps taken, not by the number of rescales. The growth accumulated when
/// the budget runs out below the threshold is included.
///
/// One-dimensional maps are routed to [`lyapunov_1d`]: `d0` and `threshold`
/// are still validated, but no shadow trajectory exists and `rescale` is never
/// invoked.
pub fn discrete_benettin_with<S, R>(
    dynamics: &Dynamics<S>,
    settings: &DiscreteBenettinSettings,
    mut rescale: R,
) -> Result<f64>
where
    S: DynamicalSystem,
    R: RescalePolicy,
{
    dynamics.expect_kind(SystemKind::Map)?;
    validate_rescaling(settings.d0, settings.threshold, None)?;
    if settings.steps == 0 {
        return Err(LyapunovError::EmptyBudget("steps").into());
    }
    if dynamics.dimension() == 1 {
        return lyapunov_1d(dynamics, settings.steps, settings.transient_steps);
    }

    let (t, primary) = burn_in(dynamics, settings.transient_steps);
    let run = BenettinRun::new(t, primary, settings);
    let (exponent, rescales) = run.execute(dynamics.system(), &mut rescale);
    debug!(exponent, rescales, steps = settings.steps, "discrete benettin");
    Ok(exponent)
}

/// Exponent of a one-dimensional map: mean of `ln|f'(x)|` along the orbit,
/// with the derivative taken at each freshly advanced state.
pub fn lyapunov_1d<S: DynamicalSystem>(
    dynamics: &Dynamics<S>,
    steps: usize,
    transient_steps: usize,
) -> Result<f64> {
    dynamics.expect_kind(SystemKind::Map)?;
    if dynamics.dimension() != 1 {
        bail!(
            "The scalar estimator requires a one-dimensional map, got dimension {}.",
            dynamics.dimension()
        );
    }
    if steps == 0 {
        return Err(LyapunovError::EmptyBudget("steps").into());
    }

    let system = dynamics.system();
    let (mut t, mut x) = burn_in(dynamics, transient_steps);
    let mut stepper = DiscreteMap::new(1);
    let mut derivative = [0.0];
    let mut sum = 0.0;
    for _ in 0..steps {
        stepper.step(system, &mut t, &mut x, 1.0);
        system.jacobian(t, &x, &mut derivative);
        sum += derivative[0].abs().ln();
    }
    Ok(sum / steps as f64)
}

fn burn_in<S: DynamicalSystem>(dynamics: &Dynamics<S>, transient_steps: usize) -> (f64, Vec<f64>) {
    let mut t = dynamics.time();
    let mut state = dynamics.state().to_vec();
    let mut stepper = DiscreteMap::new(state.len());
    for _ in 0..transient_steps {
        stepper.step(dynamics.system(), &mut t, &mut state, 1.0);
    }
    (t, state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Co-evolving both trajectories while their distance is below threshold.
    Converging,
    /// Recording the growth and pulling the shadow back to `d0`.
    Rescaling,
}

/// Loop-carried state of a Benettin run. `steps` counts elementary steps over
/// the whole run and is never reset by a rescale.
struct BenettinRun {
    phase: Phase,
    t: f64,
    primary: Vec<f64>,
    shadow: Vec<f64>,
    distance: f64,
    steps: usize,
    budget: usize,
    d0: f64,
    threshold: f64,
    log_sum: f64,
    rescales: usize,
}

impl BenettinRun {
    fn new(t: f64, primary: Vec<f64>, settings: &DiscreteBenettinSettings) -> Self {
        let shadow = displaced_state(&primary, settings.d0);
        let distance = euclidean_distance(&primary, &shadow);
        Self {
            phase: Phase::Converging,
            t,
            primary,
            shadow,
            distance,
            steps: 0,
            budget: settings.steps,
            d0: settings.d0,
            threshold: settings.threshold,
            log_sum: 0.0,
            rescales: 0,
        }
    }

    /// Runs to the step budget and returns `(exponent, rescale count)`.
    fn execute<S, R>(mut self, system: &S, rescale: &mut R) -> (f64, usize)
    where
        S: DynamicalSystem,
        R: RescalePolicy,
    {
        let mut stepper = DiscreteMap::new(self.primary.len());
        loop {
            match self.phase {
                Phase::Converging => {
                    if self.distance >= self.threshold || self.steps >= self.budget {
                        self.phase = Phase::Rescaling;
                        continue;
                    }
                    let mut t_shadow = self.t;
                    stepper.step(system, &mut self.t, &mut self.primary, 1.0);
                    stepper.step(system, &mut t_shadow, &mut self.shadow, 1.0);
                    self.steps += 1;
                    self.distance = euclidean_distance(&self.primary, &self.shadow);
                }
                Phase::Rescaling => {
                    self.log_sum += (self.distance / self.d0).ln();
                    if self.steps >= self.budget {
                        break;
                    }
                    rescale.rescale(&mut self.shadow, &self.primary, self.d0);
                    self.distance = euclidean_distance(&self.primary, &self.shadow);
                    self.rescales += 1;
                    self.phase = Phase::Converging;
                }
            }
        }
        (self.log_sum / self.steps as f64, self.rescales)
    }
}
