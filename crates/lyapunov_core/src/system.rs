use crate::{
    error::LyapunovError,
    integrator::IntegratorSettings,
    solvers::DiscreteMap,
    traits::{DynamicalSystem, Integrator, Steppable},
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemKind {
    Flow,
    Map,
}

/// A caller-owned system together with its current state, clock and
/// discrete/continuous tag.
///
/// Estimators borrow a `Dynamics` immutably and evolve private copies of the
/// state. Only [`Dynamics::iterate`], [`Dynamics::evolve`] and
/// [`Dynamics::set_state`] change it.
#[derive(Debug, Clone)]
pub struct Dynamics<S> {
    system: S,
    kind: SystemKind,
    state: Vec<f64>,
    time: f64,
}

impl<S: DynamicalSystem> Dynamics<S> {
    pub fn new(system: S, kind: SystemKind, state: Vec<f64>) -> Result<Self> {
        let dim = system.dimension();
        if dim == 0 {
            bail!("System has zero dimension.");
        }
        if state.len() != dim {
            return Err(LyapunovError::DimensionMismatch {
                expected: dim,
                found: state.len(),
            }
            .into());
        }
        Ok(Self {
            system,
            kind,
            state,
            time: 0.0,
        })
    }

    pub fn map(system: S, state: Vec<f64>) -> Result<Self> {
        Self::new(system, SystemKind::Map, state)
    }

    pub fn flow(system: S, state: Vec<f64>) -> Result<Self> {
        Self::new(system, SystemKind::Flow, state)
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn kind(&self) -> SystemKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.state.len()
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_state(&mut self, state: &[f64]) -> Result<()> {
        if state.len() != self.state.len() {
            return Err(LyapunovError::DimensionMismatch {
                expected: self.state.len(),
                found: state.len(),
            }
            .into());
        }
        self.state.copy_from_slice(state);
        Ok(())
    }

    /// Applies the map `iterations` times in place.
    pub fn iterate(&mut self, iterations: usize) -> Result<()> {
        self.expect_kind(SystemKind::Map)?;
        let mut stepper = DiscreteMap::new(self.state.len());
        for _ in 0..iterations {
            stepper.step(&self.system, &mut self.time, &mut self.state, 1.0);
        }
        Ok(())
    }

    /// Integrates the flow forward by `duration` in place.
    pub fn evolve(&mut self, duration: f64, settings: &IntegratorSettings) -> Result<()> {
        self.expect_kind(SystemKind::Flow)?;
        if !duration.is_finite() || duration < 0.0 {
            bail!("Evolution time must be non-negative and finite, got {duration}.");
        }
        let mut integrator = settings.build(&self.system, self.time, self.state.clone())?;
        integrator.advance_to(self.time + duration)?;
        self.state.copy_from_slice(integrator.state());
        self.time = integrator.time();
        Ok(())
    }

    pub(crate) fn expect_kind(&self, expected: SystemKind) -> Result<()> {
        if self.kind != expected {
            return Err(LyapunovError::KindMismatch {
                expected,
                found: self.kind,
            }
            .into());
        }
        Ok(())
    }
}

pub(crate) fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Shadow initial condition at distance exactly `d0`, offset along the fixed
/// diagonal direction `(1, …, 1) / sqrt(D)`.
pub(crate) fn displaced_state(state: &[f64], d0: f64) -> Vec<f64> {
    let delta = d0 / (state.len() as f64).sqrt();
    state.iter().map(|x| x + delta).collect()
}

#[cfg(test)]
mod tests {
    use super::{displaced_state, euclidean_distance, Dynamics, SystemKind};
    use crate::error::LyapunovError;
    use crate::integrator::IntegratorSettings;
    use crate::traits::DynamicalSystem;
    use approx::assert_abs_diff_eq;

    #[derive(Debug)]
    struct Scale {
        dim: usize,
        rate: f64,
    }

    impl DynamicalSystem for Scale {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            for (o, v) in out.iter_mut().zip(x) {
                *o = self.rate * v;
            }
        }
    }

    #[test]
    fn dynamics_rejects_mismatched_state() {
        let err = Dynamics::map(Scale { dim: 2, rate: 1.0 }, vec![1.0])
            .expect_err("dimension mismatch should fail");
        assert_eq!(
            err.downcast_ref::<LyapunovError>(),
            Some(&LyapunovError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn iterate_advances_map_and_clock() {
        let mut dynamics = Dynamics::map(Scale { dim: 1, rate: 3.0 }, vec![1.0]).unwrap();
        dynamics.iterate(4).unwrap();
        assert_eq!(dynamics.state(), &[81.0]);
        assert_eq!(dynamics.time(), 4.0);
    }

    #[test]
    fn evolve_integrates_flow_and_refuses_maps() {
        let mut flow = Dynamics::flow(Scale { dim: 1, rate: -1.0 }, vec![1.0]).unwrap();
        flow.evolve(2.0, &IntegratorSettings::default()).unwrap();
        assert_abs_diff_eq!(flow.state()[0], (-2.0_f64).exp(), epsilon = 1e-7);
        assert_abs_diff_eq!(flow.time(), 2.0, epsilon = 1e-12);

        let mut map = Dynamics::map(Scale { dim: 1, rate: -1.0 }, vec![1.0]).unwrap();
        let err = map
            .evolve(1.0, &IntegratorSettings::default())
            .expect_err("maps cannot be integrated");
        assert_eq!(
            err.downcast_ref::<LyapunovError>(),
            Some(&LyapunovError::KindMismatch {
                expected: SystemKind::Flow,
                found: SystemKind::Map
            })
        );
    }

    #[test]
    fn builder_sets_clock_and_kind() {
        let mut dynamics = Dynamics::map(Scale { dim: 1, rate: 2.0 }, vec![1.0])
            .unwrap()
            .with_time(10.0);
        assert_eq!(dynamics.kind(), SystemKind::Map);
        assert_eq!(dynamics.time(), 10.0);
        dynamics.iterate(2).unwrap();
        assert_eq!(dynamics.time(), 12.0);
        let flow = Dynamics::flow(Scale { dim: 1, rate: 2.0 }, vec![1.0]).unwrap();
        assert_eq!(flow.kind(), SystemKind::Flow);
    }

    #[test]
    fn set_state_replaces_state_of_matching_length() {
        let mut dynamics = Dynamics::map(Scale { dim: 2, rate: 1.0 }, vec![0.0, 0.0]).unwrap();
        dynamics.set_state(&[1.5, -2.5]).unwrap();
        assert_eq!(dynamics.state(), &[1.5, -2.5]);

        let err = dynamics
            .set_state(&[1.0])
            .expect_err("length mismatch should fail");
        assert_eq!(
            err.downcast_ref::<LyapunovError>(),
            Some(&LyapunovError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(dynamics.state(), &[1.5, -2.5]);
    }

    #[test]
    fn displaced_state_sits_at_requested_distance() {
        let state = [0.3, -1.0, 2.0];
        let shadow = displaced_state(&state, 1e-6);
        assert_abs_diff_eq!(euclidean_distance(&state, &shadow), 1e-6, epsilon = 1e-13);
    }
}
