use crate::system::SystemKind;
use thiserror::Error;

/// Failures raised by the estimators.
///
/// Public operations return `anyhow::Result`; these variants can be recovered
/// with `downcast_ref::<LyapunovError>()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LyapunovError {
    #[error("Rescale threshold ({threshold:e}) must exceed the initial separation d0 ({d0:e}).")]
    ThresholdNotAboveSeparation { d0: f64, threshold: f64 },

    #[error("Initial separation d0 must be positive and finite, got {0:e}.")]
    InvalidSeparation(f64),

    #[error("Checkpoint spacing dt must be positive and finite, got {0}.")]
    InvalidCheckpointSpacing(f64),

    #[error("Integrator tolerances must be positive and finite (abstol = {abstol:e}, reltol = {reltol:e}).")]
    InvalidTolerance { abstol: f64, reltol: f64 },

    #[error("{0} must be positive.")]
    EmptyBudget(&'static str),

    #[error("Cannot track {requested} exponents of a {dimension}-dimensional system.")]
    InvalidExponentCount { requested: usize, dimension: usize },

    #[error("State dimension mismatch. Expected {expected}, got {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Estimator expects a {expected:?} system, got a {found:?}.")]
    KindMismatch {
        expected: SystemKind,
        found: SystemKind,
    },

    #[error(
        "Separation {distance:e} reached the threshold {threshold:e} within a single checkpoint \
         (elapsed time {time}). Decrease dt or d0, or increase the threshold."
    )]
    SameStepDivergence {
        time: f64,
        distance: f64,
        threshold: f64,
    },

    #[error("Integration failed at t = {time}: {reason}")]
    IntegrationFailed { time: f64, reason: String },
}
