//! Sanity checks run before any Benettin evolution.

use crate::{error::LyapunovError, integrator::IntegratorSettings};
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Tolerances above `TOLERANCE_RATIO · d0` are reported.
pub const TOLERANCE_RATIO: f64 = 10.0;

/// Non-fatal finding: integration error at the configured tolerance could
/// exceed the rescaling distance and masquerade as divergence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ToleranceWarning {
    Absolute { abstol: f64, d0: f64 },
    Relative { reltol: f64, d0: f64 },
}

impl fmt::Display for ToleranceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToleranceWarning::Absolute { abstol, d0 } => write!(
                f,
                "absolute tolerance {abstol:e} exceeds {TOLERANCE_RATIO}·d0 (d0 = {d0:e})"
            ),
            ToleranceWarning::Relative { reltol, d0 } => write!(
                f,
                "relative tolerance {reltol:e} exceeds {TOLERANCE_RATIO}·d0 (d0 = {d0:e})"
            ),
        }
    }
}

/// Checks the separation parameters and, for continuous runs, the integrator
/// tolerances.
///
/// Fails when `d0` is not positive and finite or when `threshold ≤ d0`.
/// Tolerance findings are logged and returned; fixed-step integrators have no
/// tolerances to check.
pub fn validate_rescaling(
    d0: f64,
    threshold: f64,
    integrator: Option<&IntegratorSettings>,
) -> Result<Vec<ToleranceWarning>> {
    if !d0.is_finite() || d0 <= 0.0 {
        return Err(LyapunovError::InvalidSeparation(d0).into());
    }
    if !(threshold > d0) {
        return Err(LyapunovError::ThresholdNotAboveSeparation { d0, threshold }.into());
    }

    let mut warnings = Vec::new();
    if let Some(settings) = integrator.filter(|s| s.is_adaptive()) {
        let limit = TOLERANCE_RATIO * d0;
        if settings.abstol > limit {
            warnings.push(ToleranceWarning::Absolute {
                abstol: settings.abstol,
                d0,
            });
        }
        if settings.reltol > limit {
            warnings.push(ToleranceWarning::Relative {
                reltol: settings.reltol,
                d0,
            });
        }
    }
    for warning in &warnings {
        warn!("{warning}; divergence measurements may be dominated by integration error");
    }
    Ok(warnings)
}

/// Resolves how many exponents a spectrum estimator tracks.
pub(crate) fn exponent_count(requested: Option<usize>, dimension: usize) -> Result<usize> {
    let count = requested.unwrap_or(dimension);
    if count == 0 || count > dimension {
        return Err(LyapunovError::InvalidExponentCount {
            requested: count,
            dimension,
        }
        .into());
    }
    Ok(count)
}
