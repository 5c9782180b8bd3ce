//! Estimator configuration.
//!
//! Every settings struct deserializes with `#[serde(default)]`, so a partial
//! configuration document only needs the fields it overrides.

use crate::integrator::IntegratorSettings;
use serde::{Deserialize, Serialize};

pub const DEFAULT_D0: f64 = 1e-9;
pub const DEFAULT_THRESHOLD: f64 = 1e-6;
pub const DEFAULT_CHECKPOINT_SPACING: f64 = 0.1;

/// QR-based spectrum of a map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscreteSpectrumSettings {
    /// Iterations accumulated into the exponents.
    pub steps: usize,
    /// Iterations discarded before measuring.
    pub transient_steps: usize,
    /// Number of leading exponents to track; all of them when absent.
    pub exponents: Option<usize>,
}

impl Default for DiscreteSpectrumSettings {
    fn default() -> Self {
        Self {
            steps: 10_000,
            transient_steps: 0,
            exponents: None,
        }
    }
}

/// Benettin maximal exponent of a map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscreteBenettinSettings {
    /// Total number of elementary steps, shared by every divergence cycle.
    pub steps: usize,
    pub transient_steps: usize,
    pub d0: f64,
    pub threshold: f64,
}

impl Default for DiscreteBenettinSettings {
    fn default() -> Self {
        Self {
            steps: 100_000,
            transient_steps: 0,
            d0: DEFAULT_D0,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// QR-based spectrum of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousSpectrumSettings {
    /// Number of renormalization checkpoints.
    pub checkpoints: usize,
    /// Time between checkpoints.
    pub dt: f64,
    /// Time integrated with the plain flow before measuring.
    pub transient: f64,
    pub exponents: Option<usize>,
    pub integrator: IntegratorSettings,
}

impl Default for ContinuousSpectrumSettings {
    fn default() -> Self {
        Self {
            checkpoints: 10_000,
            dt: DEFAULT_CHECKPOINT_SPACING,
            transient: 0.0,
            exponents: None,
            integrator: IntegratorSettings::default(),
        }
    }
}

/// Benettin maximal exponent of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousBenettinSettings {
    /// Measured time after the transient.
    pub horizon: f64,
    pub transient: f64,
    pub d0: f64,
    pub threshold: f64,
    /// Spacing of the distance checks.
    pub dt: f64,
    pub integrator: IntegratorSettings,
    /// Keep the `(time, running exponent)` pair of every rescale.
    pub record_trace: bool,
}

impl Default for ContinuousBenettinSettings {
    fn default() -> Self {
        Self {
            horizon: 1000.0,
            transient: 0.0,
            d0: DEFAULT_D0,
            threshold: DEFAULT_THRESHOLD,
            dt: DEFAULT_CHECKPOINT_SPACING,
            integrator: IntegratorSettings::default(),
            record_trace: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContinuousBenettinSettings, DiscreteBenettinSettings, DEFAULT_D0};
    use crate::integrator::IntegratorMethod;

    #[test]
    fn partial_documents_fill_in_defaults() {
        let settings: ContinuousBenettinSettings = serde_json::from_str(
            r#"{ "horizon": 250.0, "integrator": { "reltol": 1e-11 }, "record_trace": true }"#,
        )
        .unwrap();
        assert_eq!(settings.horizon, 250.0);
        assert!(settings.record_trace);
        assert_eq!(settings.d0, DEFAULT_D0);
        assert_eq!(settings.integrator.reltol, 1e-11);
        assert_eq!(settings.integrator.abstol, 1e-9);
        assert_eq!(settings.integrator.method, IntegratorMethod::Tsit5);
    }

    #[test]
    fn integrator_method_is_tagged() {
        let settings: ContinuousBenettinSettings = serde_json::from_str(
            r#"{ "integrator": { "method": { "kind": "rk4", "step": 0.005 } } }"#,
        )
        .unwrap();
        assert_eq!(
            settings.integrator.method,
            IntegratorMethod::Rk4 { step: 0.005 }
        );
    }

    #[test]
    fn default_threshold_exceeds_separation() {
        let settings = DiscreteBenettinSettings::default();
        assert!(settings.threshold > settings.d0);
    }
}
