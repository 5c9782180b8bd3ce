//! The `lyapunov_core` crate estimates Lyapunov exponents of discrete maps and
//! continuous flows supplied by the caller.
//!
//! Key components:
//! - **Traits**: `DynamicalSystem` (maps/flows with an optional Jacobian), `Steppable`
//!   (fixed-step solvers), `Integrator` (checkpointed ODE integration), `RescalePolicy`.
//! - **Solvers / Integrator**: RK4, Tsit5 and `DiscreteMap` steppers, plus `OdeIntegrator`
//!   which advances a system to fixed checkpoints with adaptive step control.
//! - **QR / Tangent**: positive-diagonal QR, the discrete tangent iterator and the
//!   `TangentBundle` augmented flow.
//! - **Estimators**: `discrete` (QR spectrum, Benettin, 1D) and `continuous`
//!   (QR spectrum, Benettin with convergence trace).
pub mod continuous;
pub mod discrete;
pub mod error;
pub mod finite_diff;
pub mod integrator;
pub mod qr;
pub mod rescale;
pub mod settings;
pub mod solvers;
pub mod system;
pub mod tangent;
pub mod traits;
pub mod validation;
