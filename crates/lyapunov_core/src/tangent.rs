//! Tangent-space evolution for maps and flows.

use crate::{
    qr::positive_qr,
    solvers::DiscreteMap,
    traits::{DynamicalSystem, Steppable},
};
use nalgebra::DMatrix;
use std::cell::RefCell;

/// Advances a map state together with an orthonormal tangent frame.
///
/// Each step forms `K = J(u) · Q` with the Jacobian taken at the pre-step
/// state, re-orthonormalizes `K = Q' R`, then applies the map to `u`.
pub struct DiscreteTangentIterator<'a, S> {
    system: &'a S,
    stepper: DiscreteMap,
    t: f64,
    state: Vec<f64>,
    frame: DMatrix<f64>,
    jacobian: Vec<f64>,
}

impl<'a, S: DynamicalSystem> DiscreteTangentIterator<'a, S> {
    /// `frame` must have `state.len()` rows; its column count is the number
    /// of tracked directions.
    pub fn new(system: &'a S, t0: f64, state: Vec<f64>, frame: DMatrix<f64>) -> Self {
        let dim = state.len();
        debug_assert_eq!(frame.nrows(), dim);
        Self {
            system,
            stepper: DiscreteMap::new(dim),
            t: t0,
            state,
            frame,
            jacobian: vec![0.0; dim * dim],
        }
    }

    /// Performs one coupled step and returns the triangular factor `R`.
    pub fn step(&mut self) -> DMatrix<f64> {
        let dim = self.state.len();
        self.system.jacobian(self.t, &self.state, &mut self.jacobian);
        let j = DMatrix::from_row_slice(dim, dim, &self.jacobian);
        let (q, r) = positive_qr(j * &self.frame);
        self.frame = q;
        self.stepper
            .step(self.system, &mut self.t, &mut self.state, 1.0);
        r
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn frame(&self) -> &DMatrix<f64> {
        &self.frame
    }

    pub fn time(&self) -> f64 {
        self.t
    }
}

/// Augmented flow over a column-major `D × (k + 1)` buffer: column 0 holds
/// the state `u`, columns `1..=k` the tangent block `Y`.
///
/// `dS/dt = [f(u), J(u) · Y]`, so every tangent column is propagated by the
/// Jacobian of the co-evolving trajectory.
pub struct TangentBundle<S> {
    inner: S,
    dimension: usize,
    columns: usize,
    jacobian: RefCell<Vec<f64>>,
}

impl<S: DynamicalSystem> TangentBundle<S> {
    /// Tracks `columns` tangent directions of `inner`.
    pub fn new(inner: S, columns: usize) -> Self {
        let dimension = inner.dimension();
        Self {
            inner,
            dimension,
            columns,
            jacobian: RefCell::new(vec![0.0; dimension * dimension]),
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Lays out `state` and `frame` as an augmented buffer.
    pub fn pack(&self, state: &[f64], frame: &DMatrix<f64>) -> Vec<f64> {
        let mut buffer = Vec::with_capacity(self.dimension * (self.columns + 1));
        buffer.extend_from_slice(state);
        buffer.extend_from_slice(frame.as_slice());
        buffer
    }

    /// Overwrites the tangent block of `buffer` with `frame`.
    pub fn write_frame(&self, buffer: &mut [f64], frame: &DMatrix<f64>) {
        buffer[self.dimension..].copy_from_slice(frame.as_slice());
    }

    /// Reads the tangent block of `buffer` as a `D × k` matrix.
    pub fn frame(&self, buffer: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(self.dimension, self.columns, &buffer[self.dimension..])
    }

    pub fn state<'b>(&self, buffer: &'b [f64]) -> &'b [f64] {
        &buffer[..self.dimension]
    }
}

impl<S: DynamicalSystem> DynamicalSystem for TangentBundle<S> {
    fn dimension(&self) -> usize {
        self.dimension * (self.columns + 1)
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) {
        let n = self.dimension;
        let (u, y) = x.split_at(n);
        let (du, dy) = out.split_at_mut(n);

        self.inner.apply(t, u, du);

        let mut jacobian = self.jacobian.borrow_mut();
        self.inner.jacobian(t, u, &mut jacobian);

        // dY[:, c] = J · Y[:, c], column-major blocks.
        for c in 0..self.columns {
            let column = &y[c * n..(c + 1) * n];
            let target = &mut dy[c * n..(c + 1) * n];
            for i in 0..n {
                let row = &jacobian[i * n..(i + 1) * n];
                target[i] = row.iter().zip(column).map(|(a, b)| a * b).sum();
            }
        }
    }
}
