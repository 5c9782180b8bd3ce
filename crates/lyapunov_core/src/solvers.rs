use crate::traits::{DynamicalSystem, Steppable};

/// Fixed-step classical Runge-Kutta.
pub struct RK4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl RK4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for RK4 {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        let t0 = *t;
        let half = 0.5 * dt;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k1[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k2[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] += dt / 6.0 * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

// Tsitouras 5(4) tableau.
const TSIT5_C: [f64; 6] = [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0];

const TSIT5_A: [&[f64]; 6] = [
    &[],
    &[0.161],
    &[-0.008480655492356989, 0.335480655492357],
    &[2.898, -6.359447987781783, 4.361447987781783],
    &[
        5.325864858437957,
        -11.748883564062828,
        7.495539342889693,
        -0.09249506636030195,
    ],
    &[
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.02826857949054663,
    ],
];

// 5th order weights.
const TSIT5_B: [f64; 6] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436099,
    2.324710524099774,
];

// Difference between the 5th and embedded 4th order weights; the last entry
// multiplies the stage evaluated at the new point.
const TSIT5_BTILDE: [f64; 7] = [
    -0.00178001105222577714,
    -0.0008164344596567469,
    0.007880878010261995,
    -0.1447110071732629,
    0.5823571654525552,
    -0.45808210592918697,
    0.015151515151515152,
];

/// Tsitouras 5/4 Solver
///
/// Used as a fixed-step `Steppable`, or through `attempt` which also returns
/// the weighted RMS norm of the embedded error estimate.
pub struct Tsit5 {
    k: [Vec<f64>; 7],
    tmp: Vec<f64>,
    candidate: Vec<f64>,
}

impl Tsit5 {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; dim]),
            tmp: vec![0.0; dim],
            candidate: vec![0.0; dim],
        }
    }

    /// Fills the six stages and the 5th order candidate for a step of size `dt`.
    fn stages(&mut self, system: &impl DynamicalSystem, t: f64, state: &[f64], dt: f64) {
        system.apply(t, state, &mut self.k[0]);

        for stage in 1..6 {
            let row = TSIT5_A[stage];
            for i in 0..state.len() {
                let mut acc = 0.0;
                for (j, a) in row.iter().enumerate() {
                    acc += a * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            system.apply(t + TSIT5_C[stage] * dt, &self.tmp, &mut self.k[stage]);
        }

        for i in 0..state.len() {
            let mut acc = 0.0;
            for (j, b) in TSIT5_B.iter().enumerate() {
                acc += b * self.k[j][i];
            }
            self.candidate[i] = state[i] + dt * acc;
        }
    }

    /// Computes a trial step without touching `state`.
    ///
    /// Returns the error norm `sqrt(mean((e_i / (abstol + reltol * max(|y0_i|, |y1_i|)))^2))`;
    /// the step is acceptable when the norm is at most one. The candidate is
    /// available through [`Tsit5::candidate`] until the next call.
    pub fn attempt(
        &mut self,
        system: &impl DynamicalSystem,
        t: f64,
        state: &[f64],
        dt: f64,
        abstol: f64,
        reltol: f64,
    ) -> f64 {
        self.stages(system, t, state, dt);
        system.apply(t + dt, &self.candidate, &mut self.k[6]);

        let n = state.len();
        if n == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let mut err = 0.0;
            for (j, w) in TSIT5_BTILDE.iter().enumerate() {
                err += w * self.k[j][i];
            }
            err *= dt;
            let scale = abstol + reltol * state[i].abs().max(self.candidate[i].abs());
            let ratio = err / scale;
            sum += ratio * ratio;
        }
        (sum / n as f64).sqrt()
    }

    pub fn candidate(&self) -> &[f64] {
        &self.candidate
    }
}

impl Steppable for Tsit5 {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        self.stages(system, *t, state, dt);
        state.copy_from_slice(&self.candidate);
        *t += dt;
    }
}

/// Applies the map once per step: `x ← f(t, x)`, `t ← t + dt`.
///
/// `dt` only advances the clock; maps conventionally use 1.
pub struct DiscreteMap {
    tmp: Vec<f64>,
}

impl DiscreteMap {
    pub fn new(dim: usize) -> Self {
        Self {
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for DiscreteMap {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        system.apply(*t, state, &mut self.tmp);
        state.copy_from_slice(&self.tmp);
        *t += dt;
    }
}

#[cfg(test)]
mod tests {
    use super::{DiscreteMap, Tsit5, RK4};
    use crate::traits::{DynamicalSystem, Steppable};
    use approx::assert_abs_diff_eq;

    struct Decay;

    impl DynamicalSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -x[0];
        }
    }

    struct Doubling;

    impl DynamicalSystem for Doubling {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = 2.0 * x[0];
        }
    }

    #[test]
    fn rk4_tracks_exponential_decay() {
        let mut solver = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..100 {
            solver.step(&Decay, &mut t, &mut state, 0.01);
        }
        assert_abs_diff_eq!(t, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(state[0], (-1.0_f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn tsit5_fixed_step_tracks_exponential_decay() {
        let mut solver = Tsit5::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..10 {
            solver.step(&Decay, &mut t, &mut state, 0.1);
        }
        assert_abs_diff_eq!(state[0], (-1.0_f64).exp(), epsilon = 1e-7);
    }

    #[test]
    fn tsit5_error_estimate_shrinks_with_step_size() {
        let mut solver = Tsit5::new(1);
        let coarse = solver.attempt(&Decay, 0.0, &[1.0], 0.5, 1e-10, 1e-10);
        let fine = solver.attempt(&Decay, 0.0, &[1.0], 0.05, 1e-10, 1e-10);
        assert!(fine < coarse);
        assert!(coarse > 1.0);
        assert_abs_diff_eq!(solver.candidate()[0], (-0.05_f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn discrete_map_applies_map_once_per_step() {
        let mut solver = DiscreteMap::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        for _ in 0..3 {
            solver.step(&Doubling, &mut t, &mut state, 1.0);
        }
        assert_eq!(state[0], 8.0);
        assert_eq!(t, 3.0);
    }
}
