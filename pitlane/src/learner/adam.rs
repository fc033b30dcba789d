use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Adam with bias correction folded into the step size.
///
/// Moments are kept per parameter tensor; callers address tensors by a
/// stable slot index and call [`Adam::tick`] once per update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    beta1_t: f32,
    beta2_t: f32,
    m: Vec<Vec<f32>>,
    v: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self::with_betas(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            beta1_t: 1.,
            beta2_t: 1.,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Advances the timestep and returns the bias-corrected step size.
    pub fn tick(&mut self) -> f32 {
        self.beta1_t *= self.beta1;
        self.beta2_t *= self.beta2;
        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        self.learning_rate * (bc2.sqrt() / bc1)
    }

    pub fn apply<D: Dimension>(
        &mut self,
        slot: usize,
        step_size: f32,
        param: &mut Array<f32, D>,
        grad: &Array<f32, D>,
    ) {
        debug_assert_eq!(param.shape(), grad.shape());
        while self.m.len() <= slot {
            self.m.push(Vec::new());
            self.v.push(Vec::new());
        }
        let (m, v) = (&mut self.m[slot], &mut self.v[slot]);
        if m.len() != param.len() {
            *m = vec![0.; param.len()];
            *v = vec![0.; param.len()];
        }

        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        param
            .iter_mut()
            .zip(grad.iter())
            .zip(m.iter_mut())
            .zip(v.iter_mut())
            .for_each(|(((p, g), m), v)| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g.powi(2);
                *p -= step_size * *m / (v.sqrt() + eps);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn first_step_moves_by_learning_rate_against_gradient() {
        let mut adam = Adam::new(0.1);
        let mut p = array![1.0f32, -1.0];
        let g = array![2.0f32, -0.5];
        let step = adam.tick();
        adam.apply(0, step, &mut p, &g);
        assert!((p[0] - 0.9).abs() < 1e-4);
        assert!((p[1] + 0.9).abs() < 1e-4);
    }

    #[test]
    fn minimizes_a_quadratic() {
        let mut adam = Adam::new(0.05);
        let mut p = array![3.0f32];
        for _ in 0..500 {
            let g = p.mapv(|x| 2.0 * x);
            let step = adam.tick();
            adam.apply(0, step, &mut p, &g);
        }
        assert!(p[0].abs() < 0.05);
    }
}
