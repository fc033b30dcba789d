use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fully connected layer computing `x · w + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
}

impl Dense {
    /// Glorot-uniform weights scaled by `gain`, zero biases.
    pub fn new<R: Rng>(inputs: usize, outputs: usize, gain: f32, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt() * gain;
        let w = Array2::from_shape_simple_fn((inputs, outputs), || {
            if limit > 0.0 {
                rng.random_range(-limit..limit)
            } else {
                0.0
            }
        });
        Self {
            w,
            b: Array1::zeros(outputs),
        }
    }
}

/// Multi-layer perceptron with tanh hidden activations and a linear output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub layers: Vec<Dense>,
}

impl Mlp {
    /// `sizes` lists every width from input to output, e.g. `[obs, 64, 64, act]`.
    pub fn new<R: Rng>(sizes: &[usize], output_gain: f32, rng: &mut R) -> Self {
        let n = sizes.len().saturating_sub(1);
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let gain = if i + 1 == n { output_gain } else { 1.0 };
                Dense::new(pair[0], pair[1], gain, rng)
            })
            .collect();
        Self { layers }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.w.nrows())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.b.len())
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        self.forward_trace(x).0
    }

    /// Forward pass that also keeps the input of every layer for [`Mlp::backward`].
    pub fn forward_trace(&self, x: &Array2<f32>) -> (Array2<f32>, Vec<Array2<f32>>) {
        let n = self.layers.len();
        let mut inputs = Vec::with_capacity(n);
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = h.dot(&layer.w) + &layer.b;
            inputs.push(h);
            h = if i + 1 < n { z.mapv(f32::tanh) } else { z };
        }
        (h, inputs)
    }

    /// Gradients of every parameter given the loss gradient w.r.t. the output.
    pub fn backward(&self, inputs: &[Array2<f32>], d_out: Array2<f32>) -> Mlp {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut d = d_out;
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let x = &inputs[i];
            grads.push(Dense {
                w: x.t().dot(&d),
                b: d.sum_axis(Axis(0)),
            });
            if i > 0 {
                // inputs[i] is tanh of the previous layer's pre-activation.
                d = d.dot(&layer.w.t()) * &x.mapv(|h| 1.0 - h * h);
            }
        }
        grads.reverse();
        Mlp { layers: grads }
    }

    pub fn sum_squares(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.w.iter().chain(l.b.iter()).map(|g| g * g).sum::<f32>())
            .sum()
    }

    pub fn scale(&mut self, factor: f32) {
        for layer in &mut self.layers {
            layer.w *= factor;
            layer.b *= factor;
        }
    }
}
