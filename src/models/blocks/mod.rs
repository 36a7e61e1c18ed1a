mod norm;
mod residual;

pub use norm::{BatchNorm2d, BatchNorm2dConfig, BatchStats, Mode, NormUpdates};
pub use residual::{ResidualUnit, ResidualUnitConfig};

use burn::{
    config::Config,
    tensor::{backend::Backend, Tensor},
};

// ─────────────────────────────────────────────────────────────
// Activation
//
// Parameter-free nonlinearity chosen by config. Networks hold
// it as Ignored<Activation> so the Module derive skips it; the
// losses reuse Sigmoid for accuracy thresholds.
// ─────────────────────────────────────────────────────────────

#[derive(Config, Debug, PartialEq)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    /// Negative-side slope.
    LeakyRelu(f64),
}

impl Activation {
    /// Elementwise, any rank.
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Sigmoid => burn::tensor::activation::sigmoid(x),
            Activation::Tanh => burn::tensor::activation::tanh(x),
            Activation::Relu => burn::tensor::activation::relu(x),
            Activation::LeakyRelu(slope) => burn::tensor::activation::leaky_relu(x, *slope),
        }
    }
}
