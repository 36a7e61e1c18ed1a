use crate::models::blocks::Activation;

use burn::{
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    tensor::{backend::Backend, Device, Int, Tensor},
};

/// Which side of the real/fake decision a batch of scores is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Real,
    Fake,
}

/// Min-max objectives on discriminator logits.
///
/// Both are sigmoid cross-entropies against an all-real or all-fake label:
///
/// ```text
/// L_G = BCE(D(G(z)), 1)
/// L_D = ½·BCE(D(x), 1) + ½·BCE(D(G(z)), 0)
/// ```
#[derive(Debug)]
pub struct AdversarialLoss<B: Backend> {
    bce: BinaryCrossEntropyLoss<B>,
}

impl<B: Backend> AdversarialLoss<B> {
    pub fn new(device: &Device<B>) -> Self {
        Self {
            bce: BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(device),
        }
    }

    /// The generator wants its samples scored as real.
    pub fn generator(&self, fake_scores: Tensor<B, 2>) -> Tensor<B, 1> {
        self.against(fake_scores, Label::Real)
    }

    pub fn discriminator(&self, real_scores: Tensor<B, 2>, fake_scores: Tensor<B, 2>) -> Tensor<B, 1> {
        let real = self.against(real_scores, Label::Real);
        let fake = self.against(fake_scores, Label::Fake);
        real.mul_scalar(0.5).add(fake.mul_scalar(0.5))
    }

    /// Mean sigmoid cross-entropy of `[batch, 1]` logits against one label.
    pub fn against(&self, scores: Tensor<B, 2>, label: Label) -> Tensor<B, 1> {
        let [batch, _] = scores.dims();
        let device = scores.device();
        let targets = match label {
            Label::Real => Tensor::<B, 1, Int>::ones([batch], &device),
            Label::Fake => Tensor::<B, 1, Int>::zeros([batch], &device),
        };

        self.bce.forward(scores.reshape([batch]), targets)
    }
}

/// Fraction of logits whose sigmoid lands on the `label` side of 0.5.
pub fn binary_accuracy<B: Backend>(scores: Tensor<B, 2>, label: Label) -> Tensor<B, 1> {
    let probs = Activation::Sigmoid.forward(scores);
    let hits = match label {
        Label::Real => probs.greater_elem(0.5),
        Label::Fake => probs.lower_equal_elem(0.5),
    };
    hits.float().mean()
}

/// ½·acc(real → 1) + ½·acc(fake → 0).
pub fn discriminator_accuracy<B: Backend>(
    real_scores: Tensor<B, 2>,
    fake_scores: Tensor<B, 2>,
) -> Tensor<B, 1> {
    binary_accuracy(real_scores, Label::Real)
        .mul_scalar(0.5)
        .add(binary_accuracy(fake_scores, Label::Fake).mul_scalar(0.5))
}
