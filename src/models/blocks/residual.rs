// ─────────────────────────────────────────────────────────────
// ResidualUnit
//
// [BN → ReLU → Conv3x3] → BN → (+x) → ReLU → Dropout → Conv3x3 → (+x)
// Channel count and spatial size are preserved.
// ─────────────────────────────────────────────────────────────

use crate::models::blocks::{Activation, BatchNorm2d, BatchNorm2dConfig, Mode};

use burn::{
    config::Config,
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig, PaddingConfig2d,
    },
    tensor::{backend::Backend, Device, Tensor},
};

#[derive(Config, Debug)]
pub struct ResidualUnitConfig {
    pub channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl ResidualUnitConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResidualUnit<B> {
        let c = self.channels;
        let conv = || {
            Conv2dConfig::new([c, c], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        ResidualUnit {
            norm1: BatchNorm2dConfig::new(c).init(device),
            conv1: conv(),
            norm2: BatchNorm2dConfig::new(c).init(device),
            conv2: conv(),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Ignored(Activation::Relu),
        }
    }
}

#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    norm1: BatchNorm2d<B>,
    conv1: Conv2d<B>,
    norm2: BatchNorm2d<B>,
    conv2: Conv2d<B>,
    dropout: Dropout,
    activation: Ignored<Activation>,
}

impl<B: Backend> ResidualUnit<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: &mut Mode<B>) -> Tensor<B, 4> {
        let shortcut = x.clone();

        let out = self.activation.0.forward(self.norm1.forward(x, mode));
        let out = self.conv1.forward(out);

        let out = self.norm2.forward(out, mode);
        let out = self.activation.0.forward(out.add(shortcut.clone()));
        let out = if mode.is_train() {
            self.dropout.forward(out)
        } else {
            out
        };

        self.conv2.forward(out).add(shortcut)
    }

    /// Norm layers in the order a forward pass records them.
    pub fn norm_layers(&self) -> [&BatchNorm2d<B>; 2] {
        [&self.norm1, &self.norm2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blocks::NormUpdates;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, Tensor};
    use rstest::*;

    type B = NdArray;

    #[fixture]
    fn device() -> NdArrayDevice {
        NdArrayDevice::Cpu
    }

    // ── ResidualUnit: shape is preserved in both modes ─────────────────────────

    #[rstest]
    #[case::base(2, 8, 8, 8)]
    #[case::single(1, 4, 4, 4)]
    #[case::wide(3, 16, 2, 2)]
    fn residual_preserves_shape(
        device: NdArrayDevice,
        #[case] batch: usize,
        #[case] channels: usize,
        #[case] h: usize,
        #[case] w: usize,
    ) {
        let unit = ResidualUnitConfig::new(channels).init::<B>(&device);
        let x = Tensor::<B, 4>::random([batch, channels, h, w], Distribution::Normal(0.0, 1.0), &device);

        let mut updates = NormUpdates::new();
        let train = unit.forward(x.clone(), &mut Mode::Train(&mut updates));
        let infer = unit.forward(x, &mut Mode::Infer);

        assert_eq!(train.dims(), [batch, channels, h, w]);
        assert_eq!(infer.dims(), [batch, channels, h, w]);
    }

    // ── ResidualUnit: both norm layers report once per training pass ───────────

    #[rstest]
    fn residual_queues_two_updates(device: NdArrayDevice) {
        let unit = ResidualUnitConfig::new(4).init::<B>(&device);
        let x = Tensor::<B, 4>::random([2, 4, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let mut updates = NormUpdates::new();
        let _ = unit.forward(x.clone(), &mut Mode::Train(&mut updates));
        assert_eq!(updates.len(), 2);

        let _ = unit.forward(x, &mut Mode::Infer);
        assert_eq!(updates.len(), 2);

        updates.commit(&unit.norm_layers()).unwrap();
    }

    // ── ResidualUnit: inference is deterministic ───────────────────────────────

    #[rstest]
    fn residual_infer_is_deterministic(device: NdArrayDevice) {
        let unit = ResidualUnitConfig::new(4).init::<B>(&device);
        let x = Tensor::<B, 4>::random([2, 4, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let a = unit.forward(x.clone(), &mut Mode::Infer);
        let b = unit.forward(x, &mut Mode::Infer);
        assert_eq!(
            a.into_data().to_vec::<f32>().unwrap(),
            b.into_data().to_vec::<f32>().unwrap()
        );
    }

    // ── ResidualUnit: numerical sanity ─────────────────────────────────────────

    #[rstest]
    fn residual_output_is_finite(device: NdArrayDevice) {
        let unit = ResidualUnitConfig::new(8).init::<B>(&device);
        let x = Tensor::<B, 4>::random([2, 8, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let mut updates = NormUpdates::new();
        let values = unit
            .forward(x, &mut Mode::Train(&mut updates))
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(
            values.iter().all(|v| v.is_finite()),
            "ResidualUnit output contains NaN or Inf"
        );
    }
}
