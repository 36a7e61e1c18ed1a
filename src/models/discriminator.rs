// ─────────────────────────────────────────────────────────────
// Discriminator
//
// x [B, C, H, W]
//   → 4 × (Conv5x5 /2 → Residual → BN → LeakyReLU)     b → 2b → 4b → 8b
//   → Conv(k = H/16, valid)                            [B, 1, 1, 1]
//   → reshape                                          [B, 1]  (logit)
// ─────────────────────────────────────────────────────────────

use crate::error::Result;
use crate::models::blocks::{
    Activation, BatchNorm2d, BatchNorm2dConfig, Mode, NormUpdates, ResidualUnit,
    ResidualUnitConfig,
};
use crate::models::param_ids;

use burn::{
    config::Config,
    module::{Ignored, Module, ParamId},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    tensor::{backend::Backend, Device, Tensor},
};

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Input image as (height, width, channels).
    pub input_shape: [usize; 3],
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
    #[config(default = "0.2")]
    pub leaky_slope: f64,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Discriminator<B> {
        let [height, _, channels] = self.input_shape;
        let b = self.base_channels;

        let stages = [(channels, b), (b, 2 * b), (2 * b, 4 * b), (4 * b, 8 * b)]
            .into_iter()
            .map(|(c_in, c_out)| {
                DownStageConfig::new(c_in, c_out)
                    .with_dropout(self.dropout)
                    .with_leaky_slope(self.leaky_slope)
                    .init(device)
            })
            .collect();

        let remaining = height / 16;
        let to_score = Conv2dConfig::new([8 * b, 1], [remaining, remaining]).init(device);

        Discriminator { stages, to_score }
    }
}

#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    stages: Vec<DownStage<B>>,
    to_score: Conv2d<B>,
}

impl<B: Backend> Discriminator<B> {
    /// Inference: running statistics, no dropout.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.run(x, &mut Mode::Infer)
    }

    /// Training: batch statistics and dropout; statistics are queued on `updates`.
    pub fn forward_train(&self, x: Tensor<B, 4>, updates: &mut NormUpdates<B>) -> Tensor<B, 2> {
        self.run(x, &mut Mode::Train(updates))
    }

    fn run(&self, x: Tensor<B, 4>, mode: &mut Mode<B>) -> Tensor<B, 2> {
        let [batch, ..] = x.dims();

        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x, mode);
        }

        self.to_score.forward(x).reshape([batch, 1])
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        param_ids(self)
    }

    pub fn norm_layers(&self) -> Vec<&BatchNorm2d<B>> {
        self.stages.iter().flat_map(DownStage::norm_layers).collect()
    }

    pub fn num_norm_layers(&self) -> usize {
        self.norm_layers().len()
    }

    /// Running (mean, var) of every norm layer, in forward order.
    pub fn norm_stats(&self) -> Vec<(Tensor<B, 1>, Tensor<B, 1>)> {
        self.norm_layers()
            .into_iter()
            .map(BatchNorm2d::running_stats)
            .collect()
    }

    pub fn check_norm_updates(&self, updates: &NormUpdates<B>) -> Result<()> {
        updates.check(&self.norm_layers())
    }

    pub fn commit_norm_updates(&self, updates: NormUpdates<B>) -> Result<()> {
        updates.commit(&self.norm_layers())
    }
}

// ── DownStage: Conv 5x5 stride 2 → ResidualUnit → BN → LeakyReLU ─────────────

#[derive(Config, Debug)]
pub struct DownStageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
    #[config(default = "0.2")]
    pub leaky_slope: f64,
}

impl DownStageConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DownStage<B> {
        // ⌊(H + 2·2 − 5) / 2⌋ + 1 = H / 2 for even H
        let downsample = Conv2dConfig::new([self.in_channels, self.out_channels], [5, 5])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(2, 2))
            .init(device);

        DownStage {
            downsample,
            residual: ResidualUnitConfig::new(self.out_channels)
                .with_dropout(self.dropout)
                .init(device),
            norm: BatchNorm2dConfig::new(self.out_channels).init(device),
            activation: Ignored(Activation::LeakyRelu(self.leaky_slope)),
        }
    }
}

#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    downsample: Conv2d<B>,
    residual: ResidualUnit<B>,
    norm: BatchNorm2d<B>,
    activation: Ignored<Activation>,
}

impl<B: Backend> DownStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: &mut Mode<B>) -> Tensor<B, 4> {
        let x = self.downsample.forward(x);
        let x = self.residual.forward(x, mode);
        self.activation.0.forward(self.norm.forward(x, mode))
    }

    pub fn norm_layers(&self) -> [&BatchNorm2d<B>; 3] {
        let [first, second] = self.residual.norm_layers();
        [first, second, &self.norm]
    }
}
