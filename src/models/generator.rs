// ─────────────────────────────────────────────────────────────
// Generator
//
// z [B, Z] → [B, Z, 1, 1]
//   → ConvT(k = H/8, valid) → BN → ReLU               [B, 4b, H/8, W/8]
//   → 3 × (ConvT 5x5 /2 → Residual → BN → ReLU)        4b → 2b → b
//   → Conv5x5 (same) → tanh                            [B, C, H, W]
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
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        Initializer, PaddingConfig2d,
    },
    tensor::{backend::Backend, Device, Tensor},
};

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Output image as (height, width, channels).
    pub input_shape: [usize; 3],
    #[config(default = "128")]
    pub z_dims: usize,
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Generator<B> {
        let [height, _, channels] = self.input_shape;
        let b = self.base_channels;
        let seed = height / 8;

        let project = ConvTranspose2dConfig::new([self.z_dims, 4 * b], [seed, seed]).init(device);
        let project_norm = BatchNorm2dConfig::new(4 * b).init(device);

        let stages = [(4 * b, 4 * b), (4 * b, 2 * b), (2 * b, b)]
            .into_iter()
            .map(|(c_in, c_out)| {
                UpStageConfig::new(c_in, c_out)
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect();

        let to_image = Conv2dConfig::new([b, channels], [5, 5])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);

        Generator {
            project,
            project_norm,
            stages,
            to_image,
            activation: Ignored(Activation::Relu),
            output: Ignored(Activation::Tanh),
        }
    }
}

#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    project: ConvTranspose2d<B>,
    project_norm: BatchNorm2d<B>,
    stages: Vec<UpStage<B>>,
    to_image: Conv2d<B>,
    activation: Ignored<Activation>,
    output: Ignored<Activation>,
}

impl<B: Backend> Generator<B> {
    /// Inference: running statistics, no dropout.
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.run(z, &mut Mode::Infer)
    }

    /// Training: batch statistics and dropout; statistics are queued on `updates`.
    pub fn forward_train(&self, z: Tensor<B, 2>, updates: &mut NormUpdates<B>) -> Tensor<B, 4> {
        self.run(z, &mut Mode::Train(updates))
    }

    fn run(&self, z: Tensor<B, 2>, mode: &mut Mode<B>) -> Tensor<B, 4> {
        let [batch, z_dims] = z.dims();

        let x = self.project.forward(z.reshape([batch, z_dims, 1, 1]));
        let mut x = self.activation.0.forward(self.project_norm.forward(x, mode));
        for stage in &self.stages {
            x = stage.forward(x, mode);
        }

        self.output.0.forward(self.to_image.forward(x))
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        param_ids(self)
    }

    pub fn norm_layers(&self) -> Vec<&BatchNorm2d<B>> {
        let mut layers = vec![&self.project_norm];
        for stage in &self.stages {
            layers.extend(stage.norm_layers());
        }
        layers
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

// ── UpStage: ConvT 5x5 stride 2 → ResidualUnit → BN → ReLU ─────────────────────

#[derive(Config, Debug)]
pub struct UpStageConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl UpStageConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UpStage<B> {
        // (H − 1)·2 − 2·2 + 5 + 1 = 2H
        let upsample = ConvTranspose2dConfig::new([self.in_channels, self.out_channels], [5, 5])
            .with_stride([2, 2])
            .with_padding([2, 2])
            .with_padding_out([1, 1])
            .init(device);

        UpStage {
            upsample,
            residual: ResidualUnitConfig::new(self.out_channels)
                .with_dropout(self.dropout)
                .init(device),
            norm: BatchNorm2dConfig::new(self.out_channels).init(device),
            activation: Ignored(Activation::Relu),
        }
    }
}

#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    upsample: ConvTranspose2d<B>,
    residual: ResidualUnit<B>,
    norm: BatchNorm2d<B>,
    activation: Ignored<Activation>,
}

impl<B: Backend> UpStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: &mut Mode<B>) -> Tensor<B, 4> {
        let x = self.upsample.forward(x);
        let x = self.residual.forward(x, mode);
        self.activation.0.forward(self.norm.forward(x, mode))
    }

    pub fn norm_layers(&self) -> [&BatchNorm2d<B>; 3] {
        let [first, second] = self.residual.norm_layers();
        [first, second, &self.norm]
    }
}
