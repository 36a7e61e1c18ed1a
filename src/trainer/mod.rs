// ─────────────────────────────────────────────────────────────
// AdversarialTrainer
//
// One step, all or nothing:
//
//   validate shapes
//   G graph:  z → G → D          → L_G      (D stats discarded)
//   D graph:  G(z)ᵀ → D, x → D   → L_D      (ᵀ = detached)
//   check both statistics queues
//   step G, step D, commit G stats, commit D stats
//
// Both D passes of the D graph run on the same parameters and the
// same running statistics; their batch statistics are committed
// together after the optimizer steps.
// ─────────────────────────────────────────────────────────────

mod loss;

pub use loss::{binary_accuracy, discriminator_accuracy, AdversarialLoss, Label};

use crate::error::{GanError, Result};
use crate::models::blocks::NormUpdates;
use crate::models::{Discriminator, DiscriminatorConfig, Generator, GeneratorConfig};
use crate::summary::{image_cast, tile_images, SummaryWriter};

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Distribution, ElementConversion, Tensor,
    },
};
use tracing::{debug, info, warn};

/// Number of real and fake examples written per snapshot.
const SNAPSHOT_IMAGES: usize = 10;

#[derive(Config, Debug)]
pub struct GanConfig {
    /// (height, width, channels); square, side a multiple of 16.
    #[config(default = "[64, 64, 3]")]
    pub input_shape: [usize; 3],
    #[config(default = "128")]
    pub z_dims: usize,
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
    #[config(default = "2e-4")]
    pub learning_rate: f64,
    #[config(default = "0.5")]
    pub beta_1: f32,
    /// Side of the evaluation grid; the fixed latent set has `test_size²` rows.
    #[config(default = "5")]
    pub test_size: usize,
    /// Examples between monitoring snapshots.
    #[config(default = "1000")]
    pub summary_period: usize,
    #[config(default = "0.2")]
    pub leaky_slope: f64,
}

impl GanConfig {
    pub fn validate(&self) -> Result<()> {
        let [height, width, channels] = self.input_shape;
        let invalid = |msg: String| Err(GanError::InvalidConfig(msg));

        if height != width {
            return invalid(format!("input must be square, got {height}x{width}"));
        }
        if height == 0 || height % 16 != 0 {
            return invalid(format!("input side must be a positive multiple of 16, got {height}"));
        }
        if channels == 0 {
            return invalid("input must have at least one channel".into());
        }
        for (name, value) in [
            ("z_dims", self.z_dims),
            ("base_channels", self.base_channels),
            ("test_size", self.test_size),
            ("summary_period", self.summary_period),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", self.dropout));
        }

        Ok(())
    }

    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig::new(self.input_shape)
            .with_z_dims(self.z_dims)
            .with_base_channels(self.base_channels)
            .with_dropout(self.dropout)
    }

    pub fn discriminator(&self) -> DiscriminatorConfig {
        DiscriminatorConfig::new(self.input_shape)
            .with_base_channels(self.base_channels)
            .with_dropout(self.dropout)
            .with_leaky_slope(self.leaky_slope)
    }

    /// Builds both networks once, their optimizers and the evaluation latents.
    pub fn init<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> Result<
        AdversarialTrainer<
            B,
            impl Optimizer<Generator<B>, B>,
            impl Optimizer<Discriminator<B>, B>,
        >,
    > {
        self.validate()?;

        let discriminator = self.discriminator().init::<B>(device);
        let generator = self.generator().init::<B>(device);

        let adam = AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_epsilon(1e-8);

        info!(
            generator_params = generator.num_params(),
            discriminator_params = discriminator.num_params(),
            input_shape = ?self.input_shape,
            "built adversarial networks"
        );

        let mut trainer = AdversarialTrainer {
            config: self.clone(),
            generator,
            discriminator,
            gen_optim: adam.init::<B, Generator<B>>(),
            dis_optim: adam.init::<B, Discriminator<B>>(),
            loss: AdversarialLoss::new(device),
            frozen: None,
            test_data: Tensor::zeros([1, self.z_dims], device),
            device: device.clone(),
        };
        trainer.make_test_data();

        Ok(trainer)
    }
}

/// Selects one of the two networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Generator,
    Discriminator,
}

/// Monitoring scalars of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMetrics {
    pub gen_loss: f32,
    pub dis_loss: f32,
    pub gen_acc: f32,
    pub dis_acc: f32,
}

impl StepMetrics {
    pub fn named(&self) -> [(&'static str, f32); 4] {
        [
            ("g_loss", self.gen_loss),
            ("d_loss", self.dis_loss),
            ("g_acc", self.gen_acc),
            ("d_acc", self.dis_acc),
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.named().iter().all(|(_, v)| v.is_finite())
    }
}

/// Result of a step: its metrics plus the detached batches it trained on.
#[derive(Debug)]
pub struct StepOutput<B: Backend> {
    pub metrics: StepMetrics,
    pub real: Tensor<B, 4>,
    pub fake: Tensor<B, 4>,
}

pub struct AdversarialTrainer<B: AutodiffBackend, OG, OD> {
    config: GanConfig,
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    gen_optim: OG,
    dis_optim: OD,
    loss: AdversarialLoss<B>,
    frozen: Option<Network>,
    test_data: Tensor<B::InnerBackend, 2>,
    device: B::Device,
}

impl<B, OG, OD> AdversarialTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub fn config(&self) -> &GanConfig {
        &self.config
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.discriminator
    }

    pub fn test_data(&self) -> &Tensor<B::InnerBackend, 2> {
        &self.test_data
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Skips the optimizer step of `network`. Its statistics are still committed.
    pub fn freeze(&mut self, network: Network) {
        self.frozen = Some(network);
    }

    pub fn unfreeze(&mut self) {
        self.frozen = None;
    }

    pub fn frozen(&self) -> Option<Network> {
        self.frozen
    }

    /// Resamples the fixed evaluation latents.
    pub fn make_test_data(&mut self) {
        let rows = self.config.test_size * self.config.test_size;
        self.test_data = Tensor::random(
            [rows, self.config.z_dims],
            Distribution::Uniform(-1.0, 1.0),
            &self.device,
        );
    }

    pub fn sample_latents(&self, batch: usize) -> Tensor<B, 2> {
        Tensor::random(
            [batch, self.config.z_dims],
            Distribution::Uniform(-1.0, 1.0),
            &self.device,
        )
    }

    /// Samples latents, runs one step and writes a snapshot when `index`
    /// crosses a `summary_period` boundary.
    pub fn train_on_batch<W: SummaryWriter + ?Sized>(
        &mut self,
        real: Tensor<B, 4>,
        index: usize,
        writer: &mut W,
    ) -> Result<Vec<(&'static str, f32)>> {
        let batch = self.check_images(real.dims())?;
        let z = self.sample_latents(batch);
        let output = self.train_step(real, z)?;

        if !output.metrics.is_finite() {
            warn!(index, metrics = ?output.metrics, "non-finite training metrics");
        }
        if crosses_boundary(index, batch, self.config.summary_period) {
            self.write_summary(&output, index, writer)?;
        }

        Ok(output.metrics.named().to_vec())
    }

    pub fn train_step(
        &mut self,
        real: Tensor<B, 4>,
        z: Tensor<B, 2>,
    ) -> Result<StepOutput<B::InnerBackend>> {
        let images = self.check_images(real.dims())?;
        let latents = self.check_latents(z.dims())?;
        if images != latents {
            return Err(GanError::BatchMismatch { images, latents });
        }

        let mut gen_updates = NormUpdates::new();
        let mut dis_updates = NormUpdates::new();

        let fake = self.generator.forward_train(z, &mut gen_updates);
        // Same input and batch statistics as the detached fake pass below;
        // the two differ only by their dropout sample.
        let gen_scores = self
            .discriminator
            .forward_train(fake.clone(), &mut NormUpdates::new());
        let gen_loss = self.loss.generator(gen_scores.clone());

        let fake_scores = self
            .discriminator
            .forward_train(fake.clone().detach(), &mut dis_updates);
        let real_scores = self
            .discriminator
            .forward_train(real.clone(), &mut dis_updates);
        let dis_loss = self
            .loss
            .discriminator(real_scores.clone(), fake_scores.clone());

        let metrics = StepMetrics {
            gen_loss: gen_loss.clone().into_scalar().elem(),
            dis_loss: dis_loss.clone().into_scalar().elem(),
            gen_acc: binary_accuracy(gen_scores.inner(), Label::Real)
                .into_scalar()
                .elem(),
            dis_acc: discriminator_accuracy(real_scores.inner(), fake_scores.inner())
                .into_scalar()
                .elem(),
        };

        self.generator.check_norm_updates(&gen_updates)?;
        self.discriminator.check_norm_updates(&dis_updates)?;

        let gen_grads = GradientsParams::from_grads(gen_loss.backward(), &self.generator);
        let dis_grads = GradientsParams::from_grads(dis_loss.backward(), &self.discriminator);

        let lr = self.config.learning_rate;
        if self.frozen != Some(Network::Generator) {
            self.generator = self.gen_optim.step(lr, self.generator.clone(), gen_grads);
        }
        if self.frozen != Some(Network::Discriminator) {
            self.discriminator = self
                .dis_optim
                .step(lr, self.discriminator.clone(), dis_grads);
        }
        self.generator.commit_norm_updates(gen_updates)?;
        self.discriminator.commit_norm_updates(dis_updates)?;

        Ok(StepOutput {
            metrics,
            real: real.inner(),
            fake: fake.inner(),
        })
    }

    /// Generator in inference mode; touches no parameter or statistic.
    ///
    /// Builds the inference copy on every call. Callers predicting
    /// repeatedly between steps can hold [`Self::inference_generator`].
    pub fn predict(&self, z: Tensor<B::InnerBackend, 2>) -> Result<Tensor<B::InnerBackend, 4>> {
        self.check_latents(z.dims())?;
        Ok(self.inference_generator().forward(z))
    }

    /// Inference-backend copy of the generator, sharing its parameter ids.
    /// It is a snapshot and goes stale after the next training step.
    pub fn inference_generator(&self) -> Generator<B::InnerBackend> {
        self.generator.valid()
    }

    pub fn write_summary<W: SummaryWriter + ?Sized>(
        &self,
        output: &StepOutput<B::InnerBackend>,
        step: usize,
        writer: &mut W,
    ) -> Result<()> {
        debug!(step, "writing summary");

        let metrics = &output.metrics;
        writer.add_scalar("gen_loss", metrics.gen_loss, step)?;
        writer.add_scalar("dis_loss", metrics.dis_loss, step)?;
        writer.add_scalar("gen_acc", metrics.gen_acc, step)?;
        writer.add_scalar("dis_acc", metrics.dis_acc, step)?;

        writer.add_images("x_real", &image_cast(leading(&output.real))?, step)?;
        writer.add_images("x_fake", &image_cast(leading(&output.fake))?, step)?;

        let side = self.config.test_size;
        let samples = image_cast(self.predict(self.test_data.clone())?)?;
        writer.add_images("x_tile", &[tile_images(&samples, side, side)?], step)?;

        Ok(())
    }

    fn check_images(&self, dims: [usize; 4]) -> Result<usize> {
        let [height, width, channels] = self.config.input_shape;
        let [batch, c, h, w] = dims;
        if [c, h, w] != [channels, height, width] {
            return Err(GanError::ImageShape {
                expected: [channels, height, width],
                actual: dims,
            });
        }
        if batch == 0 {
            return Err(GanError::EmptyBatch);
        }
        Ok(batch)
    }

    fn check_latents(&self, dims: [usize; 2]) -> Result<usize> {
        let [batch, z_dims] = dims;
        if z_dims != self.config.z_dims {
            return Err(GanError::LatentShape {
                expected: self.config.z_dims,
                actual: dims,
            });
        }
        if batch == 0 {
            return Err(GanError::EmptyBatch);
        }
        Ok(batch)
    }
}

fn leading<B: Backend>(images: &Tensor<B, 4>) -> Tensor<B, 4> {
    let n = images.dims()[0].min(SNAPSHOT_IMAGES);
    images.clone().slice([0..n])
}

/// Whether the example counter moved into a new `period`-sized window
/// between `index - batch` and `index`. A previous index below zero counts.
pub fn crosses_boundary(index: usize, batch: usize, period: usize) -> bool {
    match index.checked_sub(batch) {
        Some(prev) => index / period != prev / period,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::{ModuleVisitor, ParamId};
    use image::RgbImage;
    use rstest::*;

    type TB = Autodiff<NdArray>;
    type IB = NdArray;

    #[fixture]
    fn device() -> NdArrayDevice {
        NdArrayDevice::Cpu
    }

    #[fixture]
    fn config() -> GanConfig {
        GanConfig::new()
            .with_input_shape([16, 16, 3])
            .with_z_dims(8)
            .with_base_channels(4)
            .with_test_size(2)
            .with_summary_period(8)
    }

    fn real_batch(batch: usize, device: &NdArrayDevice) -> Tensor<TB, 4> {
        Tensor::random([batch, 3, 16, 16], Distribution::Uniform(-1.0, 1.0), device)
    }

    fn flat<Bk: Backend, const D: usize>(t: Tensor<Bk, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    /// Values of every gradient-tracked tensor, i.e. parameters but not running statistics.
    #[derive(Default)]
    struct Trainable(Vec<Vec<f32>>);

    impl ModuleVisitor<TB> for Trainable {
        fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<TB, D>) {
            if tensor.is_require_grad() {
                self.0.push(flat(tensor.clone()));
            }
        }
    }

    fn trainable<M: Module<TB>>(module: &M) -> Vec<Vec<f32>> {
        let mut visitor = Trainable::default();
        module.visit(&mut visitor);
        visitor.0
    }

    fn stats<Bk: Backend>(pairs: Vec<(Tensor<Bk, 1>, Tensor<Bk, 1>)>) -> Vec<f32> {
        pairs
            .into_iter()
            .flat_map(|(m, v)| flat(m).into_iter().chain(flat(v)))
            .collect()
    }

    #[derive(Default)]
    struct RecordingWriter {
        scalars: Vec<(String, f32, usize)>,
        images: Vec<(String, Vec<(u32, u32)>, usize)>,
    }

    impl SummaryWriter for RecordingWriter {
        fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
            self.scalars.push((tag.to_string(), value, step));
            Ok(())
        }

        fn add_images(&mut self, tag: &str, images: &[RgbImage], step: usize) -> Result<()> {
            let sizes = images.iter().map(RgbImage::dimensions).collect();
            self.images.push((tag.to_string(), sizes, step));
            Ok(())
        }
    }

    // ── GanConfig: validation ──────────────────────────────────────────────────

    #[rstest]
    #[case::defaults(GanConfig::new(), true)]
    #[case::small(GanConfig::new().with_input_shape([16, 16, 1]), true)]
    #[case::not_square(GanConfig::new().with_input_shape([32, 16, 3]), false)]
    #[case::not_multiple_of_16(GanConfig::new().with_input_shape([24, 24, 3]), false)]
    #[case::zero_side(GanConfig::new().with_input_shape([0, 0, 3]), false)]
    #[case::no_channels(GanConfig::new().with_input_shape([16, 16, 0]), false)]
    #[case::no_latents(GanConfig::new().with_z_dims(0), false)]
    #[case::no_width(GanConfig::new().with_base_channels(0), false)]
    #[case::no_grid(GanConfig::new().with_test_size(0), false)]
    #[case::no_period(GanConfig::new().with_summary_period(0), false)]
    #[case::full_dropout(GanConfig::new().with_dropout(1.0), false)]
    fn config_validation(#[case] config: GanConfig, #[case] ok: bool) {
        assert_eq!(config.validate().is_ok(), ok, "{config:?}");
    }

    #[rstest]
    fn init_rejects_invalid_config(device: NdArrayDevice) {
        let result = GanConfig::new()
            .with_input_shape([20, 20, 3])
            .init::<TB>(&device);
        assert!(matches!(result, Err(GanError::InvalidConfig(_))));
    }

    #[rstest]
    fn config_round_trips_through_json(config: GanConfig) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        config.save(&path).unwrap();

        let loaded = GanConfig::load(&path).unwrap();
        assert_eq!(loaded.input_shape, [16, 16, 3]);
        assert_eq!(loaded.z_dims, 8);
        assert_eq!(loaded.test_size, 2);
        assert_eq!(loaded.summary_period, 8);
        assert_eq!(loaded.learning_rate, 2e-4);
        assert_eq!(loaded.beta_1, 0.5);
    }

    // ── train_on_batch: four named finite scalars ──────────────────────────────

    #[rstest]
    fn train_on_batch_reports_named_metrics(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let mut writer = RecordingWriter::default();

        let metrics = trainer
            .train_on_batch(real_batch(4, &device), 4, &mut writer)
            .unwrap();

        let names: Vec<_> = metrics.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["g_loss", "d_loss", "g_acc", "d_acc"]);
        assert!(metrics.iter().all(|(_, v)| v.is_finite()));
        for (_, acc) in &metrics[2..] {
            assert!((0.0..=1.0).contains(acc));
        }
    }

    // ── train_on_batch: full-size images on fresh networks ─────────────────────

    #[rstest]
    fn train_on_batch_at_full_resolution(device: NdArrayDevice) {
        let mut trainer = GanConfig::new()
            .with_base_channels(8)
            .init::<TB>(&device)
            .unwrap();
        assert_eq!(trainer.config().input_shape, [64, 64, 3]);
        assert_eq!(trainer.config().z_dims, 128);
        let mut writer = RecordingWriter::default();

        let real = Tensor::random([4, 3, 64, 64], Distribution::Uniform(-1.0, 1.0), &device);
        let metrics = trainer.train_on_batch(real, 4, &mut writer).unwrap();

        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().all(|(_, v)| v.is_finite()), "{metrics:?}");
        let (name, d_acc) = metrics[3];
        assert_eq!(name, "d_acc");
        assert!((d_acc - 0.5).abs() <= 0.25, "d_acc {d_acc}");
    }

    // ── train_step: generator metrics score the step's own fake batch ──────────

    #[rstest]
    fn generator_metrics_score_step_fake_batch(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.with_dropout(0.0).init::<TB>(&device).unwrap();
        trainer.freeze(Network::Discriminator);
        let discriminator = trainer.discriminator().valid();

        let z = trainer.sample_latents(4);
        let output = trainer.train_step(real_batch(4, &device), z).unwrap();

        let scores = discriminator.forward_train(output.fake, &mut NormUpdates::new());
        let gen_loss: f32 = AdversarialLoss::<IB>::new(&device)
            .generator(scores.clone())
            .into_scalar();
        let gen_acc: f32 = binary_accuracy(scores, Label::Real).into_scalar();

        assert!((output.metrics.gen_loss - gen_loss).abs() < 1e-5);
        assert!((output.metrics.gen_acc - gen_acc).abs() < 1e-6);
    }

    // ── train_step: shape violations fail before any state changes ─────────────

    #[rstest]
    #[case::channels([4, 1, 16, 16], [4, 8])]
    #[case::size([4, 3, 32, 32], [4, 8])]
    #[case::latent_width([4, 3, 16, 16], [4, 9])]
    #[case::batch_mismatch([4, 3, 16, 16], [3, 8])]
    #[case::empty([0, 3, 16, 16], [0, 8])]
    fn shape_errors_leave_state_untouched(
        device: NdArrayDevice,
        config: GanConfig,
        #[case] image_dims: [usize; 4],
        #[case] latent_dims: [usize; 2],
    ) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let params = (trainable(trainer.generator()), trainable(trainer.discriminator()));
        let norms = (
            stats(trainer.generator().norm_stats()),
            stats(trainer.discriminator().norm_stats()),
        );

        let real = Tensor::<TB, 4>::zeros(image_dims, &device);
        let z = Tensor::<TB, 2>::zeros(latent_dims, &device);
        let err = trainer.train_step(real, z).unwrap_err();
        assert!(matches!(
            err,
            GanError::ImageShape { .. }
                | GanError::LatentShape { .. }
                | GanError::BatchMismatch { .. }
                | GanError::EmptyBatch
        ));

        assert_eq!(
            (trainable(trainer.generator()), trainable(trainer.discriminator())),
            params
        );
        assert_eq!(
            (
                stats(trainer.generator().norm_stats()),
                stats(trainer.discriminator().norm_stats())
            ),
            norms
        );
    }

    // ── train_step: one step moves parameters and statistics of both networks ──

    #[rstest]
    fn step_updates_both_networks(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let gen_before = (trainable(trainer.generator()), stats(trainer.generator().norm_stats()));
        let dis_before = (
            trainable(trainer.discriminator()),
            stats(trainer.discriminator().norm_stats()),
        );

        let z = trainer.sample_latents(4);
        trainer.train_step(real_batch(4, &device), z).unwrap();

        assert_ne!(trainable(trainer.generator()), gen_before.0);
        assert_ne!(stats(trainer.generator().norm_stats()), gen_before.1);
        assert_ne!(trainable(trainer.discriminator()), dis_before.0);
        assert_ne!(stats(trainer.discriminator().norm_stats()), dis_before.1);
    }

    // ── Frozen optimizer: the other network still converges ────────────────────
    // Fixed real batch and latents, dropout off, so the objective is fixed.

    #[rstest]
    #[case::discriminator_frozen(Network::Discriminator)]
    #[case::generator_frozen(Network::Generator)]
    fn frozen_network_keeps_parameters_while_other_learns(
        device: NdArrayDevice,
        config: GanConfig,
        #[case] frozen: Network,
    ) {
        let mut trainer = config
            .with_dropout(0.0)
            .with_learning_rate(1e-3)
            .init::<TB>(&device)
            .unwrap();
        trainer.freeze(frozen);
        assert_eq!(trainer.frozen(), Some(frozen));

        let frozen_params = |t: &AdversarialTrainer<TB, _, _>| match frozen {
            Network::Generator => trainable(t.generator()),
            Network::Discriminator => trainable(t.discriminator()),
        };
        let before = frozen_params(&trainer);
        let dis_stats = stats(trainer.discriminator().norm_stats());

        let real = real_batch(4, &device);
        let z = trainer.sample_latents(4);
        let losses: Vec<f32> = (0..10)
            .map(|_| {
                let m = trainer
                    .train_step(real.clone(), z.clone())
                    .unwrap()
                    .metrics;
                match frozen {
                    Network::Discriminator => m.gen_loss,
                    Network::Generator => m.dis_loss,
                }
            })
            .collect();

        assert_eq!(frozen_params(&trainer), before);
        assert_ne!(stats(trainer.discriminator().norm_stats()), dis_stats);
        assert!(
            losses[losses.len() - 1] < losses[0],
            "loss did not decrease: {losses:?}"
        );
    }

    // ── predict: pure, reuses the trained generator ────────────────────────────

    #[rstest]
    fn predict_is_pure(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let z = trainer.sample_latents(2);
        trainer.train_step(real_batch(2, &device), z).unwrap();

        let gen_stats = stats(trainer.generator().norm_stats());
        let gen_params = trainable(trainer.generator());

        let z = trainer.test_data().clone();
        let first = trainer.predict(z.clone()).unwrap();
        let second = trainer.predict(z).unwrap();

        assert_eq!(first.dims(), [4, 3, 16, 16]);
        assert_eq!(flat(first), flat(second));
        assert_eq!(stats(trainer.generator().norm_stats()), gen_stats);
        assert_eq!(trainable(trainer.generator()), gen_params);
    }

    #[rstest]
    fn predict_rejects_wrong_latent_width(device: NdArrayDevice, config: GanConfig) {
        let trainer = config.init::<TB>(&device).unwrap();
        let z = Tensor::<IB, 2>::zeros([2, 5], &device);
        assert!(matches!(
            trainer.predict(z),
            Err(GanError::LatentShape { expected: 8, .. })
        ));
    }

    #[rstest]
    fn predict_uses_trained_parameters(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let z = trainer.test_data().clone();
        let before = flat(trainer.predict(z.clone()).unwrap());

        let latents = trainer.sample_latents(4);
        trainer.train_step(real_batch(4, &device), latents).unwrap();

        assert_ne!(flat(trainer.predict(z).unwrap()), before);
    }

    #[rstest]
    fn inference_generator_matches_predict(device: NdArrayDevice, config: GanConfig) {
        let trainer = config.init::<TB>(&device).unwrap();
        let generator = trainer.inference_generator();
        assert_eq!(generator.param_ids(), trainer.generator().param_ids());

        let z = trainer.test_data().clone();
        assert_eq!(
            flat(generator.forward(z.clone())),
            flat(trainer.predict(z).unwrap())
        );
    }

    // ── Evaluation latents ─────────────────────────────────────────────────────

    #[rstest]
    fn test_data_covers_grid(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        assert_eq!(trainer.test_data().dims(), [4, 8]);

        let first = flat(trainer.test_data().clone());
        assert!(first.iter().all(|v| (-1.0..=1.0).contains(v)));

        trainer.make_test_data();
        assert_eq!(trainer.test_data().dims(), [4, 8]);
        assert_ne!(flat(trainer.test_data().clone()), first);
    }

    // ── Snapshot schedule ──────────────────────────────────────────────────────
    // Parameterised over: (index, batch, period, expected)

    #[rstest]
    #[case::first_batch(4, 4, 1000, false)]
    #[case::negative_previous(2, 4, 1000, true)]
    #[case::exact_boundary(1000, 4, 1000, true)]
    #[case::just_past(1002, 4, 1000, true)]
    #[case::inside_window(1500, 4, 1000, false)]
    #[case::wide_batch(2000, 1000, 1000, true)]
    fn boundary_schedule(
        #[case] index: usize,
        #[case] batch: usize,
        #[case] period: usize,
        #[case] expected: bool,
    ) {
        assert_eq!(crosses_boundary(index, batch, period), expected);
    }

    #[rstest]
    fn snapshot_written_on_boundary(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let mut writer = RecordingWriter::default();

        // period 8, batch 4: index 4 stays in the first window
        trainer
            .train_on_batch(real_batch(4, &device), 4, &mut writer)
            .unwrap();
        assert!(writer.scalars.is_empty() && writer.images.is_empty());

        trainer
            .train_on_batch(real_batch(4, &device), 8, &mut writer)
            .unwrap();

        let tags: Vec<_> = writer.scalars.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(tags, ["gen_loss", "dis_loss", "gen_acc", "dis_acc"]);
        assert!(writer.scalars.iter().all(|(_, _, step)| *step == 8));

        let images: Vec<_> = writer
            .images
            .iter()
            .map(|(tag, sizes, _)| (tag.as_str(), sizes.clone()))
            .collect();
        assert_eq!(
            images,
            [
                ("x_real", vec![(16, 16); 4]),
                ("x_fake", vec![(16, 16); 4]),
                ("x_tile", vec![(32, 32)]),
            ]
        );
    }

    #[rstest]
    fn snapshot_caps_image_count(device: NdArrayDevice, config: GanConfig) {
        let mut trainer = config.init::<TB>(&device).unwrap();
        let mut writer = RecordingWriter::default();

        trainer
            .train_on_batch(real_batch(12, &device), 12, &mut writer)
            .unwrap();

        let real = writer
            .images
            .iter()
            .find(|(tag, _, _)| tag == "x_real")
            .map(|(_, sizes, _)| sizes.len());
        assert_eq!(real, Some(SNAPSHOT_IMAGES));
    }
}
