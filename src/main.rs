use anyhow::{anyhow, Context, Result};
use burn::config::Config;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Distribution, Int, Tensor};
use clap::Parser;
use resgan::{GanConfig, PngSummaryWriter};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Trains the residual GAN on procedurally drawn disks.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON model config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 200)]
    steps: usize,

    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    /// Output directory for config.json and summaries
    #[arg(long, default_value = "runs/resgan")]
    out: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log metrics every N steps
    #[arg(long, default_value_t = 10)]
    log_every: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    launch(&Args::parse())
}

#[cfg(feature = "tch")]
fn launch(args: &Args) -> Result<()> {
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};
    type MyBackend = burn::backend::Autodiff<LibTorch<f32>>;

    run::<MyBackend>(args, LibTorchDevice::default())
}

#[cfg(not(feature = "tch"))]
fn launch(args: &Args) -> Result<()> {
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    type MyBackend = burn::backend::Autodiff<NdArray<f32>>;

    run::<MyBackend>(args, NdArrayDevice::Cpu)
}

fn run<B: AutodiffBackend>(args: &Args, device: B::Device) -> Result<()> {
    let config = match &args.config {
        Some(path) => GanConfig::load(path)
            .map_err(|err| anyhow!("failed to load config {}: {err:?}", path.display()))?,
        None => GanConfig::new(),
    };
    config.validate()?;

    B::seed(args.seed);

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    config
        .save(args.out.join("config.json"))
        .context("failed to save config")?;

    let mut trainer = config.init::<B>(&device)?;
    let mut writer = PngSummaryWriter::new(args.out.join("summary"))?;

    let mut index = 0;
    for step in 1..=args.steps {
        let batch = disks::<B>(args.batch_size, config.input_shape, &device);
        index += args.batch_size;

        let metrics = trainer.train_on_batch(batch, index, &mut writer)?;
        if step % args.log_every.max(1) == 0 || step == args.steps {
            let [g_loss, d_loss, g_acc, d_acc] = [0, 1, 2, 3].map(|i| metrics[i].1);
            info!(step, index, g_loss, d_loss, g_acc, d_acc, "train");
        }
    }

    info!(out = %args.out.display(), "done");
    Ok(())
}

/// A batch of filled disks with random centre, radius and colour, in [-1, 1].
fn disks<B: Backend>(batch: usize, input_shape: [usize; 3], device: &B::Device) -> Tensor<B, 4> {
    let [height, width, channels] = input_shape;
    let side = height as f64;

    let ys = Tensor::<B, 1, Int>::arange(0..height as i64, device)
        .float()
        .reshape([1, 1, height, 1])
        .repeat_dim(0, batch)
        .repeat_dim(3, width);
    let xs = Tensor::<B, 1, Int>::arange(0..width as i64, device)
        .float()
        .reshape([1, 1, 1, width])
        .repeat_dim(0, batch)
        .repeat_dim(2, height);

    let uniform = |low: f64, high: f64| {
        Tensor::<B, 4>::random([batch, 1, 1, 1], Distribution::Uniform(low, high), device)
            .repeat_dim(2, height)
            .repeat_dim(3, width)
    };
    let cy = uniform(0.3 * side, 0.7 * side);
    let cx = uniform(0.3 * side, 0.7 * side);
    let radius = uniform(0.15 * side, 0.3 * side);

    let dist2 = ys.sub(cy).powf_scalar(2.0).add(xs.sub(cx).powf_scalar(2.0));
    // soft edge
    let mask = radius
        .powf_scalar(2.0)
        .sub(dist2)
        .div_scalar(side)
        .clamp(0.0, 1.0)
        .repeat_dim(1, channels);

    let colour =
        Tensor::<B, 4>::random([batch, channels, 1, 1], Distribution::Uniform(0.2, 1.0), device)
            .repeat_dim(2, height)
            .repeat_dim(3, width);

    mask.mul(colour).mul_scalar(2.0).sub_scalar(1.0)
}
