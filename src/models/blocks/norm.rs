// ─────────────────────────────────────────────────────────────
// BatchNorm2d
//
// Burn's BatchNorm writes its running statistics during the
// forward pass. Here a training-mode pass only *reports* the
// batch statistics (pushed onto a NormUpdates queue) and the
// owner commits them once the optimizer steps are done.
//
//   train:  y = γ · (x − μ_batch) / √(σ²_batch + ε) + β
//   infer:  y = γ · (x − μ_run)   / √(σ²_run   + ε) + β
//   commit: μ_run ← (1 − m) · μ_run + m · μ_batch
//           σ²_run ← (1 − m) · σ²_run + m · n/(n − 1) · σ²_batch
// ─────────────────────────────────────────────────────────────

use crate::error::{GanError, Result};

use burn::{
    config::Config,
    module::{Module, Param, RunningState},
    tensor::{backend::Backend, Device, Tensor},
};

#[derive(Config, Debug)]
pub struct BatchNorm2dConfig {
    pub num_features: usize,
    #[config(default = "1e-3")]
    pub epsilon: f64,
    /// Weight of the newest batch in the running average.
    #[config(default = "0.01")]
    pub momentum: f64,
}

impl BatchNorm2dConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> BatchNorm2d<B> {
        let n = self.num_features;

        BatchNorm2d {
            gamma: Param::from_tensor(Tensor::ones([n], device)),
            beta: Param::from_tensor(Tensor::zeros([n], device)),
            running_mean: RunningState::new(Tensor::zeros([n], device)),
            running_var: RunningState::new(Tensor::ones([n], device)),
            momentum: self.momentum,
            epsilon: self.epsilon,
        }
    }
}

#[derive(Module, Debug)]
pub struct BatchNorm2d<B: Backend> {
    gamma: Param<Tensor<B, 1>>,
    beta: Param<Tensor<B, 1>>,
    running_mean: RunningState<Tensor<B, 1>>,
    running_var: RunningState<Tensor<B, 1>>,
    momentum: f64,
    epsilon: f64,
}

/// Per-channel statistics of one training-mode batch, detached from the graph.
///
/// `var` is the unbiased estimate, n / (n − 1) times the variance the
/// batch was normalized with.
#[derive(Debug, Clone)]
pub struct BatchStats<B: Backend> {
    pub mean: Tensor<B, 1>,
    pub var: Tensor<B, 1>,
}

/// Ordered queue of pending running-statistics updates.
///
/// Layers push in forward order, so a network that is run k times in
/// training mode queues k × (number of norm layers) entries.
#[derive(Debug)]
pub struct NormUpdates<B: Backend> {
    pending: Vec<BatchStats<B>>,
}

impl<B: Backend> Default for NormUpdates<B> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<B: Backend> NormUpdates<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchStats<B>> {
        self.pending.iter()
    }

    fn push(&mut self, stats: BatchStats<B>) {
        self.pending.push(stats);
    }

    /// Fails without touching any layer if the queue does not line up with `layers`.
    pub(crate) fn check(&self, layers: &[&BatchNorm2d<B>]) -> Result<()> {
        let count_ok = !layers.is_empty() && self.pending.len() % layers.len() == 0;
        let shapes_ok = self
            .pending
            .iter()
            .zip(layers.iter().cycle())
            .all(|(stats, layer)| stats.mean.dims()[0] == layer.num_features());

        if count_ok && shapes_ok {
            Ok(())
        } else {
            Err(GanError::NormUpdateCount {
                expected: layers.len(),
                actual: self.pending.len(),
            })
        }
    }

    /// Applies every queued update in recording order.
    pub(crate) fn commit(self, layers: &[&BatchNorm2d<B>]) -> Result<()> {
        self.check(layers)?;
        for (stats, layer) in self.pending.into_iter().zip(layers.iter().cycle()) {
            layer.commit(stats);
        }
        Ok(())
    }
}

/// Whether a forward pass trains or infers.
pub enum Mode<'a, B: Backend> {
    /// Batch statistics, dropout on, statistics queued.
    Train(&'a mut NormUpdates<B>),
    /// Running statistics, dropout off, nothing recorded.
    Infer,
}

impl<B: Backend> Mode<'_, B> {
    pub fn is_train(&self) -> bool {
        matches!(self, Mode::Train(_))
    }
}

impl<B: Backend> BatchNorm2d<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: &mut Mode<B>) -> Tensor<B, 4> {
        match mode {
            Mode::Train(updates) => {
                let (out, stats) = self.forward_batch(x);
                updates.push(stats);
                out
            }
            Mode::Infer => self.forward_running(x),
        }
    }

    pub fn num_features(&self) -> usize {
        self.gamma.val().dims()[0]
    }

    /// Snapshot of (running mean, running variance).
    pub fn running_stats(&self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (
            self.running_mean.value_sync(),
            self.running_var.value_sync(),
        )
    }

    fn forward_batch(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, BatchStats<B>) {
        let [batch, channels, height, width] = x.dims();

        let flat = x
            .clone()
            .swap_dims(0, 1)
            .reshape([channels, batch * height * width]);
        let mean = flat.clone().mean_dim(1);
        let var = flat.sub(mean.clone()).powf_scalar(2.0_f32).mean_dim(1);

        let out = self.normalize(
            x,
            mean.clone().reshape([1, channels, 1, 1]),
            var.clone().reshape([1, channels, 1, 1]),
        );
        let n = batch * height * width;
        let bessel = if n > 1 { n as f64 / (n - 1) as f64 } else { 1.0 };
        let stats = BatchStats {
            mean: mean.reshape([channels]).detach(),
            var: var.reshape([channels]).mul_scalar(bessel).detach(),
        };

        (out, stats)
    }

    fn forward_running(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = self.num_features();
        let (mean, var) = self.running_stats();

        self.normalize(
            x,
            mean.reshape([1, channels, 1, 1]),
            var.reshape([1, channels, 1, 1]),
        )
    }

    fn normalize(&self, x: Tensor<B, 4>, mean: Tensor<B, 4>, var: Tensor<B, 4>) -> Tensor<B, 4> {
        let channels = self.num_features();
        let gamma = self.gamma.val().reshape([1, channels, 1, 1]);
        let beta = self.beta.val().reshape([1, channels, 1, 1]);
        let std = var.add_scalar(self.epsilon).sqrt();

        x.sub(mean).div(std).mul(gamma).add(beta)
    }

    fn commit(&self, stats: BatchStats<B>) {
        let (mean, var) = self.running_stats();
        let keep = 1.0 - self.momentum;

        self.running_mean.update(
            mean.mul_scalar(keep)
                .add(stats.mean.mul_scalar(self.momentum))
                .detach(),
        );
        self.running_var.update(
            var.mul_scalar(keep)
                .add(stats.var.mul_scalar(self.momentum))
                .detach(),
        );
    }
}
