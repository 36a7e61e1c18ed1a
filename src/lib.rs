pub mod error;
pub mod models;
pub mod summary;
pub mod trainer;

pub use error::{GanError, Result};
pub use models::{Discriminator, DiscriminatorConfig, Generator, GeneratorConfig};
pub use summary::{image_cast, tile_images, PngSummaryWriter, SummaryWriter};
pub use trainer::{AdversarialTrainer, GanConfig, Network, StepMetrics, StepOutput};
