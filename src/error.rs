use thiserror::Error;

/// Errors surfaced by the networks, the trainer and the summary writers.
#[derive(Debug, Error)]
pub enum GanError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `expected` is `[channels, height, width]`.
    #[error("expected image batch [_, channels, height, width] with {expected:?}, got {actual:?}")]
    ImageShape {
        expected: [usize; 3],
        actual: [usize; 4],
    },

    #[error("expected latent batch [_, {expected}], got {actual:?}")]
    LatentShape { expected: usize, actual: [usize; 2] },

    #[error("image batch has {images} examples but latent batch has {latents}")]
    BatchMismatch { images: usize, latents: usize },

    #[error("batch is empty")]
    EmptyBatch,

    /// A statistics queue was committed to a network it was not recorded on.
    #[error("expected a multiple of {expected} normalization updates, got {actual}")]
    NormUpdateCount { expected: usize, actual: usize },

    #[error("images must have 1 or 3 channels, got {0}")]
    UnsupportedChannels(usize),

    #[error("cannot tile {actual} images of mixed or zero size into a {rows}x{cols} grid")]
    TileGrid {
        rows: usize,
        cols: usize,
        actual: usize,
    },

    #[error("failed to read tensor data: {0}")]
    TensorData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = GanError> = std::result::Result<T, E>;
