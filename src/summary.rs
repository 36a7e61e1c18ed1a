// ─────────────────────────────────────────────────────────────
// Monitoring snapshots
//
// A SummaryWriter receives scalars and image lists keyed by tag
// and step. PngSummaryWriter lays them out on disk as
//
//   dir/scalars.jsonl              {"step":..,"tag":..,"value":..}
//   dir/<tag>/<step:08>_<i>.png
// ─────────────────────────────────────────────────────────────

use crate::error::{GanError, Result};

use burn::tensor::{backend::Backend, Tensor};
use image::{imageops, Rgb, RgbImage};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait SummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()>;
    fn add_images(&mut self, tag: &str, images: &[RgbImage], step: usize) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct ScalarEvent<'a> {
    step: usize,
    tag: &'a str,
    value: f32,
}

#[derive(Debug)]
pub struct PngSummaryWriter {
    dir: PathBuf,
    scalars: BufWriter<File>,
}

impl PngSummaryWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("scalars.jsonl"))?;

        Ok(Self {
            dir,
            scalars: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SummaryWriter for PngSummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        serde_json::to_writer(&mut self.scalars, &ScalarEvent { step, tag, value })?;
        self.scalars.write_all(b"\n")?;
        self.scalars.flush()?;
        debug!(tag, value, step, "scalar");
        Ok(())
    }

    fn add_images(&mut self, tag: &str, images: &[RgbImage], step: usize) -> Result<()> {
        let tag_dir = self.dir.join(tag);
        fs::create_dir_all(&tag_dir)?;
        for (i, img) in images.iter().enumerate() {
            img.save(tag_dir.join(format!("{step:08}_{i}.png")))?;
        }
        debug!(tag, count = images.len(), step, "images");
        Ok(())
    }
}

/// Converts a `[batch, channels, height, width]` batch in [-1, 1] to RGB images.
///
/// Values outside the range are clamped. Single-channel batches are
/// replicated across R, G and B.
pub fn image_cast<B: Backend>(images: Tensor<B, 4>) -> Result<Vec<RgbImage>> {
    let [batch, channels, height, width] = images.dims();
    if channels != 1 && channels != 3 {
        return Err(GanError::UnsupportedChannels(channels));
    }

    let values = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| GanError::TensorData(format!("{err:?}")))?;

    let plane = height * width;
    let to_u8 = |v: f32| ((v + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8;

    let images = (0..batch)
        .map(|n| {
            let base = n * channels * plane;
            RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let offset = base + y as usize * width + x as usize;
                let pick = |c: usize| to_u8(values[offset + c * plane]);
                match channels {
                    1 => {
                        let v = pick(0);
                        Rgb([v, v, v])
                    }
                    _ => Rgb([pick(0), pick(1), pick(2)]),
                }
            })
        })
        .collect();

    Ok(images)
}

/// Pastes `rows * cols` equally sized images into one grid, row-major.
pub fn tile_images(images: &[RgbImage], rows: usize, cols: usize) -> Result<RgbImage> {
    let grid_error = || GanError::TileGrid {
        rows,
        cols,
        actual: images.len(),
    };

    let first = images.first().ok_or_else(grid_error)?;
    let (width, height) = first.dimensions();
    if images.len() != rows * cols
        || width == 0
        || height == 0
        || images.iter().any(|img| img.dimensions() != (width, height))
    {
        return Err(grid_error());
    }

    let mut grid = RgbImage::new(width * cols as u32, height * rows as u32);
    for (i, img) in images.iter().enumerate() {
        let (row, col) = (i / cols, i % cols);
        imageops::replace(
            &mut grid,
            img,
            (col as u32 * width) as i64,
            (row as u32 * height) as i64,
        );
    }

    Ok(grid)
}
