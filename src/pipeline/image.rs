//! Image descriptor consumed by tickets and runners.
//!
//! Pixels are interleaved `f32` channels, row-major, tightly packed. Images
//! are shared through `ImageHandle`, whose identity is the identity of the
//! underlying storage.

use crate::pipeline::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Channel layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelLayout {
    pub channels: u8,
}

impl PixelLayout {
    pub const GRAY: PixelLayout = PixelLayout { channels: 1 };
    pub const RGB: PixelLayout = PixelLayout { channels: 3 };
    pub const RGBA: PixelLayout = PixelLayout { channels: 4 };

    pub fn channels(self) -> usize {
        self.channels as usize
    }
}

impl Default for PixelLayout {
    fn default() -> Self {
        Self::RGB
    }
}

/// Requested region in pixel units. Fractional values allow sub-pixel sampling;
/// [`Rect::pixel_bounds`] snaps outward to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whole pixel region `(x, y, width, height)` covering this rectangle.
    pub fn pixel_bounds(&self) -> (usize, usize, usize, usize) {
        let x0 = self.x.max(0.0).floor();
        let y0 = self.y.max(0.0).floor();
        let x1 = (self.x + self.width).max(0.0).ceil();
        let y1 = (self.y + self.height).max(0.0).ceil();
        (
            x0 as usize,
            y0 as usize,
            (x1 - x0).max(0.0) as usize,
            (y1 - y0).max(0.0) as usize,
        )
    }
}

/// Owned pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    layout: PixelLayout,
    data: Vec<f32>,
}

fn sample_count(width: usize, height: usize, layout: PixelLayout) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(layout.channels())
}

impl Image {
    /// Zero-filled image.
    ///
    /// # Panics
    ///
    /// Panics if the sample count overflows. Use [`Image::try_new`] for sizes
    /// that come from options or requests.
    pub fn new(width: usize, height: usize, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            layout,
            data: vec![0.0; width * height * layout.channels()],
        }
    }

    /// Zero-filled image, or [`PipelineError::AllocationFailure`] when the
    /// storage cannot be sized or reserved.
    pub fn try_new(width: usize, height: usize, layout: PixelLayout) -> PipelineResult<Self> {
        let too_large = || {
            PipelineError::AllocationFailure(format!(
                "{}x{} image with {} channel(s)",
                width,
                height,
                layout.channels()
            ))
        };
        let len = sample_count(width, height, layout).ok_or_else(too_large)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| too_large())?;
        data.resize(len, 0.0);
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    /// Set every pixel to `value`. Extra or missing channels are ignored.
    pub fn fill(&mut self, value: &[f32]) {
        let c = self.layout.channels();
        if c == 0 {
            return;
        }
        let n = c.min(value.len());
        for px in self.data.chunks_exact_mut(c) {
            px[..n].copy_from_slice(&value[..n]);
        }
    }

    /// Wrap existing samples. Returns `None` when the length does not match.
    pub fn from_samples(
        width: usize,
        height: usize,
        layout: PixelLayout,
        data: Vec<f32>,
    ) -> Option<Self> {
        (sample_count(width, height, layout) == Some(data.len())).then_some(Self {
            width,
            height,
            layout,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn full_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    pub fn row(&self, y: usize) -> &[f32] {
        let stride = self.width * self.layout.channels();
        &self.data[y * stride..(y + 1) * stride]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let stride = self.width * self.layout.channels();
        &mut self.data[y * stride..(y + 1) * stride]
    }

    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let c = self.layout.channels();
        let start = (y * self.width + x) * c;
        &self.data[start..start + c]
    }

    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        let c = self.layout.channels();
        let start = (y * self.width + x) * c;
        &mut self.data[start..start + c]
    }

    /// Copy a `width`×`height` block from `src` at `(sx, sy)` to `(dx, dy)`.
    ///
    /// The block is clipped to both images. Layouts must agree; channels beyond
    /// the smaller layout are left untouched. Returns the number of pixels copied.
    pub fn copy_region(
        &mut self,
        (dx, dy): (usize, usize),
        src: &Image,
        (sx, sy): (usize, usize),
        (width, height): (usize, usize),
    ) -> usize {
        let w = width
            .min(self.width.saturating_sub(dx))
            .min(src.width.saturating_sub(sx));
        let h = height
            .min(self.height.saturating_sub(dy))
            .min(src.height.saturating_sub(sy));
        let c = self.layout.channels().min(src.layout.channels());
        for row in 0..h {
            for col in 0..w {
                let from = src.pixel(sx + col, sy + row);
                let to = self.pixel_mut(dx + col, dy + row);
                to[..c].copy_from_slice(&from[..c]);
            }
        }
        w * h
    }
}

/// Shared handle to an image. Clones share storage.
#[derive(Debug, Clone)]
pub struct ImageHandle(Arc<RwLock<Image>>);

impl ImageHandle {
    pub fn new(image: Image) -> Self {
        Self(Arc::new(RwLock::new(image)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Image> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Image> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether both handles point at the same storage.
    pub fn same_storage(&self, other: &ImageHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Snapshot of the current pixels.
    pub fn to_image(&self) -> Image {
        self.read().clone()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        let img = self.read();
        (img.width(), img.height())
    }
}
