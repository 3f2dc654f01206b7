// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image normalization for the recognition model
//!
//! Steps, in order:
//! 1. Decode bytes (format detected from magic bytes)
//! 2. Convert to grayscale with ITU-R BT.601 weights: `0.299 R + 0.587 G + 0.114 B`
//! 3. Resize to a fixed `width x height` with bilinear interpolation
//!    (`FilterType::Triangle`)
//! 4. Scale intensities by `1 / 255` into `[0, 1]`
//! 5. Lay out as NHWC `[1, height, width, 1]`

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vision::image_utils::{decode_image_bytes, ImageError, DEFAULT_MAX_IMAGE_SIZE};

/// Default recognition input width
pub const REC_INPUT_WIDTH: u32 = 256;

/// Default recognition input height
pub const REC_INPUT_HEIGHT: u32 = 64;

/// BT.601 luma weights (R, G, B)
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Interpolation used for every resize; part of the numeric contract
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Fixed model input geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputGeometry {
    pub width: u32,
    pub height: u32,
}

impl InputGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Tensor shape `[1, height, width, 1]`
    pub fn tensor_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 1]
    }
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self::new(REC_INPUT_WIDTH, REC_INPUT_HEIGHT)
    }
}

/// Model-ready tensor of shape `[1, H, W, 1]` with values in `[0, 1]`
///
/// Only constructed by [`ImageNormalizer`] or through the checked
/// [`NormalizedTensor::from_array`], so holders can rely on the invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    /// Wrap an existing array after checking layout and value range
    ///
    /// Returns `None` if the array is not `[1, H, W, 1]` with `H, W > 0`, or if
    /// any value lies outside `[0, 1]`.
    pub fn from_array(data: Array4<f32>) -> Option<Self> {
        let shape = data.shape();
        if shape[0] != 1 || shape[3] != 1 || shape[1] == 0 || shape[2] == 0 {
            return None;
        }
        if !data.iter().all(|v| (0.0..=1.0).contains(v)) {
            return None;
        }
        Some(Self { data })
    }

    /// Zero-filled tensor for a geometry (used to probe a model at load time)
    pub fn zeros(geometry: InputGeometry) -> Self {
        Self {
            data: Array4::zeros(geometry.tensor_shape()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn geometry(&self) -> InputGeometry {
        InputGeometry::new(self.data.shape()[2] as u32, self.data.shape()[1] as u32)
    }

    pub fn as_array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Convert an image to 8-bit grayscale using BT.601 weights
///
/// Alpha is ignored. The result is rounded to the nearest integer, so the same
/// input yields the same grayscale regardless of the decoder's own luma
/// conversion.
pub fn to_luma_bt601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    GrayImage::from_fn(width, height, |x, y| {
        let p = rgb.get_pixel(x, y);
        let luma = LUMA_WEIGHTS[0] * p[0] as f32
            + LUMA_WEIGHTS[1] * p[1] as f32
            + LUMA_WEIGHTS[2] * p[2] as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Turns raw image bytes into the recognition model's input tensor
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    geometry: InputGeometry,
    max_image_bytes: usize,
}

impl ImageNormalizer {
    pub fn new(geometry: InputGeometry) -> Self {
        Self {
            geometry,
            max_image_bytes: DEFAULT_MAX_IMAGE_SIZE,
        }
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn geometry(&self) -> InputGeometry {
        self.geometry
    }

    /// Decode and normalize an uploaded byte buffer
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedTensor, ImageError> {
        let (image, info) = decode_image_bytes(bytes, self.max_image_bytes)?;
        debug!(
            "Decoded {:?} image: {}x{}, {} bytes",
            info.format, info.width, info.height, info.size_bytes
        );
        Ok(self.normalize_image(&image))
    }

    /// Normalize an already-decoded image
    pub fn normalize_image(&self, image: &DynamicImage) -> NormalizedTensor {
        let gray = to_luma_bt601(image);
        let InputGeometry { width, height } = self.geometry;

        let resized = if gray.dimensions() == (width, height) {
            gray
        } else {
            imageops::resize(&gray, width, height, RESIZE_FILTER)
        };

        let data = Array4::from_shape_fn(self.geometry.tensor_shape(), |(_, y, x, _)| {
            resized.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        });

        NormalizedTensor { data }
    }
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(InputGeometry::default())
    }
}
