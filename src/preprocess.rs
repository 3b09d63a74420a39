use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{s, Array3, Array4};

use crate::error::EngineError;
use crate::geometry::RectifiedCrop;
use crate::types::{EngineConfig, LimitType};

/// Detector input width as a multiple of the recognizer height, before widening.
const REC_BASE_WH_RATIO: f32 = 320.0 / 48.0;

/// Resizes to a multiple of 32 and normalizes into a `[1, 3, H, W]` BGR tensor.
pub struct DetPreProcess {
    pub limit_side_len: u32,
    pub limit_type: LimitType,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl DetPreProcess {
    pub fn new(limit_side_len: u32, limit_type: LimitType, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            limit_side_len,
            limit_type,
            mean,
            std,
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::new(cfg.limit_side_len, cfg.limit_type, cfg.mean, cfg.std)
    }

    pub fn run(&self, img: &RgbImage) -> Result<Array4<f32>, EngineError> {
        let resized = self.resize(img)?;
        Ok(self.normalize_and_permute(&resized))
    }

    /// Target `(width, height)` for an image of the given size.
    pub fn target_size(&self, w: u32, h: u32) -> Result<(u32, u32), EngineError> {
        let limit = self.limit_side_len as f32;
        let ratio = match self.limit_type {
            LimitType::Max => {
                let max_side = h.max(w) as f32;
                if max_side > limit {
                    limit / max_side
                } else {
                    1.0
                }
            }
            LimitType::Min => {
                let min_side = h.min(w) as f32;
                if min_side < limit {
                    limit / min_side
                } else {
                    1.0
                }
            }
        };

        let resize_h = ((h as f32 * ratio) as i64 as f32 / 32.0).round() as i64 * 32;
        let resize_w = ((w as f32 * ratio) as i64 as f32 / 32.0).round() as i64 * 32;
        if resize_h <= 0 || resize_w <= 0 {
            return Err(EngineError::Preprocess(format!(
                "image {w}x{h} resizes to an empty detector input"
            )));
        }
        Ok((resize_w as u32, resize_h as u32))
    }

    fn resize(&self, img: &RgbImage) -> Result<RgbImage, EngineError> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(EngineError::Preprocess("empty image".to_string()));
        }
        let (resize_w, resize_h) = self.target_size(w, h)?;
        Ok(imageops::resize(img, resize_w, resize_h, FilterType::Triangle))
    }

    fn normalize_and_permute(&self, img: &RgbImage) -> Array4<f32> {
        let (w, h) = img.dimensions();
        let mut out = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        let scale = 1.0 / 255.0;

        for (x, y, pix) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            // Models expect BGR.
            let r = pix[0] as f32 * scale;
            let g = pix[1] as f32 * scale;
            let b = pix[2] as f32 * scale;

            out[[0, 0, y, x]] = (b - self.mean[0]) / self.std[0];
            out[[0, 1, y, x]] = (g - self.mean[1]) / self.std[1];
            out[[0, 2, y, x]] = (r - self.mean[2]) / self.std[2];
        }

        out
    }
}

/// Packs crops into one right-padded `[N, 3, H, W]` recognizer batch.
pub struct RecPreProcess {
    pub img_height: u32,
}

impl RecPreProcess {
    pub fn new(img_height: u32) -> Self {
        Self { img_height }
    }

    pub fn batch(&self, crops: &[RectifiedCrop]) -> Result<Array4<f32>, EngineError> {
        let img_h = self.img_height as usize;
        if img_h == 0 {
            return Err(EngineError::Preprocess("recognizer height is zero".to_string()));
        }

        let max_wh_ratio = crops
            .iter()
            .map(|c| c.aspect_ratio())
            .fold(REC_BASE_WH_RATIO, f32::max);
        let batch_width = (img_h as f32 * max_wh_ratio).round() as usize;

        let mut batch = Array4::<f32>::zeros((crops.len(), 3, img_h, batch_width));
        for (i, crop) in crops.iter().enumerate() {
            let norm = self.resize_norm_img(&crop.image, batch_width)?;
            batch.slice_mut(s![i, .., .., ..]).assign(&norm);
        }
        Ok(batch)
    }

    /// Resizes to the recognizer height keeping the aspect ratio, zero-pads on the right.
    fn resize_norm_img(&self, img: &RgbImage, img_width: usize) -> Result<Array3<f32>, EngineError> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(EngineError::Preprocess("invalid image size".to_string()));
        }

        let img_h = self.img_height;
        let ratio = w as f32 / h as f32;
        let resized_w = ((img_h as f32 * ratio).ceil() as usize).clamp(1, img_width) as u32;

        let resized = if (w, h) == (resized_w, img_h) {
            img.clone()
        } else {
            imageops::resize(img, resized_w, img_h, FilterType::Triangle)
        };

        let mut out = Array3::<f32>::zeros((3, img_h as usize, img_width));
        for (x, y, pix) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let r = pix[0] as f32 / 255.0;
            let g = pix[1] as f32 / 255.0;
            let b = pix[2] as f32 / 255.0;

            out[[0, y, x]] = (b - 0.5) / 0.5;
            out[[1, y, x]] = (g - 0.5) / 0.5;
            out[[2, y, x]] = (r - 0.5) / 0.5;
        }

        Ok(out)
    }
}
