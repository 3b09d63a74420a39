use image::RgbImage;
use tracing::{debug, trace};

use crate::geometry::{perspective_crop, QuadBox, RectifiedCrop};

/// Cuts every detected region out of the source image as an upright line image.
#[derive(Debug, Clone, Copy)]
pub struct TextCropper {
    pub target_height: u32,
}

impl TextCropper {
    pub fn new(target_height: u32) -> Self {
        Self { target_height }
    }

    /// Crops in input order. Degenerate regions are skipped; each crop carries the
    /// index of the box it came from.
    pub fn crop_all<'a, I>(&self, image: &RgbImage, boxes: I) -> Vec<(usize, RectifiedCrop)>
    where
        I: IntoIterator<Item = &'a QuadBox>,
    {
        let mut crops = Vec::new();
        for (idx, quad) in boxes.into_iter().enumerate() {
            match perspective_crop(image, quad, self.target_height) {
                Some(crop) => crops.push((idx, crop)),
                None => trace!(idx, "skipping degenerate region"),
            }
        }
        debug!(crops = crops.len(), "rectified text regions");
        crops
    }
}
