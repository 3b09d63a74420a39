use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::crop::TextCropper;
use crate::det::TextDetector;
use crate::engine::ModelEngine;
use crate::error::{OcrError, Result};
use crate::geometry::QuadBox;
use crate::rec::{Dictionary, TextRecognizer};
use crate::types::PipelineConfig;

/// A located, recognized line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub quad: QuadBox,
    pub text: String,
    pub confidence: f32,
}

impl TextRegion {
    /// `(xmin, ymin, xmax, ymax)` of the quad.
    pub fn bbox(&self) -> (f32, f32, f32, f32) {
        self.quad.bounding_rect()
    }
}

/// Regions plus per-stage timings in seconds.
#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub regions: Vec<TextRegion>,
    pub elapse_det: f64,
    pub elapse_rec: f64,
}

/// Detection, cropping, recognition and filtering over a shared [`ModelEngine`].
///
/// Built once; `run` takes `&self` and keeps no per-request state, so one pipeline
/// can serve concurrent callers when the engine is `Sync`.
pub struct OcrPipeline<E> {
    config: PipelineConfig,
    engine: E,
    det: TextDetector,
    cropper: TextCropper,
    rec: TextRecognizer,
}

impl<E: ModelEngine> OcrPipeline<E> {
    /// Validates `config` and loads the dictionary from `config.rec.dict_path`.
    pub fn new(config: PipelineConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let path = config
            .rec
            .dict_path
            .clone()
            .ok_or_else(|| OcrError::Config("rec.dict_path is not set".to_string()))?;
        let dictionary = Dictionary::from_file(&path, config.rec.use_space_char)?;
        Self::with_dictionary(config, engine, dictionary)
    }

    pub fn with_dictionary(config: PipelineConfig, engine: E, dictionary: Dictionary) -> Result<Self> {
        config.validate()?;
        let det = TextDetector::new(config.det.clone());
        let cropper = TextCropper::new(config.rec.img_height);
        let rec = TextRecognizer::new(&config.rec, dictionary);
        Ok(Self {
            config,
            engine,
            det,
            cropper,
            rec,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn dictionary(&self) -> &Dictionary {
        self.rec.decoder().dictionary()
    }

    /// Ordered regions for `img`. An image without text yields `Ok(vec![])`.
    pub fn run(&self, img: &RgbImage) -> Result<Vec<TextRegion>> {
        Ok(self.run_detailed(img)?.regions)
    }

    #[instrument(level = "debug", skip(self, img), fields(w = img.width(), h = img.height()))]
    pub fn run_detailed(&self, img: &RgbImage) -> Result<OcrOutput> {
        if img.width() == 0 || img.height() == 0 {
            return Err(OcrError::InvalidImage(format!(
                "image has zero size ({}x{})",
                img.width(),
                img.height()
            )));
        }

        let det_res = self.det.run(&self.engine, img)?;
        if det_res.is_empty() {
            return Ok(OcrOutput {
                elapse_det: det_res.elapse,
                ..OcrOutput::default()
            });
        }

        let crops = self.cropper.crop_all(img, det_res.boxes.iter().map(|b| &b.quad));
        let (box_indices, crop_imgs): (Vec<usize>, Vec<_>) = crops.into_iter().unzip();
        let rec_res = self.rec.run(&self.engine, crop_imgs)?;

        let candidates = box_indices
            .into_iter()
            .zip(rec_res.txts.into_iter().zip(rec_res.scores))
            .map(|(idx, (text, confidence))| TextRegion {
                quad: det_res.boxes[idx].quad,
                text,
                confidence,
            });
        let regions = filter_regions(candidates, self.config.drop_score);
        debug!(
            boxes = det_res.boxes.len(),
            regions = regions.len(),
            elapse_det = det_res.elapse,
            elapse_rec = rec_res.elapse,
            "ocr done"
        );

        Ok(OcrOutput {
            regions,
            elapse_det: det_res.elapse,
            elapse_rec: rec_res.elapse,
        })
    }
}

/// Keeps regions with `confidence >= drop_score` and non-blank text, in order.
pub fn filter_regions<I>(candidates: I, drop_score: f32) -> Vec<TextRegion>
where
    I: IntoIterator<Item = TextRegion>,
{
    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(idx, region)| {
            if region.confidence < drop_score {
                trace!(idx, score = region.confidence, text = %region.text, "below drop score");
                return None;
            }
            if region.text.trim().is_empty() {
                trace!(idx, "empty text");
                return None;
            }
            Some(region)
        })
        .collect()
}
