use std::time::Instant;

use image::RgbImage;
use tracing::{debug, instrument};

use crate::engine::ModelEngine;
use crate::error::EngineError;
use crate::postprocess::{DbPostProcess, TextBox};
use crate::types::DetConfig;

#[derive(Debug, Clone, Default)]
pub struct TextDetOutput {
    pub boxes: Vec<TextBox>,
    /// Seconds spent in the engine and post-processing.
    pub elapse: f64,
}

impl TextDetOutput {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

pub struct TextDetector {
    pub cfg: DetConfig,
    pub postprocess: DbPostProcess,
}

impl TextDetector {
    pub fn new(cfg: DetConfig) -> Self {
        let postprocess = DbPostProcess::new(&cfg);
        Self { cfg, postprocess }
    }

    /// Runs the detector and returns boxes in `img` coordinates, in reading order.
    #[instrument(level = "debug", skip(self, engine, img), fields(w = img.width(), h = img.height()))]
    pub fn run<E: ModelEngine>(&self, engine: &E, img: &RgbImage) -> Result<TextDetOutput, EngineError> {
        let start = Instant::now();

        let map = engine.detect(img)?;
        let boxes = self.postprocess.process(&map, img.width(), img.height());
        let elapse = start.elapsed().as_secs_f64();
        if boxes.is_empty() {
            debug!(elapse, "no text regions found");
        } else {
            debug!(count = boxes.len(), elapse, "detection done");
        }
        Ok(TextDetOutput { boxes, elapse })
    }
}
