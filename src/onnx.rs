//! [`ModelEngine`] backed by ONNX Runtime, for PaddleOCR-style detection and
//! recognition models exported to ONNX.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ndarray::{ArrayD, Axis, Ix3, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info, instrument};

use crate::engine::{CharProbabilityMatrix, ModelEngine, ProbabilityMap};
use crate::error::{EngineError, OcrError, Result};
use crate::geometry::RectifiedCrop;
use crate::preprocess::{DetPreProcess, RecPreProcess};
use crate::rec::{Dictionary, METADATA_CHARACTER_KEY};
use crate::types::{EngineConfig, PipelineConfig};

/// One loaded model. `Session::run` needs `&mut`, so calls are serialized.
pub struct OrtSession {
    session: Mutex<Session>,
    input_name: String,
}

impl OrtSession {
    pub fn from_path(model_path: &Path, engine_cfg: &EngineConfig) -> Result<Self, EngineError> {
        let mut builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

        if engine_cfg.intra_op_num_threads > 0 {
            builder = builder.with_intra_threads(engine_cfg.intra_op_num_threads)?;
        }

        if engine_cfg.inter_op_num_threads > 0 {
            builder = builder.with_inter_threads(engine_cfg.inter_op_num_threads)?;
        }

        let session = builder.commit_from_file(model_path)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());
        debug!(model = %model_path.display(), input = %input_name, "session ready");

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    pub fn run(&self, input: ArrayD<f32>) -> Result<ArrayD<f32>, EngineError> {
        let mut session = self.session.lock().map_err(|_| EngineError::Poisoned)?;
        let input_value = Value::from_array(input)?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_value])?;
        let tensor = outputs[0].try_extract_array::<f32>()?;
        Ok(tensor.to_owned())
    }

    /// Newline-separated custom metadata value, if the model carries `key`.
    pub fn get_character_list(&self, key: &str) -> Option<String> {
        let session = self.session.lock().ok()?;
        let meta = session.metadata().ok()?;
        meta.custom(key).ok().flatten()
    }
}

pub struct OnnxEngine {
    det: OrtSession,
    rec: OrtSession,
    det_pre: DetPreProcess,
    rec_pre: RecPreProcess,
}

impl OnnxEngine {
    /// Loads both models. Fails up front when a model file is missing.
    pub fn new(cfg: &EngineConfig, rec_img_height: u32) -> Result<Self> {
        let missing = cfg.missing_files();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            return Err(OcrError::Config(format!("missing model files: {}", names.join(", "))));
        }

        info!(det = %cfg.det_model_path.display(), rec = %cfg.rec_model_path.display(), "loading models");
        Ok(Self {
            det: OrtSession::from_path(&cfg.det_model_path, cfg)?,
            rec: OrtSession::from_path(&cfg.rec_model_path, cfg)?,
            det_pre: DetPreProcess::from_config(cfg),
            rec_pre: RecPreProcess::new(rec_img_height),
        })
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        Self::new(&cfg.engine, cfg.rec.img_height)
    }

    /// Character list embedded in the recognizer model, when present.
    pub fn embedded_dictionary(&self, use_space_char: bool) -> Option<Result<Dictionary>> {
        self.rec
            .get_character_list(METADATA_CHARACTER_KEY)
            .map(|raw| Dictionary::from_metadata(&raw, use_space_char))
    }
}

impl ModelEngine for OnnxEngine {
    #[instrument(level = "debug", skip(self, image), fields(w = image.width(), h = image.height()))]
    fn detect(&self, image: &RgbImage) -> Result<ProbabilityMap, EngineError> {
        let input = self.det_pre.run(image)?;
        let preds = self
            .det
            .run(input.into_dyn())?
            .into_dimensionality::<Ix4>()
            .map_err(|_| EngineError::InvalidInputShape)?;

        if preds.shape()[0] == 0 || preds.shape()[1] == 0 {
            return Err(EngineError::InvalidInputShape);
        }
        let map = preds.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_owned();
        Ok(ProbabilityMap::new(map))
    }

    #[instrument(level = "debug", skip(self, crops), fields(count = crops.len()))]
    fn recognize(&self, crops: &[RectifiedCrop]) -> Result<Vec<CharProbabilityMatrix>, EngineError> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.rec_pre.batch(crops)?;
        let preds = self
            .rec
            .run(batch.into_dyn())?
            .into_dimensionality::<Ix3>()
            .map_err(|_| EngineError::InvalidInputShape)?;

        Ok(preds
            .axis_iter(Axis(0))
            .map(|m| CharProbabilityMatrix::new(m.to_owned()))
            .collect())
    }
}
