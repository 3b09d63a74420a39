use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OcrError, Result};

/// Which pixels feed the detector's region score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// Mean probability over the pixels of the connected component itself.
    Contour,
    /// Mean probability over the pixels covered by the fitted min-area box.
    Box,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Min,
    Max,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetConfig {
    pub thresh: f32,
    pub box_thresh: f32,
    pub max_candidates: usize,
    pub unclip_ratio: f32,
    pub use_dilation: bool,
    pub min_side_len: f32,
    pub min_component_pixels: usize,
    pub score_mode: ScoreMode,
}

impl Default for DetConfig {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.5,
            max_candidates: 2000,
            unclip_ratio: 1.6,
            use_dilation: true,
            min_side_len: 4.0,
            min_component_pixels: 4,
            score_mode: ScoreMode::Contour,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecConfig {
    /// Height every rectified crop is resized to.
    pub img_height: u32,
    /// Crops per recognize call; 0 sends the whole request in one call.
    pub batch_num: usize,
    pub dict_path: Option<PathBuf>,
    /// Decode the trailing reserved class as a space.
    pub use_space_char: bool,
}

impl Default for RecConfig {
    fn default() -> Self {
        Self {
            img_height: 48,
            batch_num: 6,
            dict_path: None,
            use_space_char: true,
        }
    }
}

/// Settings for the ONNX Runtime engine. Only meaningful with the `onnx` feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub det_model_path: PathBuf,
    pub rec_model_path: PathBuf,
    pub limit_side_len: u32,
    pub limit_type: LimitType,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub intra_op_num_threads: usize,
    pub inter_op_num_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        // Auto-detect optimal thread count (use all available CPUs)
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            det_model_path: PathBuf::from("models/det.onnx"),
            rec_model_path: PathBuf::from("models/rec.onnx"),
            limit_side_len: 736,
            limit_type: LimitType::Min,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            intra_op_num_threads: num_threads,
            inter_op_num_threads: 1,
        }
    }
}

impl EngineConfig {
    /// Model files that do not exist on disk.
    pub fn missing_files(&self) -> Vec<PathBuf> {
        [&self.det_model_path, &self.rec_model_path]
            .into_iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub det: DetConfig,
    pub rec: RecConfig,
    pub engine: EngineConfig,
    pub drop_score: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            det: DetConfig::default(),
            rec: RecConfig::default(),
            engine: EngineConfig::default(),
            drop_score: 0.5,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Missing keys fall back to the defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(OcrError::Config(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("det.thresh", self.det.thresh)?;
        unit("det.box_thresh", self.det.box_thresh)?;
        unit("drop_score", self.drop_score)?;

        if !(self.det.unclip_ratio.is_finite() && self.det.unclip_ratio > 0.0) {
            return Err(OcrError::Config(format!(
                "det.unclip_ratio must be positive, got {}",
                self.det.unclip_ratio
            )));
        }
        if !(self.det.min_side_len.is_finite() && self.det.min_side_len >= 0.0) {
            return Err(OcrError::Config(format!(
                "det.min_side_len must be non-negative, got {}",
                self.det.min_side_len
            )));
        }
        if self.det.max_candidates == 0 {
            return Err(OcrError::Config("det.max_candidates must be at least 1".to_string()));
        }
        if self.rec.img_height == 0 {
            return Err(OcrError::Config("rec.img_height must be at least 1".to_string()));
        }
        if self.engine.std.iter().any(|s| *s == 0.0) {
            return Err(OcrError::Config("engine.std must not contain zeros".to_string()));
        }
        Ok(())
    }
}
