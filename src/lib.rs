//! # textspot - scene-text OCR pipeline
//!
//! textspot turns the raw outputs of a text detector and a CTC text recognizer into
//! ordered, located lines of text. The neural network itself sits behind the
//! [`ModelEngine`] trait; everything around it lives here:
//!
//! - **Detection post-processing**: probability map binarization, connected
//!   components, minimum-area boxes, unclip expansion and reading-order sorting.
//! - **Cropping**: perspective rectification of each box, vertical text turned upright.
//! - **Recognition**: batched recognize calls and greedy CTC decoding.
//! - **Filtering**: drop-score and empty-text rejection.
//!
//! With the `onnx` feature, [`onnx::OnnxEngine`] runs PaddleOCR-style ONNX models
//! through ONNX Runtime.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use textspot::onnx::OnnxEngine;
//! use textspot::{OcrPipeline, PipelineConfig};
//!
//! let mut config = PipelineConfig::default();
//! config.rec.dict_path = Some("models/dict.txt".into());
//!
//! let engine = OnnxEngine::from_config(&config)?;
//! let pipeline = OcrPipeline::new(config, engine)?;
//!
//! let img = image::open("image.jpg")?.to_rgb8();
//! for region in pipeline.run(&img)? {
//!     println!("{}: {:.3}", region.text, region.confidence);
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "onnx"))]
//! # fn main() {}
//! ```

pub mod contours;
pub mod crop;
pub mod det;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod rec;
pub mod response;
pub mod types;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use crate::engine::{CharProbabilityMatrix, ModelEngine, ProbabilityMap};
pub use crate::error::{EngineError, OcrError, Result};
pub use crate::geometry::{Point2f, QuadBox, RectifiedCrop};
pub use crate::pipeline::{filter_regions, OcrOutput, OcrPipeline, TextRegion};
pub use crate::postprocess::{DbPostProcess, TextBox};
pub use crate::rec::{CtcDecoder, Dictionary};
pub use crate::response::OcrResponse;
pub use crate::types::{DetConfig, EngineConfig, LimitType, PipelineConfig, RecConfig, ScoreMode};
