use std::path::PathBuf;

/// Failures raised by a [`ModelEngine`](crate::engine::ModelEngine) implementation.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[cfg(feature = "onnx")]
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Invalid input shape")]
    InvalidInputShape,

    #[error("Preprocess error: {0}")]
    Preprocess(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Model session lock poisoned")]
    Poisoned,
}

/// Pipeline-level failures. "No text found" is never one of these.
#[derive(thiserror::Error, Debug)]
pub enum OcrError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Dictionary error ({path}): {reason}")]
    Dictionary { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Recognizer returned {actual} matrices for {expected} crops")]
    RecognitionCount { expected: usize, actual: usize },

    #[error("Recognizer emits {classes} classes but the dictionary only maps {dictionary}")]
    ClassCountMismatch { classes: usize, dictionary: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = OcrError> = std::result::Result<T, E>;
