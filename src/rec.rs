use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, instrument, trace};

use crate::engine::{CharProbabilityMatrix, ModelEngine};
use crate::error::{OcrError, Result};
use crate::geometry::RectifiedCrop;
use crate::types::RecConfig;

/// Class index of the CTC blank.
pub const BLANK_INDEX: usize = 0;

/// Model metadata key holding an embedded character list.
pub const METADATA_CHARACTER_KEY: &str = "character";

/// Recognizer class table.
///
/// Index 0 is the CTC blank, `1..=N` are the key-file characters in file order and
/// `N + 1` is a trailing reserved symbol: a space when `use_space_char` is set,
/// otherwise an unknown placeholder that decodes to nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    chars: Vec<String>,
}

impl Dictionary {
    /// Loads a key file: UTF-8, one character per line.
    pub fn from_file<P: AsRef<Path>>(path: P, use_space_char: bool) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| OcrError::Dictionary {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw, path.to_path_buf(), use_space_char)
    }

    /// Character list stored under the `character` metadata key of a recognizer model.
    pub fn from_metadata(raw: &str, use_space_char: bool) -> Result<Self> {
        Self::parse(raw, PathBuf::from("<model metadata>"), use_space_char)
    }

    pub fn from_chars<I, S>(chars: I, use_space_char: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = PathBuf::from("<inline>");
        let keys: Vec<String> = chars.into_iter().map(Into::into).collect();
        if let Some(line) = keys.iter().position(|k| k.is_empty()) {
            return Err(OcrError::Dictionary {
                path: source,
                reason: format!("empty entry at index {line}"),
            });
        }
        Self::build(keys, source, use_space_char)
    }

    fn parse(raw: &str, source: PathBuf, use_space_char: bool) -> Result<Self> {
        let mut keys = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            let key = line.strip_suffix('\r').unwrap_or(line);
            if key.is_empty() {
                return Err(OcrError::Dictionary {
                    path: source,
                    reason: format!("empty entry on line {}", line_no + 1),
                });
            }
            keys.push(key.to_string());
        }
        Self::build(keys, source, use_space_char)
    }

    fn build(keys: Vec<String>, source: PathBuf, use_space_char: bool) -> Result<Self> {
        if keys.is_empty() {
            return Err(OcrError::Dictionary {
                path: source,
                reason: "no characters".to_string(),
            });
        }

        let mut chars = Vec::with_capacity(keys.len() + 2);
        chars.push(String::new());
        chars.extend(keys);
        chars.push(if use_space_char { " ".to_string() } else { String::new() });
        debug!(classes = chars.len(), source = %source.display(), "dictionary loaded");
        Ok(Self { chars })
    }

    /// Number of classes, reserved ones included.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.len() <= 2
    }

    /// Text for a class index; blank and unknown map to an empty string.
    pub fn character(&self, idx: usize) -> Option<&str> {
        self.chars.get(idx).map(String::as_str)
    }
}

/// Greedy CTC decoding: per-timestep arg-max, repeat collapsing, blank removal.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    dictionary: Dictionary,
}

impl CtcDecoder {
    pub fn new(dictionary: Dictionary) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Decoded text and the mean probability of the retained timesteps, in `[0, 1]`.
    ///
    /// Ties in the arg-max go to the lowest class index. A path with no retained
    /// timesteps decodes to `("", 0.0)`.
    pub fn decode(&self, preds: &CharProbabilityMatrix) -> Result<(String, f32)> {
        if preds.num_classes() > self.dictionary.len() {
            return Err(OcrError::ClassCountMismatch {
                classes: preds.num_classes(),
                dictionary: self.dictionary.len(),
            });
        }
        if preds.timesteps() == 0 || preds.num_classes() == 0 {
            return Ok((String::new(), 0.0));
        }

        let mut text = String::new();
        let mut conf_sum = 0.0f64;
        let mut retained = 0usize;
        let mut prev: Option<usize> = None;

        for row in preds.rows() {
            let mut best_idx = BLANK_INDEX;
            let mut best_val = f32::NEG_INFINITY;
            for (ci, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best_idx = ci;
                }
            }

            let repeated = prev == Some(best_idx);
            prev = Some(best_idx);
            if repeated || best_idx == BLANK_INDEX {
                continue;
            }

            if let Some(ch) = self.dictionary.character(best_idx) {
                text.push_str(ch);
            }
            if best_val.is_finite() {
                conf_sum += best_val as f64;
            }
            retained += 1;
        }

        if retained == 0 {
            return Ok((String::new(), 0.0));
        }
        let confidence = ((conf_sum / retained as f64) as f32).clamp(0.0, 1.0);
        Ok((text, confidence))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextRecOutput {
    pub txts: Vec<String>,
    pub scores: Vec<f32>,
    pub elapse: f64,
}

impl TextRecOutput {
    pub fn len(&self) -> usize {
        self.txts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txts.is_empty()
    }
}

/// Batches crops through the engine's recognizer and decodes the results.
pub struct TextRecognizer {
    pub batch_num: usize,
    decoder: CtcDecoder,
}

impl TextRecognizer {
    pub fn new(cfg: &RecConfig, dictionary: Dictionary) -> Self {
        Self {
            batch_num: cfg.batch_num,
            decoder: CtcDecoder::new(dictionary),
        }
    }

    pub fn decoder(&self) -> &CtcDecoder {
        &self.decoder
    }

    /// One `(text, confidence)` per crop, in input order.
    ///
    /// Crops are sent to the engine sorted by aspect ratio in groups of `batch_num`
    /// (all at once when it is 0) so similar widths share a padded batch.
    #[instrument(level = "debug", skip(self, engine, crops), fields(count = crops.len()))]
    pub fn run<E: ModelEngine>(&self, engine: &E, crops: Vec<RectifiedCrop>) -> Result<TextRecOutput> {
        let start = Instant::now();
        let img_num = crops.len();
        if img_num == 0 {
            return Ok(TextRecOutput::default());
        }

        let mut indexed: Vec<(usize, RectifiedCrop)> = crops.into_iter().enumerate().collect();
        indexed.sort_by(|a, b| a.1.aspect_ratio().total_cmp(&b.1.aspect_ratio()));
        let (indices, sorted): (Vec<usize>, Vec<RectifiedCrop>) = indexed.into_iter().unzip();

        let batch_num = if self.batch_num == 0 { img_num } else { self.batch_num };
        let mut all_texts: Vec<(String, f32)> = vec![(String::new(), 0.0); img_num];

        for (batch_idx, batch) in sorted.chunks(batch_num).enumerate() {
            let beg = batch_idx * batch_num;
            let preds = engine.recognize(batch)?;
            if preds.len() != batch.len() {
                return Err(OcrError::RecognitionCount {
                    expected: batch.len(),
                    actual: preds.len(),
                });
            }
            trace!(beg, size = batch.len(), "recognized batch");

            for (local_idx, matrix) in preds.iter().enumerate() {
                all_texts[indices[beg + local_idx]] = self.decoder.decode(matrix)?;
            }
        }

        let (txts, scores): (Vec<String>, Vec<f32>) = all_texts.into_iter().unzip();
        let elapse = start.elapsed().as_secs_f64();
        debug!(count = txts.len(), elapse, "recognition done");
        Ok(TextRecOutput { txts, scores, elapse })
    }
}
