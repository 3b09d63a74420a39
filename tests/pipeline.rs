use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};
use textspot::{
    CharProbabilityMatrix, Dictionary, EngineError, ModelEngine, OcrError, OcrPipeline, OcrResponse,
    PipelineConfig, ProbabilityMap, RectifiedCrop,
};

const CLASSES: usize = 5; // blank, a, b, c, space

/// Stand-in for the neural networks.
///
/// `detect` marks every non-white pixel as text. `recognize` identifies each crop by
/// the grey level at its centre and answers with the scripted class path.
struct ScriptedEngine {
    script: Vec<(u8, Vec<usize>, f32)>,
    fail_detect: bool,
    drop_last_matrix: bool,
    recognize_calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(script: Vec<(u8, Vec<usize>, f32)>) -> Self {
        Self {
            script,
            fail_detect: false,
            drop_last_matrix: false,
            recognize_calls: AtomicUsize::new(0),
        }
    }

    fn matrix_for(&self, crop: &RectifiedCrop) -> CharProbabilityMatrix {
        let centre = crop.image.get_pixel(crop.width() / 2, crop.height() / 2)[0];
        let (_, path, prob) = self
            .script
            .iter()
            .min_by_key(|(grey, _, _)| (*grey as i32 - centre as i32).abs())
            .expect("script is not empty");
        let rest = (1.0 - prob) / (CLASSES - 1) as f32;
        let rows: Vec<Vec<f32>> = path
            .iter()
            .map(|&class| (0..CLASSES).map(|i| if i == class { *prob } else { rest }).collect())
            .collect();
        CharProbabilityMatrix::from_rows(&rows).unwrap()
    }
}

impl ModelEngine for ScriptedEngine {
    fn detect(&self, image: &RgbImage) -> Result<ProbabilityMap, EngineError> {
        if self.fail_detect {
            return Err(EngineError::Inference("input tensor shape mismatch".to_string()));
        }
        Ok(ProbabilityMap::from_fn(
            image.width() as usize,
            image.height() as usize,
            |x, y| {
                if image.get_pixel(x as u32, y as u32)[0] < 250 {
                    0.9
                } else {
                    0.05
                }
            },
        ))
    }

    fn recognize(&self, crops: &[RectifiedCrop]) -> Result<Vec<CharProbabilityMatrix>, EngineError> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let mut out: Vec<CharProbabilityMatrix> = crops.iter().map(|c| self.matrix_for(c)).collect();
        if self.drop_last_matrix {
            out.pop();
        }
        Ok(out)
    }
}

const GREY_A: u8 = 10;
const GREY_B: u8 = 200;
const GREY_C: u8 = 100;

/// Two regions on the first line (A left, B right) and one (C) on the second.
fn page() -> RgbImage {
    let mut img = RgbImage::from_pixel(260, 120, Rgb([255, 255, 255]));
    let mut paint = |x0: u32, y0: u32, x1: u32, y1: u32, grey: u8| {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Rgb([grey, grey, grey]));
            }
        }
    };
    paint(20, 20, 120, 40, GREY_A);
    paint(150, 20, 240, 40, GREY_B);
    paint(20, 70, 100, 90, GREY_C);
    img
}

fn dictionary() -> Dictionary {
    Dictionary::from_chars(["a", "b", "c"], true).unwrap()
}

fn pipeline(engine: ScriptedEngine) -> OcrPipeline<ScriptedEngine> {
    OcrPipeline::with_dictionary(PipelineConfig::default(), engine, dictionary()).unwrap()
}

fn all_confident() -> ScriptedEngine {
    ScriptedEngine::new(vec![
        (GREY_A, vec![0, 1, 1, 0, 2, 0], 0.9),
        (GREY_B, vec![3, 3, 0], 0.95),
        (GREY_C, vec![2, 0, 1], 0.8),
    ])
}

#[test]
fn test_blank_image_yields_no_regions() {
    let ocr = pipeline(all_confident());
    let img = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
    let regions = ocr.run(&img).unwrap();
    assert!(regions.is_empty());
    assert_eq!(ocr.engine().recognize_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_regions_come_back_in_reading_order() {
    let ocr = pipeline(all_confident());
    let regions = ocr.run(&page()).unwrap();
    let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["ab", "c", "ba"]);

    let (ax0, _, ax1, _) = regions[0].bbox();
    assert!(ax0 <= 20.0 && ax1 >= 119.0);
    assert!(regions[2].bbox().1 > 50.0);
}

#[test]
fn test_identical_input_gives_identical_output() {
    let ocr = pipeline(all_confident());
    let img = page();
    assert_eq!(ocr.run(&img).unwrap(), ocr.run(&img).unwrap());
}

#[test]
fn test_low_confidence_and_blank_results_are_dropped() {
    let engine = ScriptedEngine::new(vec![
        (GREY_A, vec![1, 2], 0.9),
        (GREY_B, vec![3], 0.3),
        (GREY_C, vec![0, 0, 0, 0], 0.9),
    ]);
    let regions = pipeline(engine).run(&page()).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].text, "ab");
    assert!((regions[0].confidence - 0.9).abs() < 1e-5);
}

#[test]
fn test_every_region_has_text_and_unit_confidence() {
    let output = pipeline(all_confident()).run_detailed(&page()).unwrap();
    assert_eq!(output.regions.len(), 3);
    for region in &output.regions {
        assert!(!region.text.is_empty());
        assert!((0.0..=1.0).contains(&region.confidence));
    }
    assert!(output.elapse_det >= 0.0 && output.elapse_rec >= 0.0);
}

#[test]
fn test_one_recognize_call_with_batching_disabled() {
    let mut config = PipelineConfig::default();
    config.rec.batch_num = 0;
    let ocr = OcrPipeline::with_dictionary(config, all_confident(), dictionary()).unwrap();
    ocr.run(&page()).unwrap();
    assert_eq!(ocr.engine().recognize_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_small_batches_keep_alignment() {
    let mut config = PipelineConfig::default();
    config.rec.batch_num = 1;
    let ocr = OcrPipeline::with_dictionary(config, all_confident(), dictionary()).unwrap();
    let texts: Vec<String> = ocr.run(&page()).unwrap().into_iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["ab", "c", "ba"]);
    assert_eq!(ocr.engine().recognize_calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_detector_failure_propagates() {
    let mut engine = all_confident();
    engine.fail_detect = true;
    let err = pipeline(engine).run(&page()).unwrap_err();
    assert!(matches!(err, OcrError::Engine(EngineError::Inference(_))));
}

#[test]
fn test_short_recognizer_output_is_an_error() {
    let mut engine = all_confident();
    engine.drop_last_matrix = true;
    let err = pipeline(engine).run(&page()).unwrap_err();
    assert!(matches!(err, OcrError::RecognitionCount { .. }));
}

#[test]
fn test_zero_size_image_is_rejected() {
    let err = pipeline(all_confident()).run(&RgbImage::new(0, 0)).unwrap_err();
    assert!(matches!(err, OcrError::InvalidImage(_)));
}

#[test]
fn test_dictionary_loaded_from_config_path() {
    let mut keys = tempfile::NamedTempFile::new().unwrap();
    writeln!(keys, "a\nb\nc").unwrap();

    let mut config = PipelineConfig::default();
    config.rec.dict_path = Some(keys.path().to_path_buf());
    let ocr = OcrPipeline::new(config, all_confident()).unwrap();
    assert_eq!(ocr.dictionary(), &dictionary());
    assert_eq!(ocr.run(&page()).unwrap().len(), 3);
}

#[test]
fn test_missing_dictionary_fails_construction() {
    let mut config = PipelineConfig::default();
    config.rec.dict_path = Some("/nonexistent/keys.txt".into());
    let err = OcrPipeline::new(config, all_confident()).err().unwrap();
    assert!(matches!(err, OcrError::Dictionary { .. }));

    let err = OcrPipeline::new(PipelineConfig::default(), all_confident())
        .err()
        .unwrap();
    assert!(matches!(err, OcrError::Config(_)));
}

#[test]
fn test_invalid_config_fails_construction() {
    let mut config = PipelineConfig::default();
    config.drop_score = 2.0;
    let err = OcrPipeline::with_dictionary(config, all_confident(), dictionary())
        .err()
        .unwrap();
    assert!(matches!(err, OcrError::Config(_)));
}

#[test]
fn test_config_file_drives_the_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"drop_score": 0.92, "det": {{"unclip_ratio": 1.8}}}}"#).unwrap();
    let config = PipelineConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.det.unclip_ratio, 1.8);

    let ocr = OcrPipeline::with_dictionary(config, all_confident(), dictionary()).unwrap();
    let texts: Vec<String> = ocr.run(&page()).unwrap().into_iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["c"]);
}

#[test]
fn test_pipeline_is_shared_across_threads() {
    let ocr = pipeline(all_confident());
    let img = page();
    let expected = ocr.run(&img).unwrap();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| ocr.run(&img).unwrap())).collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_response_envelope() {
    let result = pipeline(all_confident()).run(&page());
    let value = serde_json::to_value(OcrResponse::from_result(&result)).unwrap();
    assert_eq!(value["success"], true);
    assert_eq!(value["data"]["text_count"], 3);
    assert_eq!(value["data"]["results"][0]["text"], "ab");
    assert!(value["data"]["results"][0]["bbox"]["points"].as_array().unwrap().len() == 4);
}
