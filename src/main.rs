use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use textspot::onnx::OnnxEngine;
use textspot::{OcrPipeline, OcrResponse, PipelineConfig, ScoreMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "textspot")]
#[command(about = "textspot - scene-text OCR with DB detection and CTC recognition", long_about = None)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to detection model (ONNX)
    #[arg(long)]
    det_model: Option<PathBuf>,

    /// Path to recognition model (ONNX)
    #[arg(long)]
    rec_model: Option<PathBuf>,

    /// Path to dictionary file; falls back to the list embedded in the recognizer
    #[arg(long)]
    dict: Option<PathBuf>,

    /// Binarization threshold
    #[arg(long)]
    thresh: Option<f32>,

    /// Minimum region score
    #[arg(long)]
    box_thresh: Option<f32>,

    #[arg(long)]
    unclip_ratio: Option<f32>,

    /// Minimum recognition confidence
    #[arg(long)]
    drop_score: Option<f32>,

    #[arg(long, value_enum)]
    score_mode: Option<ScoreModeArg>,

    /// Input image path
    image: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ScoreModeArg {
    Contour,
    Box,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON envelope with boxes, text and confidence
    Json,
    /// Plain text, one line per detected text
    Text,
    /// TSV format: text\tscore\tx1,y1,x2,y2,x3,y3,x4,y4
    Tsv,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(p) = &self.det_model {
            config.engine.det_model_path = p.clone();
        }
        if let Some(p) = &self.rec_model {
            config.engine.rec_model_path = p.clone();
        }
        if let Some(p) = &self.dict {
            config.rec.dict_path = Some(p.clone());
        }
        if let Some(v) = self.thresh {
            config.det.thresh = v;
        }
        if let Some(v) = self.box_thresh {
            config.det.box_thresh = v;
        }
        if let Some(v) = self.unclip_ratio {
            config.det.unclip_ratio = v;
        }
        if let Some(v) = self.drop_score {
            config.drop_score = v;
        }
        if let Some(mode) = self.score_mode {
            config.det.score_mode = match mode {
                ScoreModeArg::Contour => ScoreMode::Contour,
                ScoreModeArg::Box => ScoreMode::Box,
            };
        }
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config()?;
    let engine = OnnxEngine::from_config(&config)?;

    let pipeline = if config.rec.dict_path.is_some() {
        OcrPipeline::new(config, engine)?
    } else {
        let dictionary = engine
            .embedded_dictionary(config.rec.use_space_char)
            .ok_or("no --dict given and the recognizer model embeds no character list")??;
        OcrPipeline::with_dictionary(config, engine, dictionary)?
    };

    let img = image::open(&cli.image)?.to_rgb8();
    let result = pipeline.run(&img);

    match cli.format {
        OutputFormat::Json => {
            println!("{}", OcrResponse::from_result(&result).to_json_pretty()?);
        }
        OutputFormat::Text => {
            for region in &result? {
                println!("{}", region.text);
            }
        }
        OutputFormat::Tsv => {
            for region in &result? {
                let p = &region.quad.points;
                let box_str = format!(
                    "{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1}",
                    p[0].x, p[0].y, p[1].x, p[1].y, p[2].x, p[2].y, p[3].x, p[3].y,
                );
                println!("{}\t{:.3}\t{}", region.text, region.confidence, box_str);
            }
        }
    }

    Ok(())
}
