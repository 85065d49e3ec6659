//! Analyse a local video file and print the report as JSON

use anyhow::{Context as _, Result};
use clap::Args;
use deepfake_common::AnalysisReport;
use deepfake_frame_classifier::{ClassifierConfig, FrameClassifierAdapter, OnnxDeepfakeClassifier};
use deepfake_pipeline::{load_overlay_font, DeepfakePipeline, PipelineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Args)]
pub struct AnalyzeCommand {
    /// Input video file
    #[arg(value_name = "VIDEO")]
    input: PathBuf,

    /// ONNX deepfake classifier
    #[arg(
        long,
        env = "DEEPFAKE_MODEL_PATH",
        default_value = "models/deepfake-detection/model.onnx"
    )]
    model: PathBuf,

    /// HuggingFace config.json with the model's id2label table
    #[arg(long, env = "DEEPFAKE_LABELS_PATH")]
    labels: Option<PathBuf>,

    /// TrueType font for score overlays on anomaly frames
    #[arg(long, env = "DEEPFAKE_FONT_PATH")]
    font: Option<PathBuf>,

    /// Directory for annotated frames and the anomaly video; a subdirectory
    /// named after the input is created inside it
    #[arg(long, default_value = "./deepfake_output")]
    output_dir: PathBuf,

    /// Classification worker threads (default: number of CPUs)
    #[arg(long, env = "DEEPFAKE_WORKERS")]
    workers: Option<usize>,

    /// Abort after this many seconds
    #[arg(long, env = "DEEPFAKE_TIMEOUT_SECS", default_value = "600")]
    timeout_secs: u64,

    /// Ignore frames whose real and fake scores are both below this value
    #[arg(long, env = "DEEPFAKE_MIN_CONFIDENCE")]
    min_confidence: Option<f32>,

    /// Write the report to this file instead of stdout
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

impl AnalyzeCommand {
    pub fn execute(self) -> Result<()> {
        let start = Instant::now();

        if !self.input.exists() {
            anyhow::bail!("Input file does not exist: {}", self.input.display());
        }
        let run_dir = self.prepare_run_dir()?;

        let mut classifier_config = ClassifierConfig::default();
        if let Some(labels) = &self.labels {
            classifier_config = classifier_config
                .with_labels_from_file(labels)
                .with_context(|| format!("Failed to read labels from {}", labels.display()))?;
        }
        let classifier = Arc::new(
            OnnxDeepfakeClassifier::new(&self.model, classifier_config)
                .with_context(|| format!("Failed to load model {}", self.model.display()))?,
        );

        let font = match &self.font {
            Some(path) => Some(load_overlay_font(path)?),
            None => {
                warn!("No --font given, anomaly frames get a marker bar instead of score text");
                None
            }
        };

        let mut config = PipelineConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            min_confidence: self.min_confidence,
            ..PipelineConfig::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
            config.channel_capacity = config.workers * 2;
        }

        let pipeline =
            DeepfakePipeline::new(FrameClassifierAdapter::new(classifier.clone()), config)
                .with_font(font);
        let report = pipeline
            .run(&self.input, &run_dir)
            .with_context(|| format!("Failed to analyse {}", self.input.display()))?;
        drop(pipeline);

        if let Ok(classifier) = Arc::try_unwrap(classifier) {
            classifier.shutdown();
        }

        let json = render_report(&report)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Report written to {}", path.display());
            }
            None => println!("{json}"),
        }

        info!(
            "Analysed {} in {:.2}s ({} sampled frames, {} anomalies)",
            self.input.display(),
            start.elapsed().as_secs_f64(),
            report.scores.len(),
            report.frames_with_anomalies.len()
        );
        Ok(())
    }

    /// `{output_dir}/{input stem}`, which must not already hold results
    fn prepare_run_dir(&self) -> Result<PathBuf> {
        let stem = self
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let run_dir = self.output_dir.join(stem);
        if dir_has_entries(&run_dir)? {
            anyhow::bail!(
                "Output directory {} is not empty; remove it or pass a different --output-dir",
                run_dir.display()
            );
        }
        std::fs::create_dir_all(&run_dir).context("Failed to create output directory")?;
        Ok(run_dir)
    }
}

/// Pretty JSON for the report, artifacts as local paths
fn render_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

fn dir_has_entries(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    }
}
