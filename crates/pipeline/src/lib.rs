//! Deepfake video analysis pipeline
//!
//! Samples roughly one hundred frames from a video, scores each with a
//! real/fake classifier, annotates the frames that look synthetic, encodes
//! them into an evidence video and reduces the scores to video-level
//! statistics.
//!
//! # Example
//! ```no_run
//! use deepfake_frame_classifier::{ClassifierConfig, FrameClassifierAdapter, OnnxDeepfakeClassifier};
//! use deepfake_pipeline::{DeepfakePipeline, PipelineConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let classifier = OnnxDeepfakeClassifier::new(
//!     "models/deepfake-detection/model.onnx",
//!     ClassifierConfig::default(),
//! )?;
//! let pipeline = DeepfakePipeline::new(
//!     FrameClassifierAdapter::new(Arc::new(classifier)),
//!     PipelineConfig::default(),
//! );
//!
//! let report = pipeline.run(Path::new("clip.mp4"), Path::new("processed/clip"))?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod annotator;
pub mod assembler;
pub mod orchestrator;
pub mod sampler;

pub use aggregator::aggregate;
pub use annotator::{load_overlay_font, AnomalyAnnotator};
pub use assembler::{assemble_video, AssemblerConfig};
pub use orchestrator::{DeepfakePipeline, PipelineConfig, PipelineState};
pub use sampler::{frame_skip, is_sampled};
