//! End-to-end analysis of one video
//!
//! ```text
//! [Decode thread] --(index, RGB frame)--> [Worker pool] --FrameOutcome--> [Re-join by index]
//!   sampler                               classify + annotate               assemble + aggregate
//! ```
//!
//! The decoding thread owns the [`FrameSource`] and only forwards sampled
//! frames. Workers share one classifier and write anomaly images into the
//! request directory. Outcomes are sorted by frame index before the score
//! series, anomaly list, video and statistics are built.

use crate::aggregator::aggregate;
use crate::annotator::AnomalyAnnotator;
use crate::assembler::{assemble_video, AssemblerConfig};
use crate::sampler::{frame_skip_for_target, is_sampled, TARGET_SAMPLES};
use ab_glyph::FontVec;
use crossbeam_channel::{bounded, unbounded, Sender};
use deepfake_common::{
    AnalysisReport, AnomalyRecord, ClassificationResult, ProcessingError, Result, ScoreSeries,
};
use deepfake_frame_classifier::FrameClassifierAdapter;
use deepfake_video_decoder::{FrameSource, VideoHandle};
use image::RgbImage;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Approximate number of frames to classify per video
    pub target_samples: u64,
    /// Classification worker threads (clamped to at least 1)
    pub workers: usize,
    /// Decoded frames allowed in flight between decoder and workers
    pub channel_capacity: usize,
    /// Deadline for the whole pipeline
    pub timeout: Duration,
    /// Drop frames whose real and fake scores are both below this value
    pub min_confidence: Option<f32>,
    pub assembler: AssemblerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let workers = num_cpus::get().max(1);
        Self {
            target_samples: TARGET_SAMPLES,
            workers,
            channel_capacity: workers * 2,
            timeout: Duration::from_secs(600),
            min_confidence: None,
            assembler: AssemblerConfig::default(),
        }
    }
}

/// Pipeline stages, logged as the pipeline advances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Opened,
    Sampling,
    Classifying,
    Assembling,
    Aggregating,
    Done,
    OpenFailed,
    DecodeFailed,
    ClassificationFailed,
    AssemblyFailed,
    TimedOut,
}

impl PipelineState {
    /// Terminal failure state for an error raised while in `self`
    #[must_use]
    pub fn failure(self, err: &ProcessingError) -> Self {
        match err {
            ProcessingError::Timeout(_) => Self::TimedOut,
            ProcessingError::ClassificationFailed { .. } => Self::ClassificationFailed,
            ProcessingError::OpenFailed(_) | ProcessingError::NoVideoStream => Self::OpenFailed,
            ProcessingError::DimensionMismatch { .. } | ProcessingError::EncodeFailed(_) => {
                Self::AssemblyFailed
            }
            _ => match self {
                Self::Opened => Self::OpenFailed,
                Self::Assembling => Self::AssemblyFailed,
                _ => Self::DecodeFailed,
            },
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opened => "opened",
            Self::Sampling => "sampling",
            Self::Classifying => "classifying",
            Self::Assembling => "assembling",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
            Self::OpenFailed => "open_failed",
            Self::DecodeFailed => "decode_failed",
            Self::ClassificationFailed => "classification_failed",
            Self::AssemblyFailed => "assembly_failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Classification of one sampled frame, plus its anomaly record if flagged
#[derive(Debug)]
struct FrameOutcome {
    frame_index: u64,
    result: ClassificationResult,
    anomaly: Option<AnomalyRecord>,
}

/// Deepfake analysis pipeline
///
/// Holds the shared classifier and configuration; [`run`](Self::run) may be
/// called concurrently for different requests as long as each uses its own
/// output directory.
#[derive(Clone)]
pub struct DeepfakePipeline {
    adapter: FrameClassifierAdapter,
    config: PipelineConfig,
    font: Option<Arc<FontVec>>,
}

impl DeepfakePipeline {
    pub fn new(adapter: FrameClassifierAdapter, config: PipelineConfig) -> Self {
        Self {
            adapter,
            config,
            font: None,
        }
    }

    /// Use `font` for anomaly score overlays
    #[must_use]
    pub fn with_font(mut self, font: Option<Arc<FontVec>>) -> Self {
        self.font = font;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse the video at `video_path`, writing artifacts into `output_dir`
    ///
    /// The video is closed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the video cannot be opened or decoded, a frame
    /// cannot be classified, the anomaly video cannot be assembled, or the
    /// deadline passes.
    pub fn run(&self, video_path: &Path, output_dir: &Path) -> Result<AnalysisReport> {
        let started = Instant::now();
        let mut handle = VideoHandle::open(video_path).map_err(|e| {
            log_failure(PipelineState::Opened, &e, output_dir);
            e
        })?;
        log_state(PipelineState::Opened, output_dir);

        let result = self.analyse(&mut handle, output_dir, started + self.config.timeout);
        handle.close();
        result
    }

    /// Analyse frames from an already opened source
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_source<S: FrameSource>(
        &self,
        source: &mut S,
        output_dir: &Path,
    ) -> Result<AnalysisReport> {
        self.analyse(source, output_dir, Instant::now() + self.config.timeout)
    }

    fn analyse<S: FrameSource>(
        &self,
        source: &mut S,
        output_dir: &Path,
        deadline: Instant,
    ) -> Result<AnalysisReport> {
        std::fs::create_dir_all(output_dir)?;

        log_state(PipelineState::Sampling, output_dir);
        let total_frames = source.total_frames();
        let frame_skip = frame_skip_for_target(total_frames, self.config.target_samples);
        info!(
            "Sampling every {} frame(s) of {} in {}",
            frame_skip,
            total_frames,
            output_dir.display()
        );

        log_state(PipelineState::Classifying, output_dir);
        let outcomes = self
            .classify_frames(source, frame_skip, output_dir, deadline)
            .map_err(|e| {
                log_failure(PipelineState::Classifying, &e, output_dir);
                e
            })?;

        let mut scores = ScoreSeries::with_capacity(outcomes.len());
        let mut frames_with_anomalies = Vec::new();
        for outcome in outcomes {
            scores.push(outcome.frame_index, outcome.result)?;
            frames_with_anomalies.extend(outcome.anomaly);
        }
        info!(
            "Classified {} frames, {} anomalies",
            scores.len(),
            frames_with_anomalies.len()
        );

        log_state(PipelineState::Assembling, output_dir);
        let output_video = self
            .check_deadline(deadline)
            .and_then(|()| assemble_video(output_dir, &self.config.assembler))
            .map_err(|e| {
                log_failure(PipelineState::Assembling, &e, output_dir);
                e
            })?;

        log_state(PipelineState::Aggregating, output_dir);
        let final_scores = aggregate(&scores);

        log_state(PipelineState::Done, output_dir);
        Ok(AnalysisReport {
            frames_with_anomalies,
            scores,
            final_scores,
            output_video,
            total_video_frames: total_frames,
            frame_skip,
        })
    }

    /// Decode on the current thread and classify on a bounded worker pool
    ///
    /// Returns outcomes sorted by frame index.
    fn classify_frames<S: FrameSource>(
        &self,
        source: &mut S,
        frame_skip: u64,
        output_dir: &Path,
        deadline: Instant,
    ) -> Result<Vec<FrameOutcome>> {
        let workers = self.config.workers.max(1);
        let annotator = AnomalyAnnotator::new(output_dir, self.font.clone());
        let abort = AtomicBool::new(false);

        let (frame_tx, frame_rx) = bounded::<(u64, RgbImage)>(self.config.channel_capacity.max(1));
        let (outcome_tx, outcome_rx) = unbounded::<Result<Option<FrameOutcome>>>();

        let decode_result = thread::scope(|scope| {
            for _ in 0..workers {
                let frame_rx = frame_rx.clone();
                let outcome_tx = outcome_tx.clone();
                let annotator = &annotator;
                let abort = &abort;
                scope.spawn(move || {
                    // Keep draining after an abort so the decoder never blocks
                    for (frame_index, image) in frame_rx.iter() {
                        if abort.load(Ordering::Relaxed) {
                            continue;
                        }
                        let outcome = self
                            .check_deadline(deadline)
                            .and_then(|()| self.process_frame(annotator, frame_index, image));
                        if outcome.is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                        if outcome_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(frame_rx);
            drop(outcome_tx);

            let result = self.feed_frames(source, frame_skip, &frame_tx, &abort, deadline);
            if result.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            drop(frame_tx);
            result
        });
        decode_result?;

        let mut outcomes = Vec::new();
        let mut first_error: Option<ProcessingError> = None;
        for outcome in outcome_rx.iter() {
            match outcome {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        outcomes.sort_by_key(|o| o.frame_index);
        Ok(outcomes)
    }

    /// Read the source to exhaustion, forwarding sampled frames to the workers
    fn feed_frames<S: FrameSource>(
        &self,
        source: &mut S,
        frame_skip: u64,
        frame_tx: &Sender<(u64, RgbImage)>,
        abort: &AtomicBool,
        deadline: Instant,
    ) -> Result<()> {
        while !abort.load(Ordering::Relaxed) {
            self.check_deadline(deadline)?;

            let Some(frame) = source.next_frame()? else {
                break;
            };
            if !is_sampled(frame.frame_index, frame_skip) {
                continue;
            }
            let frame_index = frame.frame_index;
            let image = frame.into_rgb_image()?;
            if frame_tx.send((frame_index, image)).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn process_frame(
        &self,
        annotator: &AnomalyAnnotator,
        frame_index: u64,
        image: RgbImage,
    ) -> Result<Option<FrameOutcome>> {
        let result = self.adapter.classify_frame(frame_index, &image)?;

        if let Some(threshold) = self.config.min_confidence {
            if !result.is_confident(threshold) {
                debug!(
                    "Frame {} below confidence {} (real={:.4} fake={:.4}), skipped",
                    frame_index, threshold, result.real_score, result.fake_score
                );
                return Ok(None);
            }
        }

        let anomaly = annotator.annotate(frame_index, image, &result)?;
        Ok(Some(FrameOutcome {
            frame_index,
            result,
            anomaly,
        }))
    }

    fn check_deadline(&self, deadline: Instant) -> Result<()> {
        if Instant::now() >= deadline {
            Err(ProcessingError::Timeout(self.config.timeout.as_secs()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for DeepfakePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepfakePipeline")
            .field("config", &self.config)
            .field("has_font", &self.font.is_some())
            .finish_non_exhaustive()
    }
}

fn log_state(state: PipelineState, output_dir: &Path) {
    debug!("Pipeline {} ({})", state, output_dir.display());
}

fn log_failure(stage: PipelineState, err: &ProcessingError, output_dir: &Path) {
    error!(
        "Pipeline {} during {} ({}): {}",
        stage.failure(err),
        stage,
        output_dir.display(),
        err
    );
}
