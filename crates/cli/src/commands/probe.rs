//! Report frame count and sampling stride without running the classifier

use anyhow::{Context as _, Result};
use clap::Args;
use deepfake_pipeline::frame_skip;
use std::path::PathBuf;

#[derive(Args)]
pub struct ProbeCommand {
    /// Input video file
    #[arg(value_name = "VIDEO")]
    input: PathBuf,
}

impl ProbeCommand {
    pub fn execute(self) -> Result<()> {
        let total_frames = deepfake_video_decoder::probe_frame_count(&self.input)
            .with_context(|| format!("Failed to probe {}", self.input.display()))?;
        let skip = frame_skip(total_frames);
        let sampled = if total_frames == 0 {
            0
        } else {
            total_frames.div_ceil(skip)
        };

        let summary = serde_json::json!({
            "path": self.input.display().to_string(),
            "total_frames": total_frames,
            "frame_skip": skip,
            "sampled_frames": sampled,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}
