//! Frame sampling

/// Number of frames the sampler aims to classify per video
pub const TARGET_SAMPLES: u64 = 100;

/// Stride between sampled frames for a video of `total_frames` frames
///
/// Always at least 1, so short or unknown-length videos have every frame
/// sampled.
#[must_use]
pub fn frame_skip(total_frames: u64) -> u64 {
    frame_skip_for_target(total_frames, TARGET_SAMPLES)
}

/// Stride that yields roughly `target_samples` frames
#[must_use]
pub fn frame_skip_for_target(total_frames: u64, target_samples: u64) -> u64 {
    (total_frames / target_samples.max(1)).max(1)
}

/// Whether `frame_index` falls on the sampling stride
#[must_use]
pub fn is_sampled(frame_index: u64, frame_skip: u64) -> bool {
    frame_index % frame_skip.max(1) == 0
}
