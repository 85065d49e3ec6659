/// Sequential video decoder
///
/// Opens a video by path, reports its frame count, and yields decoded RGB24
/// frames one at a time in decode order. Frames are never buffered beyond the
/// one being returned, so memory stays flat regardless of video length.
use deepfake_common::{ProcessingError, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// `AVFormatContext::duration` is expressed in microseconds
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Decoded video frame in packed RGB24 layout
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in decode order (0-indexed)
    pub frame_index: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Raw RGB data (row-major, 3 bytes per pixel, no padding)
    pub data: Vec<u8>,
}

impl Frame {
    /// Convert into an [`RgbImage`]
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match `width * height * 3`.
    pub fn into_rgb_image(self) -> Result<RgbImage> {
        let (width, height, index) = (self.width, self.height, self.frame_index);
        RgbImage::from_raw(width, height, self.data).ok_or_else(|| {
            ProcessingError::ImageError(format!(
                "Frame {index} buffer does not match {width}x{height} RGB"
            ))
        })
    }
}

/// A source of frames read sequentially until exhausted
pub trait FrameSource {
    /// Total number of frames the source expects to yield (0 if unknown)
    fn total_frames(&self) -> u64;

    /// Decode the next frame, or `None` once the source is exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or pixel conversion fails.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Initialize `FFmpeg` library
fn init_ffmpeg() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| e.to_string())?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(())
    })
    .clone()
    .map_err(|e| ProcessingError::FFmpegError(format!("Failed to initialize FFmpeg: {e}")))
}

/// Opened video file decoded through libavcodec
///
/// Owns the demuxer, decoder and scaler for one file. All of them are released
/// when the handle is closed or dropped.
pub struct VideoHandle {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    stream_index: usize,
    total_frames: u64,
    next_index: u64,
    decoded: ffmpeg::util::frame::video::Video,
    converted: ffmpeg::util::frame::video::Video,
    eof_sent: bool,
}

impl VideoHandle {
    /// Open a video file for sequential decoding
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - No video stream is found
    /// - The decoder cannot be created
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path)
            .map_err(|e| ProcessingError::OpenFailed(format!("{}: {e}", path.display())))?;

        let (stream_index, total_frames, decoder) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or(ProcessingError::NoVideoStream)?;

            let total_frames = estimate_frame_count(&stream, input.duration());

            let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create context: {e}")))?
                .decoder()
                .video()
                .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create decoder: {e}")))?;

            (stream.index(), total_frames, decoder)
        };

        info!(
            "Opened {} ({}x{}, {} frames)",
            path.display(),
            decoder.width(),
            decoder.height(),
            total_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            decoder,
            scaler: None,
            stream_index,
            total_frames,
            next_index: 0,
            decoded: ffmpeg::util::frame::video::Video::empty(),
            converted: ffmpeg::util::frame::video::Video::empty(),
            eof_sent: false,
        })
    }

    /// Path the handle was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the demuxer and decoder
    pub fn close(self) {
        debug!(
            "Closing {} after {} decoded frames",
            self.path.display(),
            self.next_index
        );
    }

    /// Convert the frame currently held in `self.decoded` to RGB24
    fn convert_current(&mut self) -> Result<Frame> {
        let width = self.decoded.width();
        let height = self.decoded.height();

        if self.scaler.is_none() {
            let scaler = ffmpeg::software::scaling::Context::get(
                self.decoded.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| ProcessingError::FFmpegError(format!("Failed to create scaler: {e}")))?;
            self.scaler = Some(scaler);
        }

        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(&self.decoded, &mut self.converted)
                .map_err(|e| ProcessingError::FFmpegError(format!("Failed to convert frame: {e}")))?;
        }

        let frame = Frame {
            frame_index: self.next_index,
            width,
            height,
            data: copy_rgb_plane(&self.converted),
        };
        self.next_index += 1;
        Ok(frame)
    }
}

impl FrameSource for VideoHandle {
    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return self.convert_current().map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("Skipping undecodable packet in {}: {e}", self.path.display());
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().ok();
                    self.eof_sent = true;
                }
                Err(e) => {
                    return Err(ProcessingError::FFmpegError(format!(
                        "Failed to read packet: {e}"
                    )));
                }
            }
        }
    }
}

/// Frame count reported by the container, or an estimate from duration x frame rate
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn estimate_frame_count(stream: &ffmpeg::format::stream::Stream, container_duration: i64) -> u64 {
    let frames = stream.frames();
    if frames > 0 {
        return frames as u64;
    }

    let rate = stream.avg_frame_rate();
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return 0;
    }
    let fps = f64::from(rate);

    let seconds = if stream.duration() > 0 {
        stream.duration() as f64 * f64::from(stream.time_base())
    } else if container_duration > 0 {
        container_duration as f64 / AV_TIME_BASE
    } else {
        return 0;
    };

    (seconds * fps).round().max(0.0) as u64
}

/// Probe the frame count of a video without decoding it
///
/// # Errors
///
/// Returns an error if the file cannot be opened or has no video stream.
pub fn probe_frame_count(path: &Path) -> Result<u64> {
    init_ffmpeg()?;
    let input = ffmpeg::format::input(&path)
        .map_err(|e| ProcessingError::OpenFailed(format!("{}: {e}", path.display())))?;
    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(ProcessingError::NoVideoStream)?;
    Ok(estimate_frame_count(&stream, input.duration()))
}

/// Copy an RGB24 frame into a contiguous buffer, dropping row padding
fn copy_rgb_plane(frame: &ffmpeg::util::frame::video::Video) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let plane_data = frame.data(0);

    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row_end = row_start + (width * 3);
        data.extend_from_slice(&plane_data[row_start..row_end]);
    }
    data
}
