mod ffmpeg;

use image::RgbImage;
use thiserror::Error;

pub use ffmpeg::FfmpegSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg not found")]
    FfmpegNotFound,
    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),
    #[error("stream interrupted")]
    Interrupted,
    #[error("frame has wrong size: expected {expected} bytes")]
    BadFrame { expected: usize },
}

/// Pull-model supplier of raw colour frames.
///
/// `Ok(None)` means the stream has ended; an `Err` is a read failure that
/// may be retried.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}
