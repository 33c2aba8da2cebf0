//! Image transcoding.

use std::fs;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;

use crate::target::{Fit, TranscodeProfile};

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The source file does not exist. It will never reappear; callers must
    /// not retry.
    #[error("source file missing: {0}")]
    SourceMissing(String),

    /// The source exists but could not be decoded or re-encoded. Transient
    /// resource exhaustion is plausible; callers may retry.
    #[error("transcode failed: {0}")]
    Failed(String),

    /// Output file is missing or zero-length after encoding. Retriable.
    #[error("empty output: {0}")]
    EmptyOutput(String),
}

/// Seam between the media worker and the actual image codec, so worker
/// behavior is testable without decoding real images.
pub trait Transcoder: Send + Sync {
    fn transcode(
        &self,
        source: &Path,
        profile: &TranscodeProfile,
        dest: &Path,
    ) -> Result<(), TranscodeError>;
}

/// Transcoder backed by the `image` crate. Output is always JPEG at the
/// profile's quality setting.
#[derive(Debug, Default)]
pub struct ImageTranscoder;

impl ImageTranscoder {
    pub fn new() -> Self {
        Self
    }
}

impl Transcoder for ImageTranscoder {
    fn transcode(
        &self,
        source: &Path,
        profile: &TranscodeProfile,
        dest: &Path,
    ) -> Result<(), TranscodeError> {
        if !source.exists() {
            return Err(TranscodeError::SourceMissing(source.display().to_string()));
        }

        let img = image::open(source).map_err(|e| TranscodeError::Failed(e.to_string()))?;

        let resized = match profile.fit {
            Fit::Cover => img.resize_to_fill(
                profile.max_width,
                profile.max_height,
                FilterType::Lanczos3,
            ),
            Fit::Bounded => img.resize(
                profile.max_width,
                profile.max_height,
                FilterType::Lanczos3,
            ),
        };

        // JPEG has no alpha channel; flatten before encoding.
        let rgb = resized.to_rgb8();
        let out = fs::File::create(dest).map_err(|e| TranscodeError::Failed(e.to_string()))?;
        let mut encoder = JpegEncoder::new_with_quality(out, profile.quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| TranscodeError::Failed(e.to_string()))?;

        let len = fs::metadata(dest)
            .map_err(|e| TranscodeError::EmptyOutput(e.to_string()))?
            .len();
        if len == 0 {
            return Err(TranscodeError::EmptyOutput(dest.display().to_string()));
        }

        Ok(())
    }
}
