//! Supported media target collections and their transcode profiles.
//!
//! The set of owning document kinds is a closed enum; each carries its own
//! output dimensions and object-key prefix. Every profile normalizes to one
//! output codec/quality setting so the store stays uniform.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// How source dimensions map onto the profile's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fit {
    /// Fill and center-crop to exactly `max_width` x `max_height`.
    Cover,
    /// Shrink to fit within the box, preserving aspect ratio.
    Bounded,
}

/// Per-target-type rule set controlling transcode output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeProfile {
    pub max_width: u32,
    pub max_height: u32,
    pub fit: Fit,
    /// JPEG quality, 1-100. Identical for every profile.
    pub quality: u8,
}

/// File extension shared by all transcoded output.
pub const OUTPUT_EXT: &str = "jpg";

const OUTPUT_QUALITY: u8 = 80;

/// A document kind that owns transcoded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCollection {
    Gallery,
    Banner,
    Product,
    Profile,
}

impl TargetCollection {
    pub fn transcode_profile(&self) -> TranscodeProfile {
        match self {
            // Square-cropped avatar thumbnails.
            TargetCollection::Profile => TranscodeProfile {
                max_width: 256,
                max_height: 256,
                fit: Fit::Cover,
                quality: OUTPUT_QUALITY,
            },
            TargetCollection::Product => TranscodeProfile {
                max_width: 1024,
                max_height: 1024,
                fit: Fit::Bounded,
                quality: OUTPUT_QUALITY,
            },
            TargetCollection::Gallery => TranscodeProfile {
                max_width: 1600,
                max_height: 1600,
                fit: Fit::Bounded,
                quality: OUTPUT_QUALITY,
            },
            TargetCollection::Banner => TranscodeProfile {
                max_width: 1920,
                max_height: 1080,
                fit: Fit::Bounded,
                quality: OUTPUT_QUALITY,
            },
        }
    }

    /// Object-key prefix (first path segment) for this collection.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            TargetCollection::Gallery => "gallery",
            TargetCollection::Banner => "banner",
            TargetCollection::Product => "product",
            TargetCollection::Profile => "profile",
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            TargetCollection::Gallery => "Gallery",
            TargetCollection::Banner => "Banner",
            TargetCollection::Product => "Product",
            TargetCollection::Profile => "Profile",
        }
    }

    /// Object key convention: `{prefix}/{Name}-{file_id}-{unix_ms}.{ext}`.
    pub fn object_key(&self, file_id: &str) -> String {
        format!(
            "{}/{}-{}-{}.{}",
            self.key_prefix(),
            self.display_name(),
            file_id,
            Utc::now().timestamp_millis(),
            OUTPUT_EXT,
        )
    }
}
