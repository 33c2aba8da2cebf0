//! `storefront-media` — image transcode profiles, media job payloads, and
//! the transcoder used by the media worker.

pub mod job;
pub mod target;
pub mod transcode;

pub use job::{MediaJob, TargetField, WriteMode};
pub use target::{Fit, TargetCollection, TranscodeProfile};
pub use transcode::{ImageTranscoder, TranscodeError, Transcoder};
