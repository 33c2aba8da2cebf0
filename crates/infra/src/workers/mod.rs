//! Queue consumers. One worker type per logical queue; each exposes a
//! `handle(&Job) -> JobOutcome` suitable for [`crate::jobs::JobExecutor`].

pub mod advance;
pub mod media;
pub mod notify;

pub use advance::{AdvanceJob, AdvanceWorker};
pub use media::MediaWorker;
pub use notify::NotifyWorker;
