//! Media queue consumer: transcode, upload, patch the owning document.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use storefront_media::target::OUTPUT_EXT;
use storefront_media::{MediaJob, TargetCollection, TranscodeError, Transcoder, WriteMode};

use crate::docstore::{Collection, DocStoreError, DocumentStore, FieldAddress};
use crate::jobs::{Job, JobOutcome};
use crate::objstore::ObjectStore;

/// The document collection owning each media target kind.
fn doc_collection(target: TargetCollection) -> Collection {
    match target {
        TargetCollection::Gallery => Collection::Galleries,
        TargetCollection::Banner => Collection::Banners,
        TargetCollection::Product => Collection::Products,
        TargetCollection::Profile => Collection::Users,
    }
}

fn field_address(media: &MediaJob) -> FieldAddress {
    FieldAddress {
        collection: doc_collection(media.target),
        doc_id: media.doc_id.to_string(),
        field: media.address.field.clone(),
        within: media
            .address
            .within
            .as_ref()
            .map(|w| (w.array_field.clone(), w.index)),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "cleanup failed");
        }
    }
}

/// Consumes media jobs: transcode the upload per the target's profile,
/// upload the result, patch the owning document, delete superseded blobs.
pub struct MediaWorker<S, O, T> {
    docs: S,
    objects: O,
    transcoder: T,
}

impl<S: DocumentStore, O: ObjectStore, T: Transcoder> MediaWorker<S, O, T> {
    pub fn new(docs: S, objects: O, transcoder: T) -> Self {
        Self {
            docs,
            objects,
            transcoder,
        }
    }

    pub fn handle(&self, job: &Job) -> JobOutcome {
        let media: MediaJob = match serde_json::from_value(job.payload.clone()) {
            Ok(m) => m,
            Err(e) => return JobOutcome::Fatal(format!("malformed media job: {e}")),
        };

        let temp = temp_output(&media);
        let outcome = self.process(&media, &temp);

        // The temp output never outlives the attempt. The source survives a
        // retriable failure (the next attempt needs it) but nothing else.
        remove_quietly(&temp);
        if !matches!(outcome, JobOutcome::Retry(_)) {
            remove_quietly(&media.source_path);
        }
        outcome
    }

    fn process(&self, media: &MediaJob, temp: &Path) -> JobOutcome {
        if !media.source_path.exists() {
            return JobOutcome::Fatal(format!(
                "source file missing: {}",
                media.source_path.display()
            ));
        }
        if let Err(e) = fs::create_dir_all(&media.output_dir) {
            return JobOutcome::Retry(format!("output dir unavailable: {e}"));
        }

        let profile = media.target.transcode_profile();
        match self.transcoder.transcode(&media.source_path, &profile, temp) {
            Ok(()) => {}
            Err(TranscodeError::SourceMissing(e)) => {
                return JobOutcome::Fatal(format!("source file missing: {e}"));
            }
            Err(e) => return JobOutcome::Retry(e.to_string()),
        }

        let key = media.target.object_key(&media.file_id);
        if let Err(e) = self.objects.put(&key, temp, "image/jpeg") {
            return JobOutcome::Retry(format!("upload failed: {e}"));
        }

        match self.patch_document(media, &key) {
            Ok(()) => {
                info!(
                    file_id = %media.file_id,
                    key = %key,
                    target = ?media.target,
                    "media job completed"
                );
                JobOutcome::Success
            }
            Err(e @ (DocStoreError::NotFound { .. } | DocStoreError::BadAddress(_))) => {
                JobOutcome::Fatal(e.to_string())
            }
            Err(e) => JobOutcome::Retry(e.to_string()),
        }
    }

    fn patch_document(&self, media: &MediaJob, key: &str) -> Result<(), DocStoreError> {
        let addr = field_address(media);
        match media.mode {
            // Atomic append; concurrent jobs on the same array must not
            // lose updates.
            WriteMode::Append => self.docs.push_to_array(&addr, json!(key))?,
            WriteMode::Replace => {
                if let Some(Value::String(old)) = self.docs.get_field(&addr)? {
                    if !old.is_empty() && old != key {
                        // Best-effort: an orphaned blob is better than a
                        // failed job.
                        if let Err(e) = self.objects.remove(&old) {
                            warn!(key = %old, error = %e, "failed to delete superseded object");
                        }
                    }
                }
                self.docs.set_field(&addr, json!(key))?;

                // Gallery documents become publicly visible once replaced.
                if media.target == TargetCollection::Gallery {
                    let status = FieldAddress::new(
                        addr.collection,
                        media.doc_id.to_string(),
                        "status",
                    );
                    self.docs.set_field(&status, json!("completed"))?;
                }
            }
        }
        Ok(())
    }
}

fn temp_output(media: &MediaJob) -> PathBuf {
    media.output_dir.join(format!(
        "{}-{}.{}",
        media.file_id,
        Uuid::new_v4().simple(),
        OUTPUT_EXT,
    ))
}
