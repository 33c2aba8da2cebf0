//! Media job payload (queue wire shape).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use storefront_core::{DocumentId, DomainError, DomainResult};

use crate::target::TargetCollection;

/// How the new object reference is written into the owning document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Push the reference into the array at the target field.
    Append,
    /// Overwrite the scalar at the target field, deleting the superseded
    /// object from the store best-effort.
    Replace,
}

/// Explicit field addressing within the owning document.
///
/// Replaces dotted index-encoded paths (`visuals.2.images`): `within`
/// optionally selects an element of a nested array first, then `field`
/// names the scalar or array to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetField {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<ArrayElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayElement {
    pub array_field: String,
    pub index: usize,
}

impl TargetField {
    pub fn scalar(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            within: None,
        }
    }

    pub fn in_array(array_field: impl Into<String>, index: usize, field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            within: Some(ArrayElement {
                array_field: array_field.into(),
                index,
            }),
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.field.trim().is_empty() {
            return Err(DomainError::invalid_input("target field must be non-empty"));
        }
        if let Some(within) = &self.within {
            if within.array_field.trim().is_empty() {
                return Err(DomainError::invalid_input(
                    "nested array field must be non-empty",
                ));
            }
        }
        Ok(())
    }
}

/// Transient queue payload describing one upload to transcode and relocate.
///
/// Created by a request handler at upload time, consumed once logically
/// (at-least-once physically), discarded after success or retry exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaJob {
    pub file_id: String,
    pub source_path: PathBuf,
    pub mime_type: String,
    pub output_dir: PathBuf,
    pub target: TargetCollection,
    pub doc_id: DocumentId,
    pub address: TargetField,
    pub mode: WriteMode,
}

impl MediaJob {
    /// Validate before enqueue; a malformed job must never reach the worker.
    pub fn validate(&self) -> DomainResult<()> {
        if self.file_id.trim().is_empty() {
            return Err(DomainError::invalid_input("file_id must be non-empty"));
        }
        if !self.mime_type.starts_with("image/") {
            return Err(DomainError::invalid_input(format!(
                "unsupported mime type: {}",
                self.mime_type
            )));
        }
        self.address.validate()
    }
}
