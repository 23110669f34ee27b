//! Per-run accounting.
//!
//! A `CleanupResult` is created empty when a sweep starts, receives exactly one
//! record per artifact encountered, and is handed back to the caller when the
//! sweep ends. It is never persisted.

use serde::{Deserialize, Serialize};

use super::manifest::Digest;

/// Whether the sweep issued delete calls or only reported them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SweepMode {
    #[default]
    Execute,
    DryRun,
}

/// How the sweep ended.
///
/// Anything other than `Complete` means the buckets cover only the artifacts
/// visited before the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Complete,
    Cancelled,
    Aborted,
}

/// A delete call that failed for an artifact already classified stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub repository: String,
    pub digest: Digest,
    /// `Some(tag)` when the tag delete failed, `None` for the manifest delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub reason: String,
}

/// Outcome of one sweep.
///
/// `deleted_images` and `ignored_images` record classification, not confirmed
/// removal. Every digest in `failed_deletions` is also in `deleted_images`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    pub mode: SweepMode,
    pub status: RunStatus,
    pub repositories_scanned: usize,
    pub deleted_images: Vec<Digest>,
    pub ignored_images: Vec<Digest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_deletions: Vec<FailedDeletion>,
}

impl CleanupResult {
    pub fn new(mode: SweepMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn record_deleted(&mut self, digest: Digest) {
        self.deleted_images.push(digest);
    }

    pub fn record_ignored(&mut self, digest: Digest) {
        self.ignored_images.push(digest);
    }

    pub fn record_failure(&mut self, failure: FailedDeletion) {
        self.failed_deletions.push(failure);
    }

    /// Number of artifacts classified so far.
    pub fn total(&self) -> usize {
        self.deleted_images.len() + self.ignored_images.len()
    }

    pub fn is_partial(&self) -> bool {
        self.status != RunStatus::Complete
    }

    /// Plain-text line returned by the HTTP trigger.
    pub fn summary(&self) -> String {
        format!(
            "Cleanup Complete - Deleted: {} Safe: {}",
            self.deleted_images.len(),
            self.ignored_images.len()
        )
    }
}
