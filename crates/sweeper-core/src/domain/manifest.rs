//! Registry-side artifact model.
//!
//! These types are produced by a `RegistryClient` and are read-only from the
//! sweep's point of view. Nothing here talks to the network.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content-addressed identifier of an artifact (e.g. `sha256:3f2a...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Digest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Digest {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One stored artifact as reported by the registry.
///
/// `tags` keeps the order the registry reported; deletion walks it in that
/// order. An untagged manifest has an empty `tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub digest: Digest,
    pub repository_name: String,
    pub last_updated_on: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ArtifactManifest {
    pub fn new(
        repository_name: impl Into<String>,
        digest: impl Into<Digest>,
        last_updated_on: DateTime<Utc>,
    ) -> Self {
        Self {
            digest: digest.into(),
            repository_name: repository_name.into(),
            last_updated_on,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// `repo@digest` form, used in log lines.
    pub fn reference(&self) -> String {
        format!("{}@{}", self.repository_name, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builder_keeps_tag_order() {
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let m = ArtifactManifest::new("web", "sha256:aa", at)
            .with_tag("v1")
            .with_tag("latest");

        assert_eq!(m.tags, vec!["v1".to_string(), "latest".to_string()]);
        assert_eq!(m.reference(), "web@sha256:aa");
    }

    #[test]
    fn digest_serializes_as_plain_string() {
        let d = Digest::new("sha256:bb");
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"sha256:bb\"");
    }
}
