// src/coordinate.rs

//! Artifact coordinates and version classification
//!
//! An [`ArtifactCoordinate`] is the immutable resolution key for an
//! artifact. Construction validates that the mandatory components are
//! non-empty; a coordinate never changes after creation.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Timestamped snapshot versions carry a `yyyyMMdd.HHmmss-N` suffix,
/// e.g. `1.0-20240115.103000-4`.
fn timestamped_snapshot_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-\d{8}\.\d{6}-\d+$").expect("invalid snapshot version pattern")
    })
}

/// Whether a version string names a snapshot or a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionClass {
    Release,
    Snapshot,
}

impl fmt::Display for VersionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Immutable identity of an artifact
///
/// group_id, artifact_id, version, and artifact_type are mandatory;
/// classifier is optional (e.g. `sources`, `javadoc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactCoordinate {
    group_id: String,
    artifact_id: String,
    version: String,
    classifier: Option<String>,
    artifact_type: String,
}

impl ArtifactCoordinate {
    /// Create a coordinate, validating the mandatory components
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
        classifier: Option<String>,
        artifact_type: impl Into<String>,
    ) -> Result<Self> {
        let coordinate = Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: classifier.filter(|c| !c.is_empty()),
            artifact_type: artifact_type.into(),
        };

        if coordinate.group_id.is_empty() {
            return Err(Error::Validation("group id must not be empty".to_string()));
        }
        if coordinate.artifact_id.is_empty() {
            return Err(Error::Validation(
                "artifact id must not be empty".to_string(),
            ));
        }
        if coordinate.version.is_empty() {
            return Err(Error::Validation("version must not be empty".to_string()));
        }
        if coordinate.artifact_type.is_empty() {
            return Err(Error::Validation("type must not be empty".to_string()));
        }

        Ok(coordinate)
    }

    /// Parse a colon-separated coordinate
    ///
    /// Format: `group:artifact:version[:type[:classifier]]`
    /// The type defaults to `jar` when omitted.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, artifact, version] => Self::new(*group, *artifact, *version, None, "jar"),
            [group, artifact, version, artifact_type] => {
                Self::new(*group, *artifact, *version, None, *artifact_type)
            }
            [group, artifact, version, artifact_type, classifier] => Self::new(
                *group,
                *artifact,
                *version,
                Some((*classifier).to_string()),
                *artifact_type,
            ),
            _ => Err(Error::Validation(format!(
                "expected group:artifact:version[:type[:classifier]], got '{}'",
                s
            ))),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn artifact_type(&self) -> &str {
        &self.artifact_type
    }

    /// Classify the version as snapshot or release
    ///
    /// A version is a snapshot if it ends in `-SNAPSHOT` (case-insensitive)
    /// or carries a Maven deployment timestamp suffix.
    pub fn version_class(&self) -> VersionClass {
        let upper = self.version.to_uppercase();
        if upper.ends_with("-SNAPSHOT") || timestamped_snapshot_re().is_match(&self.version) {
            VersionClass::Snapshot
        } else {
            VersionClass::Release
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.version_class() == VersionClass::Snapshot
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.group_id, self.artifact_id, self.version, self.artifact_type
        )?;
        if let Some(ref classifier) = self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}
