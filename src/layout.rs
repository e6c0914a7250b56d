// src/layout.rs

//! Repository layout: coordinate to relative path
//!
//! Layout rules are supplied externally as a pure function; the engine
//! never inspects paths beyond joining them. [`Maven2Layout`] implements
//! the standard Maven 2 directory convention.

use crate::coordinate::ArtifactCoordinate;

/// Pure mapping from a coordinate to its canonical relative path
pub trait RepositoryLayout: Send + Sync {
    fn artifact_path(&self, coordinate: &ArtifactCoordinate) -> String;
}

/// Standard Maven 2 layout:
/// `group/with/slashes/artifact/version/artifact-version[-classifier].type`
pub struct Maven2Layout;

impl RepositoryLayout for Maven2Layout {
    fn artifact_path(&self, coordinate: &ArtifactCoordinate) -> String {
        let group_path = coordinate.group_id().replace('.', "/");
        let mut file_name = format!(
            "{}-{}",
            coordinate.artifact_id(),
            coordinate.version()
        );
        if let Some(classifier) = coordinate.classifier() {
            file_name.push('-');
            file_name.push_str(classifier);
        }
        file_name.push('.');
        file_name.push_str(coordinate.artifact_type());

        format!(
            "{}/{}/{}/{}",
            group_path,
            coordinate.artifact_id(),
            coordinate.version(),
            file_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maven2_plain_artifact() {
        let coordinate =
            ArtifactCoordinate::new("org.apache.commons", "commons-lang3", "3.12.0", None, "jar")
                .unwrap();
        assert_eq!(
            Maven2Layout.artifact_path(&coordinate),
            "org/apache/commons/commons-lang3/3.12.0/commons-lang3-3.12.0.jar"
        );
    }

    #[test]
    fn test_maven2_with_classifier() {
        let coordinate = ArtifactCoordinate::new(
            "org.example",
            "lib",
            "1.0",
            Some("sources".to_string()),
            "jar",
        )
        .unwrap();
        assert_eq!(
            Maven2Layout.artifact_path(&coordinate),
            "org/example/lib/1.0/lib-1.0-sources.jar"
        );
    }

    #[test]
    fn test_maven2_snapshot_version_kept_verbatim() {
        let coordinate =
            ArtifactCoordinate::new("org.example", "lib", "1.0-SNAPSHOT", None, "pom").unwrap();
        assert_eq!(
            Maven2Layout.artifact_path(&coordinate),
            "org/example/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.pom"
        );
    }
}
