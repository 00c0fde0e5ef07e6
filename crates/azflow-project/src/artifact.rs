//! Phase artifacts
//!
//! Every pipeline phase returns an [`ArtifactCollection`]. Later phases look artifacts up
//! by kind and location kind rather than by position, so a framework or target can add
//! extra entries without breaking its consumers.

use crate::error::{ProjectError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata keys used by the built-in frameworks and targets
pub mod metadata {
    pub const IMAGE_HASH: &str = "imageHash";
    pub const SOURCE_IMAGE: &str = "sourceImage";
    pub const TARGET_IMAGE: &str = "targetImage";
    pub const REMOTE_IMAGE: &str = "remoteImage";
    pub const LABEL: &str = "label";
    pub const DISCRIMINATOR: &str = "discriminator";
    pub const OVERRIDDEN: &str = "overridden";
    /// Set on deploy artifacts whose target resource is created by a later provision
    pub const PENDING_PROVISION: &str = "pendingProvision";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Directory,
    Config,
    Archive,
    Container,
    Endpoint,
    Deployment,
    Resource,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Directory => "directory",
            ArtifactKind::Config => "config",
            ArtifactKind::Archive => "archive",
            ArtifactKind::Container => "container",
            ArtifactKind::Endpoint => "endpoint",
            ArtifactKind::Deployment => "deployment",
            ArtifactKind::Resource => "resource",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an artifact lives on this machine or in the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Local,
    Remote,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKind::Local => f.write_str("local"),
            LocationKind::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub location: String,
    pub location_kind: LocationKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, location: impl Into<String>, location_kind: LocationKind) -> Self {
        Self {
            kind,
            location: location.into(),
            location_kind,
            metadata: BTreeMap::new(),
        }
    }

    pub fn local(kind: ArtifactKind, location: impl Into<String>) -> Self {
        Self::new(kind, location, LocationKind::Local)
    }

    pub fn remote(kind: ArtifactKind, location: impl Into<String>) -> Self {
        Self::new(kind, location, LocationKind::Remote)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(ProjectError::InvalidArtifact(format!(
                "{} artifact has an empty location",
                self.kind
            )));
        }
        Ok(())
    }

    /// Human readable line for the artifact; empty for kinds that are not shown
    pub fn to_display_string(&self, indent: &str) -> String {
        match (self.kind, self.location_kind) {
            (ArtifactKind::Endpoint, _) => {
                let label = self.metadata(metadata::LABEL).unwrap_or("Endpoint");
                match self.metadata(metadata::DISCRIMINATOR) {
                    Some(discriminator) if !discriminator.is_empty() => {
                        format!("{indent}- {label}: {} {discriminator}", self.location)
                    }
                    _ => format!("{indent}- {label}: {}", self.location),
                }
            }
            (ArtifactKind::Container, LocationKind::Remote) => {
                format!("{indent}- Remote Image: {}", self.location)
            }
            (ArtifactKind::Container, LocationKind::Local) => {
                format!("{indent}- Container: {}", self.location)
            }
            (ArtifactKind::Archive, _) => format!("{indent}- Package Output: {}", self.location),
            (ArtifactKind::Directory, _) => format!("{indent}- Build Output: {}", self.location),
            _ => String::new(),
        }
    }
}

/// Ordered artifacts produced by one phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactCollection(Vec<Artifact>);

impl ArtifactCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact; the location must not be empty
    pub fn add(&mut self, artifact: Artifact) -> Result<()> {
        artifact.validate()?;
        self.0.push(artifact);
        Ok(())
    }

    pub fn add_all(&mut self, artifacts: impl IntoIterator<Item = Artifact>) -> Result<()> {
        for artifact in artifacts {
            self.add(artifact)?;
        }
        Ok(())
    }

    /// Artifacts matching the kind and location kind (`None` matches anything)
    pub fn find(
        &self,
        kind: Option<ArtifactKind>,
        location_kind: Option<LocationKind>,
    ) -> impl Iterator<Item = &Artifact> {
        self.0.iter().filter(move |a| {
            kind.is_none_or(|k| a.kind == k) && location_kind.is_none_or(|l| a.location_kind == l)
        })
    }

    pub fn find_first(
        &self,
        kind: ArtifactKind,
        location_kind: Option<LocationKind>,
    ) -> Option<&Artifact> {
        self.find(Some(kind), location_kind).next()
    }

    pub fn find_last(
        &self,
        kind: ArtifactKind,
        location_kind: Option<LocationKind>,
    ) -> Option<&Artifact> {
        self.find(Some(kind), location_kind).last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.0.iter()
    }

    /// The most recently added artifact, of any kind
    pub fn last_mut(&mut self) -> Option<&mut Artifact> {
        self.0.last_mut()
    }

    pub fn retain(&mut self, keep: impl FnMut(&Artifact) -> bool) {
        self.0.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Display lines for every shown artifact
    pub fn to_display_string(&self, indent: &str) -> String {
        let lines: Vec<String> = self
            .0
            .iter()
            .map(|a| a.to_display_string(indent))
            .filter(|line| !line.is_empty())
            .collect();

        if lines.is_empty() {
            return format!("{indent}- No artifacts were found\n");
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl IntoIterator for ArtifactCollection {
    type Item = Artifact;
    type IntoIter = std::vec::IntoIter<Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ArtifactCollection {
    type Item = &'a Artifact;
    type IntoIter = std::slice::Iter<'a, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArtifactCollection {
        let mut artifacts = ArtifactCollection::new();
        artifacts
            .add_all([
                Artifact::local(ArtifactKind::Directory, "/src/api/dist"),
                Artifact::local(ArtifactKind::Container, "todo/api-dev:azd-deploy-1"),
                Artifact::remote(ArtifactKind::Container, "acr.io/todo/api-dev:azd-deploy-1"),
                Artifact::remote(ArtifactKind::Endpoint, "https://api.example.com/"),
            ])
            .unwrap();
        artifacts
    }

    #[test]
    fn test_add_rejects_empty_location() {
        let mut artifacts = ArtifactCollection::new();
        let result = artifacts.add(Artifact::local(ArtifactKind::Archive, "  "));
        assert!(matches!(result, Err(ProjectError::InvalidArtifact(_))));
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_find_by_kind_and_location() {
        let artifacts = sample();
        assert_eq!(artifacts.find(Some(ArtifactKind::Container), None).count(), 2);

        let remote = artifacts
            .find_first(ArtifactKind::Container, Some(LocationKind::Remote))
            .unwrap();
        assert_eq!(remote.location, "acr.io/todo/api-dev:azd-deploy-1");

        let last = artifacts.find_last(ArtifactKind::Container, None).unwrap();
        assert_eq!(last.location_kind, LocationKind::Remote);
        assert!(artifacts.find_first(ArtifactKind::Archive, None).is_none());
    }

    #[test]
    fn test_display_lines() {
        let display = sample().to_display_string("  ");
        assert_eq!(
            display,
            "  - Build Output: /src/api/dist\n  - Container: todo/api-dev:azd-deploy-1\n  - Remote Image: acr.io/todo/api-dev:azd-deploy-1\n  - Endpoint: https://api.example.com/\n"
        );

        let labelled = Artifact::remote(ArtifactKind::Endpoint, "https://x/score")
            .with_metadata(metadata::LABEL, "Scoring")
            .with_metadata(metadata::DISCRIMINATOR, "(blue)");
        assert_eq!(labelled.to_display_string(""), "- Scoring: https://x/score (blue)");
    }

    #[test]
    fn test_display_empty_collection() {
        let mut artifacts = ArtifactCollection::new();
        assert_eq!(artifacts.to_display_string(""), "- No artifacts were found\n");

        // kinds without a display line do not count
        artifacts
            .add(Artifact::remote(ArtifactKind::Deployment, "deployment-1"))
            .unwrap();
        assert_eq!(artifacts.to_display_string(""), "- No artifacts were found\n");
    }

    #[test]
    fn test_serialize_camel_case() {
        let artifact = Artifact::local(ArtifactKind::Archive, "/tmp/app.zip");
        let json = serde_json::to_string(&artifact).unwrap();
        assert_eq!(json, r#"{"kind":"archive","location":"/tmp/app.zip","locationKind":"local"}"#);
    }
}
