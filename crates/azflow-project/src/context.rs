//! Per-service pipeline state

use crate::artifact::ArtifactCollection;
use crate::progress::ProgressSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Pipeline phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    Restore,
    Build,
    Package,
    Publish,
    Deploy,
}

impl ServicePhase {
    pub const ALL: [ServicePhase; 5] = [
        ServicePhase::Restore,
        ServicePhase::Build,
        ServicePhase::Package,
        ServicePhase::Publish,
        ServicePhase::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServicePhase::Restore => "restore",
            ServicePhase::Build => "build",
            ServicePhase::Package => "package",
            ServicePhase::Publish => "publish",
            ServicePhase::Deploy => "deploy",
        }
    }

    /// Verb used in error messages (`failed packaging service ...`)
    pub fn verb(&self) -> &'static str {
        match self {
            ServicePhase::Restore => "restoring",
            ServicePhase::Build => "building",
            ServicePhase::Package => "packaging",
            ServicePhase::Publish => "publishing",
            ServicePhase::Deploy => "deploying",
        }
    }
}

impl fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifacts collected so far for one service, one collection per phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContext {
    #[serde(default)]
    pub restore: ArtifactCollection,
    #[serde(default)]
    pub build: ArtifactCollection,
    #[serde(default)]
    pub package: ArtifactCollection,
    #[serde(default)]
    pub publish: ArtifactCollection,
    #[serde(default)]
    pub deploy: ArtifactCollection,
}

impl ServiceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self, phase: ServicePhase) -> &ArtifactCollection {
        match phase {
            ServicePhase::Restore => &self.restore,
            ServicePhase::Build => &self.build,
            ServicePhase::Package => &self.package,
            ServicePhase::Publish => &self.publish,
            ServicePhase::Deploy => &self.deploy,
        }
    }

    pub fn artifacts_mut(&mut self, phase: ServicePhase) -> &mut ArtifactCollection {
        match phase {
            ServicePhase::Restore => &mut self.restore,
            ServicePhase::Build => &mut self.build,
            ServicePhase::Package => &mut self.package,
            ServicePhase::Publish => &mut self.publish,
            ServicePhase::Deploy => &mut self.deploy,
        }
    }
}

/// Progress sink and cancellation token threaded through every phase call
#[derive(Clone, Copy)]
pub struct OperationContext<'a> {
    pub progress: &'a dyn ProgressSink,
    pub cancel: &'a CancellationToken,
}

impl<'a> OperationContext<'a> {
    pub fn new(progress: &'a dyn ProgressSink, cancel: &'a CancellationToken) -> Self {
        Self { progress, cancel }
    }

    pub fn report(&self, message: &str) {
        self.progress.message(message);
    }

    /// Same cancellation token with a different sink
    pub fn with_progress(&self, progress: &'a dyn ProgressSink) -> Self {
        Self {
            progress,
            cancel: self.cancel,
        }
    }
}
