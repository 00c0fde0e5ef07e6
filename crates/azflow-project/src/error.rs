//! Project error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while importing, synthesizing or deploying services
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The manifest describes something that cannot be deployed as written
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A phase of the pipeline failed for one service
    #[error("failed {verb} service '{service}': {source}")]
    Operation {
        verb: &'static str,
        service: String,
        #[source]
        source: Box<ProjectError>,
    },

    /// A lower level error with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProjectError>,
    },

    #[error("registry endpoint not found, ensure infrastructure output is set: set 'registry' in the docker options of service '{0}' or the 'AZURE_CONTAINER_REGISTRY_ENDPOINT' environment variable")]
    RegistryNotFound(String),

    #[error("no infrastructure found in folder '{0}'")]
    NoInfrastructure(PathBuf),

    #[error("this project does not contain any infrastructure to synthesize")]
    NothingToSynthesize,

    #[error("package source '{0}' is empty or does not exist")]
    EmptyPackageSource(PathBuf),

    #[error("artifact error: {0}")]
    InvalidArtifact(String),

    #[error("command '{command}' exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("hook '{name}' failed: {source}")]
    Hook {
        name: String,
        #[source]
        source: Box<ProjectError>,
    },

    /// Error reported by an extension over its channel
    #[error("extension '{extension}' failed: {message}")]
    Extension { extension: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] azflow_core::CoreError),

    #[error(transparent)]
    Build(#[from] azflow_build::BuildError),

    #[error(transparent)]
    Cloud(#[from] azflow_cloud::CloudError),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProjectError {
    /// Prefix the error with the operation that failed
    pub fn context(self, context: impl Into<String>) -> Self {
        ProjectError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error (or any error it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            ProjectError::Cancelled => true,
            ProjectError::Cloud(azflow_cloud::CloudError::Cancelled) => true,
            ProjectError::Build(azflow_build::BuildError::Cancelled) => true,
            ProjectError::Operation { source, .. }
            | ProjectError::Context { source, .. }
            | ProjectError::Hook { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// `.context()` for results, in the style of anyhow
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ProjectError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

pub type Result<T> = std::result::Result<T, ProjectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_message_names_service() {
        let err = ProjectError::Operation {
            verb: "packaging",
            service: "api".into(),
            source: Box::new(ProjectError::ToolNotFound("npm".into())),
        };
        assert_eq!(err.to_string(), "failed packaging service 'api': tool not found: npm");
    }

    #[test]
    fn test_context_and_cancellation() {
        let err: Result<()> = Err(ProjectError::Cancelled);
        let err = err.context("pushing image").unwrap_err();
        assert_eq!(err.to_string(), "pushing image: operation cancelled");
        assert!(err.is_cancelled());

        let cloud = ProjectError::from(azflow_cloud::CloudError::Cancelled).context("login");
        assert!(cloud.is_cancelled());
        assert!(!ProjectError::NothingToSynthesize.is_cancelled());
    }
}
