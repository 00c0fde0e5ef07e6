//! Framework services
//!
//! A framework service knows how to restore, build and package the source of one
//! language. Container-hosted services wrap their language framework in the docker
//! framework, which turns the result into an image.

mod docker;
mod dotnet;
mod maven;
mod npm;
mod python;

pub use docker::DockerFramework;
pub use dotnet::DotnetFramework;
pub use maven::MavenFramework;
pub use npm::{NodePackageManager, NpmFramework};
pub use python::PythonFramework;

use crate::artifact::ArtifactCollection;
use crate::command::CommandRunner;
use crate::container::ContainerHelper;
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use azflow_core::{ServiceConfig, ServiceLanguageKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Phases that must have run before `package`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequirements {
    pub require_restore: bool,
    pub require_build: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkRequirements {
    pub package: PackageRequirements,
}

#[async_trait]
pub trait FrameworkService: Send + Sync {
    fn requirements(&self) -> FrameworkRequirements;

    async fn initialize(&self, _service: &ServiceConfig) -> Result<()> {
        Ok(())
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection>;

    async fn build(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection>;

    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection>;
}

pub type FrameworkFactory = Arc<dyn Fn() -> Arc<dyn FrameworkService> + Send + Sync>;

type DockerFactory =
    Arc<dyn Fn(Option<Arc<dyn FrameworkService>>) -> Arc<dyn FrameworkService> + Send + Sync>;

/// Language → framework service constructors
pub struct FrameworkRegistry {
    factories: HashMap<ServiceLanguageKind, FrameworkFactory>,
    docker: DockerFactory,
}

impl FrameworkRegistry {
    /// Registry with the docker framework only
    pub fn new(helper: Arc<ContainerHelper>) -> Self {
        let docker: DockerFactory = Arc::new(move |inner| {
            Arc::new(DockerFramework::new(helper.clone(), inner)) as Arc<dyn FrameworkService>
        });
        Self {
            factories: HashMap::new(),
            docker,
        }
    }

    /// Registry with every built-in language
    pub fn with_builtins(runner: Arc<dyn CommandRunner>, helper: Arc<ContainerHelper>) -> Self {
        let mut registry = Self::new(helper);

        let r = runner.clone();
        registry.register(ServiceLanguageKind::Dotnet, move || {
            Arc::new(DotnetFramework::new(r.clone()))
        });
        let r = runner.clone();
        registry.register(ServiceLanguageKind::Python, move || {
            Arc::new(PythonFramework::new(r.clone()))
        });
        for language in [ServiceLanguageKind::JavaScript, ServiceLanguageKind::TypeScript] {
            let r = runner.clone();
            registry.register(language, move || Arc::new(NpmFramework::new(r.clone())));
        }
        let r = runner;
        registry.register(ServiceLanguageKind::Java, move || {
            Arc::new(MavenFramework::new(r.clone()))
        });
        registry
    }

    /// Register (or replace) the framework for a language
    pub fn register<F>(&mut self, language: ServiceLanguageKind, factory: F)
    where
        F: Fn() -> Arc<dyn FrameworkService> + Send + Sync + 'static,
    {
        self.factories.insert(language, Arc::new(factory));
    }

    pub fn supports(&self, language: &ServiceLanguageKind) -> bool {
        *language == ServiceLanguageKind::Docker || self.factories.contains_key(language)
    }

    /// Framework service for a service, wrapped in docker when the host needs an image
    pub fn resolve(&self, service: &ServiceConfig) -> Result<Arc<dyn FrameworkService>> {
        let language = match &service.language {
            ServiceLanguageKind::None if !service.image.is_empty() => ServiceLanguageKind::Docker,
            other => other.clone(),
        };

        if language == ServiceLanguageKind::Docker {
            return Ok((self.docker)(None));
        }

        let factory = self.factories.get(&language).ok_or_else(|| {
            ProjectError::Unsupported(format!(
                "language '{}' is not supported by built-in framework services and no extensions are currently providing it",
                language
            ))
        })?;

        let framework = factory();
        if service.host.requires_container() {
            Ok((self.docker)(Some(framework)))
        } else {
            Ok(framework)
        }
    }
}

/// Error unless `dir` exists and has at least one entry
pub(crate) fn ensure_package_source(dir: &Path) -> Result<()> {
    let has_entries = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if has_entries {
        Ok(())
    } else {
        Err(ProjectError::EmptyPackageSource(dir.to_path_buf()))
    }
}

/// Fresh directory for package output under the system temp dir
pub(crate) fn create_package_dir(service: &ServiceConfig) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!(
        "azflow-{}-{}",
        service.name,
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Recursively copy `src` into `dst`, skipping top-level entries named in `exclude`
pub(crate) fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name.to_str() == Some(*e)) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir(&from, &to, &[])?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Directory a tool should run in; the parent when the service points at a project file
pub(crate) fn working_dir(service: &ServiceConfig) -> PathBuf {
    let path = service.path();
    if path.is_file() {
        path.parent().map(Path::to_path_buf).unwrap_or(path)
    } else {
        path
    }
}
