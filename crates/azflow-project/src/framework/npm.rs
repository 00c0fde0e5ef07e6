//! JavaScript / TypeScript through npm, pnpm or yarn

use super::{
    FrameworkRequirements, FrameworkService, PackageRequirements, copy_dir, create_package_dir,
    ensure_package_source,
};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind};
use crate::command::{CommandRunner, RunArgs};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_core::ServiceConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePackageManager {
    #[default]
    Npm,
    Pnpm,
    Yarn,
}

impl NodePackageManager {
    pub fn program(&self) -> &'static str {
        match self {
            NodePackageManager::Npm => "npm",
            NodePackageManager::Pnpm => "pnpm",
            NodePackageManager::Yarn => "yarn",
        }
    }

    fn run_script(&self, script: &str) -> RunArgs {
        match self {
            NodePackageManager::Npm => RunArgs::new("npm", ["run", script, "--if-present"]),
            NodePackageManager::Pnpm => RunArgs::new("pnpm", ["run", "--if-present", script]),
            NodePackageManager::Yarn => RunArgs::new("yarn", ["run", script]),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeConfig {
    #[serde(default)]
    package_manager: NodePackageManager,
}

pub struct NpmFramework {
    runner: Arc<dyn CommandRunner>,
}

impl NpmFramework {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn package_manager(service: &ServiceConfig) -> Result<NodePackageManager> {
        let config: NodeConfig = service.typed_config().map_err(|e| {
            ProjectError::InvalidConfig(format!(
                "service '{}' has an invalid packageManager: {e}",
                service.name
            ))
        })?;
        Ok(config.package_manager)
    }
}

#[async_trait]
impl FrameworkService for NpmFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements {
            package: PackageRequirements {
                require_restore: true,
                require_build: false,
            },
        }
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let pm = Self::package_manager(service)?;
        op.report(&format!("Installing {} dependencies", pm.program()));

        let args = RunArgs::new(pm.program(), ["install"]).with_cwd(service.path());
        self.runner
            .run(&args, op.cancel)
            .await
            .context(format!("{} install", pm.program()))?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            service.path().to_string_lossy(),
        ))?;
        Ok(artifacts)
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let pm = Self::package_manager(service)?;
        op.report("Running build script");

        let args = pm.run_script("build").with_cwd(service.path());
        self.runner
            .run(&args, op.cancel)
            .await
            .context(format!("{} run build", pm.program()))?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            service.output_dir().to_string_lossy(),
        ))?;
        Ok(artifacts)
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let pm = Self::package_manager(service)?;
        let args = pm.run_script("package").with_cwd(service.path());
        self.runner
            .run(&args, op.cancel)
            .await
            .context(format!("{} run package", pm.program()))?;

        let source = match ctx.build.find_last(ArtifactKind::Directory, Some(LocationKind::Local)) {
            Some(dir) => PathBuf::from(&dir.location),
            None => service.output_dir(),
        };
        ensure_package_source(&source)?;

        op.report("Copying deployment package");
        let package_dir = create_package_dir(service)?;
        // without an output path the whole source ships and dependencies install remotely
        let exclude: &[&str] = if service.output_path.is_empty() {
            &["node_modules", ".git", ".azure"]
        } else {
            &[]
        };
        copy_dir(&source, &package_dir, exclude)?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            package_dir.to_string_lossy(),
        ))?;
        Ok(artifacts)
    }
}
