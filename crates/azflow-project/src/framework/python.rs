//! Python projects with a virtual environment and requirements.txt

use super::{
    FrameworkRequirements, FrameworkService, copy_dir, create_package_dir, ensure_package_source,
};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind};
use crate::command::{CommandRunner, RunArgs};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{Result, ResultExt};
use async_trait::async_trait;
use azflow_core::ServiceConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VENV_DIR: &str = ".venv";
const REQUIREMENTS_FILE: &str = "requirements.txt";
const PACKAGE_EXCLUDES: [&str; 4] = [VENV_DIR, "__pycache__", ".git", ".azure"];

pub struct PythonFramework {
    runner: Arc<dyn CommandRunner>,
}

impl PythonFramework {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn system_python() -> &'static str {
        if cfg!(windows) { "py" } else { "python3" }
    }

    fn venv_python(service_dir: &Path) -> PathBuf {
        if cfg!(windows) {
            service_dir.join(VENV_DIR).join("Scripts").join("python.exe")
        } else {
            service_dir.join(VENV_DIR).join("bin").join("python")
        }
    }
}

#[async_trait]
impl FrameworkService for PythonFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements::default()
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let service_dir = service.path();

        if !service_dir.join(VENV_DIR).exists() {
            op.report("Creating Python virtual environment");
            let args = RunArgs::new(Self::system_python(), ["-m", "venv", VENV_DIR])
                .with_cwd(&service_dir);
            self.runner
                .run(&args, op.cancel)
                .await
                .context("creating virtual environment")?;
        }

        if service_dir.join(REQUIREMENTS_FILE).exists() {
            op.report("Installing Python requirements");
            let python = Self::venv_python(&service_dir);
            let args = RunArgs::new(
                python.to_string_lossy(),
                ["-m", "pip", "install", "-r", REQUIREMENTS_FILE],
            )
            .with_cwd(&service_dir);
            self.runner
                .run(&args, op.cancel)
                .await
                .context("installing requirements")?;
        }

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            service_dir.join(VENV_DIR).to_string_lossy(),
        ))?;
        Ok(artifacts)
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        _op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
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
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let source = service.output_dir();
        ensure_package_source(&source)?;

        op.report("Copying deployment package");
        let package_dir = create_package_dir(service)?;
        copy_dir(&source, &package_dir, &PACKAGE_EXCLUDES)?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            package_dir.to_string_lossy(),
        ))?;
        Ok(artifacts)
    }
}
