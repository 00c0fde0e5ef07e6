//! Java projects through Maven (or the project's Maven wrapper)

use super::{FrameworkRequirements, FrameworkService, create_package_dir};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind};
use crate::command::{CommandRunner, RunArgs};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_core::{ServiceConfig, ServiceTargetKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ARCHIVE_EXTENSIONS: [&str; 3] = ["jar", "war", "ear"];

pub struct MavenFramework {
    runner: Arc<dyn CommandRunner>,
}

impl MavenFramework {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn maven_program(service_dir: &Path) -> String {
        let wrapper = if cfg!(windows) { "mvnw.cmd" } else { "mvnw" };
        let path = service_dir.join(wrapper);
        if path.exists() {
            path.to_string_lossy().into_owned()
        } else {
            "mvn".to_string()
        }
    }

    async fn mvn(&self, service: &ServiceConfig, goals: &[&str], op: OperationContext<'_>) -> Result<()> {
        let service_dir = service.path();
        let args = RunArgs::new(Self::maven_program(&service_dir), goals.iter().copied())
            .with_cwd(&service_dir);
        self.runner
            .run(&args, op.cancel)
            .await
            .context(format!("mvn {}", goals.join(" ")))?;
        Ok(())
    }

    /// The single deployable archive in the build output
    fn find_archive(source: &Path) -> Result<PathBuf> {
        let mut archives = Vec::new();
        for entry in std::fs::read_dir(source)? {
            let path = entry?.path();
            let is_archive = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| ARCHIVE_EXTENSIONS.contains(&e));
            if path.is_file() && is_archive {
                archives.push(path);
            }
        }

        match archives.len() {
            0 => Err(ProjectError::InvalidArtifact(format!(
                "no .jar, .war or .ear archive found in '{}'",
                source.display()
            ))),
            1 => Ok(archives.remove(0)),
            _ => {
                let names: Vec<String> = archives
                    .iter()
                    .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .collect();
                Err(ProjectError::InvalidArtifact(format!(
                    "multiple archives found in '{}': {}; set 'dist' to the archive to deploy",
                    source.display(),
                    names.join(", ")
                )))
            }
        }
    }

    /// `target/azure-functions/<app>`, which must hold exactly one app
    fn function_app_dir(service_dir: &Path) -> Result<PathBuf> {
        let root = service_dir.join("target").join("azure-functions");
        let mut apps = Vec::new();
        for entry in std::fs::read_dir(&root).context(format!("reading '{}'", root.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                apps.push(entry.path());
            }
        }
        if apps.len() == 1 {
            Ok(apps.remove(0))
        } else {
            Err(ProjectError::InvalidArtifact(format!(
                "expected exactly one function app in '{}', found {}",
                root.display(),
                apps.len()
            )))
        }
    }
}

#[async_trait]
impl FrameworkService for MavenFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements::default()
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Resolving maven dependencies");
        self.mvn(service, &["dependency:resolve"], op).await?;
        Ok(ArtifactCollection::new())
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Compiling maven project");
        self.mvn(service, &["compile"], op).await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(
            ArtifactKind::Directory,
            service.path().join("target").to_string_lossy(),
        ))?;
        Ok(artifacts)
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Packaging maven project");
        self.mvn(service, &["package", "-DskipTests"], op).await?;

        let service_dir = service.path();
        let mut artifacts = ArtifactCollection::new();

        if service.host == ServiceTargetKind::Function {
            let app_dir = Self::function_app_dir(&service_dir)?;
            artifacts.add(Artifact::local(ArtifactKind::Directory, app_dir.to_string_lossy()))?;
            return Ok(artifacts);
        }

        let archive = if service.output_path.is_empty() {
            Self::find_archive(&service_dir.join("target"))?
        } else {
            let dist = service.output_dir();
            if dist.is_dir() {
                Self::find_archive(&dist)?
            } else {
                dist
            }
        };

        let ext = archive
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jar")
            .to_string();
        let package_dir = create_package_dir(service)?;
        let packaged = package_dir.join(format!("app.{ext}"));
        std::fs::copy(&archive, &packaged).context(format!("copying '{}'", archive.display()))?;

        artifacts.add(Artifact::local(ArtifactKind::Archive, packaged.to_string_lossy()))?;
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::testing::ScriptedRunner;
    use tokio_util::sync::CancellationToken;

    fn service(dir: &Path, host: ServiceTargetKind) -> ServiceConfig {
        let mut service = ServiceConfig::new("api", host);
        service.project_path = dir.to_path_buf();
        service.relative_path = "api".into();
        std::fs::create_dir_all(dir.join("api/target")).unwrap();
        service
    }

    #[tokio::test]
    async fn test_wrapper_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), ServiceTargetKind::AppService);
        std::fs::write(dir.path().join("api/mvnw"), "").unwrap();
        std::fs::write(dir.path().join("api/mvnw.cmd"), "").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let framework = MavenFramework::new(runner.clone());
        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        framework
            .restore(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();

        let call = &runner.calls()[0];
        assert!(call.program.contains("mvnw"));
        assert_eq!(call.args, vec!["dependency:resolve"]);
    }

    #[tokio::test]
    async fn test_package_copies_single_archive() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), ServiceTargetKind::SpringApp);
        std::fs::write(dir.path().join("api/target/api-0.1.jar"), "jar").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let framework = MavenFramework::new(runner.clone());
        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let package = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();

        let archive = PathBuf::from(&package.find_first(ArtifactKind::Archive, None).unwrap().location);
        assert_eq!(archive.file_name().unwrap(), "app.jar");
        assert_eq!(std::fs::read_to_string(&archive).unwrap(), "jar");
        assert_eq!(runner.command_lines(), vec!["mvn package -DskipTests"]);
        std::fs::remove_dir_all(archive.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_find_archive_requires_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MavenFramework::find_archive(dir.path()).is_err());

        std::fs::write(dir.path().join("a.jar"), "").unwrap();
        std::fs::write(dir.path().join("b.war"), "").unwrap();
        let err = MavenFramework::find_archive(dir.path()).unwrap_err();
        assert!(err.to_string().contains("multiple archives"));
    }

    #[tokio::test]
    async fn test_function_host_uses_azure_functions_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), ServiceTargetKind::Function);
        std::fs::create_dir_all(dir.path().join("api/target/azure-functions/fn-app")).unwrap();

        let framework = MavenFramework::new(Arc::new(ScriptedRunner::new()));
        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let package = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();
        assert!(
            package
                .find_first(ArtifactKind::Directory, None)
                .unwrap()
                .location
                .ends_with("fn-app")
        );
    }
}
