//! .NET projects through the dotnet CLI

use super::{
    FrameworkRequirements, FrameworkService, create_package_dir, ensure_package_source,
    working_dir,
};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind};
use crate::command::{CommandRunner, RunArgs};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{Result, ResultExt};
use async_trait::async_trait;
use azflow_core::ServiceConfig;
use std::sync::Arc;

pub struct DotnetFramework {
    runner: Arc<dyn CommandRunner>,
}

impl DotnetFramework {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn dotnet(&self, service: &ServiceConfig, args: RunArgs, op: OperationContext<'_>) -> Result<()> {
        let line = args.command_line();
        self.runner
            .run(&args.with_cwd(working_dir(service)), op.cancel)
            .await
            .context(line)?;
        Ok(())
    }
}

#[async_trait]
impl FrameworkService for DotnetFramework {
    fn requirements(&self) -> FrameworkRequirements {
        FrameworkRequirements::default()
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Restoring .NET project dependencies");
        let project = service.path();
        self.dotnet(
            service,
            RunArgs::new("dotnet", ["restore".to_string(), project.to_string_lossy().into_owned()]),
            op,
        )
        .await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(ArtifactKind::Directory, project.to_string_lossy()))?;
        Ok(artifacts)
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Building .NET project");
        let project = service.path();
        self.dotnet(
            service,
            RunArgs::new("dotnet", ["build".to_string(), project.to_string_lossy().into_owned()]),
            op,
        )
        .await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(ArtifactKind::Directory, working_dir(service).to_string_lossy()))?;
        Ok(artifacts)
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        op.report("Publishing .NET project");
        let output = create_package_dir(service)?;
        let args = RunArgs::new(
            "dotnet",
            [
                "publish".to_string(),
                service.path().to_string_lossy().into_owned(),
                "-c".to_string(),
                "Release".to_string(),
                "--output".to_string(),
                output.to_string_lossy().into_owned(),
            ],
        );
        self.dotnet(service, args, op).await?;
        ensure_package_source(&output)?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::local(ArtifactKind::Directory, output.to_string_lossy()))?;
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::testing::ScriptedRunner;
    use azflow_core::ServiceTargetKind;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn service(dir: &std::path::Path) -> ServiceConfig {
        let mut service = ServiceConfig::new("api", ServiceTargetKind::AppService);
        service.project_path = dir.to_path_buf();
        service.relative_path = "src/Api/Api.csproj".into();
        std::fs::create_dir_all(dir.join("src/Api")).unwrap();
        std::fs::write(dir.join("src/Api/Api.csproj"), "<Project />").unwrap();
        service
    }

    #[tokio::test]
    async fn test_restore_build_run_in_project_directory() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let runner = Arc::new(ScriptedRunner::new());
        let framework = DotnetFramework::new(runner.clone());
        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let op = OperationContext::new(&progress, &cancel);

        framework.restore(&service, &ServiceContext::new(), op).await.unwrap();
        let built = framework.build(&service, &ServiceContext::new(), op).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].args[0], "restore");
        assert_eq!(calls[1].args[0], "build");
        assert_eq!(calls[0].cwd.as_deref(), Some(dir.path().join("src/Api").as_path()));
        assert_eq!(
            built.find_first(ArtifactKind::Directory, None).unwrap().location,
            dir.path().join("src/Api").to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_package_publishes_release_output() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        // dotnet publish writes into --output
        let runner = Arc::new(ScriptedRunner::new().on("publish", |args| {
            let output = PathBuf::from(args.args.last().unwrap());
            std::fs::write(output.join("Api.dll"), "").unwrap();
        }));
        let framework = DotnetFramework::new(runner.clone());
        let progress = NoopProgress;
        let cancel = CancellationToken::new();

        let package = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();
        let out = PathBuf::from(&package.find_first(ArtifactKind::Directory, None).unwrap().location);
        assert!(out.join("Api.dll").exists());
        assert!(runner.command_lines()[0].contains("-c Release --output"));
        std::fs::remove_dir_all(out).unwrap();
    }

    #[tokio::test]
    async fn test_failed_publish_names_command() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let framework = DotnetFramework::new(Arc::new(ScriptedRunner::new().fail_on("publish")));
        let progress = NoopProgress;
        let cancel = CancellationToken::new();

        let err = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("dotnet publish"));
    }
}
