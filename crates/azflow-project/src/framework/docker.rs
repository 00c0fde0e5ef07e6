//! Docker framework
//!
//! Builds a container image for the service, optionally after an inner language
//! framework has restored and built the source. Services that only name a prebuilt
//! `image` skip the build and just get tagged. With `docker.remoteBuild` the build and
//! package steps do nothing; the registry builds the image when it is published.

use super::{FrameworkRequirements, FrameworkService, PackageRequirements};
use crate::artifact::{ArtifactCollection, ArtifactKind, LocationKind};
use crate::container::ContainerHelper;
use crate::context::{OperationContext, ServiceContext};
use crate::error::{Result, ResultExt};
use async_trait::async_trait;
use azflow_core::ServiceConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct DockerFramework {
    helper: Arc<ContainerHelper>,
    inner: Option<Arc<dyn FrameworkService>>,
}

impl DockerFramework {
    pub const REQUIREMENTS: FrameworkRequirements = FrameworkRequirements {
        package: PackageRequirements {
            require_restore: false,
            require_build: true,
        },
    };

    pub fn new(helper: Arc<ContainerHelper>, inner: Option<Arc<dyn FrameworkService>>) -> Self {
        Self { helper, inner }
    }

    fn is_prebuilt(service: &ServiceConfig) -> bool {
        service.relative_path.is_empty() && !service.image.is_empty()
    }
}

#[async_trait]
impl FrameworkService for DockerFramework {
    fn requirements(&self) -> FrameworkRequirements {
        Self::REQUIREMENTS
    }

    async fn initialize(&self, service: &ServiceConfig) -> Result<()> {
        match &self.inner {
            Some(inner) => inner.initialize(service).await,
            None => Ok(()),
        }
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        match &self.inner {
            Some(inner) if !Self::is_prebuilt(service) => inner.restore(service, ctx, op).await,
            _ => Ok(ArtifactCollection::new()),
        }
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        match &self.inner {
            Some(inner) if !Self::is_prebuilt(service) && !service.docker.remote_build => {
                inner.build(service, ctx, op).await
            }
            _ => Ok(ArtifactCollection::new()),
        }
    }

    #[instrument(skip_all, fields(service = %service.name))]
    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        if Self::is_prebuilt(service) {
            return self.helper.package(service, None, op).await;
        }
        if service.docker.remote_build {
            debug!("Remote build enabled, skipping local image build");
            return Ok(ArtifactCollection::new());
        }

        let build_output = ctx
            .build
            .find_last(ArtifactKind::Directory, Some(LocationKind::Local))
            .map(|dir| PathBuf::from(&dir.location));
        let request = self
            .helper
            .build_request(service, build_output.as_deref())
            .await?;

        op.report(&format!("Building container image {}", request.tag));
        debug!(context = %request.context_dir.display(), dockerfile = %request.dockerfile.display(), "Docker build");
        let image_id = self
            .helper
            .engine()
            .build(&request, op.cancel)
            .await
            .context("building container image")?;

        self.helper.package(service, Some(&image_id), op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, metadata};
    use crate::progress::NoopProgress;
    use crate::testing::{FakeEngine, FakeRegistry, fixed_clock};
    use azflow_cloud::share_environment;
    use azflow_core::{Environment, ExpandableString, MemoryStore, ServiceTargetKind};
    use tokio_util::sync::CancellationToken;

    fn framework(env: Environment) -> (DockerFramework, Arc<FakeEngine>) {
        let engine = Arc::new(FakeEngine::new());
        let helper = ContainerHelper::new(
            share_environment(env),
            Arc::new(MemoryStore::new()),
            engine.clone(),
            Arc::new(FakeRegistry::new()),
        )
        .with_clock(fixed_clock(1_700_000_000));
        (DockerFramework::new(Arc::new(helper), None), engine)
    }

    fn service(dir: &std::path::Path) -> ServiceConfig {
        let mut service = ServiceConfig::new("api", ServiceTargetKind::ContainerApp);
        service.project_name = "todo".into();
        service.project_path = dir.to_path_buf();
        service.relative_path = "src/api".into();
        std::fs::create_dir_all(dir.join("src/api")).unwrap();
        std::fs::write(dir.join("src/api/Dockerfile"), "FROM scratch\n").unwrap();
        service
    }

    #[tokio::test]
    async fn test_package_builds_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (framework, engine) = framework(Environment::with_values("dev", [("VERSION", "1.2")]));
        let mut service = service(dir.path());
        service.docker.build_args = vec![
            ExpandableString::new("APP_VERSION=${VERSION}"),
            ExpandableString::new("VERSION"),
        ];

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let artifacts = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();

        let builds = engine.builds();
        assert_eq!(builds.len(), 1);
        let request = &builds[0];
        assert_eq!(request.tag, "todo/api-dev:azd-deploy-1700000000");
        assert_eq!(request.dockerfile, dir.path().join("src/api/Dockerfile"));
        assert_eq!(request.context_dir, dir.path().join("src/api"));
        assert_eq!(request.platform.as_deref(), Some("linux/amd64"));
        assert_eq!(request.build_args.get("APP_VERSION").map(String::as_str), Some("1.2"));
        assert_eq!(request.build_args.get("VERSION").map(String::as_str), Some("1.2"));

        let local = artifacts.find_first(ArtifactKind::Container, None).unwrap();
        assert_eq!(local.location, "todo/api-dev:azd-deploy-1700000000");
    }

    #[tokio::test]
    async fn test_build_output_becomes_context() {
        let dir = tempfile::tempdir().unwrap();
        let (framework, engine) = framework(Environment::new("dev"));
        let service = service(dir.path());

        let mut ctx = ServiceContext::new();
        ctx.build
            .add(Artifact::local(ArtifactKind::Directory, "/tmp/published"))
            .unwrap();
        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        framework
            .package(&service, &ctx, OperationContext::new(&progress, &cancel))
            .await
            .unwrap();
        assert_eq!(engine.builds()[0].context_dir, PathBuf::from("/tmp/published"));
    }

    #[tokio::test]
    async fn test_missing_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let (framework, engine) = framework(Environment::new("dev"));
        let mut service = service(dir.path());
        service.docker.path = "docker/Dockerfile.prod".into();

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let err = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Dockerfile.prod"));
        assert!(engine.builds().is_empty());
    }

    #[tokio::test]
    async fn test_prebuilt_image_skips_build() {
        let (framework, engine) = framework(Environment::new("dev"));
        let mut service = ServiceConfig::new("cache", ServiceTargetKind::ContainerApp);
        service.project_name = "todo".into();
        service.image = ExpandableString::new("redis:7");

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let artifacts = framework
            .package(&service, &ServiceContext::new(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();

        assert!(engine.builds().is_empty());
        assert_eq!(engine.calls()[0], "pull redis:7");
        let local = artifacts.find_first(ArtifactKind::Container, None).unwrap();
        assert_eq!(local.metadata(metadata::SOURCE_IMAGE), Some("redis:7"));
    }

    #[tokio::test]
    async fn test_remote_build_skips_local_image() {
        let dir = tempfile::tempdir().unwrap();
        let (framework, engine) = framework(Environment::new("dev"));
        let mut service = service(dir.path());
        service.docker.remote_build = true;

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let op = OperationContext::new(&progress, &cancel);
        let built = framework.build(&service, &ServiceContext::new(), op).await.unwrap();
        let packaged = framework.package(&service, &ServiceContext::new(), op).await.unwrap();

        assert!(built.is_empty());
        assert!(packaged.is_empty());
        assert!(engine.builds().is_empty());
        assert!(engine.calls().is_empty());
    }
}
