//! Container image helper
//!
//! Computes local and remote image tags for container-hosted services and performs the
//! registry side of publishing: credential exchange, login, tag and push. Services with
//! `docker.remoteBuild` skip the local image entirely and are built by the registry at
//! publish time. The pushed image is recorded in the environment as
//! `SERVICE_<NAME>_IMAGE_NAME`.

use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind, metadata};
use crate::context::OperationContext;
use crate::error::{ProjectError, Result, ResultExt};
use azflow_build::{BuildRequest, ContainerEngine, ContainerImage, RegistryCredential};
use azflow_cloud::{
    ACR_DOMAIN_SUFFIX, ContainerRegistryService, DEFAULT_CREDENTIALS_RETRY_DELAY,
    RemoteBuildRequest, RetryConfig, SharedEnvironment, TargetResource, credentials_retry_policy,
    credentials_with_retry,
};
use azflow_core::environment::CONTAINER_REGISTRY_ENDPOINT_KEY;
use azflow_core::{EnvironmentStore, ExpandableString, ServiceConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Environment property holding the last published image of a service
pub const IMAGE_NAME_PROPERTY: &str = "IMAGE_NAME";

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const DEFAULT_PLATFORM: &str = "linux/amd64";

/// Source of the current time for generated image tags
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Overrides applied when publishing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Remote image reference to publish as (`[registry/]repository[:tag]`)
    pub image: Option<String>,
}

pub struct ContainerHelper {
    env: SharedEnvironment,
    store: Arc<dyn EnvironmentStore>,
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<dyn ContainerRegistryService>,
    clock: Arc<dyn Clock>,
    credentials_retry: RetryConfig,
}

impl ContainerHelper {
    pub fn new(
        env: SharedEnvironment,
        store: Arc<dyn EnvironmentStore>,
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<dyn ContainerRegistryService>,
    ) -> Self {
        Self {
            env,
            store,
            engine,
            registry,
            clock: Arc::new(SystemClock),
            credentials_retry: credentials_retry_policy(DEFAULT_CREDENTIALS_RETRY_DELAY),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_credentials_retry(mut self, retry: RetryConfig) -> Self {
        self.credentials_retry = retry;
        self
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    /// Expand `${VAR}` references against the environment
    pub async fn expand(&self, value: &ExpandableString) -> Result<String> {
        let env = self.env.read().await;
        Ok(value.envsubst(|name| env.lookup_env(name))?)
    }

    pub async fn getenv(&self, name: &str) -> String {
        self.env.read().await.getenv(name)
    }

    /// `<project>/<service>-<env>`, lower-cased
    pub async fn default_image_name(&self, service: &ServiceConfig) -> String {
        let env_name = self.env.read().await.name().to_string();
        format!("{}/{}-{}", service.project_name, service.name, env_name).to_lowercase()
    }

    /// `azd-deploy-<unix seconds>`
    pub fn default_image_tag(&self) -> String {
        format!("azd-deploy-{}", self.clock.now().timestamp())
    }

    /// Registry from the docker options or the environment, if either is set
    pub async fn try_registry_name(&self, service: &ServiceConfig) -> Result<Option<String>> {
        let mut registry = self.expand(&service.docker.registry).await?;
        if registry.is_empty() {
            registry = self.env.read().await.getenv(CONTAINER_REGISTRY_ENDPOINT_KEY);
        }
        Ok(Some(registry.trim().to_string()).filter(|r| !r.is_empty()))
    }

    /// Registry the service publishes to
    pub async fn registry_name(&self, service: &ServiceConfig) -> Result<String> {
        self.try_registry_name(service)
            .await?
            .ok_or_else(|| ProjectError::RegistryNotFound(service.name.clone()))
    }

    /// The image reference for the service, before a registry is applied
    pub async fn generated_image(&self, service: &ServiceConfig) -> Result<ContainerImage> {
        let configured = self.expand(&service.docker.image).await?;
        let mut image = if configured.is_empty() {
            ContainerImage::parse(&self.default_image_name(service).await)?
        } else {
            ContainerImage::parse(&configured)?
        };

        if image.tag.is_empty() {
            let tag = self.expand(&service.docker.tag).await?;
            image.tag = if tag.is_empty() {
                self.default_image_tag()
            } else {
                tag
            };
        }
        Ok(image)
    }

    /// Local tag the built image is given
    pub async fn local_image_tag(&self, service: &ServiceConfig) -> Result<String> {
        Ok(self.generated_image(service).await?.local())
    }

    /// Remote reference for `local_tag`; the configured registry replaces any registry host
    /// already present, so it is never duplicated
    pub async fn remote_image_tag(&self, service: &ServiceConfig, local_tag: &str) -> Result<String> {
        let image = ContainerImage::parse(local_tag)?;
        match self.try_registry_name(service).await? {
            Some(registry) => Ok(image.with_registry(registry).remote()),
            None if !image.registry.is_empty() && service.relative_path.is_empty() => {
                Ok(image.remote())
            }
            None => Err(ProjectError::RegistryNotFound(service.name.clone())),
        }
    }

    /// Docker build settings for the service
    ///
    /// `build_output` is the inner framework's output directory, used as the context when
    /// `docker.context` is not set.
    pub async fn build_request(
        &self,
        service: &ServiceConfig,
        build_output: Option<&Path>,
    ) -> Result<BuildRequest> {
        let service_dir = service.path();
        let docker = &service.docker;

        let dockerfile = if docker.path.is_empty() {
            service_dir.join(DEFAULT_DOCKERFILE)
        } else {
            service_dir.join(&docker.path)
        };

        let context_dir = match build_output {
            _ if !docker.context.is_empty() => service_dir.join(&docker.context),
            Some(dir) => dir.to_path_buf(),
            None => service_dir.clone(),
        };

        let mut build_args = HashMap::new();
        for arg in &docker.build_args {
            let expanded = self.expand(arg).await?;
            match expanded.split_once('=') {
                Some((key, value)) => build_args.insert(key.to_string(), value.to_string()),
                // bare names forward the value from the environment
                None => {
                    let value = self.getenv(&expanded).await;
                    build_args.insert(expanded, value)
                }
            };
        }

        let request = BuildRequest {
            context_dir,
            dockerfile,
            tag: self.local_image_tag(service).await?,
            build_args,
            target: Some(docker.target.clone()).filter(|t| !t.is_empty()),
            platform: Some(if docker.platform.is_empty() {
                DEFAULT_PLATFORM.to_string()
            } else {
                docker.platform.clone()
            }),
        };

        if !request.dockerfile.exists() {
            return Err(ProjectError::InvalidConfig(format!(
                "Dockerfile '{}' for service '{}' does not exist",
                request.dockerfile.display(),
                service.name
            )));
        }
        Ok(request)
    }

    /// Exchange credentials for the registry and hand them to the container engine
    pub async fn login(
        &self,
        registry: &str,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<()> {
        op.report(&format!("Logging in to registry {registry}"));
        let credentials = credentials_with_retry(
            self.registry.as_ref(),
            &target.subscription_id,
            registry,
            &self.credentials_retry,
            op.cancel,
        )
        .await
        .context(format!("logging in to registry '{registry}'"))?;

        self.engine.login(RegistryCredential {
            server: credentials.login_server,
            username: credentials.username,
            password: credentials.password,
        });
        Ok(())
    }

    /// Tag the built (or pulled prebuilt) image with the local tag
    ///
    /// `image_id` comes from the build phase; without it the service's prebuilt `image` is pulled.
    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn package(
        &self,
        service: &ServiceConfig,
        image_id: Option<&str>,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let source_image = self.expand(&service.image).await?;
        let image_id = match image_id {
            Some(id) => id.to_string(),
            None if !source_image.is_empty() => {
                if !self.engine.image_exists(&source_image).await? {
                    op.report(&format!("Pulling image {source_image}"));
                    self.engine
                        .pull(&source_image, op.cancel)
                        .await
                        .context(format!("pulling image '{source_image}'"))?;
                }
                source_image.clone()
            }
            None => {
                return Err(ProjectError::InvalidConfig(format!(
                    "no container image was built for service '{}' and no 'image' is configured",
                    service.name
                )));
            }
        };

        let local_tag = self.local_image_tag(service).await?;
        if image_id != local_tag {
            op.report("Tagging container image");
            self.engine
                .tag(&image_id, &local_tag)
                .await
                .context("tagging container image")?;
        }
        debug!(image = %image_id, tag = %local_tag, "Packaged container image");

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(
            Artifact::local(ArtifactKind::Container, &local_tag)
                .with_metadata(metadata::IMAGE_HASH, &image_id)
                .with_metadata(metadata::SOURCE_IMAGE, &source_image)
                .with_metadata(metadata::TARGET_IMAGE, &local_tag),
        )?;
        Ok(artifacts)
    }

    /// Push the packaged image to the registry and record it in the environment
    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn publish(
        &self,
        service: &ServiceConfig,
        package: &ArtifactCollection,
        target: &TargetResource,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let remote_image = if service.docker.remote_build {
            self.remote_build(service, target, options, op).await?
        } else {
            self.push_local_image(service, package, target, options, op).await?
        };

        {
            let mut env = self.env.write().await;
            env.set_service_property(&service.name, IMAGE_NAME_PROPERTY, &remote_image);
            self.store.save(&env).context("saving environment")?;
        }

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(
            Artifact::remote(ArtifactKind::Container, &remote_image)
                .with_metadata(metadata::REMOTE_IMAGE, &remote_image),
        )?;
        Ok(artifacts)
    }

    /// Remote reference to publish as, honoring an `--to` override
    async fn publish_image(
        &self,
        service: &ServiceConfig,
        registry: &str,
        local_tag: &str,
        options: &PublishOptions,
    ) -> Result<String> {
        match options.image.as_deref().filter(|i| !i.is_empty()) {
            Some(image) => Ok(ContainerImage::parse(image)?
                .with_registry(registry)
                .remote()),
            None => self.remote_image_tag(service, local_tag).await,
        }
    }

    /// Build the image in the registry from the service's Dockerfile and context
    async fn remote_build(
        &self,
        service: &ServiceConfig,
        target: &TargetResource,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<String> {
        let request = self.build_request(service, None).await?;
        let platform = request.platform.clone().unwrap_or_default();
        if platform != DEFAULT_PLATFORM {
            return Err(ProjectError::InvalidConfig(format!(
                "remote build only supports the {DEFAULT_PLATFORM} platform, service '{}' uses '{platform}'",
                service.name
            )));
        }

        let registry = self.registry_name(service).await?;
        if !registry.ends_with(ACR_DOMAIN_SUFFIX) {
            return Err(ProjectError::InvalidConfig(format!(
                "remote build is only supported when the target registry is an Azure Container Registry, got '{registry}'"
            )));
        }

        let remote = self.publish_image(service, &registry, &request.tag, options).await?;
        let image = ContainerImage::parse(&remote)?;

        op.report(&format!("Running remote build for {remote}"));
        debug!(context = %request.context_dir.display(), dockerfile = %request.dockerfile.display(), "Remote build");
        let remote_request = RemoteBuildRequest {
            context_dir: request.context_dir,
            dockerfile: request.dockerfile,
            image: image.local(),
            build_args: request.build_args.into_iter().collect(),
            target: request.target,
            platform,
        };
        self.registry
            .remote_build(&target.subscription_id, &registry, &remote_request, op.cancel)
            .await
            .context(format!("running remote build in registry '{registry}'"))?;
        Ok(remote)
    }

    /// Tag the packaged local image with its remote reference and push it
    async fn push_local_image(
        &self,
        service: &ServiceConfig,
        package: &ArtifactCollection,
        target: &TargetResource,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<String> {
        let packaged = package
            .find_first(ArtifactKind::Container, Some(LocationKind::Local))
            .ok_or_else(|| {
                ProjectError::InvalidArtifact("failed retrieving package result details".into())
            })?;
        let source_image = packaged.metadata(metadata::SOURCE_IMAGE).unwrap_or_default();
        let target_image = packaged
            .metadata(metadata::TARGET_IMAGE)
            .filter(|t| !t.is_empty())
            .unwrap_or(packaged.location.as_str())
            .to_string();

        let registry = self.try_registry_name(service).await?;
        let remote_image = match registry {
            // prebuilt image and nowhere to push it
            None if service.relative_path.is_empty() && !source_image.is_empty() => {
                info!(image = %source_image, "No registry configured, using the source image as-is");
                source_image.to_string()
            }
            None => return Err(ProjectError::RegistryNotFound(service.name.clone())),
            Some(registry) => {
                let remote = self
                    .publish_image(service, &registry, &target_image, options)
                    .await?;

                self.login(&registry, target, op).await?;

                op.report("Tagging container image");
                self.engine
                    .tag(&target_image, &remote)
                    .await
                    .context("tagging container image")?;

                op.report(&format!("Pushing container image {remote}"));
                self.engine.push(&remote, op.cancel).await.map_err(|e| {
                    ProjectError::from(e).context(format!(
                        "failed pushing image '{remote}', ensure you are logged in to the registry (docker login {registry})"
                    ))
                })?;
                remote
            }
        };
        Ok(remote_image)
    }
}
