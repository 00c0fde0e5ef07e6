//! Per-service pipeline
//!
//! [`ServiceManager`] runs one phase for one service: it resolves the framework service and
//! the service target, runs the phase's hooks, records the produced artifacts in the
//! [`ServiceContext`] and caches the result for the rest of the run. Later phases run the
//! earlier ones they depend on when their artifacts are missing.

use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind, metadata};
use crate::container::PublishOptions;
use crate::context::{OperationContext, ServiceContext, ServicePhase};
use crate::error::{ProjectError, Result, ResultExt};
use crate::framework::{FrameworkRegistry, FrameworkService};
use crate::hooks::HooksRunner;
use crate::target::{ServiceTarget, TargetRegistry};
use azflow_cloud::{ResourceManager, SharedEnvironment, TargetResource};
use azflow_core::{HookPhase, ServiceConfig, ServiceLanguageKind, ServiceTargetKind};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Service property holding endpoints that replace the ones the target reports
pub const ENDPOINTS_PROPERTY: &str = "ENDPOINTS";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageOptions {
    /// File or folder the package file is moved to
    pub output_path: Option<PathBuf>,
}

pub struct ServiceManager {
    env: SharedEnvironment,
    resources: Arc<ResourceManager>,
    frameworks: Arc<FrameworkRegistry>,
    targets: Arc<TargetRegistry>,
    hooks: HooksRunner,
    results: Mutex<HashMap<String, ArtifactCollection>>,
    initialized: Mutex<HashSet<InitKey>>,
}

/// A service is initialized once per name, host and language
type InitKey = (String, ServiceTargetKind, ServiceLanguageKind);

fn init_key(service: &ServiceConfig) -> InitKey {
    (
        service.name.clone(),
        service.host.clone(),
        service.language.clone(),
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn operation_error(phase: ServicePhase, service: &ServiceConfig) -> impl FnOnce(ProjectError) -> ProjectError {
    let service = service.name.clone();
    move |source| ProjectError::Operation {
        verb: phase.verb(),
        service,
        source: Box::new(source),
    }
}

impl ServiceManager {
    pub fn new(
        env: SharedEnvironment,
        resources: Arc<ResourceManager>,
        frameworks: Arc<FrameworkRegistry>,
        targets: Arc<TargetRegistry>,
        hooks: HooksRunner,
    ) -> Self {
        Self {
            env,
            resources,
            frameworks,
            targets,
            hooks,
            results: Mutex::new(HashMap::new()),
            initialized: Mutex::new(HashSet::new()),
        }
    }

    async fn cache_key(&self, service: &ServiceConfig, phase: ServicePhase) -> String {
        let env = self.env.read().await;
        format!("{}:{}:{}", env.name(), service.name, phase)
    }

    /// Cached result of `phase`, copied into `ctx` if the context has none yet
    async fn cached(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        phase: ServicePhase,
    ) -> Result<Option<ArtifactCollection>> {
        let key = self.cache_key(service, phase).await;
        let cached = lock(&self.results).get(&key).cloned();
        let Some(artifacts) = cached else {
            return Ok(None);
        };

        debug!(service = %service.name, %phase, "Using cached result");
        let slot = ctx.artifacts_mut(phase);
        if slot.is_empty() {
            slot.add_all(artifacts.clone())?;
        }
        Ok(Some(artifacts))
    }

    async fn remember(&self, service: &ServiceConfig, phase: ServicePhase, artifacts: &ArtifactCollection) {
        let key = self.cache_key(service, phase).await;
        lock(&self.results).insert(key, artifacts.clone());
    }

    pub fn framework_service(&self, service: &ServiceConfig) -> Result<Arc<dyn FrameworkService>> {
        self.frameworks
            .resolve(service)
            .context("getting framework service")
    }

    pub fn service_target(&self, service: &ServiceConfig) -> Result<Arc<dyn ServiceTarget>> {
        self.targets.resolve(service).context("getting service target")
    }

    /// Initialize the framework service and target of `service`, once per run
    pub async fn initialize(&self, service: &ServiceConfig) -> Result<()> {
        let key = init_key(service);
        if lock(&self.initialized).contains(&key) {
            return Ok(());
        }

        self.framework_service(service)?
            .initialize(service)
            .await
            .context("initializing framework service")?;
        self.service_target(service)?
            .initialize(service)
            .await
            .context("initializing service target")?;

        lock(&self.initialized).insert(key);
        Ok(())
    }

    async fn run_hooks(
        &self,
        service: &ServiceConfig,
        phase: HookPhase,
        command: ServicePhase,
        op: OperationContext<'_>,
    ) -> Result<()> {
        self.hooks
            .run(&service.hooks, phase, command.as_str(), &service.path(), op.cancel)
            .await
    }

    /// The resource the service deploys to, checked by the target
    pub async fn target_resource(
        &self,
        service: &ServiceConfig,
        target: &dyn ServiceTarget,
    ) -> Result<TargetResource> {
        let subscription_id = self.env.read().await.subscription_id();
        let resource = self
            .resources
            .get_target_resource(&subscription_id, service)
            .await
            .context("getting target resource")?;
        target.validate_target_resource(&resource)?;
        Ok(resource)
    }

    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn restore(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let phase = ServicePhase::Restore;
        if let Some(cached) = self.cached(service, ctx, phase).await? {
            return Ok(cached);
        }
        let framework = self.framework_service(service)?;

        let artifacts = async {
            self.run_hooks(service, HookPhase::Pre, phase, op).await?;
            let artifacts = framework.restore(service, ctx, op).await?;
            self.run_hooks(service, HookPhase::Post, phase, op).await?;
            Ok::<_, ProjectError>(artifacts)
        }
        .await
        .map_err(operation_error(phase, service))?;

        ctx.restore.add_all(artifacts.clone())?;
        self.remember(service, phase, &artifacts).await;
        Ok(artifacts)
    }

    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn build(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let phase = ServicePhase::Build;
        if let Some(cached) = self.cached(service, ctx, phase).await? {
            return Ok(cached);
        }
        let framework = self.framework_service(service)?;

        let artifacts = async {
            self.run_hooks(service, HookPhase::Pre, phase, op).await?;
            let artifacts = framework.build(service, ctx, op).await?;
            self.run_hooks(service, HookPhase::Post, phase, op).await?;
            Ok::<_, ProjectError>(artifacts)
        }
        .await
        .map_err(operation_error(phase, service))?;

        ctx.build.add_all(artifacts.clone())?;
        self.remember(service, phase, &artifacts).await;
        Ok(artifacts)
    }

    /// Framework package followed by the target's package step
    ///
    /// Restore and build run first when the framework needs them and they have not run.
    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        options: &PackageOptions,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let phase = ServicePhase::Package;
        if let Some(cached) = self.cached(service, ctx, phase).await? {
            return Ok(cached);
        }
        let framework = self.framework_service(service)?;
        let target = self.service_target(service)?;

        let requirements = framework.requirements().package;
        if requirements.require_restore && ctx.restore.is_empty() {
            self.restore(service, ctx, op).await?;
        }
        if requirements.require_build && ctx.build.is_empty() {
            self.build(service, ctx, op).await?;
        }

        async {
            self.run_hooks(service, HookPhase::Pre, phase, op).await?;
            let artifacts = framework.package(service, ctx, op).await?;
            ctx.package.add_all(artifacts)?;
            let artifacts = target.package(service, ctx, op).await?;
            ctx.package.add_all(artifacts)?;
            self.run_hooks(service, HookPhase::Post, phase, op).await
        }
        .await
        .map_err(operation_error(phase, service))?;

        if let Some(output) = &options.output_path {
            move_package(&mut ctx.package, output).await?;
        }

        let artifacts = ctx.package.clone();
        self.remember(service, phase, &artifacts).await;
        Ok(artifacts)
    }

    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn publish(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let phase = ServicePhase::Publish;
        if let Some(cached) = self.cached(service, ctx, phase).await? {
            return Ok(cached);
        }
        if ctx.package.is_empty() {
            self.package(service, ctx, &PackageOptions::default(), op).await?;
        }

        let target = self.service_target(service)?;
        let resource = self.target_resource(service, target.as_ref()).await?;

        let artifacts = async {
            self.run_hooks(service, HookPhase::Pre, phase, op).await?;
            let artifacts = target.publish(service, ctx, &resource, options, op).await?;
            self.run_hooks(service, HookPhase::Post, phase, op).await?;
            Ok::<_, ProjectError>(artifacts)
        }
        .await
        .map_err(operation_error(phase, service))?;

        ctx.publish.add_all(artifacts.clone())?;
        self.remember(service, phase, &artifacts).await;
        Ok(artifacts)
    }

    /// Deploy to the target resource, packaging and publishing first when needed
    ///
    /// Endpoints set in `SERVICE_<NAME>_ENDPOINTS` replace the endpoints the target reports.
    #[instrument(skip_all, fields(service = %service.name))]
    pub async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &mut ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let phase = ServicePhase::Deploy;
        if let Some(cached) = self.cached(service, ctx, phase).await? {
            return Ok(cached);
        }
        if ctx.package.is_empty() {
            self.package(service, ctx, &PackageOptions::default(), op).await?;
        }
        if ctx.publish.is_empty() {
            self.publish(service, ctx, &PublishOptions::default(), op).await?;
        }

        let target = self.service_target(service)?;
        let resource = self.target_resource(service, target.as_ref()).await?;

        let mut artifacts = async {
            self.run_hooks(service, HookPhase::Pre, phase, op).await?;
            let artifacts = target.deploy(service, ctx, &resource, op).await?;
            self.run_hooks(service, HookPhase::Post, phase, op).await?;
            Ok::<_, ProjectError>(artifacts)
        }
        .await
        .map_err(operation_error(phase, service))?;

        let overridden = self.overridden_endpoints(service).await;
        if !overridden.is_empty() {
            artifacts.retain(|a| a.kind != ArtifactKind::Endpoint);
            for endpoint in &overridden {
                artifacts.add(
                    Artifact::remote(ArtifactKind::Endpoint, endpoint)
                        .with_metadata(metadata::OVERRIDDEN, "true"),
                )?;
            }
        }

        ctx.deploy.add_all(artifacts.clone())?;
        self.remember(service, phase, &artifacts).await;
        info!(service = %service.name, "Deployed service");
        Ok(artifacts)
    }

    /// Endpoints from `SERVICE_<NAME>_ENDPOINTS`; an invalid value is ignored
    pub async fn overridden_endpoints(&self, service: &ServiceConfig) -> Vec<String> {
        let value = self
            .env
            .read()
            .await
            .service_property(&service.name, ENDPOINTS_PROPERTY);
        if value.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<String>>(&value) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!(
                    service = %service.name,
                    error = %e,
                    "Endpoints override is not a JSON array of strings, skipping it"
                );
                Vec::new()
            }
        }
    }
}

/// Move the last packaged file to `output`
///
/// An output with an extension is the destination file, anything else is a folder that
/// receives the file under its own name. Container images and folders are left alone.
async fn move_package(package: &mut ArtifactCollection, output: &Path) -> Result<()> {
    let Some(artifact) = package.last_mut() else {
        return Ok(());
    };
    let source = PathBuf::from(&artifact.location);
    if artifact.location_kind != LocationKind::Local || !source.is_file() {
        return Ok(());
    }

    let destination = if output.extension().is_some() {
        output.to_path_buf()
    } else {
        match source.file_name() {
            Some(name) => output.join(name),
            None => return Ok(()),
        }
    };
    if let Some(dir) = destination.parent()
        && !dir.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(dir)
            .await
            .context(format!("failed creating output directory '{}'", dir.display()))?;
    }

    // copy then remove, rename fails across file systems
    tokio::fs::copy(&source, &destination).await.context(format!(
        "failed moving package file '{}' to '{}'",
        source.display(),
        destination.display()
    ))?;
    tokio::fs::remove_file(&source).await?;

    debug!(from = %source.display(), to = %destination.display(), "Moved package");
    artifact.location = destination.to_string_lossy().into_owned();
    Ok(())
}
