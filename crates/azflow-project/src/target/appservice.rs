//! App Service (web app) target with deployment slot selection

use super::archive::{create_zip, read_ignore_file};
use super::{ServiceTarget, endpoint_artifacts, https_endpoints};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_cloud::{AppServiceClient, SharedEnvironment, TargetResource, resource_types};
use azflow_core::{ServiceConfig, environment};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const IGNORE_FILE: &str = ".webappignore";

/// Slot names that address the production app
const MAIN_SLOT_NAMES: [&str; 2] = ["production", "@main"];

/// Zip package ready to deploy, zipping the package directory if needed
pub(crate) fn zip_package(
    service: &ServiceConfig,
    ctx: &ServiceContext,
    ignore_file: &str,
) -> Result<Option<Artifact>> {
    if ctx.package.find_last(ArtifactKind::Archive, Some(LocationKind::Local)).is_some() {
        return Ok(None);
    }
    let dir = ctx
        .package
        .find_last(ArtifactKind::Directory, Some(LocationKind::Local))
        .ok_or_else(|| {
            ProjectError::InvalidArtifact(format!(
                "no package directory found for service '{}'",
                service.name
            ))
        })?;

    let source = PathBuf::from(&dir.location);
    let mut ignore = read_ignore_file(&service.path().join(ignore_file))?;
    ignore.extend(read_ignore_file(&source.join(ignore_file))?);
    let zip = create_zip(&source, &service.name, &ignore).context("creating zip package")?;
    Ok(Some(Artifact::local(ArtifactKind::Archive, zip.to_string_lossy())))
}

pub(crate) fn zip_file(service: &ServiceConfig, ctx: &ServiceContext) -> Result<PathBuf> {
    ctx.package
        .find_last(ArtifactKind::Archive, Some(LocationKind::Local))
        .map(|a| PathBuf::from(&a.location))
        .filter(|p| p.exists())
        .ok_or_else(|| {
            ProjectError::InvalidArtifact(format!(
                "no zip package found for service '{}', run package first",
                service.name
            ))
        })
}

/// Which deployment slot to deploy to; `None` is the main app
fn select_slot(
    service: &ServiceConfig,
    slots: &[String],
    first_deployment: bool,
    requested: Option<String>,
) -> Result<Option<String>> {
    if let Some(requested) = requested.filter(|s| !s.is_empty()) {
        if MAIN_SLOT_NAMES.iter().any(|m| requested.eq_ignore_ascii_case(m)) {
            return Ok(None);
        }
        if slots.iter().any(|s| *s == requested) {
            return Ok(Some(requested));
        }
        return Err(ProjectError::InvalidConfig(format!(
            "deployment slot '{requested}' not found for service '{}', available slots: {}",
            service.name,
            slots.join(", ")
        )));
    }

    match slots {
        [] => Ok(None),
        _ if first_deployment => Ok(None),
        [only] => Ok(Some(only.clone())),
        _ => Err(ProjectError::InvalidConfig(format!(
            "multiple deployment slots found for service '{}' ({}), set {} to choose one",
            service.name,
            slots.join(", "),
            slot_env_key(&service.name)
        ))),
    }
}

fn slot_env_key(service_name: &str) -> String {
    format!("AZD_DEPLOY_{}_SLOT_NAME", environment::key(service_name))
}

pub struct AppServiceTarget {
    client: Arc<dyn AppServiceClient>,
    env: SharedEnvironment,
}

impl AppServiceTarget {
    pub fn new(client: Arc<dyn AppServiceClient>, env: SharedEnvironment) -> Self {
        Self { client, env }
    }

    async fn deploy_zip(
        &self,
        target: &TargetResource,
        slot: Option<&str>,
        zip: &Path,
        op: OperationContext<'_>,
    ) -> Result<String> {
        op.report(&match slot {
            Some(slot) => format!("Uploading deployment package to slot '{slot}'"),
            None => "Uploading deployment package".to_string(),
        });
        Ok(self
            .client
            .deploy_app_service_zip(target, slot, zip, op.cancel)
            .await?)
    }
}

#[async_trait]
impl ServiceTarget for AppServiceTarget {
    fn resource_type(&self) -> Option<&'static str> {
        Some(resource_types::WEB_SITE)
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let mut artifacts = ArtifactCollection::new();
        if let Some(zip) = zip_package(service, ctx, IGNORE_FILE)? {
            op.report("Compressing deployment artifacts");
            artifacts.add(zip)?;
        }
        Ok(artifacts)
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        let zip = zip_file(service, ctx)?;

        let slots = self.client.app_service_slots(target).await?;
        let first_deployment = !slots.is_empty() && !self.client.has_app_service_deployments(target).await?;
        let requested = self.env.read().await.lookup_env(&slot_env_key(&service.name));
        let slot = select_slot(service, &slots, first_deployment, requested)?;

        let result = self.deploy_zip(target, slot.as_deref(), &zip, op).await?;
        if first_deployment {
            // the first deployment also seeds every slot
            for slot in &slots {
                self.deploy_zip(target, Some(slot), &zip, op).await?;
            }
        }
        info!(service = %service.name, slot = slot.as_deref().unwrap_or("main"), "Deployed to App Service");

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(
            Artifact::remote(ArtifactKind::Deployment, result)
                .with_metadata("slot", slot.unwrap_or_else(|| "production".into())),
        )?;
        artifacts.add_all(endpoint_artifacts(&self.endpoints(service, target).await?)?)?;
        Ok(artifacts)
    }

    async fn endpoints(&self, _service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let props = self.client.app_service_properties(target).await?;
        Ok(https_endpoints(&props.host_names))
    }
}
