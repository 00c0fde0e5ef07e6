//! Container Apps target
//!
//! Publishing pushes the packaged image to the registry; deploying points the app at the
//! pushed image. When the app does not exist yet (it is created by a later provision
//! that reads `SERVICE_<NAME>_IMAGE_NAME`) the deploy only records the image.

use super::{ServiceTarget, endpoint_artifacts, https_endpoints};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind, metadata};
use crate::container::{ContainerHelper, PublishOptions};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use azflow_cloud::{ContainerAppClient, TargetResource, resource_types};
use azflow_core::ServiceConfig;
use std::sync::Arc;
use tracing::info;

pub struct ContainerAppTarget {
    client: Arc<dyn ContainerAppClient>,
    helper: Arc<ContainerHelper>,
}

impl ContainerAppTarget {
    pub fn new(client: Arc<dyn ContainerAppClient>, helper: Arc<ContainerHelper>) -> Self {
        Self { client, helper }
    }
}

#[async_trait]
impl ServiceTarget for ContainerAppTarget {
    fn resource_type(&self) -> Option<&'static str> {
        Some(resource_types::CONTAINER_APP)
    }

    async fn publish(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        self.helper
            .publish(service, &ctx.package, target, options, op)
            .await
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        let image = ctx
            .publish
            .find_last(ArtifactKind::Container, Some(LocationKind::Remote))
            .map(|a| a.location.clone())
            .ok_or_else(|| {
                ProjectError::InvalidArtifact(format!(
                    "no published image found for service '{}', run publish first",
                    service.name
                ))
            })?;

        let mut artifacts = ArtifactCollection::new();
        if !target.is_resolved() {
            info!(service = %service.name, image = %image, "Container app not provisioned yet, image recorded");
            artifacts.add(
                Artifact::remote(ArtifactKind::Deployment, &image)
                    .with_metadata(metadata::PENDING_PROVISION, "true"),
            )?;
            return Ok(artifacts);
        }

        op.report(&format!("Updating container app {}", target.resource_name));
        self.client
            .update_container_app_image(target, &image, op.cancel)
            .await?;

        artifacts.add(Artifact::remote(ArtifactKind::Deployment, target.resource_id()))?;
        artifacts.add_all(endpoint_artifacts(&self.endpoints(service, target).await?)?)?;
        Ok(artifacts)
    }

    async fn endpoints(&self, _service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        if !target.is_resolved() {
            return Ok(Vec::new());
        }
        let hosts = self.client.container_app_ingress_hosts(target).await?;
        Ok(https_endpoints(&hosts))
    }
}
