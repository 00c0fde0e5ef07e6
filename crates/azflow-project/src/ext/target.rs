//! Service target provided by an extension

use super::{ExtRequest, ExtensionChannel, ServiceWire};
use crate::artifact::ArtifactCollection;
use crate::container::PublishOptions;
use crate::context::{OperationContext, ServiceContext};
use crate::error::Result;
use crate::progress::NoopProgress;
use crate::target::ServiceTarget;
use async_trait::async_trait;
use azflow_cloud::TargetResource;
use azflow_core::ServiceConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Forwards every target operation to the extension
///
/// Resource validation is left to the extension, which knows the resource types it
/// deploys to.
pub struct ExternalTarget {
    channel: Arc<ExtensionChannel>,
}

impl ExternalTarget {
    pub fn new(channel: Arc<ExtensionChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ServiceTarget for ExternalTarget {
    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::TargetPackage {
            service: ServiceWire::from(service),
            context: ctx.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }

    async fn publish(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        options: &PublishOptions,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::TargetPublish {
            service: ServiceWire::from(service),
            context: ctx.clone(),
            target: target.clone(),
            image: options.image.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::TargetDeploy {
            service: ServiceWire::from(service),
            context: ctx.clone(),
            target: target.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }

    async fn endpoints(&self, service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let request = ExtRequest::TargetEndpoints {
            service: ServiceWire::from(service),
            target: target.clone(),
        };
        self.channel
            .request(request, &NoopProgress, &CancellationToken::new())
            .await
    }

    fn validate_target_resource(&self, _target: &TargetResource) -> Result<()> {
        Ok(())
    }
}
