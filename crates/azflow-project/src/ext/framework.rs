//! Framework service provided by an extension

use super::{ExtRequest, ExtensionChannel, ServiceWire};
use crate::artifact::ArtifactCollection;
use crate::context::{OperationContext, ServiceContext};
use crate::error::Result;
use crate::framework::{FrameworkRequirements, FrameworkService};
use async_trait::async_trait;
use azflow_core::ServiceConfig;
use std::sync::Arc;

pub struct ExternalFramework {
    channel: Arc<ExtensionChannel>,
    requirements: FrameworkRequirements,
}

impl ExternalFramework {
    pub fn new(channel: Arc<ExtensionChannel>, requirements: FrameworkRequirements) -> Self {
        Self {
            channel,
            requirements,
        }
    }

    /// Ask the extension for its package requirements up front
    pub async fn connect(channel: Arc<ExtensionChannel>, op: OperationContext<'_>) -> Result<Self> {
        let requirements = channel
            .request(ExtRequest::FrameworkRequirements, op.progress, op.cancel)
            .await?;
        Ok(Self::new(channel, requirements))
    }
}

#[async_trait]
impl FrameworkService for ExternalFramework {
    fn requirements(&self) -> FrameworkRequirements {
        self.requirements
    }

    async fn restore(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::FrameworkRestore {
            service: ServiceWire::from(service),
            context: ctx.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }

    async fn build(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::FrameworkBuild {
            service: ServiceWire::from(service),
            context: ctx.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let request = ExtRequest::FrameworkPackage {
            service: ServiceWire::from(service),
            context: ctx.clone(),
        };
        self.channel.request(request, op.progress, op.cancel).await
    }
}
