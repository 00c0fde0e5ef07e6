//! Function app target

use super::appservice::{zip_file, zip_package};
use super::{ServiceTarget, endpoint_artifacts, https_endpoints};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use azflow_cloud::{FunctionAppClient, TargetResource, resource_types};
use azflow_core::{ServiceConfig, ServiceLanguageKind};
use serde::Deserialize;
use std::sync::Arc;

const IGNORE_FILE: &str = ".funcignore";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionConfig {
    remote_build: Option<bool>,
}

/// Remote build is on by default for languages whose dependencies install on the host
fn remote_build(service: &ServiceConfig) -> Result<bool> {
    let config: FunctionConfig = service.typed_config().map_err(|e| {
        ProjectError::InvalidConfig(format!("service '{}' has an invalid config: {e}", service.name))
    })?;
    Ok(config.remote_build.unwrap_or(matches!(
        service.language,
        ServiceLanguageKind::Python | ServiceLanguageKind::JavaScript | ServiceLanguageKind::TypeScript
    )))
}

pub struct FunctionAppTarget {
    client: Arc<dyn FunctionAppClient>,
}

impl FunctionAppTarget {
    pub fn new(client: Arc<dyn FunctionAppClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceTarget for FunctionAppTarget {
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
        let remote_build = remote_build(service)?;

        op.report("Uploading deployment package");
        let result = self
            .client
            .deploy_function_app_zip(target, &zip, remote_build, op.cancel)
            .await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::remote(ArtifactKind::Deployment, result))?;
        artifacts.add_all(endpoint_artifacts(&self.endpoints(service, target).await?)?)?;
        Ok(artifacts)
    }

    async fn endpoints(&self, _service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let props = self.client.function_app_properties(target).await?;
        Ok(https_endpoints(&props.host_names))
    }
}
