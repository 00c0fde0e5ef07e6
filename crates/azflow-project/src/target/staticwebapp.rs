//! Static Web Apps target

use super::{ServiceTarget, endpoint_artifacts, https_endpoints};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_cloud::{StaticWebAppClient, TargetResource, resource_types};
use azflow_core::ServiceConfig;
use serde::Deserialize;
use std::sync::Arc;

const PRODUCTION_ENVIRONMENT: &str = "default";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticWebAppConfig {
    /// Preview environment to deploy to
    environment_name: Option<String>,
}

pub struct StaticWebAppTarget {
    client: Arc<dyn StaticWebAppClient>,
}

impl StaticWebAppTarget {
    pub fn new(client: Arc<dyn StaticWebAppClient>) -> Self {
        Self { client }
    }

    fn environment_name(service: &ServiceConfig) -> Result<String> {
        let config: StaticWebAppConfig = service.typed_config().map_err(|e| {
            ProjectError::InvalidConfig(format!("service '{}' has an invalid config: {e}", service.name))
        })?;
        Ok(config
            .environment_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| PRODUCTION_ENVIRONMENT.to_string()))
    }
}

#[async_trait]
impl ServiceTarget for StaticWebAppTarget {
    fn resource_type(&self) -> Option<&'static str> {
        Some(resource_types::STATIC_WEB_SITE)
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        let environment_name = Self::environment_name(service)?;

        op.report("Retrieving deployment token");
        let token = self
            .client
            .static_web_app_deployment_token(target)
            .await
            .context("retrieving static web app deployment token")?;

        op.report("Uploading static site");
        self.client
            .deploy_static_web_app(
                &service.path(),
                &service.output_path,
                &environment_name,
                &token,
                op.cancel,
            )
            .await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(
            Artifact::remote(ArtifactKind::Deployment, target.resource_id())
                .with_metadata("environment", &environment_name),
        )?;
        let endpoints = if environment_name == PRODUCTION_ENVIRONMENT {
            self.endpoints(service, target).await?
        } else {
            let host = self
                .client
                .static_web_app_environment_hostname(target, &environment_name)
                .await?;
            https_endpoints([host])
        };
        artifacts.add_all(endpoint_artifacts(&endpoints)?)?;
        Ok(artifacts)
    }

    async fn endpoints(&self, _service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let props = self.client.static_web_app_properties(target).await?;
        Ok(https_endpoints([props.default_hostname]))
    }
}
