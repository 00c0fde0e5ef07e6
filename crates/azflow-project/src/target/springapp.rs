//! Spring Apps target

use super::{ServiceTarget, endpoint_artifacts};
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_cloud::{SharedEnvironment, SpringAppClient, TargetResource, resource_types};
use azflow_core::{EnvironmentStore, ServiceConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment property holding the uploaded artifact path
pub const RELATIVE_PATH_PROPERTY: &str = "RELATIVE_PATH";

const DEFAULT_DEPLOYMENT_NAME: &str = "default";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpringConfig {
    app_name: Option<String>,
    deployment_name: Option<String>,
}

pub struct SpringAppTarget {
    client: Arc<dyn SpringAppClient>,
    env: SharedEnvironment,
    store: Arc<dyn EnvironmentStore>,
}

impl SpringAppTarget {
    pub fn new(
        client: Arc<dyn SpringAppClient>,
        env: SharedEnvironment,
        store: Arc<dyn EnvironmentStore>,
    ) -> Self {
        Self { client, env, store }
    }

    fn config(service: &ServiceConfig) -> Result<SpringConfig> {
        service.typed_config().map_err(|e| {
            ProjectError::InvalidConfig(format!("service '{}' has an invalid config: {e}", service.name))
        })
    }

    fn app_name(service: &ServiceConfig) -> Result<String> {
        Ok(Self::config(service)?
            .app_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| service.name.clone()))
    }
}

#[async_trait]
impl ServiceTarget for SpringAppTarget {
    fn resource_type(&self) -> Option<&'static str> {
        Some(resource_types::SPRING_APP)
    }

    async fn package(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        _op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        let has_jar = ctx
            .package
            .find(Some(ArtifactKind::Archive), Some(LocationKind::Local))
            .any(|a| a.location.ends_with(".jar"));
        if has_jar {
            Ok(ArtifactCollection::new())
        } else {
            Err(ProjectError::InvalidArtifact(format!(
                "service '{}' must be packaged as a .jar to deploy to Spring Apps",
                service.name
            )))
        }
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        let config = Self::config(service)?;
        let app_name = Self::app_name(service)?;
        let deployment_name = config
            .deployment_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DEPLOYMENT_NAME.to_string());

        let jar = ctx
            .package
            .find_last(ArtifactKind::Archive, Some(LocationKind::Local))
            .map(|a| PathBuf::from(&a.location))
            .ok_or_else(|| {
                ProjectError::InvalidArtifact(format!(
                    "no jar package found for service '{}', run package first",
                    service.name
                ))
            })?;

        op.report("Uploading spring artifact");
        let relative_path = self
            .client
            .upload_spring_artifact(target, &app_name, &jar, op.cancel)
            .await
            .context(format!("uploading artifact for spring app '{app_name}'"))?;

        {
            let mut env = self.env.write().await;
            env.set_service_property(&service.name, RELATIVE_PATH_PROPERTY, &relative_path);
            self.store.save(&env).context("saving environment")?;
        }

        op.report("Deploying spring artifact");
        let deployment = self
            .client
            .deploy_spring_artifact(target, &app_name, &relative_path, &deployment_name, op.cancel)
            .await?;

        let mut artifacts = ArtifactCollection::new();
        artifacts.add(Artifact::remote(ArtifactKind::Deployment, deployment))?;
        artifacts.add_all(endpoint_artifacts(&self.endpoints(service, target).await?)?)?;
        Ok(artifacts)
    }

    async fn endpoints(&self, service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let props = self
            .client
            .spring_app_properties(target, &Self::app_name(service)?)
            .await?;
        Ok(props.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use crate::testing::FakeHosts;
    use azflow_cloud::share_environment;
    use azflow_core::{Environment, MemoryStore, ServiceTargetKind};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_deploy_uploads_and_records_relative_path() {
        let hosts = Arc::new(FakeHosts {
            spring_urls: vec!["https://spring-api.azuremicroservices.io".into()],
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::new());
        let spring = SpringAppTarget::new(
            hosts.clone(),
            share_environment(Environment::new("dev")),
            store.clone(),
        );
        let service = ServiceConfig::new("api", ServiceTargetKind::SpringApp);
        let target = TargetResource::new("sub", "rg", "spring-svc", resource_types::SPRING_APP);

        let mut ctx = ServiceContext::new();
        ctx.package
            .add(Artifact::local(ArtifactKind::Archive, "/tmp/pkg/app.jar"))
            .unwrap();

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let op = OperationContext::new(&progress, &cancel);
        assert!(spring.package(&service, &ctx, op).await.unwrap().is_empty());
        let deployed = spring.deploy(&service, &ctx, &target, op).await.unwrap();

        assert_eq!(
            hosts.calls(),
            vec![
                "spring-upload api app.jar",
                "spring-deploy api resources/api/app.jar default",
            ]
        );
        assert_eq!(
            store.saved("dev").unwrap().get("SERVICE_API_RELATIVE_PATH"),
            Some("resources/api/app.jar")
        );
        assert_eq!(
            deployed.find_first(ArtifactKind::Endpoint, None).unwrap().location,
            "https://spring-api.azuremicroservices.io"
        );
    }

    #[tokio::test]
    async fn test_package_requires_jar() {
        let spring = SpringAppTarget::new(
            Arc::new(FakeHosts::default()),
            share_environment(Environment::new("dev")),
            Arc::new(MemoryStore::new()),
        );
        let service = ServiceConfig::new("api", ServiceTargetKind::SpringApp);
        let mut ctx = ServiceContext::new();
        ctx.package
            .add(Artifact::local(ArtifactKind::Directory, "/tmp/out"))
            .unwrap();

        let progress = NoopProgress;
        let cancel = CancellationToken::new();
        let err = spring
            .package(&service, &ctx, OperationContext::new(&progress, &cancel))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(".jar"));
    }
}
