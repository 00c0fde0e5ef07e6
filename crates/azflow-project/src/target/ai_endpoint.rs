//! Machine learning online endpoint target
//!
//! Registers the environment and model versions described by YAML files in the service
//! directory, creates a new online deployment, moves all traffic to it and removes the
//! previous deployments.

use super::ServiceTarget;
use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, metadata};
use crate::container::{Clock, SystemClock};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result, ResultExt};
use async_trait::async_trait;
use azflow_cloud::{MlEndpointClient, OnlineEndpoint, SharedEnvironment, TargetResource, WorkspaceScope};
use azflow_core::{ExpandableMap, ExpandableString, ServiceConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Fallback for the workspace name
pub const AI_PROJECT_NAME_KEY: &str = "AZUREAI_PROJECT_NAME";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointConfig {
    #[serde(default)]
    workspace: ExpandableString,
    environment: Option<ComponentConfig>,
    model: Option<ComponentConfig>,
    deployment: Option<ComponentConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ComponentConfig {
    path: String,
    #[serde(default)]
    overrides: ExpandableMap,
}

pub struct AiEndpointTarget {
    client: Arc<dyn MlEndpointClient>,
    env: SharedEnvironment,
    clock: Arc<dyn Clock>,
}

impl AiEndpointTarget {
    pub fn new(client: Arc<dyn MlEndpointClient>, env: SharedEnvironment) -> Self {
        Self {
            client,
            env,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn config(service: &ServiceConfig) -> Result<EndpointConfig> {
        service.typed_config().map_err(|e| {
            ProjectError::InvalidConfig(format!(
                "service '{}' has an invalid endpoint config: {e}",
                service.name
            ))
        })
    }

    async fn scope(&self, config: &EndpointConfig, target: &TargetResource) -> Result<WorkspaceScope> {
        let env = self.env.read().await;
        let mut workspace = config.workspace.envsubst(|n| env.lookup_env(n))?;
        if workspace.is_empty() {
            workspace = env.getenv(AI_PROJECT_NAME_KEY);
        }
        if workspace.is_empty() {
            return Err(ProjectError::InvalidConfig("workspace name is required".into()));
        }
        Ok(WorkspaceScope {
            subscription_id: env.subscription_id(),
            resource_group: target.resource_group_name.clone(),
            workspace,
        })
    }

    async fn overrides(&self, component: &ComponentConfig) -> Result<BTreeMap<String, String>> {
        let env = self.env.read().await;
        Ok(component.overrides.expand(|n| env.lookup_env(n))?)
    }

    /// Endpoint name is the last segment of `workspace/endpoint`
    fn endpoint_name(target: &TargetResource) -> &str {
        target
            .resource_name
            .rsplit('/')
            .next()
            .unwrap_or(&target.resource_name)
    }

    fn endpoint_urls(endpoint: &OnlineEndpoint) -> Vec<(&'static str, String)> {
        [("Scoring", &endpoint.scoring_uri), ("Swagger", &endpoint.swagger_uri)]
            .into_iter()
            .filter(|(_, uri)| !uri.is_empty())
            .map(|(label, uri)| (label, uri.clone()))
            .collect()
    }
}

#[async_trait]
impl ServiceTarget for AiEndpointTarget {
    async fn deploy(
        &self,
        service: &ServiceConfig,
        _ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        self.validate_target_resource(target)?;
        let config = Self::config(service)?;
        let scope = self.scope(&config, target).await?;
        let service_dir = service.path();
        let mut artifacts = ArtifactCollection::new();
        let mut deployment_overrides = BTreeMap::new();

        if let Some(environment) = &config.environment {
            op.report("Configuring AI environment");
            let version = self
                .client
                .create_environment_version(
                    &scope,
                    &service_dir.join(&environment.path),
                    &self.overrides(environment).await?,
                    op.cancel,
                )
                .await
                .context("creating environment version")?;
            deployment_overrides.insert("environment".to_string(), format!("azureml:{version}"));
            artifacts.add(
                Artifact::remote(ArtifactKind::Deployment, &version).with_metadata("type", "environment"),
            )?;
        }

        if let Some(model) = &config.model {
            op.report("Configuring AI model");
            let version = self
                .client
                .create_model_version(
                    &scope,
                    &service_dir.join(&model.path),
                    &self.overrides(model).await?,
                    op.cancel,
                )
                .await
                .context("creating model version")?;
            deployment_overrides.insert("model".to_string(), format!("azureml:{version}"));
            artifacts.add(Artifact::remote(ArtifactKind::Deployment, &version).with_metadata("type", "model"))?;
        }

        let endpoint_name = Self::endpoint_name(target);
        if let Some(deployment) = &config.deployment {
            op.report("Deploying to AI Online Endpoint");
            let mut overrides = self.overrides(deployment).await?;
            // configured overrides win over the freshly registered versions
            for (key, value) in deployment_overrides {
                overrides.entry(key).or_insert(value);
            }
            let base_name = overrides.remove("name").unwrap_or_else(|| service.name.clone());
            let deployment_name = format!("{}-{}", base_name, self.clock.now().timestamp());

            let definition: PathBuf = service_dir.join(&deployment.path);
            let created = self
                .client
                .create_online_deployment(
                    &scope,
                    endpoint_name,
                    &deployment_name,
                    &definition,
                    &overrides,
                    op.cancel,
                )
                .await
                .context("creating online deployment")?;

            op.report("Updating traffic");
            let online = self
                .client
                .update_traffic(&scope, endpoint_name, &created)
                .await
                .context("updating traffic")?;

            op.report("Removing old deployments");
            self.client
                .delete_deployments(&scope, endpoint_name, std::slice::from_ref(&created))
                .await
                .context("deleting previous deployments")?;

            artifacts.add(Artifact::remote(ArtifactKind::Deployment, &created).with_metadata("type", "deployment"))?;
            for (label, uri) in Self::endpoint_urls(&online) {
                artifacts.add(Artifact::remote(ArtifactKind::Endpoint, uri).with_metadata(metadata::LABEL, label))?;
            }
        }

        artifacts.add(
            Artifact::remote(
                ArtifactKind::Resource,
                format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
                    scope.subscription_id, scope.resource_group, scope.workspace
                ),
            )
            .with_metadata("workspace", &scope.workspace),
        )?;
        Ok(artifacts)
    }

    async fn endpoints(&self, service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>> {
        let config = Self::config(service)?;
        let scope = self.scope(&config, target).await?;
        let online = self
            .client
            .online_endpoint(&scope, Self::endpoint_name(target))
            .await?;
        Ok(Self::endpoint_urls(&online)
            .into_iter()
            .map(|(label, uri)| format!("{label}: {uri}"))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use crate::testing::{FakeHosts, fixed_clock};
    use azflow_cloud::share_environment;
    use azflow_core::{Environment, ServiceTargetKind};
    use tokio_util::sync::CancellationToken;

    fn service() -> ServiceConfig {
        let yaml = r#"
workspace: ${AZUREML_WORKSPACE_NAME}
environment:
  path: ./deployment/environment.yml
model:
  path: ./deployment/model.yml
deployment:
  path: ./deployment/deployment.yml
  overrides:
    instance_type: ${INSTANCE_TYPE:=Standard_DS3_v2}
"#;
        let mut service = ServiceConfig::new("chat", ServiceTargetKind::AiEndpoint);
        service.project_path = "/repo".into();
        service.relative_path = "src/chat".into();
        service.config = serde_yaml::from_str(yaml).unwrap();
        service
    }

    fn target() -> TargetResource {
        TargetResource::new(
            "sub",
            "rg",
            "ws-chat/chat-endpoint",
            azflow_cloud::resource_types::ML_ONLINE_ENDPOINT,
        )
    }

    #[tokio::test]
    async fn test_deploy_registers_versions_and_shifts_traffic() {
        let hosts = Arc::new(FakeHosts {
            scoring_uri: "https://chat-endpoint.inference.ml.azure.com/score".into(),
            ..Default::default()
        });
        let env = Environment::with_values("dev", [("AZUREML_WORKSPACE_NAME", "ws-chat")]);
        let ai = AiEndpointTarget::new(hosts.clone(), share_environment(env))
            .with_clock(fixed_clock(1_700_000_000));

        let progress = RecordingProgress::new();
        let cancel = CancellationToken::new();
        let deployed = ai
            .deploy(&service(), &ServiceContext::new(), &target(), OperationContext::new(&progress, &cancel))
            .await
            .unwrap();

        assert_eq!(
            hosts.calls(),
            vec![
                "ml-environment ws-chat environment.yml",
                "ml-model ws-chat model.yml",
                "ml-deploy chat-endpoint chat-1700000000 environment=azureml:env:3,instance_type=Standard_DS3_v2,model=azureml:model:7",
                "ml-traffic chat-endpoint chat-1700000000",
                "ml-delete chat-endpoint keep=chat-1700000000",
            ]
        );
        let scoring = deployed.find_first(ArtifactKind::Endpoint, None).unwrap();
        assert_eq!(scoring.metadata(metadata::LABEL), Some("Scoring"));
        assert!(deployed.find_first(ArtifactKind::Resource, None).unwrap().location.ends_with("/workspaces/ws-chat"));
        assert_eq!(progress.messages().last().unwrap(), "Removing old deployments");
    }

    #[test]
    #[serial_test::serial]
    fn test_workspace_is_required() {
        let ai = AiEndpointTarget::new(
            Arc::new(FakeHosts::default()),
            share_environment(Environment::new("dev")),
        );
        let mut service = service();
        service.config.remove("workspace");

        let progress = RecordingProgress::new();
        let cancel = CancellationToken::new();
        let err = temp_env::with_var_unset(AI_PROJECT_NAME_KEY, || {
            tokio_test::block_on(ai.deploy(
                &service,
                &ServiceContext::new(),
                &target(),
                OperationContext::new(&progress, &cancel),
            ))
        })
        .unwrap_err();
        assert!(err.to_string().contains("workspace name is required"));
    }
}
