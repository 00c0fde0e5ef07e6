//! Deployment host clients
//!
//! One small trait per hosting service. `AzCli` implements all of them; tests use fakes.

use crate::error::Result;
use crate::target::TargetResource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Web app / function app properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppServiceProperties {
    #[serde(default)]
    pub host_names: Vec<String>,
}

/// App Service zip deployment, including deployment slots
#[async_trait]
pub trait AppServiceClient: Send + Sync {
    async fn app_service_properties(&self, target: &TargetResource) -> Result<AppServiceProperties>;

    /// Whether the app has ever been deployed to
    async fn has_app_service_deployments(&self, target: &TargetResource) -> Result<bool>;

    async fn app_service_slots(&self, target: &TargetResource) -> Result<Vec<String>>;

    /// Zip deploy to the main app (`slot == None`) or a named slot
    async fn deploy_app_service_zip(
        &self,
        target: &TargetResource,
        slot: Option<&str>,
        zip_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Function app zip deployment
#[async_trait]
pub trait FunctionAppClient: Send + Sync {
    async fn function_app_properties(&self, target: &TargetResource) -> Result<AppServiceProperties>;

    async fn deploy_function_app_zip(
        &self,
        target: &TargetResource,
        zip_file: &Path,
        remote_build: bool,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Container app revision updates
#[async_trait]
pub trait ContainerAppClient: Send + Sync {
    /// Point the container app at a new image, creating a new revision
    async fn update_container_app_image(
        &self,
        target: &TargetResource,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Host names exposed by the app's ingress
    async fn container_app_ingress_hosts(&self, target: &TargetResource) -> Result<Vec<String>>;
}

/// Static web app properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticWebAppProperties {
    #[serde(default)]
    pub default_hostname: String,
}

/// Static web app deployment through the SWA deployment token
#[async_trait]
pub trait StaticWebAppClient: Send + Sync {
    async fn static_web_app_properties(
        &self,
        target: &TargetResource,
    ) -> Result<StaticWebAppProperties>;

    /// Hostname of a named preview environment (`default` is production)
    async fn static_web_app_environment_hostname(
        &self,
        target: &TargetResource,
        environment_name: &str,
    ) -> Result<String>;

    async fn static_web_app_deployment_token(&self, target: &TargetResource) -> Result<String>;

    async fn deploy_static_web_app(
        &self,
        app_folder: &Path,
        output_location: &str,
        environment_name: &str,
        deployment_token: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Spring app properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpringAppProperties {
    #[serde(default)]
    pub url: Vec<String>,
}

/// Spring apps artifact upload and deployment
#[async_trait]
pub trait SpringAppClient: Send + Sync {
    async fn spring_app_properties(
        &self,
        target: &TargetResource,
        app_name: &str,
    ) -> Result<SpringAppProperties>;

    /// Upload the jar and return its relative path in the service storage
    async fn upload_spring_artifact(
        &self,
        target: &TargetResource,
        app_name: &str,
        artifact: &Path,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Deploy an uploaded artifact and return the deployment name
    async fn deploy_spring_artifact(
        &self,
        target: &TargetResource,
        app_name: &str,
        relative_path: &str,
        deployment_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Machine learning workspace scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceScope {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace: String,
}

/// Online endpoint state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineEndpoint {
    pub name: String,
    #[serde(default)]
    pub traffic: BTreeMap<String, u32>,
    #[serde(default)]
    pub scoring_uri: String,
    #[serde(default)]
    pub swagger_uri: String,
}

impl OnlineEndpoint {
    /// The deployment receiving all traffic, if any
    pub fn active_deployment(&self) -> Option<&str> {
        self.traffic
            .iter()
            .find(|(_, weight)| **weight == 100)
            .map(|(name, _)| name.as_str())
    }
}

/// Machine learning online endpoint deployment
#[async_trait]
pub trait MlEndpointClient: Send + Sync {
    /// Create an environment version from a YAML definition; returns `name:version`
    async fn create_environment_version(
        &self,
        scope: &WorkspaceScope,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Register a model version from a YAML definition; returns `name:version`
    async fn create_model_version(
        &self,
        scope: &WorkspaceScope,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Create an online deployment; returns its name
    async fn create_online_deployment(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Route all traffic to `deployment_name`
    async fn update_traffic(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
    ) -> Result<OnlineEndpoint>;

    /// Delete every deployment of the endpoint except `keep`
    async fn delete_deployments(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        keep: &[String],
    ) -> Result<()>;

    async fn online_endpoint(&self, scope: &WorkspaceScope, endpoint: &str) -> Result<OnlineEndpoint>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_deployment() {
        let mut endpoint = OnlineEndpoint {
            name: "chat".into(),
            ..Default::default()
        };
        assert_eq!(endpoint.active_deployment(), None);

        endpoint.traffic.insert("blue".into(), 0);
        endpoint.traffic.insert("green".into(), 100);
        assert_eq!(endpoint.active_deployment(), Some("green"));
    }

    #[test]
    fn test_parse_app_service_properties() {
        let props: AppServiceProperties =
            serde_json::from_str(r#"{"hostNames":["web.azurewebsites.net"],"state":"Running"}"#)
                .unwrap();
        assert_eq!(props.host_names, vec!["web.azurewebsites.net".to_string()]);
    }
}
