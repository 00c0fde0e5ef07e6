//! Service targets
//!
//! A service target knows how to publish and deploy a packaged service to one kind of
//! host. Targets are looked up by host kind through [`TargetRegistry`]; extensions
//! register extra kinds at runtime.

mod ai_endpoint;
mod appservice;
pub mod archive;
mod containerapp;
mod function;
mod springapp;
mod staticwebapp;

pub use ai_endpoint::AiEndpointTarget;
pub use appservice::AppServiceTarget;
pub use containerapp::ContainerAppTarget;
pub use function::FunctionAppTarget;
pub use springapp::SpringAppTarget;
pub use staticwebapp::StaticWebAppTarget;

use crate::artifact::{Artifact, ArtifactCollection, ArtifactKind, metadata};
use crate::container::{ContainerHelper, PublishOptions};
use crate::context::{OperationContext, ServiceContext};
use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use azflow_cloud::{
    AppServiceClient, CloudError, ContainerAppClient, FunctionAppClient, MlEndpointClient,
    SharedEnvironment, SpringAppClient, StaticWebAppClient, TargetResource,
};
use azflow_core::{EnvironmentStore, ServiceConfig, ServiceTargetKind};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ServiceTarget: Send + Sync {
    /// ARM type of the resources this target deploys to, when it checks one
    fn resource_type(&self) -> Option<&'static str> {
        None
    }

    async fn initialize(&self, _service: &ServiceConfig) -> Result<()> {
        Ok(())
    }

    /// Turn the framework's package output into something this host can deploy
    async fn package(
        &self,
        _service: &ServiceConfig,
        _ctx: &ServiceContext,
        _op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        Ok(ArtifactCollection::new())
    }

    async fn publish(
        &self,
        _service: &ServiceConfig,
        _ctx: &ServiceContext,
        _target: &TargetResource,
        _options: &PublishOptions,
        _op: OperationContext<'_>,
    ) -> Result<ArtifactCollection> {
        Ok(ArtifactCollection::new())
    }

    async fn deploy(
        &self,
        service: &ServiceConfig,
        ctx: &ServiceContext,
        target: &TargetResource,
        op: OperationContext<'_>,
    ) -> Result<ArtifactCollection>;

    /// Public URLs of the deployed service
    async fn endpoints(&self, service: &ServiceConfig, target: &TargetResource) -> Result<Vec<String>>;

    /// Check that the resolved resource is one this target can deploy to
    fn validate_target_resource(&self, target: &TargetResource) -> Result<()> {
        validate_target_resource(target, self.resource_type())
    }
}

/// The resource group must be known; a resolved resource must have the expected type
pub fn validate_target_resource(target: &TargetResource, expected_type: Option<&str>) -> Result<()> {
    if target.resource_group_name.is_empty() {
        return Err(ProjectError::InvalidConfig(
            "missing resource group name for the target resource".into(),
        ));
    }
    if let Some(expected) = expected_type
        && target.is_resolved()
        && !target.resource_type.is_empty()
        && !target.resource_type.eq_ignore_ascii_case(expected)
    {
        return Err(CloudError::ResourceTypeMismatch(format!(
            "resource '{}' has type '{}', expected '{}'",
            target.resource_name, target.resource_type, expected
        ))
        .into());
    }
    Ok(())
}

/// `https://<host>/` for each host name
pub(crate) fn https_endpoints<I, S>(hosts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    hosts
        .into_iter()
        .filter(|h| !h.as_ref().is_empty())
        .map(|h| format!("https://{}/", h.as_ref()))
        .collect()
}

/// Endpoint artifacts for a list of URLs
pub(crate) fn endpoint_artifacts(endpoints: &[String]) -> Result<ArtifactCollection> {
    let mut artifacts = ArtifactCollection::new();
    for endpoint in endpoints {
        artifacts.add(
            Artifact::remote(ArtifactKind::Endpoint, endpoint)
                .with_metadata(metadata::LABEL, "Endpoint"),
        )?;
    }
    Ok(artifacts)
}

/// Clients for every built-in host
#[derive(Clone)]
pub struct HostClients {
    pub app_service: Arc<dyn AppServiceClient>,
    pub function_app: Arc<dyn FunctionAppClient>,
    pub container_app: Arc<dyn ContainerAppClient>,
    pub static_web_app: Arc<dyn StaticWebAppClient>,
    pub spring_app: Arc<dyn SpringAppClient>,
    pub ml_endpoint: Arc<dyn MlEndpointClient>,
}

impl HostClients {
    /// Every host served by the same client (e.g. `AzCli`)
    pub fn all<C>(client: Arc<C>) -> Self
    where
        C: AppServiceClient
            + FunctionAppClient
            + ContainerAppClient
            + StaticWebAppClient
            + SpringAppClient
            + MlEndpointClient
            + 'static,
    {
        Self {
            app_service: client.clone(),
            function_app: client.clone(),
            container_app: client.clone(),
            static_web_app: client.clone(),
            spring_app: client.clone(),
            ml_endpoint: client,
        }
    }
}

pub type TargetFactory = Arc<dyn Fn() -> Arc<dyn ServiceTarget> + Send + Sync>;

/// Host kind → service target constructors
#[derive(Default)]
pub struct TargetRegistry {
    factories: HashMap<ServiceTargetKind, TargetFactory>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in host
    pub fn with_builtins(
        clients: HostClients,
        helper: Arc<ContainerHelper>,
        env: SharedEnvironment,
        store: Arc<dyn EnvironmentStore>,
    ) -> Self {
        let mut registry = Self::new();

        let (client, e) = (clients.app_service.clone(), env.clone());
        registry.register(ServiceTargetKind::AppService, move || {
            Arc::new(AppServiceTarget::new(client.clone(), e.clone()))
        });

        let client = clients.function_app.clone();
        registry.register(ServiceTargetKind::Function, move || {
            Arc::new(FunctionAppTarget::new(client.clone()))
        });

        for kind in [ServiceTargetKind::ContainerApp, ServiceTargetKind::DotnetContainerApp] {
            let (client, h) = (clients.container_app.clone(), helper.clone());
            registry.register(kind, move || {
                Arc::new(ContainerAppTarget::new(client.clone(), h.clone()))
            });
        }

        let client = clients.static_web_app.clone();
        registry.register(ServiceTargetKind::StaticWebApp, move || {
            Arc::new(StaticWebAppTarget::new(client.clone()))
        });

        let (client, e, s) = (clients.spring_app.clone(), env.clone(), store.clone());
        registry.register(ServiceTargetKind::SpringApp, move || {
            Arc::new(SpringAppTarget::new(client.clone(), e.clone(), s.clone()))
        });

        let (client, e) = (clients.ml_endpoint.clone(), env);
        registry.register(ServiceTargetKind::AiEndpoint, move || {
            Arc::new(AiEndpointTarget::new(client.clone(), e.clone()))
        });

        registry
    }

    /// Register (or replace) the target for a host kind
    pub fn register<F>(&mut self, kind: ServiceTargetKind, factory: F)
    where
        F: Fn() -> Arc<dyn ServiceTarget> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn supports(&self, kind: &ServiceTargetKind) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn resolve(&self, service: &ServiceConfig) -> Result<Arc<dyn ServiceTarget>> {
        match self.factories.get(&service.host) {
            Some(factory) => Ok(factory()),
            None => {
                let built_in: Vec<&str> = ServiceTargetKind::BUILT_IN.iter().map(|k| k.as_str()).collect();
                Err(ProjectError::Unsupported(format!(
                    "service host '{}' for service '{}' is unsupported, supported hosts are: {}",
                    service.host,
                    service.name,
                    built_in.join(", ")
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHosts;
    use azflow_cloud::{resource_types, share_environment};
    use azflow_core::{Environment, MemoryStore};

    #[test]
    fn test_validate_target_resource() {
        let target = TargetResource::new("sub", "rg", "app", resource_types::WEB_SITE);
        assert!(validate_target_resource(&target, Some("microsoft.web/sites")).is_ok());

        let err = validate_target_resource(&target, Some(resource_types::CONTAINER_APP)).unwrap_err();
        assert!(err.to_string().starts_with("resource type mismatch"));

        let no_group = TargetResource::new("sub", "", "app", resource_types::WEB_SITE);
        assert!(validate_target_resource(&no_group, None).is_err());

        // not provisioned yet
        let pending = TargetResource::new("sub", "rg", "", "");
        assert!(validate_target_resource(&pending, Some(resource_types::CONTAINER_APP)).is_ok());
    }

    #[test]
    fn test_https_endpoints_skip_empty_hosts() {
        assert_eq!(
            https_endpoints(["api.azurewebsites.net", ""]),
            vec!["https://api.azurewebsites.net/"]
        );
    }

    #[test]
    fn test_registry_unknown_host() {
        let env = share_environment(Environment::new("dev"));
        let helper = Arc::new(crate::testing::container_helper(env.clone()));
        let registry = TargetRegistry::with_builtins(
            HostClients::all(Arc::new(FakeHosts::default())),
            helper,
            env,
            Arc::new(MemoryStore::new()),
        );
        assert!(registry.supports(&ServiceTargetKind::DotnetContainerApp));

        let service = ServiceConfig::new("api", ServiceTargetKind::Custom("demo.host".into()));
        let err = registry.resolve(&service).err().unwrap();
        assert!(
            err.to_string()
                .starts_with("service host 'demo.host' for service 'api' is unsupported")
        );
    }
}
