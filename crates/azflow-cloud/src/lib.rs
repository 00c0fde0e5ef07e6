//! azflow cloud layer
//!
//! Resolves the cloud resource each service deploys to and talks to the hosting services.
//! Every external call sits behind a trait (`ResourceService`, `ContainerRegistryService`,
//! one client trait per host) with `AzCli` as the production implementation.

pub mod azcli;
pub mod error;
pub mod hosts;
pub mod manager;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod target;

pub use azcli::AzCli;
pub use error::{CloudError, Result};
pub use hosts::{
    AppServiceClient, AppServiceProperties, ContainerAppClient, FunctionAppClient,
    MlEndpointClient, OnlineEndpoint, SpringAppClient, SpringAppProperties, StaticWebAppClient,
    StaticWebAppProperties, WorkspaceScope,
};
pub use manager::ResourceManager;
pub use registry::{
    ACR_DOMAIN_SUFFIX, ContainerRegistryService, DEFAULT_CREDENTIALS_RETRY_DELAY,
    RegistryCredentials, RemoteBuildRequest, credentials_retry_policy, credentials_with_retry,
};
pub use resource::{AzureResource, ResourceFilter, ResourceService, TAG_ENV_NAME, TAG_SERVICE_NAME, resource_types};
pub use retry::RetryConfig;
pub use target::TargetResource;

use azflow_core::Environment;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The environment shared by every service in one run
pub type SharedEnvironment = Arc<RwLock<Environment>>;

/// Wrap an environment for sharing
pub fn share_environment(env: Environment) -> SharedEnvironment {
    Arc::new(RwLock::new(env))
}
