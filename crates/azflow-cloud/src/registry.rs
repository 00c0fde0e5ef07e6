//! Container registry credential exchange and remote builds

use crate::error::{CloudError, Result};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default delay between credential retries; a freshly provisioned registry
/// can take a while to become resolvable.
pub const DEFAULT_CREDENTIALS_RETRY_DELAY: Duration = Duration::from_secs(20);

/// Docker credentials for a registry login server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub login_server: String,
    pub username: String,
    pub password: String,
}

/// Login server suffix of Azure Container Registry
pub const ACR_DOMAIN_SUFFIX: &str = ".azurecr.io";

/// A Docker build run by the registry itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteBuildRequest {
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    /// `repository:tag` inside the registry
    pub image: String,
    pub build_args: BTreeMap<String, String>,
    pub target: Option<String>,
    pub platform: String,
}

/// Container registry API
#[async_trait]
pub trait ContainerRegistryService: Send + Sync {
    /// Exchange the current identity for registry credentials
    async fn credentials(
        &self,
        subscription_id: &str,
        login_server: &str,
        cancel: &CancellationToken,
    ) -> Result<RegistryCredentials>;

    /// Upload the build context and build the image in the registry, pushing it on success
    async fn remote_build(
        &self,
        subscription_id: &str,
        login_server: &str,
        request: &RemoteBuildRequest,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Fetch registry credentials, retrying while the registry is reported as not found
pub async fn credentials_with_retry(
    service: &dyn ContainerRegistryService,
    subscription_id: &str,
    login_server: &str,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<RegistryCredentials> {
    retry
        .run(cancel, CloudError::is_not_found, move || {
            service.credentials(subscription_id, login_server, cancel)
        })
        .await
}

/// The credential retry policy: 3 retries with a fixed delay
pub fn credentials_retry_policy(delay: Duration) -> RetryConfig {
    RetryConfig::constant(3, delay)
}
