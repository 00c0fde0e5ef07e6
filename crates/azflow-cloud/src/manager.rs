//! Resource resolution
//!
//! Maps a service to the cloud resource it deploys to. The resource group comes from the
//! service, then the project, then `AZURE_RESOURCE_GROUP`, then discovery by the
//! `azd-env-name` tag. Within the group the resource is matched by explicit `resourceName`
//! or by the `azd-service-name` tag.

use crate::SharedEnvironment;
use crate::error::{CloudError, Result};
use crate::resource::{AzureResource, ResourceService, TAG_SERVICE_NAME};
use crate::target::TargetResource;
use azflow_core::environment::RESOURCE_GROUP_KEY;
use azflow_core::{ExpandableString, ServiceConfig};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Command suggested to the user when the target resource is missing
const PROVISION_COMMAND: &str = "provision";

pub struct ResourceManager {
    env: SharedEnvironment,
    resources: Arc<dyn ResourceService>,
}

impl ResourceManager {
    pub fn new(env: SharedEnvironment, resources: Arc<dyn ResourceService>) -> Self {
        Self { env, resources }
    }

    async fn expand(&self, template: &ExpandableString) -> Result<String> {
        let env = self.env.read().await;
        Ok(template.envsubst(|name| env.lookup_env(name))?)
    }

    /// Resolve the resource group name
    ///
    /// An explicit template wins, then `AZURE_RESOURCE_GROUP`, then the group tagged with the
    /// environment name.
    pub async fn get_resource_group_name(
        &self,
        subscription_id: &str,
        template: &ExpandableString,
    ) -> Result<String> {
        let name = self.expand(template).await?;
        if !name.is_empty() {
            return Ok(name);
        }

        let (from_env, env_name) = {
            let env = self.env.read().await;
            (env.getenv(RESOURCE_GROUP_KEY), env.name().to_string())
        };
        if !from_env.is_empty() {
            return Ok(from_env);
        }

        debug!(env = %env_name, "Discovering resource group by environment tag");
        self.resources
            .find_resource_group_for_environment(subscription_id, &env_name)
            .await
    }

    /// All resources in the group that match the service's name or tag
    pub async fn get_service_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
        service: &ServiceConfig,
    ) -> Result<Vec<AzureResource>> {
        let resource_name = self.expand(&service.resource_name).await?;
        let filter = if resource_name.is_empty() {
            format!(
                "tagName eq '{}' and tagValue eq '{}'",
                TAG_SERVICE_NAME, service.name
            )
        } else {
            format!("name eq '{}'", resource_name)
        };

        self.resources
            .list_resource_group_resources(subscription_id, resource_group, Some(&filter))
            .await
    }

    /// The single resource for the service
    ///
    /// Zero matches is `NotFound` and more than one is `Ambiguous`. Both messages end with
    /// `rerun_command` as the suggested fix.
    pub async fn get_service_resource(
        &self,
        subscription_id: &str,
        resource_group: &str,
        service: &ServiceConfig,
        rerun_command: &str,
    ) -> Result<AzureResource> {
        let resource_name = self.expand(&service.resource_name).await?;
        let mut found = self
            .get_service_resources(subscription_id, resource_group, service)
            .await?;

        if resource_name.is_empty() {
            match found.len() {
                0 => Err(CloudError::NotFound(format!(
                    "unable to find a resource tagged with '{}: {}'. Ensure the service resource is \
                     correctly tagged in your infrastructure configuration, and rerun {}",
                    TAG_SERVICE_NAME, service.name, rerun_command
                ))),
                1 => Ok(found.remove(0)),
                n => Err(CloudError::Ambiguous(format!(
                    "expecting only '1' resource tagged with '{}: {}', but found '{}'. Ensure a unique \
                     service resource is correctly tagged in your infrastructure configuration, and rerun {}",
                    TAG_SERVICE_NAME, service.name, n, rerun_command
                ))),
            }
        } else {
            match found.len() {
                0 => Err(CloudError::NotFound(format!(
                    "unable to find a resource with name '{}'. Ensure that resourceName in azure.yaml \
                     is valid, and rerun {}",
                    resource_name, rerun_command
                ))),
                1 => Ok(found.remove(0)),
                n => Err(CloudError::Ambiguous(format!(
                    "expecting only '1' resource named '{}', but found '{}'. Use a unique name for the \
                     service resource in the resource group '{}', and rerun {}",
                    resource_name, n, resource_group, rerun_command
                ))),
            }
        }
    }

    /// Resolve the deployment target for a service
    ///
    /// Hosts that support delayed provisioning get a target with an empty resource name when
    /// the resource does not exist yet.
    #[instrument(skip(self, service), fields(service = %service.name))]
    pub async fn get_target_resource(
        &self,
        subscription_id: &str,
        service: &ServiceConfig,
    ) -> Result<TargetResource> {
        let template = if service.resource_group_name.is_empty() {
            &service.project_resource_group
        } else {
            &service.resource_group_name
        };
        let resource_group = self.get_resource_group_name(subscription_id, template).await?;

        match self
            .get_service_resource(subscription_id, &resource_group, service, PROVISION_COMMAND)
            .await
        {
            Ok(resource) => Ok(TargetResource::new(
                subscription_id,
                resource_group,
                resource.name,
                resource.resource_type,
            )),
            Err(CloudError::NotFound(message)) if service.host.supports_delayed_provisioning() => {
                debug!(reason = %message, "Target resource not provisioned yet");
                Ok(TargetResource::new(subscription_id, resource_group, "", ""))
            }
            Err(e) => Err(e),
        }
    }
}
