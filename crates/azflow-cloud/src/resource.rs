//! Resource listing and resource group discovery

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag identifying the service a resource hosts
pub const TAG_SERVICE_NAME: &str = "azd-service-name";

/// Tag identifying the environment a resource group belongs to
pub const TAG_ENV_NAME: &str = "azd-env-name";

/// ARM resource types of the built-in deployment hosts
pub mod resource_types {
    pub const WEB_SITE: &str = "Microsoft.Web/sites";
    pub const STATIC_WEB_SITE: &str = "Microsoft.Web/staticSites";
    pub const CONTAINER_APP: &str = "Microsoft.App/containerApps";
    pub const SPRING_APP: &str = "Microsoft.AppPlatform/Spring";
    pub const ML_ONLINE_ENDPOINT: &str = "Microsoft.MachineLearningServices/workspaces/onlineEndpoints";
    pub const CONTAINER_REGISTRY: &str = "Microsoft.ContainerRegistry/registries";
    pub const RESOURCE_GROUP: &str = "Microsoft.Resources/resourceGroups";
}

/// A resource as returned by a resource group listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureResource {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub location: String,
    /// `kind` property (e.g. `functionapp,linux` for function apps)
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl AzureResource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Resource management API
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// List resources in a resource group, optionally narrowed by an OData filter such as
    /// `name eq 'x'` or `tagName eq 'k' and tagValue eq 'v'`
    async fn list_resource_group_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
        filter: Option<&str>,
    ) -> Result<Vec<AzureResource>>;

    /// Find the resource group tagged `azd-env-name: <env_name>`
    async fn find_resource_group_for_environment(
        &self,
        subscription_id: &str,
        env_name: &str,
    ) -> Result<String>;
}

/// A parsed resource listing filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    Name(String),
    Tag { name: String, value: String },
}

impl ResourceFilter {
    /// Parse the two filter shapes produced by the resource manager
    pub fn parse(filter: &str) -> Option<Self> {
        let quoted = |s: &str| -> Option<String> {
            let s = s.trim();
            s.strip_prefix('\'')?.strip_suffix('\'').map(str::to_string)
        };

        if let Some(rest) = filter.trim().strip_prefix("name eq ") {
            return quoted(rest).map(ResourceFilter::Name);
        }

        let rest = filter.trim().strip_prefix("tagName eq ")?;
        let (name, value) = rest.split_once(" and tagValue eq ")?;
        Some(ResourceFilter::Tag {
            name: quoted(name)?,
            value: quoted(value)?,
        })
    }

    pub fn matches(&self, resource: &AzureResource) -> bool {
        match self {
            ResourceFilter::Name(name) => resource.name == *name,
            ResourceFilter::Tag { name, value } => resource.tags.get(name) == Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            ResourceFilter::parse("name eq 'app-web'"),
            Some(ResourceFilter::Name("app-web".to_string()))
        );
        assert_eq!(
            ResourceFilter::parse("tagName eq 'azd-service-name' and tagValue eq 'api'"),
            Some(ResourceFilter::Tag {
                name: "azd-service-name".to_string(),
                value: "api".to_string(),
            })
        );
        assert_eq!(ResourceFilter::parse("location eq 'westus'"), None);
    }

    #[test]
    fn test_filter_matches() {
        let resource = AzureResource::new("app-api", resource_types::CONTAINER_APP)
            .with_tag(TAG_SERVICE_NAME, "api");
        assert!(ResourceFilter::Name("app-api".into()).matches(&resource));
        assert!(
            ResourceFilter::Tag {
                name: TAG_SERVICE_NAME.into(),
                value: "api".into()
            }
            .matches(&resource)
        );
        assert!(!ResourceFilter::Name("app-web".into()).matches(&resource));
    }

    #[test]
    fn test_deserialize_listing() {
        let json = r#"[{"id":"/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/sites/web",
            "name":"web","type":"Microsoft.Web/sites","location":"eastus","kind":"app,linux",
            "tags":{"azd-service-name":"web"}}]"#;
        let resources: Vec<AzureResource> = serde_json::from_str(json).unwrap();
        assert_eq!(resources[0].resource_type, resource_types::WEB_SITE);
        assert_eq!(resources[0].tags[TAG_SERVICE_NAME], "web");
    }
}
