//! Deployment target resource

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The cloud resource a service deploys to
///
/// An empty `resource_name` means the resource is not known yet, which is allowed
/// for hosts that are provisioned as part of the deployment itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResource {
    pub subscription_id: String,
    pub resource_group_name: String,
    pub resource_name: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TargetResource {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        resource_name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            resource_name: resource_name.into(),
            resource_type: resource_type.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the concrete resource has been resolved
    pub fn is_resolved(&self) -> bool {
        !self.resource_name.is_empty()
    }

    /// Fully qualified ARM resource id
    pub fn resource_id(&self) -> String {
        if self.resource_name.is_empty() {
            return format!(
                "/subscriptions/{}/resourceGroups/{}",
                self.subscription_id, self.resource_group_name
            );
        }
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription_id, self.resource_group_name, self.resource_type, self.resource_name
        )
    }
}
