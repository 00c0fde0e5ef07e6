//! リソース定義
//!
//! `resources` セクションのデータベース、メッセージング、ストレージ、
//! コンピュートホストと、その `uses` による依存関係を表します。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// リソース種別
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    DbRedis,
    DbPostgres,
    DbMySql,
    DbMongo,
    DbCosmos,
    HostContainerApp,
    MessagingServiceBus,
    MessagingEventHubs,
    MessagingKafka,
    Storage,
    KeyVault,
    OpenAiModel,
    Unknown(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::DbRedis => "db.redis",
            ResourceType::DbPostgres => "db.postgres",
            ResourceType::DbMySql => "db.mysql",
            ResourceType::DbMongo => "db.mongo",
            ResourceType::DbCosmos => "db.cosmos",
            ResourceType::HostContainerApp => "host.containerapp",
            ResourceType::MessagingServiceBus => "messaging.servicebus",
            ResourceType::MessagingEventHubs => "messaging.eventhubs",
            ResourceType::MessagingKafka => "messaging.kafka",
            ResourceType::Storage => "storage",
            ResourceType::KeyVault => "keyvault",
            ResourceType::OpenAiModel => "ai.openai.model",
            ResourceType::Unknown(name) => name,
        }
    }

    /// 表示名
    pub fn display_name(&self) -> &str {
        match self {
            ResourceType::DbRedis => "Redis",
            ResourceType::DbPostgres => "PostgreSQL",
            ResourceType::DbMySql => "MySQL",
            ResourceType::DbMongo => "MongoDB",
            ResourceType::DbCosmos => "CosmosDB",
            ResourceType::HostContainerApp => "Container App",
            ResourceType::MessagingServiceBus => "Service Bus",
            ResourceType::MessagingEventHubs => "Event Hubs",
            ResourceType::MessagingKafka => "Kafka",
            ResourceType::Storage => "Storage Account",
            ResourceType::KeyVault => "Key Vault",
            ResourceType::OpenAiModel => "Open AI Model",
            ResourceType::Unknown(name) => name,
        }
    }

    /// コンピュートホストか
    pub fn is_host(&self) -> bool {
        matches!(self, ResourceType::HostContainerApp)
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "db.redis" => ResourceType::DbRedis,
            "db.postgres" => ResourceType::DbPostgres,
            "db.mysql" => ResourceType::DbMySql,
            "db.mongo" => ResourceType::DbMongo,
            "db.cosmos" => ResourceType::DbCosmos,
            "host.containerapp" => ResourceType::HostContainerApp,
            "messaging.servicebus" => ResourceType::MessagingServiceBus,
            "messaging.eventhubs" => ResourceType::MessagingEventHubs,
            "messaging.kafka" => ResourceType::MessagingKafka,
            "storage" => ResourceType::Storage,
            "keyvault" => ResourceType::KeyVault,
            "ai.openai.model" => ResourceType::OpenAiModel,
            _ => ResourceType::Unknown(value),
        }
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// リソース定義
///
/// YAML形式：
/// ```yaml
/// resources:
///   api:
///     type: host.containerapp
///     port: 3100
///     uses:
///       - cache
///   cache:
///     type: db.redis
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// リソース名 (resources マップのキー)
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub uses: Vec<String>,
    /// 種別ごとのプロパティ
    #[serde(flatten)]
    pub props: BTreeMap<String, serde_yaml::Value>,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            name: name.into(),
            resource_type,
            uses: Vec::new(),
            props: BTreeMap::new(),
        }
    }

    pub fn with_uses<I, S>(mut self, uses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uses = uses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: serde_yaml::Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// プロパティを型付きで取り出す
    pub fn typed_props<T>(&self) -> std::result::Result<T, serde_yaml::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let mapping: serde_yaml::Mapping = self
            .props
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
            .collect();
        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
    }
}

fn default_port() -> i64 {
    80
}

/// host.containerapp のプロパティ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerAppProps {
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default)]
    pub env: Vec<ServiceEnvVar>,
}

/// コンテナに渡す環境変数 (`value` と `secret` はどちらか一方のみ)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub secret: String,
}

/// db.postgres / db.mysql / db.mongo のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProps {
    #[serde(default)]
    pub database_name: String,
}

/// db.cosmos のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmosDbProps {
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub containers: Vec<CosmosContainer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmosContainer {
    pub name: String,
    #[serde(default)]
    pub partition_keys: Vec<String>,
}

/// messaging.servicebus のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBusProps {
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// messaging.eventhubs のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventHubsProps {
    #[serde(default)]
    pub hubs: Vec<String>,
}

/// messaging.kafka のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaProps {
    #[serde(default)]
    pub topics: Vec<String>,
}

/// storage のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageProps {
    #[serde(default)]
    pub containers: Vec<String>,
}

/// ai.openai.model のプロパティ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiModelProps {
    #[serde(default)]
    pub model: AiModel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_roundtrip_names() {
        assert_eq!(ResourceType::from("db.redis".to_string()), ResourceType::DbRedis);
        assert_eq!(ResourceType::HostContainerApp.as_str(), "host.containerapp");
        assert_eq!(
            ResourceType::from("db.oracle".to_string()),
            ResourceType::Unknown("db.oracle".to_string())
        );
    }

    #[test]
    fn test_parse_container_app_props() {
        let yaml = r#"
type: host.containerapp
port: 3100
uses: [cache]
env:
  - name: REDIS_HOST
    value: ${REDIS_HOST}
  - name: API_KEY
    secret: ${apiKey}
"#;
        let resource: ResourceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(resource.resource_type, ResourceType::HostContainerApp);
        assert_eq!(resource.uses, vec!["cache".to_string()]);

        let props: ContainerAppProps = resource.typed_props().unwrap();
        assert_eq!(props.port, 3100);
        assert_eq!(props.env.len(), 2);
        assert_eq!(props.env[1].secret, "${apiKey}");
    }

    #[test]
    fn test_container_app_port_default() {
        let resource = ResourceConfig::new("api", ResourceType::HostContainerApp);
        let props: ContainerAppProps = resource.typed_props().unwrap();
        assert_eq!(props.port, 80);
    }
}
