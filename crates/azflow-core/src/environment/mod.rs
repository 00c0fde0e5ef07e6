//! デプロイ環境
//!
//! 環境名と .env の値を保持し、展開値の解決元になります。
//! デプロイ処理が書き戻す値 (`SERVICE_API_IMAGE_NAME` など) もここに入ります。

mod dotenv;
mod store;

pub use dotenv::{parse_dotenv, serialize_dotenv};
pub use store::{DotenvStore, EnvironmentStore, MemoryStore};

use std::collections::{BTreeMap, BTreeSet};

pub const ENV_NAME_KEY: &str = "AZURE_ENV_NAME";
pub const SUBSCRIPTION_ID_KEY: &str = "AZURE_SUBSCRIPTION_ID";
pub const LOCATION_KEY: &str = "AZURE_LOCATION";
pub const TENANT_ID_KEY: &str = "AZURE_TENANT_ID";
pub const RESOURCE_GROUP_KEY: &str = "AZURE_RESOURCE_GROUP";
pub const CONTAINER_REGISTRY_ENDPOINT_KEY: &str = "AZURE_CONTAINER_REGISTRY_ENDPOINT";

/// 環境変数キーへの正規化 (大文字化、`-` を `_` に置換)
pub fn key(name: &str) -> String {
    name.replace('-', "_").to_uppercase()
}

/// サービス単位のキー: `SERVICE_<NAME>_<PROPERTY>`
pub fn service_property_key(service_name: &str, property: &str) -> String {
    format!("SERVICE_{}_{}", key(service_name), property)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    name: String,
    dotenv: BTreeMap<String, String>,
    deleted: BTreeSet<String>,
}

impl Environment {
    /// 新しい環境を作成 (`AZURE_ENV_NAME` を設定)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut dotenv = BTreeMap::new();
        dotenv.insert(ENV_NAME_KEY.to_string(), name.clone());
        Self {
            name,
            dotenv,
            deleted: BTreeSet::new(),
        }
    }

    /// 値付きで作成
    pub fn with_values<K, V>(name: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = Self::new(name);
        for (k, v) in values {
            env.dotenv.insert(k.into(), v.into());
        }
        env
    }

    pub(crate) fn from_dotenv(name: impl Into<String>, dotenv: BTreeMap<String, String>) -> Self {
        let mut env = Self::new(name);
        env.dotenv.extend(dotenv);
        env
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dotenv(&self) -> &BTreeMap<String, String> {
        &self.dotenv
    }

    pub(crate) fn deleted_keys(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    /// .env の値のみを参照
    pub fn get(&self, key: &str) -> Option<&str> {
        self.dotenv.get(key).map(String::as_str)
    }

    /// .env、プロセス環境変数の順に参照
    pub fn lookup_env(&self, key: &str) -> Option<String> {
        self.dotenv
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    /// `lookup_env` の結果、未設定なら空文字列
    pub fn getenv(&self, key: &str) -> String {
        self.lookup_env(key).unwrap_or_default()
    }

    pub fn dotenv_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.deleted.remove(&key);
        self.dotenv.insert(key, value.into());
    }

    pub fn dotenv_delete(&mut self, key: &str) {
        self.dotenv.remove(key);
        self.deleted.insert(key.to_string());
    }

    pub fn subscription_id(&self) -> String {
        self.getenv(SUBSCRIPTION_ID_KEY)
    }

    pub fn location(&self) -> String {
        self.getenv(LOCATION_KEY)
    }

    pub fn tenant_id(&self) -> String {
        self.getenv(TENANT_ID_KEY)
    }

    pub fn service_property(&self, service_name: &str, property: &str) -> String {
        self.getenv(&service_property_key(service_name, property))
    }

    pub fn set_service_property(&mut self, service_name: &str, property: &str, value: impl Into<String>) {
        self.dotenv_set(service_property_key(service_name, property), value);
    }

    /// `KEY=VALUE` 形式の一覧 (子プロセスへの受け渡し用)
    pub fn environ(&self) -> Vec<String> {
        self.dotenv
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}
