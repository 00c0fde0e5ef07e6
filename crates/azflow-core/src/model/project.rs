//! プロジェクト定義

use super::hooks::HooksConfig;
use super::resource::ResourceConfig;
use super::service::ServiceConfig;
use crate::expandable::ExpandableString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_INFRA_PROVIDER: &str = "bicep";
pub const DEFAULT_INFRA_PATH: &str = "infra";
pub const DEFAULT_INFRA_MODULE: &str = "main";

/// インフラ (IaC) の場所
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraOptions {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub module: String,
    /// 追加のレイヤー (名前付きの部分構成)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<InfraLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraLayer {
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub module: String,
}

impl InfraOptions {
    /// 空の項目をデフォルト値 (`bicep` / `infra` / `main`) で埋める
    pub fn with_defaults(mut self) -> Self {
        if self.provider.is_empty() {
            self.provider = DEFAULT_INFRA_PROVIDER.to_string();
        }
        if self.path.is_empty() {
            self.path = DEFAULT_INFRA_PATH.to_string();
        }
        if self.module.is_empty() {
            self.module = DEFAULT_INFRA_MODULE.to_string();
        }
        self
    }
}

/// プロジェクト定義 (azure.yaml のルート)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub name: String,
    /// azure.yaml があるディレクトリ
    #[serde(skip)]
    pub path: PathBuf,
    #[serde(default, rename = "resourceGroup")]
    pub resource_group_name: ExpandableString,
    #[serde(default)]
    pub infra: InfraOptions,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            resource_group_name: ExpandableString::default(),
            infra: InfraOptions::default().with_defaults(),
            services: BTreeMap::new(),
            resources: BTreeMap::new(),
            hooks: HooksConfig::default(),
        }
    }

    /// サービスを追加 (名前とプロジェクト情報を設定)
    pub fn add_service(&mut self, mut service: ServiceConfig) {
        service.project_name = self.name.clone();
        service.project_path = self.path.clone();
        service.project_resource_group = self.resource_group_name.clone();
        self.services.insert(service.name.clone(), service);
    }

    /// リソースを追加
    pub fn add_resource(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.name.clone(), resource);
    }

    /// 名前順のサービス一覧
    pub fn services_by_name(&self) -> Vec<&ServiceConfig> {
        let mut services: Vec<&ServiceConfig> = self.services.values().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }
}
