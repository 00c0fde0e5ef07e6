//! サービス定義

use super::hooks::HooksConfig;
use super::project::InfraOptions;
use crate::expandable::ExpandableString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// デプロイ先のホスト種別
///
/// 組み込み以外の値は拡張機能が提供するホストとして `Custom` に入ります。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ServiceTargetKind {
    AppService,
    ContainerApp,
    /// アプリホストから取り込んだ .NET プロジェクト用の Container Apps
    DotnetContainerApp,
    Function,
    StaticWebApp,
    AiEndpoint,
    SpringApp,
    Custom(String),
}

impl ServiceTargetKind {
    /// 組み込みのホスト種別
    pub const BUILT_IN: [ServiceTargetKind; 7] = [
        ServiceTargetKind::AppService,
        ServiceTargetKind::ContainerApp,
        ServiceTargetKind::DotnetContainerApp,
        ServiceTargetKind::Function,
        ServiceTargetKind::StaticWebApp,
        ServiceTargetKind::AiEndpoint,
        ServiceTargetKind::SpringApp,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ServiceTargetKind::AppService => "appservice",
            ServiceTargetKind::ContainerApp => "containerapp",
            ServiceTargetKind::DotnetContainerApp => "containerapp-dotnet",
            ServiceTargetKind::Function => "function",
            ServiceTargetKind::StaticWebApp => "staticwebapp",
            ServiceTargetKind::AiEndpoint => "ai.endpoint",
            ServiceTargetKind::SpringApp => "springapp",
            ServiceTargetKind::Custom(name) => name,
        }
    }

    /// コンテナイメージとしてデプロイするホストか
    pub fn requires_container(&self) -> bool {
        matches!(
            self,
            ServiceTargetKind::ContainerApp | ServiceTargetKind::DotnetContainerApp
        )
    }

    /// リソースがまだ存在しなくてもよいホストか (後続のプロビジョニングで作られる)
    pub fn supports_delayed_provisioning(&self) -> bool {
        matches!(
            self,
            ServiceTargetKind::ContainerApp | ServiceTargetKind::DotnetContainerApp
        )
    }
}

impl FromStr for ServiceTargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim() {
            "" => return Err("host が指定されていません".to_string()),
            "appservice" => ServiceTargetKind::AppService,
            "containerapp" => ServiceTargetKind::ContainerApp,
            "containerapp-dotnet" => ServiceTargetKind::DotnetContainerApp,
            "function" => ServiceTargetKind::Function,
            "staticwebapp" => ServiceTargetKind::StaticWebApp,
            "ai.endpoint" => ServiceTargetKind::AiEndpoint,
            "springapp" => ServiceTargetKind::SpringApp,
            other => ServiceTargetKind::Custom(other.to_string()),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ServiceTargetKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceTargetKind> for String {
    fn from(value: ServiceTargetKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ServiceTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ソースコードの言語 / ビルドシステム
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceLanguageKind {
    /// 言語指定なし (ビルド済みイメージのみのサービス)
    #[default]
    None,
    Dotnet,
    Python,
    JavaScript,
    TypeScript,
    Java,
    Docker,
    Custom(String),
}

impl ServiceLanguageKind {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceLanguageKind::None => "",
            ServiceLanguageKind::Dotnet => "dotnet",
            ServiceLanguageKind::Python => "python",
            ServiceLanguageKind::JavaScript => "js",
            ServiceLanguageKind::TypeScript => "ts",
            ServiceLanguageKind::Java => "java",
            ServiceLanguageKind::Docker => "docker",
            ServiceLanguageKind::Custom(name) => name,
        }
    }
}

impl From<String> for ServiceLanguageKind {
    fn from(value: String) -> Self {
        match value.trim() {
            "" => ServiceLanguageKind::None,
            "dotnet" | "csharp" | "fsharp" => ServiceLanguageKind::Dotnet,
            "py" | "python" => ServiceLanguageKind::Python,
            "js" | "javascript" => ServiceLanguageKind::JavaScript,
            "ts" | "typescript" => ServiceLanguageKind::TypeScript,
            "java" => ServiceLanguageKind::Java,
            "docker" => ServiceLanguageKind::Docker,
            other => ServiceLanguageKind::Custom(other.to_string()),
        }
    }
}

impl From<ServiceLanguageKind> for String {
    fn from(value: ServiceLanguageKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ServiceLanguageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// コンテナビルド設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerOptions {
    /// Dockerfile のパス (サービスディレクトリからの相対)
    #[serde(default)]
    pub path: String,
    /// ビルドコンテキスト (サービスディレクトリからの相対)
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub registry: ExpandableString,
    #[serde(default)]
    pub image: ExpandableString,
    #[serde(default)]
    pub tag: ExpandableString,
    /// `KEY=VALUE` 形式のビルド引数
    #[serde(default)]
    pub build_args: Vec<ExpandableString>,
    #[serde(default)]
    pub remote_build: bool,
}

/// サービス定義
///
/// YAML形式：
/// ```yaml
/// services:
///   api:
///     project: ./src/api
///     host: containerapp
///     language: python
///     docker:
///       path: ./Dockerfile
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// サービス名 (services マップのキー)
    #[serde(skip)]
    pub name: String,
    /// 所属プロジェクト名
    #[serde(skip)]
    pub project_name: String,
    /// 所属プロジェクトのディレクトリ
    #[serde(skip)]
    pub project_path: PathBuf,
    /// 所属プロジェクトの resourceGroup
    #[serde(skip)]
    pub project_resource_group: ExpandableString,
    #[serde(default, rename = "resourceGroup")]
    pub resource_group_name: ExpandableString,
    #[serde(default)]
    pub resource_name: ExpandableString,
    /// ソースのパス (プロジェクトディレクトリからの相対)
    #[serde(default, rename = "project")]
    pub relative_path: String,
    pub host: ServiceTargetKind,
    #[serde(default)]
    pub language: ServiceLanguageKind,
    /// パッケージ対象のビルド出力 (サービスディレクトリからの相対)
    #[serde(default, rename = "dist")]
    pub output_path: String,
    /// ビルド済みイメージ
    #[serde(default)]
    pub image: ExpandableString,
    #[serde(default)]
    pub docker: DockerOptions,
    /// サービス単位のインフラ設定
    #[serde(default)]
    pub infra: Option<InfraOptions>,
    #[serde(default)]
    pub hooks: HooksConfig,
    /// ホスト固有の追加設定
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

impl ServiceConfig {
    /// 最小構成のサービスを作成
    pub fn new(name: impl Into<String>, host: ServiceTargetKind) -> Self {
        Self {
            name: name.into(),
            project_name: String::new(),
            project_path: PathBuf::new(),
            project_resource_group: ExpandableString::default(),
            resource_group_name: ExpandableString::default(),
            resource_name: ExpandableString::default(),
            relative_path: String::new(),
            host,
            language: ServiceLanguageKind::None,
            output_path: String::new(),
            image: ExpandableString::default(),
            docker: DockerOptions::default(),
            infra: None,
            hooks: HooksConfig::default(),
            config: BTreeMap::new(),
        }
    }

    /// サービスのソースディレクトリ (絶対パス)
    pub fn path(&self) -> PathBuf {
        let relative = PathBuf::from(&self.relative_path);
        if relative.is_absolute() {
            relative
        } else {
            self.project_path.join(relative)
        }
    }

    /// ビルド出力ディレクトリ。`dist` 未指定ならサービスディレクトリ
    pub fn output_dir(&self) -> PathBuf {
        if self.output_path.is_empty() {
            self.path()
        } else {
            self.path().join(&self.output_path)
        }
    }

    /// `config` の値を型付きで取り出す
    pub fn typed_config<T>(&self) -> std::result::Result<T, serde_yaml::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let mapping: serde_yaml::Mapping = self
            .config
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
            .collect();
        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_parse() {
        assert_eq!("containerapp".parse::<ServiceTargetKind>().unwrap(), ServiceTargetKind::ContainerApp);
        assert_eq!("ai.endpoint".parse::<ServiceTargetKind>().unwrap(), ServiceTargetKind::AiEndpoint);
        assert_eq!(
            "demo.host".parse::<ServiceTargetKind>().unwrap(),
            ServiceTargetKind::Custom("demo.host".to_string())
        );
        assert!("".parse::<ServiceTargetKind>().is_err());
    }

    #[test]
    fn test_requires_container() {
        assert!(ServiceTargetKind::ContainerApp.requires_container());
        assert!(!ServiceTargetKind::AppService.requires_container());
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!(ServiceLanguageKind::from("csharp".to_string()), ServiceLanguageKind::Dotnet);
        assert_eq!(ServiceLanguageKind::from("py".to_string()), ServiceLanguageKind::Python);
        assert_eq!(ServiceLanguageKind::from(String::new()), ServiceLanguageKind::None);
    }

    #[test]
    fn test_service_paths() {
        let mut svc = ServiceConfig::new("web", ServiceTargetKind::StaticWebApp);
        svc.project_path = PathBuf::from("/repo");
        svc.relative_path = "src/web".to_string();
        svc.output_path = "build".to_string();

        assert_eq!(svc.path(), PathBuf::from("/repo/src/web"));
        assert_eq!(svc.output_dir(), PathBuf::from("/repo/src/web/build"));
    }

    #[test]
    fn test_typed_config() {
        #[derive(Deserialize)]
        struct Endpoint {
            workspace: String,
        }

        let mut svc = ServiceConfig::new("ml", ServiceTargetKind::AiEndpoint);
        svc.config
            .insert("workspace".to_string(), serde_yaml::Value::String("ws".to_string()));
        let endpoint: Endpoint = svc.typed_config().unwrap();
        assert_eq!(endpoint.workspace, "ws");
    }
}
