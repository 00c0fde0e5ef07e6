pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// プロジェクトファイル名の候補 (優先順)
pub const PROJECT_FILE_NAMES: [&str; 2] = ["azure.yaml", "azure.yml"];

/// 環境ディレクトリ名
pub const ENVIRONMENT_DIR_NAME: &str = ".azure";

/// 拡張機能の登録ファイル名 (設定ディレクトリ直下)
pub const EXTENSIONS_FILE_NAME: &str = "extensions.json";

/// azflow の設定ディレクトリパスを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("azflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの azure.yaml を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 AZFLOW_PROJECT_FILE (直接パス指定)
/// 2. カレントディレクトリ: azure.yaml, azure.yml
/// 3. 親ディレクトリを順にさかのぼって同様に検索
pub fn find_project_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(project_file) = std::env::var("AZFLOW_PROJECT_FILE") {
        let path = PathBuf::from(project_file);
        if path.exists() {
            return Ok(path);
        }
        tracing::debug!("AZFLOW_PROJECT_FILE does not exist: {}", path.display());
    }

    let current_dir = std::env::current_dir()?;
    find_project_file_from(&current_dir)
}

/// `start` から親方向に azure.yaml を探す
pub fn find_project_file_from(start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        for filename in &PROJECT_FILE_NAMES {
            let path = dir.join(filename);
            if path.is_file() {
                return Ok(path);
            }
        }
    }

    // どのディレクトリにも見つからなかった
    Err(ConfigError::ProjectFileNotFound)
}

/// `.azure/config.json` の内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_environment: Option<String>,
}

fn default_version() -> u32 {
    1
}

/// プロジェクトの `.azure` ディレクトリ
pub fn environment_root(project_dir: &Path) -> PathBuf {
    project_dir.join(ENVIRONMENT_DIR_NAME)
}

/// `.azure/config.json` を読み込む (存在しなければデフォルト)
pub fn load_local_config(project_dir: &Path) -> Result<LocalConfig> {
    let path = environment_root(project_dir).join("config.json");
    if !path.exists() {
        return Ok(LocalConfig {
            version: default_version(),
            default_environment: None,
        });
    }

    let content = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// デフォルト環境を設定して `.azure/config.json` に保存
pub fn set_default_environment(project_dir: &Path, name: &str) -> Result<()> {
    validate_environment_name(name)?;

    let mut config = load_local_config(project_dir)?;
    config.default_environment = Some(name.to_string());

    let root = environment_root(project_dir);
    std::fs::create_dir_all(&root)?;
    std::fs::write(root.join("config.json"), serde_json::to_string_pretty(&config)?)?;
    Ok(())
}

/// 登録済みの拡張機能
///
/// `languages` / `hosts` に挙げた言語とホストを、組み込みで対応していない場合に提供する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionEntry {
    pub name: String,
    /// 起動するコマンド
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// `extensions.json` の内容
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub extensions: Vec<ExtensionEntry>,
}

/// 設定ディレクトリの `extensions.json` を読み込む
pub fn load_extensions() -> Result<ExtensionsConfig> {
    load_extensions_from(&get_config_dir()?)
}

/// `dir/extensions.json` を読み込む (存在しなければ空)
pub fn load_extensions_from(dir: &Path) -> Result<ExtensionsConfig> {
    let path = dir.join(EXTENSIONS_FILE_NAME);
    if !path.exists() {
        return Ok(ExtensionsConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: ExtensionsConfig = serde_json::from_str(&content)?;
    tracing::debug!(count = config.extensions.len(), "Loaded extensions from {}", path.display());
    Ok(config)
}

/// 使用する環境名を決定
///
/// 以下の優先順位:
/// 1. コマンドライン引数 (--environment)
/// 2. 環境変数 AZURE_ENV_NAME
/// 3. `.azure/config.json` の defaultEnvironment
pub fn resolve_environment_name(flag: Option<&str>, project_dir: &Path) -> Result<String> {
    let name = match flag.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => match std::env::var("AZURE_ENV_NAME").ok().filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => load_local_config(project_dir)?
                .default_environment
                .ok_or(ConfigError::EnvironmentNotSelected)?,
        },
    };

    validate_environment_name(&name)?;
    Ok(name)
}

/// 環境名の検証 (英数字、`-`、`_`、最大64文字)
pub fn validate_environment_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvironmentName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let result = get_config_dir();
        assert!(result.is_ok());

        let config_dir = result.unwrap();
        assert!(config_dir.ends_with("azflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_project_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("azure.yaml"), "name: test").unwrap();

        // テンポラリディレクトリに移動
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_project_file();
        assert!(result.is_ok());
        assert!(result.unwrap().ends_with("azure.yaml"));

        // 元のディレクトリに戻る
        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_find_project_file_yaml_priority() {
        let temp_dir = tempfile::tempdir().unwrap();

        // azure.yaml と azure.yml の両方を作成
        fs::write(temp_dir.path().join("azure.yml"), "name: yml").unwrap();
        fs::write(temp_dir.path().join("azure.yaml"), "name: yaml").unwrap();

        let result = find_project_file_from(temp_dir.path()).unwrap();

        // azure.yaml が優先される
        assert!(result.ends_with("azure.yaml"));
    }

    #[test]
    fn test_find_project_file_in_parent_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("azure.yaml"), "name: parent").unwrap();

        let nested = temp_dir.path().join("src").join("api");
        fs::create_dir_all(&nested).unwrap();

        let result = find_project_file_from(&nested).unwrap();
        assert_eq!(result, temp_dir.path().join("azure.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_project_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_path = temp_dir.path().join("custom.yaml");
        fs::write(&project_path, "name: custom").unwrap();

        // 環境変数を設定
        unsafe {
            std::env::set_var("AZFLOW_PROJECT_FILE", project_path.to_str().unwrap());
        }

        let result = find_project_file().unwrap();
        assert_eq!(result, project_path);

        // クリーンアップ
        unsafe {
            std::env::remove_var("AZFLOW_PROJECT_FILE");
        }
    }

    #[test]
    fn test_find_project_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("empty");
        fs::create_dir(&nested).unwrap();

        // 一時ディレクトリの祖先に azure.yaml がない前提
        let result = find_project_file_from(&nested);
        if let Ok(found) = &result {
            assert!(!found.starts_with(temp_dir.path()));
        } else {
            assert!(matches!(result, Err(ConfigError::ProjectFileNotFound)));
        }
    }

    #[test]
    #[serial]
    fn test_resolve_environment_name_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        set_default_environment(temp_dir.path(), "dev").unwrap();

        unsafe {
            std::env::remove_var("AZURE_ENV_NAME");
        }
        // フラグが最優先
        assert_eq!(resolve_environment_name(Some("prod"), temp_dir.path()).unwrap(), "prod");
        // config.json の defaultEnvironment
        assert_eq!(resolve_environment_name(None, temp_dir.path()).unwrap(), "dev");

        unsafe {
            std::env::set_var("AZURE_ENV_NAME", "staging");
        }
        assert_eq!(resolve_environment_name(None, temp_dir.path()).unwrap(), "staging");

        unsafe {
            std::env::remove_var("AZURE_ENV_NAME");
        }
    }

    #[test]
    #[serial]
    fn test_resolve_environment_name_not_selected() {
        let temp_dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::remove_var("AZURE_ENV_NAME");
        }

        let result = resolve_environment_name(None, temp_dir.path());
        assert!(matches!(result, Err(ConfigError::EnvironmentNotSelected)));
    }

    #[test]
    fn test_load_extensions_from() {
        let temp_dir = tempfile::tempdir().unwrap();

        // ファイルがなければ空
        assert!(load_extensions_from(temp_dir.path()).unwrap().extensions.is_empty());

        fs::write(
            temp_dir.path().join(EXTENSIONS_FILE_NAME),
            r#"{"extensions": [{"name": "rust", "command": "azflow-ext-rust", "languages": ["rust"]}]}"#,
        )
        .unwrap();
        let config = load_extensions_from(temp_dir.path()).unwrap();
        assert_eq!(config.extensions.len(), 1);
        let entry = &config.extensions[0];
        assert_eq!(entry.command, "azflow-ext-rust");
        assert_eq!(entry.languages, vec!["rust"]);
        assert!(entry.args.is_empty());
        assert!(entry.hosts.is_empty());
    }

    #[test]
    fn test_load_extensions_invalid_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(EXTENSIONS_FILE_NAME), "{").unwrap();
        assert!(matches!(
            load_extensions_from(temp_dir.path()),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_validate_environment_name() {
        assert!(validate_environment_name("dev-01_a").is_ok());
        assert!(validate_environment_name("bad name").is_err());
        assert!(validate_environment_name("").is_err());
    }
}
