//! 環境の永続化

use super::Environment;
use super::dotenv::{parse_dotenv, serialize_dotenv};
use crate::error::{CoreError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// 環境の読み込みと保存
///
/// 並列にサービスをデプロイする場合、`save` の呼び出しは呼び出し側で直列化してください。
pub trait EnvironmentStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Environment>;
    fn save(&self, env: &Environment) -> Result<()>;
}

/// `.azure/<env>/.env` に保存するストア
#[derive(Debug, Clone)]
pub struct DotenvStore {
    root: PathBuf,
}

impl DotenvStore {
    /// `root` は `.azure` ディレクトリ
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// プロジェクトディレクトリから作成
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(".azure"))
    }

    pub fn env_file(&self, name: &str) -> PathBuf {
        self.root.join(name).join(".env")
    }

    fn read_values(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let path = self.env_file(name);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| CoreError::IoError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        parse_dotenv(&content).map_err(|(line, message)| CoreError::DotenvParse {
            name: name.to_string(),
            line,
            message,
        })
    }
}

impl EnvironmentStore for DotenvStore {
    fn load(&self, name: &str) -> Result<Environment> {
        let values = self.read_values(name)?;
        debug!(env = name, keys = values.len(), "Loaded environment");
        Ok(Environment::from_dotenv(name, values))
    }

    /// 保存時にディスク上の値を読み直し、削除キーを除いてから上書きします
    fn save(&self, env: &Environment) -> Result<()> {
        let mut values = self.read_values(env.name())?;
        for key in env.deleted_keys() {
            values.remove(key);
        }
        values.extend(env.dotenv().iter().map(|(k, v)| (k.clone(), v.clone())));

        let path = self.env_file(env.name());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serialize_dotenv(&values)).map_err(|e| CoreError::IoError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        debug!(env = env.name(), path = %path.display(), "Saved environment");
        Ok(())
    }
}

/// メモリ上のストア (永続化しない実行やテスト用)
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<BTreeMap<String, Environment>>,
    save_count: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `save` が呼ばれた回数
    pub fn save_count(&self) -> usize {
        self.save_count.lock().map(|count| *count).unwrap_or_default()
    }

    /// 最後に保存された環境
    pub fn saved(&self, name: &str) -> Option<Environment> {
        self.saved.lock().ok()?.get(name).cloned()
    }
}

impl EnvironmentStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Environment> {
        Ok(self.saved(name).unwrap_or_else(|| Environment::new(name)))
    }

    fn save(&self, env: &Environment) -> Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| CoreError::InvalidConfig("environment store lock poisoned".to_string()))?;
        saved.insert(env.name().to_string(), env.clone());
        if let Ok(mut count) = self.save_count.lock() {
            *count += 1;
        }
        Ok(())
    }
}
