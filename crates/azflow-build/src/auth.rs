//! レジストリ認証処理
//!
//! `login` で登録された認証情報、または Docker config.json から認証情報を取得し、
//! Bollard の DockerCredentials に変換します。

use crate::error::{BuildError, Result};
use crate::image::ContainerImage;
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;

const DOCKER_HUB: &str = "docker.io";

/// Docker config.json の構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    /// credential helper 名 (例: "osxkeychain", "desktop")
    #[serde(default)]
    creds_store: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    /// Base64エンコードされた "username:password"
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialResponse {
    username: String,
    secret: String,
}

/// レジストリのユーザー名とパスワード (アクセストークン)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl RegistryCredential {
    fn to_docker(&self) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            serveraddress: Some(self.server.clone()),
            ..Default::default()
        }
    }
}

/// レジストリ認証を管理
#[derive(Debug)]
pub struct RegistryAuth {
    config_path: PathBuf,
    logins: Mutex<HashMap<String, RegistryCredential>>,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// デフォルトで `$DOCKER_CONFIG/config.json` または ~/.docker/config.json を使用
    pub fn new() -> Self {
        let config_path = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            })
            .join("config.json");

        Self::with_config_path(config_path)
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        Self {
            config_path,
            logins: Mutex::new(HashMap::new()),
        }
    }

    /// `login` で得た認証情報を登録 (config.json より優先)
    pub fn register(&self, credential: RegistryCredential) {
        tracing::debug!(registry = %credential.server, "Registered registry credentials");
        if let Ok(mut logins) = self.logins.lock() {
            logins.insert(credential.server.clone(), credential);
        }
    }

    /// イメージの参照先レジストリの認証情報
    ///
    /// `login` 済みの認証情報、config.json の `auths`、credential helper の順に探す。
    /// 見つからなければ `Ok(None)` (匿名でプッシュを試みる)。
    pub fn get_credentials(&self, image: &str) -> Result<Option<DockerCredentials>> {
        let registry = extract_registry(image);

        let logged_in = self
            .logins
            .lock()
            .ok()
            .and_then(|logins| logins.get(&registry).cloned());
        if let Some(credential) = logged_in {
            return Ok(Some(credential.to_docker()));
        }

        let Some(config) = self.docker_config()? else {
            return Ok(None);
        };

        if let Some(encoded) = config.auths.get(&registry).and_then(|e| e.auth.as_deref()) {
            let credential = decode_auth(encoded, &registry)?;
            if credential.is_some() {
                tracing::debug!(registry = %registry, "Using credentials from config.json");
                return Ok(credential.map(|c| c.to_docker()));
            }
        }

        match &config.creds_store {
            Some(helper) => Ok(from_helper(helper, &registry)
                .inspect_err(|e| tracing::debug!(registry = %registry, error = %e, "Credential helper failed"))
                .ok()
                .flatten()
                .map(|c| c.to_docker())),
            None => Ok(None),
        }
    }

    /// config.json (存在しなければ `None`)
    fn docker_config(&self) -> Result<Option<DockerConfig>> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No Docker config");
            return Ok(None);
        }
        let source = self.config_path.display().to_string();
        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| auth_error(&source, format!("reading config.json: {e}")))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| auth_error(&source, format!("parsing config.json: {e}")))
    }
}

/// イメージ名からレジストリを抽出 (レジストリなしは Docker Hub)
pub fn extract_registry(image: &str) -> String {
    match ContainerImage::parse(image) {
        Ok(parsed) if !parsed.registry.is_empty() => parsed.registry,
        _ => DOCKER_HUB.to_string(),
    }
}

fn auth_error(registry: &str, message: String) -> BuildError {
    BuildError::AuthFailed {
        registry: registry.to_string(),
        message,
    }
}

/// `auths` の base64 "username:password"
fn decode_auth(encoded: &str, registry: &str) -> Result<Option<RegistryCredential>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| auth_error(registry, format!("decoding auth: {e}")))?;
    let pair = String::from_utf8(bytes).map_err(|e| auth_error(registry, format!("auth is not UTF-8: {e}")))?;

    Ok(pair.split_once(':').map(|(username, password)| RegistryCredential {
        server: registry.to_string(),
        username: username.to_string(),
        password: password.to_string(),
    }))
}

/// `docker-credential-<helper> get` にレジストリ名を渡して問い合わせる
fn from_helper(helper: &str, registry: &str) -> Result<Option<RegistryCredential>> {
    let program = format!("docker-credential-{helper}");
    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| auth_error(registry, format!("running {program}: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(registry.as_bytes())
            .map_err(|e| auth_error(registry, format!("writing to {program}: {e}")))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| auth_error(registry, format!("waiting for {program}: {e}")))?;
    if !output.status.success() {
        // 未登録のレジストリでも非ゼロ終了する
        return Ok(None);
    }

    let response: CredentialResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| auth_error(registry, format!("parsing {program} output: {e}")))?;
    Ok(Some(RegistryCredential {
        server: registry.to_string(),
        username: response.username,
        password: response.secret,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_extract_registry() {
        assert_eq!(extract_registry("myacr.azurecr.io/todo/api:v1"), "myacr.azurecr.io");
        assert_eq!(extract_registry("localhost:5000/myapp"), "localhost:5000");
        assert_eq!(extract_registry("myuser/app:latest"), "docker.io");
        assert_eq!(extract_registry("nginx"), "docker.io");
    }

    #[test]
    fn test_registered_login_takes_priority() {
        let temp_dir = tempdir().unwrap();
        let auth = RegistryAuth::with_config_path(temp_dir.path().join("config.json"));

        assert!(auth.get_credentials("myacr.azurecr.io/app:v1").unwrap().is_none());

        auth.register(RegistryCredential {
            server: "myacr.azurecr.io".to_string(),
            username: "00000000-0000-0000-0000-000000000000".to_string(),
            password: "token".to_string(),
        });

        let creds = auth.get_credentials("myacr.azurecr.io/app:v1").unwrap().unwrap();
        assert_eq!(creds.password.as_deref(), Some("token"));
        assert_eq!(creds.serveraddress.as_deref(), Some("myacr.azurecr.io"));
    }

    #[test]
    fn test_credentials_from_config_json() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.json");
        // "user:pass"
        fs::write(
            &config_path,
            r#"{"auths":{"ghcr.io":{"auth":"dXNlcjpwYXNz"}}}"#,
        )
        .unwrap();

        let auth = RegistryAuth::with_config_path(config_path);
        let creds = auth.get_credentials("ghcr.io/org/app").unwrap().unwrap();
        assert_eq!(creds.username.as_deref(), Some("user"));
        assert_eq!(creds.password.as_deref(), Some("pass"));

        assert!(auth.get_credentials("other.io/app").unwrap().is_none());
    }
}
