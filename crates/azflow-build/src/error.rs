use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed for {image}: {message}")]
    PushFailed { image: String, message: String },

    #[error("Pull failed for {image}: {message}")]
    PullFailed { image: String, message: String },

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Invalid image reference: {0}")]
    InvalidImage(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. Dockerfileのパスを確認してください\n\
                     2. azure.yaml で明示的にパスを指定してください:\n\
                        docker:\n\
                          path: ./path/to/Dockerfile",
                    path.display()
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容を確認してください。",
                    msg
                )
            }
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     azure.yaml の docker.context を確認してください。",
                    path.display()
                )
            }
            BuildError::DockerConnection(_) => {
                "Docker に接続できません。\n\
                 \n\
                 Docker Desktop または dockerd が起動しているか確認してください。"
                    .to_string()
            }
            BuildError::AuthFailed { registry, .. } => {
                format!(
                    "レジストリ {} の認証に失敗しました。\n\
                     \n\
                     `docker login {}` を実行するか、認証情報を確認してください。",
                    registry, registry
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
