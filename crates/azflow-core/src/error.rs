use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("azure.yaml のパースエラー: {path}\n理由: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML エラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("必須の変数 '{name}' が設定されていません: {message}")]
    RequiredVariable { name: String, message: String },

    #[error("環境 '{name}' の .env を解析できません ({line} 行目): {message}")]
    DotenvParse {
        name: String,
        line: usize,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
