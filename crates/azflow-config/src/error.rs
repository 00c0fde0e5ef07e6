use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "azure.yaml が見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリとその親ディレクトリ: azure.yaml, azure.yml\n\
        または AZFLOW_PROJECT_FILE 環境変数で直接指定できます"
    )]
    ProjectFileNotFound,

    #[error(
        "環境が選択されていません\n\
        ヒント: --environment を指定するか、AZURE_ENV_NAME を設定してください"
    )]
    EnvironmentNotSelected,

    #[error("無効な環境名: '{0}' (英数字、'-'、'_' のみ使用できます)")]
    InvalidEnvironmentName(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
