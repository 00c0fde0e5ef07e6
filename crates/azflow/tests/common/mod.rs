use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_azure_yaml(&self, content: &str) {
        fs::write(self.root.path().join("azure.yaml"), content).unwrap();
    }

    /// `.azure/<env>/.env` を書き込む
    #[allow(dead_code)]
    pub fn write_env(&self, name: &str, content: &str) {
        let dir = self.root.path().join(".azure").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".env"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_file(&self, relative: &str, content: &str) {
        let path = self.root.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[allow(dead_code)]
    pub fn read_file(&self, relative: &str) -> String {
        fs::read_to_string(self.root.path().join(relative)).unwrap()
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクトディレクトリで実行する azflow コマンド
    ///
    /// 実行環境の環境変数に左右されないよう関連する変数を外す。
    #[allow(deprecated)]
    pub fn azflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("azflow").unwrap();
        cmd.current_dir(self.path())
            .env_remove("AZURE_ENV_NAME")
            .env_remove("AZFLOW_PROJECT_FILE")
            .env_remove("RUST_LOG");
        cmd
    }
}
