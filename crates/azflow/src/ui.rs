//! 端末への進捗表示と確認プロンプト

use async_trait::async_trait;
use azflow_build::BuildProgress;
use azflow_project::{DuplicateChoice, DuplicatePrompt, ProgressSink, ServiceProgress};
use colored::Colorize;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;

/// スピナーに最新のメッセージを表示する
pub struct SpinnerProgress {
    spinner: BuildProgress,
}

impl SpinnerProgress {
    pub fn new(message: &str) -> Self {
        // パイプ出力時はスピナーを描画しない
        let spinner = if std::io::stderr().is_terminal() {
            BuildProgress::new(message)
        } else {
            BuildProgress::hidden()
        };
        Self { spinner }
    }

    pub fn finish_and_clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressSink for SpinnerProgress {
    fn report(&self, progress: ServiceProgress) {
        tracing::debug!("{}", progress.message);
        self.spinner.set_message(&progress.message);
    }
}

/// 既存ファイルを上書きするか標準入力で確認する
pub struct StdinPrompt;

#[async_trait]
impl DuplicatePrompt for StdinPrompt {
    async fn choose(&self, duplicates: &[PathBuf]) -> azflow_project::Result<DuplicateChoice> {
        println!("{}", "以下のファイルは既に存在します:".yellow());
        for path in duplicates {
            println!("  - {}", path.display());
        }
        print!("上書きしますか？ [y/N]: ");
        std::io::stdout().flush()?;

        let input = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|_| input)
        })
        .await
        .map_err(std::io::Error::other)??;

        if input.trim().eq_ignore_ascii_case("y") {
            Ok(DuplicateChoice::Overwrite)
        } else {
            Ok(DuplicateChoice::KeepExisting)
        }
    }
}
