use crate::app::App;
use crate::ui::StdinPrompt;
use azflow_project::{AlwaysOverwrite, DuplicatePrompt, KeepExisting, write_synthesized};
use colored::Colorize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// インフラ定義を生成してプロジェクト (または `output`) に書き出す
pub async fn synth(
    environment: Option<&str>,
    output: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let app = App::load(environment, false)?;
    println!("{}", "インフラ定義を生成中...".blue());

    let files = app
        .importer
        .synth_all_infrastructure(&app.project, &CancellationToken::new())
        .await?;
    let target = output.unwrap_or_else(|| app.project.path.clone());

    // 非対話環境では既存ファイルを残す
    let prompt: Box<dyn DuplicatePrompt> = if force {
        Box::new(AlwaysOverwrite)
    } else if std::io::stdin().is_terminal() {
        Box::new(StdinPrompt)
    } else {
        Box::new(KeepExisting)
    };

    let written = write_synthesized(&files, &target, prompt.as_ref()).await?;

    println!();
    for path in &written {
        println!("  {} {}", "✓".green(), path.display());
    }
    let skipped = files.paths().count() - written.len();
    if skipped > 0 {
        println!(
            "{}",
            format!("既存の {} 個のファイルはそのまま残しました (--force で上書き)", skipped).yellow()
        );
    }
    println!();
    println!(
        "{}",
        format!("{} 個のファイルを {} に生成しました", written.len(), target.display())
            .green()
            .bold()
    );
    Ok(())
}
