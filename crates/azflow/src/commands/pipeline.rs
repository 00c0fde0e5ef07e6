//! restore / build / package / publish / deploy

use crate::app::App;
use crate::ui::SpinnerProgress;
use azflow_core::ServiceConfig;
use azflow_project::{OperationContext, RunOptions, ServicePhase};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// 対象サービスの指定方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Named(String),
    All,
    /// カレントディレクトリを含むサービス
    CurrentDir,
}

/// `through` までの各フェーズを対象サービスに対して実行
pub async fn run(
    environment: Option<&str>,
    selection: Selection,
    through: ServicePhase,
    options: RunOptions,
) -> anyhow::Result<()> {
    let app = App::load(environment, true)?;

    // Ctrl-C で実行中のフェーズをキャンセル
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let services = app.importer.service_stable(&app.project, &cancel).await?;
    let cwd = std::env::current_dir()?;
    let selected = select(services, selection, &cwd)?;

    println!("{}", format!("{} を開始します...", through).blue().bold());
    println!("環境: {}", app.env_name().await.cyan());
    if selected.is_empty() {
        println!("{}", "対象のサービスがありません".dimmed());
        return Ok(());
    }

    let progress = SpinnerProgress::new(&format!("{} 中...", through));
    let orchestrator = match app
        .orchestrator(&selected, OperationContext::new(&progress, &cancel))
        .await
    {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            progress.finish_and_clear();
            return Err(e);
        }
    };
    let results = orchestrator
        .run(&selected, through, &options, &progress, &cancel)
        .await;
    progress.finish_and_clear();

    println!();
    let mut failed = 0;
    for result in &results {
        match &result.result {
            Ok(ctx) => {
                println!("  {} {}", "✓".green(), result.service.bold());
                print!("{}", ctx.artifacts(through).to_display_string("    "));
            }
            Err(e) => {
                failed += 1;
                println!("  {} {}", "✗".red(), result.service.bold());
                println!("    {}", e.to_string().red());
            }
        }
    }

    // ターゲットが書き込んだ値 (イメージ名など) を保存
    app.save_env().await?;

    println!();
    if failed > 0 {
        anyhow::bail!(
            "{} 個中 {} 個のサービスで {} に失敗しました",
            results.len(),
            failed,
            through
        );
    }
    println!(
        "{}",
        format!("{} 個のサービスの {} が完了しました", results.len(), through)
            .green()
            .bold()
    );
    Ok(())
}

/// 指定に従ってサービスを絞り込む
pub fn select(
    services: Vec<ServiceConfig>,
    selection: Selection,
    cwd: &Path,
) -> anyhow::Result<Vec<ServiceConfig>> {
    match selection {
        Selection::All => Ok(services),
        Selection::Named(name) => {
            let available: Vec<String> = services.iter().map(|s| s.name.clone()).collect();
            services
                .into_iter()
                .find(|s| s.name == name)
                .map(|s| vec![s])
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "サービス '{}' が見つかりません。\n利用可能なサービス: {}",
                        name,
                        available.join(", ")
                    )
                })
        }
        Selection::CurrentDir => {
            let cwd = normalize(cwd);
            // 最も深いパスのサービスを優先
            services
                .into_iter()
                .map(|s| (normalize(&s.path()), s))
                .filter(|(path, _)| cwd.starts_with(path))
                .max_by_key(|(path, _)| path.components().count())
                .map(|(_, s)| vec![s])
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "現在のディレクトリに対応するサービスがありません\n\
                        ヒント: サービス名を指定するか --all を付けてください"
                    )
                })
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use azflow_core::ServiceTargetKind;

    fn services(root: &Path) -> Vec<ServiceConfig> {
        ["api", "web"]
            .into_iter()
            .map(|name| {
                let mut service = ServiceConfig::new(name, ServiceTargetKind::AppService);
                service.project_path = root.to_path_buf();
                service.relative_path = format!("src/{}", name);
                service
            })
            .collect()
    }

    #[test]
    fn test_select_named() {
        let root = tempfile::tempdir().unwrap();
        let selected = select(services(root.path()), Selection::Named("web".into()), root.path()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "web");
    }

    #[test]
    fn test_select_unknown_lists_available() {
        let root = tempfile::tempdir().unwrap();
        let err = select(services(root.path()), Selection::Named("worker".into()), root.path())
            .unwrap_err()
            .to_string();
        assert!(err.contains("'worker'"));
        assert!(err.contains("api, web"));
    }

    #[test]
    fn test_select_current_dir() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("src/api/handlers");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.path().join("src/web")).unwrap();

        let selected = select(services(root.path()), Selection::CurrentDir, &nested).unwrap();
        assert_eq!(selected[0].name, "api");

        // プロジェクト直下ではどのサービスにも該当しない
        assert!(select(services(root.path()), Selection::CurrentDir, root.path()).is_err());
    }

    #[test]
    fn test_select_all() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(select(services(root.path()), Selection::All, root.path()).unwrap().len(), 2);
    }
}
