use crate::app::App;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

pub async fn handle(environment: Option<&str>) -> anyhow::Result<()> {
    let app = App::load(environment, false)?;
    let services = app
        .importer
        .service_stable(&app.project, &CancellationToken::new())
        .await?;

    println!("プロジェクト: {}", app.project.name.cyan());
    println!();
    if services.is_empty() {
        println!("{}", "サービスが定義されていません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("{:<20} {:<20} {:<12} {:<40}", "NAME", "HOST", "LANGUAGE", "PATH").bold()
    );
    println!("{}", "─".repeat(92).dimmed());
    for service in &services {
        let language = service.language.to_string();
        println!(
            "{:<20} {:<20} {:<12} {:<40}",
            service.name.green(),
            service.host.to_string(),
            if language.is_empty() { "-" } else { language.as_str() },
            service.relative_path,
        );
    }
    Ok(())
}
