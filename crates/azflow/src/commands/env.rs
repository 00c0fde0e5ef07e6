use crate::app::App;
use azflow_core::environment::serialize_dotenv;
use colored::Colorize;

/// 環境の値を .env 形式 (または JSON) で出力
pub async fn get_values(environment: Option<&str>, json: bool) -> anyhow::Result<()> {
    let app = App::load(environment, true)?;
    let env = app.env.read().await;

    if json {
        println!("{}", serde_json::to_string_pretty(env.dotenv())?);
    } else {
        print!("{}", serialize_dotenv(env.dotenv()));
    }
    Ok(())
}

pub async fn set(environment: Option<&str>, key: &str, value: &str) -> anyhow::Result<()> {
    if key.is_empty() {
        anyhow::bail!("キーが空です");
    }

    let app = App::load(environment, true)?;
    app.env.write().await.dotenv_set(key, value);
    app.save_env().await?;
    tracing::info!(env = %app.env_name().await, key, "Saved environment value");
    Ok(())
}

/// `.azure/config.json` のデフォルト環境を切り替える
pub fn select(name: &str) -> anyhow::Result<()> {
    let project_file = azflow_config::find_project_file()?;
    let project_dir = project_file
        .parent()
        .ok_or_else(|| anyhow::anyhow!("プロジェクトのディレクトリが不明です"))?;

    azflow_config::set_default_environment(project_dir, name)?;
    println!("デフォルト環境: {}", name.cyan());
    Ok(())
}
