mod app;
mod commands;
mod ui;

use azflow_project::{PackageOptions, PublishOptions, RunOptions, ServicePhase};
use clap::{Args, Parser, Subcommand, ValueEnum};
use commands::pipeline::{self, Selection};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "azflow")]
#[command(about = "azure.yaml のサービスをビルドしてクラウドへデプロイする", long_about = None)]
struct Cli {
    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 使用する環境名 (未指定なら AZURE_ENV_NAME、次に .azure/config.json)
    #[arg(short = 'e', long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// デプロイ対象のサービス一覧を表示
    Services,
    /// インフラ定義 (Bicep) の操作
    #[command(subcommand)]
    Infra(InfraCommands),
    /// 依存関係を復元
    Restore(ServiceArgs),
    /// サービスをビルド
    Build(ServiceArgs),
    /// デプロイ用のパッケージを作成
    Package {
        #[command(flatten)]
        target: ServiceArgs,
        /// パッケージの出力先 (拡張子付きならファイル、なければディレクトリ)
        #[arg(long)]
        output_path: Option<PathBuf>,
    },
    /// コンテナイメージをレジストリへプッシュ
    Publish {
        #[command(flatten)]
        target: ServiceArgs,
        /// プッシュ先のイメージ ([registry/]repository[:tag])
        #[arg(long)]
        to: Option<String>,
    },
    /// サービスをデプロイ
    Deploy(ServiceArgs),
    /// 環境変数 (.azure/<env>/.env) の操作
    #[command(subcommand)]
    Env(EnvCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum InfraCommands {
    /// resources またはアプリホストからインフラ定義を生成
    Synth {
        /// 出力先ディレクトリ (デフォルト: プロジェクトのディレクトリ)
        #[arg(long)]
        output: Option<PathBuf>,
        /// 既存ファイルを確認なしで上書き
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// 環境の値を一覧表示
    GetValues {
        /// 出力形式
        #[arg(long, value_enum, default_value = "dotenv")]
        output: OutputFormat,
    },
    /// 値を設定
    Set { key: String, value: String },
    /// デフォルト環境を選択
    Select { name: String },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Dotenv,
    Json,
}

#[derive(Args)]
struct ServiceArgs {
    /// 対象サービス名
    service: Option<String>,
    /// すべてのサービスを対象にする
    #[arg(long, conflicts_with = "service")]
    all: bool,
}

impl ServiceArgs {
    fn selection(self) -> Selection {
        match (self.service, self.all) {
            (Some(name), _) => Selection::Named(name),
            (None, true) => Selection::All,
            (None, false) => Selection::CurrentDir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG が優先、なければ --verbose に応じたデフォルト
    let default_level = if cli.verbose { "azflow=debug" } else { "azflow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドは azure.yaml 不要
    if matches!(cli.command, Commands::Version) {
        println!("azflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let environment = cli.environment.as_deref();

    match cli.command {
        Commands::Services => commands::services::handle(environment).await,
        Commands::Infra(InfraCommands::Synth { output, force }) => {
            commands::infra::synth(environment, output, force).await
        }
        Commands::Restore(target) => {
            pipeline::run(environment, target.selection(), ServicePhase::Restore, RunOptions::default()).await
        }
        Commands::Build(target) => {
            pipeline::run(environment, target.selection(), ServicePhase::Build, RunOptions::default()).await
        }
        Commands::Package {
            target,
            output_path,
        } => {
            let options = RunOptions {
                package: PackageOptions { output_path },
                ..Default::default()
            };
            pipeline::run(environment, target.selection(), ServicePhase::Package, options).await
        }
        Commands::Publish { target, to } => {
            let options = RunOptions {
                publish: PublishOptions { image: to },
                ..Default::default()
            };
            pipeline::run(environment, target.selection(), ServicePhase::Publish, options).await
        }
        Commands::Deploy(target) => {
            pipeline::run(environment, target.selection(), ServicePhase::Deploy, RunOptions::default()).await
        }
        Commands::Env(EnvCommands::GetValues { output }) => {
            commands::env::get_values(environment, output == OutputFormat::Json).await
        }
        Commands::Env(EnvCommands::Set { key, value }) => {
            commands::env::set(environment, &key, &value).await
        }
        Commands::Env(EnvCommands::Select { name }) => commands::env::select(&name),
        Commands::Version => unreachable!("Version is handled before loading the project"),
    }
}
