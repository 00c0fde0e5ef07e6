//! azure.yaml と環境の読み込み、パイプラインの組み立て

use anyhow::Context;
use azflow_build::DockerEngine;
use azflow_cloud::{AzCli, ResourceManager, SharedEnvironment, share_environment};
use azflow_config::ConfigError;
use azflow_core::{DotenvStore, Environment, EnvironmentStore, ProjectConfig, ServiceConfig};
use azflow_project::{
    CommandRunner, ContainerHelper, DotnetImporter, InstalledExtension, FrameworkRegistry, HooksRunner,
    HostClients, ImportManager, OperationContext, Orchestrator, ProcessRunner, ServiceManager,
    TargetRegistry, load_extensions,
};
use std::sync::Arc;

pub struct App {
    pub project: ProjectConfig,
    pub env: SharedEnvironment,
    pub store: Arc<DotenvStore>,
    pub importer: ImportManager,
    runner: Arc<dyn CommandRunner>,
}

impl App {
    /// azure.yaml を探して読み込む
    ///
    /// `require_env` が false の場合、環境が未選択でも名前なしの環境で続行する。
    pub fn load(environment: Option<&str>, require_env: bool) -> anyhow::Result<Self> {
        let project_file = azflow_config::find_project_file()?;
        let project = azflow_core::load_project(&project_file)
            .with_context(|| format!("{} の読み込みに失敗しました", project_file.display()))?;
        tracing::debug!(project = %project.name, path = %project.path.display(), "Loaded project");

        let store = Arc::new(DotenvStore::for_project(&project.path));
        let env = match azflow_config::resolve_environment_name(environment, &project.path) {
            Ok(name) => store.load(&name)?,
            Err(ConfigError::EnvironmentNotSelected) if !require_env => Environment::new(""),
            Err(e) => return Err(e.into()),
        };
        let env = share_environment(env);

        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
        let importer = ImportManager::new(DotnetImporter::new(runner.clone(), env.clone()));

        Ok(Self {
            project,
            env,
            store,
            importer,
            runner,
        })
    }

    pub async fn env_name(&self) -> String {
        self.env.read().await.name().to_string()
    }

    /// Azure CLI と Docker を使う本番構成のオーケストレーター
    ///
    /// `services` が組み込みにない言語やホストを使う場合は、登録済みの拡張機能を起動して組み込む。
    pub async fn orchestrator(
        &self,
        services: &[ServiceConfig],
        op: OperationContext<'_>,
    ) -> anyhow::Result<Orchestrator> {
        let az = Arc::new(AzCli::new());
        let engine = Arc::new(DockerEngine::connect().context("Docker への接続に失敗しました")?);
        let store: Arc<dyn EnvironmentStore> = self.store.clone();

        let helper = Arc::new(ContainerHelper::new(
            self.env.clone(),
            store.clone(),
            engine,
            az.clone(),
        ));
        let mut frameworks = FrameworkRegistry::with_builtins(self.runner.clone(), helper.clone());
        let mut targets =
            TargetRegistry::with_builtins(HostClients::all(az.clone()), helper, self.env.clone(), store);

        let installed = installed_extensions(azflow_config::load_extensions()?);
        load_extensions(&installed, services, &mut frameworks, &mut targets, op)
            .await
            .context("拡張機能の起動に失敗しました")?;

        let resources = ResourceManager::new(self.env.clone(), az);
        let hooks = HooksRunner::new(self.runner.clone(), self.env.clone());

        let manager = ServiceManager::new(
            self.env.clone(),
            Arc::new(resources),
            Arc::new(frameworks),
            Arc::new(targets),
            hooks,
        );
        Ok(Orchestrator::new(Arc::new(manager)))
    }

    /// 環境の変更を .azure/<env>/.env に保存
    pub async fn save_env(&self) -> anyhow::Result<()> {
        let env = self.env.read().await;
        self.store.save(&env)?;
        Ok(())
    }
}

/// extensions.json の登録内容を言語・ホスト種別に変換
pub fn installed_extensions(config: azflow_config::ExtensionsConfig) -> Vec<InstalledExtension> {
    config
        .extensions
        .into_iter()
        .map(|entry| InstalledExtension {
            name: entry.name,
            program: entry.command,
            args: entry.args,
            languages: entry.languages.into_iter().map(Into::into).collect(),
            hosts: entry
                .hosts
                .into_iter()
                .filter_map(|host| host.parse().ok())
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use azflow_config::{ExtensionEntry, ExtensionsConfig};
    use azflow_core::{ServiceLanguageKind, ServiceTargetKind};

    #[test]
    fn test_installed_extensions() {
        let config = ExtensionsConfig {
            extensions: vec![ExtensionEntry {
                name: "rust".into(),
                command: "azflow-ext-rust".into(),
                args: vec!["--stdio".into()],
                languages: vec!["rust".into(), "py".into()],
                hosts: vec!["k8s".into(), "containerapp".into()],
            }],
        };

        let installed = installed_extensions(config);
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].program, "azflow-ext-rust");
        assert_eq!(installed[0].args, vec!["--stdio"]);
        // 別名は組み込みの種別に正規化される
        assert_eq!(
            installed[0].languages,
            vec![ServiceLanguageKind::Custom("rust".into()), ServiceLanguageKind::Python]
        );
        assert_eq!(
            installed[0].hosts,
            vec![ServiceTargetKind::Custom("k8s".into()), ServiceTargetKind::ContainerApp]
        );
    }
}
