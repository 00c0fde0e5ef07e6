//! azure.yaml の読み込み
//!
//! パース後に正規化 (名前の設定、言語とインフラのデフォルト、パス区切りの統一、
//! `<module>.hooks.yaml` のマージ) を行います。

use crate::error::{CoreError, Result};
use crate::model::{HooksConfig, ProjectConfig, ServiceLanguageKind, merge_hooks};
use std::path::Path;
use tracing::{debug, info, instrument};

/// azure.yaml を読み込んで正規化
#[instrument(fields(path = %path.display()))]
pub fn load_project(path: &Path) -> Result<ProjectConfig> {
    info!("Loading project manifest");

    let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let manifest_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let project = parse_project(&content, manifest_dir).map_err(|e| match e {
        CoreError::Yaml(source) => CoreError::ManifestParse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;

    info!(
        project = %project.name,
        services = project.services.len(),
        resources = project.resources.len(),
        "Project loaded"
    );
    Ok(project)
}

/// 文字列から読み込み (`manifest_dir` は azure.yaml があるディレクトリ)
#[instrument(skip(content), fields(manifest_dir = %manifest_dir.display()))]
pub fn parse_project(content: &str, manifest_dir: &Path) -> Result<ProjectConfig> {
    let mut project: ProjectConfig = serde_yaml::from_str(content)?;

    if project.name.trim().is_empty() {
        return Err(CoreError::InvalidConfig(
            "azure.yaml の name が空です".to_string(),
        ));
    }

    project.path = manifest_dir.to_path_buf();
    project.infra = project.infra.with_defaults();

    for (name, service) in project.services.iter_mut() {
        service.name = name.clone();
        service.project_name = project.name.clone();
        service.project_path = project.path.clone();
        service.project_resource_group = project.resource_group_name.clone();
        service.relative_path = service.relative_path.replace('\\', "/");
        service.output_path = service.output_path.replace('\\', "/");

        // 言語未指定かつビルド済みイメージもない場合は .NET とみなす
        if service.language == ServiceLanguageKind::None && service.image.is_empty() {
            service.language = ServiceLanguageKind::Dotnet;
        }

        debug!(
            service = %name,
            host = %service.host,
            language = %service.language,
            "Normalized service"
        );
    }

    for (name, resource) in project.resources.iter_mut() {
        resource.name = name.clone();
    }

    if let Some(external) = load_infra_hooks(&project)? {
        merge_hooks(&mut project.hooks, external);
    }

    Ok(project)
}

/// インフラモジュール横の `<module>.hooks.yaml` を読み込む
fn load_infra_hooks(project: &ProjectConfig) -> Result<Option<HooksConfig>> {
    let infra_dir = project.path.join(&project.infra.path);
    for ext in ["yaml", "yml"] {
        let hooks_path = infra_dir.join(format!("{}.hooks.{}", project.infra.module, ext));
        if !hooks_path.is_file() {
            continue;
        }

        debug!(file = %hooks_path.display(), "Merging infrastructure hooks");
        let content = std::fs::read_to_string(&hooks_path).map_err(|e| CoreError::IoError {
            path: hooks_path.clone(),
            message: e.to_string(),
        })?;
        let hooks: HooksConfig =
            serde_yaml::from_str(&content).map_err(|source| CoreError::ManifestParse {
                path: hooks_path.clone(),
                source,
            })?;
        return Ok(Some(hooks));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceType, ServiceTargetKind};
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
name: todo
resourceGroup: rg-${AZURE_ENV_NAME}
services:
  web:
    project: src\web
    host: staticwebapp
    language: ts
    dist: build
  api:
    project: ./src/api
    host: containerapp
    language: python
    docker:
      path: ./Dockerfile
      registry: ${AZURE_CONTAINER_REGISTRY_ENDPOINT}
  worker:
    host: containerapp
    image: nginx:latest
  legacy:
    project: ./src/legacy
    host: appservice
resources:
  cache:
    type: db.redis
  app:
    type: host.containerapp
    uses: [cache]
hooks:
  predeploy:
    run: echo manifest
"#;

    #[test]
    fn test_parse_project_normalizes_services() {
        let project = parse_project(MANIFEST, Path::new("/repo")).unwrap();

        assert_eq!(project.name, "todo");
        assert_eq!(project.resource_group_name.template(), "rg-${AZURE_ENV_NAME}");

        let web = &project.services["web"];
        assert_eq!(web.name, "web");
        assert_eq!(web.relative_path, "src/web");
        assert_eq!(web.host, ServiceTargetKind::StaticWebApp);
        assert_eq!(web.language, ServiceLanguageKind::TypeScript);
        assert_eq!(web.project_path, Path::new("/repo"));

        let api = &project.services["api"];
        assert_eq!(api.docker.path, "./Dockerfile");
        assert_eq!(api.docker.registry.template(), "${AZURE_CONTAINER_REGISTRY_ENDPOINT}");

        // ビルド済みイメージのみのサービスは言語なし
        assert_eq!(project.services["worker"].language, ServiceLanguageKind::None);
        // 言語未指定は .NET
        assert_eq!(project.services["legacy"].language, ServiceLanguageKind::Dotnet);
    }

    #[test]
    fn test_parse_project_defaults_infra() {
        let project = parse_project(MANIFEST, Path::new("/repo")).unwrap();
        assert_eq!(project.infra.provider, "bicep");
        assert_eq!(project.infra.path, "infra");
        assert_eq!(project.infra.module, "main");
    }

    #[test]
    fn test_parse_project_resources() {
        let project = parse_project(MANIFEST, Path::new("/repo")).unwrap();
        assert_eq!(project.resources["cache"].name, "cache");
        assert_eq!(project.resources["cache"].resource_type, ResourceType::DbRedis);
        assert_eq!(project.resources["app"].uses, vec!["cache".to_string()]);
    }

    #[test]
    fn test_parse_project_requires_name() {
        let result = parse_project("services: {}\n", Path::new("/repo"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_project_merges_infra_hooks() {
        let temp_dir = tempdir().unwrap();
        let manifest = temp_dir.path().join("azure.yaml");
        fs::write(&manifest, MANIFEST).unwrap();

        let infra_dir = temp_dir.path().join("infra");
        fs::create_dir(&infra_dir).unwrap();
        fs::write(
            infra_dir.join("main.hooks.yaml"),
            "predeploy:\n  run: echo infra\npostprovision:\n  run: echo done\n",
        )
        .unwrap();

        let project = load_project(&manifest).unwrap();
        let runs: Vec<&str> = project.hooks["predeploy"]
            .0
            .iter()
            .map(|h| h.run.as_str())
            .collect();
        assert_eq!(runs, vec!["echo manifest", "echo infra"]);
        assert!(project.hooks.contains_key("postprovision"));
        assert_eq!(project.path, temp_dir.path());
    }

    #[test]
    fn test_load_project_reports_parse_error_path() {
        let temp_dir = tempdir().unwrap();
        let manifest = temp_dir.path().join("azure.yaml");
        fs::write(&manifest, "name: [unclosed").unwrap();

        let err = load_project(&manifest).unwrap_err();
        assert!(matches!(err, CoreError::ManifestParse { .. }));
    }
}
