//! Importer for .NET app host projects
//!
//! An app host describes a whole distributed application. Its manifest (produced by
//! `dotnet run --publisher manifest`) is translated into services and infrastructure.

use super::Infra;
use super::synth::bicep_expression;
use crate::command::{CommandRunner, RunArgs};
use crate::error::{Result, ResultExt};
use crate::scaffold::{
    self, Backend, Frontend, InfraSpec, MemoryFs, ServiceReference, ServiceSpec, alpha_snake_upper,
    bicep_name, container_app_name,
};
use azflow_cloud::SharedEnvironment;
use azflow_core::{
    DEFAULT_INFRA_MODULE, ExpandableString, ProjectConfig, ServiceConfig, ServiceLanguageKind,
    ServiceTargetKind,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_TARGET_PORT: i64 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppHostManifest {
    #[serde(default)]
    pub resources: BTreeMap<String, ManifestResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: Option<String>,
    pub context: Option<String>,
    pub image: Option<String>,
    pub value: Option<String>,
    pub build: Option<ContainerBuild>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Binding>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Input>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerBuild {
    pub context: String,
    pub dockerfile: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub target_port: Option<i64>,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Input {
    #[serde(default)]
    pub secret: bool,
}

impl ManifestResource {
    /// Whether the resource is deployed as a container app
    pub fn is_service(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "project.v0" | "project.v1" | "dockerfile.v0" | "container.v0" | "container.v1"
        )
    }

    fn target_port(&self) -> i64 {
        self.bindings
            .values()
            .find_map(|b| b.target_port)
            .unwrap_or(DEFAULT_TARGET_PORT)
    }
}

impl AppHostManifest {
    pub fn parse(content: &str, manifest_dir: &Path) -> Result<Self> {
        let mut manifest: AppHostManifest = serde_json::from_str(content)?;
        for resource in manifest.resources.values_mut() {
            for path in [&mut resource.path, &mut resource.context] {
                if let Some(p) = path {
                    *p = resolve(manifest_dir, p).to_string_lossy().into_owned();
                }
            }
            if let Some(build) = &mut resource.build {
                build.context = resolve(manifest_dir, &build.context).to_string_lossy().into_owned();
                build.dockerfile = resolve(manifest_dir, &build.dockerfile)
                    .to_string_lossy()
                    .into_owned();
            }
        }
        Ok(manifest)
    }

    fn services(&self) -> impl Iterator<Item = (&String, &ManifestResource)> {
        self.resources.iter().filter(|(_, r)| r.is_service())
    }
}

/// `base/relative` with `.` and `..` removed without touching the file system
fn resolve(base: &Path, relative: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in base.join(relative).components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type ManifestKey = (PathBuf, String);

/// Imports services and infrastructure from a .NET app host
pub struct DotnetImporter {
    runner: Arc<dyn CommandRunner>,
    env: SharedEnvironment,
    manifests: Mutex<HashMap<ManifestKey, Arc<AppHostManifest>>>,
    host_checks: Mutex<HashMap<PathBuf, bool>>,
}

impl DotnetImporter {
    pub fn new(runner: Arc<dyn CommandRunner>, env: SharedEnvironment) -> Self {
        Self {
            runner,
            env,
            manifests: Mutex::new(HashMap::new()),
            host_checks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the project at `path` is an app host; answers are cached per path
    pub async fn can_import(&self, path: &Path, cancel: &CancellationToken) -> Result<bool> {
        let cached = lock(&self.host_checks).get(path).copied();
        if let Some(is_host) = cached {
            return Ok(is_host);
        }

        let args = RunArgs::new(
            "dotnet",
            [
                "msbuild".to_string(),
                path.to_string_lossy().into_owned(),
                "-getProperty:IsAspireHost".to_string(),
            ],
        );
        let result = self.runner.run(&args, cancel).await?;
        let is_host = result.stdout.trim().eq_ignore_ascii_case("true");

        debug!(path = %path.display(), is_host, "Checked for app host project");
        lock(&self.host_checks).insert(path.to_path_buf(), is_host);
        Ok(is_host)
    }

    /// Manifest of the app host service, cached per path and `DOTNET_ENVIRONMENT`
    pub async fn read_manifest(
        &self,
        app_host: &ServiceConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<AppHostManifest>> {
        let dotnet_env = self.env.read().await.getenv("DOTNET_ENVIRONMENT");
        let key = (app_host.path(), dotnet_env);
        let cached = lock(&self.manifests).get(&key).cloned();
        if let Some(manifest) = cached {
            return Ok(manifest);
        }

        let manifest = self
            .generate_manifest(&key.0, &key.1, cancel)
            .await
            .context("generating app host manifest")?;

        let mut manifests = lock(&self.manifests);
        Ok(Arc::clone(manifests.entry(key).or_insert_with(|| Arc::new(manifest))))
    }

    async fn generate_manifest(
        &self,
        project: &Path,
        dotnet_env: &str,
        cancel: &CancellationToken,
    ) -> Result<AppHostManifest> {
        info!(project = %project.display(), "Generating app host manifest");

        let dir = tempfile::tempdir()?;
        let output = dir.path().join("manifest.json");
        let mut args = RunArgs::new(
            "dotnet",
            [
                "run".to_string(),
                "--project".to_string(),
                project.to_string_lossy().into_owned(),
                "--publisher".to_string(),
                "manifest".to_string(),
                "--output-path".to_string(),
                output.to_string_lossy().into_owned(),
            ],
        );
        if !dotnet_env.is_empty() {
            args = args.with_env(vec![format!("DOTNET_ENVIRONMENT={}", dotnet_env)]);
        }
        self.runner.run(&args, cancel).await?;

        let content = tokio::fs::read_to_string(&output).await?;
        AppHostManifest::parse(&content, dir.path())
    }

    /// One service per deployable manifest resource
    pub async fn services(
        &self,
        project: &ProjectConfig,
        app_host: &ServiceConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceConfig>> {
        let manifest = self.read_manifest(app_host, cancel).await?;
        let mut services = Vec::new();

        for (name, resource) in manifest.services() {
            let mut service = ServiceConfig::new(name, ServiceTargetKind::DotnetContainerApp);
            service.project_name = project.name.clone();
            service.project_path = project.path.clone();
            service.project_resource_group = project.resource_group_name.clone();
            service.relative_path = app_host.relative_path.clone();

            match (resource.kind.as_str(), &resource.build) {
                ("project.v0" | "project.v1", _) => {
                    let path = resource.path.as_deref().unwrap_or_default();
                    service.relative_path = relative_to(Path::new(path), &project.path);
                    service.language = ServiceLanguageKind::Dotnet;
                }
                ("dockerfile.v0", _) => {
                    let dockerfile = PathBuf::from(resource.path.as_deref().unwrap_or_default());
                    let dir = dockerfile.parent().unwrap_or(Path::new(""));
                    service.relative_path = relative_to(dir, &project.path);
                    service.language = ServiceLanguageKind::Docker;
                    service.docker.path = dockerfile.to_string_lossy().into_owned();
                    service.docker.context = resource.context.clone().unwrap_or_default();
                    service.docker.build_args = build_args(&resource.build_args);
                }
                ("container.v1", Some(build)) => {
                    let context = Path::new(&build.context);
                    service.relative_path = relative_to(context, &project.path);
                    service.language = ServiceLanguageKind::Docker;
                    service.docker.path = build.dockerfile.clone();
                    service.docker.context = build.context.clone();
                    service.docker.build_args = build_args(&build.args);
                }
                _ => {
                    service.language = ServiceLanguageKind::None;
                    service.image = ExpandableString::new(resource.image.clone().unwrap_or_default());
                }
            }

            debug!(service = %name, kind = %resource.kind, "Imported app host service");
            services.push(service);
        }
        Ok(services)
    }

    /// Generate the infrastructure into a temporary folder
    pub async fn project_infrastructure(
        &self,
        app_host: &ServiceConfig,
        cancel: &CancellationToken,
    ) -> Result<Infra> {
        let manifest = self.read_manifest(app_host, cancel).await?;
        let tera = scaffold::load()?;
        let files = scaffold::exec_infra(&tera, &infra_spec(&manifest), DEFAULT_INFRA_MODULE)?;

        Infra::write_temporary(&files, &std::env::temp_dir())
    }

    /// Every generated file, rooted at the project folder
    ///
    /// Besides the infra folder this includes one `<name>.tmpl.yaml` per service, next to
    /// the app host under `infra/`.
    pub async fn synth_all_infrastructure(
        &self,
        project: &ProjectConfig,
        app_host: &ServiceConfig,
        cancel: &CancellationToken,
    ) -> Result<MemoryFs> {
        let manifest = self.read_manifest(app_host, cancel).await?;
        let tera = scaffold::load()?;
        let spec = infra_spec(&manifest);

        let mut files = scaffold::exec_infra(&tera, &spec, &project.infra.module)?
            .prefixed(&project.infra.path);

        let host_dir = Path::new(&app_host.relative_path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        for service in &spec.services {
            let manifest = scaffold::container_app_manifest(&tera, service)?;
            files.write(
                host_dir.join("infra").join(format!("{}.tmpl.yaml", service.name)),
                manifest,
            );
        }
        Ok(files)
    }
}

fn build_args(args: &BTreeMap<String, String>) -> Vec<ExpandableString> {
    args.iter()
        .map(|(key, value)| {
            if value.is_empty() {
                ExpandableString::new(key.clone())
            } else {
                ExpandableString::new(format!("{}={}", key, value))
            }
        })
        .collect()
}

/// Translate the manifest into an [`InfraSpec`]
///
/// `parameter.v0` resources become parameters read from `AZURE_<NAME>`. Environment values
/// referencing another service's bindings become frontend/backend edges.
pub fn infra_spec(manifest: &AppHostManifest) -> InfraSpec {
    let mut spec = InfraSpec::default();

    for (name, resource) in &manifest.resources {
        if resource.kind == "parameter.v0" {
            let variable = format!("AZURE_{}", alpha_snake_upper(name));
            let secret = resource.inputs.values().any(|i| i.secret);
            spec.set_parameter(&bicep_name(&variable), &format!("${{{}}}", variable), secret);
        }
    }

    let mut edges = Vec::new();
    for (name, resource) in manifest.services() {
        let mut env = BTreeMap::new();
        for (key, raw) in &resource.env {
            let secret = is_secret_ref(manifest, raw);
            let (value, backends) = evaluate(manifest, raw);
            env.insert(key.clone(), bicep_expression(&mut spec, &value, secret));
            edges.extend(backends.into_iter().map(|backend| (name.clone(), backend)));
        }

        spec.services.push(ServiceSpec {
            name: name.clone(),
            port: resource.target_port(),
            env,
            ..Default::default()
        });
    }

    for (frontend, backend) in edges {
        if let Some(service) = spec.services.iter_mut().find(|s| s.name == frontend) {
            let refs = &mut service.frontend.get_or_insert_with(Frontend::default).backends;
            if !refs.iter().any(|r| r.name == backend) {
                refs.push(ServiceReference { name: backend.clone() });
            }
        }
        if let Some(service) = spec.services.iter_mut().find(|s| s.name == backend) {
            let refs = &mut service.backend.get_or_insert_with(Backend::default).frontends;
            if !refs.iter().any(|r| r.name == frontend) {
                refs.push(ServiceReference { name: frontend.clone() });
            }
        }
    }
    spec
}

fn is_secret_ref(manifest: &AppHostManifest, value: &str) -> bool {
    expressions(value).any(|expr| {
        let resource = expr.split('.').next().unwrap_or_default();
        manifest
            .resources
            .get(resource)
            .is_some_and(|r| r.inputs.values().any(|i| i.secret))
    })
}

fn expressions(value: &str) -> impl Iterator<Item = &str> {
    value
        .split('{')
        .skip(1)
        .filter_map(|part| part.split_once('}').map(|(expr, _)| expr))
}

/// Replace `{resource.property}` expressions with environment references or literals
///
/// Returns the new value and the services whose bindings it references.
fn evaluate(manifest: &AppHostManifest, value: &str) -> (String, Vec<String>) {
    let mut out = String::new();
    let mut backends = Vec::new();
    let mut rest = value;

    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let expr = &rest[start + 1..start + len];
        let (resource_name, property) = expr.split_once('.').unwrap_or((expr, ""));

        match manifest.resources.get(resource_name) {
            Some(r) if r.kind == "parameter.v0" => {
                out.push_str(&format!("${{AZURE_{}}}", alpha_snake_upper(resource_name)));
            }
            Some(r) if r.kind == "value.v0" => {
                out.push_str(r.value.as_deref().unwrap_or_default());
            }
            Some(r) if r.is_service() && property.starts_with("bindings.") => {
                out.push_str(&format!("https://{}", container_app_name(resource_name)));
                backends.push(resource_name.to_string());
            }
            _ => out.push_str(&rest[start..=start + len]),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    (out, backends)
}
