//! Service import and infrastructure resolution
//!
//! The [`ImportManager`] turns the declared project into the concrete set of services that
//! get deployed, expanding a .NET app host into the services it describes. It also decides
//! where the infrastructure of a project comes from: the infra folder, the app host, or
//! templates synthesized from the `resources` graph.

mod apphost;
mod synth;

pub use apphost::{AppHostManifest, DotnetImporter, ManifestResource};
pub use synth::{bicep_expression, infra_spec};

use crate::error::{ProjectError, Result, ResultExt};
use crate::scaffold::{self, MemoryFs};
use azflow_core::{
    DEFAULT_INFRA_MODULE, DEFAULT_INFRA_PROVIDER, InfraOptions, ProjectConfig, ServiceConfig,
    ServiceLanguageKind, ServiceTargetKind,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Infrastructure of a project, possibly generated into a temporary folder
#[derive(Debug)]
pub struct Infra {
    pub options: InfraOptions,
    cleanup_dir: Option<PathBuf>,
}

impl Infra {
    pub fn new(options: InfraOptions) -> Self {
        Self {
            options,
            cleanup_dir: None,
        }
    }

    /// Infrastructure living in `dir`, which is removed on cleanup
    pub(crate) fn temporary(options: InfraOptions, dir: PathBuf) -> Self {
        Self {
            options,
            cleanup_dir: Some(dir),
        }
    }

    /// Write `files` into a new temporary folder below `parent`
    ///
    /// The folder is removed again when writing fails.
    pub(crate) fn write_temporary(files: &MemoryFs, parent: &Path) -> Result<Self> {
        let guard = tempfile::Builder::new()
            .prefix("azflow-infra")
            .tempdir_in(parent)?;
        files
            .write_to(guard.path())
            .context("writing infrastructure")?;
        let dir = guard.keep();

        Ok(Self::temporary(
            InfraOptions {
                provider: DEFAULT_INFRA_PROVIDER.to_string(),
                path: dir.to_string_lossy().into_owned(),
                module: DEFAULT_INFRA_MODULE.to_string(),
                layers: Vec::new(),
            },
            dir,
        ))
    }

    pub fn is_temporary(&self) -> bool {
        self.cleanup_dir.is_some()
    }

    /// Remove the generated folder, if any. Calling it again is a no-op.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        match self.cleanup_dir.take() {
            Some(dir) if dir.exists() => std::fs::remove_dir_all(dir),
            _ => Ok(()),
        }
    }
}

impl Drop for Infra {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, "Failed to remove temporary infrastructure");
        }
    }
}

/// Effective services and infrastructure of a project
pub struct ImportManager {
    dotnet: DotnetImporter,
}

impl ImportManager {
    pub fn new(dotnet: DotnetImporter) -> Self {
        Self { dotnet }
    }

    /// Whether `service` is a .NET app host; lookup failures count as "no"
    async fn is_app_host(&self, service: &ServiceConfig, cancel: &CancellationToken) -> bool {
        if service.language != ServiceLanguageKind::Dotnet {
            return false;
        }
        match self.dotnet.can_import(&service.path(), cancel).await {
            Ok(is_host) => is_host,
            Err(e) => {
                warn!(
                    path = %service.path().display(),
                    error = %e,
                    "Failed to check for an app host project"
                );
                false
            }
        }
    }

    /// The app host of the project, checked against the constraints app hosts impose
    async fn app_host<'a>(
        &self,
        project: &'a ProjectConfig,
        cancel: &CancellationToken,
    ) -> Result<Option<&'a ServiceConfig>> {
        for service in project.services_by_name() {
            if !self.is_app_host(service, cancel).await {
                continue;
            }
            check_app_host(project, service)?;
            return Ok(Some(service));
        }
        Ok(None)
    }

    /// Every service to deploy, sorted by name
    #[instrument(skip_all, fields(project = %project.name))]
    pub async fn service_stable(
        &self,
        project: &ProjectConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceConfig>> {
        let mut services = Vec::with_capacity(project.services.len());

        for service in project.services_by_name() {
            if self.is_app_host(service, cancel).await {
                check_app_host(project, service)?;
                let imported = self
                    .dotnet
                    .services(project, service, cancel)
                    .await
                    .context("importing services")?;
                debug!(app_host = %service.name, count = imported.len(), "Imported app host services");
                services.extend(imported);
                continue;
            }
            services.push(service.clone());
        }

        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    pub async fn has_service(
        &self,
        project: &ProjectConfig,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        Ok(self
            .service_stable(project, cancel)
            .await?
            .iter()
            .any(|s| s.name == name))
    }

    /// Where the infrastructure of the project comes from
    ///
    /// In order: a module in the infra folder, the app host, the `resources` graph.
    #[instrument(skip_all, fields(project = %project.name))]
    pub async fn project_infrastructure(
        &self,
        project: &ProjectConfig,
        cancel: &CancellationToken,
    ) -> Result<Infra> {
        let options = project.infra.clone().with_defaults();
        let infra_root = infra_root(project, &options);

        if path_has_module(&infra_root, &options.module) {
            info!(path = %infra_root.display(), "Using infrastructure from the infra folder");
            return Ok(Infra::new(options));
        }

        if let Some(app_host) = self.app_host(project, cancel).await? {
            return self.dotnet.project_infrastructure(app_host, cancel).await;
        }

        if project.resources.is_empty() {
            return Err(ProjectError::NoInfrastructure(infra_root));
        }

        let spec = synth::infra_spec(project).context("parsing infrastructure")?;
        let tera = scaffold::load()?;
        let files = scaffold::exec_infra(&tera, &spec, DEFAULT_INFRA_MODULE)?;

        let infra = Infra::write_temporary(&files, &std::env::temp_dir())?;
        info!(path = %infra.options.path, "Synthesized infrastructure from resources");
        Ok(infra)
    }

    /// Every file that would be generated, relative to the project folder
    #[instrument(skip_all, fields(project = %project.name))]
    pub async fn synth_all_infrastructure(
        &self,
        project: &ProjectConfig,
        cancel: &CancellationToken,
    ) -> Result<MemoryFs> {
        if let Some(app_host) = self.app_host(project, cancel).await? {
            return self
                .dotnet
                .synth_all_infrastructure(project, app_host, cancel)
                .await;
        }

        let spec = synth::infra_spec(project).context("parsing infrastructure")?;
        if spec.is_empty() {
            return Err(ProjectError::NothingToSynthesize);
        }

        let options = project.infra.clone().with_defaults();
        let tera = scaffold::load()?;
        Ok(scaffold::exec_infra(&tera, &spec, &options.module)?.prefixed(&options.path))
    }
}

fn check_app_host(project: &ProjectConfig, app_host: &ServiceConfig) -> Result<()> {
    if project.services.len() != 1 {
        return Err(ProjectError::UnsupportedConfiguration(
            "a project may only contain a single app host service and no other services".into(),
        ));
    }
    if app_host.host != ServiceTargetKind::ContainerApp {
        return Err(ProjectError::UnsupportedConfiguration(format!(
            "app host service '{}' must target 'containerapp', not '{}'",
            app_host.name, app_host.host
        )));
    }
    Ok(())
}

fn infra_root(project: &ProjectConfig, options: &InfraOptions) -> PathBuf {
    let path = Path::new(&options.path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project.path.join(path)
    }
}

/// A file (not a folder) named `<module>` or `<module>.<ext>` exists in `dir`
fn path_has_module(dir: &Path, module: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        path.is_file() && path.file_stem().is_some_and(|stem| stem == module)
    })
}
