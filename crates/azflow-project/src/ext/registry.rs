//! Registering extensions with the framework and target registries

use super::{ExtensionChannel, ExternalFramework, ExternalTarget};
use crate::context::OperationContext;
use crate::error::Result;
use crate::framework::{FrameworkRegistry, FrameworkService};
use crate::target::{ServiceTarget, TargetRegistry};
use azflow_core::{ServiceConfig, ServiceLanguageKind, ServiceTargetKind};
use std::sync::Arc;
use tracing::{debug, info};

/// An installed extension and what it provides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledExtension {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub languages: Vec<ServiceLanguageKind>,
    pub hosts: Vec<ServiceTargetKind>,
}

impl InstalledExtension {
    /// Whether a service uses a language or host that only this extension provides
    pub fn is_needed(
        &self,
        services: &[ServiceConfig],
        frameworks: &FrameworkRegistry,
        targets: &TargetRegistry,
    ) -> bool {
        services.iter().any(|service| {
            (self.languages.contains(&service.language) && !frameworks.supports(&service.language))
                || (self.hosts.contains(&service.host) && !targets.supports(&service.host))
        })
    }
}

/// Register `channel` for every language and host of `ext` the registries lack
///
/// Built-in languages and hosts keep their built-in implementation.
pub async fn register_extension(
    ext: &InstalledExtension,
    channel: Arc<ExtensionChannel>,
    frameworks: &mut FrameworkRegistry,
    targets: &mut TargetRegistry,
    op: OperationContext<'_>,
) -> Result<()> {
    let languages: Vec<ServiceLanguageKind> = ext
        .languages
        .iter()
        .filter(|language| !frameworks.supports(language))
        .cloned()
        .collect();
    if !languages.is_empty() {
        let framework: Arc<dyn FrameworkService> =
            Arc::new(ExternalFramework::connect(channel.clone(), op).await?);
        for language in languages {
            debug!(extension = %ext.name, language = %language, "Registered extension framework");
            let framework = framework.clone();
            frameworks.register(language, move || framework.clone());
        }
    }

    let hosts: Vec<ServiceTargetKind> = ext
        .hosts
        .iter()
        .filter(|host| !targets.supports(host))
        .cloned()
        .collect();
    if !hosts.is_empty() {
        let target: Arc<dyn ServiceTarget> = Arc::new(ExternalTarget::new(channel));
        for host in hosts {
            debug!(extension = %ext.name, host = %host, "Registered extension target");
            let target = target.clone();
            targets.register(host, move || target.clone());
        }
    }
    Ok(())
}

/// Start the extensions `services` need and register them
///
/// Extensions nobody needs are not started.
pub async fn load_extensions(
    installed: &[InstalledExtension],
    services: &[ServiceConfig],
    frameworks: &mut FrameworkRegistry,
    targets: &mut TargetRegistry,
    op: OperationContext<'_>,
) -> Result<()> {
    for ext in installed {
        if !ext.is_needed(services, frameworks, targets) {
            continue;
        }
        info!(extension = %ext.name, program = %ext.program, "Starting extension");
        let channel = ExtensionChannel::spawn(&ext.name, &ext.program, &ext.args)?;
        register_extension(ext, Arc::new(channel), frameworks, targets, op).await?;
    }
    Ok(())
}
