//! azflow project layer
//!
//! Turns a loaded [`azflow_core::ProjectConfig`] into deployable services and runs them
//! through the restore → build → package → publish → deploy pipeline.
//!
//! - [`import`]: effective service set, app host import, infrastructure resolution and synthesis
//! - [`framework`]: language toolchains (dotnet, python, npm, maven, docker)
//! - [`target`]: hosting services (App Service, Container Apps, Functions, ...)
//! - [`ext`]: frameworks and targets provided by extension processes
//! - [`service_manager`] / [`orchestrator`]: the pipeline itself

pub mod artifact;
pub mod command;
pub mod container;
pub mod context;
pub mod duplicate;
pub mod error;
pub mod ext;
pub mod framework;
pub mod hooks;
pub mod import;
pub mod orchestrator;
pub mod progress;
pub mod scaffold;
pub mod service_manager;
pub mod target;

#[cfg(test)]
mod testing;

pub use artifact::{Artifact, ArtifactCollection, ArtifactKind, LocationKind};
pub use command::{CommandRunner, ProcessRunner, RunArgs, RunResult};
pub use container::{Clock, ContainerHelper, PublishOptions, SystemClock};
pub use context::{OperationContext, ServiceContext, ServicePhase};
pub use duplicate::{
    AlwaysOverwrite, DuplicateChoice, DuplicatePrompt, KeepExisting, determine_duplicates,
    write_synthesized,
};
pub use error::{ProjectError, Result};
pub use ext::{ExtensionChannel, InstalledExtension, ExternalFramework, ExternalTarget, load_extensions};
pub use framework::{FrameworkRegistry, FrameworkService};
pub use hooks::HooksRunner;
pub use import::{DotnetImporter, ImportManager, Infra};
pub use orchestrator::{Orchestrator, RunOptions, ServiceResult};
pub use progress::{ChannelProgress, NoopProgress, ProgressSink, RecordingProgress, ServiceProgress};
pub use scaffold::MemoryFs;
pub use service_manager::{PackageOptions, ServiceManager};
pub use target::{HostClients, ServiceTarget, TargetRegistry};
