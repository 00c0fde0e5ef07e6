//! Test doubles shared by the unit tests

use crate::command::{CommandRunner, RunArgs, RunResult};
use crate::container::{Clock, FixedClock};
use crate::error::{ProjectError, Result};
use async_trait::async_trait;
use azflow_build::{BuildRequest, ContainerEngine, RegistryCredential};
use azflow_cloud::{ContainerRegistryService, RegistryCredentials, RemoteBuildRequest};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub fn fixed_clock(unix_seconds: i64) -> Arc<dyn Clock> {
    let instant = Utc
        .timestamp_opt(unix_seconds, 0)
        .single()
        .expect("valid timestamp");
    Arc::new(FixedClock(instant))
}

type Effect = Box<dyn Fn(&RunArgs) + Send + Sync>;

/// Records every command; matching rules decide the output
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<RunArgs>>,
    failures: Vec<String>,
    outputs: Vec<(String, String)>,
    effects: Vec<(String, Effect)>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands whose command line contains `pattern`
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    /// Answer commands containing `pattern` with `stdout`
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.outputs.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Run `effect` (e.g. write output files) for commands containing `pattern`
    pub fn on<F>(mut self, pattern: &str, effect: F) -> Self
    where
        F: Fn(&RunArgs) + Send + Sync + 'static,
    {
        self.effects.push((pattern.to_string(), Box::new(effect)));
        self
    }

    pub fn calls(&self) -> Vec<RunArgs> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(RunArgs::command_line).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &RunArgs, cancel: &CancellationToken) -> Result<RunResult> {
        if cancel.is_cancelled() {
            return Err(ProjectError::Cancelled);
        }
        self.calls.lock().unwrap().push(args.clone());
        let line = args.command_line();

        if self.failures.iter().any(|p| line.contains(p)) {
            return Err(ProjectError::CommandFailed {
                command: line,
                code: 1,
                stderr: "scripted failure".to_string(),
            });
        }
        for (pattern, effect) in &self.effects {
            if line.contains(pattern) {
                effect(args);
            }
        }
        let stdout = self
            .outputs
            .iter()
            .find(|(p, _)| line.contains(p))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(RunResult {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

/// Container engine that records calls instead of talking to Docker
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<String>>,
    images: Mutex<HashSet<String>>,
    builds: Mutex<Vec<BuildRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&self, image: &str) {
        self.images.lock().unwrap().insert(image.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build(
        &self,
        request: &BuildRequest,
        _cancel: &CancellationToken,
    ) -> azflow_build::Result<String> {
        self.record(format!("build {}", request.tag));
        self.builds.lock().unwrap().push(request.clone());
        self.add_image(&request.tag);
        Ok(request.tag.clone())
    }

    async fn tag(&self, source: &str, target: &str) -> azflow_build::Result<()> {
        self.record(format!("tag {source} {target}"));
        self.add_image(target);
        Ok(())
    }

    async fn push(&self, image: &str, _cancel: &CancellationToken) -> azflow_build::Result<()> {
        self.record(format!("push {image}"));
        Ok(())
    }

    async fn pull(&self, image: &str, _cancel: &CancellationToken) -> azflow_build::Result<()> {
        self.record(format!("pull {image}"));
        self.add_image(image);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> azflow_build::Result<bool> {
        Ok(self.images.lock().unwrap().contains(image))
    }

    fn login(&self, credential: RegistryCredential) {
        self.record(format!("login {}", credential.server));
    }
}

/// Registry service handing out fixed credentials and recording remote builds
#[derive(Default)]
pub struct FakeRegistry {
    requests: Mutex<Vec<String>>,
    builds: Mutex<Vec<RemoteBuildRequest>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<RemoteBuildRequest> {
        self.builds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRegistryService for FakeRegistry {
    async fn credentials(
        &self,
        subscription_id: &str,
        login_server: &str,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<RegistryCredentials> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{subscription_id} {login_server}"));
        Ok(RegistryCredentials {
            login_server: login_server.to_string(),
            username: "00000000-0000-0000-0000-000000000000".to_string(),
            password: "token".to_string(),
        })
    }

    async fn remote_build(
        &self,
        subscription_id: &str,
        login_server: &str,
        request: &RemoteBuildRequest,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("build {subscription_id} {login_server} {}", request.image));
        self.builds.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub fn container_helper(env: azflow_cloud::SharedEnvironment) -> crate::container::ContainerHelper {
    crate::container::ContainerHelper::new(
        env,
        Arc::new(azflow_core::MemoryStore::new()),
        Arc::new(FakeEngine::new()),
        Arc::new(FakeRegistry::new()),
    )
    .with_clock(fixed_clock(1_700_000_000))
}

/// Every host client at once; calls are recorded as short strings
#[derive(Default)]
pub struct FakeHosts {
    pub calls: Mutex<Vec<String>>,
    pub host_names: Vec<String>,
    pub slots: Vec<String>,
    pub has_deployments: bool,
    pub ingress_hosts: Vec<String>,
    pub default_hostname: String,
    pub spring_urls: Vec<String>,
    pub scoring_uri: String,
    pub fail_on: Option<String>,
}

impl FakeHosts {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> azflow_cloud::Result<()> {
        let failing = self.fail_on.as_deref().is_some_and(|p| call.contains(p));
        self.calls.lock().unwrap().push(call.clone());
        if failing {
            return Err(azflow_cloud::CloudError::CommandFailed {
                command: call,
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl azflow_cloud::AppServiceClient for FakeHosts {
    async fn app_service_properties(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<azflow_cloud::AppServiceProperties> {
        Ok(azflow_cloud::AppServiceProperties {
            host_names: self.host_names.clone(),
        })
    }

    async fn has_app_service_deployments(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<bool> {
        Ok(self.has_deployments)
    }

    async fn app_service_slots(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<Vec<String>> {
        Ok(self.slots.clone())
    }

    async fn deploy_app_service_zip(
        &self,
        target: &azflow_cloud::TargetResource,
        slot: Option<&str>,
        zip_file: &std::path::Path,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        assert!(zip_file.exists(), "zip package must exist at deploy time");
        self.record(format!(
            "zip-deploy {} slot={}",
            target.resource_name,
            slot.unwrap_or("main")
        ))?;
        Ok("deployment-1".into())
    }
}

#[async_trait]
impl azflow_cloud::FunctionAppClient for FakeHosts {
    async fn function_app_properties(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<azflow_cloud::AppServiceProperties> {
        Ok(azflow_cloud::AppServiceProperties {
            host_names: self.host_names.clone(),
        })
    }

    async fn deploy_function_app_zip(
        &self,
        target: &azflow_cloud::TargetResource,
        _zip_file: &std::path::Path,
        remote_build: bool,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        self.record(format!(
            "function-deploy {} remote_build={remote_build}",
            target.resource_name
        ))?;
        Ok("deployment-1".into())
    }
}

#[async_trait]
impl azflow_cloud::ContainerAppClient for FakeHosts {
    async fn update_container_app_image(
        &self,
        target: &azflow_cloud::TargetResource,
        image: &str,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<()> {
        self.record(format!("update-image {} {image}", target.resource_name))
    }

    async fn container_app_ingress_hosts(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<Vec<String>> {
        Ok(self.ingress_hosts.clone())
    }
}

#[async_trait]
impl azflow_cloud::StaticWebAppClient for FakeHosts {
    async fn static_web_app_properties(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<azflow_cloud::StaticWebAppProperties> {
        Ok(azflow_cloud::StaticWebAppProperties {
            default_hostname: self.default_hostname.clone(),
        })
    }

    async fn static_web_app_environment_hostname(
        &self,
        _target: &azflow_cloud::TargetResource,
        environment_name: &str,
    ) -> azflow_cloud::Result<String> {
        Ok(format!("{environment_name}.{}", self.default_hostname))
    }

    async fn static_web_app_deployment_token(
        &self,
        _target: &azflow_cloud::TargetResource,
    ) -> azflow_cloud::Result<String> {
        Ok("swa-token".into())
    }

    async fn deploy_static_web_app(
        &self,
        app_folder: &std::path::Path,
        output_location: &str,
        environment_name: &str,
        deployment_token: &str,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<()> {
        self.record(format!(
            "swa-deploy {} {output_location} {environment_name} {deployment_token}",
            file_name(app_folder)
        ))
    }
}

#[async_trait]
impl azflow_cloud::SpringAppClient for FakeHosts {
    async fn spring_app_properties(
        &self,
        _target: &azflow_cloud::TargetResource,
        _app_name: &str,
    ) -> azflow_cloud::Result<azflow_cloud::SpringAppProperties> {
        Ok(azflow_cloud::SpringAppProperties {
            url: self.spring_urls.clone(),
        })
    }

    async fn upload_spring_artifact(
        &self,
        _target: &azflow_cloud::TargetResource,
        app_name: &str,
        artifact: &std::path::Path,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        self.record(format!("spring-upload {app_name} {}", file_name(artifact)))?;
        Ok(format!("resources/{app_name}/{}", file_name(artifact)))
    }

    async fn deploy_spring_artifact(
        &self,
        _target: &azflow_cloud::TargetResource,
        app_name: &str,
        relative_path: &str,
        deployment_name: &str,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        self.record(format!("spring-deploy {app_name} {relative_path} {deployment_name}"))?;
        Ok(deployment_name.to_string())
    }
}

#[async_trait]
impl azflow_cloud::MlEndpointClient for FakeHosts {
    async fn create_environment_version(
        &self,
        scope: &azflow_cloud::WorkspaceScope,
        definition: &std::path::Path,
        _overrides: &std::collections::BTreeMap<String, String>,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        self.record(format!("ml-environment {} {}", scope.workspace, file_name(definition)))?;
        Ok("env:3".into())
    }

    async fn create_model_version(
        &self,
        scope: &azflow_cloud::WorkspaceScope,
        definition: &std::path::Path,
        _overrides: &std::collections::BTreeMap<String, String>,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        self.record(format!("ml-model {} {}", scope.workspace, file_name(definition)))?;
        Ok("model:7".into())
    }

    async fn create_online_deployment(
        &self,
        _scope: &azflow_cloud::WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
        _definition: &std::path::Path,
        overrides: &std::collections::BTreeMap<String, String>,
        _cancel: &CancellationToken,
    ) -> azflow_cloud::Result<String> {
        let overrides: Vec<String> = overrides.iter().map(|(k, v)| format!("{k}={v}")).collect();
        self.record(format!(
            "ml-deploy {endpoint} {deployment_name} {}",
            overrides.join(",")
        ))?;
        Ok(deployment_name.to_string())
    }

    async fn update_traffic(
        &self,
        _scope: &azflow_cloud::WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
    ) -> azflow_cloud::Result<azflow_cloud::OnlineEndpoint> {
        self.record(format!("ml-traffic {endpoint} {deployment_name}"))?;
        let mut online = azflow_cloud::OnlineEndpoint {
            name: endpoint.to_string(),
            scoring_uri: self.scoring_uri.clone(),
            ..Default::default()
        };
        online.traffic.insert(deployment_name.to_string(), 100);
        Ok(online)
    }

    async fn delete_deployments(
        &self,
        _scope: &azflow_cloud::WorkspaceScope,
        endpoint: &str,
        keep: &[String],
    ) -> azflow_cloud::Result<()> {
        self.record(format!("ml-delete {endpoint} keep={}", keep.join(",")))
    }

    async fn online_endpoint(
        &self,
        _scope: &azflow_cloud::WorkspaceScope,
        endpoint: &str,
    ) -> azflow_cloud::Result<azflow_cloud::OnlineEndpoint> {
        Ok(azflow_cloud::OnlineEndpoint {
            name: endpoint.to_string(),
            scoring_uri: self.scoring_uri.clone(),
            ..Default::default()
        })
    }
}

/// Resource listing over a fixed set of resources in one group
#[derive(Default)]
pub struct FakeResources {
    pub resources: Vec<azflow_cloud::AzureResource>,
}

impl FakeResources {
    pub fn with(mut self, resource: azflow_cloud::AzureResource) -> Self {
        self.resources.push(resource);
        self
    }
}

#[async_trait]
impl azflow_cloud::ResourceService for FakeResources {
    async fn list_resource_group_resources(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        filter: Option<&str>,
    ) -> azflow_cloud::Result<Vec<azflow_cloud::AzureResource>> {
        let filter = filter.and_then(azflow_cloud::ResourceFilter::parse);
        Ok(self
            .resources
            .iter()
            .filter(|r| filter.as_ref().is_none_or(|f| f.matches(r)))
            .cloned()
            .collect())
    }

    async fn find_resource_group_for_environment(
        &self,
        _subscription_id: &str,
        env_name: &str,
    ) -> azflow_cloud::Result<String> {
        Ok(format!("rg-{env_name}"))
    }
}
