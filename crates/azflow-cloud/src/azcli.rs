//! Azure CLI wrapper
//!
//! Implements the resource, registry and host client traits by shelling out to `az`
//! (and `swa` for static web apps).

use crate::error::{CloudError, Result};
use crate::hosts::{
    AppServiceClient, AppServiceProperties, ContainerAppClient, FunctionAppClient,
    MlEndpointClient, OnlineEndpoint, SpringAppClient, SpringAppProperties, StaticWebAppClient,
    StaticWebAppProperties, WorkspaceScope,
};
use crate::registry::{ContainerRegistryService, RegistryCredentials, RemoteBuildRequest};
use crate::resource::{AzureResource, ResourceFilter, ResourceService, TAG_ENV_NAME};
use crate::target::TargetResource;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Username accepted by ACR together with an access token
const ACR_TOKEN_USERNAME: &str = "00000000-0000-0000-0000-000000000000";

const SPRING_API_VERSION: &str = "2023-12-01";

/// Azure CLI wrapper
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
    swa_program: String,
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AzCli {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            swa_program: "swa".to_string(),
        }
    }

    /// Check if az is installed
    pub async fn check_installed(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(CloudError::ToolNotFound(self.program.clone())),
        }
    }

    /// Run a command and return stdout
    async fn run_program(
        &self,
        program: &str,
        args: &[&str],
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let rendered = format!("{} {}", program, redact_args(args).join(" "));
        tracing::debug!("Running: {}", rendered);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CloudError::ToolNotFound(program.to_string()),
            _ => CloudError::Io(e),
        })?;

        let output = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                output = child.wait_with_output() => output?,
            },
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudError::CommandFailed {
                command: rendered,
                message: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn run(&self, args: &[&str], cancel: Option<&CancellationToken>) -> Result<String> {
        self.run_program(&self.program, args, cancel).await
    }

    /// Run an `az` command with `-o json` and parse the output
    async fn run_json<T: DeserializeOwned>(
        &self,
        args: &[&str],
        cancel: Option<&CancellationToken>,
    ) -> Result<T> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--output", "json"]);
        let output = self.run(&full, cancel).await?;
        Ok(serde_json::from_str(&output)?)
    }
}

/// Hide secret values (`--deployment-token`, `--password`) in logged command lines
fn redact_args(args: &[&str]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            redacted.push("<redacted>".to_string());
            hide_next = false;
            continue;
        }
        hide_next = matches!(*arg, "--deployment-token" | "--password");
        redacted.push(arg.to_string());
    }
    redacted
}

/// `myacr.azurecr.io` -> `myacr`
fn registry_name(login_server: &str) -> &str {
    login_server.split('.').next().unwrap_or(login_server)
}

/// Arguments for `az acr build`
fn acr_build_args(subscription_id: &str, login_server: &str, request: &RemoteBuildRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "acr",
        "build",
        "--registry",
        registry_name(login_server),
        "--subscription",
        subscription_id,
        "--image",
        request.image.as_str(),
        "--file",
    ]
    .iter()
    .map(|a| a.to_string())
    .collect();
    args.push(request.dockerfile.to_string_lossy().into_owned());
    args.extend(["--platform".to_string(), request.platform.clone()]);
    if let Some(target) = &request.target {
        args.extend(["--target".to_string(), target.clone()]);
    }
    for (key, value) in &request.build_args {
        args.extend(["--build-arg".to_string(), format!("{key}={value}")]);
    }
    args.push(request.context_dir.to_string_lossy().into_owned());
    args
}

fn overrides_args(overrides: &BTreeMap<String, String>) -> Vec<String> {
    overrides
        .iter()
        .flat_map(|(k, v)| ["--set".to_string(), format!("{}={}", k, v)])
        .collect()
}

#[async_trait]
impl ResourceService for AzCli {
    async fn list_resource_group_resources(
        &self,
        subscription_id: &str,
        resource_group: &str,
        filter: Option<&str>,
    ) -> Result<Vec<AzureResource>> {
        let mut args = vec![
            "resource",
            "list",
            "--subscription",
            subscription_id,
            "--resource-group",
            resource_group,
        ];

        let filter = filter
            .map(|f| {
                ResourceFilter::parse(f)
                    .ok_or_else(|| CloudError::InvalidConfig(format!("unsupported filter: {}", f)))
            })
            .transpose()?;
        let filter_args: Vec<String> = match &filter {
            Some(ResourceFilter::Name(name)) => vec!["--name".to_string(), name.clone()],
            Some(ResourceFilter::Tag { name, value }) => {
                vec!["--tag".to_string(), format!("{}={}", name, value)]
            }
            None => Vec::new(),
        };
        args.extend(filter_args.iter().map(String::as_str));

        self.run_json(&args, None).await
    }

    async fn find_resource_group_for_environment(
        &self,
        subscription_id: &str,
        env_name: &str,
    ) -> Result<String> {
        let tag = format!("{}={}", TAG_ENV_NAME, env_name);
        let groups: Vec<AzureResource> = self
            .run_json(
                &["group", "list", "--subscription", subscription_id, "--tag", &tag],
                None,
            )
            .await?;

        match groups.as_slice() {
            [] => Err(CloudError::ResourceGroupNotFound(env_name.to_string())),
            [group] => Ok(group.name.clone()),
            _ => Err(CloudError::Ambiguous(format!(
                "expecting only '1' resource group tagged with '{}: {}', but found '{}'. \
                 Set AZURE_RESOURCE_GROUP to the resource group to use",
                TAG_ENV_NAME,
                env_name,
                groups.len()
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcrToken {
    access_token: String,
    #[serde(default)]
    login_server: String,
}

#[async_trait]
impl ContainerRegistryService for AzCli {
    async fn credentials(
        &self,
        subscription_id: &str,
        login_server: &str,
        cancel: &CancellationToken,
    ) -> Result<RegistryCredentials> {
        let token: AcrToken = self
            .run_json(
                &[
                    "acr",
                    "login",
                    "--name",
                    registry_name(login_server),
                    "--subscription",
                    subscription_id,
                    "--expose-token",
                ],
                Some(cancel),
            )
            .await?;

        Ok(RegistryCredentials {
            login_server: if token.login_server.is_empty() {
                login_server.to_string()
            } else {
                token.login_server
            },
            username: ACR_TOKEN_USERNAME.to_string(),
            password: token.access_token,
        })
    }

    async fn remote_build(
        &self,
        subscription_id: &str,
        login_server: &str,
        request: &RemoteBuildRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = acr_build_args(subscription_id, login_server, request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args, Some(cancel)).await?;
        tracing::debug!(image = %request.image, "Remote build finished");
        Ok(())
    }
}

#[derive(Deserialize)]
struct NamedItem {
    name: String,
}

#[async_trait]
impl AppServiceClient for AzCli {
    async fn app_service_properties(&self, target: &TargetResource) -> Result<AppServiceProperties> {
        self.run_json(
            &[
                "webapp",
                "show",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
            ],
            None,
        )
        .await
    }

    async fn has_app_service_deployments(&self, target: &TargetResource) -> Result<bool> {
        let deployments: Vec<serde_json::Value> = self
            .run_json(
                &[
                    "webapp",
                    "log",
                    "deployment",
                    "list",
                    "--subscription",
                    &target.subscription_id,
                    "--resource-group",
                    &target.resource_group_name,
                    "--name",
                    &target.resource_name,
                ],
                None,
            )
            .await?;
        Ok(!deployments.is_empty())
    }

    async fn app_service_slots(&self, target: &TargetResource) -> Result<Vec<String>> {
        let slots: Vec<NamedItem> = self
            .run_json(
                &[
                    "webapp",
                    "deployment",
                    "slot",
                    "list",
                    "--subscription",
                    &target.subscription_id,
                    "--resource-group",
                    &target.resource_group_name,
                    "--name",
                    &target.resource_name,
                ],
                None,
            )
            .await?;
        Ok(slots.into_iter().map(|s| s.name).collect())
    }

    async fn deploy_app_service_zip(
        &self,
        target: &TargetResource,
        slot: Option<&str>,
        zip_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let src = zip_file.display().to_string();
        let mut args = vec![
            "webapp",
            "deploy",
            "--subscription",
            &target.subscription_id,
            "--resource-group",
            &target.resource_group_name,
            "--name",
            &target.resource_name,
            "--src-path",
            &src,
            "--type",
            "zip",
        ];
        if let Some(slot) = slot {
            args.push("--slot");
            args.push(slot);
        }
        self.run(&args, Some(cancel)).await
    }
}

#[async_trait]
impl FunctionAppClient for AzCli {
    async fn function_app_properties(
        &self,
        target: &TargetResource,
    ) -> Result<AppServiceProperties> {
        self.run_json(
            &[
                "functionapp",
                "show",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
            ],
            None,
        )
        .await
    }

    async fn deploy_function_app_zip(
        &self,
        target: &TargetResource,
        zip_file: &Path,
        remote_build: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let src = zip_file.display().to_string();
        let build_remote = if remote_build { "true" } else { "false" };
        self.run(
            &[
                "functionapp",
                "deployment",
                "source",
                "config-zip",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
                "--src",
                &src,
                "--build-remote",
                build_remote,
            ],
            Some(cancel),
        )
        .await
    }
}

#[async_trait]
impl ContainerAppClient for AzCli {
    async fn update_container_app_image(
        &self,
        target: &TargetResource,
        image: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(
            &[
                "containerapp",
                "update",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
                "--image",
                image,
            ],
            Some(cancel),
        )
        .await?;
        Ok(())
    }

    async fn container_app_ingress_hosts(&self, target: &TargetResource) -> Result<Vec<String>> {
        let fqdn: Option<String> = self
            .run_json(
                &[
                    "containerapp",
                    "show",
                    "--subscription",
                    &target.subscription_id,
                    "--resource-group",
                    &target.resource_group_name,
                    "--name",
                    &target.resource_name,
                    "--query",
                    "properties.configuration.ingress.fqdn",
                ],
                None,
            )
            .await?;
        Ok(fqdn.into_iter().filter(|f| !f.is_empty()).collect())
    }
}

#[async_trait]
impl StaticWebAppClient for AzCli {
    async fn static_web_app_properties(
        &self,
        target: &TargetResource,
    ) -> Result<StaticWebAppProperties> {
        self.run_json(
            &[
                "staticwebapp",
                "show",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
            ],
            None,
        )
        .await
    }

    async fn static_web_app_environment_hostname(
        &self,
        target: &TargetResource,
        environment_name: &str,
    ) -> Result<String> {
        self.run_json(
            &[
                "staticwebapp",
                "environment",
                "show",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
                "--environment-name",
                environment_name,
                "--query",
                "hostname",
            ],
            None,
        )
        .await
    }

    async fn static_web_app_deployment_token(&self, target: &TargetResource) -> Result<String> {
        self.run_json(
            &[
                "staticwebapp",
                "secrets",
                "list",
                "--subscription",
                &target.subscription_id,
                "--resource-group",
                &target.resource_group_name,
                "--name",
                &target.resource_name,
                "--query",
                "properties.apiKey",
            ],
            None,
        )
        .await
    }

    async fn deploy_static_web_app(
        &self,
        app_folder: &Path,
        output_location: &str,
        environment_name: &str,
        deployment_token: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let app_location = app_folder.display().to_string();
        self.run_program(
            &self.swa_program,
            &[
                "deploy",
                "--app-location",
                &app_location,
                "--output-location",
                output_location,
                "--env",
                environment_name,
                "--deployment-token",
                deployment_token,
                "--no-use-keychain",
            ],
            Some(cancel),
        )
        .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrl {
    relative_path: String,
    upload_url: String,
}

impl AzCli {
    fn spring_app_url(target: &TargetResource, app_name: &str) -> String {
        format!(
            "https://management.azure.com/subscriptions/{}/resourceGroups/{}/providers/Microsoft.AppPlatform/Spring/{}/apps/{}",
            target.subscription_id, target.resource_group_name, target.resource_name, app_name
        )
    }
}

#[async_trait]
impl SpringAppClient for AzCli {
    async fn spring_app_properties(
        &self,
        target: &TargetResource,
        app_name: &str,
    ) -> Result<SpringAppProperties> {
        let url: Option<String> = self
            .run_json(
                &[
                    "spring",
                    "app",
                    "show",
                    "--subscription",
                    &target.subscription_id,
                    "--resource-group",
                    &target.resource_group_name,
                    "--service",
                    &target.resource_name,
                    "--name",
                    app_name,
                    "--query",
                    "properties.url",
                ],
                None,
            )
            .await?;
        Ok(SpringAppProperties {
            url: url.into_iter().filter(|u| !u.is_empty()).collect(),
        })
    }

    async fn upload_spring_artifact(
        &self,
        target: &TargetResource,
        app_name: &str,
        artifact: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = format!(
            "{}/getResourceUploadUrl?api-version={}",
            Self::spring_app_url(target, app_name),
            SPRING_API_VERSION
        );
        let upload: UploadUrl = self
            .run_json(&["rest", "--method", "post", "--url", &url], Some(cancel))
            .await?;

        let source = artifact.display().to_string();
        self.run(
            &[
                "storage",
                "file",
                "upload",
                "--file-url",
                &upload.upload_url,
                "--source",
                &source,
            ],
            Some(cancel),
        )
        .await?;

        Ok(upload.relative_path)
    }

    async fn deploy_spring_artifact(
        &self,
        target: &TargetResource,
        app_name: &str,
        relative_path: &str,
        deployment_name: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let url = format!(
            "{}/deployments/{}?api-version={}",
            Self::spring_app_url(target, app_name),
            deployment_name,
            SPRING_API_VERSION
        );
        let body = serde_json::json!({
            "properties": {
                "source": { "type": "Jar", "relativePath": relative_path }
            }
        })
        .to_string();

        let deployment: NamedItem = self
            .run_json(
                &["rest", "--method", "patch", "--url", &url, "--body", &body],
                Some(cancel),
            )
            .await?;
        Ok(deployment.name)
    }
}

#[derive(Deserialize)]
struct MlAsset {
    name: String,
    #[serde(default)]
    version: String,
}

impl MlAsset {
    fn qualified(self) -> String {
        if self.version.is_empty() {
            self.name
        } else {
            format!("{}:{}", self.name, self.version)
        }
    }
}

/// `az ml online-endpoint` output (snake_case keys)
#[derive(Deserialize)]
struct MlOnlineEndpoint {
    name: String,
    #[serde(default)]
    traffic: BTreeMap<String, u32>,
    #[serde(default)]
    scoring_uri: Option<String>,
    #[serde(default)]
    openapi_uri: Option<String>,
}

impl From<MlOnlineEndpoint> for OnlineEndpoint {
    fn from(value: MlOnlineEndpoint) -> Self {
        Self {
            name: value.name,
            traffic: value.traffic,
            scoring_uri: value.scoring_uri.unwrap_or_default(),
            swagger_uri: value.openapi_uri.unwrap_or_default(),
        }
    }
}

fn scope_args(scope: &WorkspaceScope) -> [&str; 6] {
    [
        "--subscription",
        &scope.subscription_id,
        "--resource-group",
        &scope.resource_group,
        "--workspace-name",
        &scope.workspace,
    ]
}

#[async_trait]
impl MlEndpointClient for AzCli {
    async fn create_environment_version(
        &self,
        scope: &WorkspaceScope,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let file = definition.display().to_string();
        let sets = overrides_args(overrides);
        let mut args = vec!["ml", "environment", "create", "--file", &file];
        args.extend(scope_args(scope));
        args.extend(sets.iter().map(String::as_str));
        let asset: MlAsset = self.run_json(&args, Some(cancel)).await?;
        Ok(asset.qualified())
    }

    async fn create_model_version(
        &self,
        scope: &WorkspaceScope,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let file = definition.display().to_string();
        let sets = overrides_args(overrides);
        let mut args = vec!["ml", "model", "create", "--file", &file];
        args.extend(scope_args(scope));
        args.extend(sets.iter().map(String::as_str));
        let asset: MlAsset = self.run_json(&args, Some(cancel)).await?;
        Ok(asset.qualified())
    }

    async fn create_online_deployment(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
        definition: &Path,
        overrides: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let file = definition.display().to_string();
        let sets = overrides_args(overrides);
        let mut args = vec![
            "ml",
            "online-deployment",
            "create",
            "--file",
            &file,
            "--endpoint-name",
            endpoint,
            "--name",
            deployment_name,
        ];
        args.extend(scope_args(scope));
        args.extend(sets.iter().map(String::as_str));
        let deployment: NamedItem = self.run_json(&args, Some(cancel)).await?;
        Ok(deployment.name)
    }

    async fn update_traffic(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        deployment_name: &str,
    ) -> Result<OnlineEndpoint> {
        let traffic = format!("{}=100", deployment_name);
        let mut args = vec![
            "ml",
            "online-endpoint",
            "update",
            "--name",
            endpoint,
            "--traffic",
            &traffic,
        ];
        args.extend(scope_args(scope));
        let updated: MlOnlineEndpoint = self.run_json(&args, None).await?;
        Ok(updated.into())
    }

    async fn delete_deployments(
        &self,
        scope: &WorkspaceScope,
        endpoint: &str,
        keep: &[String],
    ) -> Result<()> {
        let mut args = vec!["ml", "online-deployment", "list", "--endpoint-name", endpoint];
        args.extend(scope_args(scope));
        let deployments: Vec<NamedItem> = self.run_json(&args, None).await?;

        for deployment in deployments.iter().filter(|d| !keep.contains(&d.name)) {
            tracing::debug!(endpoint, deployment = %deployment.name, "Deleting online deployment");
            let mut args = vec![
                "ml",
                "online-deployment",
                "delete",
                "--endpoint-name",
                endpoint,
                "--name",
                &deployment.name,
                "--yes",
                "--no-wait",
            ];
            args.extend(scope_args(scope));
            self.run(&args, None).await?;
        }
        Ok(())
    }

    async fn online_endpoint(&self, scope: &WorkspaceScope, endpoint: &str) -> Result<OnlineEndpoint> {
        let mut args = vec!["ml", "online-endpoint", "show", "--name", endpoint];
        args.extend(scope_args(scope));
        let shown: MlOnlineEndpoint = self.run_json(&args, None).await?;
        Ok(shown.into())
    }
}
