//! Extension channel
//!
//! Extensions are separate processes that provide framework services or service targets
//! for languages and hosts azflow does not know about. The host talks to an extension over
//! its stdio using newline-delimited JSON envelopes; every request carries a `request_id`
//! and the extension answers with any number of `progress` messages followed by exactly one
//! `response` or `error` for that id.
//!
//! [`ExternalFramework`] and [`ExternalTarget`] implement the same traits as the built-in
//! strategies on top of an [`ExtensionChannel`], so the service manager does not care
//! whether a phase runs in-process or in an extension. [`load_extensions`] starts the
//! extensions a run needs and registers them for the languages and hosts they provide.

mod framework;
mod registry;
mod target;

pub use framework::ExternalFramework;
pub use registry::{InstalledExtension, load_extensions, register_extension};
pub use target::ExternalTarget;

use crate::context::ServiceContext;
use crate::error::{ProjectError, Result};
use crate::progress::ProgressSink;
use azflow_cloud::TargetResource;
use azflow_core::ServiceConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One line on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub request_id: String,
    #[serde(flatten)]
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum Message {
    Request(ExtRequest),
    Progress { message: String },
    Response(serde_json::Value),
    Error { message: String },
}

/// A service as sent to an extension
///
/// `ServiceConfig` leaves its name and project fields out of the manifest form, so they
/// travel next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWire {
    pub name: String,
    pub project_name: String,
    pub project_path: PathBuf,
    pub config: ServiceConfig,
}

impl ServiceWire {
    pub fn into_config(self) -> ServiceConfig {
        let mut config = self.config;
        config.name = self.name;
        config.project_name = self.project_name;
        config.project_path = self.project_path;
        config
    }
}

impl From<&ServiceConfig> for ServiceWire {
    fn from(service: &ServiceConfig) -> Self {
        Self {
            name: service.name.clone(),
            project_name: service.project_name.clone(),
            project_path: service.project_path.clone(),
            config: service.clone(),
        }
    }
}

impl PartialEq for ServiceWire {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.project_name == other.project_name
            && self.project_path == other.project_path
            && serde_json::to_value(&self.config).ok() == serde_json::to_value(&other.config).ok()
    }
}

/// Operations an extension can be asked to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ExtRequest {
    FrameworkRequirements,
    FrameworkRestore {
        service: ServiceWire,
        context: ServiceContext,
    },
    FrameworkBuild {
        service: ServiceWire,
        context: ServiceContext,
    },
    FrameworkPackage {
        service: ServiceWire,
        context: ServiceContext,
    },
    TargetPackage {
        service: ServiceWire,
        context: ServiceContext,
    },
    TargetPublish {
        service: ServiceWire,
        context: ServiceContext,
        target: TargetResource,
        image: Option<String>,
    },
    TargetDeploy {
        service: ServiceWire,
        context: ServiceContext,
        target: TargetResource,
    },
    TargetEndpoints {
        service: ServiceWire,
        target: TargetResource,
    },
}

impl ExtRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            ExtRequest::FrameworkRequirements => "frameworkRequirements",
            ExtRequest::FrameworkRestore { .. } => "frameworkRestore",
            ExtRequest::FrameworkBuild { .. } => "frameworkBuild",
            ExtRequest::FrameworkPackage { .. } => "frameworkPackage",
            ExtRequest::TargetPackage { .. } => "targetPackage",
            ExtRequest::TargetPublish { .. } => "targetPublish",
            ExtRequest::TargetDeploy { .. } => "targetDeploy",
            ExtRequest::TargetEndpoints { .. } => "targetEndpoints",
        }
    }
}

type Reply = std::result::Result<serde_json::Value, String>;

struct PendingRequest {
    progress: mpsc::UnboundedSender<String>,
    reply: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct ChannelState {
    closed: bool,
    pending: HashMap<String, PendingRequest>,
}

type SharedState = Arc<Mutex<ChannelState>>;

fn lock(state: &Mutex<ChannelState>) -> MutexGuard<'_, ChannelState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Request/response channel to one extension
pub struct ExtensionChannel {
    name: String,
    outgoing: mpsc::UnboundedSender<Envelope>,
    state: SharedState,
    /// Kept so the process is killed with the channel
    _process: Mutex<Option<Child>>,
}

impl ExtensionChannel {
    /// Channel over an arbitrary byte stream pair
    ///
    /// Spawns a writer task and a dispatcher task on the current runtime. When the
    /// extension closes its output every outstanding request fails.
    pub fn new<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let (outgoing, receiver) = mpsc::unbounded_channel();
        let state = SharedState::default();

        tokio::spawn(write_loop(name.clone(), writer, receiver, state.clone()));
        tokio::spawn(dispatch_loop(name.clone(), reader, state.clone()));

        Self {
            name,
            outgoing,
            state,
            _process: Mutex::new(None),
        }
    }

    /// Start an extension process and talk to it over stdin/stdout
    pub fn spawn(name: impl Into<String>, program: &str, args: &[String]) -> Result<Self> {
        let name = name.into();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProjectError::ToolNotFound(program.to_string()),
                _ => ProjectError::Io(e),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ProjectError::Extension {
                extension: name,
                message: "stdio is not available".into(),
            });
        };

        debug!(extension = %name, program, "Started extension");
        let channel = Self::new(name, stdout, stdin);
        *channel
            ._process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(child);
        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request and wait for its response, forwarding progress to `progress`
    pub async fn request<T>(
        &self,
        request: ExtRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        let operation = request.operation();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let (reply_tx, mut reply_rx) = oneshot::channel();

        {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(self.closed_error());
            }
            state.pending.insert(
                request_id.clone(),
                PendingRequest {
                    progress: progress_tx,
                    reply: reply_tx,
                },
            );
        }

        debug!(extension = %self.name, request_id = %request_id, operation, "Sending request");
        let envelope = Envelope {
            request_id: request_id.clone(),
            message: Message::Request(request),
        };
        if self.outgoing.send(envelope).is_err() {
            self.forget(&request_id);
            return Err(self.closed_error());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.forget(&request_id);
                    return Err(ProjectError::Cancelled);
                }
                Some(message) = progress_rx.recv() => progress.message(&message),
                reply = &mut reply_rx => {
                    while let Ok(message) = progress_rx.try_recv() {
                        progress.message(&message);
                    }
                    let body = reply
                        .map_err(|_| self.closed_error())?
                        .map_err(|message| ProjectError::Extension {
                            extension: self.name.clone(),
                            message,
                        })?;
                    return serde_json::from_value(body).map_err(|e| ProjectError::Extension {
                        extension: self.name.clone(),
                        message: format!("invalid {operation} response: {e}"),
                    });
                }
            }
        }
    }

    fn forget(&self, request_id: &str) {
        lock(&self.state).pending.remove(request_id);
    }

    fn closed_error(&self) -> ProjectError {
        ProjectError::Extension {
            extension: self.name.clone(),
            message: "extension channel closed".into(),
        }
    }
}

async fn write_loop<W>(
    name: String,
    mut writer: W,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    state: SharedState,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = receiver.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(extension = %name, error = %e, "Failed to serialize request");
                fail_request(&state, &envelope.request_id, format!("failed to serialize request: {e}"));
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!(extension = %name, error = %e, "Failed to write to extension");
            fail_request(&state, &envelope.request_id, format!("failed to send request: {e}"));
            break;
        }
    }
}

/// Answer a pending request with an error
fn fail_request(state: &SharedState, request_id: &str, message: String) {
    if let Some(pending) = lock(state).pending.remove(request_id) {
        let _ = pending.reply.send(Err(message));
    }
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}

async fn dispatch_loop<R>(name: String, reader: R, state: SharedState)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(extension = %name, error = %e, "Failed to read from extension");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(extension = %name, error = %e, "Ignoring malformed message");
                continue;
            }
        };

        let mut state = lock(&state);
        match envelope.message {
            Message::Progress { message } => {
                if let Some(pending) = state.pending.get(&envelope.request_id) {
                    let _ = pending.progress.send(message);
                }
            }
            Message::Response(body) => {
                if let Some(pending) = state.pending.remove(&envelope.request_id) {
                    let _ = pending.reply.send(Ok(body));
                }
            }
            Message::Error { message } => {
                if let Some(pending) = state.pending.remove(&envelope.request_id) {
                    let _ = pending.reply.send(Err(message));
                }
            }
            Message::Request(request) => {
                warn!(
                    extension = %name,
                    operation = request.operation(),
                    "Extensions cannot send requests to the host"
                );
            }
        }
    }

    debug!(extension = %name, "Extension channel closed");
    let mut state = lock(&state);
    state.closed = true;
    // dropping the senders fails every waiting request
    state.pending.clear();
}
