//! コンテナエンジン
//!
//! ビルド・タグ付け・プッシュ・プルを `ContainerEngine` トレイトとして抽象化し、
//! bollard による Docker 実装を提供します。

use crate::auth::{RegistryAuth, RegistryCredential};
use crate::context::{ContextBuilder, DOCKERFILE_ENTRY};
use crate::error::{BuildError, Result};
use crate::image::ContainerImage;
use async_trait::async_trait;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use http_body_util::{Either, Full};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// イメージビルドの要求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// ビルドコンテキストのディレクトリ
    pub context_dir: PathBuf,
    pub dockerfile: PathBuf,
    /// 付与するローカルタグ
    pub tag: String,
    pub build_args: HashMap<String, String>,
    pub target: Option<String>,
    pub platform: Option<String>,
}

/// コンテナエンジン操作
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// イメージをビルドし、付与したタグを返す
    async fn build(&self, request: &BuildRequest, cancel: &CancellationToken) -> Result<String>;

    /// `source` に `target` のタグを付与
    async fn tag(&self, source: &str, target: &str) -> Result<()>;

    async fn push(&self, image: &str, cancel: &CancellationToken) -> Result<()>;

    async fn pull(&self, image: &str, cancel: &CancellationToken) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// 以降のプッシュ・プルで使う認証情報を登録
    fn login(&self, credential: RegistryCredential);
}

/// Docker API (bollard) による実装
pub struct DockerEngine {
    docker: Docker,
    auth: RegistryAuth,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self::with_auth(docker, RegistryAuth::new())
    }

    pub fn with_auth(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// ローカルの Docker デーモンに接続
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker))
    }

    fn handle_build_output(output: bollard::models::BuildInfo) -> Result<()> {
        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!(target: "azflow::docker", "{}", line);
            }
        }

        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(status) = output.status {
            tracing::debug!(target: "azflow::docker", "{}", status);
        }

        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build(&self, request: &BuildRequest, cancel: &CancellationToken) -> Result<String> {
        tracing::info!(tag = %request.tag, "Building image");

        let context_data =
            ContextBuilder::create_context(&request.context_dir, &request.dockerfile)?;

        let build_args: HashMap<&str, &str> = request
            .build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: DOCKERFILE_ENTRY,
            t: request.tag.as_str(),
            buildargs: build_args,
            target: request.target.as_deref().unwrap_or(""),
            platform: request.platform.as_deref().unwrap_or(""),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(context_data));
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                msg = stream.next() => match msg {
                    Some(Ok(output)) => Self::handle_build_output(output)?,
                    Some(Err(e)) => return Err(BuildError::DockerConnection(e)),
                    None => break,
                },
            }
        }

        tracing::info!(tag = %request.tag, "Successfully built");
        Ok(request.tag.clone())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        let target_image = ContainerImage::parse(target)?;
        let repo = if target_image.registry.is_empty() {
            target_image.repository.clone()
        } else {
            format!("{}/{}", target_image.registry, target_image.repository)
        };
        let tag = if target_image.tag.is_empty() {
            "latest".to_string()
        } else {
            target_image.tag.clone()
        };

        tracing::debug!(source, target, "Tagging image");

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions { repo, tag };
        self.docker.tag_image(source, Some(options)).await?;
        Ok(())
    }

    async fn push(&self, image: &str, cancel: &CancellationToken) -> Result<()> {
        let parsed = ContainerImage::parse(image)?;
        let name = match parsed.registry.as_str() {
            "" => parsed.repository.clone(),
            registry => format!("{}/{}", registry, parsed.repository),
        };
        let tag = if parsed.tag.is_empty() {
            "latest".to_string()
        } else {
            parsed.tag.clone()
        };

        let credentials = self.auth.get_credentials(image)?;

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag };

        tracing::info!(image, "Pushing image");

        #[allow(deprecated)]
        let mut stream = self.docker.push_image(&name, Some(options), credentials);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                msg = stream.next() => match msg {
                    Some(Ok(info)) => {
                        if let Some(error) = info.error {
                            return Err(BuildError::PushFailed {
                                image: image.to_string(),
                                message: error,
                            });
                        }
                        if let Some(status) = info.status {
                            tracing::debug!(target: "azflow::docker", "{}", status);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(BuildError::PushFailed {
                            image: image.to_string(),
                            message: e.to_string(),
                        });
                    }
                    None => break,
                },
            }
        }

        Ok(())
    }

    async fn pull(&self, image: &str, cancel: &CancellationToken) -> Result<()> {
        let parsed = ContainerImage::parse(image)?;
        let from_image = match parsed.registry.as_str() {
            "" => parsed.repository.clone(),
            registry => format!("{}/{}", registry, parsed.repository),
        };
        let tag = if parsed.tag.is_empty() {
            "latest".to_string()
        } else {
            parsed.tag.clone()
        };

        let credentials = self.auth.get_credentials(image)?;

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        tracing::info!(image, "Pulling image");

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, credentials);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                msg = stream.next() => match msg {
                    Some(Ok(info)) => {
                        if let Some(status) = info.status {
                            tracing::debug!(target: "azflow::docker", "{}", status);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(BuildError::PullFailed {
                            image: image.to_string(),
                            message: e.to_string(),
                        });
                    }
                    None => break,
                },
            }
        }

        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }

    fn login(&self, credential: RegistryCredential) {
        self.auth.register(credential);
    }
}
