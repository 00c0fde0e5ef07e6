//! ビルドコンテキスト
//!
//! Docker API に渡す tar.gz アーカイブを作成します。

use crate::error::{BuildError, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::Builder;

/// アーカイブ内の Dockerfile 名
pub const DOCKERFILE_ENTRY: &str = "Dockerfile";

const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024;

pub struct ContextBuilder;

impl ContextBuilder {
    /// コンテキストディレクトリと Dockerfile から tar.gz を作成
    ///
    /// Dockerfile はコンテキスト外にあってもよく、常に `Dockerfile` として格納されます。
    pub fn create_context(context_path: &Path, dockerfile_path: &Path) -> Result<Vec<u8>> {
        if !context_path.is_dir() {
            return Err(BuildError::ContextNotFound(context_path.to_path_buf()));
        }
        if !dockerfile_path.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile_path.to_path_buf()));
        }

        tracing::debug!("Creating build context from: {}", context_path.display());

        let dockerfile_content = std::fs::read(dockerfile_path)?;

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            tar.append_dir_all(".", context_path)?;

            let mut header = tar::Header::new_gnu();
            header.set_path(DOCKERFILE_ENTRY).map_err(|e| {
                BuildError::InvalidConfig(format!("Failed to set Dockerfile path: {}", e))
            })?;
            header.set_size(dockerfile_content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, &dockerfile_content[..])?;

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());
        if archive_data.len() > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
                 .dockerignoreファイルで不要なファイルを除外することを推奨します。",
                archive_data.len() / 1024 / 1024
            );
        }

        Ok(archive_data)
    }
}
