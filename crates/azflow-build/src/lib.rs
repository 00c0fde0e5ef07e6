//! azflow container build functionality
//!
//! コンテナイメージ参照の解析、レジストリ認証、ビルドコンテキストの作成、
//! Docker エンジン (bollard) を通じたビルド・タグ付け・プッシュを提供します。

pub mod auth;
pub mod context;
pub mod engine;
pub mod error;
pub mod image;
pub mod progress;

pub use auth::{RegistryAuth, RegistryCredential};
pub use context::ContextBuilder;
pub use engine::{BuildRequest, ContainerEngine, DockerEngine};
pub use error::{BuildError, Result};
pub use image::ContainerImage;
pub use progress::BuildProgress;
