//! モデル定義
//!
//! azure.yaml のプロジェクト、サービス、リソース、フックを定義します。

mod hooks;
mod project;
mod resource;
mod service;

// Re-exports
pub use hooks::*;
pub use project::*;
pub use resource::*;
pub use service::*;
