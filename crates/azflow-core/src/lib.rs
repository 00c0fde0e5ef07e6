//! azflow core
//!
//! azure.yaml のプロジェクトモデル、デプロイ環境 (Environment)、
//! `${NAME}` 形式の遅延展開値を提供します。

pub mod environment;
pub mod error;
pub mod expandable;
pub mod loader;
pub mod model;

pub use environment::{DotenvStore, Environment, EnvironmentStore, MemoryStore};
pub use error::{CoreError, Result};
pub use expandable::{ExpandableMap, ExpandableString, Reference, scan_references};
pub use loader::{load_project, parse_project};
pub use model::*;
