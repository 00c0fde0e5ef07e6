//! コンテナイメージ参照
//!
//! `[registry/]repository[:tag]` 形式の参照を分解します。

use crate::error::{BuildError, Result};
use std::fmt;
use std::str::FromStr;

/// 解析済みのイメージ参照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerImage {
    /// レジストリホスト (例: `myacr.azurecr.io`, `localhost:5000`)
    pub registry: String,
    /// リポジトリ (例: `todo/api-dev`)
    pub repository: String,
    pub tag: String,
}

impl ContainerImage {
    /// イメージ参照を解析
    ///
    /// # Examples
    /// - `nginx` -> repository `nginx`
    /// - `contoso/app:v1` -> repository `contoso/app`, tag `v1`
    /// - `myacr.azurecr.io/contoso/app:v1` -> registry `myacr.azurecr.io`
    /// - `localhost:5000/app` -> registry `localhost:5000`, タグなし
    pub fn parse(image: &str) -> Result<Self> {
        let image = image.trim();
        if image.is_empty() {
            return Err(BuildError::InvalidImage("(empty)".to_string()));
        }

        // タグは最後の ':' 以降 (ただし '/' を含まない場合のみ)
        let (name, tag) = match image.rfind(':') {
            Some(pos) if !image[pos + 1..].contains('/') => (&image[..pos], &image[pos + 1..]),
            _ => (image, ""),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first, rest),
            _ => ("", name),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(BuildError::InvalidImage(image.to_string()));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// レジストリを含まないローカル参照
    pub fn local(&self) -> String {
        if self.tag.is_empty() {
            self.repository.clone()
        } else {
            format!("{}:{}", self.repository, self.tag)
        }
    }

    /// レジストリを含む完全な参照
    pub fn remote(&self) -> String {
        if self.registry.is_empty() {
            self.local()
        } else {
            format!("{}/{}", self.registry, self.local())
        }
    }

    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = registry.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// 先頭セグメントがレジストリホストかどうか
fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl FromStr for ContainerImage {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContainerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let image = ContainerImage::parse("nginx").unwrap();
        assert_eq!(image.registry, "");
        assert_eq!(image.repository, "nginx");
        assert_eq!(image.tag, "");
    }

    #[test]
    fn test_parse_with_tag() {
        let image = ContainerImage::parse("contoso/contoso-image:latest").unwrap();
        assert_eq!(image.registry, "");
        assert_eq!(image.repository, "contoso/contoso-image");
        assert_eq!(image.tag, "latest");
        assert_eq!(image.local(), "contoso/contoso-image:latest");
    }

    #[test]
    fn test_parse_with_registry() {
        let image = ContainerImage::parse("myacr.azurecr.io/todo/api-dev:azd-deploy-1").unwrap();
        assert_eq!(image.registry, "myacr.azurecr.io");
        assert_eq!(image.repository, "todo/api-dev");
        assert_eq!(image.tag, "azd-deploy-1");
        assert_eq!(image.remote(), "myacr.azurecr.io/todo/api-dev:azd-deploy-1");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let image = ContainerImage::parse("localhost:5000/app").unwrap();
        assert_eq!(image.registry, "localhost:5000");
        assert_eq!(image.repository, "app");
        assert_eq!(image.tag, "");

        let image = ContainerImage::parse("localhost/app:dev").unwrap();
        assert_eq!(image.registry, "localhost");
        assert_eq!(image.tag, "dev");
    }

    #[test]
    fn test_replace_registry() {
        let image = ContainerImage::parse("old.azurecr.io/app:v1")
            .unwrap()
            .with_registry("new.azurecr.io");
        assert_eq!(image.remote(), "new.azurecr.io/app:v1");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ContainerImage::parse("").is_err());
        assert!(ContainerImage::parse("myacr.azurecr.io/").is_err());
    }
}
