//! 遅延展開値
//!
//! azure.yaml の値には `${NAME}` 形式の参照を埋め込めます。
//! 参照はロード時ではなく、使用時に Environment に対して解決されます。
//!
//! - `${NAME}`: 未設定なら空文字列
//! - `${NAME:=default}`: 未設定または空なら `default`
//! - `${NAME:?message}`: 未設定または空ならエラー

use crate::error::{CoreError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([=?])([^}]*))?\}")
        .expect("reference pattern must compile")
});

/// 文字列中の `${...}` 参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    /// 参照全体 (`${` から `}` まで) のバイト範囲
    pub start: usize,
    pub end: usize,
    pub default: Option<String>,
    pub required: Option<String>,
}

/// 文字列中の参照を出現順に列挙
pub fn scan_references(text: &str) -> Vec<Reference> {
    REFERENCE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let argument = caps.get(3).map(|m| m.as_str().to_string());
            let (default, required) = match caps.get(2).map(|m| m.as_str()) {
                Some("=") => (argument, None),
                Some("?") => (None, argument),
                _ => (None, None),
            };
            Some(Reference {
                name,
                start: whole.start(),
                end: whole.end(),
                default,
                required,
            })
        })
        .collect()
}

/// 使用時に展開される文字列
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandableString {
    template: String,
}

impl ExpandableString {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// 展開前のテンプレート
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// `lookup` で参照を解決して展開
    pub fn envsubst<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut expanded = String::with_capacity(self.template.len());
        let mut last = 0;

        for reference in scan_references(&self.template) {
            expanded.push_str(&self.template[last..reference.start]);

            let value = lookup(&reference.name).filter(|v| !v.is_empty());
            let resolved = match (value, &reference.default, &reference.required) {
                (Some(value), _, _) => value,
                (None, Some(default), _) => default.clone(),
                (None, None, Some(message)) => {
                    return Err(CoreError::RequiredVariable {
                        name: reference.name,
                        message: message.clone(),
                    });
                }
                (None, None, None) => String::new(),
            };
            expanded.push_str(&resolved);
            last = reference.end;
        }

        expanded.push_str(&self.template[last..]);
        Ok(expanded)
    }
}

impl From<&str> for ExpandableString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ExpandableString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ExpandableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// キーごとに展開される値のマップ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandableMap(BTreeMap<String, ExpandableString>);

impl ExpandableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ExpandableString>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ExpandableString> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExpandableString)> {
        self.0.iter()
    }

    /// 全ての値を展開
    pub fn expand<F>(&self, lookup: F) -> Result<BTreeMap<String, String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.0
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.envsubst(&lookup)?)))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for ExpandableMap
where
    K: Into<String>,
    V: Into<ExpandableString>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(values: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_envsubst_plain_reference() {
        let value = ExpandableString::new("${AZURE_ENV_NAME}-api");
        let lookup = lookup_from(&[("AZURE_ENV_NAME", "dev")]);
        assert_eq!(value.envsubst(lookup).unwrap(), "dev-api");
    }

    #[test]
    fn test_envsubst_missing_reference_is_empty() {
        let value = ExpandableString::new("rg-${MISSING}");
        assert_eq!(value.envsubst(|_| None).unwrap(), "rg-");
    }

    #[test]
    fn test_envsubst_default_value() {
        let value = ExpandableString::new("${REGION:=eastus2}");
        assert_eq!(value.envsubst(|_| None).unwrap(), "eastus2");

        let lookup = lookup_from(&[("REGION", "westus")]);
        assert_eq!(value.envsubst(lookup).unwrap(), "westus");
    }

    #[test]
    fn test_envsubst_required_value() {
        let value = ExpandableString::new("${API_KEY:?api key must be provided}");
        let err = value.envsubst(|_| None).unwrap_err();
        match err {
            CoreError::RequiredVariable { name, message } => {
                assert_eq!(name, "API_KEY");
                assert_eq!(message, "api key must be provided");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_envsubst_keeps_non_reference_text() {
        // `$100` や閉じていない参照はそのまま残す
        let value = ExpandableString::new("costs $100 and ${broken");
        assert_eq!(value.envsubst(|_| None).unwrap(), "costs $100 and ${broken");

        let special = ExpandableString::new("p@ss:w0rd/=&?");
        assert_eq!(special.envsubst(|_| None).unwrap(), "p@ss:w0rd/=&?");
    }

    #[test]
    fn test_scan_references_positions() {
        let text = "https://${HOST}:${PORT:=80}/";
        let refs = scan_references(text);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "HOST");
        assert_eq!(&text[refs[0].start..refs[0].end], "${HOST}");
        assert_eq!(refs[1].name, "PORT");
        assert_eq!(refs[1].default.as_deref(), Some("80"));
    }

    #[test]
    fn test_expandable_map() {
        let map: ExpandableMap = [("A", "${X}"), ("B", "literal")].into_iter().collect();
        let lookup = lookup_from(&[("X", "1")]);
        let expanded = map.expand(lookup).unwrap();
        assert_eq!(expanded["A"], "1");
        assert_eq!(expanded["B"], "literal");
    }

    #[test]
    fn test_deserialize_transparent() {
        let value: ExpandableString = serde_yaml::from_str("\"${NAME}\"").unwrap();
        assert_eq!(value.template(), "${NAME}");
    }
}
