//! フック定義

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// フック名 (`predeploy` など) からフック一覧へのマップ
pub type HooksConfig = BTreeMap<String, HookList>;

/// シェルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Sh,
    Pwsh,
}

/// フック定義
///
/// YAML形式：
/// ```yaml
/// hooks:
///   predeploy:
///     shell: sh
///     run: ./scripts/predeploy.sh
///     continueOnError: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub shell: Option<ShellKind>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Windows で実行する場合の上書き設定
    #[serde(default)]
    pub windows: Option<Box<HookConfig>>,
    /// Linux / macOS で実行する場合の上書き設定
    #[serde(default)]
    pub posix: Option<Box<HookConfig>>,
}

impl HookConfig {
    /// 実行中のOSに合わせた設定を返す
    pub fn for_current_platform(&self) -> &HookConfig {
        let platform = if cfg!(windows) {
            self.windows.as_deref()
        } else {
            self.posix.as_deref()
        };
        platform.unwrap_or(self)
    }
}

/// 単一定義とリスト定義の両方を受け付けるフック一覧
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HookList(pub Vec<HookConfig>);

impl<'de> Deserialize<'de> for HookList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(HookConfig),
            Many(Vec<HookConfig>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(hook) => HookList(vec![hook]),
            OneOrMany::Many(hooks) => HookList(hooks),
        })
    }
}

/// フック名を (pre/post, コマンド名) に分解
pub fn hook_phase(name: &str) -> (Option<HookPhase>, &str) {
    if let Some(rest) = name.strip_prefix("pre")
        && !rest.is_empty()
    {
        return (Some(HookPhase::Pre), rest);
    }
    if let Some(rest) = name.strip_prefix("post")
        && !rest.is_empty()
    {
        return (Some(HookPhase::Post), rest);
    }
    (None, name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Pre,
    Post,
}

/// `external` を `base` にマージ (同名のフックは `base` の後ろに追加)
pub fn merge_hooks(base: &mut HooksConfig, external: HooksConfig) {
    for (name, hooks) in external {
        base.entry(name).or_default().0.extend(hooks.0);
    }
}
