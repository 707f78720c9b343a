//! `config.toml`：
//!
//! ```toml
//! [scheduler]
//! new_cap = 20
//!
//! [grading]
//! model = "Qwen/Qwen2.5-14B-Instruct"
//! timeout_secs = 30
//!
//! [review]
//! clear_errors_on_correct = false
//!
//! [ui]
//! theme = "dark"
//!
//! [ui.keys]
//! z = "wrong"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reconcile::ReconcilePolicy;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_ENDPOINT: &str = "https://api.siliconflow.cn/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-14B-Instruct";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置失败: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// 存储里没有凭据时才用
    pub api_key: Option<String>,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.1,
            max_tokens: 512,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    pub clear_errors_on_correct: bool,
    pub seed: Option<u64>,
}

impl ReviewSettings {
    pub fn policy(&self) -> ReconcilePolicy {
        if self.clear_errors_on_correct {
            ReconcilePolicy::ClearOnCorrect
        } else {
            ReconcilePolicy::PreserveErrors
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub theme: String,
    pub bank_dir: Option<PathBuf>,
    /// 单字符 -> 动作名
    pub keys: HashMap<String, String>,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: "dark".into(),
            bank_dir: None,
            keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub grading: GradingSettings,
    pub review: ReviewSettings,
    pub ui: UiSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 文件不存在时返回默认配置；内容有误仍然报错。
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("未找到配置 {}，使用默认值", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [scheduler]
            new_cap = 5

            [review]
            clear_errors_on_correct = true
            seed = 7

            [ui.keys]
            z = "wrong"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.new_cap, 5);
        assert_eq!(cfg.scheduler.easy_min, 5);
        assert_eq!(cfg.grading.model, DEFAULT_MODEL);
        assert_eq!(cfg.review.policy(), ReconcilePolicy::ClearOnCorrect);
        assert_eq!(cfg.review.seed, Some(7));
        assert_eq!(cfg.ui.theme, "dark");
        assert_eq!(cfg.ui.keys.get("z").map(String::as_str), Some("wrong"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let cfg = Config::load_or_default(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_bad_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[scheduler\nnew_cap = ").unwrap();
        assert!(matches!(
            Config::load_or_default(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
