//! 题库来源。目录后端：
//!
//! ```text
//! <bank_dir>/
//! ├── 机器学习/
//! │   ├── 1.json
//! │   └── 2.json
//! └── add.json
//! ```
//!
//! 单元名是相对路径去掉 `.json`（`机器学习/1`），卡片来源标签取文件名（`1`）。

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::card::Card;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("读取题库失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("题库不是合法 JSON: {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("题库应为数组: {0}")]
    NotAnArray(PathBuf),
}

pub type Result<T> = std::result::Result<T, SourceError>;

pub trait QuestionSource {
    fn units(&self) -> Result<Vec<String>>;

    fn load(&self, unit: &str) -> Result<Vec<Card>>;

    fn load_many(&self, units: &[String]) -> Result<Vec<Card>> {
        let mut bank = Vec::new();
        for unit in units {
            bank.extend(self.load(unit)?);
        }
        Ok(bank)
    }
}

/// 单元名里的最后一段
pub fn unit_label(unit: &str) -> &str {
    unit.rsplit('/').next().unwrap_or(unit)
}

/// 数字段按数值比较：`2` 排在 `10` 前面。
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let key = |s: &str| -> Vec<(u8, u64, String)> {
        s.split('/')
            .map(|seg| match seg.parse::<u64>() {
                Ok(n) => (0, n, String::new()),
                Err(_) => (1, 0, seg.to_string()),
            })
            .collect()
    };
    key(a).cmp(&key(b))
}

#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collect(&self, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Ok(rel) = path.with_extension("").strip_prefix(&self.root) {
                    let unit = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(unit);
                }
            }
        }
        Ok(())
    }
}

impl QuestionSource for DirSource {
    fn units(&self) -> Result<Vec<String>> {
        let mut units = Vec::new();
        if self.root.exists() {
            self.collect(&self.root, &mut units)?;
        }
        units.sort_by(|a, b| natural_cmp(a, b));
        Ok(units)
    }

    fn load(&self, unit: &str) -> Result<Vec<Card>> {
        let path = self.root.join(format!("{unit}.json"));
        let content = fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|source| SourceError::Json {
            path: path.clone(),
            source,
        })?;
        let Value::Array(items) = value else {
            return Err(SourceError::NotAnArray(path));
        };
        let cards = Card::ingest(&items, Some(unit_label(unit)));
        if cards.len() < items.len() {
            log::warn!(
                "{}: 跳过 {} 条缺少题干的记录",
                path.display(),
                items.len() - cards.len()
            );
        }
        Ok(cards)
    }
}
