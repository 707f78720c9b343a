//! 按逻辑键持久化：每个键一份 JSON。
//!
//! 目录后端的布局：
//! ```text
//! <data_dir>/
//! ├── proficiency-map.json
//! ├── long-term-errors.json
//! ├── favorites.json
//! ├── session-state.json
//! ├── api-credential.json
//! └── api-model.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const PROFICIENCY_KEY: &str = "proficiency-map";
pub const ERRORS_KEY: &str = "long-term-errors";
pub const FAVORITES_KEY: &str = "favorites";
pub const SESSION_KEY: &str = "session-state";
pub const CREDENTIAL_KEY: &str = "api-credential";
pub const MODEL_KEY: &str = "api-model";

pub const ALL_KEYS: [&str; 6] = [
    PROFICIENCY_KEY,
    ERRORS_KEY,
    FAVORITES_KEY,
    SESSION_KEY,
    CREDENTIAL_KEY,
    MODEL_KEY,
];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("读写 {key} 失败: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{key} 内容损坏: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// 存储引擎。读不到返回 `Ok(None)`。
pub trait Backend: Send {
    fn read(&self, key: &str) -> std::io::Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> std::io::Result<()>;
    fn remove(&mut self, key: &str) -> std::io::Result<()>;
}

/// 一个键一个文件，先写临时文件再改名。
#[derive(Debug)]
pub struct DirBackend {
    dir: PathBuf,
}

impl DirBackend {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Backend for DirBackend {
    fn read(&self, key: &str) -> std::io::Result<Option<String>> {
        let path = self.path_of(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path).map(Some)
    }

    fn write(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        let path = self.path_of(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }

    fn remove(&mut self, key: &str) -> std::io::Result<()> {
        let path = self.path_of(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl Backend for MemoryBackend {
    fn read(&self, key: &str) -> std::io::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> std::io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

pub struct Storage {
    backend: Box<dyn Backend>,
}

impl Storage {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let backend = DirBackend::new(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self::new(backend))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.read_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
    }

    /// 读不到或内容损坏时退回默认值，只记日志。
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.load(key) {
            Ok(Some(v)) => v,
            Ok(None) => T::default(),
            Err(e) => {
                log::warn!("{e}，按空数据处理");
                T::default()
            }
        }
    }

    pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let s = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.write_raw(key, &s)
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.backend.remove(key).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.read_raw(key)?.is_some())
    }

    /// 已经写过的逻辑键，按 `ALL_KEYS` 的顺序
    pub fn present_keys(&self) -> Result<Vec<&'static str>> {
        let mut present = Vec::new();
        for key in ALL_KEYS {
            if self.contains(key)? {
                present.push(key);
            }
        }
        Ok(present)
    }

    pub fn read_raw(&self, key: &str) -> Result<Option<String>> {
        self.backend.read(key).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }

    pub fn write_raw(&mut self, key: &str, value: &str) -> Result<()> {
        self.backend.write(key, value).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
