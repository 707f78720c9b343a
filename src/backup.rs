//! 备份与恢复：全部逻辑键打进一个 JSON 文档。
//!
//! 导入同时接受旧格式（`stats`/`errors`/`favorites` 的值是再编码过一次的
//! JSON 字符串，`apiKey`/`model` 是裸字符串）。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confirm::Confirm;
use crate::context::Context;
use crate::favorites::Favorites;
use crate::ledger::ErrorLedger;
use crate::proficiency::ProficiencyStore;
use crate::session::SessionState;
use crate::storage::{
    StorageError, CREDENTIAL_KEY, ERRORS_KEY, FAVORITES_KEY, MODEL_KEY, PROFICIENCY_KEY,
    SESSION_KEY,
};

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("读写备份文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("备份不是合法 JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("文件格式不对")]
    InvalidFormat,

    #[error("备份字段 {field} 损坏: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, BackupError>;

/// 字段值可以是对象本身，也可以是它的 JSON 字符串。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embedded<T> {
    Inline(T),
    Encoded(String),
}

impl<T: DeserializeOwned> Embedded<T> {
    fn is_blank(&self) -> bool {
        matches!(self, Embedded::Encoded(s) if s.trim().is_empty() || s.trim() == "null")
    }

    pub fn decode(self, field: &'static str) -> Result<T> {
        match self {
            Embedded::Inline(v) => Ok(v),
            Embedded::Encoded(s) => {
                serde_json::from_str(&s).map_err(|source| BackupError::Field { field, source })
            }
        }
    }
}

fn present<T: DeserializeOwned>(v: &Option<Embedded<T>>) -> bool {
    v.as_ref().map(|e| !e.is_blank()).unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub date: String,
    #[serde(
        rename = "proficiency-map",
        alias = "stats",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub proficiency: Option<Embedded<ProficiencyStore>>,
    #[serde(
        rename = "long-term-errors",
        alias = "errors",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub errors: Option<Embedded<ErrorLedger>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites: Option<Embedded<Favorites>>,
    #[serde(
        rename = "session-state",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub session: Option<Embedded<SessionState>>,
    #[serde(
        rename = "api-credential",
        alias = "apiKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential: Option<Embedded<String>>,
    #[serde(
        rename = "api-model",
        alias = "model",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<Embedded<String>>,
}

impl BackupDocument {
    /// 熟练度和错题本至少要有一样
    pub fn validate(&self) -> Result<()> {
        if present(&self.proficiency) || present(&self.errors) {
            Ok(())
        } else {
            Err(BackupError::InvalidFormat)
        }
    }

    pub fn confirm_message(&self) -> String {
        format!(
            "检测到备份文件 ({})。\n导入将【覆盖】当前的错题本和熟练度。\n确定要导入吗？",
            self.date
        )
    }
}

pub fn default_file_name(date: NaiveDate) -> String {
    format!("QA_Review_Backup_{}.json", date.format("%Y-%m-%d"))
}

pub fn export(ctx: &Context) -> BackupDocument {
    let storage = ctx.storage();
    let stored = |key: &str| -> Option<Embedded<String>> {
        storage
            .load::<String>(key)
            .ok()
            .flatten()
            .map(Embedded::Inline)
    };
    let session = storage
        .load::<SessionState>(SESSION_KEY)
        .ok()
        .flatten()
        .filter(SessionState::has_pending)
        .map(Embedded::Inline);

    BackupDocument {
        version: BACKUP_VERSION.into(),
        date: Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
        proficiency: Some(Embedded::Inline(ctx.proficiency.clone())),
        errors: Some(Embedded::Inline(ctx.ledger.clone())),
        favorites: Some(Embedded::Inline(ctx.favorites.clone())),
        session,
        credential: stored(CREDENTIAL_KEY),
        model: stored(MODEL_KEY),
    }
}

pub fn export_to_file(ctx: &Context, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| BackupError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let s = serde_json::to_string_pretty(&export(ctx))?;
    fs::write(path, s).map_err(|source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("已导出备份: {}", path.display());
    Ok(())
}

pub fn parse_backup(content: &str) -> Result<BackupDocument> {
    let doc: BackupDocument = serde_json::from_str(content)?;
    doc.validate()?;
    Ok(doc)
}

pub fn read_backup(path: &Path) -> Result<BackupDocument> {
    let content = fs::read_to_string(path).map_err(|source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_backup(&content)
}

fn decode_field<T: DeserializeOwned>(
    value: Option<Embedded<T>>,
    field: &'static str,
) -> Result<Option<T>> {
    match value {
        Some(e) if !e.is_blank() => e.decode(field).map(Some),
        _ => Ok(None),
    }
}

/// 覆盖备份里出现的每个键，没出现的保持原样。返回写入的键。
pub fn apply_backup(ctx: &mut Context, doc: BackupDocument) -> Result<Vec<&'static str>> {
    doc.validate()?;
    // 先全部解码，避免坏字段导致只写了一半
    let proficiency = decode_field(doc.proficiency, PROFICIENCY_KEY)?;
    let errors = decode_field(doc.errors, ERRORS_KEY)?;
    let favorites = decode_field(doc.favorites, FAVORITES_KEY)?;
    let session = decode_field(doc.session, SESSION_KEY)?;
    let credential = decode_field(doc.credential, CREDENTIAL_KEY)?;
    let model = decode_field(doc.model, MODEL_KEY)?;

    let mut written = Vec::new();
    let storage = ctx.storage_mut();
    if let Some(v) = proficiency {
        storage.save(PROFICIENCY_KEY, &v)?;
        written.push(PROFICIENCY_KEY);
    }
    if let Some(v) = errors {
        storage.save(ERRORS_KEY, &v)?;
        written.push(ERRORS_KEY);
    }
    if let Some(v) = favorites {
        storage.save(FAVORITES_KEY, &v)?;
        written.push(FAVORITES_KEY);
    }
    if let Some(v) = session {
        storage.save(SESSION_KEY, &v)?;
        written.push(SESSION_KEY);
    }
    if let Some(v) = credential.filter(|k| !k.trim().is_empty()) {
        storage.save(CREDENTIAL_KEY, v.trim())?;
        written.push(CREDENTIAL_KEY);
    }
    if let Some(v) = model.filter(|m| !m.trim().is_empty()) {
        storage.save(MODEL_KEY, v.trim())?;
        written.push(MODEL_KEY);
    }

    ctx.reload();
    log::info!("导入备份: {}", written.join(", "));
    Ok(written)
}

/// 用户确认后才覆盖。返回是否真的导入了。
pub async fn import_with_confirm(
    ctx: &mut Context,
    doc: BackupDocument,
    confirm: &dyn Confirm,
) -> Result<bool> {
    doc.validate()?;
    if !confirm.confirm(&doc.confirm_message()).await {
        log::info!("取消导入");
        return Ok(false);
    }
    apply_backup(ctx, doc)?;
    confirm.notify("数据恢复成功！").await;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::config::Config;
    use crate::confirm::AutoConfirm;
    use tempfile::TempDir;

    fn populated() -> Context {
        let mut ctx = Context::in_memory(Config::default());
        ctx.proficiency.record_mut("A").level = 3;
        ctx.ledger.record_wrong(&Card::new("B", "2", "ch"), Local::now());
        ctx.favorites.toggle(&Card::new("C", "3", "ch"));
        ctx.set_credential("sk-1", Some("m-1")).unwrap();
        ctx
    }

    #[test]
    fn test_export_then_import_into_fresh_context() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join(default_file_name(Local::now().date_naive()));
        export_to_file(&populated(), &path).unwrap();

        let doc = read_backup(&path).unwrap();
        assert_eq!(doc.version, BACKUP_VERSION);

        let mut fresh = Context::in_memory(Config::default());
        let written = apply_backup(&mut fresh, doc).unwrap();
        assert!(written.contains(&PROFICIENCY_KEY));
        assert_eq!(fresh.proficiency.get("A").level, 3);
        assert!(fresh.ledger.contains("B"));
        assert!(fresh.favorites.contains("C"));
        assert_eq!(fresh.credential().as_deref(), Some("sk-1"));
        assert_eq!(fresh.model(), "m-1");
    }

    #[test]
    fn test_legacy_document_with_encoded_strings() {
        let legacy = serde_json::json!({
            "version": "1.0",
            "date": "2024/6/1 10:00:00",
            "stats": r#"{"q_65":{"level":2,"isVague":false,"lastTime":1}}"#,
            "errors": r#"[{"question":"B","answer":"2","count":4,"lastDate":"x","source":"ch"}]"#,
            "favorites": null,
            "apiKey": "sk-legacy",
            "model": null
        });
        let doc = parse_backup(&legacy.to_string()).unwrap();
        assert_eq!(doc.confirm_message().lines().next(), Some("检测到备份文件 (2024/6/1 10:00:00)。"));

        let mut ctx = Context::in_memory(Config::default());
        ctx.favorites.toggle(&Card::new("keep", "", "t"));
        ctx.save_favorites().unwrap();
        apply_backup(&mut ctx, doc).unwrap();

        assert_eq!(ctx.proficiency.get("A").level, 2);
        assert_eq!(ctx.ledger.get("B").map(|e| e.count), Some(4));
        // 备份里没有收藏，原有的保留
        assert!(ctx.favorites.contains("keep"));
        assert_eq!(ctx.credential().as_deref(), Some("sk-legacy"));
    }

    #[test]
    fn test_missing_stats_and_errors_rejected() {
        let err = parse_backup(r#"{"version":"1.0","favorites":"[]"}"#).unwrap_err();
        assert!(matches!(err, BackupError::InvalidFormat));
        assert_eq!(err.to_string(), "文件格式不对");
        assert!(matches!(
            parse_backup(r#"{"stats":"","errors":null}"#),
            Err(BackupError::InvalidFormat)
        ));
    }

    #[test]
    fn test_corrupt_field_writes_nothing() {
        let doc = parse_backup(r#"{"stats":"{}","errors":"[oops"}"#).unwrap();
        let mut ctx = populated();
        assert!(matches!(
            apply_backup(&mut ctx, doc),
            Err(BackupError::Field { field: ERRORS_KEY, .. })
        ));
        assert_eq!(ctx.proficiency.get("A").level, 3);
    }

    #[tokio::test]
    async fn test_declined_import_leaves_data() {
        let doc = export(&Context::in_memory(Config::default()));
        let mut ctx = populated();
        let imported = import_with_confirm(&mut ctx, doc.clone(), &AutoConfirm(false))
            .await
            .unwrap();
        assert!(!imported);
        assert_eq!(ctx.proficiency.get("A").level, 3);

        assert!(import_with_confirm(&mut ctx, doc, &AutoConfirm(true)).await.unwrap());
        assert!(ctx.proficiency.is_empty());
        assert!(ctx.ledger.is_empty());
    }
}
