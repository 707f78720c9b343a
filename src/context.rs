use std::path::PathBuf;
use std::time::Duration;

use crate::card::Card;
use crate::config::Config;
use crate::favorites::Favorites;
use crate::grading::GradingConfig;
use crate::ledger::ErrorLedger;
use crate::proficiency::ProficiencyStore;
use crate::storage::{
    self, Storage, CREDENTIAL_KEY, ERRORS_KEY, FAVORITES_KEY, MODEL_KEY, PROFICIENCY_KEY,
};

/// 凭据的最后兜底
pub const CREDENTIAL_ENV: &str = "QA_REVIEW_API_KEY";

/// 宿主持有的全部状态：存储句柄、三份长期数据和配置。
#[derive(Debug)]
pub struct Context {
    storage: Storage,
    pub proficiency: ProficiencyStore,
    pub ledger: ErrorLedger,
    pub favorites: Favorites,
    pub config: Config,
}

impl Context {
    pub fn load(storage: Storage, config: Config) -> Self {
        let mut ctx = Self {
            storage,
            proficiency: ProficiencyStore::default(),
            ledger: ErrorLedger::default(),
            favorites: Favorites::default(),
            config,
        };
        ctx.reload();
        ctx
    }

    pub fn open(dir: impl Into<PathBuf>, config: Config) -> storage::Result<Self> {
        Ok(Self::load(Storage::open_dir(dir)?, config))
    }

    pub fn in_memory(config: Config) -> Self {
        Self::load(Storage::in_memory(), config)
    }

    /// 重新从存储读入（导入备份之后）
    pub fn reload(&mut self) {
        self.proficiency = self.storage.load_or_default(PROFICIENCY_KEY);
        self.ledger = self.storage.load_or_default(ERRORS_KEY);
        self.favorites = self.storage.load_or_default(FAVORITES_KEY);
        log::info!(
            "载入数据: 熟练度 {} 条, 错题 {} 条, 收藏 {} 条",
            self.proficiency.len(),
            self.ledger.len(),
            self.favorites.len()
        );
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn save_proficiency(&mut self) -> storage::Result<()> {
        self.storage.save(PROFICIENCY_KEY, &self.proficiency)
    }

    pub fn save_ledger(&mut self) -> storage::Result<()> {
        self.storage.save(ERRORS_KEY, &self.ledger)
    }

    pub fn save_favorites(&mut self) -> storage::Result<()> {
        self.storage.save(FAVORITES_KEY, &self.favorites)
    }

    /// 存储 > 配置文件 > 环境变量
    pub fn credential(&self) -> Option<String> {
        let stored = match self.storage.load::<String>(CREDENTIAL_KEY) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("{e}");
                None
            }
        };
        stored
            .or_else(|| self.config.grading.api_key.clone())
            .or_else(|| std::env::var(CREDENTIAL_ENV).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn model(&self) -> String {
        self.storage
            .load::<String>(MODEL_KEY)
            .ok()
            .flatten()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.grading.model.clone())
    }

    pub fn set_credential(&mut self, key: &str, model: Option<&str>) -> storage::Result<()> {
        let key = key.trim();
        if key.is_empty() {
            self.storage.remove(CREDENTIAL_KEY)?;
        } else {
            self.storage.save(CREDENTIAL_KEY, key)?;
        }
        if let Some(m) = model.map(str::trim).filter(|m| !m.is_empty()) {
            self.storage.save(MODEL_KEY, m)?;
        }
        Ok(())
    }

    pub fn toggle_favorite(&mut self, card: &Card) -> storage::Result<bool> {
        let on = self.favorites.toggle(card);
        self.save_favorites()?;
        Ok(on)
    }

    /// 只删错题本条目，熟练度保持不变。
    pub fn delete_mistakes(&mut self, questions: &[String]) -> storage::Result<usize> {
        let removed = self.ledger.remove_many(questions);
        if removed > 0 {
            self.save_ledger()?;
            log::info!("删除错题 {removed} 条");
        }
        Ok(removed)
    }

    pub fn reset_proficiency(&mut self) -> storage::Result<()> {
        self.proficiency.clear();
        self.save_proficiency()
    }

    pub fn grading_config(&self) -> GradingConfig {
        let g = &self.config.grading;
        GradingConfig {
            credential: self.credential(),
            model: self.model(),
            endpoint: g.endpoint.clone(),
            temperature: g.temperature,
            max_tokens: g.max_tokens,
            timeout: Duration::from_secs(g.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tempfile::TempDir;

    #[test]
    fn test_stores_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let mut ctx = Context::open(temp.path(), Config::default()).unwrap();
            ctx.proficiency.record_mut("A").level = 2;
            ctx.ledger.record_wrong(&Card::new("B", "2", "t"), Local::now());
            ctx.save_proficiency().unwrap();
            ctx.save_ledger().unwrap();
            assert!(ctx.toggle_favorite(&Card::new("C", "3", "t")).unwrap());
        }
        let ctx = Context::open(temp.path(), Config::default()).unwrap();
        assert_eq!(ctx.proficiency.get("A").level, 2);
        assert!(ctx.ledger.contains("B"));
        assert!(ctx.favorites.contains("C"));
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let mut storage = Storage::in_memory();
        storage.write_raw(PROFICIENCY_KEY, "[[[").unwrap();
        let ctx = Context::load(storage, Config::default());
        assert!(ctx.proficiency.is_empty());
    }

    #[test]
    fn test_credential_precedence() {
        let mut config = Config::default();
        config.grading.api_key = Some("from-config".into());
        let mut ctx = Context::in_memory(config);
        assert_eq!(ctx.credential().as_deref(), Some("from-config"));

        ctx.set_credential(" sk-123 ", Some("m1")).unwrap();
        assert_eq!(ctx.credential().as_deref(), Some("sk-123"));
        assert_eq!(ctx.model(), "m1");

        let gc = ctx.grading_config();
        assert_eq!(gc.credential.as_deref(), Some("sk-123"));
        assert_eq!(gc.max_tokens, 512);
    }

    #[test]
    fn test_delete_mistakes_keeps_proficiency() {
        let mut ctx = Context::in_memory(Config::default());
        let card = Card::new("A", "1", "t");
        ctx.proficiency.record_mut("A").level = -1;
        ctx.ledger.record_wrong(&card, Local::now());
        assert_eq!(ctx.delete_mistakes(&["A".to_string()]).unwrap(), 1);
        assert!(ctx.ledger.is_empty());
        assert_eq!(ctx.proficiency.get("A").level, -1);
    }
}
