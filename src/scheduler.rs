//! 复习队列调度
//!
//! 按熟练度与错题本把题库分成四桶：
//! - hard：在错题本里，或 level < 0
//! - new：level == 0
//! - vague：标记模糊，或 0 < level <= 2
//! - easy：其余
//!
//! 攻坚与模糊全量进入，新题限量，熟练题按比例抽查，最后整体打乱。
//! 重做模式（错题本/收藏/手选）直接沿用调用方给的顺序。

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::Card;
use crate::ledger::ErrorLedger;
use crate::proficiency::{ProficiencyRecord, ProficiencyStore};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("没有题目！")]
    EmptyBank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 单次最多引入的新题
    pub new_cap: usize,
    /// 熟练题最少抽查数
    pub easy_min: usize,
    /// 熟练题抽查比例
    pub easy_ratio: f64,
    /// 队列少于该值且新题有富余时补新题
    pub backfill_threshold: usize,
    pub backfill: usize,
    /// level 不超过该值仍算“模糊”
    pub vague_max_level: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            new_cap: 20,
            easy_min: 5,
            easy_ratio: 0.1,
            backfill_threshold: 10,
            backfill: 10,
            vague_max_level: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub retry_mode: bool,
}

impl LaunchOptions {
    pub fn retry() -> Self {
        Self { retry_mode: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hard,
    New,
    Vague,
    Easy,
}

pub fn classify(record: &ProficiencyRecord, in_ledger: bool, vague_max_level: i32) -> Bucket {
    if in_ledger || record.level < 0 {
        Bucket::Hard
    } else if record.level == 0 {
        Bucket::New
    } else if record.is_vague || record.level <= vague_max_level {
        Bucket::Vague
    } else {
        Bucket::Easy
    }
}

/// 各桶原始大小，用于“计划生成”提示
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketSummary {
    pub hard: usize,
    pub vague: usize,
    pub new: usize,
    pub easy: usize,
    pub queued: usize,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub queue: Vec<Card>,
    pub summary: BucketSummary,
}

#[derive(Debug)]
pub struct ReviewQueueScheduler {
    config: SchedulerConfig,
    rng: ChaCha8Rng,
}

impl ReviewQueueScheduler {
    /// `seed` 为 `None` 时取系统熵；给定种子则结果可复现。
    pub fn new(config: SchedulerConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Fisher–Yates 洗牌
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    pub fn schedule(
        &mut self,
        bank: Vec<Card>,
        proficiency: &ProficiencyStore,
        ledger: &ErrorLedger,
        options: LaunchOptions,
    ) -> Result<Schedule, ScheduleError> {
        if bank.is_empty() {
            return Err(ScheduleError::EmptyBank);
        }

        if options.retry_mode {
            let queued = bank.len();
            return Ok(Schedule {
                queue: bank,
                summary: BucketSummary {
                    hard: queued,
                    queued,
                    ..BucketSummary::default()
                },
            });
        }

        let in_ledger = ledger.questions();
        let mut hard = Vec::new();
        let mut vague = Vec::new();
        let mut new = Vec::new();
        let mut easy = Vec::new();
        for card in &bank {
            if card.question.is_empty() {
                continue;
            }
            let record = proficiency.get(&card.question);
            let bucket = classify(
                &record,
                in_ledger.contains(card.question.as_str()),
                self.config.vague_max_level,
            );
            match bucket {
                Bucket::Hard => hard.push(card.clone()),
                Bucket::New => new.push(card.clone()),
                Bucket::Vague => vague.push(card.clone()),
                Bucket::Easy => easy.push(card.clone()),
            }
        }

        let mut summary = BucketSummary {
            hard: hard.len(),
            vague: vague.len(),
            new: new.len(),
            easy: easy.len(),
            queued: 0,
        };

        let mut queue = Vec::with_capacity(hard.len() + vague.len() + self.config.new_cap);
        queue.append(&mut hard);
        queue.append(&mut vague);

        self.shuffle(&mut new);
        queue.extend(new.iter().take(self.config.new_cap).cloned());

        self.shuffle(&mut easy);
        let easy_take = self
            .config
            .easy_min
            .max((easy.len() as f64 * self.config.easy_ratio).floor() as usize);
        queue.extend(easy.into_iter().take(easy_take));

        if queue.len() < self.config.backfill_threshold && new.len() > self.config.new_cap {
            let end = (self.config.new_cap + self.config.backfill).min(new.len());
            queue.extend(new[self.config.new_cap..end].iter().cloned());
        }

        dedup_by_question(&mut queue);
        if queue.is_empty() {
            queue = bank;
            dedup_by_question(&mut queue);
        }

        self.shuffle(&mut queue);
        summary.queued = queue.len();
        log::info!(
            "计划生成: 攻坚 {} 模糊 {} 新 {} 熟练 {} -> 队列 {}",
            summary.hard,
            summary.vague,
            summary.new,
            summary.easy,
            summary.queued
        );
        Ok(Schedule { queue, summary })
    }
}

fn dedup_by_question(queue: &mut Vec<Card>) {
    let mut seen = HashSet::new();
    queue.retain(|c| seen.insert(c.question.clone()));
}
