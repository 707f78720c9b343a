use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::storage::{self, Storage, SESSION_KEY};

fn first_round() -> u32 {
    1
}

/// 进程内唯一的“继续上次进度”状态，每次变动后落盘。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_active: bool,
    #[serde(default)]
    pub queue: Vec<Card>,
    #[serde(default)]
    pub next_round_queue: Vec<Card>,
    #[serde(default = "first_round")]
    pub round: u32,
    #[serde(default)]
    pub current_card: Option<Card>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_active: false,
            queue: Vec::new(),
            next_round_queue: Vec::new(),
            round: 1,
            current_card: None,
        }
    }
}

/// 大厅“继续”按钮上展示的摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub round: u32,
    pub remaining: usize,
    pub carried: usize,
}

impl SessionState {
    pub fn start(queue: Vec<Card>) -> Self {
        Self {
            is_active: true,
            queue,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.round >= 1
    }

    /// 还有东西可继续：队列、在途卡片或下一轮待复习。
    pub fn has_pending(&self) -> bool {
        self.is_active
            && (!self.queue.is_empty()
                || self.current_card.is_some()
                || !self.next_round_queue.is_empty())
    }

    /// 本轮剩余（含在途卡片）
    pub fn remaining(&self) -> usize {
        self.queue.len() + usize::from(self.current_card.is_some())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            round: self.round,
            remaining: self.remaining(),
            carried: self.next_round_queue.len(),
        }
    }

    /// 从队尾取下一张作为当前卡片。
    pub fn pop_next(&mut self) -> Option<&Card> {
        self.current_card = self.queue.pop();
        self.current_card.as_ref()
    }

    /// 下一轮：打乱遗留的题目作为新队列。
    pub fn start_next_round<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut queue = std::mem::take(&mut self.next_round_queue);
        queue.shuffle(rng);
        self.queue = queue;
        self.round += 1;
    }

    /// 读取存档；解析失败或结构非法时丢弃存档并返回 `None`。
    pub fn load(storage: &mut Storage) -> Option<SessionState> {
        match storage.load::<SessionState>(SESSION_KEY) {
            Ok(Some(s)) if s.is_valid() => Some(s),
            Ok(Some(s)) => {
                log::warn!("存档结构非法 (round={})，已丢弃", s.round);
                Self::discard(storage);
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("{e}，已丢弃存档");
                Self::discard(storage);
                None
            }
        }
    }

    fn discard(storage: &mut Storage) {
        if let Err(e) = storage.remove(SESSION_KEY) {
            log::error!("删除损坏存档失败: {e}");
        }
    }

    /// 只保存进行中的会话。
    pub fn save(&self, storage: &mut Storage) -> storage::Result<()> {
        if !self.is_active {
            return Ok(());
        }
        storage.save(SESSION_KEY, self)
    }

    pub fn clear(storage: &mut Storage) -> storage::Result<()> {
        storage.remove(SESSION_KEY)
    }
}
