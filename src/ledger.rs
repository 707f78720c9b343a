use std::collections::HashSet;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::card::{Card, DEFAULT_SOURCE};

pub const LEDGER_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

fn default_count() -> u32 {
    1
}

fn default_source() -> String {
    DEFAULT_SOURCE.into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLedgerEntry {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub last_date: String,
    #[serde(default = "default_source")]
    pub source: String,
}

impl ErrorLedgerEntry {
    /// 3 次及以上算高频错题
    pub fn is_frequent(&self) -> bool {
        self.count >= 3
    }

    pub fn to_card(&self) -> Card {
        Card::new(&self.question, &self.answer, &self.source)
    }
}

/// 长期错题本：每个题干一条，只增不自动删，除非手动移除。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLedger {
    entries: Vec<ErrorLedgerEntry>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, question: &str) -> bool {
        self.entries.iter().any(|e| e.question == question)
    }

    pub fn get(&self, question: &str) -> Option<&ErrorLedgerEntry> {
        self.entries.iter().find(|e| e.question == question)
    }

    pub fn questions(&self) -> HashSet<&str> {
        self.entries.iter().map(|e| e.question.as_str()).collect()
    }

    /// 答错一次：已有则计数 +1，否则新建。
    pub fn record_wrong(&mut self, card: &Card, now: DateTime<Local>) -> &ErrorLedgerEntry {
        let last_date = now.format(LEDGER_DATE_FORMAT).to_string();
        let idx = match self.entries.iter().position(|e| e.question == card.question) {
            Some(i) => {
                let e = &mut self.entries[i];
                e.count = e.count.max(1) + 1;
                e.last_date = last_date;
                i
            }
            None => {
                self.entries.push(ErrorLedgerEntry {
                    question: card.question.clone(),
                    answer: card.answer.clone(),
                    count: 1,
                    last_date,
                    source: card.source.clone(),
                });
                self.entries.len() - 1
            }
        };
        &self.entries[idx]
    }

    pub fn remove(&mut self, question: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.question != question);
        before != self.entries.len()
    }

    pub fn remove_many(&mut self, questions: &[String]) -> usize {
        let targets: HashSet<&str> = questions.iter().map(String::as_str).collect();
        let before = self.entries.len();
        self.entries.retain(|e| !targets.contains(e.question.as_str()));
        before - self.entries.len()
    }

    /// 按错误次数倒序（同次数保持录入顺序）。
    pub fn sorted_by_count(&self) -> Vec<&ErrorLedgerEntry> {
        let mut v: Vec<&ErrorLedgerEntry> = self.entries.iter().collect();
        v.sort_by(|a, b| b.count.cmp(&a.count));
        v
    }

    /// 错题复习队列：按错误次数倒序，`selection` 为空表示全部。
    pub fn retry_cards(&self, selection: Option<&[String]>) -> Vec<Card> {
        let wanted: Option<HashSet<&str>> =
            selection.map(|s| s.iter().map(String::as_str).collect());
        self.sorted_by_count()
            .into_iter()
            .filter(|e| {
                wanted
                    .as_ref()
                    .map(|w| w.contains(e.question.as_str()))
                    .unwrap_or(true)
            })
            .map(ErrorLedgerEntry::to_card)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorLedgerEntry> {
        self.entries.iter()
    }
}
