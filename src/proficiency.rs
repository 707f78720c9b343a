use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 单题熟练度。`level < 0` 表示最近一次答错。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProficiencyRecord {
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub is_vague: bool,
    /// 毫秒时间戳，0 表示从未评分
    #[serde(default)]
    pub last_time: i64,
}

impl ProficiencyRecord {
    pub fn is_unseen(&self) -> bool {
        self.last_time == 0 && self.level == 0 && !self.is_vague
    }
}

/// 题干的存储键：逐个 UTF-16 码元做 `h * 31 + c`（32 位回绕），
/// 与旧版导出的备份保持同一套键。
pub fn question_key(question: &str) -> String {
    let mut hash: i32 = 0;
    for unit in question.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    format!("q_{hash}")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProficiencyStore {
    records: BTreeMap<String, ProficiencyRecord>,
}

impl ProficiencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只读查询，不会创建记录。
    pub fn get(&self, question: &str) -> ProficiencyRecord {
        self.records
            .get(&question_key(question))
            .copied()
            .unwrap_or_default()
    }

    pub fn record_mut(&mut self, question: &str) -> &mut ProficiencyRecord {
        self.records.entry(question_key(question)).or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProficiencyRecord)> {
        self.records.iter()
    }

    /// (答错中, 新, 模糊/低熟练, 熟练)
    pub fn level_counts(&self) -> (usize, usize, usize, usize) {
        let mut out = (0, 0, 0, 0);
        for r in self.records.values() {
            match r.level {
                l if l < 0 => out.0 += 1,
                0 if !r.is_vague => out.1 += 1,
                l if r.is_vague || l <= 2 => out.2 += 1,
                _ => out.3 += 1,
            }
        }
        out
    }
}
