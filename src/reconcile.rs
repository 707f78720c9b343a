use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::ledger::ErrorLedger;
use crate::proficiency::ProficiencyStore;
use crate::session::SessionState;

/// 自评结果。键位：z=错, x=模糊, g=对。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingOutcome {
    Correct,
    Wrong,
    Vague,
}

impl RatingOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RatingOutcome::Correct => "✅ 掌握",
            RatingOutcome::Wrong => "❌ 错误",
            RatingOutcome::Vague => "🤔 模糊",
        }
    }
}

impl fmt::Display for RatingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RatingOutcome::Correct => "correct",
            RatingOutcome::Wrong => "wrong",
            RatingOutcome::Vague => "vague",
        };
        f.write_str(s)
    }
}

impl FromStr for RatingOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correct" | "right" | "g" => Ok(RatingOutcome::Correct),
            "wrong" | "z" => Ok(RatingOutcome::Wrong),
            "vague" | "x" => Ok(RatingOutcome::Vague),
            other => Err(format!("未知评分: {other}")),
        }
    }
}

/// 答对后错题本如何处理
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePolicy {
    /// 错题本只能手动删除
    #[default]
    PreserveErrors,
    ClearOnCorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerChange {
    Untouched,
    Recorded { count: u32 },
    Cleared,
}

impl LedgerChange {
    pub fn is_touched(&self) -> bool {
        !matches!(self, LedgerChange::Untouched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingEffect {
    pub outcome: RatingOutcome,
    pub level: i32,
    pub carried_over: bool,
    pub ledger: LedgerChange,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GradeReconciler {
    policy: ReconcilePolicy,
}

impl GradeReconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// 把一次自评写进熟练度、错题本和下一轮队列。只改内存，落盘由调用方负责。
    pub fn apply(
        &self,
        card: &Card,
        outcome: RatingOutcome,
        proficiency: &mut ProficiencyStore,
        ledger: &mut ErrorLedger,
        session: &mut SessionState,
        now: DateTime<Local>,
    ) -> RatingEffect {
        let record = proficiency.record_mut(&card.question);
        record.last_time = now.timestamp_millis();

        let mut carried_over = false;
        let mut change = LedgerChange::Untouched;
        match outcome {
            RatingOutcome::Correct => {
                record.level += 1;
                record.is_vague = false;
                if self.policy == ReconcilePolicy::ClearOnCorrect && ledger.remove(&card.question)
                {
                    change = LedgerChange::Cleared;
                }
            }
            RatingOutcome::Wrong => {
                record.level = -1;
                record.is_vague = false;
                session.next_round_queue.push(card.clone());
                carried_over = true;
                let entry = ledger.record_wrong(card, now);
                change = LedgerChange::Recorded { count: entry.count };
            }
            RatingOutcome::Vague => {
                record.is_vague = true;
                if record.level > 0 {
                    record.level -= 1;
                }
                session.next_round_queue.push(card.clone());
                carried_over = true;
            }
        }

        let level = proficiency.get(&card.question).level;
        log::debug!("评分 {outcome}: level={level} ledger={change:?}");
        RatingEffect {
            outcome,
            level,
            carried_over,
            ledger: change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        prof: ProficiencyStore,
        ledger: ErrorLedger,
        session: SessionState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                prof: ProficiencyStore::new(),
                ledger: ErrorLedger::new(),
                session: SessionState::start(vec![]),
            }
        }

        fn rate(&mut self, r: &GradeReconciler, card: &Card, outcome: RatingOutcome) -> RatingEffect {
            r.apply(
                card,
                outcome,
                &mut self.prof,
                &mut self.ledger,
                &mut self.session,
                Local::now(),
            )
        }
    }

    #[test]
    fn test_wrong_then_correct_keeps_ledger_entry() {
        let r = GradeReconciler::default();
        let mut fx = Fixture::new();
        let card = Card::new("A", "1", "t");

        let effect = fx.rate(&r, &card, RatingOutcome::Wrong);
        assert_eq!(effect.level, -1);
        assert!(effect.carried_over);
        assert_eq!(effect.ledger, LedgerChange::Recorded { count: 1 });
        assert_eq!(fx.session.next_round_queue, vec![card.clone()]);
        assert_eq!(fx.ledger.len(), 1);

        let effect = fx.rate(&r, &card, RatingOutcome::Correct);
        assert_eq!(effect.level, 0);
        assert_eq!(effect.ledger, LedgerChange::Untouched);
        assert!(fx.ledger.contains("A"));
        assert_eq!(fx.ledger.len(), 1);
    }

    #[test]
    fn test_clear_on_correct_policy() {
        let r = GradeReconciler::new(ReconcilePolicy::ClearOnCorrect);
        let mut fx = Fixture::new();
        let card = Card::new("A", "1", "t");
        fx.rate(&r, &card, RatingOutcome::Wrong);
        let effect = fx.rate(&r, &card, RatingOutcome::Correct);
        assert_eq!(effect.ledger, LedgerChange::Cleared);
        assert!(fx.ledger.is_empty());
    }

    #[test]
    fn test_level_moves_monotonically() {
        let r = GradeReconciler::default();
        let mut fx = Fixture::new();
        let card = Card::new("A", "1", "t");

        for expected in 1..=3 {
            assert_eq!(fx.rate(&r, &card, RatingOutcome::Correct).level, expected);
        }
        assert_eq!(fx.rate(&r, &card, RatingOutcome::Vague).level, 2);
        assert!(fx.prof.get("A").is_vague);
        assert_eq!(fx.rate(&r, &card, RatingOutcome::Correct).level, 3);
        assert!(!fx.prof.get("A").is_vague);
        assert_eq!(fx.rate(&r, &card, RatingOutcome::Wrong).level, -1);
    }

    #[test]
    fn test_vague_never_goes_below_zero_and_skips_ledger() {
        let r = GradeReconciler::default();
        let mut fx = Fixture::new();
        let card = Card::new("A", "1", "t");

        let effect = fx.rate(&r, &card, RatingOutcome::Vague);
        assert_eq!(effect.level, 0);
        assert!(fx.ledger.is_empty());
        assert_eq!(fx.session.next_round_queue.len(), 1);

        fx.rate(&r, &card, RatingOutcome::Wrong);
        assert_eq!(fx.rate(&r, &card, RatingOutcome::Vague).level, -1);
    }

    #[test]
    fn test_last_time_is_set() {
        let r = GradeReconciler::default();
        let mut fx = Fixture::new();
        fx.rate(&r, &Card::new("A", "1", "t"), RatingOutcome::Correct);
        assert!(fx.prof.get("A").last_time > 0);
    }

    #[test]
    fn test_parse_outcome() {
        assert_eq!("g".parse::<RatingOutcome>(), Ok(RatingOutcome::Correct));
        assert_eq!("Wrong".parse::<RatingOutcome>(), Ok(RatingOutcome::Wrong));
        assert_eq!("x".parse::<RatingOutcome>(), Ok(RatingOutcome::Vague));
        assert!("maybe".parse::<RatingOutcome>().is_err());
    }
}
