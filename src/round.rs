//! 多轮复习状态机
//!
//! ```text
//! Idle --launch--> RoundActive --rate(最后一张)--> RoundEndConfirm
//!                      ^                              |  继续: 打乱遗留题, round+1
//!                      +------------------------------+
//!                                                     |  遗留为空
//!                                                     v
//!                                                   Ended
//! ```
//!
//! 每次变动都先写盘再弹下一张。

use chrono::Local;
use thiserror::Error;

use crate::card::Card;
use crate::confirm::Confirm;
use crate::context::Context;
use crate::reconcile::{GradeReconciler, RatingEffect, RatingOutcome};
use crate::scheduler::{
    BucketSummary, LaunchOptions, ReviewQueueScheduler, ScheduleError,
};
use crate::session::{SessionState, SessionSummary};
use crate::storage::{StorageError, ERRORS_KEY, PROFICIENCY_KEY};

pub const ALL_CLEARED: &str = "🎉 本轮复习完成！所有题目已攻克。";

#[derive(Error, Debug)]
pub enum RoundError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("当前没有正在作答的题目")]
    NoCurrentCard,

    #[error("本轮尚未结束")]
    NotAtRoundEnd,
}

pub type Result<T> = std::result::Result<T, RoundError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    RoundActive,
    RoundEndConfirm,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Card(Card),
    /// 本轮结束，`remaining` 道题留到下一轮
    RoundEnd { round: u32, remaining: usize },
    SessionComplete,
}

/// 本次运行的评分计数，不落盘
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub total: usize,
    pub correct: usize,
    pub wrong: usize,
    pub vague: usize,
}

impl SessionStats {
    fn record(&mut self, outcome: RatingOutcome) {
        self.total += 1;
        match outcome {
            RatingOutcome::Correct => self.correct += 1,
            RatingOutcome::Wrong => self.wrong += 1,
            RatingOutcome::Vague => self.vague += 1,
        }
    }
}

pub fn round_end_message(round: u32, remaining: usize) -> String {
    format!("Round {round} 结束。还有 {remaining} 道题没过。是否继续下一轮？")
}

#[derive(Debug)]
pub struct RoundManager {
    ctx: Context,
    state: SessionState,
    phase: RoundPhase,
    scheduler: ReviewQueueScheduler,
    reconciler: GradeReconciler,
    stats: SessionStats,
    last_summary: Option<BucketSummary>,
    last_effect: Option<RatingEffect>,
}

impl RoundManager {
    /// `seed` 优先，其次取配置里的 `[review] seed`。
    pub fn new(ctx: Context, seed: Option<u64>) -> Self {
        let seed = seed.or(ctx.config.review.seed);
        let scheduler = ReviewQueueScheduler::new(ctx.config.scheduler.clone(), seed);
        let reconciler = GradeReconciler::new(ctx.config.review.policy());
        Self {
            ctx,
            state: SessionState::default(),
            phase: RoundPhase::Idle,
            scheduler,
            reconciler,
            stats: SessionStats::default(),
            last_summary: None,
            last_effect: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn last_summary(&self) -> Option<BucketSummary> {
        self.last_summary
    }

    pub fn last_effect(&self) -> Option<RatingEffect> {
        self.last_effect
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.state.current_card.as_ref()
    }

    /// 新开一场复习，覆盖任何旧存档。
    pub fn launch(&mut self, bank: Vec<Card>, options: LaunchOptions) -> Result<Step> {
        let schedule = self.scheduler.schedule(
            bank,
            &self.ctx.proficiency,
            &self.ctx.ledger,
            options,
        )?;
        self.last_summary = Some(schedule.summary);
        self.last_effect = None;
        self.stats = SessionStats::default();
        self.state = SessionState::start(schedule.queue);
        self.phase = RoundPhase::RoundActive;
        self.advance()
    }

    pub fn rate(&mut self, outcome: RatingOutcome) -> Result<Step> {
        if self.phase != RoundPhase::RoundActive {
            return Err(RoundError::NoCurrentCard);
        }
        let card = self
            .state
            .current_card
            .clone()
            .ok_or(RoundError::NoCurrentCard)?;

        // 在副本上评分，全部写盘成功后才替换内存中的状态
        let mut proficiency = self.ctx.proficiency.clone();
        let mut ledger = self.ctx.ledger.clone();
        let mut state = self.state.clone();
        let effect = self.reconciler.apply(
            &card,
            outcome,
            &mut proficiency,
            &mut ledger,
            &mut state,
            Local::now(),
        );
        state.current_card = None;

        // 会话先落盘：中途退出最多丢掉这一次评分，不会重复计入
        let storage = self.ctx.storage_mut();
        state.save(storage)?;
        storage.save(PROFICIENCY_KEY, &proficiency)?;
        if effect.ledger.is_touched() {
            storage.save(ERRORS_KEY, &ledger)?;
        }

        self.ctx.proficiency = proficiency;
        self.ctx.ledger = ledger;
        self.state = state;
        self.stats.record(outcome);
        self.last_effect = Some(effect);
        self.advance()
    }

    fn advance(&mut self) -> Result<Step> {
        if let Some(card) = self.state.pop_next().cloned() {
            self.state.save(self.ctx.storage_mut())?;
            self.phase = RoundPhase::RoundActive;
            return Ok(Step::Card(card));
        }

        self.state.save(self.ctx.storage_mut())?;
        self.phase = RoundPhase::RoundEndConfirm;
        if self.state.next_round_queue.is_empty() {
            self.complete()?;
            return Ok(Step::SessionComplete);
        }
        log::info!(
            "Round {} 结束，遗留 {} 道",
            self.state.round,
            self.state.next_round_queue.len()
        );
        Ok(self.round_end_step())
    }

    fn round_end_step(&self) -> Step {
        Step::RoundEnd {
            round: self.state.round,
            remaining: self.state.next_round_queue.len(),
        }
    }

    /// 轮末选择。拒绝时存档原样保留，下次可以从大厅继续。
    pub fn continue_round(&mut self, proceed: bool) -> Result<Step> {
        if self.phase != RoundPhase::RoundEndConfirm {
            return Err(RoundError::NotAtRoundEnd);
        }
        if self.state.next_round_queue.is_empty() {
            self.complete()?;
            return Ok(Step::SessionComplete);
        }
        if !proceed {
            self.state.save(self.ctx.storage_mut())?;
            return Ok(self.round_end_step());
        }
        self.state.start_next_round(self.scheduler.rng_mut());
        self.state.save(self.ctx.storage_mut())?;
        self.phase = RoundPhase::RoundActive;
        self.advance()
    }

    /// 轮末交给用户确认；全部攻克时只发通知。
    pub async fn finish_round(&mut self, confirm: &dyn Confirm) -> Result<Step> {
        match self.phase {
            RoundPhase::Ended => {
                confirm.notify(ALL_CLEARED).await;
                Ok(Step::SessionComplete)
            }
            RoundPhase::RoundEndConfirm if self.state.next_round_queue.is_empty() => {
                self.complete()?;
                confirm.notify(ALL_CLEARED).await;
                Ok(Step::SessionComplete)
            }
            RoundPhase::RoundEndConfirm => {
                let message =
                    round_end_message(self.state.round, self.state.next_round_queue.len());
                let proceed = confirm.confirm(&message).await;
                self.continue_round(proceed)
            }
            _ => Err(RoundError::NotAtRoundEnd),
        }
    }

    pub fn complete(&mut self) -> Result<()> {
        SessionState::clear(self.ctx.storage_mut())?;
        self.state = SessionState::default();
        self.phase = RoundPhase::Ended;
        log::info!(
            "复习结束: 共 {} 次, 对 {} 错 {} 模糊 {}",
            self.stats.total,
            self.stats.correct,
            self.stats.wrong,
            self.stats.vague
        );
        Ok(())
    }

    /// 读回存档。没有可继续的进度时返回 `None`。
    pub fn resume(&mut self) -> Result<Option<Step>> {
        let Some(saved) = SessionState::load(self.ctx.storage_mut()) else {
            return Ok(None);
        };
        if !saved.has_pending() {
            log::warn!("存档没有剩余题目，已丢弃");
            SessionState::clear(self.ctx.storage_mut())?;
            return Ok(None);
        }
        self.state = saved;
        self.stats = SessionStats::default();
        self.last_effect = None;
        if let Some(card) = self.state.current_card.clone() {
            self.phase = RoundPhase::RoundActive;
            return Ok(Some(Step::Card(card)));
        }
        self.advance().map(Some)
    }

    /// 退出并保留进度
    pub fn quit(&mut self) -> Result<()> {
        if matches!(
            self.phase,
            RoundPhase::RoundActive | RoundPhase::RoundEndConfirm
        ) {
            self.state.save(self.ctx.storage_mut())?;
        }
        self.phase = RoundPhase::Idle;
        Ok(())
    }

    /// 退出并丢弃进度
    pub fn discard(&mut self) -> Result<()> {
        SessionState::clear(self.ctx.storage_mut())?;
        self.state = SessionState::default();
        self.phase = RoundPhase::Idle;
        Ok(())
    }

    pub fn pending_summary(&mut self) -> Option<SessionSummary> {
        SessionState::load(self.ctx.storage_mut())
            .filter(SessionState::has_pending)
            .map(|s| s.summary())
    }

    pub fn has_saved_session(&mut self) -> bool {
        self.pending_summary().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::confirm::AutoConfirm;
    use crate::storage::SESSION_KEY;

    fn manager() -> RoundManager {
        RoundManager::new(Context::in_memory(Config::default()), Some(11))
    }

    fn bank(qs: &[&str]) -> Vec<Card> {
        qs.iter().map(|q| Card::new(*q, "ans", "t")).collect()
    }

    fn expect_card(step: Step) -> Card {
        match step {
            Step::Card(c) => c,
            other => panic!("expected card, got {other:?}"),
        }
    }

    #[test]
    fn test_all_correct_completes_session() {
        let mut rm = manager();
        let mut step = rm.launch(bank(&["A", "B", "C"]), LaunchOptions::default()).unwrap();
        let mut seen = Vec::new();
        while let Step::Card(card) = step {
            seen.push(card.question);
            step = rm.rate(RatingOutcome::Correct).unwrap();
        }
        assert_eq!(step, Step::SessionComplete);
        seen.sort();
        assert_eq!(seen, vec!["A", "B", "C"]);
        assert_eq!(rm.phase(), RoundPhase::Ended);
        assert_eq!(rm.stats().correct, 3);
        assert!(!rm.context().storage().contains(SESSION_KEY).unwrap());
    }

    #[test]
    fn test_wrong_card_returns_next_round() {
        let mut rm = manager();
        let first = expect_card(rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap());
        assert_eq!(first.question, "A");

        let step = rm.rate(RatingOutcome::Wrong).unwrap();
        assert_eq!(step, Step::RoundEnd { round: 1, remaining: 1 });
        assert_eq!(rm.phase(), RoundPhase::RoundEndConfirm);

        let again = expect_card(rm.continue_round(true).unwrap());
        assert_eq!(again.question, "A");
        assert_eq!(rm.state().round, 2);

        assert_eq!(rm.rate(RatingOutcome::Correct).unwrap(), Step::SessionComplete);
        // 答对后错题本仍保留
        assert!(rm.context().ledger.contains("A"));
    }

    #[test]
    fn test_rate_without_card_is_error() {
        let mut rm = manager();
        assert!(matches!(
            rm.rate(RatingOutcome::Correct),
            Err(RoundError::NoCurrentCard)
        ));
        assert!(matches!(
            rm.continue_round(true),
            Err(RoundError::NotAtRoundEnd)
        ));
    }

    #[test]
    fn test_empty_bank_is_reported() {
        let mut rm = manager();
        assert!(matches!(
            rm.launch(vec![], LaunchOptions::default()),
            Err(RoundError::Schedule(ScheduleError::EmptyBank))
        ));
    }

    #[test]
    fn test_resume_returns_in_flight_card() {
        let mut rm = manager();
        let card = expect_card(rm.launch(bank(&["A", "B"]), LaunchOptions::default()).unwrap());
        let ctx = rm.into_context();

        let mut rm = RoundManager::new(ctx, Some(1));
        assert_eq!(rm.pending_summary().map(|s| s.remaining), Some(2));
        let resumed = expect_card(rm.resume().unwrap().unwrap());
        assert_eq!(resumed, card);
        assert_eq!(rm.state().queue.len(), 1);
    }

    #[test]
    fn test_discard_removes_session() {
        let mut rm = manager();
        rm.launch(bank(&["A", "B"]), LaunchOptions::default()).unwrap();
        rm.discard().unwrap();
        assert!(!rm.has_saved_session());
        assert!(rm.resume().unwrap().is_none());
    }

    #[test]
    fn test_retry_mode_pops_from_the_end() {
        let mut rm = manager();
        let first = expect_card(rm.launch(bank(&["A", "B", "C"]), LaunchOptions::retry()).unwrap());
        assert_eq!(first.question, "C");
    }

    #[tokio::test]
    async fn test_finish_round_with_confirm() {
        let mut rm = manager();
        rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap();
        rm.rate(RatingOutcome::Vague).unwrap();

        let step = rm.finish_round(&AutoConfirm(false)).await.unwrap();
        assert_eq!(step, Step::RoundEnd { round: 1, remaining: 1 });
        assert!(rm.has_saved_session());

        let step = rm.finish_round(&AutoConfirm(true)).await.unwrap();
        assert_eq!(expect_card(step).question, "A");
        rm.rate(RatingOutcome::Correct).unwrap();
        let step = rm.finish_round(&AutoConfirm(true)).await.unwrap();
        assert_eq!(step, Step::SessionComplete);
    }

    #[test]
    fn test_round_end_message() {
        assert_eq!(
            round_end_message(2, 3),
            "Round 2 结束。还有 3 道题没过。是否继续下一轮？"
        );
    }

    // ---------------- 写盘失败 ----------------
    use crate::storage::{Backend, MemoryBackend, Storage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// 指定键在开关打开时写入失败
    struct FlakyBackend {
        inner: MemoryBackend,
        key: &'static str,
        failing: Arc<AtomicBool>,
    }

    impl Backend for FlakyBackend {
        fn read(&self, key: &str) -> std::io::Result<Option<String>> {
            self.inner.read(key)
        }

        fn write(&mut self, key: &str, value: &str) -> std::io::Result<()> {
            if key == self.key && self.failing.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.inner.write(key, value)
        }

        fn remove(&mut self, key: &str) -> std::io::Result<()> {
            self.inner.remove(key)
        }
    }

    fn flaky_manager(key: &'static str) -> (RoundManager, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let storage = Storage::new(FlakyBackend {
            inner: MemoryBackend::default(),
            key,
            failing: failing.clone(),
        });
        let ctx = Context::load(storage, Config::default());
        (RoundManager::new(ctx, Some(11)), failing)
    }

    #[test]
    fn test_failed_save_leaves_rating_unapplied() {
        let (mut rm, failing) = flaky_manager(PROFICIENCY_KEY);
        rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            rm.rate(RatingOutcome::Wrong),
            Err(RoundError::Storage(_))
        ));
        assert_eq!(rm.current_card().map(|c| c.question.as_str()), Some("A"));
        assert!(rm.state().next_round_queue.is_empty());
        assert!(!rm.context().ledger.contains("A"));
        assert_eq!(rm.context().proficiency.get("A").level, 0);
        assert_eq!(rm.stats().total, 0);

        // 再按一次只计入一次
        failing.store(false, Ordering::SeqCst);
        assert_eq!(
            rm.rate(RatingOutcome::Wrong).unwrap(),
            Step::RoundEnd { round: 1, remaining: 1 }
        );
        assert_eq!(rm.state().next_round_queue.len(), 1);
        assert_eq!(rm.context().ledger.get("A").map(|e| e.count), Some(1));
        assert_eq!(rm.context().proficiency.get("A").level, -1);
    }

    #[test]
    fn test_interrupted_rating_is_not_replayed_on_resume() {
        let (mut rm, failing) = flaky_manager(ERRORS_KEY);
        rm.launch(bank(&["A", "B"]), LaunchOptions::retry()).unwrap();

        // 错题本写失败时会话已经落盘，相当于进程在两次写之间退出
        failing.store(true, Ordering::SeqCst);
        assert!(rm.rate(RatingOutcome::Wrong).is_err());
        failing.store(false, Ordering::SeqCst);

        let mut rm = RoundManager::new(rm.into_context(), Some(11));
        let saved: SessionState = rm
            .context()
            .storage()
            .load(SESSION_KEY)
            .unwrap()
            .unwrap();
        assert!(saved.current_card.is_none());
        assert_eq!(saved.next_round_queue.len(), 1);

        // 续上后出的是下一张，而不是刚评过的那张
        let next = expect_card(rm.resume().unwrap().unwrap());
        assert_eq!(next.question, "A");
        rm.rate(RatingOutcome::Correct).unwrap();
        assert_eq!(rm.state().next_round_queue.len(), 1);
        assert_eq!(rm.state().next_round_queue[0].question, "B");
    }
}
