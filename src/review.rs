use crate::card::Card;
use crate::confirm::Confirm;
use crate::context::Context;
use crate::grading::{GradingClient, Verdict};
use crate::reconcile::RatingOutcome;
use crate::round::{Result, RoundManager, Step};
use crate::scheduler::LaunchOptions;
use crate::storage;

/// 对外的复习入口：轮次状态机 + AI 批改。
#[derive(Debug)]
pub struct ReviewSession {
    rounds: RoundManager,
    grader: GradingClient,
}

impl ReviewSession {
    pub fn new(ctx: Context, seed: Option<u64>) -> Self {
        let grader = GradingClient::new(ctx.grading_config());
        Self::with_grader(ctx, seed, grader)
    }

    pub fn with_grader(ctx: Context, seed: Option<u64>, grader: GradingClient) -> Self {
        Self {
            rounds: RoundManager::new(ctx, seed),
            grader,
        }
    }

    pub fn rounds(&self) -> &RoundManager {
        &self.rounds
    }

    pub fn rounds_mut(&mut self) -> &mut RoundManager {
        &mut self.rounds
    }

    pub fn context(&self) -> &Context {
        self.rounds.context()
    }

    pub fn context_mut(&mut self) -> &mut Context {
        self.rounds.context_mut()
    }

    pub fn grader(&self) -> &GradingClient {
        &self.grader
    }

    /// 凭据或模型改了之后重建客户端
    pub fn refresh_grader(&mut self) {
        self.grader = GradingClient::new(self.context().grading_config());
    }

    pub fn launch(&mut self, bank: Vec<Card>, options: LaunchOptions) -> Result<Step> {
        self.rounds.launch(bank, options)
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.rounds.current_card()
    }

    pub fn rate(&mut self, outcome: RatingOutcome) -> Result<Step> {
        self.rounds.rate(outcome)
    }

    pub async fn finish_round(&mut self, confirm: &dyn Confirm) -> Result<Step> {
        self.rounds.finish_round(confirm).await
    }

    /// 对当前卡片发起批改；没有当前卡片时返回 `None`。
    pub async fn reveal_and_grade(&self, user_answer: &str) -> Option<Verdict> {
        let card = self.current_card()?.clone();
        self.grader.reveal_and_grade(&card, user_answer).await
    }

    pub fn toggle_favorite(&mut self) -> storage::Result<Option<bool>> {
        let Some(card) = self.current_card().cloned() else {
            return Ok(None);
        };
        self.context_mut().toggle_favorite(&card).map(Some)
    }

    pub fn into_context(self) -> Context {
        self.rounds.into_context()
    }
}
