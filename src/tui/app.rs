use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::Style;
use ratatui::widgets::{Block, Borders, ListState};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tui_textarea::TextArea;

use qa_review::round::{round_end_message, ALL_CLEARED};
use qa_review::session::SessionSummary;
use qa_review::source::{DirSource, QuestionSource};
use qa_review::{Card, LaunchOptions, RatingOutcome, ReviewSession, Step, Verdict};

use super::keymap::KeyAction;
use super::theme::Theme;

pub const TOAST_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Lobby,
    Review,
    Mistakes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    pub since: Instant,
}

/// 弹窗确认后要做的事
#[derive(Debug, Clone)]
pub enum PendingAction {
    ContinueRound,
    OverwriteSession(Vec<Card>),
    DeleteMistakes(Vec<String>),
    DiscardSession,
}

#[derive(Debug, Clone)]
pub struct Modal {
    pub message: String,
    pub action: PendingAction,
}

/// AI 批改区的状态
#[derive(Debug, Clone)]
pub enum Feedback {
    Hidden,
    Blank,
    NotConfigured,
    Waiting,
    Ready(Verdict),
    Failed,
}

/// 后台批改结果，按 `seq` 和题干丢弃过期的
#[derive(Debug)]
pub struct VerdictMsg {
    pub seq: u64,
    pub question: String,
    pub verdict: Option<Verdict>,
}

fn new_input<'a>(th: &Theme) -> TextArea<'a> {
    let mut ta = TextArea::default();
    ta.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(th.muted))
            .title(" 你的回答  [Enter 揭晓 / Alt+Enter 换行] "),
    );
    ta.set_placeholder_text("在此输入答案，留空直接揭晓也可以");
    ta.set_cursor_line_style(Style::default());
    ta
}

pub struct App {
    pub session: ReviewSession,
    source: DirSource,
    handle: Handle,
    pub theme: Theme,
    pub keymap: HashMap<char, KeyAction>,
    pub view: View,
    pub quit: bool,
    // 大厅
    pub units: Vec<String>,
    pub unit_state: ListState,
    pub selected_units: HashSet<String>,
    pub resume: Option<SessionSummary>,
    // 复习
    pub input: TextArea<'static>,
    pub revealed: bool,
    pub feedback: Feedback,
    grade_seq: u64,
    verdict_tx: UnboundedSender<VerdictMsg>,
    verdict_rx: UnboundedReceiver<VerdictMsg>,
    // 错题本
    pub mistake_state: ListState,
    pub mistake_checked: HashSet<String>,
    pub modal: Option<Modal>,
    pub toast: Option<Toast>,
}

impl App {
    pub fn new(
        mut session: ReviewSession,
        source: DirSource,
        handle: Handle,
        theme: Theme,
        keymap: HashMap<char, KeyAction>,
    ) -> Self {
        let (verdict_tx, verdict_rx) = unbounded_channel();
        let resume = session.rounds_mut().pending_summary();
        let mut app = Self {
            session,
            source,
            handle,
            theme,
            keymap,
            view: View::Lobby,
            quit: false,
            units: Vec::new(),
            unit_state: ListState::default(),
            selected_units: HashSet::new(),
            resume,
            input: new_input(&theme),
            revealed: false,
            feedback: Feedback::Hidden,
            grade_seq: 0,
            verdict_tx,
            verdict_rx,
            mistake_state: ListState::default(),
            mistake_checked: HashSet::new(),
            modal: None,
            toast: None,
        };
        app.reload_units();
        app
    }

    pub fn source(&self) -> &DirSource {
        &self.source
    }

    fn reload_units(&mut self) {
        match self.source.units() {
            Ok(units) => {
                self.units = units;
                if !self.units.is_empty() {
                    self.unit_state.select(Some(0));
                }
            }
            Err(e) => {
                log::error!("{e}");
                self.notify(e.to_string(), ToastKind::Error);
            }
        }
    }

    pub fn notify(&mut self, text: impl Into<String>, kind: ToastKind) {
        self.toast = Some(Toast {
            text: text.into(),
            kind,
            since: Instant::now(),
        });
    }

    /// 每帧调用：过期提示、收取批改结果
    pub fn tick(&mut self) {
        if self
            .toast
            .as_ref()
            .map(|t| t.since.elapsed() >= TOAST_TTL)
            .unwrap_or(false)
        {
            self.toast = None;
        }
        while let Ok(msg) = self.verdict_rx.try_recv() {
            let current = self.session.current_card().map(|c| c.question.as_str());
            if msg.seq != self.grade_seq || current != Some(msg.question.as_str()) {
                log::debug!("丢弃过期的批改结果: {}", msg.question);
                continue;
            }
            self.feedback = match msg.verdict {
                Some(v) => Feedback::Ready(v),
                None => Feedback::Failed,
            };
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.modal.is_some() {
            self.handle_modal_key(key);
            return;
        }
        match self.view {
            View::Lobby => self.handle_lobby_key(key),
            View::Review => self.handle_review_key(key),
            View::Mistakes => self.handle_mistakes_key(key),
        }
    }

    // ---------------- 弹窗 ----------------
    fn ask(&mut self, message: impl Into<String>, action: PendingAction) {
        self.modal = Some(Modal {
            message: message.into(),
            action,
        });
    }

    fn handle_modal_key(&mut self, key: KeyEvent) {
        let answer = match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => true,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
            _ => return,
        };
        if let Some(modal) = self.modal.take() {
            self.resolve(modal.action, answer);
        }
    }

    fn resolve(&mut self, action: PendingAction, yes: bool) {
        match action {
            PendingAction::ContinueRound => {
                match self.session.rounds_mut().continue_round(yes) {
                    Ok(Step::RoundEnd { .. }) => {
                        self.notify("进度已保存", ToastKind::Success);
                        self.back_to_lobby();
                    }
                    Ok(step) => self.apply_step(step),
                    Err(e) => self.report(e),
                }
            }
            PendingAction::OverwriteSession(bank) => {
                if yes {
                    self.start(bank, LaunchOptions::default());
                }
            }
            PendingAction::DeleteMistakes(questions) => {
                if yes {
                    self.delete_mistakes(&questions);
                }
            }
            PendingAction::DiscardSession => {
                if yes {
                    match self.session.rounds_mut().discard() {
                        Ok(()) => {
                            self.resume = None;
                            self.notify("存档已删除", ToastKind::Info);
                        }
                        Err(e) => self.report(e),
                    }
                }
            }
        }
    }

    fn report(&mut self, e: impl std::fmt::Display) {
        log::error!("{e}");
        self.notify(e.to_string(), ToastKind::Error);
    }

    // ---------------- 大厅 ----------------
    fn handle_lobby_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.unit_state, self.units.len(), 1),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.unit_state, self.units.len(), -1),
            KeyCode::Char(' ') => {
                if let Some(unit) = self.unit_state.selected().and_then(|i| self.units.get(i)) {
                    if !self.selected_units.remove(unit) {
                        self.selected_units.insert(unit.clone());
                    }
                }
            }
            KeyCode::Char('a') => {
                if self.selected_units.len() == self.units.len() {
                    self.selected_units.clear();
                } else {
                    self.selected_units = self.units.iter().cloned().collect();
                }
            }
            KeyCode::Char('r') => self.reload_units(),
            KeyCode::Enter => self.launch_selected(),
            KeyCode::Char('c') => self.continue_saved(),
            KeyCode::Char('D') => {
                if self.resume.is_some() {
                    self.ask("确定删除当前的【继续游戏】进度吗？", PendingAction::DiscardSession);
                }
            }
            KeyCode::Char('m') => self.open_mistakes(),
            KeyCode::Char('f') => self.review_favorites(),
            _ => {}
        }
    }

    fn launch_selected(&mut self) {
        if self.selected_units.is_empty() {
            self.notify("请先选择章节", ToastKind::Info);
            return;
        }
        let units: Vec<String> = self
            .units
            .iter()
            .filter(|u| self.selected_units.contains(*u))
            .cloned()
            .collect();
        let bank = match self.source.load_many(&units) {
            Ok(bank) => bank,
            Err(e) => {
                self.report(format!("题库加载失败: {e}"));
                return;
            }
        };
        if self.resume.is_some() {
            self.ask(
                "开启新复习将覆盖当前的【继续游戏】进度。\n确定要重新开始吗？",
                PendingAction::OverwriteSession(bank),
            );
        } else {
            self.start(bank, LaunchOptions::default());
        }
    }

    /// 开始新的复习，成功返回 true
    fn start(&mut self, bank: Vec<Card>, options: LaunchOptions) -> bool {
        match self.session.launch(bank, options) {
            Ok(step) => {
                if !options.retry_mode {
                    if let Some(s) = self.session.rounds().last_summary() {
                        let cap = self.session.context().config.scheduler.new_cap;
                        self.notify(
                            format!(
                                "计划生成：🔴攻坚:{} 🟡模糊:{} ⚪️新:{}",
                                s.hard,
                                s.vague,
                                s.new.min(cap)
                            ),
                            ToastKind::Success,
                        );
                    }
                }
                self.view = View::Review;
                self.apply_step(step);
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    fn continue_saved(&mut self) {
        match self.session.rounds_mut().resume() {
            Ok(Some(step)) => {
                self.view = View::Review;
                self.apply_step(step);
            }
            Ok(None) => {
                self.resume = None;
                self.notify("没有可继续的进度", ToastKind::Info);
            }
            Err(e) => self.report(e),
        }
    }

    fn review_favorites(&mut self) {
        let cards = self.session.context().favorites.cards();
        if cards.is_empty() {
            self.notify("收藏夹是空的", ToastKind::Info);
            return;
        }
        let n = cards.len();
        if self.start(cards, LaunchOptions::retry()) {
            self.notify(format!("开始复习 {n} 道收藏"), ToastKind::Success);
        }
    }

    fn back_to_lobby(&mut self) {
        self.view = View::Lobby;
        self.grade_seq += 1;
        self.revealed = false;
        self.feedback = Feedback::Hidden;
        self.resume = self.session.rounds_mut().pending_summary();
    }

    // ---------------- 复习 ----------------
    fn apply_step(&mut self, step: Step) {
        match step {
            Step::Card(_) => self.reset_card_view(),
            Step::RoundEnd { round, remaining } => {
                self.ask(round_end_message(round, remaining), PendingAction::ContinueRound);
            }
            Step::SessionComplete => {
                self.notify(ALL_CLEARED, ToastKind::Success);
                self.back_to_lobby();
            }
        }
    }

    fn reset_card_view(&mut self) {
        self.input = new_input(&self.theme);
        self.revealed = false;
        self.feedback = Feedback::Hidden;
        self.grade_seq += 1;
    }

    fn handle_review_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            self.quit_review();
            return;
        }
        if !self.revealed {
            match key.code {
                KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                    self.input.insert_newline();
                }
                KeyCode::Enter => self.reveal(),
                _ => {
                    self.input.input(key);
                }
            }
            return;
        }
        if let KeyCode::Char(c) = key.code {
            match self.keymap.get(&c).copied() {
                Some(KeyAction::RateWrong) => self.rate(RatingOutcome::Wrong),
                Some(KeyAction::RateVague) => self.rate(RatingOutcome::Vague),
                Some(KeyAction::RateCorrect) => self.rate(RatingOutcome::Correct),
                Some(KeyAction::ToggleFavorite) => self.toggle_favorite(),
                Some(KeyAction::Quit) => self.quit_review(),
                None => {}
            }
        }
    }

    pub fn user_answer(&self) -> String {
        self.input.lines().join("\n")
    }

    fn reveal(&mut self) {
        let Some(card) = self.session.current_card().cloned() else {
            return;
        };
        self.revealed = true;
        let answer = self.user_answer();
        if answer.trim().is_empty() {
            self.feedback = Feedback::Blank;
            return;
        }
        if !self.session.grader().is_configured() {
            self.feedback = Feedback::NotConfigured;
            return;
        }

        self.feedback = Feedback::Waiting;
        let grader = self.session.grader().clone();
        let tx = self.verdict_tx.clone();
        let seq = self.grade_seq;
        self.handle.spawn(async move {
            let verdict = grader.reveal_and_grade(&card, &answer).await;
            if tx
                .send(VerdictMsg {
                    seq,
                    question: card.question,
                    verdict,
                })
                .is_err()
            {
                log::debug!("界面已关闭，丢弃批改结果");
            }
        });
    }

    fn rate(&mut self, outcome: RatingOutcome) {
        match self.session.rate(outcome) {
            Ok(step) => {
                let (text, kind) = match outcome {
                    RatingOutcome::Correct => ("熟练度 +1 🆙", ToastKind::Success),
                    RatingOutcome::Wrong => ("加入错题循环 🔴", ToastKind::Error),
                    RatingOutcome::Vague => ("标记为模糊 🟡", ToastKind::Info),
                };
                self.notify(text, kind);
                self.apply_step(step);
            }
            Err(e) => self.report(e),
        }
    }

    fn toggle_favorite(&mut self) {
        match self.session.toggle_favorite() {
            Ok(Some(true)) => self.notify("已收藏 ★", ToastKind::Success),
            Ok(Some(false)) => self.notify("已取消收藏", ToastKind::Info),
            Ok(None) => {}
            Err(e) => self.report(e),
        }
    }

    fn quit_review(&mut self) {
        match self.session.rounds_mut().quit() {
            Ok(()) => self.notify("进度已保存", ToastKind::Success),
            Err(e) => self.report(e),
        }
        self.back_to_lobby();
    }

    // ---------------- 错题本 ----------------
    /// 当前列表顺序（按错误次数倒序）的题干
    pub fn mistake_questions(&self) -> Vec<String> {
        self.session
            .context()
            .ledger
            .sorted_by_count()
            .into_iter()
            .map(|e| e.question.clone())
            .collect()
    }

    fn open_mistakes(&mut self) {
        let questions = self.mistake_questions();
        if questions.is_empty() {
            self.notify("暂无错题记录，太强了！", ToastKind::Success);
            return;
        }
        self.mistake_checked = questions.into_iter().collect();
        self.mistake_state.select(Some(0));
        self.view = View::Mistakes;
    }

    fn handle_mistakes_key(&mut self, key: KeyEvent) {
        let questions = self.mistake_questions();
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.view = View::Lobby,
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.mistake_state, questions.len(), 1),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.mistake_state, questions.len(), -1),
            KeyCode::Char(' ') => {
                if let Some(q) = self.mistake_state.selected().and_then(|i| questions.get(i)) {
                    if !self.mistake_checked.remove(q) {
                        self.mistake_checked.insert(q.clone());
                    }
                }
            }
            KeyCode::Char('a') => self.mistake_checked = questions.into_iter().collect(),
            KeyCode::Char('n') => self.mistake_checked.clear(),
            KeyCode::Enter => self.review_checked_mistakes(),
            KeyCode::Char('d') => {
                let picked: Vec<String> = questions
                    .into_iter()
                    .filter(|q| self.mistake_checked.contains(q))
                    .collect();
                if !picked.is_empty() {
                    self.ask(
                        format!(
                            "确定要将这 {} 道题移出错题本吗？\n(熟练度不会受到影响)",
                            picked.len()
                        ),
                        PendingAction::DeleteMistakes(picked),
                    );
                }
            }
            _ => {}
        }
    }

    fn review_checked_mistakes(&mut self) {
        if self.mistake_checked.is_empty() {
            self.notify("请至少选择一道题", ToastKind::Info);
            return;
        }
        let picked: Vec<String> = self.mistake_checked.iter().cloned().collect();
        let cards = self.session.context().ledger.retry_cards(Some(&picked));
        let n = cards.len();
        if self.start(cards, LaunchOptions::retry()) {
            self.notify(format!("开始复习 {n} 道错题"), ToastKind::Success);
        }
    }

    fn delete_mistakes(&mut self, questions: &[String]) {
        match self.session.context_mut().delete_mistakes(questions) {
            Ok(n) => {
                self.notify(format!("已移除 {n} 道题"), ToastKind::Success);
                for q in questions {
                    self.mistake_checked.remove(q);
                }
                let left = self.session.context().ledger.len();
                if left == 0 {
                    self.view = View::Lobby;
                } else {
                    let sel = self.mistake_state.selected().unwrap_or(0).min(left - 1);
                    self.mistake_state.select(Some(sel));
                }
            }
            Err(e) => self.report(e),
        }
    }
}

fn move_selection(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let cur = state.selected().unwrap_or(0) as isize;
    let next = (cur + delta).clamp(0, len as isize - 1);
    state.select(Some(next as usize));
}
