use std::fs;

use qa_review::config::Config;
use qa_review::confirm::AutoConfirm;
use qa_review::source::{DirSource, QuestionSource};
use qa_review::{Card, Context, LaunchOptions, RatingOutcome, RoundManager, RoundPhase, Step};
use serde_json::Value;
use tempfile::TempDir;

fn bank(qs: &[&str]) -> Vec<Card> {
    qs.iter().map(|q| Card::new(*q, format!("{q} 的答案"), "ch1")).collect()
}

fn card_of(step: Step) -> Card {
    match step {
        Step::Card(c) => c,
        other => panic!("expected card, got {other:?}"),
    }
}

#[test]
fn two_cards_one_wrong_takes_two_rounds() {
    let mut rm = RoundManager::new(Context::in_memory(Config::default()), Some(7));
    let first = card_of(rm.launch(bank(&["A", "B"]), LaunchOptions::default()).unwrap());
    let second = card_of(rm.rate(RatingOutcome::Wrong).unwrap());
    assert_ne!(first, second);

    let step = rm.rate(RatingOutcome::Correct).unwrap();
    assert_eq!(step, Step::RoundEnd { round: 1, remaining: 1 });

    let again = card_of(rm.continue_round(true).unwrap());
    assert_eq!(again, first);
    assert_eq!(rm.state().round, 2);
    assert_eq!(rm.rate(RatingOutcome::Correct).unwrap(), Step::SessionComplete);

    let ctx = rm.context();
    let entry = ctx.ledger.get(&first.question).unwrap();
    assert_eq!(entry.count, 1);
    assert!(!ctx.ledger.contains(&second.question));
    assert_eq!(ctx.proficiency.get(&first.question).level, 0);
    assert_eq!(ctx.proficiency.get(&second.question).level, 1);
    assert_eq!(rm.stats().total, 3);
}

#[test]
fn declining_next_round_leaves_session_on_disk() {
    let temp = TempDir::new().unwrap();
    let ctx = Context::open(temp.path(), Config::default()).unwrap();
    let mut rm = RoundManager::new(ctx, Some(3));

    // 重做模式保持原顺序，从末尾出题
    let first = card_of(rm.launch(bank(&["A", "B"]), LaunchOptions::retry()).unwrap());
    assert_eq!(first.question, "B");
    let next = card_of(rm.rate(RatingOutcome::Wrong).unwrap());
    assert_eq!(next.question, "A");
    assert_eq!(
        rm.rate(RatingOutcome::Correct).unwrap(),
        Step::RoundEnd { round: 1, remaining: 1 }
    );
    assert_eq!(
        rm.continue_round(false).unwrap(),
        Step::RoundEnd { round: 1, remaining: 1 }
    );

    let raw = fs::read_to_string(temp.path().join("session-state.json")).unwrap();
    let saved: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(saved["isActive"], Value::Bool(true));
    assert_eq!(saved["round"], 1);
    assert_eq!(saved["queue"].as_array().unwrap().len(), 0);
    assert_eq!(saved["nextRoundQueue"][0]["question"], "B");
    assert_eq!(saved["nextRoundQueue"].as_array().unwrap().len(), 1);
    assert!(saved["currentCard"].is_null());
}

#[test]
fn resume_after_reopen_continues_where_left() {
    let temp = TempDir::new().unwrap();
    let (in_flight, before) = {
        let ctx = Context::open(temp.path(), Config::default()).unwrap();
        let mut rm = RoundManager::new(ctx, Some(5));
        rm.launch(bank(&["A", "B", "C"]), LaunchOptions::default()).unwrap();
        let card = card_of(rm.rate(RatingOutcome::Vague).unwrap());
        rm.quit().unwrap();
        (card, rm.state().clone())
    };
    assert_eq!(before.queue.len(), 1);

    let ctx = Context::open(temp.path(), Config::default()).unwrap();
    let mut rm = RoundManager::new(ctx, None);
    let summary = rm.pending_summary().unwrap();
    assert_eq!(summary.round, 1);
    assert_eq!(summary.carried, 1);

    let resumed = card_of(rm.resume().unwrap().unwrap());
    assert_eq!(resumed, in_flight);
    assert_eq!(rm.phase(), RoundPhase::RoundActive);
    // 队列内容和顺序都与退出前一致
    assert_eq!(rm.state().round, before.round);
    assert_eq!(rm.state().queue, before.queue);
    assert_eq!(rm.state().next_round_queue, before.next_round_queue);
    assert_eq!(rm.state().next_round_queue.len(), 1);

    // 按原顺序继续出题
    let next = card_of(rm.rate(RatingOutcome::Correct).unwrap());
    assert_eq!(next, before.queue[0]);
}

#[test]
fn correct_after_wrong_keeps_ledger_entry() {
    let temp = TempDir::new().unwrap();
    let ctx = Context::open(temp.path(), Config::default()).unwrap();
    let mut rm = RoundManager::new(ctx, Some(1));
    rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap();
    rm.rate(RatingOutcome::Wrong).unwrap();
    rm.continue_round(true).unwrap();
    rm.rate(RatingOutcome::Correct).unwrap();

    // 重新打开，错题本仍在磁盘上
    let ctx = Context::open(temp.path(), Config::default()).unwrap();
    assert_eq!(ctx.ledger.len(), 1);
    assert_eq!(ctx.ledger.get("A").unwrap().count, 1);
}

#[test]
fn clear_on_correct_policy_removes_entry() {
    let mut config = Config::default();
    config.review.clear_errors_on_correct = true;
    let mut rm = RoundManager::new(Context::in_memory(config), Some(1));
    rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap();
    rm.rate(RatingOutcome::Wrong).unwrap();
    assert!(rm.context().ledger.contains("A"));
    rm.continue_round(true).unwrap();
    rm.rate(RatingOutcome::Correct).unwrap();
    assert!(!rm.context().ledger.contains("A"));
}

#[test]
fn level_only_rises_on_correct() {
    let mut rm = RoundManager::new(Context::in_memory(Config::default()), Some(2));
    let mut last = 0;
    for _ in 0..4 {
        rm.launch(bank(&["A"]), LaunchOptions::retry()).unwrap();
        rm.rate(RatingOutcome::Correct).unwrap();
        let level = rm.context().proficiency.get("A").level;
        assert_eq!(level, last + 1);
        last = level;
    }
}

#[test]
fn hard_cards_always_scheduled_and_new_capped() {
    let mut ctx = Context::in_memory(Config::default());
    let hard: Vec<Card> = (0..5).map(|i| Card::new(format!("hard {i}"), "x", "ch")).collect();
    for card in &hard {
        ctx.ledger.record_wrong(card, chrono::Local::now());
        ctx.proficiency.record_mut(&card.question).level = -1;
    }
    let mut all = hard.clone();
    all.extend((0..60).map(|i| Card::new(format!("new {i}"), "x", "ch")));
    // 重复的题只出现一次
    all.push(hard[0].clone());

    let mut rm = RoundManager::new(ctx, Some(9));
    rm.launch(all, LaunchOptions::default()).unwrap();
    let summary = rm.last_summary().unwrap();
    // 分桶按原始题库计数，重复项去重前也算在内
    assert_eq!(summary.hard, 6);
    assert_eq!(summary.queued, 25);

    let mut seen: Vec<String> = rm.state().queue.iter().map(|c| c.question.clone()).collect();
    seen.extend(rm.current_card().map(|c| c.question.clone()));
    assert_eq!(seen.len(), 25);
    for card in &hard {
        assert!(seen.contains(&card.question));
    }
    assert_eq!(seen.iter().filter(|q| q.starts_with("new")).count(), 20);
}

#[tokio::test]
async fn finish_round_asks_before_next_round() {
    let mut rm = RoundManager::new(Context::in_memory(Config::default()), Some(4));
    rm.launch(bank(&["A"]), LaunchOptions::default()).unwrap();
    rm.rate(RatingOutcome::Wrong).unwrap();

    let step = rm.finish_round(&AutoConfirm(true)).await.unwrap();
    assert_eq!(card_of(step).question, "A");
    rm.rate(RatingOutcome::Correct).unwrap();
    assert_eq!(
        rm.finish_round(&AutoConfirm(false)).await.unwrap(),
        Step::SessionComplete
    );
}

#[test]
fn bank_directory_units_feed_a_session() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("ml")).unwrap();
    fs::write(
        temp.path().join("ml").join("10.json"),
        r#"[{"q":"Q10","a":"A10"}]"#,
    )
    .unwrap();
    fs::write(
        temp.path().join("ml").join("2.json"),
        r#"[{"question":"Q2","answer":"A2"},{"answer":"no question"}]"#,
    )
    .unwrap();

    let source = DirSource::new(temp.path());
    let units = source.units().unwrap();
    assert_eq!(units, vec!["ml/2", "ml/10"]);

    let cards = source.load_many(&units).unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0].source, "2");

    let mut rm = RoundManager::new(Context::in_memory(Config::default()), Some(6));
    assert!(matches!(
        rm.launch(cards, LaunchOptions::default()).unwrap(),
        Step::Card(_)
    ));
}
