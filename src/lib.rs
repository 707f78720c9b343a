//! 问答题背诵引擎
//!
//! - `scheduler`：按熟练度与错题本把题库分桶，生成本次复习队列
//! - `round`：多轮错题循环（答错/模糊的题进入下一轮）
//! - `reconcile`：自评结果回写熟练度与错题本
//! - `grading` / `repair` / `markup`：可选的 AI 阅卷，尽力而为，不阻塞复习
//!
//! 所有持久化状态经 `storage` 按逻辑键读写，宿主程序持有 `Context` 并显式传入。

pub mod backup;
pub mod card;
pub mod config;
pub mod confirm;
pub mod context;
pub mod favorites;
pub mod grading;
pub mod ledger;
pub mod markup;
pub mod proficiency;
pub mod reconcile;
pub mod repair;
pub mod review;
pub mod round;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod storage;

pub use card::Card;
pub use config::Config;
pub use confirm::Confirm;
pub use context::Context;
pub use grading::{GradingClient, Verdict};
pub use reconcile::RatingOutcome;
pub use review::ReviewSession;
pub use round::{RoundManager, RoundPhase, Step};
pub use scheduler::{LaunchOptions, ReviewQueueScheduler};
