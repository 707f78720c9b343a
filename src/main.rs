// 基于 ratatui + crossterm 的问答卡片复习工具
// 功能：
// - 从题库目录（*.json，按子目录/文件分章）勾选章节开始复习
// - 攻坚 / 模糊 / 新题 / 熟练 四桶排程，多轮直到全部答对
// - 错题本、收藏夹、断点续复习
// - 可选的 AI 阅卷（OpenAI 兼容接口）
// - 数据备份导出/导入

mod tui;

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::Local;
use clap::{Parser, Subcommand};

use qa_review::backup;
use qa_review::config::{Config, CONFIG_FILE};
use qa_review::confirm::AutoConfirm;
use qa_review::source::DirSource;
use qa_review::storage::ALL_KEYS;
use qa_review::{Confirm, Context, ReviewSession};

use tui::keymap::parse_keymap;
use tui::theme::{theme_of, ThemeKind};

const DATA_ENV: &str = "QA_REVIEW_DATA";
const BANKS_ENV: &str = "QA_REVIEW_BANKS";
const DATA_DIR_NAME: &str = ".qa-review";
const LOG_FILE: &str = "qa-review.log";

#[derive(Debug, Parser)]
#[command(name = "qa-review", about = "问答卡片复习工具", version)]
struct Cli {
    /// 数据目录，默认读取环境变量 QA_REVIEW_DATA 或向上查找 .qa-review
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// 题库目录，默认 config 中的 ui.bank_dir、环境变量 QA_REVIEW_BANKS 或向上查找 banks/
    #[arg(long, global = true)]
    banks: Option<PathBuf>,

    /// 配置文件，默认 <数据目录>/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 固定随机种子（排程可复现）
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// 主题（外观）：dark | light，默认取配置文件
    #[arg(long, global = true, value_enum)]
    theme: Option<ThemeKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 启动复习界面（默认）
    Tui,

    /// 导出全部数据为备份 JSON
    Export {
        /// 输出文件，默认 QA_Review_Backup_<日期>.json
        file: Option<PathBuf>,
    },

    /// 从备份 JSON 恢复数据（覆盖当前错题本和熟练度）
    Import {
        file: PathBuf,
        /// 跳过确认
        #[arg(long)]
        yes: bool,
    },

    /// 保存 AI 阅卷的 API Key
    SetKey {
        #[arg(long)]
        key: String,
        /// 模型名，不填保持原值
        #[arg(long)]
        model: Option<String>,
    },

    /// 查看错题本，或把题目移出错题本
    Mistakes {
        /// 要移出的题干（可多次）
        #[arg(long = "delete", value_name = "QUESTION")]
        delete: Vec<String>,
        /// 跳过确认
        #[arg(long)]
        yes: bool,
    },

    /// 熟练度统计
    Stats,
}

// ---------------- 路径探测 ----------------
fn default_data_dir(cli: &Cli) -> PathBuf {
    if let Some(p) = &cli.data_dir {
        return p.clone();
    }
    if let Ok(envp) = std::env::var(DATA_ENV) {
        return PathBuf::from(envp);
    }
    if let Ok(cwd) = std::env::current_dir() {
        for anc in cwd.ancestors() {
            let c = anc.join(DATA_DIR_NAME);
            if c.is_dir() {
                return c;
            }
        }
    }
    PathBuf::from(DATA_DIR_NAME)
}

fn default_bank_dir(cli: &Cli, config: &Config) -> PathBuf {
    if let Some(p) = &cli.banks {
        return p.clone();
    }
    if let Some(p) = &config.ui.bank_dir {
        return p.clone();
    }
    if let Ok(envp) = std::env::var(BANKS_ENV) {
        return PathBuf::from(envp);
    }
    if let Ok(cwd) = std::env::current_dir() {
        for anc in cwd.ancestors() {
            for name in ["banks", "data"] {
                let c = anc.join(name);
                if c.is_dir() {
                    return c;
                }
            }
        }
    }
    // 可能不存在，大厅里会提示
    PathBuf::from("banks")
}

/// 日志写文件，避免弄花备用屏幕；打不开就退回 stderr
fn init_logging(data_dir: &Path) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    let path = data_dir.join(LOG_FILE);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => eprintln!("无法打开日志文件 {}: {e}", path.display()),
    }
    builder.init();
}

// ---------------- 终端确认 ----------------
struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, message: &str) -> bool {
        print!("{message} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    async fn notify(&self, message: &str) {
        println!("{message}");
    }
}

fn confirmer(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(StdinConfirm)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = default_data_dir(&cli);
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("创建数据目录失败: {}", data_dir.display()))?;
    init_logging(&data_dir);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let config = Config::load_or_default(&config_path)?;
    let bank_dir = default_bank_dir(&cli, &config);
    let theme_kind = cli
        .theme
        .unwrap_or_else(|| ThemeKind::from_name(&config.ui.theme));
    let keymap = parse_keymap(&config.ui.keys);

    let mut ctx = Context::open(&data_dir, config)
        .with_context(|| format!("打开数据目录失败: {}", data_dir.display()))?;
    let rt = tokio::runtime::Runtime::new().context("启动异步运行时失败")?;
    log::info!(
        "数据目录 {}，题库目录 {}",
        data_dir.display(),
        bank_dir.display()
    );

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => {
            let session = ReviewSession::new(ctx, cli.seed);
            tui::run(
                session,
                DirSource::new(bank_dir),
                rt.handle().clone(),
                theme_of(theme_kind),
                keymap,
            )
        }
        Command::Export { file } => {
            let path =
                file.unwrap_or_else(|| PathBuf::from(backup::default_file_name(Local::now().date_naive())));
            backup::export_to_file(&ctx, &path)
                .with_context(|| format!("导出失败: {}", path.display()))?;
            println!("已导出到 {}", path.display());
            Ok(())
        }
        Command::Import { file, yes } => {
            let doc = backup::read_backup(&file)
                .with_context(|| format!("读取备份失败: {}", file.display()))?;
            let confirm = confirmer(yes);
            let done = rt.block_on(backup::import_with_confirm(&mut ctx, doc, confirm.as_ref()))?;
            if !done {
                println!("已取消");
            }
            Ok(())
        }
        Command::SetKey { key, model } => {
            ctx.set_credential(&key, model.as_deref())
                .context("保存 API Key 失败")?;
            println!("API Key 已保存，模型: {}", ctx.model());
            Ok(())
        }
        Command::Mistakes { delete, yes } => {
            if delete.is_empty() {
                print_mistakes(&ctx);
                return Ok(());
            }
            let msg = format!(
                "确定要将这 {} 道题移出错题本吗？\n(熟练度不会受到影响)",
                delete.len()
            );
            let confirm = confirmer(yes);
            if !rt.block_on(confirm.confirm(&msg)) {
                println!("已取消");
                return Ok(());
            }
            let removed = ctx.delete_mistakes(&delete).context("保存错题本失败")?;
            println!("已移除 {removed} 道题");
            Ok(())
        }
        Command::Stats => {
            print_stats(&ctx);
            Ok(())
        }
    }
}

fn print_mistakes(ctx: &Context) {
    let entries = ctx.ledger.sorted_by_count();
    if entries.is_empty() {
        println!("暂无错题记录，太强了！");
        return;
    }
    println!("共 {} 道错题", entries.len());
    for e in entries {
        let risk = if e.is_frequent() { "🔥 高频" } else { "⚠️ 需注意" };
        println!(
            "{risk} 错误 {} 次 • {} • 上次: {}\n    {}",
            e.count,
            e.source,
            e.last_date,
            e.question.replace('\n', " ")
        );
    }
}

fn print_stats(ctx: &Context) {
    let (hard, new, vague, easy) = ctx.proficiency.level_counts();
    println!("已记录 {} 道题", ctx.proficiency.len());
    println!("  💀 攻坚 {hard}");
    println!("  🥚 新题 {new}");
    println!("  🟡 模糊 {vague}");
    println!("  🦅 熟练 {easy}");
    println!("错题本 {} 道，收藏 {} 道", ctx.ledger.len(), ctx.favorites.len());
    let api = if ctx.credential().is_some() {
        format!("已配置（{}）", ctx.model())
    } else {
        "未配置".to_string()
    };
    println!("AI 阅卷: {api}");
    match ctx.storage().present_keys() {
        Ok(keys) => {
            let missing = ALL_KEYS.len() - keys.len();
            println!("已存储: {}（另有 {missing} 项为空）", keys.join(", "));
        }
        Err(e) => eprintln!("读取存储失败: {e}"),
    }
}
