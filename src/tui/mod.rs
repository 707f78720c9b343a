mod app;
pub mod keymap;
pub mod theme;
mod ui;

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::Terminal;
use tokio::runtime::Handle;

use qa_review::source::DirSource;
use qa_review::ReviewSession;

use app::App;
use keymap::KeyAction;
use theme::Theme;

pub fn run(
    session: ReviewSession,
    source: DirSource,
    handle: Handle,
    theme: Theme,
    keymap: HashMap<char, KeyAction>,
) -> Result<()> {
    let mut app = App::new(session, source, handle, theme, keymap);

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_loop(&mut terminal, &mut app);

    // 退出还原
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // 异常退出也保住进度
    if let Err(e) = app.session.rounds_mut().quit() {
        log::error!("退出时保存进度失败: {e}");
    }
    res
}

fn run_loop<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui::draw(f, app))?;

        if app.quit {
            return Ok(());
        }

        if event::poll(Duration::from_millis(200))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                _ => {}
            }
        }
    }
}
