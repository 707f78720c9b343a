// ---------------- 主题与样式 ----------------
use clap::ValueEnum;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};

use qa_review::markup::SpanKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThemeKind {
    Dark,
    Light,
}

impl ThemeKind {
    /// 配置文件里的名字，认不出来按 dark
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => ThemeKind::Light,
            _ => ThemeKind::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub fg: Color,
    pub muted: Color,
    pub accent: Color,
    pub bar_bg: Color,
    pub selection_bg: Color,
    pub good: Color,
    pub warn: Color,
    pub bad: Color,
    pub info: Color,
    pub fill: Color,
}

pub fn theme_of(kind: ThemeKind) -> Theme {
    match kind {
        ThemeKind::Dark => Theme {
            fg: Color::Rgb(220, 220, 220),
            muted: Color::Rgb(140, 140, 140),
            accent: Color::Rgb(95, 175, 255),
            bar_bg: Color::Rgb(35, 40, 46),
            selection_bg: Color::Rgb(60, 65, 72),
            good: Color::Rgb(130, 200, 120),
            warn: Color::Rgb(255, 200, 110),
            bad: Color::Rgb(240, 110, 110),
            info: Color::Rgb(120, 170, 255),
            fill: Color::Rgb(190, 150, 255),
        },
        ThemeKind::Light => Theme {
            fg: Color::Rgb(30, 30, 30),
            muted: Color::Rgb(120, 120, 120),
            accent: Color::Rgb(0, 122, 255),
            bar_bg: Color::Rgb(235, 240, 245),
            selection_bg: Color::Rgb(210, 220, 235),
            good: Color::Rgb(38, 166, 91),
            warn: Color::Rgb(255, 160, 0),
            bad: Color::Rgb(220, 50, 50),
            info: Color::Rgb(0, 122, 255),
            fill: Color::Rgb(109, 40, 217),
        },
    }
}

impl Theme {
    /// 批改标记的样式：命中加粗绿，错误红色删除线，遗漏紫色
    pub fn span_style(&self, kind: SpanKind) -> Style {
        match kind {
            SpanKind::Plain => Style::default().fg(self.fg),
            SpanKind::Hit => Style::default().fg(self.good).add_modifier(Modifier::BOLD),
            SpanKind::Wrong => Style::default()
                .fg(self.bad)
                .add_modifier(Modifier::CROSSED_OUT),
            SpanKind::Missing => Style::default().fg(self.fill).add_modifier(Modifier::BOLD),
        }
    }
}

pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vert[1]);
    horiz[1]
}
