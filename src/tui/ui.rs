use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use qa_review::grading::REQUEST_FAILED;
use qa_review::ledger::ErrorLedgerEntry;
use qa_review::markup::SpanKind;
use qa_review::proficiency::ProficiencyRecord;
use qa_review::Verdict;

use super::app::{App, Feedback, ToastKind, View};
use super::keymap::{key_for, KeyAction};
use super::theme::{centered_rect, Theme};

pub fn draw(f: &mut Frame, app: &mut App) {
    // 顶栏 + 主区 + 提示 + 底栏
    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, v[0], app);
    match app.view {
        View::Lobby => draw_lobby(f, v[1], app),
        View::Review => draw_review(f, v[1], app),
        View::Mistakes => draw_mistakes(f, v[1], app),
    }
    draw_toast(f, v[2], app);
    draw_footer(f, v[3], app);
    draw_modal(f, app);
}

pub fn level_icon(level: i32) -> &'static str {
    match level {
        l if l < 0 => "💀",
        0 => "🥚",
        1..=2 => "🐣",
        3..=4 => "🦅",
        _ => "👑",
    }
}

/// 按显示宽度截断，超出部分用 … 表示
pub fn truncate(s: &str, maxw: usize) -> String {
    let s = s.replace('\n', " ");
    if s.width() <= maxw {
        return s;
    }
    let mut out = String::new();
    let mut w = 0;
    for ch in s.chars() {
        let cw = ch.width().unwrap_or(0);
        if w + cw + 1 > maxw {
            break;
        }
        out.push(ch);
        w += cw;
    }
    out.push('…');
    out
}

fn bar(f: &mut Frame, area: Rect, th: Theme, line: Line) {
    let para = Paragraph::new(line).style(Style::default().bg(th.bar_bg).fg(th.fg));
    f.render_widget(para, area);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    let ctx = app.session.context();
    let (hard, new, vague, easy) = ctx.proficiency.level_counts();
    let api = if app.session.grader().is_configured() {
        Span::styled(
            format!("API ✅ {}", app.session.grader().config().model),
            Style::default().fg(th.good),
        )
    } else {
        Span::styled("API ❌ 未配置", Style::default().fg(th.warn))
    };
    let segs = vec![
        Span::styled(
            " QA Review ",
            Style::default().fg(th.accent).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" | 熟练度:", Style::default().fg(th.muted)),
        Span::styled(
            format!(" 💀{hard} 🥚{new} 🟡{vague} 🦅{easy}"),
            Style::default().fg(th.fg),
        ),
        Span::styled(" | 错题:", Style::default().fg(th.muted)),
        Span::styled(format!("{}", ctx.ledger.len()), Style::default().fg(th.fg)),
        Span::styled(" | 收藏:", Style::default().fg(th.muted)),
        Span::styled(format!("{} ", ctx.favorites.len()), Style::default().fg(th.fg)),
        Span::styled("| ", Style::default().fg(th.muted)),
        api,
    ];
    bar(f, area, th, Line::from(segs));
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    let tips = match app.view {
        View::Lobby => {
            " [j/k]上下  [Space]勾选  [a]全选  [Enter]启动  [c]继续  [D]删除存档  [m]错题本  [f]收藏复习  [r]刷新  [q]退出 "
                .to_string()
        }
        View::Review if app.revealed => format!(
            " [{}]掌握  [{}]模糊  [{}]错误  [{}]收藏  [Esc]保存并退出 ",
            key_for(&app.keymap, KeyAction::RateCorrect),
            key_for(&app.keymap, KeyAction::RateVague),
            key_for(&app.keymap, KeyAction::RateWrong),
            key_for(&app.keymap, KeyAction::ToggleFavorite),
        ),
        View::Review => " [Enter]揭晓答案  [Alt+Enter]换行  [Esc]保存并退出 ".to_string(),
        View::Mistakes => {
            " [j/k]上下  [Space]勾选  [a]全选  [n]清空  [Enter]复习选中  [d]移出错题本  [Esc]返回 "
                .to_string()
        }
    };
    bar(
        f,
        area,
        th,
        Line::from(Span::styled(tips, Style::default().fg(th.muted))),
    );
}

fn draw_toast(f: &mut Frame, area: Rect, app: &App) {
    let th = app.theme;
    let Some(toast) = app.toast.as_ref() else {
        return;
    };
    let color = match toast.kind {
        ToastKind::Info => th.info,
        ToastKind::Success => th.good,
        ToastKind::Error => th.bad,
    };
    let text = truncate(&toast.text, area.width.saturating_sub(2) as usize);
    let para = Paragraph::new(Line::from(Span::styled(
        format!(" {text}"),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(para, area);
}

fn draw_modal(f: &mut Frame, app: &App) {
    let Some(modal) = app.modal.as_ref() else {
        return;
    };
    let th = app.theme;
    let area = centered_rect(50, 30, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(Span::styled(" 确认 ", Style::default().fg(th.accent)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(th.accent));
    let mut lines: Vec<Line> = modal
        .message
        .lines()
        .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(th.fg))))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[y] 确定", Style::default().fg(th.good)),
        Span::raw("    "),
        Span::styled("[n] 取消", Style::default().fg(th.muted)),
    ]));
    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, area);
}

// ---------------- 大厅 ----------------
fn draw_lobby(f: &mut Frame, area: Rect, app: &mut App) {
    let th = app.theme;
    let h = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let maxw = h[0].width.saturating_sub(8) as usize;
    let items: Vec<ListItem> = if app.units.is_empty() {
        vec![ListItem::new(Span::styled(
            format!("题库目录下没有 .json 文件: {}", app.source().root().display()),
            Style::default().fg(th.muted),
        ))]
    } else {
        app.units
            .iter()
            .map(|u| {
                let checked = app.selected_units.contains(u);
                let mark = if checked { "[x] " } else { "[ ] " };
                let style = if checked {
                    Style::default().fg(th.accent)
                } else {
                    Style::default().fg(th.fg)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(mark, style),
                    Span::styled(truncate(u, maxw), style),
                ]))
            })
            .collect()
    };
    let title = format!(" 章节  已选 {} 章 ", app.selected_units.len());
    let list = List::new(items)
        .block(
            Block::default()
                .title(Span::styled(title, Style::default().fg(th.accent)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .highlight_style(Style::default().bg(th.selection_bg));
    f.render_stateful_widget(list, h[0], &mut app.unit_state);

    let ctx = app.session.context();
    let frequent = ctx.ledger.iter().filter(|e| e.is_frequent()).count();
    let mut lines = vec![
        Line::from(Span::styled(
            "继续上次进度",
            Style::default().fg(th.accent).add_modifier(Modifier::BOLD),
        )),
        match app.resume {
            Some(s) => Line::from(Span::styled(
                format!(
                    "  Round {} · 本轮剩余 {} · 待下一轮 {}   [c] 继续",
                    s.round, s.remaining, s.carried
                ),
                Style::default().fg(th.good),
            )),
            None => Line::from(Span::styled("  无", Style::default().fg(th.muted))),
        },
        Line::from(""),
        Line::from(Span::styled(
            "错题本",
            Style::default().fg(th.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("  共 {} 道错题，其中 🔥 高频 {}", ctx.ledger.len(), frequent),
            Style::default().fg(th.fg),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "收藏夹",
            Style::default().fg(th.accent).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("  ★ {} 道", ctx.favorites.len()),
            Style::default().fg(th.fg),
        )),
    ];
    if !app.session.grader().is_configured() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "AI 阅卷未启用：qa-review set-key --key <API_KEY>",
            Style::default().fg(th.warn),
        )));
    }
    let para = Paragraph::new(lines)
        .block(
            Block::default()
                .title(Span::styled(" 概览 ", Style::default().fg(th.accent)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(para, h[1]);
}

// ---------------- 复习 ----------------
fn verdict_lines(v: &Verdict, th: Theme) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let head = if v.degraded {
        Span::styled("🤖 批改结果（格式异常，显示原回答）", Style::default().fg(th.muted))
    } else if v.pass {
        Span::styled("🤖 批改结果：✅ 通过", Style::default().fg(th.good))
    } else {
        Span::styled("🤖 批改结果：❌ 未通过", Style::default().fg(th.bad))
    };
    lines.push(Line::from(head));

    let mut current: Vec<Span<'static>> = Vec::new();
    for span in v.spans() {
        let style = th.span_style(span.kind);
        let text = if span.kind == SpanKind::Missing {
            format!("✚ {}", span.text)
        } else {
            span.text
        };
        let mut parts = text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), style));
            }
            if parts.peek().is_some() {
                lines.push(Line::from(std::mem::take(&mut current)));
            }
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }
    lines.push(Line::from(Span::styled(
        v.reason.clone(),
        Style::default().fg(th.muted),
    )));
    lines
}

fn feedback_lines(app: &App) -> Vec<Line<'static>> {
    let th = app.theme;
    let muted = |s: &str| vec![Line::from(Span::styled(s.to_string(), Style::default().fg(th.muted)))];
    match &app.feedback {
        Feedback::Hidden => Vec::new(),
        Feedback::Blank => muted("😶 空白卷"),
        Feedback::NotConfigured => muted("请先配置 API Key（qa-review set-key --key <KEY>）"),
        Feedback::Waiting => muted("⏳ AI 正在阅卷..."),
        Feedback::Failed => muted(REQUEST_FAILED),
        Feedback::Ready(v) => verdict_lines(v, th),
    }
}

/// 题卡右上角的标签：错题 > 模糊 > 新题 > 出处
fn card_tag(
    entry: Option<&ErrorLedgerEntry>,
    record: &ProficiencyRecord,
    source: &str,
    th: Theme,
) -> Span<'static> {
    match entry {
        Some(e) => Span::styled(format!("错误 {} 次 🔴", e.count), Style::default().fg(th.bad)),
        None if record.is_vague => Span::styled("模糊 🟡", Style::default().fg(th.warn)),
        None if record.is_unseen() => {
            Span::styled(format!("新题 ⚪️ · {source}"), Style::default().fg(th.accent))
        }
        None => Span::styled(source.to_string(), Style::default().fg(th.info)),
    }
}

fn draw_review(f: &mut Frame, area: Rect, app: &mut App) {
    let th = app.theme;
    let Some(card) = app.session.current_card().cloned() else {
        let para = Paragraph::new(Span::styled("没有正在作答的题目", Style::default().fg(th.muted)));
        f.render_widget(para, area);
        return;
    };
    let ctx = app.session.context();
    let record = ctx.proficiency.get(&card.question);
    let state = app.session.rounds().state();
    let tag = card_tag(ctx.ledger.get(&card.question), &record, &card.source, th);
    let star = if ctx.favorites.contains(&card.question) {
        " ★"
    } else {
        ""
    };
    let title = Line::from(vec![
        Span::styled(
            format!(
                " R{} | Lv.{} {} | 剩余 {} | ",
                state.round,
                record.level,
                level_icon(record.level),
                state.remaining()
            ),
            Style::default().fg(th.accent),
        ),
        tag,
        Span::styled(format!("{star} "), Style::default().fg(th.warn)),
    ]);

    let v = Layout::default()
        .direction(Direction::Vertical)
        .constraints(if app.revealed {
            [
                Constraint::Percentage(25),
                Constraint::Percentage(20),
                Constraint::Percentage(25),
                Constraint::Percentage(30),
            ]
        } else {
            [
                Constraint::Percentage(45),
                Constraint::Percentage(55),
                Constraint::Length(0),
                Constraint::Length(0),
            ]
        })
        .split(area);

    let question = Paragraph::new(card.question.clone())
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .style(Style::default().fg(th.fg).add_modifier(Modifier::BOLD))
        .wrap(Wrap { trim: false });
    f.render_widget(question, v[0]);

    if !app.revealed {
        f.render_widget(&app.input, v[1]);
        return;
    }

    let mine = Paragraph::new(app.user_answer())
        .block(
            Block::default()
                .title(Span::styled(" 你的回答 ", Style::default().fg(th.muted)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .style(Style::default().fg(th.fg))
        .wrap(Wrap { trim: false });
    f.render_widget(mine, v[1]);

    let answer = Paragraph::new(card.answer.clone())
        .block(
            Block::default()
                .title(Span::styled(" 标准答案 ", Style::default().fg(th.good)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.good)),
        )
        .style(Style::default().fg(th.fg))
        .wrap(Wrap { trim: false });
    f.render_widget(answer, v[2]);

    let feedback = Paragraph::new(feedback_lines(app))
        .block(
            Block::default()
                .title(Span::styled(" AI 阅卷 ", Style::default().fg(th.accent)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(feedback, v[3]);
}

// ---------------- 错题本 ----------------
fn draw_mistakes(f: &mut Frame, area: Rect, app: &mut App) {
    let th = app.theme;
    let maxw = area.width.saturating_sub(6) as usize;
    let ctx = app.session.context();
    let entries = ctx.ledger.sorted_by_count();
    let items: Vec<ListItem> = entries
        .iter()
        .map(|e| {
            let checked = app.mistake_checked.contains(&e.question);
            let mark = if checked { "[x] " } else { "[ ] " };
            let (risk, color) = if e.is_frequent() {
                ("🔥 高频", th.bad)
            } else {
                ("⚠️ 需注意", th.warn)
            };
            let day = e.last_date.split(' ').next().filter(|d| !d.is_empty()).unwrap_or("-");
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(mark, Style::default().fg(th.accent)),
                    Span::styled(truncate(&e.question, maxw), Style::default().fg(th.fg)),
                ]),
                Line::from(vec![
                    Span::raw("    "),
                    Span::styled(format!("{risk} 错误 {} 次", e.count), Style::default().fg(color)),
                    Span::styled(
                        format!(" • {} • 上次: {day}", e.source),
                        Style::default().fg(th.muted),
                    ),
                ]),
            ])
        })
        .collect();
    let title = format!(
        " 错题本  共 {} 道错题 · 已选 {} ",
        entries.len(),
        app.mistake_checked.len()
    );
    let list = List::new(items)
        .block(
            Block::default()
                .title(Span::styled(title, Style::default().fg(th.accent)))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(th.muted)),
        )
        .highlight_style(Style::default().bg(th.selection_bg));
    f.render_stateful_widget(list, area, &mut app.mistake_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_by_display_width() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("错题复习工具", 7), "错题复…");
        assert_eq!(truncate("a\nb", 5), "a b");
    }

    #[test]
    fn test_level_icon() {
        assert_eq!(level_icon(-1), "💀");
        assert_eq!(level_icon(0), "🥚");
        assert_eq!(level_icon(2), "🐣");
        assert_eq!(level_icon(4), "🦅");
        assert_eq!(level_icon(9), "👑");
    }

    #[test]
    fn test_card_tag_marks_unseen_cards() {
        let th = super::super::theme::theme_of(super::super::theme::ThemeKind::Dark);
        let fresh = ProficiencyRecord::default();
        assert_eq!(card_tag(None, &fresh, "第一章", th).content, "新题 ⚪️ · 第一章");

        let seen = ProficiencyRecord { level: 1, is_vague: false, last_time: 1_700_000_000_000 };
        assert_eq!(card_tag(None, &seen, "第一章", th).content, "第一章");

        let vague = ProficiencyRecord { is_vague: true, ..seen };
        assert_eq!(card_tag(None, &vague, "第一章", th).content, "模糊 🟡");

        let entry = ErrorLedgerEntry {
            question: "Q".into(),
            answer: "A".into(),
            count: 2,
            last_date: "2024/01/01 08:00:00".into(),
            source: "第一章".into(),
        };
        assert_eq!(card_tag(Some(&entry), &fresh, "第一章", th).content, "错误 2 次 🔴");
    }

    #[test]
    fn test_verdict_lines_split_on_newline() {
        let th = super::super::theme::theme_of(super::super::theme::ThemeKind::Dark);
        let v = Verdict {
            pass: true,
            markup: "<ok>a</ok><br/><fill>b</fill>".into(),
            reason: "好".into(),
            degraded: false,
        };
        let lines = verdict_lines(&v, th);
        // 标题 + 两行正文 + 评语
        assert_eq!(lines.len(), 4);
    }
}
