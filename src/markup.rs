//! 批改标记：`<ok>` 命中，`<bad>` 错误，`<fill>`/`<miss>` 遗漏。

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(ok|bad|fill|miss)>(.*?)</(?:ok|bad|fill|miss)>").expect("valid tag regex")
});
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br regex"));
static DOUBLE_BACKSLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\\([A-Za-z{}])").expect("valid backslash regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Plain,
    Hit,
    Wrong,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSpan {
    pub kind: SpanKind,
    pub text: String,
}

impl MarkupSpan {
    fn new(kind: SpanKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

fn tidy(markup: &str) -> String {
    let s = BR_RE.replace_all(markup, "\n");
    DOUBLE_BACKSLASH_RE.replace_all(&s, r"\$1").into_owned()
}

pub fn parse_markup(markup: &str) -> Vec<MarkupSpan> {
    let text = tidy(markup);
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in TAG_RE.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            spans.push(MarkupSpan::new(SpanKind::Plain, &text[last..whole.start()]));
        }
        let kind = match caps.get(1).map(|m| m.as_str()) {
            Some("ok") => SpanKind::Hit,
            Some("bad") => SpanKind::Wrong,
            _ => SpanKind::Missing,
        };
        let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        spans.push(MarkupSpan::new(kind, inner));
        last = whole.end();
    }
    if last < text.len() {
        spans.push(MarkupSpan::new(SpanKind::Plain, &text[last..]));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans() {
        let spans = parse_markup("力 <ok>F = ma</ok>，其中 <bad>m 是速度</bad><fill>a 是加速度</fill>。");
        let kinds: Vec<SpanKind> = spans.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SpanKind::Plain,
                SpanKind::Hit,
                SpanKind::Plain,
                SpanKind::Wrong,
                SpanKind::Missing,
                SpanKind::Plain,
            ]
        );
        assert_eq!(spans[1].text, "F = ma");
        assert_eq!(spans[4].text, "a 是加速度");
    }

    #[test]
    fn test_miss_alias_and_line_breaks() {
        let spans = parse_markup("a<br/><miss>b\nc</miss>");
        assert_eq!(spans[0].text, "a\n");
        assert_eq!(spans[1].kind, SpanKind::Missing);
        assert_eq!(spans[1].text, "b\nc");
    }

    #[test]
    fn test_doubled_latex_backslash_collapsed() {
        let spans = parse_markup(r"<ok>$\\frac{1}{2}$</ok>");
        assert_eq!(spans, vec![MarkupSpan::new(SpanKind::Hit, r"$\frac{1}{2}$")]);
    }

    #[test]
    fn test_plain_text_without_tags() {
        let spans = parse_markup("只有文字");
        assert_eq!(spans, vec![MarkupSpan::new(SpanKind::Plain, "只有文字")]);
        assert!(parse_markup("").is_empty());
    }
}
