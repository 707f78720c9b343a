//! 模型输出的容错解析。
//!
//! 依次：去掉代码围栏，截取最外层 `{...}`，换行压成空格，
//! 补齐非法转义的反斜杠。仍然解析失败就退回用户原答案。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grading::Verdict;

pub const PASS_REASON: &str = "✅ 回答精准";
pub const FAIL_REASON: &str = "💡 建议复习标准答案";
pub const FALLBACK_REASON: &str = "AI 格式解析跳过";

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?").expect("valid fence regex"));
static NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").expect("valid newline regex"));

pub fn strip_code_fences(raw: &str) -> String {
    FENCE_RE.replace_all(raw, "").trim().to_string()
}

/// 前后有闲聊时截到第一个 `{` 和最后一个 `}`。
pub fn extract_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

pub fn collapse_newlines(text: &str) -> String {
    NEWLINE_RE.replace_all(text, " ").into_owned()
}

/// 不是合法 JSON 转义开头的反斜杠一律加倍（`\alpha` -> `\\alpha`）。
pub fn escape_stray_backslashes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                out.push('\\');
                out.push(next);
                i += 2;
            }
            Some('u') if is_unicode_escape(chars.get(i + 2..i + 6)) => {
                out.push_str("\\u");
                i += 2;
            }
            _ => {
                out.push_str("\\\\");
                i += 1;
            }
        }
    }
    out
}

fn is_unicode_escape(digits: Option<&[char]>) -> bool {
    digits
        .map(|d| d.iter().all(char::is_ascii_hexdigit))
        .unwrap_or(false)
}

pub fn normalize(raw: &str) -> String {
    let stripped = strip_code_fences(raw);
    let object = extract_object(&stripped);
    let single_line = collapse_newlines(object);
    escape_stray_backslashes(&single_line)
}

pub fn default_reason(pass: bool) -> &'static str {
    if pass {
        PASS_REASON
    } else {
        FAIL_REASON
    }
}

pub fn fallback(user_answer: &str) -> Verdict {
    Verdict {
        pass: true,
        markup: user_answer.to_string(),
        reason: FALLBACK_REASON.into(),
        degraded: true,
    }
}

pub fn parse_verdict(raw: &str, user_answer: &str) -> Verdict {
    let text = normalize(raw);
    match serde_json::from_str::<Verdict>(&text) {
        Ok(mut v) => {
            if v.reason.trim().is_empty() {
                v.reason = default_reason(v.pass).into();
            }
            v
        }
        Err(e) => {
            log::warn!("解析模型输出失败: {e}; 原文: {raw}");
            fallback(user_answer)
        }
    }
}
