use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_SOURCE: &str = "Review";

fn default_source() -> String {
    DEFAULT_SOURCE.into()
}

/// 一道问答题。身份即题干原文：熟练度、错题本、收藏、去重全部按题干精确匹配。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(alias = "q")]
    pub question: String,
    #[serde(alias = "a", default)]
    pub answer: String,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Card {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source: source.into(),
        }
    }

    /// 题库入口：统一 `question`/`q`、`answer`/`a` 两种旧格式。
    /// 缺题干（或题干不是字符串）的记录返回 `None`。
    pub fn from_value(value: &Value, unit: Option<&str>) -> Option<Card> {
        let obj = value.as_object()?;
        let question = obj
            .get("question")
            .or_else(|| obj.get("q"))
            .and_then(Value::as_str)?
            .to_string();
        let answer = match obj.get("answer").or_else(|| obj.get("a")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| unit.map(str::to_string))
            .unwrap_or_else(default_source);
        Some(Card {
            question,
            answer,
            source,
        })
    }

    /// `unit` 非空时覆盖卡片自带的来源标签（与按单元载入题库一致）。
    pub fn ingest(values: &[Value], unit: Option<&str>) -> Vec<Card> {
        values
            .iter()
            .filter_map(|v| Card::from_value(v, None))
            .map(|mut c| {
                if let Some(u) = unit {
                    c.source = u.to_string();
                }
                c
            })
            .collect()
    }
}
