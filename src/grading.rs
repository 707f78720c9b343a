//! AI 批改：一次评分一次 chat-completions 请求，尽力而为。
//!
//! 任何失败都不会影响已经提交的自评。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::Card;
use crate::config::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::markup::{self, MarkupSpan};
use crate::repair;

pub const SYSTEM_PROMPT: &str = "Output concise JSON.";
pub const REQUEST_FAILED: &str = "API 请求失败";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub pass: bool,
    #[serde(default)]
    pub markup: String,
    #[serde(default)]
    pub reason: String,
    /// 模型输出无法解析，退回原答案
    #[serde(skip)]
    pub degraded: bool,
}

impl Verdict {
    pub fn spans(&self) -> Vec<MarkupSpan> {
        markup::parse_markup(&self.markup)
    }
}

#[derive(Error, Debug)]
pub enum GradingError {
    #[error("未配置 API Key")]
    NotConfigured,

    #[error("API 请求失败: {0}")]
    Transport(String),

    #[error("API 请求失败: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("模型没有返回内容")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, GradingError>;

#[derive(Clone)]
pub struct GradingConfig {
    pub credential: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            credential: None,
            model: DEFAULT_MODEL.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            temperature: 0.1,
            max_tokens: 512,
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for GradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingConfig")
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------- 请求/响应 ----------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    pub fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|s| !s.trim().is_empty())
    }
}

pub fn grading_prompt(question: &str, standard: &str, user_answer: &str) -> String {
    format!(
        "你是严格但友善的阅卷老师。\n\
         【题目】{question}\n\
         【标准答案】{standard}\n\
         【学生回答】{user_answer}\n\n\
         请对照标准答案批改学生回答，直接在学生回答原文上加标签：\n\
         - 与标准答案一致的要点用 <ok>...</ok>\n\
         - 错误或偏离的内容用 <bad>...</bad>\n\
         - 遗漏的要点用 <fill>...</fill> 补在合适的位置\n\
         公式保持 LaTeX 原样。要点基本齐全即视为通过。\n\
         只输出一个 JSON 对象：{{\"pass\": true/false, \"markup\": \"加标签后的回答\", \"reason\": \"一句话评语\"}}"
    )
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(
        &self,
        endpoint: &str,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("创建 HTTP 客户端失败，使用默认设置: {e}");
                reqwest::Client::new()
            });
        Self { client }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(
        &self,
        endpoint: &str,
        credential: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(credential)
            .json(request)
            .send()
            .await
            .map_err(|e| GradingError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GradingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| GradingError::Transport(e.to_string()))
    }
}

#[derive(Clone)]
pub struct GradingClient {
    config: GradingConfig,
    transport: Arc<dyn ChatTransport>,
}

impl fmt::Debug for GradingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GradingClient {
    pub fn new(config: GradingConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.timeout));
        Self { config, transport }
    }

    pub fn with_transport(config: GradingConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .credential
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn build_request(&self, question: &str, standard: &str, user_answer: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::new("system", SYSTEM_PROMPT),
                ChatMessage::new("user", grading_prompt(question, standard, user_answer)),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    pub async fn grade(&self, question: &str, standard: &str, user_answer: &str) -> Result<Verdict> {
        let credential = self
            .config
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(GradingError::NotConfigured)?;

        let request = self.build_request(question, standard, user_answer);
        let response = self
            .transport
            .complete(&self.config.endpoint, credential, &request)
            .await?;
        let raw = response.into_content().ok_or(GradingError::EmptyResponse)?;
        log::debug!("模型原始输出: {raw}");
        Ok(repair::parse_verdict(&raw, user_answer))
    }

    /// 揭晓答案时顺带批改。空回答不发请求；失败只记日志。
    pub async fn reveal_and_grade(&self, card: &Card, user_answer: &str) -> Option<Verdict> {
        if user_answer.trim().is_empty() {
            return None;
        }
        match self.grade(&card.question, &card.answer, user_answer).await {
            Ok(v) => Some(v),
            Err(GradingError::NotConfigured) => {
                log::info!("未配置 API Key，跳过 AI 批改");
                None
            }
            Err(e) => {
                log::warn!("AI 批改失败: {e}");
                None
            }
        }
    }
}
