//! 智能体客户端抽象
//!
//! 底层智能体是黑盒：发一条消息（可带会话 ID），收到结构化 JSON 或原始文本。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次批处理请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub message: String,
    /// 已捕获的会话 ID，同一条链的每个请求都必须带上
    pub conversation_id: Option<String>,
    pub batch_size: usize,
}

/// 响应内容
#[derive(Debug, Clone, PartialEq)]
pub enum AgentContent {
    Structured(Value),
    Raw(String),
}

impl AgentContent {
    pub fn preview_source(&self) -> String {
        match self {
            AgentContent::Structured(v) => v.to_string(),
            AgentContent::Raw(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    /// 首个响应提供
    pub conversation_id: Option<String>,
    pub content: AgentContent,
}

impl AgentReply {
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            content: AgentContent::Raw(text.into()),
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            conversation_id: None,
            content: AgentContent::Structured(value),
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// 智能体客户端 trait；错误以原始文本返回，由协调器归类
#[async_trait]
pub trait ScheduleAgent: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentReply, String>;
}
