//! 脚本化 Mock 智能体（用于测试与 demo，无需真实后端）
//!
//! 按顺序弹出预置的响应，并记录收到的每个请求，便于断言会话 ID 的透传。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{AgentReply, AgentRequest, ScheduleAgent};

#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<Result<AgentReply, String>>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(replies: impl IntoIterator<Item = Result<AgentReply, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Result<AgentReply, String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ScheduleAgent for ScriptedAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentReply, String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| Err("scripted agent has no more replies".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_exhausted() {
        let agent = ScriptedAgent::new(vec![Ok(AgentReply::raw("one")), Err("boom".to_string())]);
        let req = AgentRequest {
            message: "m".into(),
            conversation_id: None,
            batch_size: 10,
        };

        assert_eq!(agent.invoke(req.clone()).await.unwrap(), AgentReply::raw("one"));
        assert_eq!(agent.invoke(req.clone()).await.unwrap_err(), "boom");
        assert!(agent.invoke(req).await.is_err());
        assert_eq!(agent.call_count(), 3);
    }
}
