//! 会话记录存储
//!
//! 持久化的 AsyncSession 是链环节之间唯一共享的状态，只由当前运行的环节修改。
//! 所有写操作在终态之后一律拒绝；进入终态时发出一次 SessionNotification。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::core::{AsyncSession, ScheduleError, SessionStatus};
use crate::schedule::ScheduleProposal;

/// 会话进入终态的通知
#[derive(Debug, Clone, PartialEq)]
pub struct SessionNotification {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_processed: usize,
    pub error: Option<String>,
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: AsyncSession) -> String;

    async fn get(&self, session_id: &str) -> Option<AsyncSession>;

    /// 状态只能向前推进
    async fn transition(&self, session_id: &str, to: SessionStatus) -> Result<AsyncSession, ScheduleError>;

    async fn set_remaining(&self, session_id: &str, remaining: usize) -> Result<(), ScheduleError>;

    /// 会话 ID 一经设置不可更改；重复设置同一值视为成功
    async fn set_conversation_id(&self, session_id: &str, conversation_id: &str) -> Result<(), ScheduleError>;

    /// 记录一个批次：累加已处理数与链深度，把本批结果并入累计提案
    async fn record_batch(
        &self,
        session_id: &str,
        saved: usize,
        proposal: ScheduleProposal,
    ) -> Result<AsyncSession, ScheduleError>;

    async fn complete(&self, session_id: &str, message: String) -> Result<AsyncSession, ScheduleError>;

    async fn fail(&self, session_id: &str, error: String) -> Result<AsyncSession, ScheduleError>;

    /// 返回 false 表示会话已处于终态
    async fn cancel(&self, session_id: &str) -> Result<bool, ScheduleError>;
}

/// 内存版会话存储
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, AsyncSession>>,
    notification_tx: mpsc::UnboundedSender<SessionNotification>,
}

impl InMemorySessionStore {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionNotification>) {
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: RwLock::new(HashMap::new()),
                notification_tx,
            },
            notification_rx,
        )
    }

    /// 在写锁内修改一条未终结的会话；已取消的会话返回 `ScheduleError::Cancelled`
    async fn mutate<F>(&self, session_id: &str, f: F) -> Result<AsyncSession, ScheduleError>
    where
        F: FnOnce(&mut AsyncSession) -> Result<(), ScheduleError> + Send,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ScheduleError::SessionNotFound(session_id.to_string()))?;
        if session.status == SessionStatus::Cancelled {
            return Err(ScheduleError::Cancelled);
        }
        if session.is_finished() {
            return Err(ScheduleError::InvalidTransition {
                from: session.status,
                to: session.status,
            });
        }
        f(session)?;
        Ok(session.clone())
    }

    async fn finish(
        &self,
        session_id: &str,
        to: SessionStatus,
        error: Option<String>,
    ) -> Result<AsyncSession, ScheduleError> {
        let session = self
            .mutate(session_id, |s| {
                if !s.status.can_transition_to(to) {
                    return Err(ScheduleError::InvalidTransition { from: s.status, to });
                }
                s.status = to;
                s.completed_at = Some(chrono::Utc::now());
                if error.is_some() {
                    s.last_error = error.clone();
                }
                Ok(())
            })
            .await?;

        let _ = self.notification_tx.send(SessionNotification {
            session_id: session.id.clone(),
            status: session.status,
            total_processed: session.total_processed,
            error,
        });
        Ok(session)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: AsyncSession) -> String {
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    async fn get(&self, session_id: &str) -> Option<AsyncSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn transition(&self, session_id: &str, to: SessionStatus) -> Result<AsyncSession, ScheduleError> {
        if to.is_terminal() {
            return self.finish(session_id, to, None).await;
        }
        self.mutate(session_id, |s| {
            if !s.status.can_transition_to(to) {
                return Err(ScheduleError::InvalidTransition { from: s.status, to });
            }
            s.status = to;
            Ok(())
        })
        .await
    }

    async fn set_remaining(&self, session_id: &str, remaining: usize) -> Result<(), ScheduleError> {
        self.mutate(session_id, |s| {
            s.remaining_count = Some(remaining);
            Ok(())
        })
        .await
        .map(|_| ())
    }

    async fn set_conversation_id(&self, session_id: &str, conversation_id: &str) -> Result<(), ScheduleError> {
        self.mutate(session_id, |s| match &s.conversation_id {
            Some(existing) if existing != conversation_id => Err(ScheduleError::Persistence(format!(
                "conversation id already set to {existing}"
            ))),
            Some(_) => Ok(()),
            None => {
                s.conversation_id = Some(conversation_id.to_string());
                Ok(())
            }
        })
        .await
        .map(|_| ())
    }

    async fn record_batch(
        &self,
        session_id: &str,
        saved: usize,
        proposal: ScheduleProposal,
    ) -> Result<AsyncSession, ScheduleError> {
        self.mutate(session_id, |s| {
            s.total_processed += saved;
            s.chain_depth += 1;
            s.payload = Some(match s.payload.take() {
                Some(mut cumulative) => {
                    cumulative.merge(proposal);
                    cumulative
                }
                None => proposal,
            });
            Ok(())
        })
        .await
    }

    async fn complete(&self, session_id: &str, message: String) -> Result<AsyncSession, ScheduleError> {
        // 累计提案的说明文字替换为本次汇总
        self.mutate(session_id, |s| {
            match s.payload.as_mut() {
                Some(p) => p.message = message.clone(),
                None => s.payload = Some(ScheduleProposal::from_slots(Vec::new(), message.clone())),
            }
            Ok(())
        })
        .await?;
        self.finish(session_id, SessionStatus::Completed, None).await
    }

    async fn fail(&self, session_id: &str, error: String) -> Result<AsyncSession, ScheduleError> {
        self.finish(session_id, SessionStatus::Failed, Some(error)).await
    }

    async fn cancel(&self, session_id: &str) -> Result<bool, ScheduleError> {
        match self.finish(session_id, SessionStatus::Cancelled, None).await {
            Ok(_) => Ok(true),
            Err(ScheduleError::InvalidTransition { .. } | ScheduleError::Cancelled) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
