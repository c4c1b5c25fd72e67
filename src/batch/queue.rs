//! 链环节入队原语与执行器
//!
//! 平台原语的语义：入队一个执行单元，它稍后最多执行一次，拥有独立的资源预算。
//! 跨环节必须保留的状态（已处理数、会话 ID、链深度）全部显式放进 LinkContext，不依赖内存常驻。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::coordinator::{BatchCoordinator, LinkOutcome};
use crate::core::ScheduleError;

/// 构造下一个环节所需的全部状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkContext {
    pub session_id: String,
    pub user_message: String,
    pub conversation_id: Option<String>,
    pub batch_size: usize,
    pub total_processed: usize,
    /// 本环节之前已执行的环节数
    pub chain_depth: u32,
}

impl LinkContext {
    pub fn first(
        session_id: String,
        user_message: String,
        conversation_id: Option<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            session_id,
            user_message,
            conversation_id,
            batch_size,
            total_processed: 0,
            chain_depth: 0,
        }
    }

    /// 下一环节：链深度 +1，带上最新的会话 ID 与已处理数
    pub fn next(&self, conversation_id: Option<String>, total_processed: usize) -> Self {
        Self {
            conversation_id,
            total_processed,
            chain_depth: self.chain_depth + 1,
            ..self.clone()
        }
    }
}

/// 平台的入队原语
pub trait LinkScheduler: Send + Sync {
    fn enqueue(&self, link: LinkContext) -> Result<(), ScheduleError>;
}

/// 进程内实现：无界 mpsc 通道
pub struct ChannelScheduler {
    tx: mpsc::UnboundedSender<LinkContext>,
    enqueued: AtomicUsize,
}

impl ChannelScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LinkContext>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                enqueued: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// 累计入队次数（所有链）
    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }
}

impl LinkScheduler for ChannelScheduler {
    fn enqueue(&self, link: LinkContext) -> Result<(), ScheduleError> {
        self.tx
            .send(link)
            .map_err(|e| ScheduleError::Enqueue(e.to_string()))?;
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 链环节执行器：严格串行，一次只跑一个环节，每个环节有独立的时间预算
pub struct LinkRunner {
    coordinator: Arc<BatchCoordinator>,
    budget: Duration,
}

impl LinkRunner {
    pub fn new(coordinator: Arc<BatchCoordinator>, budget: Duration) -> Self {
        Self { coordinator, budget }
    }

    /// 持续消费入队的环节，直到所有发送端关闭
    pub async fn start(self, mut pending_rx: mpsc::UnboundedReceiver<LinkContext>) {
        while let Some(link) = pending_rx.recv().await {
            self.execute(link).await;
        }
        tracing::debug!("link queue closed, runner stopping");
    }

    /// 执行当前已入队的环节（含执行过程中新入队的），队列空即返回
    pub async fn drain(&self, pending_rx: &mut mpsc::UnboundedReceiver<LinkContext>) -> Vec<LinkOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(link) = pending_rx.try_recv() {
            outcomes.push(self.execute(link).await);
        }
        outcomes
    }

    async fn execute(&self, link: LinkContext) -> LinkOutcome {
        match tokio::time::timeout(self.budget, self.coordinator.run_link(link.clone())).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = ScheduleError::ResourceLimit(format!(
                    "link {} exceeded its execution budget of {}s",
                    link.chain_depth + 1,
                    self.budget.as_secs()
                ));
                self.coordinator.fail_link(&link, err).await
            }
        }
    }
}
