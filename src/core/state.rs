//! 状态定义：AsyncSession 与对外的 StatusReport 快照
//!
//! AsyncSession 是持久化的会话记录，只由当前正在运行的链环节修改；
//! 轮询方拿到的是 StatusReport，每次轮询整体替换，从不逐字段修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleProposal;

/// 会话状态（只能向前推进）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// 已创建，首个环节尚未开始
    Pending,
    /// 链正在执行
    Processing,
    Completed,
    Failed,
    /// 外部请求取消（仅阻止后续环节入队）
    Cancelled,
}

impl SessionStatus {
    fn rank(self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Processing => 1,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// 终态之后不允许任何转换；Processing → Processing 允许（每个环节刷新进度）
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank() || (self == SessionStatus::Processing && next == self)
    }
}

/// 一次外部请求的完整生命周期记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncSession {
    pub id: String,
    pub status: SessionStatus,
    pub user_message: String,
    /// 首个响应提供后不可再改
    pub conversation_id: Option<String>,
    pub batch_size: usize,
    pub total_processed: usize,
    /// 最近一次从外部读到的剩余场次数
    pub remaining_count: Option<usize>,
    pub chain_depth: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// 各环节恢复结果的累计提案
    pub payload: Option<ScheduleProposal>,
}

impl AsyncSession {
    pub fn new(user_message: String, conversation_id: Option<String>, batch_size: usize) -> Self {
        Self {
            id: format!("sched_{}", uuid::Uuid::new_v4()),
            status: SessionStatus::Pending,
            user_message,
            conversation_id,
            batch_size,
            total_processed: 0,
            remaining_count: None,
            chain_depth: 0,
            started_at: Utc::now(),
            completed_at: None,
            last_error: None,
            payload: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// 生成对外快照：payload 仅在 Completed 时给出，错误详情仅在 Failed 时给出
    pub fn report(&self) -> StatusReport {
        StatusReport {
            session_id: self.id.clone(),
            status: self.status,
            total_processed: self.total_processed,
            remaining_count: self.remaining_count,
            chain_depth: self.chain_depth,
            started_at: self.started_at,
            payload: match self.status {
                SessionStatus::Completed => self.payload.clone(),
                _ => None,
            },
            error_detail: match self.status {
                SessionStatus::Failed => self.last_error.clone(),
                _ => None,
            },
        }
    }
}

/// 轮询结果快照（不可变，整体替换）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub session_id: String,
    pub status: SessionStatus,
    pub total_processed: usize,
    pub remaining_count: Option<usize>,
    pub chain_depth: u32,
    pub started_at: DateTime<Utc>,
    pub payload: Option<ScheduleProposal>,
    pub error_detail: Option<String>,
}

impl StatusReport {
    /// 估算总量：已处理 + 剩余（剩余未知时返回 None）
    pub fn estimated_total(&self) -> Option<usize> {
        self.remaining_count.map(|r| r + self.total_processed)
    }

    /// 负载的 JSON 全文（用于完整性启发式检查）；无负载时为空串
    pub fn payload_text(&self) -> String {
        self.payload
            .as_ref()
            .and_then(|p| serde_json::to_string(p).ok())
            .unwrap_or_default()
    }

    /// 用于判断多段响应是否仍在增长
    pub fn payload_len(&self) -> usize {
        self.payload_text().len()
    }
}
