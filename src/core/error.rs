//! 调度链错误类型
//!
//! 只有协调器的智能体调用与持久化调用会把错误带到 Failed 终态；恢复阶段从不返回错误。

use thiserror::Error;

use crate::core::state::SessionStatus;

/// 链式批处理过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// 智能体调用失败，原样保留错误文本
    #[error("Agent call failed: {0}")]
    Agent(String),

    /// 堆内存 / CPU / 配额耗尽
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("chain limit reached after {depth} links ({processed} sessions processed)")]
    ChainLimit { depth: u32, processed: usize },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("Failed to enqueue next link: {0}")]
    Enqueue(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

/// 平台资源上限类错误的特征文本（小写匹配）
const LIMIT_MARKERS: &[&str] = &[
    "heap size",
    "heap limit",
    "out of memory",
    "cpu time",
    "cpu limit",
    "limit exceeded",
    "too many queueable jobs",
    "too many soql queries",
    "apex cpu",
    "maximum stack depth",
    "resource exhausted",
];

/// 把智能体调用的原始错误文本归类：资源上限类改写为可操作的提示，其余原样保留
pub fn classify_agent_failure(raw: &str) -> ScheduleError {
    let lower = raw.to_lowercase();
    if LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        ScheduleError::ResourceLimit(raw.to_string())
    } else {
        ScheduleError::Agent(raw.to_string())
    }
}

impl ScheduleError {
    /// 面向用户的说明文字
    pub fn user_message(&self) -> String {
        match self {
            ScheduleError::ResourceLimit(_) => format!(
                "{self}. The batch needed more memory or CPU than one execution allows; \
                 try a smaller batch size (for example 5 sessions per batch)."
            ),
            ScheduleError::ChainLimit { .. } => format!(
                "{self}. Start a new request to schedule the remaining sessions."
            ),
            other => other.to_string(),
        }
    }

    pub fn is_resource_limit(&self) -> bool {
        matches!(self, ScheduleError::ResourceLimit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_error_becomes_resource_limit() {
        let err = classify_agent_failure("System.LimitException: Apex heap size too large: 6291456");
        assert!(err.is_resource_limit());
        assert!(err.user_message().contains("smaller batch"));
    }

    #[test]
    fn test_cpu_errors_become_resource_limit() {
        let err = classify_agent_failure("Maximum CPU time on the server exceeded");
        assert!(err.is_resource_limit());

        let err = classify_agent_failure("Apex CPU time limit exceeded");
        assert!(err.is_resource_limit());
    }

    #[test]
    fn test_other_errors_kept_verbatim() {
        let err = classify_agent_failure("503 Service Unavailable");
        assert_eq!(err, ScheduleError::Agent("503 Service Unavailable".to_string()));
        assert!(err.user_message().contains("503 Service Unavailable"));
    }

    #[test]
    fn test_chain_limit_message() {
        let err = ScheduleError::ChainLimit { depth: 5, processed: 50 };
        let msg = err.user_message();
        assert!(msg.contains("chain limit"));
        assert!(msg.contains("50"));
    }
}
