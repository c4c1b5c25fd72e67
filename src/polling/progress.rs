//! 进度估算
//!
//! 纯函数：{状态, 已耗时, 已处理数, 估算总量} → 0..=100。同样的输入永远得到同样的输出。

use std::time::Duration;

use crate::core::SessionStatus;

pub const PENDING_PROGRESS: u8 = 5;
const PROCESSING_FLOOR: f64 = 10.0;
const PROCESSING_SPAN: f64 = 85.0;
/// 非终态时的进度上限
pub const PROCESSING_CEILING: u8 = 95;
/// 总量未知时按耗时逼近上限的时间常数
const TIME_CONSTANT_SECS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressInput {
    pub status: SessionStatus,
    pub elapsed: Duration,
    pub total_processed: usize,
    pub estimated_total: Option<usize>,
}

pub fn estimate_progress(input: ProgressInput) -> u8 {
    match input.status {
        SessionStatus::Pending => PENDING_PROGRESS,
        SessionStatus::Processing => {
            let fraction = match input.estimated_total {
                Some(total) if total > 0 => (input.total_processed as f64 / total as f64).min(1.0),
                _ => 1.0 - (-input.elapsed.as_secs_f64() / TIME_CONSTANT_SECS).exp(),
            };
            let value = PROCESSING_FLOOR + PROCESSING_SPAN * fraction;
            value.min(PROCESSING_CEILING as f64).floor() as u8
        }
        SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled => 100,
    }
}

/// 单调进度：取历次估算的最大值
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, input: ProgressInput) -> u8 {
        self.current = self.current.max(estimate_progress(input));
        self.current
    }

    pub fn current(&self) -> u8 {
        self.current
    }
}
