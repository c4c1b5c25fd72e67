//! 日程数据模型：SessionSlot、TimeRange、ScheduleProposal

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 缺少讲者时的占位
pub const SPEAKER_PLACEHOLDER: &str = "Speaker TBD";
pub const UNSPECIFIED: &str = "Not specified";
pub const NO_ABSTRACT: &str = "No abstract provided";

/// 一个候选场次安排；sessionName 与 location 必须非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSlot {
    pub session_name: String,
    pub location: String,
    pub speakers: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub format: String,
    pub focus: String,
    pub session_abstract: String,
}

impl SessionSlot {
    /// 仅名称与地点，其余字段取默认值
    pub fn new(session_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            location: location.into(),
            speakers: vec![SPEAKER_PLACEHOLDER.to_string()],
            start_time: None,
            end_time: None,
            format: UNSPECIFIED.to_string(),
            focus: UNSPECIFIED.to_string(),
            session_abstract: NO_ABSTRACT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub earliest_start: Option<DateTime<Utc>>,
    pub latest_end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// 只统计能解析出时间的场次；缺结束时间时以开始时间代替，反之亦然
    pub fn over(slots: &[SessionSlot]) -> Self {
        let earliest_start = slots
            .iter()
            .filter_map(|s| s.start_time.or(s.end_time))
            .min();
        let latest_end = slots
            .iter()
            .filter_map(|s| s.end_time.or(s.start_time))
            .max();
        Self {
            earliest_start,
            latest_end,
        }
    }
}

/// 恢复 / 归一化后的日程提案
///
/// `total_sessions`、`locations`、`time_range` 总是由 `schedule` 重新计算，不信任输入。
/// `partial` 为 true 表示结果因截断而必然不完整，并非解析缺陷。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleProposal {
    pub schedule: Vec<SessionSlot>,
    pub total_sessions: usize,
    pub locations: BTreeSet<String>,
    pub time_range: TimeRange,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_preview: Option<String>,
}

impl ScheduleProposal {
    pub fn from_slots(schedule: Vec<SessionSlot>, message: impl Into<String>) -> Self {
        let mut proposal = Self {
            schedule,
            success: true,
            message: message.into(),
            ..Default::default()
        };
        proposal.recompute();
        proposal
    }

    /// 截断恢复的结果：始终带 partial 标记；一条都没恢复出来时 success = false
    pub fn partial(schedule: Vec<SessionSlot>, message: impl Into<String>) -> Self {
        let mut proposal = Self::from_slots(schedule, message);
        proposal.partial = true;
        proposal.success = !proposal.schedule.is_empty();
        proposal
    }

    /// 完全无法恢复：附带错误说明与截断后的原始响应，供排查
    pub fn failure(error: impl Into<String>, raw: &str, preview_chars: usize) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: format!("Could not extract a schedule: {error}"),
            error: Some(error),
            raw_preview: Some(preview(raw, preview_chars)),
            ..Default::default()
        }
    }

    /// 重新计算派生字段
    pub fn recompute(&mut self) {
        self.total_sessions = self.schedule.len();
        self.locations = self
            .schedule
            .iter()
            .map(|s| s.location.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.time_range = TimeRange::over(&self.schedule);
    }

    /// 合并另一批结果（追加在后），partial 标记具有传染性
    pub fn merge(&mut self, other: ScheduleProposal) {
        self.schedule.extend(other.schedule);
        self.partial |= other.partial;
        self.success = self.success || other.success;
        self.recompute();
    }
}

/// 按字符截断，避免切断 UTF-8
pub fn preview(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}
