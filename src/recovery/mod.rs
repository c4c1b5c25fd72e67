//! 响应恢复：把智能体的原始文本归一为 ScheduleProposal
//!
//! 流程：剥离包装层 → 去掉代码围栏 → 直接解析 → 失败时多片段合并 → 截断恢复 → 彻底失败（附原文预览）。
//! 所有阶段都返回带状态的值，任何错误都不会越过本模块边界。

pub mod combiner;
pub mod envelope;
pub mod markers;
pub mod partial;
pub mod scanner;

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::RecoverySection;
use crate::schedule::{schedule_items, slot_from_value, slots_from_items, ScheduleProposal};

pub use combiner::{combine_fragments, CombineSource, Combination, CombinedPayload};
pub use envelope::{salvage_truncated_envelope, unwrap_envelope};
pub use markers::{expects_more_parts, looks_complete};
pub use partial::{recover_items, recover_partial};
pub use scanner::{scan, Fragment, FragmentKind};

/// 二次编码最多展开的层数
const MAX_DECODE_DEPTH: usize = 2;

/// 恢复管线
#[derive(Debug, Clone)]
pub struct ResponseRecovery {
    preview_chars: usize,
}

impl Default for ResponseRecovery {
    fn default() -> Self {
        Self::new(&RecoverySection::default())
    }
}

impl ResponseRecovery {
    pub fn new(cfg: &RecoverySection) -> Self {
        Self {
            preview_chars: cfg.preview_chars,
        }
    }

    pub fn preview_chars(&self) -> usize {
        self.preview_chars
    }

    /// 处理原始响应文本
    pub fn recover(&self, raw: &str) -> ScheduleProposal {
        self.recover_at(raw, raw, 0)
    }

    /// 处理已是结构化 JSON 的响应
    pub fn recover_value(&self, value: &Value) -> ScheduleProposal {
        match value {
            Value::String(text) => self.recover(text),
            other => self.from_parsed(other).unwrap_or_else(|| {
                ScheduleProposal::failure(
                    "Structured response contained no valid session records",
                    &other.to_string(),
                    self.preview_chars,
                )
            }),
        }
    }

    fn recover_at(&self, text: &str, original: &str, depth: usize) -> ScheduleProposal {
        let mut body = unwrap_envelope(text).into_owned();
        if body == text {
            if let Some(salvaged) = salvage_truncated_envelope(text) {
                tracing::warn!("response envelope is truncated, salvaging its value");
                body = salvaged;
            }
        }
        let body = strip_code_fence(&body);

        if let Ok(value) = serde_json::from_str::<Value>(body) {
            if let Value::String(inner) = &value {
                if depth < MAX_DECODE_DEPTH {
                    return self.recover_at(inner, original, depth + 1);
                }
            }
            if let Some(proposal) = self.from_parsed(&value) {
                return proposal;
            }
        }

        match combine_fragments(body) {
            Combination::Merged(merged) => {
                let (slots, dropped) = slots_from_items(&merged.items);
                if !slots.is_empty() {
                    tracing::info!(
                        "combined {} fragments via {:?} into {} sessions ({} dropped, {} fragments skipped, partial={})",
                        merged.fragment_count,
                        merged.source,
                        slots.len(),
                        dropped,
                        merged.skipped,
                        merged.partial
                    );
                    let mut message = format!(
                        "Combined {} response fragments into {} sessions",
                        merged.fragment_count,
                        slots.len()
                    );
                    if merged.reported_total > 0 && merged.reported_total != slots.len() as u64 {
                        tracing::warn!(
                            "fragments reported {} sessions in total, {} were recovered",
                            merged.reported_total,
                            slots.len()
                        );
                        message.push_str(&format!(" (fragments reported {})", merged.reported_total));
                    }
                    let mut proposal = if merged.partial {
                        message.push_str("; the last fragment was truncated and the schedule is incomplete");
                        ScheduleProposal::partial(slots, message)
                    } else {
                        ScheduleProposal::from_slots(slots, message)
                    };
                    let unplaced = unplaced_locations(&merged.locations, &proposal);
                    if !unplaced.is_empty() {
                        tracing::warn!("fragments listed locations with no recovered sessions: {:?}", unplaced);
                        proposal.message.push_str(&format!(
                            " ({} listed locations have no sessions)",
                            unplaced.len()
                        ));
                    }
                    return proposal;
                }
            }
            Combination::Canonical(value) => {
                if let Some(proposal) = self.from_parsed(&value) {
                    return proposal;
                }
            }
            Combination::Unchanged => {}
        }

        let partial = recover_partial(body);
        if partial.success {
            tracing::warn!(
                "response could not be parsed whole, recovered {} sessions as partial",
                partial.total_sessions
            );
            return partial;
        }

        ScheduleProposal::failure(
            "No recoverable session data in agent response",
            original,
            self.preview_chars,
        )
    }

    /// 完整 JSON：场次数组 / 带日程字段的对象 / 单个场次对象
    fn from_parsed(&self, value: &Value) -> Option<ScheduleProposal> {
        if let Some(items) = schedule_items(value) {
            let (slots, dropped) = slots_from_items(&items);
            if slots.is_empty() {
                return None;
            }
            let mut message = format!("Parsed {} sessions", slots.len());
            if dropped > 0 {
                message.push_str(&format!(" ({dropped} records without sessionName/location skipped)"));
            }
            return Some(ScheduleProposal::from_slots(slots, message));
        }
        slot_from_value(value).map(|slot| ScheduleProposal::from_slots(vec![slot], "Parsed 1 session"))
    }
}

/// 片段自报、但没有任何已恢复场次使用的地点（地点集合本身始终由场次重算）
fn unplaced_locations(reported: &BTreeSet<String>, proposal: &ScheduleProposal) -> Vec<String> {
    reported.difference(&proposal.locations).cloned().collect()
}

/// 取出 ```json ... ``` 围栏中的内容；无围栏时原样返回
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    // 跳过语言标记（json / JSON / 空）
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest,
    };
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}
