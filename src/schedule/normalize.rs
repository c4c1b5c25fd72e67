//! 字段归一化：把智能体给出的 JSON 对象转为 SessionSlot
//!
//! 非法时间降级为 None，缺省字段填哨兵值；缺 sessionName 或 location 的记录直接丢弃。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::types::{SessionSlot, NO_ABSTRACT, SPEAKER_PLACEHOLDER, UNSPECIFIED};

/// 可能承载场次数组的字段名（按优先级）
pub const SCHEDULE_FIELDS: &[&str] = &[
    "schedule",
    "sessions",
    "proposedSchedule",
    "scheduleProposal",
    "proposal",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// 从 JSON 对象构造 SessionSlot；不满足必填条件时返回 None
pub fn slot_from_value(value: &Value) -> Option<SessionSlot> {
    let obj = value.as_object()?;
    let session_name = non_empty_str(obj.get("sessionName"))?;
    let location = non_empty_str(obj.get("location"))?;

    Some(SessionSlot {
        session_name,
        location,
        speakers: parse_speakers(obj.get("speakers")),
        start_time: obj.get("startTime").and_then(parse_time),
        end_time: obj.get("endTime").and_then(parse_time),
        format: non_empty_str(obj.get("format")).unwrap_or_else(|| UNSPECIFIED.to_string()),
        focus: non_empty_str(obj.get("focus")).unwrap_or_else(|| UNSPECIFIED.to_string()),
        session_abstract: non_empty_str(obj.get("sessionAbstract"))
            .or_else(|| non_empty_str(obj.get("abstract")))
            .unwrap_or_else(|| NO_ABSTRACT.to_string()),
    })
}

/// 批量转换，返回 (有效场次, 丢弃数)
pub fn slots_from_items(items: &[Value]) -> (Vec<SessionSlot>, usize) {
    let slots: Vec<SessionSlot> = items.iter().filter_map(slot_from_value).collect();
    let dropped = items.len() - slots.len();
    (slots, dropped)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// 讲者可以是字符串数组、{firstName,lastName,fullName} 对象数组，或单个字符串
pub fn parse_speakers(value: Option<&Value>) -> Vec<String> {
    let speakers: Vec<String> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(speaker_name).collect(),
        Some(v @ Value::String(_)) | Some(v @ Value::Object(_)) => {
            speaker_name(v).into_iter().collect()
        }
        _ => Vec::new(),
    };
    if speakers.is_empty() {
        vec![SPEAKER_PLACEHOLDER.to_string()]
    } else {
        speakers
    }
}

fn speaker_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(obj) => {
            if let Some(full) = non_empty_str(obj.get("fullName")) {
                return Some(full);
            }
            let parts: Vec<String> = ["firstName", "lastName"]
                .iter()
                .filter_map(|k| non_empty_str(obj.get(*k)))
                .collect();
            if parts.is_empty() {
                non_empty_str(obj.get("name"))
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}

/// 解析 ISO-8601 / 平台日期时间；无法识别时返回 None（从不报错）
pub fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_time_str(s.trim()),
        // 平台时间戳（毫秒）
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// 取出场次数组：顶层数组本身，或对象中的日程字段（允许嵌套一层提案对象或二次编码的字符串）
pub fn schedule_items(value: &Value) -> Option<Vec<Value>> {
    schedule_items_at(value, 0)
}

fn schedule_items_at(value: &Value, depth: usize) -> Option<Vec<Value>> {
    if depth > 2 {
        return None;
    }
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(obj) => SCHEDULE_FIELDS.iter().find_map(|field| match obj.get(*field)? {
            Value::Array(items) => Some(items.clone()),
            nested @ Value::Object(_) => schedule_items_at(nested, depth + 1),
            Value::String(encoded) => serde_json::from_str::<Value>(encoded)
                .ok()
                .and_then(|v| schedule_items_at(&v, depth + 1)),
            _ => None,
        }),
        _ => None,
    }
}

/// 对象是否带有日程字段
pub fn has_schedule_field(value: &Value) -> bool {
    value.is_object() && schedule_items(value).is_some()
}

/// 片段自报的总数（仅用于汇总日志，不作为 totalSessions）
pub fn reported_total(value: &Value) -> u64 {
    value
        .get("totalSessions")
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

/// 片段自带的地点列表
pub fn reported_locations(value: &Value) -> Vec<String> {
    value
        .get("locations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
