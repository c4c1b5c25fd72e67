//! 截断记录恢复：整体解析失败时，尽可能取回完整且有效的场次记录
//!
//! 结果总是标记为 partial；一条都取不回时返回空的（success = false）提案，从不报错。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::envelope::unescape;
use super::scanner::nested_object_spans;
use crate::schedule::{schedule_items, slot_from_value, slots_from_items, ScheduleProposal};

static TRAILING_COMMA_RE: OnceLock<Regex> = OnceLock::new();
static LOOSE_RECORD_RE: OnceLock<Regex> = OnceLock::new();

fn trailing_comma_re() -> &'static Regex {
    TRAILING_COMMA_RE.get_or_init(|| Regex::new(r",\s*([}\]])").unwrap())
}

/// 不含嵌套括号、带 sessionName 键的扁平对象
fn loose_record_re() -> &'static Regex {
    LOOSE_RECORD_RE.get_or_init(|| Regex::new(r#"\{[^{}]*"sessionName"[^{}]*\}"#).unwrap())
}

/// 从截断 / 夹杂文字的负载中恢复场次
pub fn recover_partial(payload: &str) -> ScheduleProposal {
    let (slots, _) = slots_from_items(&recover_items(payload));
    let message = if slots.is_empty() {
        "No complete session records could be recovered from the truncated response".to_string()
    } else {
        format!(
            "Recovered {} complete session(s) from a truncated response; the schedule is incomplete",
            slots.len()
        )
    };
    ScheduleProposal::partial(slots, message)
}

/// 截断负载中所有完整闭合的场次记录（原始 JSON，按出现顺序）
pub fn recover_items(payload: &str) -> Vec<Value> {
    collect_items(payload, true)
}

fn collect_items(payload: &str, allow_decode: bool) -> Vec<Value> {
    let body = trim_to_structure(payload);
    if body.is_empty() {
        return Vec::new();
    }

    // 整个负载是一个 JSON 字符串字面量（二次编码）时先解一层
    if allow_decode && body.starts_with('"') {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::String(decoded)) => return collect_items(&decoded, false),
            // 字面量本身也被截断：看起来是编码过的 JSON 时手工反转义
            Err(_) if body[1..].trim_start().starts_with(['[', '{']) => {
                return collect_items(&unescape(&body[1..]), false);
            }
            _ => {}
        }
    }

    let mut items = Vec::new();
    for span in nested_object_spans(body) {
        let Some(value) = parse_with_repair(span.text(body)) else {
            continue;
        };
        if slot_from_value(&value).is_some() {
            items.push(value);
        } else if let Some(nested) = schedule_items(&value) {
            items.extend(nested.into_iter().filter(|v| slot_from_value(v).is_some()));
        }
    }

    if items.is_empty() {
        items = loose_scan(body);
        if !items.is_empty() {
            tracing::warn!("recovered {} sessions via loose record scan", items.len());
        }
    }
    items
}

/// 截掉首个结构起始符之前、末个结构结束符之后的散文
pub fn trim_to_structure(payload: &str) -> &str {
    let Some(start) = payload.find(['{', '[', '"']) else {
        return "";
    };
    match payload.rfind(['}', ']', '"']) {
        Some(end) if end >= start => &payload[start..=end],
        _ => &payload[start..],
    }
}

/// 先直接解析；失败时去掉闭括号前的悬空逗号再试一次
pub fn parse_with_repair(candidate: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    let repaired = trailing_comma_re().replace_all(candidate, "$1");
    serde_json::from_str::<Value>(&repaired).ok()
}

fn loose_scan(body: &str) -> Vec<Value> {
    loose_record_re()
        .find_iter(body)
        .filter_map(|m| parse_with_repair(m.as_str()))
        .filter(|v| slot_from_value(v).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(proposal: &ScheduleProposal) -> Vec<&str> {
        proposal.schedule.iter().map(|s| s.session_name.as_str()).collect()
    }

    #[test]
    fn test_truncated_second_record_dropped() {
        let raw = r#"[{"sessionName":"A","location":"Room1"},{"sessionName":"B""#;
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["A"]);
        assert!(proposal.partial);
        assert!(proposal.success);
        assert_eq!(proposal.locations.iter().collect::<Vec<_>>(), vec!["Room1"]);
    }

    #[test]
    fn test_truncated_inside_nested_speakers() {
        let raw = r#"{"schedule":[
            {"sessionName":"A","location":"X","speakers":[{"fullName":"Ada"}]},
            {"sessionName":"B","location":"Y","speakers":[{"fullName":"Bob"}]},
            {"sessionName":"C","location":"Z","speakers":[{"fullName":"Cy"}"#;
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["A", "B"]);
        assert_eq!(proposal.schedule[0].speakers, vec!["Ada"]);
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let raw = r#"Sure! [{"sessionName":"A","location":"X",},{"sessionName":"B","#;
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["A"]);
    }

    #[test]
    fn test_records_missing_location_discarded() {
        let raw = r#"[{"sessionName":"A"},{"sessionName":"B","location":"Y"},{"sess"#;
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["B"]);
    }

    #[test]
    fn test_loose_scan_fallback() {
        // 外层对象平衡但内部损坏，对象级候选全部失效，退回宽松扫描
        let raw = r#"{"schedule": [{"sessionName":"A","location":"X"} {"sessionName":"B","location":"Y"}] }"#;
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["A", "B"]);
        assert!(proposal.partial);
    }

    #[test]
    fn test_double_encoded_payload() {
        let raw = r#""[{\"sessionName\":\"A\",\"location\":\"X\"},{\"sessionName\":\"B\""#;
        // 字符串字面量本身被截断
        let proposal = recover_partial(raw);
        assert_eq!(names(&proposal), vec!["A"]);

        let encoded = serde_json::to_string(r#"[{"sessionName":"A","location":"X"}]"#).unwrap();
        let proposal = recover_partial(&encoded);
        assert_eq!(names(&proposal), vec!["A"]);
    }

    #[test]
    fn test_recover_items_keeps_raw_records() {
        let raw = r#"[{"sessionName":"A","location":"X","focus":"AI"},{"sessionName":"B","loc"#;
        let items = recover_items(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["focus"], "AI");
    }

    #[test]
    fn test_nothing_recoverable() {
        let proposal = recover_partial("I'm sorry, I could not build a schedule.");
        assert!(proposal.schedule.is_empty());
        assert!(!proposal.success);
        assert!(proposal.partial);
        assert_eq!(proposal.total_sessions, 0);
    }

    #[test]
    fn test_trim_to_structure() {
        assert_eq!(trim_to_structure("text [1] more"), "[1]");
        assert_eq!(trim_to_structure("no structure"), "");
        assert_eq!(trim_to_structure("x {\"a\":"), "{\"a\"");
    }
}
