//! 多片段合并：一个负载里实际包含多个独立 JSON 片段或显式 "Part N" 分段时，合并为一个逻辑结果
//!
//! 检测顺序（先命中者生效）：
//! 1. 多个合法对象：任一带日程字段则合并各自的场次数组与地点集合、累加自报总数；否则以第一个为准
//! 2. 多个合法数组：按出现顺序拼接全部元素
//! 3. 显式分段标记：按标记切分，每段按数组或带日程字段的对象解析后拼接
//! 4. 其余情况原样透传
//!
//! 合并只做按发现顺序的简单拼接；解析失败的片段跳过，不影响其他片段。
//! 末尾片段被截断（或某个分段无法整体解析）时，其中已完整闭合的记录仍会取回，结果标记为 partial。

use std::collections::BTreeSet;

use serde_json::Value;

use super::markers::{has_part_markers, split_parts};
use super::partial::{parse_with_repair, recover_items, trim_to_structure};
use super::scanner::{balanced_spans, scan, FragmentKind};
use crate::schedule::normalize::{has_schedule_field, reported_locations, reported_total};
use crate::schedule::schedule_items;

/// 合并来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineSource {
    Objects,
    Arrays,
    PartMarkers,
}

/// 合并后的逻辑负载
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedPayload {
    pub items: Vec<Value>,
    /// 片段自报地点的并集（最终地点集合仍由场次重新计算）
    pub locations: BTreeSet<String>,
    /// 片段自报总数之和
    pub reported_total: u64,
    pub fragment_count: usize,
    pub skipped: usize,
    pub source: CombineSource,
    /// 至少一个片段被截断
    pub partial: bool,
}

impl CombinedPayload {
    fn empty(source: CombineSource) -> Self {
        Self {
            items: Vec::new(),
            locations: BTreeSet::new(),
            reported_total: 0,
            fragment_count: 0,
            skipped: 0,
            source,
            partial: false,
        }
    }

    /// 截断片段里的完整记录追加到末尾
    fn absorb_truncated(&mut self, text: &str) {
        let items = recover_items(text);
        if !items.is_empty() || has_unclosed_structure(text) {
            tracing::warn!("fragment is truncated, keeping {} complete records from it", items.len());
            self.partial = true;
        }
        self.items.extend(items);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Combination {
    Merged(CombinedPayload),
    /// 多个对象但都不带日程字段：取第一个
    Canonical(Value),
    Unchanged,
}

pub fn combine_fragments(payload: &str) -> Combination {
    let fragments = scan(payload);
    let objects: Vec<&Value> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Object)
        .map(|f| &f.value)
        .collect();
    let arrays: Vec<&Value> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Array)
        .map(|f| &f.value)
        .collect();

    let tail = truncated_tail(payload);

    if objects.len() > 1 {
        return match combine_objects(&objects) {
            Combination::Merged(mut merged) => {
                if let Some(tail) = tail {
                    merged.absorb_truncated(tail);
                }
                Combination::Merged(merged)
            }
            other => other,
        };
    }
    if arrays.len() > 1 {
        let mut merged = combine_arrays(&arrays);
        if let Some(tail) = tail {
            merged.absorb_truncated(tail);
        }
        return Combination::Merged(merged);
    }
    if has_part_markers(payload) {
        if let Some(merged) = combine_parts(payload) {
            return Combination::Merged(merged);
        }
    }
    Combination::Unchanged
}

fn combine_objects(objects: &[&Value]) -> Combination {
    if !objects.iter().any(|o| has_schedule_field(o)) {
        tracing::debug!("{} objects without schedule field, using the first", objects.len());
        return Combination::Canonical(objects[0].clone());
    }

    let mut merged = CombinedPayload::empty(CombineSource::Objects);
    for object in objects {
        match schedule_items(object) {
            Some(items) => {
                merged.items.extend(items);
                merged.locations.extend(reported_locations(object));
                merged.reported_total += reported_total(object);
                merged.fragment_count += 1;
            }
            None => merged.skipped += 1,
        }
    }
    Combination::Merged(merged)
}

fn combine_arrays(arrays: &[&Value]) -> CombinedPayload {
    let items: Vec<Value> = arrays
        .iter()
        .filter_map(|a| a.as_array())
        .flat_map(|a| a.iter().cloned())
        .collect();
    CombinedPayload {
        items,
        fragment_count: arrays.len(),
        ..CombinedPayload::empty(CombineSource::Arrays)
    }
}

/// 没有任何一段能解析时返回 None
fn combine_parts(payload: &str) -> Option<CombinedPayload> {
    let mut merged = CombinedPayload::empty(CombineSource::PartMarkers);

    for segment in split_parts(payload) {
        let body = trim_to_structure(segment);
        let parsed = parse_with_repair(body).and_then(|value| match value {
            Value::Array(_) => schedule_items(&value).map(|items| (items, value)),
            Value::Object(_) if has_schedule_field(&value) => {
                schedule_items(&value).map(|items| (items, value))
            }
            _ => None,
        });
        match parsed {
            Some((items, value)) => {
                merged.items.extend(items);
                merged.locations.extend(reported_locations(&value));
                merged.reported_total += reported_total(&value);
                merged.fragment_count += 1;
            }
            None => {
                tracing::warn!("skipping unparseable part ({} bytes)", segment.len());
                merged.skipped += 1;
                merged.absorb_truncated(segment);
            }
        }
    }

    (merged.fragment_count > 0).then_some(merged)
}

/// 最后一个顶层平衡片段之后仍有未闭合结构时，返回这段尾部
fn truncated_tail(payload: &str) -> Option<&str> {
    let end = balanced_spans(payload).last().map_or(0, |s| s.end);
    let tail = &payload[end..];
    has_unclosed_structure(tail).then_some(tail)
}

fn has_unclosed_structure(text: &str) -> bool {
    let end = balanced_spans(text).last().map_or(0, |s| s.end);
    text[end..].contains(['{', '['])
}
