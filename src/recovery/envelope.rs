//! 响应包装层：`{"type": "...", "value": "<转义后的 JSON 字符串>"}`
//!
//! 外层合法时取出 value 并还原常见转义；外层不合法时原样返回，交给后续阶段处理。

use std::borrow::Cow;

use serde_json::Value;

/// 包装层嵌套的最大展开层数
const MAX_ENVELOPE_DEPTH: usize = 4;

/// 剥离包装层，value 本身仍是包装层时一并展开。
/// 非包装形态（或外层无法解析）时返回原文；嵌套不超过 4 层时，对结果重复调用不会再有变化
pub fn unwrap_envelope(raw: &str) -> Cow<'_, str> {
    let Some(mut body) = unwrap_once(raw) else {
        return Cow::Borrowed(raw);
    };
    for _ in 1..MAX_ENVELOPE_DEPTH {
        match unwrap_once(&body) {
            Some(inner) => body = inner,
            None => break,
        }
    }
    Cow::Owned(body)
}

fn unwrap_once(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !looks_like_envelope(trimmed) {
        return None;
    }

    let outer: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("envelope not parseable, passing through: {}", e);
            return None;
        }
    };
    let inner = envelope_value(&outer)?;

    // 解码一次后若已是合法 JSON，不能再反转义，否则会破坏字符串内合法的 \" 与 \n
    if serde_json::from_str::<Value>(inner.trim()).is_ok() {
        Some(inner.to_string())
    } else {
        Some(unescape(inner))
    }
}

fn envelope_value(outer: &Value) -> Option<&str> {
    let obj = outer.as_object()?;
    obj.get("type")?.as_str()?;
    obj.get("value")?.as_str()
}

fn looks_like_envelope(trimmed: &str) -> bool {
    trimmed.starts_with('{') && trimmed.contains("\"type\"") && trimmed.contains("\"value\"")
}

/// 外层被截断时尝试抢救：去掉 `{"type":"..","value":"` 前缀，反转义剩余部分
///
/// 仅当前缀完整存在时返回 Some。
pub fn salvage_truncated_envelope(raw: &str) -> Option<String> {
    let trimmed = raw.trim_start();
    if !trimmed.starts_with('{') || serde_json::from_str::<Value>(trimmed).is_ok() {
        return None;
    }
    let re = envelope_prefix_re();
    let m = re.find(trimmed)?;
    let mut body = &trimmed[m.end()..];
    // 完整的尾部 `"}` 也一并去掉
    if let Some(stripped) = body.trim_end().strip_suffix("\"}") {
        body = stripped;
    }
    Some(unescape(body))
}

fn envelope_prefix_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"^\{\s*"type"\s*:\s*"[^"]*"\s*,\s*"value"\s*:\s*""#)
            .expect("static envelope regex")
    })
}

/// 还原 `\n` `\t` `\r` `\"` `\\`；其余转义保持原样
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
