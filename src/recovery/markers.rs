//! 分段标记与完整性启发式
//!
//! 关键词匹配只是尽力而为的信号，不是结构保证；真正的兜底是轮询超时与链长上限。

use std::sync::OnceLock;

use regex::Regex;

static PART_MARKER_RE: OnceLock<Regex> = OnceLock::new();
static PART_OF_RE: OnceLock<Regex> = OnceLock::new();

/// "Part 2"、"Response 3:"、"**Part 1 of 3**" 等显式分段标记
pub fn part_marker_re() -> &'static Regex {
    PART_MARKER_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:part|response)\s*#?\s*\d+(?:\s*(?:of|/)\s*\d+)?\s*[:.)\-]*").unwrap()
    })
}

fn part_of_re() -> &'static Regex {
    PART_OF_RE.get_or_init(|| Regex::new(r"(?i)\bpart\s*#?\s*(\d+)\s*(?:of|/)\s*(\d+)").unwrap())
}

const COMPLETE_PHRASES: &[&str] = &[
    "schedule complete",
    "schedule is complete",
    "final part",
    "end of schedule",
    "all sessions scheduled",
    "all sessions have been scheduled",
];

const CONTINUATION_PHRASES: &[&str] = &[
    "continued in next",
    "continued in the next",
    "to be continued",
    "continues in part",
    "more sessions to follow",
];

pub fn has_part_markers(text: &str) -> bool {
    part_marker_re().is_match(text)
}

/// 按分段标记切分，丢弃标记本身与空段
pub fn split_parts(text: &str) -> Vec<&str> {
    part_marker_re()
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn part_numbers(text: &str) -> Vec<(u32, u32)> {
    part_of_re()
        .captures_iter(text)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
        .collect()
}

/// 文本声明自己已经完整（"final part"、"Part 3 of 3" 等）
pub fn looks_complete(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLETE_PHRASES.iter().any(|p| lower.contains(p))
        || part_numbers(text).iter().any(|(n, m)| n == m && *m > 0)
}

/// 文本暗示后面还有分段（"Part 1 of 3"、"to be continued" 等）
pub fn expects_more_parts(text: &str) -> bool {
    if looks_complete(text) {
        return false;
    }
    let lower = text.to_lowercase();
    CONTINUATION_PHRASES.iter().any(|p| lower.contains(p))
        || part_numbers(text).iter().any(|(n, m)| n < m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_part_markers() {
        let text = "Part 1:\n[1,2]\n\nPart 2 of 2:\n[3]";
        assert_eq!(split_parts(text), vec!["[1,2]", "[3]"]);
        assert!(has_part_markers(text));
        assert!(!has_part_markers("[1,2,3]"));
    }

    #[test]
    fn test_response_markers() {
        let parts = split_parts("Response 1 - {\"a\":1} Response 2 - {\"b\":2}");
        assert_eq!(parts, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_completion_signals() {
        assert!(looks_complete("Here is the final part of the schedule"));
        assert!(looks_complete("Part 3 of 3"));
        assert!(!looks_complete("Part 1 of 3"));

        assert!(expects_more_parts("Part 1 of 3: [..]"));
        assert!(expects_more_parts("... to be continued"));
        assert!(!expects_more_parts("Part 1 of 2 ... Part 2 of 2"));
        assert!(!expects_more_parts("[{\"sessionName\":\"A\"}]"));
    }
}
