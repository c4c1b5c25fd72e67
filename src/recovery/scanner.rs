//! 结构扫描器：在任意字符流中定位括号平衡的 JSON 对象 / 数组子串
//!
//! 单遍 O(n)：维护每种括号的深度、"位于字符串内" 与 "转义待处理" 两个标志。
//! 字符串状态只在结构内部追踪，结构外的散文引号不会吞掉后面的 `{`。
//! 未闭合的尾部片段（截断）永远不会被捕获。

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Object,
    Array,
}

/// 候选子串在原文中的字节区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub kind: FragmentKind,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.start..self.end]
    }
}

/// 通过校验（可独立解析为 JSON）的片段
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    pub kind: FragmentKind,
    pub text: &'a str,
    pub value: Value,
}

/// 词法事件：只在字符串外产生
enum Token {
    Open(FragmentKind),
    Close(FragmentKind),
}

/// 字符串 / 转义感知的括号词法器，两种扫描共用
#[derive(Default)]
struct Lexer {
    in_string: bool,
    escape: bool,
}

impl Lexer {
    /// `inside` 表示当前处于某个结构内部；结构外不追踪字符串
    fn feed(&mut self, ch: char, inside: bool) -> Option<Token> {
        if self.in_string {
            if self.escape {
                self.escape = false;
            } else if ch == '\\' {
                self.escape = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return None;
        }
        match ch {
            '"' if inside => {
                self.in_string = true;
                None
            }
            '{' => Some(Token::Open(FragmentKind::Object)),
            '[' => Some(Token::Open(FragmentKind::Array)),
            '}' => Some(Token::Close(FragmentKind::Object)),
            ']' => Some(Token::Close(FragmentKind::Array)),
            _ => None,
        }
    }
}

/// 顶层平衡候选：深度 0→1 开启，回到 0 关闭（不做 JSON 校验）
pub fn balanced_spans(input: &str) -> Vec<Span> {
    let mut lexer = Lexer::default();
    let mut object_depth = 0usize;
    let mut array_depth = 0usize;
    let mut open: Option<(FragmentKind, usize)> = None;
    let mut spans = Vec::new();

    for (idx, ch) in input.char_indices() {
        let inside = object_depth + array_depth > 0;
        match lexer.feed(ch, inside) {
            Some(Token::Open(kind)) => {
                if !inside {
                    open = Some((kind, idx));
                }
                match kind {
                    FragmentKind::Object => object_depth += 1,
                    FragmentKind::Array => array_depth += 1,
                }
            }
            Some(Token::Close(kind)) => {
                let depth = match kind {
                    FragmentKind::Object => &mut object_depth,
                    FragmentKind::Array => &mut array_depth,
                };
                // 多余的闭括号直接忽略
                if *depth == 0 {
                    continue;
                }
                *depth -= 1;
                if object_depth + array_depth == 0 {
                    if let Some((kind, start)) = open.take() {
                        spans.push(Span {
                            kind,
                            start,
                            end: idx + ch.len_utf8(),
                        });
                    }
                    lexer = Lexer::default();
                }
            }
            None => {}
        }
    }
    spans
}

/// 任意嵌套深度上的最大闭合对象：外层对象闭合时吸收其内部已记录的对象
///
/// 截断数组 `[{A},{B},{C` 会得到 A、B；C 未闭合，C 内部已闭合的子对象会单独出现，由调用方校验剔除。
pub fn nested_object_spans(input: &str) -> Vec<Span> {
    let mut lexer = Lexer::default();
    let mut stack: Vec<(FragmentKind, usize)> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    for (idx, ch) in input.char_indices() {
        match lexer.feed(ch, !stack.is_empty()) {
            Some(Token::Open(kind)) => stack.push((kind, idx)),
            Some(Token::Close(kind)) => {
                // 括号类型不匹配时视为噪声
                if stack.last().map(|(k, _)| *k) != Some(kind) {
                    continue;
                }
                let Some((_, start)) = stack.pop() else {
                    continue;
                };
                if kind == FragmentKind::Object {
                    while spans.last().is_some_and(|s| s.start > start) {
                        spans.pop();
                    }
                    spans.push(Span {
                        kind,
                        start,
                        end: idx + ch.len_utf8(),
                    });
                }
                if stack.is_empty() {
                    lexer = Lexer::default();
                }
            }
            None => {}
        }
    }
    spans
}

/// 顶层平衡且能独立解析为 JSON 的片段；结构平衡但语义损坏的候选静默丢弃
pub fn scan(input: &str) -> Vec<Fragment<'_>> {
    let fragments: Vec<Fragment<'_>> = balanced_spans(input)
        .into_iter()
        .filter_map(|span| {
            let text = span.text(input);
            serde_json::from_str::<Value>(text).ok().map(|value| Fragment {
                kind: span.kind,
                text,
                value,
            })
        })
        .collect();
    tracing::debug!("scanner found {} valid fragments", fragments.len());
    fragments
}
