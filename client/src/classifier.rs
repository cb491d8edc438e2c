//! Decides, while tokens are still arriving, whether an assistant answer is
//! prose or a structured analysis object, and parses the latter leniently.

use esg_shared::{AnalysisPayload, ANALYSIS_FORMAT};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::ClientError;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap();
    static ref OPENING_FENCE: Regex = Regex::new(r"^```(?:json)?\s*").unwrap();
}

/// Cheap prefix check, re-run on every delta.
pub fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') || trimmed.starts_with("```")
}

/// Accumulation state of one in-flight assistant message.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    visible: String,
    structured: bool,
    received: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.received = true;
        self.buffer.push_str(delta);

        if looks_structured(&self.buffer) {
            // Structured answers are re-parsed whole on every render.
            self.structured = true;
            self.visible = self.buffer.trim().to_string();
        } else {
            self.visible.push_str(delta);
        }
    }

    /// Text the message should currently hold.
    pub fn content(&self) -> &str {
        &self.visible
    }

    pub fn is_structured(&self) -> bool {
        self.structured
    }

    pub fn finish(self) -> Result<String, ClientError> {
        if !self.received {
            return Err(ClientError::EmptyResponse);
        }
        Ok(self.visible)
    }
}

/// Best-effort parse of a possibly incomplete analysis object.
///
/// Returns `None` for anything that is not (yet) an object tagged
/// `"format": "analysis"`; it never fails loudly.
pub fn parse_analysis(content: &str) -> Option<AnalysisPayload> {
    let text = strip_code_fence(content.trim());
    if !text.starts_with('{') {
        return None;
    }

    let truncated = truncate_to_last_value(text);
    let parsed = truncated
        .as_deref()
        .and_then(|t| serde_json::from_str::<Value>(t).ok())
        .or_else(|| serde_json::from_str::<Value>(text).ok())
        .or_else(|| close_open_structures(text).and_then(|t| serde_json::from_str(&t).ok()))?;

    analysis_from_value(&parsed)
}

fn analysis_from_value(value: &Value) -> Option<AnalysisPayload> {
    if value.get("format").and_then(Value::as_str) != Some(ANALYSIS_FORMAT) {
        return None;
    }
    let list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    Some(AnalysisPayload {
        positives: list("positives"),
        negatives: list("negatives"),
        summary: value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Inner text of a fenced block, or the text after an unclosed leading fence.
pub fn strip_code_fence(text: &str) -> &str {
    if let Some(inner) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    match OPENING_FENCE.find(text) {
        Some(fence) => text[fence.end()..].trim(),
        None => text,
    }
}

/// Cut an unterminated object after its rightmost `}`, `]` or `"` and close it.
///
/// Returns `None` when the text is already terminated or offers no cut point.
pub fn truncate_to_last_value(text: &str) -> Option<String> {
    if !text.starts_with('{') || text.ends_with('}') {
        return None;
    }
    let last = [text.rfind('}'), text.rfind(']'), text.rfind('"')]
        .into_iter()
        .flatten()
        .max()
        .filter(|&pos| pos > 0)?;

    let mut candidate = text[..=last].to_string();
    if !candidate.ends_with('}') {
        candidate.push('}');
    }
    Some(candidate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    /// Reading or awaiting a key, or its colon.
    Key,
    /// Colon seen, value not started.
    Pending,
    Value,
}

/// One open object or array while scanning.
#[derive(Debug)]
struct Frame {
    closer: char,
    /// Byte offset the text can be cut back to if the last member is unfinished.
    cut: usize,
    member: Member,
}

fn start_value(stack: &mut [Frame]) {
    if let Some(frame) = stack.last_mut() {
        if frame.member == Member::Pending {
            frame.member = Member::Value;
        }
    }
}

/// Close an open string, drop an unfinished key and close every open array
/// and object, so `{"positives":["Cuts co` and `{"positives":["a"],"neg`
/// both become parseable.
fn close_open_structures(text: &str) -> Option<String> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                start_value(&mut stack);
                in_string = true;
            }
            '{' | '[' => {
                start_value(&mut stack);
                let (closer, member) = if c == '{' {
                    ('}', Member::Key)
                } else {
                    (']', Member::Value)
                };
                stack.push(Frame {
                    closer,
                    cut: idx + 1,
                    member,
                });
            }
            '}' | ']' => {
                if stack.pop().map(|f| f.closer) != Some(c) {
                    return None;
                }
            }
            ',' => {
                if let Some(frame) = stack.last_mut().filter(|f| f.closer == '}') {
                    frame.cut = idx;
                    frame.member = Member::Key;
                }
            }
            ':' => {
                if let Some(frame) = stack.last_mut().filter(|f| f.closer == '}') {
                    frame.member = Member::Pending;
                }
            }
            c if c.is_whitespace() => {}
            _ => start_value(&mut stack),
        }
    }

    let mut repaired = text.to_string();
    match stack.last() {
        Some(frame) if frame.closer == '}' && frame.member != Member::Value => {
            repaired.truncate(frame.cut);
            in_string = false;
        }
        _ => {
            if escaped {
                repaired.pop();
            }
            if in_string {
                repaired.push('"');
            }
        }
    }
    let trimmed_len = repaired.trim_end().trim_end_matches(',').len();
    repaired.truncate(trimmed_len);
    while let Some(frame) = stack.pop() {
        repaired.push(frame.closer);
    }
    Some(repaired)
}
