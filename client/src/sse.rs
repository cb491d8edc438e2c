//! Decoder for OpenAI-style `text/event-stream` bodies.
//!
//! Blocks are separated by a blank line, every `data:` line carries either a
//! JSON chunk or the `[DONE]` sentinel. Anything else is ignored.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Delta(String),
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one network chunk; returns the frames completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = find_block_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.decode_block(&block[..end], &mut frames);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        frames
    }

    /// Flush a trailing block that was never terminated by a blank line.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let block = std::mem::take(&mut self.buffer);
            self.decode_block(&block, &mut frames);
        }
        frames
    }

    fn decode_block(&mut self, block: &[u8], frames: &mut Vec<SseFrame>) {
        let text = String::from_utf8_lossy(block);
        for raw in text.split('\n') {
            let line = raw.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == "[DONE]" {
                self.done = true;
                frames.push(SseFrame::Done);
                return;
            }
            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(chunk) => {
                    if let Some(text) = chunk.text() {
                        frames.push(SseFrame::Delta(text));
                    }
                }
                Err(e) => tracing::debug!("Error parsing stream chunk: {}", e),
            }
        }
    }
}

fn find_block_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChunkChoice {
    delta: Option<ChunkBody>,
    message: Option<ChunkBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChunkBody {
    content: Option<Fragment>,
}

/// Content arrives either as one string or as a list of pieces.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Fragment {
    Text(String),
    Pieces(Vec<Value>),
    Other(Value),
}

impl Fragment {
    pub fn into_text(self) -> String {
        match self {
            Fragment::Text(text) => text,
            Fragment::Pieces(pieces) => pieces
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect(),
            Fragment::Other(value) => {
                tracing::debug!("Ignoring content of unexpected shape: {}", value);
                String::new()
            }
        }
    }
}

impl StreamChunk {
    /// First choice only; a non-empty delta wins over a full message.
    pub fn text(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        let pick = |body: Option<ChunkBody>| {
            body.and_then(|b| b.content)
                .map(Fragment::into_text)
                .filter(|t| !t.is_empty())
        };
        pick(choice.delta).or_else(|| pick(choice.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: &str) -> Option<String> {
        serde_json::from_str::<StreamChunk>(json).unwrap().text()
    }

    #[test]
    fn delta_string() {
        assert_eq!(
            chunk(r#"{"choices":[{"delta":{"content":"Scope"}}]}"#),
            Some("Scope".to_string())
        );
    }

    #[test]
    fn delta_pieces_are_joined() {
        assert_eq!(
            chunk(r#"{"choices":[{"delta":{"content":["Sco","pe ",1]}}]}"#),
            Some("Scope 1".to_string())
        );
    }

    #[test]
    fn message_used_when_delta_empty() {
        assert_eq!(
            chunk(r#"{"choices":[{"delta":{"content":""},"message":{"content":"full"}}]}"#),
            Some("full".to_string())
        );
        assert_eq!(
            chunk(r#"{"choices":[{"message":{"content":["a","b"]}}]}"#),
            Some("ab".to_string())
        );
    }

    #[test]
    fn nothing_usable() {
        assert_eq!(chunk(r#"{"choices":[]}"#), None);
        assert_eq!(chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(chunk(r#"{"choices":[{"delta":{"content":null}}]}"#), None);
        assert_eq!(chunk(r#"{"id":"x"}"#), None);
        assert_eq!(chunk(r#"{"choices":[{"delta":{"content":{"odd":true}}}]}"#), None);
    }

    #[test]
    fn blocks_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel")
            .is_empty());
        assert_eq!(
            decoder.push(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n"),
            vec![SseFrame::Delta("Hello".to_string())]
        );
        assert_eq!(
            decoder.push(b"\n: keep-alive\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"),
            vec![SseFrame::Delta("!".to_string()), SseFrame::Done]
        );
        assert!(decoder.is_done());
        assert!(decoder.push(b"data: {}\n\n").is_empty());
    }

    #[test]
    fn multibyte_characters_survive_chunking() {
        let mut decoder = SseDecoder::new();
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"CO₂\"}}]}\n\n".as_bytes();
        let split = event.iter().position(|&b| b == 0xE2).unwrap() + 1;
        assert!(decoder.push(&event[..split]).is_empty());
        assert_eq!(
            decoder.push(&event[split..]),
            vec![SseFrame::Delta("CO₂".to_string())]
        );
    }

    #[test]
    fn invalid_json_and_foreign_lines_are_skipped() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(
            b"event: ping\nid: 3\ndata: {broken\n\ndata:\n\ndata:{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        );
        assert_eq!(frames, vec![SseFrame::Delta("ok".to_string())]);
    }

    #[test]
    fn finish_flushes_unterminated_block() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .is_empty());
        assert_eq!(decoder.finish(), vec![SseFrame::Delta("tail".to_string())]);
    }
}
