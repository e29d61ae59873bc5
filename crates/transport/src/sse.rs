//! Server-Sent Events framing.
//!
//! `SseFrameParser` is pull-based: push raw chunks as they arrive, then pull
//! complete frames out with [`SseFrameParser::next_frame`]. The same parser
//! handles a whole buffered body (one push, then drain).

use serde_json::Value;
use toolrelay_core::error::TransportError;

/// One `event:` / `data:` block terminated by a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SseFrame {
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(self.data.trim()).ok()
    }
}

#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: String,
    /// A chunk ended in `\r`; its `\n` may start the next chunk
    pending_cr: bool,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Only the new text is scanned for `\r\n`.
    pub fn push(&mut self, chunk: &str) {
        let mut chunk = chunk;
        if std::mem::take(&mut self.pending_cr) {
            match chunk.strip_prefix('\n') {
                Some(rest) => {
                    self.buffer.push('\n');
                    chunk = rest;
                }
                None => self.buffer.push('\r'),
            }
        }
        if let Some(head) = chunk.strip_suffix('\r') {
            self.pending_cr = true;
            chunk = head;
        }
        if chunk.contains('\r') {
            self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(chunk);
        }
    }

    /// The next complete frame, if one is buffered. Frames with no data
    /// (comments, keep-alives) are skipped.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            let end = self.buffer.find("\n\n")?;
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&block) {
                return Some(frame);
            }
        }
    }

    /// Flush whatever remains once the stream has ended without a final
    /// blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.pending_cr = false;
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&rest)
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => frame.event = Some(value.to_string()),
            "id" => frame.id = Some(value.to_string()),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

/// Whether a JSON value is a JSON-RPC response envelope.
pub fn is_rpc_envelope(value: &Value) -> bool {
    value.get("result").is_some() || value.get("error").is_some()
}

/// Tracks the last JSON-RPC envelope seen across a stream of frames.
#[derive(Debug, Default)]
pub struct EnvelopeSelector {
    last: Option<Value>,
}

impl EnvelopeSelector {
    pub fn observe(&mut self, frame: &SseFrame) {
        if let Some(value) = frame.json().filter(is_rpc_envelope) {
            self.last = Some(value);
        }
    }

    pub fn finish(self) -> Result<Value, TransportError> {
        self.last.ok_or_else(|| {
            TransportError::MalformedResponse("event stream carried no JSON-RPC envelope".into())
        })
    }
}
