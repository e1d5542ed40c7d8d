//! Incremental Server-Sent Events parsing
//!
//! Both HTTP transports receive SSE bodies: the streamable transport when a
//! POST answers with `text/event-stream`, and the legacy transport on its
//! long-lived GET channel. Events are separated by a blank line; `data:`
//! lines accumulate, `event:` names the event type.

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Buffering SSE parser fed with raw body chunks
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain any completed events
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(boundary) = self.find_boundary() {
            let (block_end, skip) = boundary;
            let block: String = self.buffer[..block_end].to_string();
            self.buffer.drain(..block_end + skip);

            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    fn find_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.find("\n\n").map(|i| (i, 2));
        let crlf = self.buffer.find("\r\n\r\n").map(|i| (i, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
            (some, None) | (None, some) => some,
        }
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Comments (`:`), `id:` and `retry:` fields carry nothing we use.
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}
