//! Incremental `text/event-stream` parser shared by the SSE and streamable transports.

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Buffers raw bytes so a multi-byte character split across chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseEventParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: String,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the stream and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_ref(), ""),
            };

            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => {
                    self.data.push_str(value);
                    self.data.push('\n');
                }
                _ => {}
            }
        }

        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let mut rest = std::mem::take(&mut self.buffer);
            rest.push(b'\n');
            let mut events = self.push(&rest);
            if let Some(event) = events.pop() {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        data.pop();
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_then_message() {
        let mut parser = SseEventParser::new();
        let events = parser.push(
            b"event: endpoint\ndata: /messages?session_id=abc\n\ndata: {\"id\":1}\n\n",
        );
        assert_eq!(
            events,
            vec![
                SseEvent {
                    event: "endpoint".to_string(),
                    data: "/messages?session_id=abc".to_string()
                },
                SseEvent {
                    event: "message".to_string(),
                    data: "{\"id\":1}".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut parser = SseEventParser::new();
        assert!(parser.push(b"event: mess").is_empty());
        assert!(parser.push(b"age\r\ndata: a\r\n").is_empty());
        let events = parser.push(b"data: b\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_comments_ignored_and_finish_flushes() {
        let mut parser = SseEventParser::new();
        assert!(parser.push(b": keepalive\n\n").is_empty());
        assert!(parser.push(b"data: tail").is_empty());
        let event = parser.finish().unwrap();
        assert_eq!(event.data, "tail");
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let payload = "data: {\"text\":\"你好\"}\n\n".as_bytes();
        // Cut inside the three bytes of the first character
        let cut = payload.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut parser = SseEventParser::new();
        assert!(parser.push(&payload[..cut]).is_empty());
        let events = parser.push(&payload[cut..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{\"text\":\"你好\"}");
        assert!(!events[0].data.contains('\u{FFFD}'));
    }
}
