//! Server-Sent Events (SSE) decoding for the agent stream

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Buffers incoming bytes and emits complete SSE events.
///
/// Unlike a data-only decoder this keeps the `event:` name, which the agent
/// service uses to tag every payload. Handles events split across chunks,
/// several events in one chunk, CRLF line endings and a final event without a
/// trailing blank line (via [`SseDecoder::finish`]).
///
/// # Example
/// ```
/// use geochat_cli::chat::streaming::SseDecoder;
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"event:conversation.message.delta\ndata:{\"con").is_empty());
///
/// let frames = decoder.push(b"tent\":\"hi\"}\n\n");
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].event.as_deref(), Some("conversation.message.delta"));
/// assert_eq!(frames[0].data, "{\"content\":\"hi\"}");
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push incoming bytes and return every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        // Split on raw bytes so multi-byte characters cut across chunks stay intact
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = String::from_utf8_lossy(&rest).into_owned();

        let mut frames = Vec::new();
        for line in rest.lines() {
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        if let Some(frame) = self.dispatch() {
            frames.push(frame);
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_single_complete_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event:done\ndata:\"[DONE]\"\n\n");
        assert_eq!(frames, vec![frame("done", "\"[DONE]\"")]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event:a\ndata:{\"x\":1}\n\nevent:b\ndata: {\"y\":2}\n\n");
        assert_eq!(frames, vec![frame("a", "{\"x\":1}"), frame("b", "{\"y\":2}")]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event:conversation.mes").is_empty());
        assert!(decoder.push(b"sage.delta\ndata:{\"content\":\"hel").is_empty());
        let frames = decoder.push(b"lo\"}\n\n");
        assert_eq!(
            frames,
            vec![frame("conversation.message.delta", "{\"content\":\"hello\"}")]
        );
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data:你好\n\n".as_bytes();
        // Cut inside the first character
        assert!(decoder.push(&bytes[..6]).is_empty());
        let frames = decoder.push(&bytes[6..]);
        assert_eq!(frames[0].data, "你好");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"event:a\r\ndata:1\r\n\r\n");
        assert_eq!(frames, vec![frame("a", "1")]);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\nid: 7\nretry: 100\ndata:x\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: None,
                data: "x".to_string()
            }]
        );
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data:a\ndata:b\n\n");
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn test_final_event_without_blank_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event:done\ndata:\"[DONE]\"").is_empty());
        assert_eq!(decoder.finish(), vec![frame("done", "\"[DONE]\"")]);
        // Second finish returns nothing
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_event_without_data_is_dropped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event:ping\n\n").is_empty());
        // The stale event name must not leak into the next frame
        let frames = decoder.push(b"data:x\n\n");
        assert_eq!(frames[0].event, None);
    }
}
