/// One server-sent event: its `event:` name and joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

const DEFAULT_EVENT: &str = "message";

/// Buffers raw bytes so a UTF-8 sequence split across chunks survives until
/// its frame is complete.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns every frame completed by it.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        if self.buffer.windows(2).any(|pair| pair == b"\r\n") {
            self.buffer = strip_crlf(&self.buffer);
        }

        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(end) = find_frame_end(&self.buffer[start..]) {
            let event_end = start + end + 2;
            let text = String::from_utf8_lossy(&self.buffer[start..event_end]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
            start = event_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Unterminated trailing text left in the buffer.
    pub fn flush(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned()
    }
}

fn find_frame_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\n\n")
}

/// Drops the `\r` of every `\r\n`; a trailing lone `\r` waits for the next chunk.
fn strip_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for (index, &byte) in bytes.iter().enumerate() {
        if byte == b'\r' && bytes.get(index + 1) == Some(&b'\n') {
            continue;
        }
        out.push(byte);
    }
    out
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event_type = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() && event_type.is_none() {
        return None;
    }

    Some(SseFrame {
        event: event_type
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragmented_frames_are_buffered() {
        let mut parser = SseParser::new();
        assert!(parser.process(b"event: status\ndata: {\"mess").is_empty());

        let frames = parser.process(b"age\":\"searching\"}\n\nevent: done\n");
        assert_eq!(
            frames,
            vec![SseFrame::new("status", "{\"message\":\"searching\"}")]
        );
        assert_eq!(parser.flush(), "event: done\n");
    }

    #[test]
    fn test_crlf_comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let frames = parser.process(b": keepalive\r\n\r\nevent: error\r\ndata: {\"error\":\r\ndata: \"boom\"}\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::new("error", "{\"error\":\n\"boom\"}")]);
    }

    #[test]
    fn test_missing_event_name_defaults_to_message() {
        let mut parser = SseParser::new();
        let frames = parser.process(b"data: {}\n\n");
        assert_eq!(frames, vec![SseFrame::new("message", "{}")]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let raw = "event: status\ndata: {\"message\":\"café\"}\n\n".as_bytes();
        let split = raw.iter().position(|&byte| byte == 0xC3).unwrap() + 1;

        let mut parser = SseParser::new();
        assert!(parser.process(&raw[..split]).is_empty());
        let frames = parser.process(&raw[split..]);
        assert_eq!(
            frames,
            vec![SseFrame::new("status", "{\"message\":\"café\"}")]
        );
        assert!(parser.flush().is_empty());
    }

    #[test]
    fn test_crlf_split_between_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.process(b"data: {}\r").is_empty());
        assert!(parser.process(b"\n\r").is_empty());
        let frames = parser.process(b"\nevent: done\r\n");
        assert_eq!(frames, vec![SseFrame::new("message", "{}")]);
        assert_eq!(parser.flush(), "event: done\n");
    }
}
