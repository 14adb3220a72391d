use inbox_stream::api::codec::{decode, Signal};
use inbox_stream::api::stream::{SseFrame, SseParser};
use inbox_stream::state::StepKind;

#[test]
fn test_fragmented_events() {
    let mut parser = SseParser::new();

    let frames = parser.process(b"event: status\ndata: {\"mess");
    assert!(frames.is_empty());

    let frames = parser.process(b"age\":\"searching\"}\n\nevent: thinking\n");
    assert_eq!(frames, vec![SseFrame::new("status", r#"{"message":"searching"}"#)]);

    let frames = parser.process(b"data: {\"message\":\"hmm\"}\n\n");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event, "thinking");
}

#[test]
fn test_crlf_and_comment_lines() {
    let mut parser = SseParser::new();
    let frames = parser.process(b": keep-alive\r\n\r\nevent: done\r\ndata: {\"answer\":\"ok\"}\r\n\r\n");
    assert_eq!(frames, vec![SseFrame::new("done", r#"{"answer":"ok"}"#)]);
}

#[test]
fn test_malformed_payload_is_a_decode_error_not_a_parser_error() {
    let mut parser = SseParser::new();
    let frames = parser.process(b"event: status\ndata: {invalid json}\n\nevent: status\ndata: {\"message\":\"next\"}\n\n");
    assert_eq!(frames.len(), 2);

    assert!(decode(&frames[0]).is_err());
    assert_eq!(
        decode(&frames[1]).unwrap(),
        Some(Signal::Step(StepKind::Status {
            message: "next".to_string()
        }))
    );
}

#[test]
fn test_unknown_event_is_rejected_by_codec() {
    let frame = SseFrame::new("heartbeat_v2", "{}");
    assert!(decode(&frame).is_err());
}

#[test]
fn test_non_ascii_result_fed_byte_by_byte() {
    let raw = "event: tool_result\ndata: {\"tool\":\"read_email\",\"result\":\"Réunion à 14h ✓\"}\n\n";
    let mut parser = SseParser::new();
    let mut frames = Vec::new();
    for byte in raw.as_bytes() {
        frames.extend(parser.process(std::slice::from_ref(byte)));
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(
        decode(&frames[0]).unwrap(),
        Some(Signal::Step(StepKind::ToolResult {
            tool: "read_email".to_string(),
            result: "Réunion à 14h ✓".to_string(),
        }))
    );
}
