use kernel_core::translator::{acknowledge, ReplyContext};
use kernel_core::{Header, Request, SessionRequest};
use kernel_protocol::{encode_interrupt, encode_outbound, encode_request, ClientFrame, CodecError, FrameDecoder};
use serde_json::{json, Value};

fn request_of(frame: ClientFrame) -> SessionRequest {
    match frame {
        ClientFrame::Request(req) => req,
        other => panic!("expected a request frame, got {:?}", other),
    }
}

#[test]
fn execute_without_counter_is_numbered_per_decoder() {
    let mut decoder = FrameDecoder::new();
    let line = r#"{"header":{"msg_id":"a"},"session":"s1","msg_type":"execute_request","content":{"code":"1 + 1"}}"#;

    let first = request_of(decoder.decode(line).unwrap());
    let second = request_of(decoder.decode(line).unwrap());

    assert_eq!(first.request, Request::execute(1, "1 + 1"));
    assert_eq!(second.request, Request::execute(2, "1 + 1"));
    assert_eq!(first.session, "s1");
    assert_eq!(first.header.msg_id(), Some("a"));

    // A fresh connection starts over.
    let mut other = FrameDecoder::new();
    assert_eq!(request_of(other.decode(line).unwrap()).request, Request::execute(1, "1 + 1"));
}

#[test]
fn explicit_counter_is_kept_and_continued() {
    let mut decoder = FrameDecoder::new();
    let explicit = r#"{"session":"s","msg_type":"execute_request","content":{"code":"x","execution_count":41}}"#;
    let implicit = r#"{"session":"s","msg_type":"execute_request","content":{"code":"y"}}"#;

    assert_eq!(request_of(decoder.decode(explicit).unwrap()).request, Request::execute(41, "x"));
    assert_eq!(request_of(decoder.decode(implicit).unwrap()).request, Request::execute(42, "y"));
    assert_eq!(decoder.execution_count(), 42);
}

#[test]
fn completion_and_object_info_frames() {
    let mut decoder = FrameDecoder::new();

    let complete = r#"{"session":"s","msg_type":"complete_request","content":{"line":"List.fo","cursor_pos":7}}"#;
    assert_eq!(
        request_of(decoder.decode(complete).unwrap()).request,
        Request::completion("List.fo", 7)
    );

    // Cursor defaults to the end of the line.
    let no_cursor = r#"{"session":"s","msg_type":"complete_request","content":{"text":"pri"}}"#;
    assert_eq!(
        request_of(decoder.decode(no_cursor).unwrap()).request,
        Request::completion("pri", 3)
    );

    let info = r#"{"session":"s","msg_type":"object_info_request","content":{"oname":"println"}}"#;
    assert_eq!(
        request_of(decoder.decode(info).unwrap()).request,
        Request::object_info("println")
    );
}

#[test]
fn session_falls_back_to_header() {
    let mut decoder = FrameDecoder::new();
    let line = r#"{"header":{"session":"from-header"},"msg_type":"object_info_request","content":{"oname":"x"}}"#;
    assert_eq!(request_of(decoder.decode(line).unwrap()).session, "from-header");

    let missing = r#"{"msg_type":"object_info_request","content":{"oname":"x"}}"#;
    assert!(matches!(decoder.decode(missing), Err(CodecError::InvalidField("session"))));
}

#[test]
fn interrupt_frame() {
    let mut decoder = FrameDecoder::new();
    let line = r#"{"msg_type":"interrupt_request"}"#;
    assert_eq!(decoder.decode(line).unwrap(), ClientFrame::Interrupt);
}

#[test]
fn bad_frames_are_rejected() {
    let mut decoder = FrameDecoder::new();

    assert!(matches!(decoder.decode(""), Err(CodecError::InvalidLength(0))));
    assert!(matches!(decoder.decode("not json"), Err(CodecError::Malformed(_))));
    assert!(matches!(
        decoder.decode(r#"{"session":"s","msg_type":"kernel_info_request"}"#),
        Err(CodecError::UnsupportedType(t)) if t == "kernel_info_request"
    ));
    assert!(matches!(
        decoder.decode(r#"{"session":"s","msg_type":"execute_request","content":{}}"#),
        Err(CodecError::InvalidField("code"))
    ));
    assert!(matches!(
        decoder.decode(r#"{"session":"s","msg_type":"execute_request","content":{"code":"x","execution_count":"one"}}"#),
        Err(CodecError::InvalidField("execution_count"))
    ));

    // Rejected frames do not advance the counter.
    assert_eq!(decoder.execution_count(), 0);
}

#[test]
fn outbound_frame_carries_parent_header_and_channel() {
    let ctx = ReplyContext::new(Header::new(json!({ "msg_id": "req-9" })), "sess");
    let msgs = acknowledge(&ctx, &Request::execute(3, "print(1)"));

    let line = encode_outbound(&msgs[1]).unwrap();
    assert!(!line.contains('\n'));

    let frame: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(frame["msg_type"], "pyin");
    assert_eq!(frame["channel"], "iopub");
    assert_eq!(frame["parent_header"], json!({ "msg_id": "req-9" }));
    assert_eq!(frame["header"]["session"], "sess");
    assert_eq!(frame["header"]["username"], "kernel");
    assert_eq!(frame["header"]["msg_type"], "pyin");
    assert!(frame["header"]["msg_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(frame["content"], json!({ "execution_count": 3, "code": "print(1)" }));
}

#[test]
fn viewer_side_encoding_is_accepted_by_decoder() {
    let req = SessionRequest::new(Header::new(json!({ "msg_id": "x" })), "s", Request::completion("ab", 2));
    let mut decoder = FrameDecoder::new();
    assert_eq!(request_of(decoder.decode(&encode_request(&req).unwrap()).unwrap()), req);

    let interrupt = encode_interrupt(&Header::default(), "s").unwrap();
    assert_eq!(decoder.decode(&interrupt).unwrap(), ClientFrame::Interrupt);
}
