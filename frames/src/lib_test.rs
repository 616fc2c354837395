use super::*;

fn sample_message() -> Frame {
    Frame::message(
        "/topic/lesson/42/board",
        "sub-1",
        "msg-7",
        r#"[{"id":1,"type":"rect"}]"#,
    )
}

#[test]
fn command_names_match_wire_text() {
    assert_eq!(Command::Connect.as_str(), "CONNECT");
    assert_eq!(Command::Unsubscribe.as_str(), "UNSUBSCRIBE");
    assert_eq!(Command::Message.to_string(), "MESSAGE");
}

#[test]
fn stomp_alias_decodes_as_connect() {
    let frame = decode_frame("STOMP\naccept-version:1.2\n\n\0").expect("decode");
    assert_eq!(frame.command, Command::Connect);
}

#[test]
fn encode_decode_round_trip_preserves_message() {
    let frame = sample_message();
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode should succeed");
    assert_eq!(decoded.command, Command::Message);
    assert_eq!(decoded.header(SUBSCRIPTION), Some("sub-1"));
    assert_eq!(decoded.body, frame.body);
}

#[test]
fn encode_appends_content_length_for_bodies() {
    let wire = encode_frame(&Frame::send("/app/lesson/1/board", "[]", None));
    assert!(wire.contains("content-length:2\n"));
    assert!(wire.ends_with("\n[]\0"));
}

#[test]
fn encode_omits_content_length_for_empty_body() {
    let wire = encode_frame(&Frame::disconnect());
    assert_eq!(wire, "DISCONNECT\n\n\0");
}

#[test]
fn connect_carries_bearer_and_version_unescaped() {
    let wire = encode_frame(&Frame::connect("board.example:8080", Some("Bearer tok")));
    assert!(wire.starts_with("CONNECT\n"));
    assert!(wire.contains("accept-version:1.2\n"));
    assert!(wire.contains("host:board.example:8080\n"));
    assert!(wire.contains("Authorization:Bearer tok\n"));
}

#[test]
fn connect_without_credential_has_no_authorization_header() {
    let frame = Frame::connect("localhost", None);
    assert!(frame.header(AUTHORIZATION).is_none());
}

#[test]
fn header_values_are_escaped_outside_connect() {
    let frame = Frame::new(Command::Send).with_header("destination", "/a:b\nc\\d");
    let wire = encode_frame(&frame);
    assert!(wire.contains("destination:/a\\cb\\nc\\\\d\n"));

    let decoded = decode_frame(&wire).expect("decode");
    assert_eq!(decoded.header(DESTINATION), Some("/a:b\nc\\d"));
}

#[test]
fn decode_rejects_unknown_escape() {
    let err = decode_frame("SEND\ndestination:/a\\tb\n\n\0").expect_err("escape should fail");
    assert!(matches!(err, CodecError::InvalidEscape(_)));
}

#[test]
fn first_repeated_header_wins() {
    let frame = decode_frame("MESSAGE\nfoo:first\nfoo:second\n\n\0").expect("decode");
    assert_eq!(frame.header("foo"), Some("first"));
    assert_eq!(frame.headers.len(), 2);
}

#[test]
fn decode_accepts_crlf_and_leading_heartbeats() {
    let frame = decode_frame("\r\n\nCONNECTED\r\nversion:1.2\r\n\r\n\0\n").expect("decode");
    assert_eq!(frame.command, Command::Connected);
    assert_eq!(frame.header(VERSION), Some("1.2"));
}

#[test]
fn decode_honors_content_length_with_embedded_nul() {
    let frame = decode_frame("MESSAGE\ncontent-length:3\n\na\0b\0").expect("decode");
    assert_eq!(frame.body, "a\0b");
}

#[test]
fn decode_rejects_content_length_past_input() {
    let err = decode_frame("MESSAGE\ncontent-length:99\n\nabc\0").expect_err("length should fail");
    assert!(matches!(err, CodecError::InvalidContentLength(_)));
}

#[test]
fn decode_rejects_unparsable_content_length() {
    let err = decode_frame("MESSAGE\ncontent-length:abc\n\nabc\0").expect_err("length should fail");
    assert!(matches!(err, CodecError::InvalidContentLength(_)));
}

#[test]
fn decode_rejects_missing_terminator() {
    let err = decode_frame("MESSAGE\n\nbody").expect_err("terminator should be required");
    assert_eq!(err, CodecError::MissingNull);
}

#[test]
fn decode_rejects_truncated_headers() {
    let err = decode_frame("MESSAGE\ndestination:/x").expect_err("headers should be truncated");
    assert_eq!(err, CodecError::Truncated);
}

#[test]
fn decode_rejects_unknown_command() {
    let err = decode_frame("HELLO\n\n\0").expect_err("command should fail");
    assert_eq!(err, CodecError::UnknownCommand("HELLO".to_owned()));
}

#[test]
fn decode_rejects_header_without_separator() {
    let err = decode_frame("SEND\nnocolon\n\n\0").expect_err("header should fail");
    assert!(matches!(err, CodecError::MalformedHeader(line) if line == "nocolon"));
}

#[test]
fn decode_rejects_trailing_garbage() {
    let err = decode_frame("RECEIPT\nreceipt-id:1\n\n\0junk").expect_err("trailer should fail");
    assert_eq!(err, CodecError::TrailingData);
}

#[test]
fn decode_rejects_empty_input() {
    assert_eq!(decode_frame("\n\n").expect_err("empty"), CodecError::Empty);
    assert_eq!(decode_frame("").expect_err("empty"), CodecError::Empty);
}

#[test]
fn heartbeat_detection_only_matches_eol_padding() {
    assert!(is_heartbeat("\n"));
    assert!(is_heartbeat("\r\n"));
    assert!(!is_heartbeat(""));
    assert!(!is_heartbeat("CONNECTED\n\n\0"));
}

#[test]
fn error_builder_sets_message_header_and_detail() {
    let frame = Frame::error("auth rejected", "token expired");
    assert_eq!(frame.command, Command::Error);
    assert_eq!(frame.header(MESSAGE), Some("auth rejected"));
    assert_eq!(frame.body, "token expired");
}

#[test]
fn frame_serializes_command_uppercase() {
    let json = serde_json::to_value(Frame::unsubscribe("sub-3")).expect("serialize");
    assert_eq!(json["command"], "UNSUBSCRIBE");
    assert_eq!(json["headers"][0][1], "sub-3");
}
