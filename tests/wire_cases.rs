//! Граничные случаи конверта, кадра и кодека.

use rstest::rstest;
use spacestore::{
    codec::{decode, decode_as, ValueKind},
    protocol::{check_frame_len, recover_request_id, Message, MessageKind, MAX_FRAME_LEN},
    StatusCode,
};
use spacestore_error::{CodecError, ErrorExt, WireError};

#[rstest]
#[case::empty(&[], "too short")]
#[case::short_header(&[0x7E, 1, 0, 1], "too short")]
#[case::bad_magic(&[0x7F, 1, 0, 1, 0, 0, 0, 1, 0], "magic")]
#[case::bad_version(&[0x7E, 2, 0, 1, 0, 0, 0, 1, 0], "version")]
#[case::bad_kind(&[0x7E, 1, 0, 9, 0, 0, 0, 1, 0], "kind")]
#[case::zero_payload(&[0x7E, 1, 0, 1, 0, 0, 0, 0], "empty")]
#[case::truncated_payload(&[0x7E, 1, 0, 1, 0, 0, 0, 5, 1, 2], "too short")]
fn test_envelope_errors(
    #[case] buf: &[u8],
    #[case] expected: &str,
) {
    let err = Message::decode(buf).unwrap_err();
    let matched = match err {
        WireError::PayloadTooShort { .. } => expected == "too short",
        WireError::MagicInvalid { found } => expected == "magic" && found == 0x7F,
        WireError::ProtocolVersionInvalid { found } => expected == "version" && found == 2,
        WireError::UnknownMessageKind { found } => expected == "kind" && found == 9,
        WireError::EmptyPayload => expected == "empty",
        _ => false,
    };
    assert!(matched, "unexpected error {err:?} for case {expected}");
    assert_eq!(err.status_code(), StatusCode::InvalidMessage);
}

#[rstest]
#[case(MessageKind::Command, 1)]
#[case(MessageKind::Response, 2)]
fn test_envelope_kinds(
    #[case] kind: MessageKind,
    #[case] tag: u8,
) {
    let buf = [0x7E, 1, 0, tag, 0, 0, 0, 2, 0xAA, 0xBB, 0xCC];
    let m = Message::decode(&buf).unwrap();
    assert_eq!(m.kind, kind);
    // байты после нагрузки игнорируются
    assert_eq!(m.payload, &[0xAA, 0xBB]);
}

#[rstest]
#[case(0, false)]
#[case(1, true)]
#[case(MAX_FRAME_LEN, true)]
#[case(MAX_FRAME_LEN + 1, false)]
fn test_frame_length_bounds(
    #[case] len: u32,
    #[case] ok: bool,
) {
    assert_eq!(check_frame_len(len).is_ok(), ok);
}

#[rstest]
#[case::full(&[0x7E, 1, 0, 1, 0, 0, 0, 0, 0, 0, 1, 2], 258)]
#[case::short(&[0x7E, 1, 0, 1, 0, 0, 0, 0, 0, 0], 0)]
fn test_request_id_recovery(
    #[case] frame: &[u8],
    #[case] id: u32,
) {
    assert_eq!(recover_request_id(frame), id);
}

#[rstest]
#[case::bool(ValueKind::Bool, &[1])]
#[case::uint16(ValueKind::Uint16, &[3, 0])]
#[case::uint32(ValueKind::Uint32, &[4, 0, 0])]
#[case::int64(ValueKind::Int64, &[8, 0, 0, 0, 0, 0, 0, 0])]
#[case::float64(ValueKind::Float64, &[10, 0])]
#[case::string_len(ValueKind::String, &[12, 0, 0])]
#[case::string_body(ValueKind::String, &[12, 0, 0, 0, 5, b'a'])]
#[case::list_header(ValueKind::List, &[13, 7, 0])]
fn test_short_payload(
    #[case] kind: ValueKind,
    #[case] buf: &[u8],
) {
    assert!(matches!(
        decode_as(buf, kind),
        Err(CodecError::PayloadTooShort { .. })
    ));
}

#[rstest]
#[case::int_for_string(ValueKind::String, &[7, 0, 0, 0, 1])]
#[case::bool_for_map(ValueKind::Map, &[1, 1])]
#[case::unknown_tag(ValueKind::Bool, &[200])]
fn test_kind_mismatch(
    #[case] kind: ValueKind,
    #[case] buf: &[u8],
) {
    assert!(matches!(
        decode_as(buf, kind),
        Err(CodecError::InvalidType { .. })
    ));
}

/// Список, объявленный как Int32, но содержащий строку.
#[test]
fn test_mixed_list_rejected() {
    let mut body = Vec::new();
    body.extend_from_slice(&[7, 0, 0, 0, 1]);
    body.extend_from_slice(&[12, 0, 0, 0, 1, b'x']);

    let mut buf = vec![13, 7, 0, 2];
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);

    let err = decode(&buf).unwrap_err();
    assert!(matches!(
        err,
        CodecError::InvalidType { .. } | CodecError::MixedKinds { .. }
    ));
}

#[test]
fn test_unknown_top_level_tag() {
    let err = decode(&[99]).unwrap_err();
    assert!(matches!(err, CodecError::InvalidType { expected: None, found: 99 }));
}
