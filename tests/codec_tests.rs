use prost::Message;
use uuid::Uuid;

use pbft_core::{
    codec::{PROTOCOL_ID, decode_envelope, encode_envelope, unwrap, wrap},
    error::PbftError,
    message::PbftMessage,
    protos::pbft::v1::{Envelope, MessageType, PbftMsg, Request},
    utils::compute_request_digest,
};

const VIEW: u64 = 1;
const SEQUENCE: u64 = 7;

fn sample_request() -> Request {
    Request::new("set x=1", "bob", 1)
}

fn every_variant() -> Vec<PbftMessage> {
    let request = sample_request();
    let digest = compute_request_digest(&request);
    let sender = Uuid::new_v4();
    vec![
        PbftMessage::Request(request.clone()),
        PbftMessage::Preprepare {
            view: VIEW,
            sequence: SEQUENCE,
            request,
            sender,
        },
        PbftMessage::Prepare {
            view: VIEW,
            sequence: SEQUENCE,
            request_digest: digest.clone(),
            sender,
        },
        PbftMessage::Commit {
            view: VIEW,
            sequence: SEQUENCE,
            request_digest: digest,
            sender,
        },
    ]
}

fn envelope_for(msg: &PbftMsg) -> Envelope {
    Envelope {
        protocol_id: PROTOCOL_ID.to_string(),
        payload: msg.encode_to_vec(),
    }
}

#[test]
fn test_unwrap_inverts_wrap_for_every_variant() {
    for message in every_variant() {
        let envelope = wrap(&message);
        assert_eq!(envelope.protocol_id, "pbft");
        assert_eq!(unwrap(&envelope).expect("unwrap"), message);

        let bytes = encode_envelope(&envelope);
        let decoded = decode_envelope(&bytes).expect("decode envelope");
        assert_eq!(unwrap(&decoded).expect("unwrap decoded"), message);
    }
}

#[test]
fn test_type_tag_is_explicit_on_the_wire() {
    let variants = every_variant();
    let msg = PbftMsg::decode(wrap(&variants[2]).payload.as_slice()).expect("decode");
    assert_eq!(msg.r#type, MessageType::Prepare as i32);
    assert!(msg.request.is_none());

    // Same fields, different tag: the tag decides the variant.
    let as_commit = PbftMsg {
        r#type: MessageType::Commit as i32,
        ..msg
    };
    assert!(matches!(
        unwrap(&envelope_for(&as_commit)).expect("unwrap"),
        PbftMessage::Commit { .. }
    ));
}

#[test]
fn test_unknown_protocol_id_is_rejected() {
    let mut envelope = wrap(&every_variant()[0]);

    envelope.protocol_id = String::new();
    assert!(matches!(
        unwrap(&envelope),
        Err(PbftError::MalformedEnvelope(_))
    ));

    envelope.protocol_id = "raft".to_string();
    assert!(matches!(
        unwrap(&envelope),
        Err(PbftError::MalformedEnvelope(_))
    ));
}

#[test]
fn test_garbage_payload_is_rejected() {
    let envelope = Envelope {
        protocol_id: PROTOCOL_ID.to_string(),
        payload: vec![0xff, 0xff, 0xff],
    };
    assert!(matches!(
        unwrap(&envelope),
        Err(PbftError::MalformedEnvelope(_))
    ));
}

#[test]
fn test_unknown_message_type_is_unsupported() {
    for tag in [0, 42] {
        let msg = PbftMsg {
            r#type: tag,
            request: Some(sample_request()),
            ..Default::default()
        };
        let err = unwrap(&envelope_for(&msg)).unwrap_err();
        assert!(
            matches!(err, PbftError::UnsupportedMessageType(t) if t == tag),
            "tag {tag}: {err:?}"
        );
    }
}

#[test]
fn test_fields_required_by_tag_must_be_present() {
    let missing_request = PbftMsg {
        r#type: MessageType::Preprepare as i32,
        view: VIEW,
        sequence: SEQUENCE,
        sender: Uuid::new_v4().to_string(),
        ..Default::default()
    };
    assert!(matches!(
        unwrap(&envelope_for(&missing_request)),
        Err(PbftError::MalformedEnvelope(_))
    ));

    let bad_sender = PbftMsg {
        r#type: MessageType::Prepare as i32,
        view: VIEW,
        sequence: SEQUENCE,
        sender: "uuid1".to_string(),
        request_digest: compute_request_digest(&sample_request()),
        ..Default::default()
    };
    assert!(matches!(
        unwrap(&envelope_for(&bad_sender)),
        Err(PbftError::MalformedEnvelope(_))
    ));

    let short_digest = PbftMsg {
        r#type: MessageType::Commit as i32,
        view: VIEW,
        sequence: SEQUENCE,
        sender: Uuid::new_v4().to_string(),
        request_digest: vec![1, 2, 3],
        ..Default::default()
    };
    assert!(matches!(
        unwrap(&envelope_for(&short_digest)),
        Err(PbftError::MalformedEnvelope(_))
    ));
}

#[test]
fn test_decode_envelope_rejects_truncated_bytes() {
    let bytes = encode_envelope(&wrap(&every_variant()[1]));
    let err = decode_envelope(&bytes[..bytes.len() - 1]).unwrap_err();
    assert!(matches!(err, PbftError::Decode(_)));
}
