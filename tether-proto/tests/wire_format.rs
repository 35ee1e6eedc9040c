use k9::assert_equal;
use serde_json::json;
use tether_proto::{CloseReason, Eid, RelayMessage, Role, Side, SubChannel, RELAY_EID};

#[test]
fn welcome_is_tagged_by_type() {
    let msg = RelayMessage::Welcome {
        eid: Eid(17),
        role: Role::Device,
    };
    let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
    assert_equal!(value, json!({"type": "welcome", "eid": 17, "role": "device"}));
}

#[test]
fn send_to_relay_parses_with_default_sub_channel() {
    let decoded: RelayMessage =
        serde_json::from_str(r#"{"type":"send","to":0,"payload":[104,105]}"#).unwrap();
    assert_equal!(
        decoded,
        RelayMessage::Send {
            to: RELAY_EID,
            sub_channel: SubChannel(0),
            payload: b"hi".to_vec(),
        }
    );
}

#[test]
fn deliver_keeps_sender_and_sub_channel() {
    let msg = RelayMessage::Deliver {
        from: Eid(3),
        sub_channel: SubChannel(2),
        payload: vec![1, 2, 3],
    };
    let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
    assert_equal!(
        value,
        json!({"type": "deliver", "from": 3, "sub_channel": 2, "payload": [1, 2, 3]})
    );
}

#[test]
fn close_carries_code_and_reason() {
    let reason = CloseReason::CounterpartClosed(Side::Device);
    let msg = RelayMessage::Close {
        code: reason.code(),
        reason: reason.to_string(),
    };
    let decoded: RelayMessage = serde_json::from_str(&msg.to_json()).unwrap();
    assert_equal!(decoded, msg);
}

#[test]
fn unknown_type_is_rejected() {
    let res = serde_json::from_str::<RelayMessage>(r#"{"type":"subscribe","topic":"x"}"#);
    assert!(res.is_err());
}

#[test]
fn close_reason_serializes_with_side() {
    let value = serde_json::to_value(CloseReason::CounterpartClosed(Side::Viewer)).unwrap();
    assert_equal!(value, json!({"kind": "counterpart_closed", "side": "viewer"}));
    let value = serde_json::to_value(CloseReason::DeviceLocked).unwrap();
    assert_equal!(value, json!({"kind": "device_locked"}));
}
