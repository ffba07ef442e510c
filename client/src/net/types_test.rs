use super::*;
use time::macros::datetime;

// =============================================================
// User normalization
// =============================================================

#[test]
fn user_missing_and_null_names_default_to_empty() {
    let user: User = serde_json::from_value(serde_json::json!({
        "_id": "u1",
        "firstName": null,
        "email": "a@example.com"
    }))
    .unwrap();
    assert_eq!(user.first_name, "");
    assert_eq!(user.last_name, "");
    assert_eq!(user.email, "a@example.com");
    assert!(user.profile_pic.is_none());
}

#[test]
fn display_name_prefers_full_name() {
    let user: User = serde_json::from_value(serde_json::json!({
        "_id": "u1", "firstName": "Alice", "lastName": "Smith", "email": "a@example.com"
    }))
    .unwrap();
    assert_eq!(user.display_name(), "Alice Smith");
}

#[test]
fn display_name_falls_back_to_email_then_id() {
    let mut user: User = serde_json::from_value(serde_json::json!({"_id": "u1", "email": "a@example.com"})).unwrap();
    assert_eq!(user.display_name(), "a@example.com");
    user.email.clear();
    assert_eq!(user.display_name(), "u1");
}

// =============================================================
// Message normalization
// =============================================================

#[test]
fn message_parses_full_payload() {
    let msg: Message = serde_json::from_value(serde_json::json!({
        "_id": "m1",
        "senderId": "u1",
        "receiverId": "u2",
        "text": "hi",
        "createdAt": "2025-01-05T10:00:00.000Z",
        "updatedAt": "2025-01-05T10:00:01.000Z",
        "read": true,
        "readAt": "2025-01-05T10:05:00.000Z"
    }))
    .unwrap();
    assert_eq!(msg.id, "m1");
    assert_eq!(msg.text.as_deref(), Some("hi"));
    assert!(msg.image.is_none());
    assert_eq!(msg.created_at, datetime!(2025-01-05 10:00:00 UTC));
    assert_eq!(msg.updated_at, datetime!(2025-01-05 10:00:01 UTC));
    assert!(msg.read);
    assert_eq!(msg.read_at, Some(datetime!(2025-01-05 10:05:00 UTC)));
}

#[test]
fn message_accepts_populated_sender_documents() {
    let msg: Message = serde_json::from_value(serde_json::json!({
        "_id": "m1",
        "senderId": {"_id": "u1", "firstName": "Alice"},
        "receiverId": "u2",
        "createdAt": "2025-01-05T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(msg.sender_id, "u1");
}

#[test]
fn message_defaults_updated_at_and_read() {
    let msg: Message = serde_json::from_value(serde_json::json!({
        "_id": "m1", "senderId": "u1", "receiverId": "u2", "text": "",
        "createdAt": "2025-01-05T10:00:00Z"
    }))
    .unwrap();
    assert_eq!(msg.updated_at, msg.created_at);
    assert!(!msg.read);
    assert!(msg.text.is_none(), "empty text normalizes to absent");
}

#[test]
fn message_without_id_is_rejected() {
    let result = serde_json::from_value::<Message>(serde_json::json!({
        "senderId": "u1", "receiverId": "u2", "createdAt": "2025-01-05T10:00:00Z"
    }));
    assert!(result.is_err());
}

#[test]
fn message_with_bad_timestamp_is_rejected() {
    let err = Message::try_from(WireMessage {
        id: Some("m1".to_owned()),
        sender_id: Some(IdRef::Id("u1".to_owned())),
        receiver_id: Some(IdRef::Id("u2".to_owned())),
        text: None,
        image: None,
        created_at: Some("yesterday".to_owned()),
        updated_at: None,
        read: None,
        read_at: None,
        client_message_id: None,
    })
    .unwrap_err();
    assert!(matches!(err, NormalizeError::InvalidTimestamp { field: "createdAt", .. }));
}

#[test]
fn message_serializes_with_backend_field_names() {
    let msg = Message::placeholder("u1", "u2", Some("hi".to_owned()), None, datetime!(2025-01-05 10:00:00 UTC));
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["_id"], "temp-1736071200000");
    assert_eq!(value["senderId"], "u1");
    assert_eq!(value["createdAt"], "2025-01-05T10:00:00Z");
    assert!(value.get("image").is_none());
}

// =============================================================
// Placeholder ids
// =============================================================

#[test]
fn temp_id_uses_unix_millis() {
    assert_eq!(temp_id_for(datetime!(1970-01-01 00:00:01.5 UTC)), "temp-1500");
}

#[test]
fn placeholder_is_marked_and_carries_a_fresh_key() {
    let now = datetime!(2025-01-05 10:00:00 UTC);
    let msg = Message::placeholder("u1", "u2", Some("hi".to_owned()), None, now);
    let other = Message::placeholder("u1", "u2", Some("hi".to_owned()), None, now);
    assert!(msg.is_placeholder());
    let key = msg.client_message_id.as_deref().unwrap();
    assert!(Uuid::parse_str(key).is_ok());
    assert_ne!(msg.client_message_id, other.client_message_id);
    assert_eq!(msg.sender_id, "u1");
    assert_eq!(msg.receiver_id, "u2");
}

#[test]
fn partner_of_picks_the_other_participant() {
    let msg = Message::placeholder("u1", "u2", None, None, datetime!(2025-01-05 10:00:00 UTC));
    assert_eq!(msg.partner_of("u1"), "u2");
    assert_eq!(msg.partner_of("u2"), "u1");
}

#[test]
fn login_response_parses() {
    let resp: LoginResponse = serde_json::from_value(serde_json::json!({
        "message": "ok",
        "data": {"_id": "u1", "firstName": "Alice", "lastName": "Smith", "email": "a@example.com"},
        "token": "tok"
    }))
    .unwrap();
    assert_eq!(resp.token, "tok");
    assert_eq!(resp.data.id, "u1");
}
