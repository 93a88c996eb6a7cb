use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::sync::Arc;

use crate::auth::Identity;
use super::error::RelayError;

pub type DocumentId = i64;
pub type UserId = i64;

/// A frame ready to be written to a socket. Shared between every member a
/// broadcast reaches, so encoding happens once per envelope.
pub type Frame = Arc<str>;

/// The `type` tag of an envelope.
///
/// The relay only ever produces `join` and `leave` itself. Everything else is
/// forwarded untouched, so unknown kinds survive a round trip through
/// `Other`. A missing or `null` type is relayed as an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    Join,
    Leave,
    Edit,
    Cursor,
    Other(String),
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeKind::Join => "join",
            EnvelopeKind::Leave => "leave",
            EnvelopeKind::Edit => "edit",
            EnvelopeKind::Cursor => "cursor",
            EnvelopeKind::Other(kind) => kind,
        }
    }
}

impl Default for EnvelopeKind {
    fn default() -> Self {
        EnvelopeKind::Other(String::new())
    }
}

impl From<String> for EnvelopeKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "join" => EnvelopeKind::Join,
            "leave" => EnvelopeKind::Leave,
            "edit" => EnvelopeKind::Edit,
            "cursor" => EnvelopeKind::Cursor,
            _ => EnvelopeKind::Other(kind),
        }
    }
}

impl Serialize for EnvelopeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnvelopeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(|kind| kind.map(EnvelopeKind::from).unwrap_or_default())
    }
}

/// Keeps an explicit `"payload": null` as a raw `null` instead of folding it
/// into an absent payload.
fn raw_payload<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error> {
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

/// The message unit exchanged between a client and the relay.
///
/// The sender fields default to zero values on the way in because clients
/// are expected to leave them blank; they are always overwritten by
/// [`Envelope::stamp`] before anything is fanned out.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub document_id: DocumentId,
    #[serde(default)]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, deserialize_with = "raw_payload", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
}

impl Envelope {
    /// A payload-less `join` or `leave` announcing `identity` in a document.
    pub fn presence(kind: EnvelopeKind, identity: &Identity, document_id: DocumentId) -> Self {
        Self {
            kind,
            document_id,
            user_id: identity.user_id,
            username: identity.username.clone(),
            payload: None,
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(raw).map_err(RelayError::Decode)
    }

    /// Replace whatever sender information the client supplied with the
    /// identity and document the connection was authenticated for.
    pub fn stamp(&mut self, identity: &Identity, document_id: DocumentId) {
        self.user_id = identity.user_id;
        self.username = identity.username.clone();
        self.document_id = document_id;
    }

    pub fn encode(&self) -> Result<Frame, RelayError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(RelayError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn alice() -> Identity {
        Identity { user_id: 1, username: "alice".to_string() }
    }

    #[test]
    fn stamp_overwrites_spoofed_sender_fields() {
        let raw = br#"{"type":"edit","documentId":999,"userId":42,"username":"mallory","payload":{"ops":[1,2]}}"#;
        let mut envelope = Envelope::decode(raw).unwrap();
        envelope.stamp(&alice(), 7);

        let out: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(
            out,
            json!({
                "type": "edit",
                "documentId": 7,
                "userId": 1,
                "username": "alice",
                "payload": {"ops": [1, 2]}
            })
        );
    }

    #[test]
    fn sender_fields_are_optional_on_input() {
        let envelope = Envelope::decode(br#"{"type":"cursor","payload":{"pos":3}}"#).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Cursor);
        assert_eq!(envelope.user_id, 0);
        assert!(envelope.username.is_empty());
    }

    #[test]
    fn unknown_kinds_pass_through() {
        let envelope = Envelope::decode(br#"{"type":"selection"}"#).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Other("selection".to_string()));
        assert!(envelope.encode().unwrap().contains(r#""type":"selection""#));
    }

    #[test]
    fn presence_envelopes_omit_payload() {
        let frame = Envelope::presence(EnvelopeKind::Join, &alice(), 3).encode().unwrap();
        let out: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(out, json!({"type": "join", "documentId": 3, "userId": 1, "username": "alice"}));
    }

    #[test]
    fn missing_or_null_type_is_relayed_as_empty() {
        let mut untyped = Envelope::decode(br#"{"payload":{"ops":[1]}}"#).unwrap();
        assert_eq!(untyped.kind, EnvelopeKind::Other(String::new()));
        untyped.stamp(&alice(), 4);
        let out: Value = serde_json::from_str(&untyped.encode().unwrap()).unwrap();
        assert_eq!(
            out,
            json!({"type": "", "documentId": 4, "userId": 1, "username": "alice", "payload": {"ops": [1]}})
        );

        let null_type = Envelope::decode(br#"{"type":null,"payload":2}"#).unwrap();
        assert_eq!(null_type.kind, EnvelopeKind::Other(String::new()));
    }

    #[test]
    fn null_payload_is_forwarded_as_null() {
        let envelope = Envelope::decode(br#"{"type":"edit","payload":null}"#).unwrap();
        let out: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(out["payload"], Value::Null);
        assert!(out.as_object().unwrap().contains_key("payload"));

        let absent = Envelope::decode(br#"{"type":"edit"}"#).unwrap();
        assert!(absent.payload.is_none());
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(matches!(Envelope::decode(b"not json"), Err(RelayError::Decode(_))));
        assert!(Envelope::decode(br#"{"type":7}"#).is_err());
        assert!(Envelope::decode(br#"{"type":"edit","userId":"five"}"#).is_err());
    }
}
