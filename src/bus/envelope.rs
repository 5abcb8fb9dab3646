use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::BusError;
use super::event_types::{Acknowledgment, EventKind, EventPayload};

/// The unit exchanged over the bus: `{id, kind, wantsAck, payload}`.
///
/// The payload is kept as raw JSON until a handler for `kind` asks for its
/// typed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: Uuid,
    pub kind: EventKind,
    #[serde(default)]
    pub wants_ack: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<P: EventPayload>(id: Uuid, payload: &P, wants_ack: bool) -> Result<Self, BusError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| BusError::Encode(e.to_string()))?;
        Ok(Self {
            id,
            kind: P::KIND,
            wants_ack,
            payload,
        })
    }

    /// Reply correlated with `id`. Acknowledgments never ask for one back.
    pub fn acknowledgment(id: Uuid) -> Self {
        Self {
            id,
            kind: Acknowledgment::KIND,
            wants_ack: false,
            payload: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn encode(&self) -> Result<String, BusError> {
        serde_json::to_string(self).map_err(|e| BusError::Encode(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, BusError> {
        serde_json::from_str(raw).map_err(|e| BusError::Decode(e.to_string()))
    }

    pub fn is_acknowledgment(&self) -> bool {
        self.kind == EventKind::Acknowledgment
    }

    /// Decode the payload into the shape bound to `P`. Fails when the
    /// envelope carries a different kind.
    pub fn payload_as<P: EventPayload>(&self) -> Result<P, BusError> {
        if self.kind != P::KIND {
            return Err(BusError::Decode(format!(
                "expected {} payload, envelope is {}",
                P::KIND,
                self.kind
            )));
        }
        decode_payload(&self.payload)
    }
}

/// Absent payloads decode as an empty object so that payload-less kinds
/// accept both `{}` and a missing field.
pub(crate) fn decode_payload<P: EventPayload>(payload: &serde_json::Value) -> Result<P, BusError> {
    let result = if payload.is_null() {
        serde_json::from_value(serde_json::Value::Object(Default::default()))
    } else {
        P::deserialize(payload)
    };
    result.map_err(|e| BusError::Decode(e.to_string()))
}
