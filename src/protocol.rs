//! JSON wire envelope for the signaling relay.
//!
//! Every frame on the persistent connection is a JSON object with a `type`
//! discriminator; call control, peer negotiation, presence and chat all share
//! the one connection. The relay itself is a thin forwarder: it stamps `from`
//! on delivery and never acknowledges, retries or reorders.

use crate::types::call::CallType;
use serde::{Deserialize, Serialize};

/// An SDP blob as exchanged during offer/answer negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An ICE candidate in the browser-compatible JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

/// First frame on a fresh socket. Sent exactly once per connection; the
/// server replies with `login_success` or `error` and there is no further
/// handshake on the same socket.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A chat-layer message. The core only decodes and routes these; rendering,
/// uploads and history belong to external consumers.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub id: Option<i64>,
    pub user: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

/// Messages the client produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CallInitiate {
        to: String,
        #[serde(rename = "callType")]
        call_type: CallType,
    },
    CallAccept {
        to: String,
    },
    CallReject {
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    CallCancel {
        to: String,
    },
    CallEnd {
        to: String,
    },
    WebrtcOffer {
        to: String,
        offer: SessionDescription,
    },
    WebrtcAnswer {
        to: String,
        answer: SessionDescription,
    },
    IceCandidate {
        to: String,
        candidate: IceCandidate,
    },
    Text {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to: Option<i64>,
    },
    TypingStart,
    TypingStop,
    MarkRead {
        ids: Vec<i64>,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Messages the relay delivers.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LoginSuccess {
        username: String,
        #[serde(default)]
        online_users: Vec<String>,
    },
    Error {
        msg: String,
    },
    UserJoined {
        username: String,
        #[serde(default)]
        online_users: Vec<String>,
    },
    UserLeft {
        username: String,
        #[serde(default)]
        online_users: Vec<String>,
    },
    TypingUpdate {
        #[serde(default)]
        typing_users: Vec<String>,
    },
    CallIncoming {
        from: String,
        #[serde(rename = "callType")]
        call_type: CallType,
    },
    CallAccepted {
        from: String,
    },
    CallRejected {
        from: String,
        #[serde(default)]
        reason: Option<String>,
    },
    CallCancelled {
        from: String,
    },
    CallEnd {
        from: String,
    },
    /// Alias emitted by older relay builds for a remote hang-up.
    CallEnded {
        from: String,
    },
    WebrtcOffer {
        from: String,
        offer: SessionDescription,
    },
    WebrtcAnswer {
        from: String,
        answer: SessionDescription,
    },
    IceCandidate {
        from: String,
        candidate: IceCandidate,
    },
    Text(ChatPayload),
    Image(ChatPayload),
    Video(ChatPayload),
    File(ChatPayload),
    Voice(ChatPayload),
    /// Anything we don't understand. The relay multiplexes more consumer
    /// types than the core cares about; unknown frames are routed nowhere.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_call_incoming_with_camel_case_call_type() {
        let msg =
            ServerMessage::decode(r#"{"type":"call_incoming","from":"ana","callType":"video"}"#)
                .unwrap();
        match msg {
            ServerMessage::CallIncoming { from, call_type } => {
                assert_eq!(from, "ana");
                assert_eq!(call_type, CallType::Video);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_browser_shaped_ice_candidate() {
        let msg = ServerMessage::decode(
            r#"{"type":"ice_candidate","from":"bo","candidate":{"candidate":"candidate:1 1 udp 2113937151 192.0.2.1 54400 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::IceCandidate { candidate, .. } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn encodes_call_initiate_in_relay_shape() {
        let raw = ClientMessage::CallInitiate {
            to: "ana".into(),
            call_type: CallType::Video,
        }
        .encode()
        .unwrap();
        assert_eq!(raw, r#"{"type":"call_initiate","to":"ana","callType":"video"}"#);
    }

    #[test]
    fn busy_reject_carries_reason() {
        let raw = ClientMessage::CallReject {
            to: "ana".into(),
            reason: Some("busy".into()),
        }
        .encode()
        .unwrap();
        assert_eq!(raw, r#"{"type":"call_reject","to":"ana","reason":"busy"}"#);
    }

    #[test]
    fn remote_hangup_alias_still_decodes() {
        let msg = ServerMessage::decode(r#"{"type":"call_ended","from":"ana"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::CallEnded { .. }));
    }

    #[test]
    fn unknown_types_decode_to_unknown() {
        let msg = ServerMessage::decode(r#"{"type":"reaction_update","id":3}"#).unwrap();
        assert!(matches!(msg, ServerMessage::Unknown));
    }
}
