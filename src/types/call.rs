//! Shared call types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media composition of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Voice,
    Video,
}

impl CallType {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voice => write!(f, "voice"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Who started the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// Why a call left the active/ringing lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    LocalHangup,
    RemoteHangup,
    LocalDeclined,
    RemoteDeclined { reason: Option<String> },
    LocalCancelled,
    RemoteCancelled,
    NoAnswer,
    ConnectionFailed,
    TransportLost,
    DeviceFailed,
    /// Torn down on purpose so the call can be redialed immediately, for
    /// example when the peer primitive cannot switch cameras in place.
    Restarting,
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Which camera a video track captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    #[default]
    User,
    Environment,
}

impl CameraFacing {
    pub fn flipped(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }
}

/// What the renderer should show for the peer's video feed.
///
/// Derived from remote track events inside the peer-link adapter, because the
/// distinction between "no track yet" and "track present but disabled" only
/// exists at that layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMediaStatus {
    /// Video call but no remote video frames yet.
    WaitingForVideo,
    /// Remote video track exists but is disabled or muted.
    CameraOff,
    /// Remote video is flowing.
    Live,
}

/// Durable record of the most recent incoming-call notification.
///
/// Retained independently of any presentation state so accept/reject stay
/// correct even if the ringing session object was torn down by a race (for
/// example a transport blip while the incoming-call prompt is up).
#[derive(Debug, Clone)]
pub struct IncomingCallRecord {
    pub from: String,
    pub call_type: CallType,
    pub received_at: DateTime<Utc>,
}

impl IncomingCallRecord {
    pub fn new(from: impl Into<String>, call_type: CallType) -> Self {
        Self {
            from: from.into(),
            call_type,
            received_at: Utc::now(),
        }
    }
}
