//! Call-related error types.

use thiserror::Error;

/// Everything that can go wrong while placing, answering or running a call.
///
/// Device failures (`PermissionDenied`, `DeviceNotFound`, `DeviceBusy`,
/// `InsecureContext`, `Unsupported`) abort the in-progress initiate/accept
/// and are user-actionable; none of them is retried automatically.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("media permission denied")]
    PermissionDenied,

    #[error("no capture device found")]
    DeviceNotFound,

    #[error("capture device is in use by another application")]
    DeviceBusy,

    #[error("media capture requires a secure context")]
    InsecureContext,

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("signaling transport lost")]
    TransportLost,

    #[error("no session matches this operation: {0}")]
    UnknownSession(String),

    #[error("already in a call with {0}")]
    AlreadyInCall(String),

    #[error("{0} is not online")]
    PeerOffline(String),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] super::state::InvalidTransition),
}
