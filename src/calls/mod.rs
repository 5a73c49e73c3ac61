//! One-to-one audio/video calling on top of the signaling connection.
//!
//! `session` owns the call lifecycle, `state` is the pure transition table,
//! `negotiation` holds out-of-order signaling until the peer connection can
//! take it, and `media` is the seam to the platform capture and transport
//! primitives.

pub mod error;
pub mod media;
pub mod negotiation;
pub mod session;
pub mod state;


pub use error::CallError;
pub use media::{
    LocalMedia, LocalTrack, MediaDevices, PeerConnection, PeerConnector, UnsupportedMediaStack,
};
pub use session::{CallApi, CallCommand, PeerEventSink, SessionManager};
pub use state::{CallSnapshot, CallState};
