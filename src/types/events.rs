//! Typed event bus for externally-observable client state.
//!
//! The renderer (and any other consumer) subscribes to the channels it cares
//! about; the core never renders anything itself. Each event type gets its
//! own broadcast channel so subscribers don't pay for traffic they ignore.

use crate::calls::error::CallError;
use crate::calls::state::CallSnapshot;
use crate::protocol::ChatPayload;
use crate::types::call::{CallType, EndReason, RemoteMediaStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Authenticated and ready.
#[derive(Debug, Clone)]
pub struct Connected {
    pub username: String,
}

/// The socket dropped; reconnection may follow.
#[derive(Debug, Clone)]
pub struct Disconnected;

/// A reconnect attempt is scheduled.
#[derive(Debug, Clone)]
pub struct Reconnecting {
    pub attempt: u32,
    pub delay: Duration,
}

/// The reconnect bound was exhausted. Terminal: the client will make no
/// further automatic attempts.
#[derive(Debug, Clone)]
pub struct ConnectionLost {
    pub attempts: u32,
}

/// Online-roster change.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub online_users: Vec<String>,
    pub joined: Option<String>,
    pub left: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TypingUpdate {
    pub typing_users: Vec<String>,
}

/// Somebody is calling us and we were idle.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub from: String,
    pub call_type: CallType,
}

/// The call session changed shape. `None` means back to the idle baseline.
#[derive(Debug, Clone)]
pub struct CallStateChanged {
    pub snapshot: Option<CallSnapshot>,
}

/// A call finished, from whichever exit path.
#[derive(Debug, Clone)]
pub struct CallEnded {
    pub peer: String,
    pub reason: EndReason,
    pub duration_secs: Option<i64>,
}

/// The peer's video feed changed state (video calls only).
#[derive(Debug, Clone)]
pub struct RemoteMediaChanged {
    pub status: RemoteMediaStatus,
}

/// A user-actionable call failure. These are reported, never auto-retried.
#[derive(Debug, Clone)]
pub struct CallErrorEvent {
    pub error: CallError,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),
    (reconnecting, Arc<Reconnecting>),
    (connection_lost, Arc<ConnectionLost>),

    // Roster events
    (presence, Arc<PresenceUpdate>),
    (typing, Arc<TypingUpdate>),

    // Chat passthrough
    (chat_message, Arc<ChatPayload>),

    // Call events
    (incoming_call, Arc<IncomingCall>),
    (call_state, Arc<CallStateChanged>),
    (call_ended, Arc<CallEnded>),
    (remote_media, Arc<RemoteMediaChanged>),
    (call_error, Arc<CallErrorEvent>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
