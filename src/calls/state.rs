//! Call session state machine.

use crate::types::call::{CallDirection, CallType, EndReason};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current state of the call session.
///
/// `Idle` is the client baseline: no session exists. Every exit path (end,
/// reject, cancel, timeout, transport drop, peer-link failure) returns here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    /// Outgoing call: notification sent, waiting for the callee.
    RingingOut,
    /// Incoming call: ringing locally, waiting for the user.
    RingingIn,
    /// Both sides agreed; offer/answer and ICE exchange in progress.
    Negotiating,
    /// Media is flowing.
    Active,
}

impl CallState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::RingingOut | Self::RingingIn)
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::RingingIn)
    }

    /// Apply a transition, returning the next state or an error for a pair
    /// the protocol does not allow.
    pub fn apply(self, transition: &CallTransition) -> Result<CallState, InvalidTransition> {
        use CallState::*;
        use CallTransition::*;
        let next = match (self, transition) {
            (Idle, LocalInitiated) => RingingOut,
            (Idle, RemoteOffered) => RingingIn,
            (RingingOut, RemoteAccepted) => Negotiating,
            (RingingIn, LocalAccepted) => Negotiating,
            (Negotiating, MediaConnected) => Active,
            (RingingOut | RingingIn | Negotiating | Active, Ended(_)) => Idle,
            (current, attempted) => {
                return Err(InvalidTransition {
                    current_state: format!("{current:?}"),
                    attempted: format!("{attempted:?}"),
                });
            }
        };
        Ok(next)
    }
}

/// State transitions for the call session.
#[derive(Debug, Clone)]
pub enum CallTransition {
    LocalInitiated,
    RemoteOffered,
    RemoteAccepted,
    LocalAccepted,
    MediaConnected,
    Ended(EndReason),
}

/// A logical call between the local user and one remote party.
///
/// At most one of these exists per client at any time; a second incoming
/// call is answered busy without this object ever being touched.
#[derive(Debug)]
pub struct CallSession {
    pub local_user: String,
    pub remote_user: String,
    pub call_type: CallType,
    pub direction: CallDirection,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    /// When media first connected; the call timer runs from here.
    pub connected_at: Option<DateTime<Utc>>,
    pub audio_muted: bool,
    pub camera_on: bool,
    /// Monotonic tag used to detect continuations issued for a session the
    /// user has already ended or replaced.
    pub epoch: u64,
}

impl CallSession {
    pub fn new_outgoing(
        local_user: impl Into<String>,
        remote_user: impl Into<String>,
        call_type: CallType,
        epoch: u64,
    ) -> Self {
        Self {
            local_user: local_user.into(),
            remote_user: remote_user.into(),
            call_type,
            direction: CallDirection::Outgoing,
            state: CallState::RingingOut,
            created_at: Utc::now(),
            connected_at: None,
            audio_muted: false,
            camera_on: call_type.is_video(),
            epoch,
        }
    }

    pub fn new_incoming(
        local_user: impl Into<String>,
        remote_user: impl Into<String>,
        call_type: CallType,
        epoch: u64,
    ) -> Self {
        Self {
            local_user: local_user.into(),
            remote_user: remote_user.into(),
            call_type,
            direction: CallDirection::Incoming,
            state: CallState::RingingIn,
            created_at: Utc::now(),
            connected_at: None,
            audio_muted: false,
            camera_on: call_type.is_video(),
            epoch,
        }
    }

    /// Apply a state transition. Returns an error if the transition is not
    /// valid from the current state.
    pub fn apply(&mut self, transition: CallTransition) -> Result<(), InvalidTransition> {
        let next = self.state.apply(&transition)?;
        if next == CallState::Active && self.connected_at.is_none() {
            self.connected_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    pub fn is_party(&self, username: &str) -> bool {
        self.remote_user == username
    }

    pub fn elapsed_seconds(&self) -> Option<i64> {
        self.connected_at
            .map(|t| Utc::now().signed_duration_since(t).num_seconds())
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            peer: self.remote_user.clone(),
            call_type: self.call_type,
            direction: self.direction,
            state: self.state,
            audio_muted: self.audio_muted,
            camera_on: self.camera_on,
            connected_at: self.connected_at,
        }
    }
}

/// Owned copy of the session's externally-observable fields, handed to the
/// renderer through the event bus.
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub peer: String,
    pub call_type: CallType,
    pub direction: CallDirection,
    pub state: CallState,
    pub audio_muted: bool,
    pub camera_on: bool,
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outgoing_call() -> CallSession {
        CallSession::new_outgoing("me", "ana", CallType::Voice, 1)
    }

    fn make_incoming_call() -> CallSession {
        CallSession::new_incoming("me", "ana", CallType::Video, 1)
    }

    /// Flow: Idle → RingingOut → Negotiating → Active → Idle
    #[test]
    fn test_outgoing_call_flow() {
        let mut call = make_outgoing_call();
        assert_eq!(call.state, CallState::RingingOut);

        call.apply(CallTransition::RemoteAccepted).unwrap();
        assert_eq!(call.state, CallState::Negotiating);

        call.apply(CallTransition::MediaConnected).unwrap();
        assert_eq!(call.state, CallState::Active);
        assert!(call.connected_at.is_some());

        call.apply(CallTransition::Ended(EndReason::LocalHangup))
            .unwrap();
        assert!(call.state.is_idle());
    }

    /// Flow: Idle → RingingIn → Negotiating → Active → Idle
    #[test]
    fn test_incoming_call_flow() {
        let mut call = make_incoming_call();
        assert!(call.state.can_accept());

        call.apply(CallTransition::LocalAccepted).unwrap();
        assert_eq!(call.state, CallState::Negotiating);

        call.apply(CallTransition::MediaConnected).unwrap();
        assert_eq!(call.state, CallState::Active);

        call.apply(CallTransition::Ended(EndReason::RemoteHangup))
            .unwrap();
        assert!(call.state.is_idle());
    }

    #[test]
    fn test_every_state_can_end() {
        for (state, transitions) in [
            (CallState::RingingOut, vec![]),
            (CallState::RingingIn, vec![]),
            (
                CallState::Negotiating,
                vec![CallTransition::RemoteAccepted],
            ),
            (
                CallState::Active,
                vec![CallTransition::RemoteAccepted, CallTransition::MediaConnected],
            ),
        ] {
            let mut call = if state == CallState::RingingIn {
                let mut c = make_incoming_call();
                c.state = state;
                c
            } else {
                make_outgoing_call()
            };
            for t in transitions {
                call.apply(t).unwrap();
            }
            assert_eq!(call.state, state);
            call.apply(CallTransition::Ended(EndReason::TransportLost))
                .unwrap();
            assert!(call.state.is_idle());
        }
    }

    #[test]
    fn test_invalid_transitions() {
        let mut call = make_outgoing_call();

        // Can't accept our own outgoing ring.
        assert!(call.apply(CallTransition::LocalAccepted).is_err());
        // Can't reach media before negotiation.
        assert!(call.apply(CallTransition::MediaConnected).is_err());

        // Idle can't end.
        assert!(
            CallState::Idle
                .apply(&CallTransition::Ended(EndReason::LocalHangup))
                .is_err()
        );
    }

    #[test]
    fn test_connected_timestamp_only_set_once() {
        let mut call = make_outgoing_call();
        call.apply(CallTransition::RemoteAccepted).unwrap();
        call.apply(CallTransition::MediaConnected).unwrap();
        let first = call.connected_at;
        assert!(first.is_some());
        assert!(call.elapsed_seconds().is_some());
    }

    #[test]
    fn test_direction_and_party() {
        let outgoing = make_outgoing_call();
        assert_eq!(outgoing.direction, CallDirection::Outgoing);
        assert!(outgoing.is_party("ana"));
        assert!(!outgoing.is_party("bo"));

        let incoming = make_incoming_call();
        assert_eq!(incoming.direction, CallDirection::Incoming);
        assert!(incoming.camera_on, "video calls start with camera on");
    }
}
