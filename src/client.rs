//! The client facade: one persistent connection, reconnection policy, and
//! routing of inbound traffic to the call task, the roster and the event bus.

use crate::calls::media::{MediaDevices, PeerConnector};
use crate::calls::session::{CallApi, CallSignal, SessionManager};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::presence::PresenceDirectory;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::socket::SignalingSocket;
use crate::types::events::{
    Connected, ConnectionLost, Disconnected, EventBus, PresenceUpdate, Reconnecting, TypingUpdate,
};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

const OUTBOUND_CAPACITY: usize = 64;

pub struct Client {
    config: ClientConfig,
    events: Arc<EventBus>,
    presence: PresenceDirectory,
    calls: CallApi,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: mpsc::Receiver<ClientMessage>,
}

impl Client {
    /// Build the client and start its call task. `run` must be called for
    /// anything to reach the network.
    pub fn new(
        config: ClientConfig,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let events = Arc::new(EventBus::new());
        let presence = PresenceDirectory::new();
        let (manager, calls) = SessionManager::new(
            &config.username,
            outbound_tx.clone(),
            events.clone(),
            devices,
            connector,
            presence.clone(),
            config.ring_timeout,
        );
        tokio::spawn(manager.run());
        Self {
            config,
            events,
            presence,
            calls,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn calls(&self) -> CallApi {
        self.calls.clone()
    }

    pub fn presence(&self) -> PresenceDirectory {
        self.presence.clone()
    }

    pub async fn send_text(&self, content: impl Into<String>, reply_to: Option<i64>) {
        self.queue(ClientMessage::Text {
            content: content.into(),
            reply_to,
        })
        .await;
    }

    pub async fn set_typing(&self, typing: bool) {
        let message = if typing {
            ClientMessage::TypingStart
        } else {
            ClientMessage::TypingStop
        };
        self.queue(message).await;
    }

    pub async fn mark_read(&self, ids: Vec<i64>) {
        self.queue(ClientMessage::MarkRead { ids }).await;
    }

    async fn queue(&self, message: ClientMessage) {
        if self.outbound_tx.send(message).await.is_err() {
            warn!("Outbound queue closed, message dropped");
        }
    }

    /// Connect and serve until the connection is unrecoverable.
    ///
    /// Reconnects with a bounded linear backoff after any drop that follows
    /// a successful login. A socket that never authenticates is never
    /// retried; neither is a login the relay explicitly refused.
    pub async fn run(mut self) -> Result<(), ClientError> {
        let mut attempts: u32 = 0;
        let mut authenticated_once = false;

        loop {
            match SignalingSocket::connect(&self.config.server_url).await {
                Ok((socket, mut inbound)) => {
                    // A fresh socket restores the full backoff budget.
                    attempts = 0;
                    let mut authenticated = false;
                    if let Err(e) = socket
                        .send_login(&self.config.username, &self.config.password)
                        .await
                    {
                        warn!("Failed to send login: {e}");
                    } else {
                        loop {
                            tokio::select! {
                                inbound_msg = inbound.recv() => {
                                    let Some(message) = inbound_msg else {
                                        debug!("Inbound channel closed");
                                        break;
                                    };
                                    match self.route(message, &mut authenticated).await {
                                        Ok(()) => {}
                                        Err(e) => {
                                            socket.close().await;
                                            return Err(e);
                                        }
                                    }
                                    if authenticated {
                                        authenticated_once = true;
                                    }
                                }
                                outbound_msg = self.outbound_rx.recv() => {
                                    let Some(message) = outbound_msg else {
                                        socket.close().await;
                                        return Ok(());
                                    };
                                    if let Err(e) = socket.send(&message).await {
                                        warn!("Failed to send, connection is going down: {e}");
                                    }
                                }
                            }
                        }
                    }
                    socket.close().await;
                }
                Err(e) => {
                    warn!("Connection attempt failed: {e}");
                }
            }

            // The connection is gone. Any in-flight call cannot survive it.
            self.calls.transport_down().await;
            let _ = self.events.disconnected.send(Arc::new(Disconnected));

            if !authenticated_once {
                return Err(ClientError::ConnectionFailed);
            }
            attempts += 1;
            match self.config.reconnect.delay_for(attempts) {
                Some(delay) => {
                    info!(
                        "Reconnecting in {delay:?} (attempt {attempts}/{})",
                        self.config.reconnect.max_attempts
                    );
                    let _ = self.events.reconnecting.send(Arc::new(Reconnecting {
                        attempt: attempts,
                        delay,
                    }));
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!("Reconnect budget exhausted after {attempts} attempts");
                    let _ = self
                        .events
                        .connection_lost
                        .send(Arc::new(ConnectionLost { attempts }));
                    return Err(ClientError::ConnectionLost);
                }
            }
        }
    }

    async fn route(
        &self,
        message: ServerMessage,
        authenticated: &mut bool,
    ) -> Result<(), ClientError> {
        if let Some(signal) = call_signal_for(&message) {
            self.calls.deliver_signal(signal).await;
            return Ok(());
        }
        match message {
            ServerMessage::LoginSuccess {
                username,
                online_users,
            } => {
                info!("Logged in as {username}");
                *authenticated = true;
                self.presence.set_roster(online_users).await;
                let _ = self.events.connected.send(Arc::new(Connected { username }));
                self.emit_presence(None, None).await;
            }
            ServerMessage::Error { msg } => {
                if !*authenticated {
                    return Err(ClientError::AuthFailed(msg));
                }
                warn!("Server error: {msg}");
            }
            ServerMessage::UserJoined {
                username,
                online_users,
            } => {
                self.presence.set_roster(online_users).await;
                self.emit_presence(Some(username), None).await;
            }
            ServerMessage::UserLeft {
                username,
                online_users,
            } => {
                self.presence.set_roster(online_users).await;
                self.emit_presence(None, Some(username)).await;
            }
            ServerMessage::TypingUpdate { typing_users } => {
                let _ = self
                    .events
                    .typing
                    .send(Arc::new(TypingUpdate { typing_users }));
            }
            ServerMessage::Text(payload)
            | ServerMessage::Image(payload)
            | ServerMessage::Video(payload)
            | ServerMessage::File(payload)
            | ServerMessage::Voice(payload) => {
                let _ = self.events.chat_message.send(Arc::new(payload));
            }
            ServerMessage::Unknown => {
                debug!("Ignoring unrecognized frame");
            }
            // Call traffic was peeled off above.
            _ => {}
        }
        Ok(())
    }

    async fn emit_presence(&self, joined: Option<String>, left: Option<String>) {
        let _ = self.events.presence.send(Arc::new(PresenceUpdate {
            online_users: self.presence.online_users().await,
            joined,
            left,
        }));
    }
}

/// Map relay traffic onto call signals. Returns `None` for everything the
/// call task does not consume.
fn call_signal_for(message: &ServerMessage) -> Option<CallSignal> {
    match message {
        ServerMessage::CallIncoming { from, call_type } => Some(CallSignal::Incoming {
            from: from.clone(),
            call_type: *call_type,
        }),
        ServerMessage::CallAccepted { from } => Some(CallSignal::Accepted { from: from.clone() }),
        ServerMessage::CallRejected { from, reason } => Some(CallSignal::Rejected {
            from: from.clone(),
            reason: reason.clone(),
        }),
        ServerMessage::CallCancelled { from } => Some(CallSignal::Cancelled { from: from.clone() }),
        // Older relay builds say call_ended where current ones say call_end.
        ServerMessage::CallEnd { from } | ServerMessage::CallEnded { from } => {
            Some(CallSignal::Ended { from: from.clone() })
        }
        ServerMessage::WebrtcOffer { from, offer } => Some(CallSignal::Offer {
            from: from.clone(),
            offer: offer.clone(),
        }),
        ServerMessage::WebrtcAnswer { from, answer } => Some(CallSignal::Answer {
            from: from.clone(),
            answer: answer.clone(),
        }),
        ServerMessage::IceCandidate { from, candidate } => Some(CallSignal::Candidate {
            from: from.clone(),
            candidate: candidate.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_hangup_spellings_map_to_the_same_signal() {
        for raw in [
            r#"{"type":"call_end","from":"bob"}"#,
            r#"{"type":"call_ended","from":"bob"}"#,
        ] {
            let message = ServerMessage::decode(raw).unwrap();
            match call_signal_for(&message) {
                Some(CallSignal::Ended { from }) => assert_eq!(from, "bob"),
                other => panic!("unexpected mapping for {raw}: {other:?}"),
            }
        }
    }

    #[test]
    fn chat_frames_are_not_call_signals() {
        let message =
            ServerMessage::decode(r#"{"type":"text","user":"bob","msg":"hi"}"#).unwrap();
        assert!(call_signal_for(&message).is_none());
    }
}
