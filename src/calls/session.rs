//! Single-owner call orchestration.
//!
//! All call state lives inside one task that consumes a unified inbox of
//! user commands, signaling messages, peer-connection events and timer
//! fires, and processes each to completion before the next. Slow work
//! (device acquisition, ring timers) runs in spawned tasks that report back
//! through the same inbox, tagged with the session epoch they belong to;
//! results arriving after that call ended are dropped instead of mutating
//! whatever call replaced it.

use crate::calls::error::CallError;
use crate::calls::media::{
    LocalMedia, LocalTrack, MediaDevices, MediaPeerLink, PeerConnectionState, PeerConnector,
    PeerEvent,
};
use crate::calls::negotiation::NegotiationBuffer;
use crate::calls::state::{CallSession, CallState, CallTransition};
use crate::presence::PresenceDirectory;
use crate::protocol::{ClientMessage, IceCandidate, SessionDescription};
use crate::types::call::{CallType, CameraFacing, EndReason, IncomingCallRecord};
use crate::types::events::{CallEnded, CallErrorEvent, CallStateChanged, EventBus, IncomingCall, RemoteMediaChanged};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const INBOX_CAPACITY: usize = 64;

/// User-initiated call actions.
#[derive(Debug, Clone)]
pub enum CallCommand {
    Initiate { peer: String, call_type: CallType },
    Accept,
    Reject,
    Cancel,
    HangUp,
    SetMuted(bool),
    SetCameraOn(bool),
    SwitchCamera,
}

/// Call-related traffic from the signaling server.
#[derive(Debug, Clone)]
pub enum CallSignal {
    Incoming { from: String, call_type: CallType },
    Accepted { from: String },
    Rejected { from: String, reason: Option<String> },
    Cancelled { from: String },
    Ended { from: String },
    Offer { from: String, offer: SessionDescription },
    Answer { from: String, answer: SessionDescription },
    Candidate { from: String, candidate: IceCandidate },
}

/// Why media was being acquired when the result came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaPurpose {
    Initiate,
    Accept,
}

/// Everything the session task consumes, from all producers.
#[derive(Debug)]
pub(crate) enum SessionInput {
    Command(CallCommand),
    Signal(CallSignal),
    MediaReady {
        epoch: u64,
        purpose: MediaPurpose,
        result: Result<LocalMedia, CallError>,
    },
    VideoTrackReady {
        epoch: u64,
        facing: CameraFacing,
        result: Result<LocalTrack, CallError>,
    },
    Peer {
        epoch: u64,
        event: PeerEvent,
    },
    RingTimeout {
        epoch: u64,
    },
    TransportDown,
}

/// Event delivery handle given to a peer connection at creation. Events are
/// stamped with the epoch of the call they were created for.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    epoch: u64,
    tx: mpsc::Sender<SessionInput>,
}

impl PeerEventSink {
    pub fn emit(&self, event: PeerEvent) {
        if self
            .tx
            .try_send(SessionInput::Peer {
                epoch: self.epoch,
                event,
            })
            .is_err()
        {
            debug!("Peer event dropped, session inbox unavailable");
        }
    }
}

/// Cloneable handle into the session task. Sends are fire-and-forget;
/// failures surface on the event bus, never as return values here.
#[derive(Debug, Clone)]
pub struct CallApi {
    tx: mpsc::Sender<SessionInput>,
}

impl CallApi {
    pub async fn initiate(&self, peer: impl Into<String>, call_type: CallType) {
        self.command(CallCommand::Initiate {
            peer: peer.into(),
            call_type,
        })
        .await;
    }

    pub async fn accept(&self) {
        self.command(CallCommand::Accept).await;
    }

    pub async fn reject(&self) {
        self.command(CallCommand::Reject).await;
    }

    pub async fn cancel(&self) {
        self.command(CallCommand::Cancel).await;
    }

    pub async fn hang_up(&self) {
        self.command(CallCommand::HangUp).await;
    }

    pub async fn set_muted(&self, muted: bool) {
        self.command(CallCommand::SetMuted(muted)).await;
    }

    pub async fn set_camera_on(&self, on: bool) {
        self.command(CallCommand::SetCameraOn(on)).await;
    }

    pub async fn switch_camera(&self) {
        self.command(CallCommand::SwitchCamera).await;
    }

    pub async fn command(&self, command: CallCommand) {
        if self.tx.send(SessionInput::Command(command)).await.is_err() {
            warn!("Call command dropped, session task is gone");
        }
    }

    pub(crate) async fn deliver_signal(&self, signal: CallSignal) {
        if self.tx.send(SessionInput::Signal(signal)).await.is_err() {
            warn!("Call signal dropped, session task is gone");
        }
    }

    pub(crate) async fn transport_down(&self) {
        let _ = self.tx.send(SessionInput::TransportDown).await;
    }
}

/// The in-flight call and everything attached to it.
struct ActiveCall {
    session: CallSession,
    local_media: Option<LocalMedia>,
    link: Option<MediaPeerLink>,
    buffer: NegotiationBuffer,
    facing: CameraFacing,
    // An Accept is waiting on device acquisition.
    pending_accept: bool,
}

impl ActiveCall {
    fn new(session: CallSession) -> Self {
        Self {
            session,
            local_media: None,
            link: None,
            buffer: NegotiationBuffer::new(),
            facing: CameraFacing::User,
            pending_accept: false,
        }
    }

    fn peer(&self) -> String {
        self.session.remote_user.clone()
    }
}

/// The session task. Owns all call state; created once per client.
pub struct SessionManager {
    inbox: mpsc::Receiver<SessionInput>,
    inbox_tx: mpsc::Sender<SessionInput>,
    outbound: mpsc::Sender<ClientMessage>,
    events: Arc<EventBus>,
    devices: Arc<dyn MediaDevices>,
    connector: Arc<dyn PeerConnector>,
    presence: PresenceDirectory,
    local_user: String,
    ring_timeout: Duration,
    call: Option<ActiveCall>,
    // Durable record of the latest unanswered incoming call. Lets Accept
    // reconstruct the session when the live one was torn down underneath it.
    last_incoming: Option<IncomingCallRecord>,
    next_epoch: u64,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_user: impl Into<String>,
        outbound: mpsc::Sender<ClientMessage>,
        events: Arc<EventBus>,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
        presence: PresenceDirectory,
        ring_timeout: Duration,
    ) -> (Self, CallApi) {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let api = CallApi {
            tx: inbox_tx.clone(),
        };
        let manager = Self {
            inbox,
            inbox_tx,
            outbound,
            events,
            devices,
            connector,
            presence,
            local_user: local_user.into(),
            ring_timeout,
            call: None,
            last_incoming: None,
            next_epoch: 1,
        };
        (manager, api)
    }

    pub async fn run(mut self) {
        while let Some(input) = self.inbox.recv().await {
            self.handle(input).await;
        }
        debug!("Session inbox closed, call task shutting down");
    }

    async fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Command(command) => self.handle_command(command).await,
            SessionInput::Signal(signal) => self.handle_signal(signal).await,
            SessionInput::MediaReady {
                epoch,
                purpose,
                result,
            } => self.handle_media_ready(epoch, purpose, result).await,
            SessionInput::VideoTrackReady {
                epoch,
                facing,
                result,
            } => self.handle_video_track_ready(epoch, facing, result).await,
            SessionInput::Peer { epoch, event } => self.handle_peer_event(epoch, event).await,
            SessionInput::RingTimeout { epoch } => self.handle_ring_timeout(epoch).await,
            SessionInput::TransportDown => self.handle_transport_down().await,
        }
    }

    async fn handle_command(&mut self, command: CallCommand) {
        match command {
            CallCommand::Initiate { peer, call_type } => self.handle_initiate(peer, call_type).await,
            CallCommand::Accept => self.handle_accept().await,
            CallCommand::Reject => self.handle_reject().await,
            CallCommand::Cancel => self.handle_cancel().await,
            CallCommand::HangUp => self.handle_hang_up().await,
            CallCommand::SetMuted(muted) => self.handle_set_muted(muted).await,
            CallCommand::SetCameraOn(on) => self.handle_set_camera_on(on).await,
            CallCommand::SwitchCamera => self.handle_switch_camera(),
        }
    }

    async fn handle_initiate(&mut self, peer: String, call_type: CallType) {
        if let Some(call) = &self.call {
            self.emit_error(CallError::AlreadyInCall(call.peer()));
            return;
        }
        if !self.presence.is_online(&peer).await {
            self.emit_error(CallError::PeerOffline(peer));
            return;
        }
        let epoch = self.bump_epoch();
        let session = CallSession::new_outgoing(&self.local_user, &peer, call_type, epoch);
        let call = ActiveCall::new(session);
        self.emit_snapshot(&call);
        self.call = Some(call);
        info!("Starting {call_type} call to {peer}");
        // Devices first. Nothing goes on the wire until capture succeeds.
        self.spawn_acquire(epoch, call_type, MediaPurpose::Initiate);
    }

    async fn handle_accept(&mut self) {
        match &mut self.call {
            Some(call) => {
                if call.pending_accept || !call.session.state.can_accept() {
                    debug!(
                        "Ignoring accept in state {:?} (pending={})",
                        call.session.state, call.pending_accept
                    );
                    return;
                }
                call.pending_accept = true;
                let epoch = call.session.epoch;
                let call_type = call.session.call_type;
                self.consume_incoming_record();
                self.spawn_acquire(epoch, call_type, MediaPurpose::Accept);
            }
            None => {
                // The live session may have been torn down (for instance by a
                // transport drop) while the user was still looking at the
                // ring screen. Rebuild it from the durable record.
                let Some(record) = self.last_incoming.take() else {
                    self.emit_error(CallError::UnknownSession(
                        "no incoming call to accept".into(),
                    ));
                    return;
                };
                info!("Accepting call from {} via incoming-call record", record.from);
                let epoch = self.bump_epoch();
                let session =
                    CallSession::new_incoming(&self.local_user, &record.from, record.call_type, epoch);
                let mut call = ActiveCall::new(session);
                call.pending_accept = true;
                self.emit_snapshot(&call);
                self.call = Some(call);
                self.spawn_acquire(epoch, record.call_type, MediaPurpose::Accept);
            }
        }
    }

    async fn handle_reject(&mut self) {
        if let Some(call) = &self.call {
            if call.session.state != CallState::RingingIn {
                debug!("Ignoring reject in state {:?}", call.session.state);
                return;
            }
            let peer = call.peer();
            self.consume_incoming_record();
            self.send_wire(ClientMessage::CallReject {
                to: peer,
                reason: None,
            })
            .await;
            self.teardown(EndReason::LocalDeclined).await;
        } else if let Some(record) = self.last_incoming.take() {
            // Session already gone; still tell the caller no.
            self.send_wire(ClientMessage::CallReject {
                to: record.from,
                reason: None,
            })
            .await;
        }
    }

    async fn handle_cancel(&mut self) {
        let Some(call) = &self.call else { return };
        if call.session.state != CallState::RingingOut {
            debug!("Ignoring cancel in state {:?}", call.session.state);
            return;
        }
        let peer = call.peer();
        self.send_wire(ClientMessage::CallCancel { to: peer }).await;
        self.teardown(EndReason::LocalCancelled).await;
    }

    async fn handle_hang_up(&mut self) {
        let Some(call) = &self.call else { return };
        let peer = call.peer();
        // Hanging up while it still rings means cancel or decline.
        match call.session.state {
            CallState::RingingOut => {
                self.send_wire(ClientMessage::CallCancel { to: peer }).await;
                self.teardown(EndReason::LocalCancelled).await;
            }
            CallState::RingingIn => {
                self.consume_incoming_record();
                self.send_wire(ClientMessage::CallReject {
                    to: peer,
                    reason: None,
                })
                .await;
                self.teardown(EndReason::LocalDeclined).await;
            }
            _ => {
                self.send_wire(ClientMessage::CallEnd { to: peer }).await;
                self.teardown(EndReason::LocalHangup).await;
            }
        }
    }

    async fn handle_set_muted(&mut self, muted: bool) {
        let Some(call) = &mut self.call else { return };
        call.session.audio_muted = muted;
        // Before media exists the flag is remembered and applied at accept.
        if let Some(media) = &call.local_media {
            media.set_audio_enabled(!muted);
        }
        let snapshot = call.session.snapshot();
        self.emit_state(Some(snapshot));
    }

    async fn handle_set_camera_on(&mut self, on: bool) {
        let Some(call) = &mut self.call else { return };
        if !call.session.call_type.is_video() {
            return;
        }
        call.session.camera_on = on;
        if let Some(media) = &call.local_media {
            media.set_video_enabled(on);
        }
        let snapshot = call.session.snapshot();
        self.emit_state(Some(snapshot));
    }

    fn handle_switch_camera(&mut self) {
        let Some(call) = &self.call else { return };
        if !call.session.call_type.is_video() || call.link.is_none() {
            debug!("Ignoring camera switch, no video link up");
            return;
        }
        let facing = call.facing.flipped();
        let epoch = call.session.epoch;
        let devices = self.devices.clone();
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = devices.acquire_video(facing).await;
            let _ = tx
                .send(SessionInput::VideoTrackReady {
                    epoch,
                    facing,
                    result,
                })
                .await;
        });
    }

    async fn handle_signal(&mut self, signal: CallSignal) {
        match signal {
            CallSignal::Incoming { from, call_type } => {
                self.handle_incoming(from, call_type).await
            }
            CallSignal::Accepted { from } => self.handle_accepted(from).await,
            CallSignal::Rejected { from, reason } => self.handle_rejected(from, reason).await,
            CallSignal::Cancelled { from } => self.handle_cancelled(from).await,
            CallSignal::Ended { from } => self.handle_ended(from).await,
            CallSignal::Offer { from, offer } => self.handle_offer(from, offer).await,
            CallSignal::Answer { from, answer } => self.handle_answer(from, answer).await,
            CallSignal::Candidate { from, candidate } => {
                self.handle_candidate(from, candidate).await
            }
        }
    }

    async fn handle_incoming(&mut self, from: String, call_type: CallType) {
        if self.call.is_some() {
            // Busy: auto-decline without disturbing the current call.
            info!("Auto-rejecting call from {from}, already in a call");
            self.send_wire(ClientMessage::CallReject {
                to: from,
                reason: Some("busy".to_string()),
            })
            .await;
            return;
        }
        let epoch = self.bump_epoch();
        let session = CallSession::new_incoming(&self.local_user, &from, call_type, epoch);
        let call = ActiveCall::new(session);
        self.last_incoming = Some(IncomingCallRecord::new(&from, call_type));
        let _ = self.events.incoming_call.send(Arc::new(IncomingCall {
            from: from.clone(),
            call_type,
        }));
        self.emit_snapshot(&call);
        self.call = Some(call);
        info!("Incoming {call_type} call from {from}");
    }

    async fn handle_accepted(&mut self, from: String) {
        let Some(mut call) = self.call.take() else {
            debug!("call_accepted from {from} with no session");
            return;
        };
        if !call.session.is_party(&from) || call.session.state != CallState::RingingOut {
            debug!(
                "Ignoring call_accepted from {from} in state {:?}",
                call.session.state
            );
            self.call = Some(call);
            return;
        }
        let Some(media) = call.local_media.clone() else {
            warn!("call_accepted before local media was ready, dropping");
            self.call = Some(call);
            return;
        };
        if let Err(e) = call.session.apply(CallTransition::RemoteAccepted) {
            warn!("{e}");
            self.call = Some(call);
            return;
        }

        let sink = self.sink(call.session.epoch);
        let link = match MediaPeerLink::open(
            self.connector.as_ref(),
            &media,
            call.session.call_type,
            sink,
        )
        .await
        {
            Ok(link) => link,
            Err(e) => {
                self.emit_error(e);
                self.send_wire(ClientMessage::CallEnd { to: from }).await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
                return;
            }
        };
        let offer = match link.produce_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                link.close().await;
                self.emit_error(CallError::NegotiationFailed(e.to_string()));
                self.send_wire(ClientMessage::CallEnd { to: from }).await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
                return;
            }
        };
        call.link = Some(link);
        self.send_wire(ClientMessage::WebrtcOffer { to: from, offer })
            .await;
        self.emit_snapshot(&call);
        self.call = Some(call);
    }

    async fn handle_rejected(&mut self, from: String, reason: Option<String>) {
        let Some(call) = &self.call else { return };
        if !call.session.is_party(&from) || call.session.state != CallState::RingingOut {
            debug!("Ignoring call_rejected from {from}");
            return;
        }
        info!(
            "Call declined by {from}{}",
            reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
        );
        self.teardown(EndReason::RemoteDeclined { reason }).await;
    }

    async fn handle_cancelled(&mut self, from: String) {
        if self
            .last_incoming
            .as_ref()
            .is_some_and(|r| r.from == from)
        {
            self.last_incoming = None;
        }
        let Some(call) = &self.call else { return };
        if !call.session.is_party(&from)
            || call.session.state == CallState::RingingOut
            || call.session.state == CallState::Active
        {
            debug!("Ignoring call_cancelled from {from}");
            return;
        }
        self.teardown(EndReason::RemoteCancelled).await;
    }

    async fn handle_ended(&mut self, from: String) {
        if self
            .last_incoming
            .as_ref()
            .is_some_and(|r| r.from == from)
        {
            self.last_incoming = None;
        }
        let Some(call) = &self.call else {
            debug!("call_end from {from} with no session");
            return;
        };
        if !call.session.is_party(&from) {
            debug!("Ignoring call_end from non-party {from}");
            return;
        }
        self.teardown(EndReason::RemoteHangup).await;
    }

    async fn handle_offer(&mut self, from: String, offer: SessionDescription) {
        let Some(mut call) = self.call.take() else {
            debug!("Discarding offer from {from}, no session");
            return;
        };
        if !call.session.is_party(&from) {
            debug!("Discarding offer from non-party {from}");
            self.call = Some(call);
            return;
        }
        if call.link.is_some() {
            // Accept already went through; negotiate right away.
            if let Err(e) = self.apply_offer_and_answer(&mut call, offer).await {
                self.emit_error(CallError::NegotiationFailed(e.to_string()));
                self.send_wire(ClientMessage::CallEnd { to: from }).await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
                return;
            }
        } else {
            call.buffer.store_offer(&from, offer);
        }
        self.call = Some(call);
    }

    async fn handle_answer(&mut self, from: String, answer: SessionDescription) {
        let Some(mut call) = self.call.take() else {
            debug!("Discarding answer from {from}, no session");
            return;
        };
        if !call.session.is_party(&from) || call.link.is_none() {
            debug!("Discarding unexpected answer from {from}");
            self.call = Some(call);
            return;
        }
        if let Err(e) = Self::apply_remote_description(&mut call, answer).await {
            self.emit_error(CallError::NegotiationFailed(e.to_string()));
            self.send_wire(ClientMessage::CallEnd { to: from }).await;
            self.teardown_call(call, EndReason::ConnectionFailed).await;
            return;
        }
        self.call = Some(call);
    }

    async fn handle_candidate(&mut self, from: String, candidate: IceCandidate) {
        let Some(call) = &mut self.call else {
            debug!("Discarding candidate from {from}, no session");
            return;
        };
        if !call.session.is_party(&from) {
            debug!("Discarding candidate from non-party {from}");
            return;
        }
        match call.buffer.defer_or_pass(candidate) {
            None => {}
            Some(candidate) => {
                if let Some(link) = &call.link {
                    if let Err(e) = link.apply_candidate(candidate).await {
                        warn!("Dropping ICE candidate from {from}: {e}");
                    }
                } else {
                    debug!("Dropping candidate from {from}, link already gone");
                }
            }
        }
    }

    async fn handle_media_ready(
        &mut self,
        epoch: u64,
        purpose: MediaPurpose,
        result: Result<LocalMedia, CallError>,
    ) {
        let current = self.call.as_ref().map(|c| c.session.epoch);
        if current != Some(epoch) {
            // The call this acquisition belonged to is gone. Make sure the
            // devices it grabbed are not leaked.
            if let Ok(media) = result {
                debug!("Releasing media acquired for a finished call");
                media.stop_all();
            }
            return;
        }
        match purpose {
            MediaPurpose::Initiate => self.finish_initiate(result).await,
            MediaPurpose::Accept => self.finish_accept(result).await,
        }
    }

    async fn finish_initiate(&mut self, result: Result<LocalMedia, CallError>) {
        let Some(mut call) = self.call.take() else { return };
        match result {
            Ok(media) => {
                call.local_media = Some(media);
                let peer = call.peer();
                let call_type = call.session.call_type;
                let epoch = call.session.epoch;
                self.call = Some(call);
                self.send_wire(ClientMessage::CallInitiate {
                    to: peer,
                    call_type,
                })
                .await;
                self.spawn_ring_timer(epoch);
            }
            Err(e) => {
                // Nothing went on the wire yet, so nothing to signal.
                self.emit_error(e);
                self.teardown_call(call, EndReason::DeviceFailed).await;
            }
        }
    }

    async fn finish_accept(&mut self, result: Result<LocalMedia, CallError>) {
        let Some(mut call) = self.call.take() else { return };
        let peer = call.peer();
        let media = match result {
            Ok(media) => media,
            Err(e) => {
                self.emit_error(e);
                self.send_wire(ClientMessage::CallReject {
                    to: peer,
                    reason: None,
                })
                .await;
                self.teardown_call(call, EndReason::DeviceFailed).await;
                return;
            }
        };
        // Flags toggled while it was still ringing apply now.
        media.set_audio_enabled(!call.session.audio_muted);
        media.set_video_enabled(call.session.camera_on);
        call.local_media = Some(media.clone());

        if let Err(e) = call.session.apply(CallTransition::LocalAccepted) {
            warn!("{e}");
            self.call = Some(call);
            return;
        }

        let sink = self.sink(call.session.epoch);
        match MediaPeerLink::open(
            self.connector.as_ref(),
            &media,
            call.session.call_type,
            sink,
        )
        .await
        {
            Ok(link) => call.link = Some(link),
            Err(e) => {
                self.emit_error(e);
                self.send_wire(ClientMessage::CallReject {
                    to: peer,
                    reason: None,
                })
                .await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
                return;
            }
        }

        // Process the offer that arrived while ringing, if any. The answer
        // goes out before call_accept so the caller never sees an accept it
        // cannot negotiate against.
        if let Some((_, offer)) = call.buffer.take_offer() {
            if let Err(e) = self.apply_offer_and_answer(&mut call, offer).await {
                self.emit_error(CallError::NegotiationFailed(e.to_string()));
                self.send_wire(ClientMessage::CallReject {
                    to: peer,
                    reason: None,
                })
                .await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
                return;
            }
        }

        call.pending_accept = false;
        self.send_wire(ClientMessage::CallAccept { to: peer }).await;
        self.emit_snapshot(&call);
        self.call = Some(call);
    }

    async fn handle_video_track_ready(
        &mut self,
        epoch: u64,
        facing: CameraFacing,
        result: Result<LocalTrack, CallError>,
    ) {
        let current = self.call.as_ref().map(|c| c.session.epoch);
        if current != Some(epoch) {
            if let Ok(track) = result {
                track.stop();
            }
            return;
        }
        let track = match result {
            Ok(track) => track,
            Err(e) => {
                self.emit_error(e);
                return;
            }
        };
        let Some(mut call) = self.call.take() else { return };
        let Some(link) = &call.link else {
            track.stop();
            self.call = Some(call);
            return;
        };
        track.set_enabled(call.session.camera_on);
        match link.replace_video_track(track.clone()).await {
            Ok(()) => {
                if let Some(media) = &mut call.local_media {
                    if let Some(old) = media.video.replace(track) {
                        old.stop();
                    }
                }
                call.facing = facing;
                debug!("Camera switched to {facing:?}");
                self.call = Some(call);
            }
            Err(CallError::Unsupported(_)) => {
                // Track replacement is not available; restart the call with
                // the new camera instead.
                info!("In-place camera switch unsupported, restarting call");
                track.stop();
                let peer = call.peer();
                let call_type = call.session.call_type;
                self.send_wire(ClientMessage::CallEnd { to: peer.clone() })
                    .await;
                self.teardown_call(call, EndReason::Restarting).await;
                self.handle_initiate(peer, call_type).await;
            }
            Err(e) => {
                track.stop();
                self.emit_error(e);
                self.call = Some(call);
            }
        }
    }

    async fn handle_peer_event(&mut self, epoch: u64, event: PeerEvent) {
        let current = self.call.as_ref().map(|c| c.session.epoch);
        if current != Some(epoch) {
            debug!("Dropping stale peer event: {event:?}");
            return;
        }
        match event {
            PeerEvent::IceCandidate(candidate) => {
                let peer = self.call.as_ref().map(|c| c.peer()).unwrap_or_default();
                self.send_wire(ClientMessage::IceCandidate {
                    to: peer,
                    candidate,
                })
                .await;
            }
            PeerEvent::ConnectionState(state) => self.handle_peer_state(state).await,
            PeerEvent::RemoteTrack(track) => {
                let Some(call) = &mut self.call else { return };
                let Some(link) = &mut call.link else { return };
                if let Some(status) = link.note_remote_track(track) {
                    let _ = self
                        .events
                        .remote_media
                        .send(Arc::new(RemoteMediaChanged { status }));
                }
            }
        }
    }

    async fn handle_peer_state(&mut self, state: PeerConnectionState) {
        match state {
            PeerConnectionState::Connected => {
                let Some(call) = &mut self.call else { return };
                if call.session.state != CallState::Negotiating {
                    return;
                }
                if let Err(e) = call.session.apply(CallTransition::MediaConnected) {
                    warn!("{e}");
                    return;
                }
                let snapshot = call.session.snapshot();
                info!("Call with {} is live", call.session.remote_user);
                self.emit_state(Some(snapshot));
            }
            PeerConnectionState::Failed | PeerConnectionState::Disconnected => {
                let Some(call) = self.call.take() else { return };
                let peer = call.peer();
                self.emit_error(CallError::NegotiationFailed(format!(
                    "peer connection {state:?}"
                )));
                self.send_wire(ClientMessage::CallEnd { to: peer }).await;
                self.teardown_call(call, EndReason::ConnectionFailed).await;
            }
            PeerConnectionState::New
            | PeerConnectionState::Connecting
            | PeerConnectionState::Closed => {
                debug!("Peer connection state: {state:?}");
            }
        }
    }

    async fn handle_ring_timeout(&mut self, epoch: u64) {
        let Some(call) = &self.call else { return };
        if call.session.epoch != epoch || call.session.state != CallState::RingingOut {
            return;
        }
        let peer = call.peer();
        info!("Call to {peer} timed out unanswered");
        self.send_wire(ClientMessage::CallCancel { to: peer }).await;
        self.teardown(EndReason::NoAnswer).await;
    }

    async fn handle_transport_down(&mut self) {
        if self.call.is_none() {
            return;
        }
        // The peer cannot be told anything; the record of an unanswered
        // incoming call survives so an accept can still rebuild it after
        // the socket comes back.
        self.emit_error(CallError::TransportLost);
        self.teardown(EndReason::TransportLost).await;
    }

    async fn apply_offer_and_answer(
        &self,
        call: &mut ActiveCall,
        offer: SessionDescription,
    ) -> Result<(), CallError> {
        Self::apply_remote_description(call, offer).await?;
        let link = call.link.as_ref().ok_or(CallError::TransportLost)?;
        let answer = link.produce_answer().await?;
        self.send_wire(ClientMessage::WebrtcAnswer {
            to: call.peer(),
            answer,
        })
        .await;
        Ok(())
    }

    /// Apply a remote description and flush every queued candidate, in
    /// arrival order. A candidate the primitive rejects is logged and
    /// dropped; it does not abort the call.
    async fn apply_remote_description(
        call: &mut ActiveCall,
        desc: SessionDescription,
    ) -> Result<(), CallError> {
        let link = call.link.as_ref().ok_or(CallError::TransportLost)?;
        link.apply_remote_description(desc).await?;
        for candidate in call.buffer.drain_candidates() {
            if let Err(e) = link.apply_candidate(candidate).await {
                warn!("Dropping queued ICE candidate: {e}");
            }
        }
        Ok(())
    }

    async fn teardown(&mut self, reason: EndReason) {
        if let Some(call) = self.call.take() {
            self.teardown_call(call, reason).await;
        }
    }

    async fn teardown_call(&mut self, call: ActiveCall, reason: EndReason) {
        if let Some(media) = &call.local_media {
            media.stop_all();
        }
        if let Some(link) = &call.link {
            link.close().await;
        }
        let duration_secs = call.session.elapsed_seconds();
        info!(
            "Call with {} ended: {reason:?}",
            call.session.remote_user
        );
        let _ = self.events.call_ended.send(Arc::new(CallEnded {
            peer: call.session.remote_user,
            reason,
            duration_secs,
        }));
        self.emit_state(None);
    }

    fn consume_incoming_record(&mut self) {
        if let (Some(call), Some(record)) = (&self.call, &self.last_incoming) {
            if call.session.remote_user == record.from {
                self.last_incoming = None;
            }
        }
    }

    fn spawn_acquire(&self, epoch: u64, call_type: CallType, purpose: MediaPurpose) {
        let devices = self.devices.clone();
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = devices.acquire(call_type).await;
            let _ = tx
                .send(SessionInput::MediaReady {
                    epoch,
                    purpose,
                    result,
                })
                .await;
        });
    }

    fn spawn_ring_timer(&self, epoch: u64) {
        let tx = self.inbox_tx.clone();
        let timeout = self.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(SessionInput::RingTimeout { epoch }).await;
        });
    }

    fn sink(&self, epoch: u64) -> PeerEventSink {
        PeerEventSink {
            epoch,
            tx: self.inbox_tx.clone(),
        }
    }

    fn bump_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    async fn send_wire(&self, message: ClientMessage) {
        if self.outbound.send(message).await.is_err() {
            warn!("Outbound signaling channel closed, message dropped");
        }
    }

    fn emit_snapshot(&self, call: &ActiveCall) {
        self.emit_state(Some(call.session.snapshot()));
    }

    fn emit_state(&self, snapshot: Option<crate::calls::state::CallSnapshot>) {
        let _ = self
            .events
            .call_state
            .send(Arc::new(CallStateChanged { snapshot }));
    }

    fn emit_error(&self, error: CallError) {
        warn!("Call error: {error}");
        let _ = self
            .events
            .call_error
            .send(Arc::new(CallErrorEvent { error }));
    }
}
