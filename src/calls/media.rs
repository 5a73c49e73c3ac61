//! Peer-link adapter and the seams to the platform media primitives.
//!
//! The platform owns permission prompts and the actual peer-connection
//! object; this module talks to both through traits so the orchestration
//! logic never touches a real device. Local capture tracks are attached at
//! link creation; mute is a local track-enable toggle and never renegotiates;
//! camera switching replaces the outgoing track in place when the primitive
//! supports it.

use crate::calls::error::CallError;
use crate::protocol::{IceCandidate, SessionDescription};
use crate::types::call::{CallType, CameraFacing, RemoteMediaStatus, TrackKind};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::session::PeerEventSink;

/// A local capture track handle.
///
/// Clones share state, so a handle kept by a test (or by the renderer for a
/// self-view) observes enable/stop performed through the session.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    inner: Arc<TrackShared>,
}

#[derive(Debug)]
struct TrackShared {
    kind: TrackKind,
    enabled: AtomicBool,
    live: AtomicBool,
}

impl LocalTrack {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            inner: Arc::new(TrackShared {
                kind,
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
            }),
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Release the underlying device. Idempotent.
    pub fn stop(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }
}

/// The capture tracks acquired for one call.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub audio: LocalTrack,
    pub video: Option<LocalTrack>,
}

impl LocalMedia {
    pub fn voice() -> Self {
        Self {
            audio: LocalTrack::new(TrackKind::Audio),
            video: None,
        }
    }

    pub fn video() -> Self {
        Self {
            audio: LocalTrack::new(TrackKind::Audio),
            video: Some(LocalTrack::new(TrackKind::Video)),
        }
    }

    pub fn for_call_type(call_type: CallType) -> Self {
        if call_type.is_video() {
            Self::video()
        } else {
            Self::voice()
        }
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio.set_enabled(enabled);
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(video) = &self.video {
            video.set_enabled(enabled);
        }
    }

    /// Stop every track. Called on all teardown paths.
    pub fn stop_all(&self) {
        self.audio.stop();
        if let Some(video) = &self.video {
            video.stop();
        }
    }

    pub fn live_track_count(&self) -> usize {
        usize::from(self.audio.is_live())
            + self.video.as_ref().map_or(0, |v| usize::from(v.is_live()))
    }
}

/// Platform device access. Permission prompts live behind this seam; the
/// core only ever sees success or a typed failure.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire microphone (and camera for video calls).
    async fn acquire(&self, call_type: CallType) -> Result<LocalMedia, CallError>;

    /// Acquire a fresh video track from the given camera, for in-call
    /// source switching.
    async fn acquire_video(&self, facing: CameraFacing) -> Result<LocalTrack, CallError>;
}

/// Connection-state changes reported by the peer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// A remote inbound track appeared or changed flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackEvent {
    pub kind: TrackKind,
    pub enabled: bool,
    pub muted: bool,
}

/// Events the peer primitive pushes back into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    IceCandidate(IceCandidate),
    ConnectionState(PeerConnectionState),
    RemoteTrack(RemoteTrackEvent),
}

/// The peer-connection primitive. Implemented by the platform layer; the
/// session drives it exclusively through [`MediaPeerLink`].
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), CallError>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), CallError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CallError>;
    /// Swap the outgoing video track without renegotiating. Returns
    /// `Unsupported` when the primitive cannot do this in place.
    async fn replace_video_track(&self, track: LocalTrack) -> Result<(), CallError>;
    async fn close(&self);
}

/// Factory for peer connections, one per call.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create the peer connection with the local tracks attached and event
    /// delivery wired to `events`.
    async fn connect(
        &self,
        media: &LocalMedia,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, CallError>;
}

/// Adapter owning one peer connection for the lifetime of a call.
///
/// Derives the renderer-facing remote-video status from raw track events,
/// since "no track yet" versus "track present but disabled" only exists at
/// this layer. Whether candidates are queued or applied immediately is
/// decided by the negotiation buffer, not here.
pub struct MediaPeerLink {
    pc: Box<dyn PeerConnection>,
    call_type: CallType,
    remote_video: Option<RemoteTrackEvent>,
    last_status: Option<RemoteMediaStatus>,
}

impl MediaPeerLink {
    pub async fn open(
        connector: &dyn PeerConnector,
        media: &LocalMedia,
        call_type: CallType,
        events: PeerEventSink,
    ) -> Result<Self, CallError> {
        let pc = connector.connect(media, events).await?;
        Ok(Self {
            pc,
            call_type,
            remote_video: None,
            last_status: None,
        })
    }

    /// Create an offer and make it the local description.
    pub async fn produce_offer(&self) -> Result<SessionDescription, CallError> {
        let offer = self.pc.create_offer().await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    /// Create an answer and make it the local description.
    pub async fn produce_answer(&self) -> Result<SessionDescription, CallError> {
        let answer = self.pc.create_answer().await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Apply the remote offer or answer. After this succeeds the candidate
    /// queue must be drained and candidate application goes immediate.
    pub async fn apply_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), CallError> {
        self.pc.set_remote_description(desc).await
    }

    pub async fn apply_candidate(&self, candidate: IceCandidate) -> Result<(), CallError> {
        self.pc.add_ice_candidate(candidate).await
    }

    pub async fn replace_video_track(&self, track: LocalTrack) -> Result<(), CallError> {
        self.pc.replace_video_track(track).await
    }

    /// Fold a remote track event into the link's view of the peer's media.
    /// Returns the new renderer-facing status when it changed. Voice calls
    /// have no video status and always return `None`.
    pub fn note_remote_track(&mut self, event: RemoteTrackEvent) -> Option<RemoteMediaStatus> {
        if event.kind == TrackKind::Video {
            self.remote_video = Some(event.clone());
        }
        if !self.call_type.is_video() {
            return None;
        }
        let status = self.remote_media_status();
        if self.last_status == Some(status) {
            debug!("Remote track event without status change: {event:?}");
            return None;
        }
        self.last_status = Some(status);
        Some(status)
    }

    pub fn remote_media_status(&self) -> RemoteMediaStatus {
        match &self.remote_video {
            None => RemoteMediaStatus::WaitingForVideo,
            Some(track) if !track.enabled || track.muted => RemoteMediaStatus::CameraOff,
            Some(_) => RemoteMediaStatus::Live,
        }
    }

    pub async fn close(&self) {
        self.pc.close().await;
    }
}

impl std::fmt::Debug for MediaPeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPeerLink")
            .field("call_type", &self.call_type)
            .field("remote_video", &self.remote_video)
            .finish()
    }
}

/// Placeholder media stack for headless deployments: every acquisition
/// fails with `Unsupported`, so incoming calls can still ring (and be
/// declined) but never reach negotiation.
pub struct UnsupportedMediaStack;

#[async_trait]
impl MediaDevices for UnsupportedMediaStack {
    async fn acquire(&self, _call_type: CallType) -> Result<LocalMedia, CallError> {
        Err(CallError::Unsupported("no media stack configured".into()))
    }

    async fn acquire_video(&self, _facing: CameraFacing) -> Result<LocalTrack, CallError> {
        Err(CallError::Unsupported("no media stack configured".into()))
    }
}

#[async_trait]
impl PeerConnector for UnsupportedMediaStack {
    async fn connect(
        &self,
        _media: &LocalMedia,
        _events: PeerEventSink,
    ) -> Result<Box<dyn PeerConnection>, CallError> {
        warn!("Peer connection requested without a media stack");
        Err(CallError::Unsupported("no media stack configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopping_media_kills_every_track() {
        let media = LocalMedia::video();
        assert_eq!(media.live_track_count(), 2);
        media.stop_all();
        assert_eq!(media.live_track_count(), 0);

        // Idempotent.
        media.stop_all();
        assert_eq!(media.live_track_count(), 0);
    }

    #[test]
    fn mute_is_an_enable_toggle_not_a_stop() {
        let media = LocalMedia::voice();
        media.set_audio_enabled(false);
        assert!(!media.audio.is_enabled());
        assert!(media.audio.is_live(), "muting must not release the device");
        media.set_audio_enabled(true);
        assert!(media.audio.is_enabled());
    }

    #[test]
    fn clones_share_track_state() {
        let track = LocalTrack::new(TrackKind::Video);
        let observer = track.clone();
        track.stop();
        assert!(!observer.is_live());
    }
}
