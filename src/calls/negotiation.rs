//! Holding area for negotiation payloads that arrive before the peer link
//! can take them.
//!
//! Offers, answers and ICE candidates travel the relay independently of when
//! the local peer link becomes ready (device acquisition is asynchronous),
//! so arrival order and readiness order need not line up. The buffer parks
//! an early offer and queues early candidates, then gets out of the way:
//! once the remote description is applied the candidate queue is drained
//! exactly once, in arrival order, and every later candidate passes straight
//! through.

use crate::protocol::{IceCandidate, SessionDescription};
use log::{debug, warn};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct NegotiationBuffer {
    pending_offer: Option<(String, SessionDescription)>,
    pending_candidates: VecDeque<IceCandidate>,
    drained: bool,
}

impl NegotiationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an offer until the peer link exists. Only one offer is held; a
    /// second distinct offer for the same session replaces the first, loudly,
    /// since the newer description supersedes the older one.
    pub fn store_offer(&mut self, from: impl Into<String>, offer: SessionDescription) {
        let from = from.into();
        if let Some((prev_from, prev)) = &self.pending_offer {
            if *prev == offer {
                debug!("Ignoring duplicate pending offer from {prev_from}");
                return;
            }
            warn!("Replacing pending offer from {prev_from} with newer offer from {from}");
        }
        self.pending_offer = Some((from, offer));
    }

    /// Take the parked offer, if any. The slot is left empty.
    pub fn take_offer(&mut self) -> Option<(String, SessionDescription)> {
        self.pending_offer.take()
    }

    pub fn has_pending_offer(&self) -> bool {
        self.pending_offer.is_some()
    }

    /// Route a candidate: queued while the remote description is not yet
    /// applied, handed back for immediate application afterwards.
    pub fn defer_or_pass(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.drained {
            Some(candidate)
        } else {
            self.pending_candidates.push_back(candidate);
            None
        }
    }

    /// Drain the queue in arrival order and switch to immediate mode. Safe
    /// to call more than once; only the first call yields anything.
    pub fn drain_candidates(&mut self) -> Vec<IceCandidate> {
        self.drained = true;
        self.pending_candidates.drain(..).collect()
    }

    pub fn queued_candidates(&self) -> usize {
        self.pending_candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 1 192.0.2.{n} 4000 typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn candidates_drain_in_arrival_order() {
        let mut buffer = NegotiationBuffer::new();
        for n in 0..5 {
            assert!(buffer.defer_or_pass(candidate(n)).is_none());
        }
        let drained = buffer.drain_candidates();
        let expected: Vec<IceCandidate> = (0..5).map(candidate).collect();
        assert_eq!(drained, expected);
    }

    #[test]
    fn drain_happens_exactly_once_then_candidates_pass_through() {
        let mut buffer = NegotiationBuffer::new();
        buffer.defer_or_pass(candidate(1));
        assert_eq!(buffer.drain_candidates().len(), 1);
        assert!(buffer.drain_candidates().is_empty());

        // Immediate mode: nothing is queued anymore.
        assert_eq!(buffer.defer_or_pass(candidate(2)), Some(candidate(2)));
        assert_eq!(buffer.queued_candidates(), 0);
    }

    #[test]
    fn second_distinct_offer_replaces_the_first() {
        let mut buffer = NegotiationBuffer::new();
        buffer.store_offer("ana", SessionDescription::offer("v=0 first"));
        buffer.store_offer("ana", SessionDescription::offer("v=0 second"));

        let (from, offer) = buffer.take_offer().unwrap();
        assert_eq!(from, "ana");
        assert_eq!(offer.sdp, "v=0 second");
        assert!(!buffer.has_pending_offer());
    }

    #[test]
    fn duplicate_offer_is_ignored() {
        let mut buffer = NegotiationBuffer::new();
        buffer.store_offer("ana", SessionDescription::offer("v=0 same"));
        buffer.store_offer("ana", SessionDescription::offer("v=0 same"));
        assert!(buffer.take_offer().is_some());
        assert!(buffer.take_offer().is_none());
    }
}
