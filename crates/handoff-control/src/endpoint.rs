//! Admission and sending logic shared by both sides of the control plane.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use handoff_guard::{Clock, InFlightLease, InFlightLimiter, ReplayConfig, ReplayProtector};
use handoff_transport::Messaging;
use handoff_wire::{ControlEnvelope, ControlMessageType, NONCE_SIZE};
use rand::RngCore;

use crate::reject::RejectTally;
use crate::{CONTROL_CHANNEL, ControlError, ControlPlaneConfig, RejectReason};

/// Which sender ids an endpoint accepts envelopes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderPolicy {
    /// Any id in the set. An empty set accepts every sender.
    AnyOf(HashSet<String>),
    /// Exactly this id.
    Exactly(String),
}

impl SenderPolicy {
    pub fn any() -> Self {
        Self::AnyOf(HashSet::new())
    }

    pub fn allows(&self, sender_id: &str) -> bool {
        match self {
            Self::AnyOf(allowed) => allowed.is_empty() || allowed.contains(sender_id),
            Self::Exactly(expected) => expected == sender_id,
        }
    }
}

type ReplayKey = (String, ControlMessageType, [u8; NONCE_SIZE]);

/// A packet that passed every admission step. Holds its in-flight slot
/// until dropped.
pub(crate) struct Admitted {
    pub(crate) envelope: ControlEnvelope,
    pub(crate) correlation_id: String,
    _lease: InFlightLease,
}

pub(crate) struct ControlEndpoint {
    config: ControlPlaneConfig,
    messaging: Arc<dyn Messaging>,
    senders: SenderPolicy,
    limiter: InFlightLimiter,
    replay: ReplayProtector<ReplayKey>,
    rejects: RejectTally,
    clock: Arc<dyn Clock>,
    /// "proxy" or "backend", for logs.
    side: &'static str,
}

impl ControlEndpoint {
    pub(crate) fn new(
        config: ControlPlaneConfig,
        messaging: Arc<dyn Messaging>,
        senders: SenderPolicy,
        clock: Arc<dyn Clock>,
        side: &'static str,
    ) -> Self {
        let replay = ReplayConfig {
            window_millis: config.replay_window_millis,
            max_entries: config.replay_max_entries,
        }
        .validated();
        Self {
            limiter: InFlightLimiter::new(config.max_in_flight),
            replay: ReplayProtector::new(replay, Arc::clone(&clock)),
            rejects: RejectTally::default(),
            config,
            messaging,
            senders,
            clock,
            side,
        }
    }

    pub(crate) fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub(crate) fn messaging(&self) -> &Arc<dyn Messaging> {
        &self.messaging
    }

    pub(crate) fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub(crate) fn reject_snapshot(&self) -> BTreeMap<RejectReason, u64> {
        self.rejects.snapshot()
    }

    /// Runs the admission steps in order. `None` means the packet was
    /// rejected; the reason is already tallied and logged.
    pub(crate) fn admit(&self, packet: &[u8]) -> Option<Admitted> {
        let max = self.config.max_payload_bytes;
        if packet.len() > max {
            self.reject(
                RejectReason::PacketTooLarge,
                &format!("packet of {} bytes exceeds {max}", packet.len()),
                None,
            );
            return None;
        }

        let Ok(lease) = self.limiter.try_acquire() else {
            self.reject(
                RejectReason::IngressBackpressure,
                &format!("{} packets already in flight", self.limiter.limit()),
                None,
            );
            return None;
        };

        let Some(envelope) = ControlEnvelope::decode(packet) else {
            self.reject(RejectReason::MalformedEnvelope, "envelope did not decode", None);
            return None;
        };
        let correlation_id = correlation_id(&envelope);

        if !self.senders.allows(&envelope.sender_id) {
            self.reject(
                RejectReason::UnexpectedSender,
                &format!("sender {:?} is not allowed", envelope.sender_id),
                Some(&correlation_id),
            );
            return None;
        }

        if !envelope.is_timestamp_valid(self.clock.now_millis(), self.config.max_clock_skew_millis) {
            self.reject(
                RejectReason::InvalidTimestamp,
                "outside the issued-at/ttl window",
                Some(&correlation_id),
            );
            return None;
        }

        if envelope.payload.len() > max {
            self.reject(
                RejectReason::PayloadTooLarge,
                &format!("payload of {} bytes exceeds {max}", envelope.payload.len()),
                Some(&correlation_id),
            );
            return None;
        }

        let key = (envelope.sender_id.clone(), envelope.message_type, envelope.nonce);
        if !self.replay.try_register(key) {
            self.reject(
                RejectReason::Replayed,
                &format!("{} from {} seen before", envelope.message_type, envelope.sender_id),
                Some(&correlation_id),
            );
            return None;
        }

        Some(Admitted {
            envelope,
            correlation_id,
            _lease: lease,
        })
    }

    pub(crate) fn reject(&self, reason: RejectReason, details: &str, correlation_id: Option<&str>) {
        self.rejects.increment(reason);
        tracing::warn!(
            side = self.side,
            %reason,
            correlation_id = correlation_id.unwrap_or("-"),
            details,
            "control packet rejected"
        );
    }

    /// Wraps `payload` in a fresh envelope and sends it on the control
    /// channel.
    pub(crate) fn send(&self, message_type: ControlMessageType, payload: Vec<u8>) -> Result<(), ControlError> {
        let max = self.config.max_payload_bytes;
        if payload.len() > max {
            self.reject(
                RejectReason::OutboundPayloadTooLarge,
                &format!("{message_type} payload of {} bytes", payload.len()),
                None,
            );
            return Err(ControlError::OutboundPayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);
        let envelope = ControlEnvelope::new(
            message_type,
            self.config.sender_id.clone(),
            self.clock.now_millis(),
            self.config.ttl_millis,
            nonce,
            payload,
        );
        let bytes = envelope.encode()?;
        self.messaging.send(CONTROL_CHANNEL, &bytes)?;
        tracing::trace!(side = self.side, %message_type, correlation_id = %correlation_id(&envelope), "control envelope sent");
        Ok(())
    }
}

/// `sender:base64url(nonce)`, the id that ties log lines for one
/// envelope together.
pub(crate) fn correlation_id(envelope: &ControlEnvelope) -> String {
    format!("{}:{}", envelope.sender_id, URL_SAFE_NO_PAD.encode(envelope.nonce))
}
