//! Stable rejection reasons and their counters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a control packet was refused. The names are stable and show up
/// in logs as the `reason` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    PacketTooLarge,
    IngressBackpressure,
    MalformedEnvelope,
    UnexpectedSender,
    InvalidTimestamp,
    PayloadTooLarge,
    Replayed,
    MalformedPayload,
    UnsupportedType,
    OutboundPayloadTooLarge,
}

impl RejectReason {
    pub const ALL: [RejectReason; 10] = [
        Self::PacketTooLarge,
        Self::IngressBackpressure,
        Self::MalformedEnvelope,
        Self::UnexpectedSender,
        Self::InvalidTimestamp,
        Self::PayloadTooLarge,
        Self::Replayed,
        Self::MalformedPayload,
        Self::UnsupportedType,
        Self::OutboundPayloadTooLarge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PacketTooLarge => "PACKET_TOO_LARGE",
            Self::IngressBackpressure => "INGRESS_BACKPRESSURE",
            Self::MalformedEnvelope => "MALFORMED_ENVELOPE",
            Self::UnexpectedSender => "UNEXPECTED_SENDER",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::Replayed => "REPLAYED",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::OutboundPayloadTooLarge => "OUTBOUND_PAYLOAD_TOO_LARGE",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter per reason.
#[derive(Debug, Default)]
pub(crate) struct RejectTally {
    counts: [AtomicU64; RejectReason::ALL.len()],
}

impl RejectTally {
    pub(crate) fn increment(&self, reason: RejectReason) {
        self.counts[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Reasons seen at least once, with their counts.
    pub(crate) fn snapshot(&self) -> BTreeMap<RejectReason, u64> {
        RejectReason::ALL
            .into_iter()
            .filter_map(|reason| {
                let count = self.counts[reason.index()].load(Ordering::Relaxed);
                (count > 0).then_some((reason, count))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lists_only_seen_reasons() {
        let tally = RejectTally::default();
        tally.increment(RejectReason::Replayed);
        tally.increment(RejectReason::Replayed);
        tally.increment(RejectReason::UnexpectedSender);

        let snapshot = tally.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&RejectReason::Replayed], 2);
        assert_eq!(snapshot[&RejectReason::UnexpectedSender], 1);
    }

    #[test]
    fn test_all_indices_are_distinct() {
        for (i, reason) in RejectReason::ALL.into_iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }

    #[test]
    fn test_as_str_is_screaming_snake() {
        assert_eq!(RejectReason::IngressBackpressure.to_string(), "INGRESS_BACKPRESSURE");
    }
}
