//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::BTreeSet;

use hushboard_app::{NetworkStatus, Phase, StatusSnapshot};

use super::{Invariant, InvariantResult, StatusTrace, Violation};

fn each_snapshot(
    trace: &StatusTrace,
    name: &'static str,
    check: impl Fn(&StatusSnapshot) -> Option<String>,
) -> InvariantResult {
    for (index, snapshot) in trace.snapshots().iter().enumerate() {
        if let Some(message) = check(snapshot) {
            let message = format!("snapshot {index}: {message}");
            return Err(Violation { invariant: name, message });
        }
    }
    Ok(())
}

/// Every decrypted message is in the received list.
///
/// A decryption that completes after the list moved on must be dropped, not
/// shown next to messages it does not belong to.
pub struct DecryptedSubsetOfReceived;

impl Invariant for DecryptedSubsetOfReceived {
    fn name(&self) -> &'static str {
        "decrypted_subset_of_received"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        each_snapshot(trace, self.name(), |s| {
            s.decrypted
                .keys()
                .find(|id| !s.received.contains(id))
                .map(|id| format!("message {id} decrypted but received is {:?}", s.received))
        })
    }
}

/// The sent list holds each id at most once.
pub struct SentIdsUnique;

impl Invariant for SentIdsUnique {
    fn name(&self) -> &'static str {
        "sent_ids_unique"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        each_snapshot(trace, self.name(), |s| {
            let unique: BTreeSet<_> = s.sent.iter().collect();
            (unique.len() != s.sent.len()).then(|| format!("duplicate ids in sent {:?}", s.sent))
        })
    }
}

/// An operation is offered only when its guard is clear and the instance is
/// ready.
pub struct FlagsMatchGuards;

impl Invariant for FlagsMatchGuards {
    fn name(&self) -> &'static str {
        "flags_match_guards"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        each_snapshot(trace, self.name(), |s| {
            if s.can_send_message && s.is_sending {
                return Some("can_send_message while sending".to_string());
            }
            if s.can_decrypt && s.is_decrypting {
                return Some("can_decrypt while decrypting".to_string());
            }
            if s.can_get_messages && s.is_refreshing {
                return Some("can_get_messages while refreshing".to_string());
            }
            let offered = s.can_send_message || s.can_decrypt || s.can_get_messages;
            if offered && s.phase != Phase::InstanceReady {
                return Some(format!("operation offered in phase {:?}", s.phase));
            }
            None
        })
    }
}

/// Without a connected session there are no lists and nothing in flight.
pub struct DisconnectedIsEmpty;

impl Invariant for DisconnectedIsEmpty {
    fn name(&self) -> &'static str {
        "disconnected_is_empty"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        each_snapshot(trace, self.name(), |s| {
            if s.session.is_connected {
                return None;
            }
            if !s.sent.is_empty() || !s.received.is_empty() || !s.decrypted.is_empty() {
                return Some("message lists survived disconnect".to_string());
            }
            if s.is_sending || s.is_decrypting || s.is_refreshing {
                return Some("operation in flight without a session".to_string());
            }
            (s.phase != Phase::Disconnected)
                .then(|| format!("phase {:?} while disconnected", s.phase))
        })
    }
}

/// `is_deployed` is answered exactly when a chain is known, and is true
/// exactly when the network is supported.
pub struct DeployedMatchesNetwork;

impl Invariant for DeployedMatchesNetwork {
    fn name(&self) -> &'static str {
        "deployed_matches_network"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        each_snapshot(trace, self.name(), |s| {
            let expected = match s.network {
                NetworkStatus::Unknown => None,
                NetworkStatus::Supported { .. } => Some(true),
                NetworkStatus::WrongNetwork { .. } | NetworkStatus::ContractMissing { .. } => {
                    Some(false)
                },
            };
            (s.is_deployed != expected)
                .then(|| format!("is_deployed {:?} with network {:?}", s.is_deployed, s.network))
        })
    }
}

/// Session epochs never decrease across the trace.
pub struct EpochMonotonicity;

impl Invariant for EpochMonotonicity {
    fn name(&self) -> &'static str {
        "epoch_monotonicity"
    }

    fn check(&self, trace: &StatusTrace) -> InvariantResult {
        for (index, window) in trace.snapshots().windows(2).enumerate() {
            if window[1].epoch < window[0].epoch {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "snapshot {}: epoch decreased {} → {}",
                        index + 1,
                        window[0].epoch,
                        window[1].epoch
                    ),
                });
            }
        }
        Ok(())
    }
}
