//! Broadcaster
//!
//! Fans one message out to every live connection in the registry.

use tracing::{debug, warn};

use crate::message::{frame_broadcast, SenderLabel};
use crate::registry::Registry;
use crate::types::ConnId;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `payload` from `sender` to every live connection
///
/// The target that is the sender sees `me: payload`, every other target
/// sees `<sender_addr>: payload`. A failed write is logged and skipped:
/// the broadcast never aborts, never retries, and never removes the target
/// (its own handler does that when its read fails).
///
/// The registry read lock is held across every write, so one stalled
/// target holds up all concurrent broadcasts and registry mutations.
pub async fn broadcast(
    registry: &Registry,
    sender: ConnId,
    sender_addr: &str,
    payload: &[u8],
) -> Delivery {
    let mut delivery = Delivery::default();
    let live = registry.live().await;

    for target in live.iter() {
        let label = if target.id == sender {
            SenderLabel::Me
        } else {
            SenderLabel::Peer(sender_addr)
        };
        let frame = frame_broadcast(label, payload);

        match target.write_all(&frame).await {
            Ok(()) => {
                debug!(peer = %target.addr, "write succeeded");
                delivery.delivered += 1;
            }
            Err(e) => {
                warn!(peer = %target.addr, error = %e, "write failed");
                delivery.failed += 1;
            }
        }
    }

    delivery
}
