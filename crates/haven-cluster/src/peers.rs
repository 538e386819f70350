//! Peer selection and fan-out order.

use std::cmp::Ordering;
use std::time::Duration;

use haven_core::{Peer, PeerId, Timestamp};

/// Returns true if `peer` is selected by `filter`.
///
/// An empty filter selects every peer. This is what lets an object that is
/// registered with no known holders be fetched from any live peer.
pub fn matches_peer(peer: &PeerId, filter: &[PeerId]) -> bool {
    filter.is_empty() || filter.contains(peer)
}

/// Sorts peers into fan-out order: the local peer first, the rest by ID.
pub fn sort_peers(peers: &mut [Peer], local: &PeerId) {
    peers.sort_by(|a, b| match (&a.id == local, &b.id == local) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.id.cmp(&b.id),
    });
}

/// Keeps the peers that are live at `now` and selected by `filter`, in
/// fan-out order.
pub fn select_live(
    peers: Vec<Peer>,
    local: &PeerId,
    now: Timestamp,
    window: Duration,
    filter: &[PeerId],
) -> Vec<Peer> {
    let mut live: Vec<Peer> = peers
        .into_iter()
        .filter(|peer| peer.is_live(now, window) && matches_peer(&peer.id, filter))
        .collect();
    sort_peers(&mut live, local);
    live
}
