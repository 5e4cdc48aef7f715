//! Deterministic Host Election
//!
//! A pure ranking function over a candidate snapshot. Every peer runs the
//! same function over its own registry view; determinism (not consensus) is
//! what keeps independent elections convergent.

use std::cmp::Ordering;

use crate::peer::types::Peer;

/// Selects the host from a candidate snapshot. Comparators are applied in
/// sequence until one discriminates:
///
/// 1. Tier rank: `Premium`/`Admin` outrank `Free` (and tie with each other).
/// 2. `connection_stability`, higher wins.
/// 3. `battery_level`, higher wins.
/// 4. `id` ascending, lexicographic. Ids are unique per session, so this
///    guarantees a single winner for any non-empty candidate set and makes
///    the result independent of input order.
///
/// Returns `None` only for an empty slice; callers must supply at least the
/// local peer as a candidate of last resort.
pub fn elect_leader(candidates: &[Peer]) -> Option<&Peer> {
    candidates.iter().max_by(|a, b| host_preference(a, b))
}

/// Total order over candidates; `Greater` means "better host".
fn host_preference(a: &Peer, b: &Peer) -> Ordering {
    a.account_tier
        .host_rank()
        .cmp(&b.account_tier.host_rank())
        .then(a.connection_stability.cmp(&b.connection_stability))
        .then(a.battery_level.cmp(&b.battery_level))
        // Smaller id wins the final tie, so compare reversed.
        .then_with(|| b.id.cmp(&a.id))
}

/// Whether any candidate may host outside emergency mode. When this returns
/// `false` for the live set, the session is in emergency mode and any tier
/// (including `Free`) may be elected.
pub fn has_tier_eligible(candidates: &[Peer]) -> bool {
    candidates.iter().any(|p| p.account_tier.can_always_host())
}
