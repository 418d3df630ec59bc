//! Named [`tracing::Span`] constructors for resync and dispatch work.

use itemnet_types::HashId;
use tracing::{debug_span, info_span, Span};

/// Span covering one item's resync from start to finalize.
pub fn resync_span(item: &HashId) -> Span {
    info_span!("resync", item = %item.short())
}

/// Span covering the commit of a resync decision.
pub fn resync_commit_span(item: &HashId, decided: &str) -> Span {
    info_span!("resync_commit", item = %item.short(), decided = %decided)
}

/// Span covering the handling of one inbound notification.
pub fn notification_recv_span(from: &str, kind: &str) -> Span {
    debug_span!("notification_recv", from = %from, kind = %kind)
}
