//! TTL Policy Module
//!
//! Chooses a time-to-live from how long ago the underlying event started.

use chrono::{DateTime, Duration, Utc};

use crate::cache::Layer;

// == TTL Constants (seconds) ==
pub const TTL_LIVE: u64 = 300;
pub const TTL_RECENT: u64 = 3_600;
pub const TTL_COMPLETED: u64 = 86_400;
pub const TTL_HISTORICAL: u64 = 604_800;
/// Event has not started yet; schedules still move.
pub const TTL_UPCOMING: u64 = 3_600;
pub const TTL_REFERENCE: u64 = 604_800;

/// One row of the tier table: ages strictly below `below` get `ttl_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlTier {
    /// Exclusive upper bound on age; `None` for the open-ended last tier
    pub below: Option<Duration>,
    pub ttl_seconds: u64,
}

/// Ordered (age bound, ttl) table plus per-layer fallbacks.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    tiers: Vec<TtlTier>,
    default_ttl: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(TTL_RECENT)
    }
}

impl TtlPolicy {
    /// Standard tiers; `default_ttl` applies to non-reference layers with no event time.
    pub fn new(default_ttl: u64) -> Self {
        Self {
            tiers: vec![
                TtlTier {
                    below: Some(Duration::hours(2)),
                    ttl_seconds: TTL_LIVE,
                },
                TtlTier {
                    below: Some(Duration::hours(24)),
                    ttl_seconds: TTL_RECENT,
                },
                TtlTier {
                    below: Some(Duration::days(7)),
                    ttl_seconds: TTL_COMPLETED,
                },
                TtlTier {
                    below: None,
                    ttl_seconds: TTL_HISTORICAL,
                },
            ],
            default_ttl,
        }
    }

    pub fn tiers(&self) -> &[TtlTier] {
        &self.tiers
    }

    /// TTL for a non-negative age. Negative ages are upcoming events.
    pub fn ttl_for_age(&self, age: Duration) -> u64 {
        if age < Duration::zero() {
            return TTL_UPCOMING;
        }
        self.tiers
            .iter()
            .find(|tier| tier.below.map_or(true, |bound| age < bound))
            .map(|tier| tier.ttl_seconds)
            .unwrap_or(TTL_HISTORICAL)
    }

    /// Static TTL used when freshness cannot be derived.
    pub fn default_for(&self, layer: Layer) -> u64 {
        match layer {
            Layer::Reference => TTL_REFERENCE,
            Layer::Session | Layer::Computed | Layer::ApiResponse => self.default_ttl,
        }
    }

    /// TTL for data in `layer` belonging to an event that started at `event_time`.
    pub fn ttl_for(&self, layer: Layer, event_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        match (layer, event_time) {
            (Layer::Reference, _) => TTL_REFERENCE,
            (_, Some(started)) => self.ttl_for_age(now - started),
            (_, None) => self.default_for(layer),
        }
    }
}
