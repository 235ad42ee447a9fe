//! Logical-expiration envelope.
//!
//! The logical-expiration strategy stores entries without a store-level TTL
//! and instead encodes the freshness deadline inside the value, so an
//! expired entry stays readable (stale) while a background rebuild runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A cached payload paired with its logical expiration instant.
///
/// Serialized as `{"data": ..., "logicalExpiresAt": "<RFC 3339>"}`.
/// Envelopes are replaced wholesale on rebuild, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// The wrapped payload.
    pub data: T,

    /// Instant after which the payload is considered stale.
    #[serde(with = "time::serde::rfc3339")]
    pub logical_expires_at: OffsetDateTime,
}

impl<T> Envelope<T> {
    /// Wrap `data` with a logical expiration of `now + ttl`.
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            logical_expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }

    /// Wrap `data` with an explicit expiration instant.
    pub fn expiring_at(data: T, logical_expires_at: OffsetDateTime) -> Self {
        Self {
            data,
            logical_expires_at,
        }
    }

    /// Whether the logical expiration has passed.
    pub fn is_expired(&self) -> bool {
        self.logical_expires_at <= OffsetDateTime::now_utc()
    }

    /// Consume the envelope and return the payload.
    pub fn into_data(self) -> T {
        self.data
    }
}
