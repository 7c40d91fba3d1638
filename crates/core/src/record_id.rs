//! Time-ordered record identifiers
//!
//! This module defines [`RecordId`], a 128-bit identifier in UUIDv7 wire
//! format, and [`RecordIdGenerator`], which mints them without any shared
//! counter or lock.
//!
//! ## Layout
//!
//! - 48 bits: unix timestamp in milliseconds
//! - 4 bits: version (7)
//! - 16 bits: per-generator sequence, split across `rand_a` and the top
//!   of `rand_b` so that byte-wise ordering equals `(timestamp, sequence)`
//! - 2 bits: variant
//! - 58 bits: random, for uniqueness across independent generators
//!
//! ## Ordering
//!
//! Sorting by `RecordId` equals chronological order. Two ids minted by the
//! same generator are strictly ordered even within one millisecond (the
//! sequence occupies the most significant random bits). Ids from different
//! generators are ordered only approximately, bounded by clock skew; the
//! engine only relies on per-entity ordering, which the optimistic append
//! check serializes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Identifier of one state record
///
/// Immutable, time-ordered, globally unique. Byte-wise comparison of the
/// underlying UUID equals chronological comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Assemble a RecordId from its parts
    ///
    /// `millis` is truncated to 48 bits, `entropy` to 58 bits.
    pub fn from_parts(millis: u64, sequence: u16, entropy: u64) -> Self {
        let mut bytes = [0u8; 16];

        // 48-bit big-endian timestamp
        bytes[0] = (millis >> 40) as u8;
        bytes[1] = (millis >> 32) as u8;
        bytes[2] = (millis >> 24) as u8;
        bytes[3] = (millis >> 16) as u8;
        bytes[4] = (millis >> 8) as u8;
        bytes[5] = millis as u8;

        // Version 7 plus sequence bits 15..12
        bytes[6] = 0x70 | ((sequence >> 12) as u8 & 0x0F);
        // Sequence bits 11..4
        bytes[7] = (sequence >> 4) as u8;
        // Variant (10) plus sequence bits 3..0 plus 2 entropy bits
        bytes[8] = 0x80 | ((sequence as u8 & 0x0F) << 2) | ((entropy >> 56) as u8 & 0x03);
        // 56 entropy bits
        bytes[9] = (entropy >> 48) as u8;
        bytes[10] = (entropy >> 40) as u8;
        bytes[11] = (entropy >> 32) as u8;
        bytes[12] = (entropy >> 24) as u8;
        bytes[13] = (entropy >> 16) as u8;
        bytes[14] = (entropy >> 8) as u8;
        bytes[15] = entropy as u8;

        RecordId(Uuid::from_bytes(bytes))
    }

    /// Smallest possible id carrying the given timestamp
    ///
    /// Compares less than or equal to every id minted at or after `ts`,
    /// which makes `since_id` history queries double as time-range queries
    /// with no separate timestamp index.
    pub fn floor(ts: DateTime<Utc>) -> Self {
        let millis = ts.timestamp_millis().max(0) as u64;
        Self::from_parts(millis, 0, 0)
    }

    /// Greatest possible id carrying the given timestamp
    ///
    /// The counterpart of [`RecordId::floor`]: as an exclusive `since_id`
    /// it admits exactly the ids minted strictly after `ts`'s millisecond,
    /// and as an inclusive upper bound it admits the ids minted at or
    /// before it.
    pub fn ceil(ts: DateTime<Utc>) -> Self {
        let millis = ts.timestamp_millis().max(0) as u64;
        Self::from_parts(millis, u16::MAX, u64::MAX)
    }

    /// Milliseconds since the unix epoch embedded in this id
    pub fn timestamp_millis(&self) -> u64 {
        let b = self.0.as_bytes();
        (u64::from(b[0]) << 40)
            | (u64::from(b[1]) << 32)
            | (u64::from(b[2]) << 24)
            | (u64::from(b[3]) << 16)
            | (u64::from(b[4]) << 8)
            | u64::from(b[5])
    }

    /// Wall-clock time embedded in this id
    pub fn timestamp(&self) -> DateTime<Utc> {
        // 48-bit millis always fall inside chrono's representable range
        Utc.timestamp_millis_opt(self.timestamp_millis() as i64)
            .single()
            .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().expect("epoch is representable"))
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RecordId(Uuid::parse_str(s)?))
    }
}

/// Mints [`RecordId`]s that are strictly increasing per generator
///
/// A single `AtomicU64` packs `millis << 16 | sequence`. Each call advances
/// the pair with a compare-exchange loop, so generators never block and
/// never hand out the same `(millis, sequence)` twice. When a millisecond
/// exhausts its 65 536 sequence slots the logical clock runs one
/// millisecond ahead of the wall clock rather than spinning.
///
/// # Thread Safety
///
/// Safe to share behind an `Arc`; all state is a single atomic.
#[derive(Debug, Default)]
pub struct RecordIdGenerator {
    /// Packed (millis << 16 | sequence) of the last id handed out
    state: AtomicU64,
}

const SEQ_BITS: u64 = 16;
const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;

impl RecordIdGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next id
    ///
    /// For two calls `a` then `b` completing in that order on the same
    /// generator, `a < b` holds.
    pub fn next(&self) -> RecordId {
        loop {
            let now = Self::wall_millis();
            let current = self.state.load(Ordering::Acquire);
            let last_ms = current >> SEQ_BITS;
            let last_seq = current & SEQ_MASK;

            let (ms, seq) = if now > last_ms {
                (now, 0)
            } else if last_seq < SEQ_MASK {
                // Same millisecond (or clock regression): bump the sequence
                (last_ms, last_seq + 1)
            } else {
                // Sequence exhausted: advance the logical clock
                (last_ms + 1, 0)
            };

            let next = (ms << SEQ_BITS) | seq;
            if self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return RecordId::from_parts(ms, seq as u16, rand::random::<u64>());
            }
        }
    }

    fn wall_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
