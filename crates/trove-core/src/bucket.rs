//! Deterministic bucket assignment.
//!
//! Both bucketing schemes spread a logically unbounded collection across
//! physically separate partitions, but they trade differently:
//!
//! - **Hash bucketing** ([`hash_bucket`]) needs no knowledge of how many
//!   records exist, at the price of a fixed, capped bucket count. Used for
//!   record-keyed tables (processed records: 128, harvested records: 64).
//! - **Sequence bucketing** ([`sequence_bucket`]) grows the bucket count
//!   with the task, at the price of requiring a global, densely assigned
//!   sequence number. Used for the notification log (width 10 000).
//!
//! Every writer and every reader computes the bucket from the key the same
//! way, which is what keeps the store partition-stable under concurrent
//! access without coordination.
//!
//! The hash function and the bucket counts are **durable schema**: changing
//! either silently loses existing rows from scans that assume the new
//! layout, so a change requires a data migration.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable FNV-1a 64-bit hash of a byte slice.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Maps a record identifier to a bucket in `[0, bucket_count)`.
///
/// Pure and deterministic: the same id and count always produce the same
/// bucket, in every process.
///
/// # Panics
///
/// Panics if `bucket_count` is zero; bucket counts are compile-time schema
/// constants, never data.
#[must_use]
pub fn hash_bucket(record_id: &str, bucket_count: u32) -> u32 {
    assert!(bucket_count > 0, "bucket count must be positive");
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (fnv1a(record_id.as_bytes()) % u64::from(bucket_count)) as u32;
    bucket
}

/// Maps a sequence number to its fixed-width bucket.
///
/// Bucket `n` holds sequence numbers `[n * bucket_size, (n + 1) * bucket_size)`.
///
/// # Panics
///
/// Panics if `bucket_size` is not positive.
#[must_use]
pub fn sequence_bucket(sequence: i64, bucket_size: i64) -> i64 {
    assert!(bucket_size > 0, "bucket size must be positive");
    sequence / bucket_size
}
