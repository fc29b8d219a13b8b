//! Canonical datetime types shared across all Aira crates

use chrono::{DateTime as ChronoDateTime, Utc};

/// Database DateTime type used across all Aira crates
///
/// This is the canonical datetime type for TIMESTAMPTZ columns and the
/// `created_at`/`updated_at` pairs every entity carries.
pub type DBDateTime = ChronoDateTime<Utc>;

/// Standard UTC DateTime type used across all Aira crates
///
/// Serializes in API responses as ISO 8601 with a 'Z' suffix
/// (`2025-10-12T12:15:47.609192Z`). When a field of this type appears in a
/// utoipa schema, annotate it with:
/// ```rust,ignore
/// #[schema(value_type = String, format = DateTime)]
/// pub created_at: UtcDateTime,
/// ```
pub type UtcDateTime = ChronoDateTime<Utc>;
