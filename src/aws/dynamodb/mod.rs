//! DynamoDB browsing core.
//!
//! Provides everything needed to look into DynamoDB tables:
//!
//! - [`model`] - Typed scan and query parameters with local validation
//! - [`expression`] - Key condition and filter expression builder
//! - [`connection`] - Connection cache keyed by profile, region and endpoint
//! - [`executor`] - Single-request scan, query, list and describe operations
//! - [`pagination`] - Incremental fetching with generation fencing
//! - [`errors`] - Classification of failures into user-facing messages
//! - [`metadata`] - Memoized table key schemas and indexes
//!
//! # Placeholders
//!
//! Key conditions use `#pk`/`:pk` and `#sk`/`:sk`/`:sk2`, filters use `#f<n>`/`:f<n>`.
//! Expressions built here never contain attribute names or values literally.

/// Request parameters and their validation.
pub mod model;
/// Expression building from structured conditions.
pub mod expression;
/// The store backend seam and its AWS SDK implementation.
pub mod client;
/// Connection setup and caching.
pub mod connection;
/// Single-request operations.
pub mod executor;
/// Page-by-page result accumulation.
pub mod pagination;
/// Error taxonomy for presentation.
pub mod errors;
/// Table descriptions condensed to keys and indexes.
pub mod schema;
/// Cached table descriptions.
pub mod metadata;
/// Rendering of raw items.
pub mod item;

#[cfg(test)]
mod mock;
