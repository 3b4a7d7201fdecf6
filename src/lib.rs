//! # Dynoscope
//!
//! The engine behind an interactive DynamoDB browser: list tables, inspect their key schema
//! and secondary indexes, scan or query items and page through large result sets.
//!
//! The terminal front end only collects user intent and renders what comes back. Everything
//! with actual state lives here:
//!
//! - building key-condition and filter expressions from structured conditions
//! - a connection cache keyed by profile, region and endpoint
//! - single-request executors which normalize store responses
//! - a pagination controller which accumulates pages behind an opaque cursor
//! - an error classifier producing user-facing messages and guidance
//! - a table metadata cache used to generate index-aware query forms
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dynoscope::aws::dynamodb::connection::{ConnectionCache, ConnectionConfig};
//! use dynoscope::aws::dynamodb::model::ScanParams;
//! use dynoscope::aws::dynamodb::pagination::{FetchRequest, PaginatedFetch};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     dynoscope::logging::setup_tracing();
//!
//!     let connections = Arc::new(ConnectionCache::with_sdk());
//!     let fetch = PaginatedFetch::new(connections);
//!     fetch.reset(
//!         FetchRequest::Scan(ScanParams::new("users").with_limit(50)),
//!         ConnectionConfig::default(),
//!     )?;
//!     fetch.fetch_next().await;
//!
//!     println!("{} items", fetch.view().items.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `pretty_logs` - Colorful console output for development
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_NAME` | Application identifier used in logs | `DYNOSCOPE` |
//! | `APP_VERSION` | Version string | package version |
//! | `DYNOSCOPE_PROFILE` | Credential profile (falls back to `AWS_PROFILE`) | SDK default chain |
//! | `DYNOSCOPE_REGION` | Region (falls back to `AWS_REGION`) | SDK default chain |
//! | `DYNOSCOPE_ENDPOINT_URL` | Endpoint override, e.g. DynamoDB Local | (none) |
//! | `DYNOSCOPE_PAGE_SIZE` | Items per scan/query request | `50` |
//! | `RUST_LOG` | Console log filter (e.g., `info`, `dynoscope=debug`) | `info` |

use std::env;
use std::sync::LazyLock;

/// Logging and tracing infrastructure.
pub mod logging;

/// Settings read from the environment.
pub mod config;

/// DynamoDB access: expressions, executors, pagination and metadata.
pub mod aws;

/// Application name from `APP_NAME` environment variable.
///
/// Defaults to `"DYNOSCOPE"` if not set.
pub static APP_NAME: LazyLock<String> =
    LazyLock::new(|| env::var("APP_NAME").unwrap_or("DYNOSCOPE".to_string()));

/// Application version from `APP_VERSION` environment variable.
///
/// Falls back to the version of this package.
pub static APP_VERSION: LazyLock<String> = LazyLock::new(|| {
    env::var("APP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION").to_string())
});
