//! # logkv
//!
//! A log-structured key-value store with:
//! - Append-only segment files bounded by size
//! - An in-memory key → offset index per segment, rebuilt on open
//! - SHA-1 checksummed records, verified on every read
//! - Background compaction that drops shadowed records
//! - Two single-owner workers serializing writes and index access
//!
//! ## Architecture Overview
//!
//! ```text
//!        put(k, v)                         get(k)
//!            │                               │
//! ┌──────────▼──────────┐                    │
//! │    Write Worker     │                    │
//! │ encode → rotate? →  │                    │
//! │ append              │                    │
//! └──────────┬──────────┘                    │
//!            │ index write        lookup     │
//! ┌──────────▼───────────────────────────────▼──┐
//! │                Index Worker                  │
//! │      (one operation at a time, FIFO)         │
//! └──────────────────────┬───────────────────────┘
//!                        │ (segment, offset)
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │ segment-0 │ segment-1 │ ... │ segment-N      │
//! │  sealed   │  sealed   │     │  active        │
//! └──────────────────────────────────────────────┘
//!       ▲ merged by the background Compactor
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use logkv::Store;
//!
//! let store = Store::open_path(std::path::Path::new("./data"), 10 * 1024 * 1024)?;
//! store.put("key1", "value1")?;
//! assert_eq!(store.get("key1")?, "value1");
//! store.close()?;
//! # Ok::<(), logkv::LogKvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod compaction;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use compaction::CompactionResult;
pub use config::{Config, SyncStrategy};
pub use error::{LogKvError, Result};
pub use record::Record;
pub use store::{RecoveryReport, Store, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
