//! Commit ingestion and snapshot-restore engine.
//!
//! The [`collector::Collector`] pulls new commits of tracked repositories from the host,
//! stores file contents in a content-addressed [`blob::BlobStore`] and metadata in the SQLite
//! catalog ([`db`]). The [`restore::Restorer`] replays any recorded commit's before/after files.

pub mod blob;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod host;
pub mod registrar;
pub mod restore;
pub mod utils;

pub use blob::{BlobStore, ContentHash};
pub use collector::{CollectionReport, Collector, StopReason, SweepReport};
pub use config::Config;
pub use error::{IsRetryable, VaultError};
pub use registrar::{DiscoveryReport, Registrar};
pub use restore::{Direction, RestoredFile, Restorer};
