//! Storage layer: engine state, write-ahead log, and disk persistence.
//!
//! Data lives in memory inside an [`engine::EngineData`] guarded by a
//! single-writer `RwLock`. Durability is provided by a
//! [`wal::SyncWriteAheadLog`] (CRC32 + fsync) and bincode snapshots
//! (atomic temp-file + rename).

/// Engine state and the public operation surface.
pub mod engine;
/// Disk persistence: snapshot save/load with atomic writes.
pub mod persistence;
/// Write-ahead log with CRC32 checksums.
pub mod wal;

pub use engine::{EngineData, SchemaData, SearchEngine, UploadReport};
pub use persistence::{load_engine, save_engine};
pub use wal::{ReplayStats, SchemaKind, SyncWriteAheadLog, WalEntry};
