//! Write-ahead log for crash recovery.
//!
//! Mutations are journaled before they touch the in-memory index, one frame
//! per logical operation: `[u32 length BE][u32 CRC32 BE][bincode payload]`,
//! each append flushed and fsynced before it returns. On startup the log is
//! replayed on top of the latest snapshot. Replay is conservative: the first
//! frame that is incomplete or fails its checksum ends the replay, since
//! nothing after a damaged frame can be trusted. `freeze` + `truncate`
//! bracket snapshot writes so no append can slip between the two.

use crate::document::Row;
use crate::search::graph::EdgeRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Which of the two parallel index schemas an entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaKind {
    /// The corpus index.
    Documents,
    /// The stored-query index used by the graph path.
    Queries,
}

/// A single logical mutation, replayable on startup.
#[derive(Debug, Serialize, Deserialize)]
pub enum WalEntry {
    /// Ingest document rows, indexing the named fields.
    UploadDocuments { rows: Vec<Row>, fields: Vec<String> },
    /// Ingest stored queries and document↔query edges.
    UploadQueries {
        queries: Vec<String>,
        edges: Vec<EdgeRecord>,
    },
    /// Delete documents by external key.
    DeleteDocuments { keys: Vec<String> },
    /// Replace a schema's stopword set.
    SetStopwords {
        schema: SchemaKind,
        stopwords: Vec<String>,
    },
}

/// What a replay found in the log.
#[derive(Debug, Default)]
pub struct ReplayStats {
    /// Frames decoded into entries.
    pub decoded: usize,
    /// Frames with a valid checksum that bincode could not decode.
    pub skipped: usize,
    /// Frames whose checksum did not match (replay stopped there).
    pub crc_failures: usize,
    /// Whether the log ended inside a frame.
    pub truncated: bool,
}

/// Append-only journal with per-frame CRC32 checks.
///
/// Appends serialise through a `parking_lot::Mutex` and reach disk before
/// returning; the shared gate lets [`freeze`](SyncWriteAheadLog::freeze)
/// hold appends off during a snapshot.
pub struct SyncWriteAheadLog {
    /// Buffered handle to the open log file.
    log: Mutex<BufWriter<File>>,
    /// Appends take this shared, freeze takes it exclusive.
    gate: parking_lot::RwLock<()>,
    /// Log location, kept for replay and truncation.
    path: PathBuf,
}

impl SyncWriteAheadLog {
    /// Open (or create) the log inside `data_dir`, in append mode.
    pub fn new(data_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join("wal.bin");

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        Ok(Self {
            log: Mutex::new(BufWriter::new(options.open(&path)?)),
            gate: parking_lot::RwLock::new(()),
            path,
        })
    }

    /// Journal one entry. The frame is on disk (fsync included) when this
    /// returns.
    pub fn append(&self, entry: &WalEntry) -> io::Result<()> {
        let payload = bincode::serialize(entry).map_err(|e| io::Error::other(e.to_string()))?;
        let header = frame_header(&payload);

        let _appending = self.gate.read();
        let mut log = self.log.lock();
        log.write_all(&header)?;
        log.write_all(&payload)?;
        log.flush()?;
        log.get_mut().sync_all()?;
        Ok(())
    }

    /// Walk the log from the start, checking each frame's checksum, and
    /// return the decodable entries together with what was found.
    pub fn replay(&self) -> io::Result<(Vec<WalEntry>, ReplayStats)> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        let mut stats = ReplayStats::default();

        loop {
            // A clean log ends exactly on a frame boundary; EOF while
            // reading the length means we are done.
            let mut length = [0u8; 4];
            match reader.read_exact(&mut length) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }

            let mut checksum = [0u8; 4];
            let mut payload = vec![0u8; u32::from_be_bytes(length) as usize];
            let body = reader
                .read_exact(&mut checksum)
                .and_then(|()| reader.read_exact(&mut payload));
            match body {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::warn!("log ends inside a frame; dropping the partial tail");
                    stats.truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }

            if crc32fast::hash(&payload) != u32::from_be_bytes(checksum) {
                tracing::warn!("frame failed its CRC check; not replaying past it");
                stats.crc_failures += 1;
                break;
            }

            match bincode::deserialize(&payload) {
                Ok(entry) => {
                    entries.push(entry);
                    stats.decoded += 1;
                }
                Err(e) => {
                    tracing::warn!("frame checksum ok but undecodable, skipping: {e}");
                    stats.skipped += 1;
                }
            }
        }

        Ok((entries, stats))
    }

    /// Block every [`append`](SyncWriteAheadLog::append) until the returned
    /// guard is dropped. Hold it across snapshot + truncate.
    pub fn freeze(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// Empty the log file and reopen it for appending.
    pub fn truncate(&self) -> io::Result<()> {
        let mut log = self.log.lock();
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?
            .sync_all()?;
        *log = BufWriter::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        );
        Ok(())
    }
}

/// Frame header for a serialized payload: length then CRC32, both
/// big-endian u32.
fn frame_header(payload: &[u8]) -> [u8; 8] {
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    header[4..].copy_from_slice(&crc32fast::hash(payload).to_be_bytes());
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<Row> {
        vec![
            Row::from_text("a", "text", "the cat sat"),
            Row::from_text("b", "text", "the dog sat"),
        ]
    }

    #[test]
    fn test_append_and_replay_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path()).unwrap();
        wal.append(&WalEntry::UploadDocuments {
            rows: sample_rows(),
            fields: vec!["text".to_string()],
        })
        .unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["a".to_string()],
        })
        .unwrap();

        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(stats.decoded, 2);
        assert_eq!(stats.crc_failures, 0);
        assert!(!stats.truncated);
        assert!(matches!(entries[0], WalEntry::UploadDocuments { .. }));
        assert!(matches!(entries[1], WalEntry::DeleteDocuments { .. }));
    }

    #[test]
    fn test_replay_stops_on_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path()).unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["a".to_string()],
        })
        .unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["b".to_string()],
        })
        .unwrap();

        // Flip a payload byte in the second frame.
        let path = dir.path().join("wal.bin");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(stats.crc_failures, 1);
    }

    #[test]
    fn test_replay_flags_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path()).unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["a".to_string()],
        })
        .unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["b".to_string()],
        })
        .unwrap();

        // Chop the last frame mid-payload.
        let path = dir.path().join("wal.bin");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let (entries, stats) = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(stats.truncated);
        assert_eq!(stats.crc_failures, 0);
    }

    #[test]
    fn test_truncate_empties_log() {
        let dir = tempfile::tempdir().unwrap();
        let wal = SyncWriteAheadLog::new(dir.path()).unwrap();
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["a".to_string()],
        })
        .unwrap();
        wal.truncate().unwrap();
        let (entries, _) = wal.replay().unwrap();
        assert!(entries.is_empty());

        // Appends still work after truncation.
        wal.append(&WalEntry::DeleteDocuments {
            keys: vec!["b".to_string()],
        })
        .unwrap();
        let (entries, _) = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
    }
}
