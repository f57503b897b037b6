//! Disk persistence for engine snapshots using bincode serialization.
//!
//! The full engine state is serialized to a single `.osk` file. Writes use
//! atomic temp-file + rename to prevent corruption on crash. A CRC32
//! checksum with a magic marker is appended as an 8-byte footer for
//! integrity verification, and loaded snapshots are validated against the
//! engine's structural invariants before use.

use crate::storage::engine::EngineData;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Magic bytes appended before the CRC32 footer.
const SNAPSHOT_CRC_MAGIC: &[u8; 4] = b"OSK1";

/// Snapshot file name within a data directory.
const SNAPSHOT_FILE: &str = "snapshot.osk";

/// Path of the snapshot file inside `dir`.
pub fn snapshot_path(dir: &Path) -> PathBuf {
    dir.join(SNAPSHOT_FILE)
}

/// Save the engine state with an atomic write:
/// `[bincode payload][magic "OSK1"][CRC32 BE]`.
pub fn save_engine(data: &EngineData, dir: &Path) -> io::Result<()> {
    let bytes = bincode::serialize(data).map_err(|e| io::Error::other(e.to_string()))?;

    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
    }
    let path = snapshot_path(dir);
    let tmp_path = dir.join(format!("{SNAPSHOT_FILE}.tmp"));

    let crc = crc32fast::hash(&bytes);
    let mut out = Vec::with_capacity(bytes.len() + 8);
    out.extend_from_slice(&bytes);
    out.extend_from_slice(SNAPSHOT_CRC_MAGIC);
    out.extend_from_slice(&crc.to_be_bytes());

    fs::write(&tmp_path, &out)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp_path, &path)?;

    tracing::info!(
        "saved snapshot ({} bytes, CRC32={:#010x})",
        bytes.len(),
        crc
    );
    Ok(())
}

/// Load and verify a snapshot, rebuilding transient tokenizers and checking
/// every structural invariant.
pub fn load_engine(path: &Path) -> io::Result<EngineData> {
    let raw = fs::read(path)?;

    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != SNAPSHOT_CRC_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("snapshot {path:?} is missing its integrity footer"),
        ));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "snapshot CRC32 mismatch: expected {stored_crc:#010x}, got {computed_crc:#010x}; file may be corrupted: {path:?}"
            ),
        ));
    }

    let mut data: EngineData = bincode::deserialize(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    data.rebuild_tokenizers()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    data.validate().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("snapshot validation failed: {e}"),
        )
    })?;

    tracing::info!(
        "loaded snapshot ({} documents, {} stored queries)",
        data.documents.docs.len(),
        data.queries.docs.len()
    );
    Ok(data)
}
