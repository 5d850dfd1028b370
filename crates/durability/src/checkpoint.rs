//! Crash-safe counts checkpoint files
//!
//! A checkpoint wraps one encoded [`CountsSnapshot`] in a small envelope:
//!
//! ```text
//! ┌──────────────┬─────────┬──────────────────┬─────────────┬──────────────┐
//! │ magic "TCNT" │ version │ payload len (LE) │ payload     │ crc32 (LE)   │
//! │ 4 bytes      │ u8      │ u64              │ codec bytes │ of payload   │
//! └──────────────┴─────────┴──────────────────┴─────────────┴──────────────┘
//! ```
//!
//! # Crash Safety
//!
//! 1. Write to a temporary file (`.counts.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to `counts.snapshot`
//! 4. fsync the parent directory
//!
//! Either the previous checkpoint or the new one is visible, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tally_core::{CountsSnapshot, Error, Result, TxnId};
use tracing::{debug, info, warn};

use crate::codec;

/// File magic
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"TCNT";

/// Current envelope version
pub const CHECKPOINT_FORMAT_VERSION: u8 = 1;

/// Name of the live checkpoint inside a data directory
pub const CHECKPOINT_FILE_NAME: &str = "counts.snapshot";

/// Name of the in-flight temporary file
pub const CHECKPOINT_TEMP_FILE_NAME: &str = ".counts.tmp";

/// Magic + version + payload length
pub const CHECKPOINT_HEADER_SIZE: usize = 4 + 1 + 8;

const CRC_SIZE: usize = 4;

/// Path of the live checkpoint in `dir`
pub fn checkpoint_path(dir: &Path) -> PathBuf {
    dir.join(CHECKPOINT_FILE_NAME)
}

/// Information about a written checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Transaction id of the checkpointed snapshot
    pub txn_id: TxnId,
    /// Number of statistics written
    pub entries: usize,
    /// Total file size in bytes
    pub bytes: u64,
    /// CRC32 of the payload
    pub crc: u32,
    /// Final path of the checkpoint
    pub path: PathBuf,
}

/// Writes checkpoints into one directory
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    dir: PathBuf,
}

impl CheckpointWriter {
    /// Writer for `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(CheckpointWriter { dir })
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `snapshot`, replacing any previous checkpoint
    pub fn write(&self, snapshot: &CountsSnapshot) -> Result<CheckpointInfo> {
        let final_path = checkpoint_path(&self.dir);
        let temp_path = self.dir.join(CHECKPOINT_TEMP_FILE_NAME);

        let payload = codec::encode_to_vec(snapshot)?;
        let crc = crc32fast::hash(&payload);
        debug!(
            txn_id = snapshot.txn_id(),
            entries = snapshot.len(),
            payload_bytes = payload.len(),
            "Writing counts checkpoint"
        );

        // Step 1: write the temporary file
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&CHECKPOINT_MAGIC)?;
        out.write_all(&[CHECKPOINT_FORMAT_VERSION])?;
        out.write_all(&(payload.len() as u64).to_le_bytes())?;
        out.write_all(&payload)?;
        out.write_all(&crc.to_le_bytes())?;

        // Step 2: fsync
        let file = out
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        // Step 3: atomic rename
        fs::rename(&temp_path, &final_path)?;

        // Step 4: fsync the directory
        sync_dir(&self.dir)?;

        let info = CheckpointInfo {
            txn_id: snapshot.txn_id(),
            entries: snapshot.len(),
            bytes: (CHECKPOINT_HEADER_SIZE + payload.len() + CRC_SIZE) as u64,
            crc,
            path: final_path,
        };
        info!(
            txn_id = info.txn_id,
            entries = info.entries,
            bytes = info.bytes,
            "Counts checkpoint written"
        );
        Ok(info)
    }

    /// Remove a temporary file left behind by a crash. Returns whether one existed.
    pub fn cleanup_temp_file(&self) -> Result<bool> {
        let temp_path = self.dir.join(CHECKPOINT_TEMP_FILE_NAME);
        if !temp_path.exists() {
            return Ok(false);
        }
        warn!(path = %temp_path.display(), "Removing incomplete counts checkpoint");
        fs::remove_file(&temp_path)?;
        Ok(true)
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Reads and validates checkpoint files
pub struct CheckpointReader;

impl CheckpointReader {
    /// Load the checkpoint at `path`
    ///
    /// Validates magic, version, payload length and CRC before decoding.
    pub fn read(path: &Path) -> Result<CountsSnapshot> {
        let data = fs::read(path)?;
        let payload = Self::validate(&data)?;
        codec::decode_from_slice(payload)
    }

    /// Load the live checkpoint from `dir`, if there is one
    pub fn load_latest(dir: &Path) -> Result<Option<CountsSnapshot>> {
        let path = checkpoint_path(dir);
        if !path.exists() {
            return Ok(None);
        }
        let snapshot = Self::read(&path)?;
        debug!(
            txn_id = snapshot.txn_id(),
            entries = snapshot.len(),
            path = %path.display(),
            "Loaded counts checkpoint"
        );
        Ok(Some(snapshot))
    }

    /// Check the envelope and return the payload it carries
    fn validate(data: &[u8]) -> Result<&[u8]> {
        if data.len() < CHECKPOINT_HEADER_SIZE + CRC_SIZE {
            return Err(Error::Corruption(format!(
                "checkpoint too small: {} bytes",
                data.len()
            )));
        }

        let (header, rest) = data.split_at(CHECKPOINT_HEADER_SIZE);
        if header[0..4] != CHECKPOINT_MAGIC {
            return Err(Error::Corruption(format!(
                "bad checkpoint magic {:02x?}",
                &header[0..4]
            )));
        }
        if header[4] != CHECKPOINT_FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported checkpoint version {}",
                header[4]
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&header[5..13]);
        let payload_len = u64::from_le_bytes(len_bytes);
        if payload_len != (rest.len() - CRC_SIZE) as u64 {
            return Err(Error::Corruption(format!(
                "checkpoint payload length {} does not match file ({} bytes available)",
                payload_len,
                rest.len() - CRC_SIZE
            )));
        }

        let (payload, crc_bytes) = rest.split_at(rest.len() - CRC_SIZE);
        let mut stored = [0u8; 4];
        stored.copy_from_slice(crc_bytes);
        let stored = u32::from_le_bytes(stored);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(Error::Corruption(format!(
                "checkpoint CRC mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            )));
        }

        Ok(payload)
    }
}
