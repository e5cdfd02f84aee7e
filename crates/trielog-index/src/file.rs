use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use trielog_log::SyncMode;
use trielog_types::Offset;

use crate::config::IndexConfig;
use crate::entry::IndexEntry;
use crate::error::{IndexError, IndexResult};
use crate::memory::MemoryIndex;
use crate::traits::OffsetIndex;

/// Frame header size: 4 bytes length + 4 bytes CRC.
const FRAME_HEADER: usize = 8;

/// Index held in memory and journaled to a single append-only file.
///
/// Each `bulk_upsert` writes one frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Vec<IndexEntry>)]
/// ```
/// On open the journal is replayed front-to-back. Frames failing the CRC are
/// skipped; a torn frame at the tail ends replay and is truncated away.
pub struct FileIndex {
    path: PathBuf,
    config: IndexConfig,
    map: MemoryIndex,
    /// `None` once closed.
    journal: Option<Journal<File>>,
}

/// A file that can be cut back to a given length.
trait Truncate: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Journal file plus the length of its intact frame prefix.
struct Journal<F> {
    file: F,
    len: u64,
}

impl<F: Truncate> Journal<F> {
    /// Append one whole frame. A failed write is cut back off the file so the
    /// next frame starts where this one would have.
    fn append(&mut self, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
        let written = self.file.write_all(frame).and_then(|()| match sync_mode {
            SyncMode::EveryWrite => self.file.sync(),
            SyncMode::OsDefault => Ok(()),
        });
        if let Err(e) = written {
            if let Err(truncate) = self.file.truncate_to(self.len) {
                warn!(error = %truncate, "failed to roll back partial index frame");
            }
            return Err(e);
        }
        self.len += frame.len() as u64;
        Ok(())
    }
}

/// Encode `entries` as one journal frame.
fn encode_frame(entries: &[IndexEntry]) -> IndexResult<Vec<u8>> {
    let payload = bincode::serialize(entries).map_err(|e| IndexError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| IndexError::Serialization(format!("frame of {} bytes is too large", payload.len())))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

impl FileIndex {
    /// Open (or create) the journal at `path` and replay it.
    pub fn open(path: &Path, config: IndexConfig) -> IndexResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut map = MemoryIndex::new();
        let valid_len = replay(path, &mut map)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            file.set_len(valid_len)?;
            warn!(
                path = %path.display(),
                kept = valid_len,
                dropped = file_len - valid_len,
                "truncated index journal tail"
            );
        }

        info!(path = %path.display(), entries = map.len(), "file index opened");
        Ok(Self {
            path: path.to_path_buf(),
            config,
            map,
            journal: Some(Journal { file, len: valid_len }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&mut self, entries: &[IndexEntry]) -> IndexResult<()> {
        let frame = encode_frame(entries)?;
        let journal = self.journal.as_mut().ok_or(IndexError::Closed)?;
        journal.append(&frame, self.config.sync_mode)?;
        debug!(entries = entries.len(), len = frame.len(), "index journal append");
        Ok(())
    }
}

/// Replay every intact frame of the journal into `map`; returns the byte
/// length of the valid prefix.
fn replay(path: &Path, map: &mut MemoryIndex) -> IndexResult<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let file_len = reader.get_ref().metadata()?.len();
    let mut pos: u64 = 0;
    let mut frames = 0usize;

    while pos + FRAME_HEADER as u64 <= file_len {
        let mut header = [0u8; FRAME_HEADER];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || pos + FRAME_HEADER as u64 + length as u64 > file_len {
            warn!(position = pos, length, file_len, "invalid index frame length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        pos += FRAME_HEADER as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(position = pos, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping index frame");
            continue;
        }
        match bincode::deserialize::<Vec<IndexEntry>>(&payload) {
            Ok(entries) => {
                for entry in &entries {
                    map.insert(entry);
                }
                frames += 1;
            }
            Err(e) => warn!(position = pos, error = %e, "failed to decode index frame; skipping"),
        }
    }

    debug!(frames, entries = map.len(), "index journal replayed");
    Ok(pos)
}

impl OffsetIndex for FileIndex {
    fn lookup(&self, fingerprint: &[u8]) -> IndexResult<Vec<Offset>> {
        if self.journal.is_none() {
            return Err(IndexError::Closed);
        }
        self.map.lookup(fingerprint)
    }

    fn bulk_upsert(&mut self, entries: &[IndexEntry]) -> IndexResult<()> {
        if self.journal.is_none() {
            return Err(IndexError::Closed);
        }
        let mut seen: HashSet<&IndexEntry> = HashSet::with_capacity(entries.len());
        let fresh: Vec<IndexEntry> = entries
            .iter()
            .filter(|entry| !self.map.contains(entry) && seen.insert(entry))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        // Journal first: the map only ever shows durable entries.
        self.write_frame(&fresh)?;
        for entry in &fresh {
            self.map.insert(entry);
        }
        Ok(())
    }

    fn close(&mut self) -> IndexResult<()> {
        let Some(journal) = self.journal.take() else {
            return Ok(());
        };
        journal.file.sync_all()?;
        info!(path = %self.path.display(), entries = self.map.len(), "file index closed");
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

impl std::fmt::Debug for FileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndex")
            .field("path", &self.path)
            .field("entries", &self.map.len())
            .field("closed", &self.journal.is_none())
            .finish()
    }
}
