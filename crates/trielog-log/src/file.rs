use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use trielog_types::{Offset, StreamPartition};

use crate::batch::{fetch_window, prepare, BatchPosition};
use crate::config::{validate_stream, LogConfig, SyncMode};
use crate::error::LogResult;
use crate::record::{Compression, Record, RecordBatch, LOG_OVERHEAD};
use crate::traits::{AppendResult, NodeLog};

const SEGMENT_EXT: &str = "log";

/// One stream's segment file plus the position table rebuilt on open.
struct Segment {
    path: PathBuf,
    /// Append handle.
    file: File,
    positions: Vec<BatchPosition>,
    next_offset: Offset,
    /// Bytes of valid batches in the file.
    len: u64,
}

impl Segment {
    /// Open (or create) a segment and rebuild its position table.
    ///
    /// Reads the file front-to-back, validating every batch. The first batch
    /// that is torn, fails its CRC, or breaks offset continuity ends recovery
    /// and everything from it onward is truncated away.
    fn recover(path: &Path) -> LogResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(File::open(path)?);

        let mut positions = Vec::new();
        let mut next_offset: Offset = 0;
        let mut pos: u64 = 0;

        while pos + LOG_OVERHEAD as u64 <= file_len {
            let mut prefix = [0u8; LOG_OVERHEAD];
            reader.read_exact(&mut prefix)?;

            let Some(size) = RecordBatch::framed_len(&prefix) else {
                warn!(position = pos, "invalid batch length; stopping recovery");
                break;
            };
            if pos + size as u64 > file_len {
                warn!(position = pos, size, file_len, "torn batch at segment tail; stopping recovery");
                break;
            }

            let mut data = vec![0u8; size];
            data[..LOG_OVERHEAD].copy_from_slice(&prefix);
            reader.read_exact(&mut data[LOG_OVERHEAD..])?;

            let batch = match RecordBatch::decode(&data, pos) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(position = pos, error = %e, "corrupt batch; stopping recovery");
                    break;
                }
            };
            let Some(last_offset) = batch.last_offset() else {
                warn!(position = pos, "empty batch; stopping recovery");
                break;
            };
            if batch.base_offset != next_offset {
                warn!(
                    position = pos,
                    expected = next_offset,
                    found = batch.base_offset,
                    "offset gap; stopping recovery"
                );
                break;
            }

            positions.push(BatchPosition {
                base_offset: batch.base_offset,
                last_offset,
                position: pos,
                size,
            });
            next_offset = last_offset + 1;
            pos += size as u64;
        }

        if pos < file_len {
            file.set_len(pos)?;
            warn!(
                path = %path.display(),
                kept = pos,
                dropped = file_len - pos,
                "truncated segment tail"
            );
        }

        debug!(path = %path.display(), batches = positions.len(), next_offset, "segment recovered");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            positions,
            next_offset,
            len: pos,
        })
    }

    fn write_batch(&mut self, encoded: &[u8], sync_mode: SyncMode) -> LogResult<()> {
        let written = self.file.write_all(encoded).and_then(|()| match sync_mode {
            SyncMode::EveryWrite => self.file.sync_data(),
            SyncMode::OsDefault => Ok(()),
        });
        if let Err(e) = written {
            // Drop whatever part of the batch reached the file so the next
            // append starts on a batch boundary.
            if let Err(truncate) = self.file.set_len(self.len) {
                warn!(path = %self.path.display(), error = %truncate, "failed to roll back partial batch");
            }
            return Err(e.into());
        }
        self.len += encoded.len() as u64;
        Ok(())
    }
}

/// Durable log with one segment file per stream.
///
/// Each stream lives in `<dir>/<stream>.log` as back-to-back encoded batches.
/// On open every segment is scanned, its batches validated, and a table of
/// batch positions rebuilt in memory; reads seek straight to the batch that
/// holds the requested offset.
pub struct FileLog {
    dir: PathBuf,
    config: LogConfig,
    streams: RwLock<HashMap<String, Arc<RwLock<Segment>>>>,
}

impl FileLog {
    /// Open (or create) a log directory and recover every segment in it.
    pub fn open(dir: &Path, config: LogConfig) -> LogResult<Self> {
        fs::create_dir_all(dir)?;

        let mut streams = HashMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
                continue;
            }
            let Some(stream) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_stream(stream).is_err() {
                warn!(path = %path.display(), "ignoring segment with invalid stream name");
                continue;
            }
            let segment = Segment::recover(&path)?;
            streams.insert(stream.to_string(), Arc::new(RwLock::new(segment)));
        }

        info!(dir = %dir.display(), streams = streams.len(), "file log opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            streams: RwLock::new(streams),
        })
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all streams with a segment, sorted.
    pub fn streams(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// `fsync` every segment.
    pub fn sync(&self) -> LogResult<()> {
        let segments: Vec<_> = self.streams.read().values().cloned().collect();
        for segment in segments {
            segment.read().file.sync_all()?;
        }
        Ok(())
    }

    fn segment(&self, stream: &str) -> Option<Arc<RwLock<Segment>>> {
        self.streams.read().get(stream).cloned()
    }

    fn segment_or_create(&self, stream: &str) -> LogResult<Arc<RwLock<Segment>>> {
        validate_stream(stream)?;
        if let Some(segment) = self.segment(stream) {
            return Ok(segment);
        }
        let mut streams = self.streams.write();
        if let Some(segment) = streams.get(stream) {
            return Ok(Arc::clone(segment));
        }
        let path = self.dir.join(format!("{stream}.{SEGMENT_EXT}"));
        let segment = Arc::new(RwLock::new(Segment::recover(&path)?));
        streams.insert(stream.to_string(), Arc::clone(&segment));
        debug!(stream, "created segment");
        Ok(segment)
    }
}

impl NodeLog for FileLog {
    fn append(
        &self,
        stream: &str,
        records: &[Record],
        compression: Compression,
    ) -> LogResult<HashMap<StreamPartition, AppendResult>> {
        let segment = self.segment_or_create(stream)?;
        let mut seg = segment.write();

        let result = match prepare(seg.next_offset, records, compression, self.config.max_batch_bytes)? {
            Ok(prepared) => {
                let position = seg.len;
                seg.write_batch(&prepared.encoded, self.config.sync_mode)?;
                seg.positions.push(BatchPosition {
                    base_offset: prepared.first_offset,
                    last_offset: prepared.last_offset,
                    position,
                    size: prepared.encoded.len(),
                });
                seg.next_offset = prepared.last_offset + 1;
                debug!(
                    stream,
                    first_offset = prepared.first_offset,
                    count = prepared.count,
                    bytes = prepared.encoded.len(),
                    "batch appended"
                );
                prepared.result()
            }
            Err(refused) => refused,
        };

        Ok(HashMap::from([(StreamPartition::primary(stream), result)]))
    }

    fn read_from(&self, stream: &str, offset: Offset, max_bytes: usize) -> LogResult<Vec<RecordBatch>> {
        let Some(segment) = self.segment(stream) else {
            return Ok(Vec::new());
        };
        let seg = segment.read();
        let window = fetch_window(&seg.positions, offset, max_bytes);
        let Some(first) = window.first() else {
            return Ok(Vec::new());
        };

        // Batches in a window are contiguous in the file: one seek, one read.
        let start = first.position;
        let total: usize = window.iter().map(|p| p.size).sum();
        let mut file = File::open(&seg.path)?;
        file.seek(SeekFrom::Start(start))?;
        let mut data = vec![0u8; total];
        file.read_exact(&mut data)?;

        window
            .iter()
            .map(|p| {
                let from = (p.position - start) as usize;
                RecordBatch::decode(&data[from..from + p.size], p.position)
            })
            .collect()
    }

    fn end_offset(&self, stream: &str) -> LogResult<Offset> {
        Ok(self
            .segment(stream)
            .map(|segment| segment.read().next_offset)
            .unwrap_or(0))
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("dir", &self.dir)
            .field("streams", &self.streams())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;

    fn node(i: u8, len: usize) -> Record {
        Record::new(vec![i; 32], vec![i; len])
    }

    fn segment_path(dir: &Path, stream: &str) -> PathBuf {
        dir.join(format!("{stream}.{SEGMENT_EXT}"))
    }

    #[test]
    fn append_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
            log.append("nodes", &[node(1, 40), node(2, 40)], Compression::None)
                .unwrap();
            log.append("nodes", &[node(3, 40)], Compression::Zstd).unwrap();
        }

        let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
        assert_eq!(log.streams(), vec!["nodes".to_string()]);
        assert_eq!(log.end_offset("nodes").unwrap(), 3);

        let batches = log.read_from("nodes", 2, usize::MAX).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].compression, Compression::Zstd);
        assert_eq!(batches[0].records[0].value.as_deref(), Some(&[3u8; 40][..]));

        let result = log.append("nodes", &[node(4, 40)], Compression::None).unwrap();
        assert_eq!(
            result.get(&StreamPartition::primary("nodes")),
            Some(&AppendResult::Appended {
                first_offset: 3,
                last_offset: 3,
                message_count: 1
            })
        );
    }

    #[test]
    fn read_window_spans_several_batches() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
        for i in 0..5 {
            log.append("nodes", &[node(i, 100)], Compression::None).unwrap();
        }
        let one = log.read_from("nodes", 1, 10).unwrap();
        assert_eq!(one.len(), 1);
        let all = log.read_from("nodes", 1, usize::MAX).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.last().unwrap().base_offset, 4);
    }

    #[test]
    fn recovery_truncates_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), "nodes");
        {
            let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
            log.append("nodes", &[node(1, 64)], Compression::None).unwrap();
            log.append("nodes", &[node(2, 64)], Compression::None).unwrap();
        }
        let full_len = fs::metadata(&path).unwrap().len();
        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(full_len - 5).unwrap();
        }

        let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
        assert_eq!(log.end_offset("nodes").unwrap(), 1);
        assert!(fs::metadata(&path).unwrap().len() < full_len - 5);

        // The torn batch's offset is handed out again.
        let result = log.append("nodes", &[node(9, 64)], Compression::None).unwrap();
        assert!(matches!(
            result.get(&StreamPartition::primary("nodes")),
            Some(AppendResult::Appended { first_offset: 1, .. })
        ));
    }

    #[test]
    fn recovery_stops_at_corrupt_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = segment_path(dir.path(), "nodes");
        {
            let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
            log.append("nodes", &[node(1, 64)], Compression::None).unwrap();
            log.append("nodes", &[node(2, 64)], Compression::None).unwrap();
        }
        {
            // Flip the last byte of the file, inside the second batch.
            let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
            let len = file.metadata().unwrap().len();
            file.seek(SeekFrom::Start(len - 1)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(len - 1)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
        assert_eq!(log.end_offset("nodes").unwrap(), 1);
        assert_eq!(log.read_from("nodes", 0, usize::MAX).unwrap().len(), 1);
    }

    #[test]
    fn oversize_batch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            max_batch_bytes: 200,
            sync_mode: SyncMode::EveryWrite,
        };
        let log = FileLog::open(dir.path(), config).unwrap();
        let result = log.append("nodes", &[node(1, 500)], Compression::None).unwrap();
        assert!(matches!(
            result.get(&StreamPartition::primary("nodes")),
            Some(AppendResult::Failed { .. })
        ));
        assert_eq!(log.end_offset("nodes").unwrap(), 0);
        log.sync().unwrap();
    }

    #[test]
    fn invalid_stream_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLog::open(dir.path(), LogConfig::default()).unwrap();
        assert!(matches!(
            log.append("a/b", &[node(1, 1)], Compression::None),
            Err(LogError::InvalidStream(_))
        ));
    }
}
