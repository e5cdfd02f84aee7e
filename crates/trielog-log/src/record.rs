//! Record and record-batch wire format.
//!
//! Batch layout (big-endian, 61-byte header):
//! ```text
//! base offset            i64
//! batch length           i32   bytes after this field
//! partition leader epoch i32
//! magic                  i8    = 2
//! crc                    u32   CRC32 of everything from attributes to the end
//! attributes             i16   compression codec in the low 3 bits
//! last offset delta      i32
//! first timestamp        i64
//! max timestamp          i64
//! producer id            i64   = -1
//! producer epoch         i16   = -1
//! base sequence          i32   = -1
//! record count           i32
//! records                ...   zstd-compressed when the codec says so
//! ```
//!
//! Record layout:
//! ```text
//! length            varint
//! attributes        i8
//! timestamp delta   varlong
//! offset delta      varint
//! key length        varint (-1 = null), key bytes
//! value length      varint (-1 = null), value bytes
//! header count      varint
//! headers           key length, key (UTF-8), value length (-1 = null), value
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes};
use serde::{Deserialize, Serialize};
use trielog_types::Offset;

use crate::error::{LogError, LogResult};
use crate::varint::{get_varint, get_varlong, put_varint, put_varlong, size_of_varint, size_of_varlong};

/// Fixed size of a batch header.
pub const RECORD_BATCH_OVERHEAD: usize = 61;

/// Base offset plus batch length: the prefix needed to frame a batch.
pub const LOG_OVERHEAD: usize = 12;

/// Current (and only) record format version.
pub const MAGIC: i8 = 2;

const MAGIC_OFFSET: usize = 16;
const CRC_OFFSET: usize = 17;
const ATTRIBUTES_OFFSET: usize = 21;
const COMPRESSION_CODEC_MASK: i16 = 0x07;
const NO_PRODUCER_ID: i64 = -1;
const NO_PRODUCER_EPOCH: i16 = -1;
const NO_SEQUENCE: i32 = -1;
const ZSTD_LEVEL: i32 = 3;

/// Compression applied to the record section of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Zstd,
}

impl Compression {
    fn codec_bits(self) -> i16 {
        match self {
            Self::None => 0,
            Self::Zstd => 4,
        }
    }

    fn from_attributes(attributes: i16) -> LogResult<Self> {
        match attributes & COMPRESSION_CODEC_MASK {
            0 => Ok(Self::None),
            4 => Ok(Self::Zstd),
            other => Err(LogError::UnknownCompression(other)),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Zstd => write!(f, "zstd"),
        }
    }
}

/// A record header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Option<Bytes>,
}

/// A record as handed to the log for appending. The log assigns its offset
/// and timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Record {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    /// A keyed record without headers.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            headers: Vec::new(),
        }
    }
}

/// A record as read back from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub offset: Offset,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

/// Exact encoded size of one record.
///
/// Callers building batches sum this over their records and add
/// [`RECORD_BATCH_OVERHEAD`] to know the uncompressed size of the batch
/// before asking the log to append it.
pub fn record_size_in_bytes(
    offset_delta: i32,
    timestamp_delta: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[Header],
) -> usize {
    let body = record_body_size(offset_delta, timestamp_delta, key, value, headers);
    size_of_varint(body as i32) + body
}

fn record_body_size(
    offset_delta: i32,
    timestamp_delta: i64,
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[Header],
) -> usize {
    let mut size = 1; // attributes
    size += size_of_varlong(timestamp_delta);
    size += size_of_varint(offset_delta);
    size += nullable_size(key);
    size += nullable_size(value);
    size += size_of_varint(headers.len() as i32);
    for header in headers {
        size += size_of_varint(header.key.len() as i32) + header.key.len();
        size += nullable_size(header.value.as_deref());
    }
    size
}

fn nullable_size(bytes: Option<&[u8]>) -> usize {
    match bytes {
        Some(b) => size_of_varint(b.len() as i32) + b.len(),
        None => size_of_varint(-1),
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A batch of records with consecutive offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordBatch {
    pub base_offset: Offset,
    pub first_timestamp: i64,
    pub compression: Compression,
    pub records: Vec<StoredRecord>,
}

impl RecordBatch {
    /// Assign offsets `base_offset..` and a shared timestamp to `records`.
    pub fn from_records(
        base_offset: Offset,
        timestamp: i64,
        compression: Compression,
        records: &[Record],
    ) -> Self {
        let records = records
            .iter()
            .enumerate()
            .map(|(i, r)| StoredRecord {
                offset: base_offset + i as u64,
                timestamp,
                key: r.key.clone(),
                value: r.value.clone(),
                headers: r.headers.clone(),
            })
            .collect();
        Self {
            base_offset,
            first_timestamp: timestamp,
            compression,
            records,
        }
    }

    /// Offset of the last record, or `None` for an empty batch.
    pub fn last_offset(&self) -> Option<Offset> {
        self.records.last().map(|r| r.offset)
    }

    /// Encode the batch.
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        let mut body = Vec::new();
        let mut max_timestamp = self.first_timestamp;
        for record in &self.records {
            let offset_delta = (record.offset - self.base_offset) as i32;
            let timestamp_delta = record.timestamp - self.first_timestamp;
            max_timestamp = max_timestamp.max(record.timestamp);
            encode_record(&mut body, offset_delta, timestamp_delta, record);
        }

        let body = match self.compression {
            Compression::None => body,
            Compression::Zstd => zstd::encode_all(body.as_slice(), ZSTD_LEVEL)
                .map_err(|e| LogError::Compression(e.to_string()))?,
        };

        let last_offset_delta = self
            .last_offset()
            .map(|last| (last - self.base_offset) as i32)
            .unwrap_or(0);
        let batch_length = RECORD_BATCH_OVERHEAD - LOG_OVERHEAD + body.len();

        let mut buf = Vec::with_capacity(RECORD_BATCH_OVERHEAD + body.len());
        buf.put_i64(self.base_offset as i64);
        buf.put_i32(batch_length as i32);
        buf.put_i32(0); // partition leader epoch
        buf.put_i8(MAGIC);
        buf.put_u32(0); // crc, patched below
        buf.put_i16(self.compression.codec_bits());
        buf.put_i32(last_offset_delta);
        buf.put_i64(self.first_timestamp);
        buf.put_i64(max_timestamp);
        buf.put_i64(NO_PRODUCER_ID);
        buf.put_i16(NO_PRODUCER_EPOCH);
        buf.put_i32(NO_SEQUENCE);
        buf.put_i32(self.records.len() as i32);
        debug_assert_eq!(buf.len(), RECORD_BATCH_OVERHEAD);
        buf.extend_from_slice(&body);

        let crc = crc32fast::hash(&buf[ATTRIBUTES_OFFSET..]);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }

    /// Total encoded length of the batch starting at `prefix`, read from its
    /// first [`LOG_OVERHEAD`] bytes. `None` if the length field is invalid.
    pub fn framed_len(prefix: &[u8; LOG_OVERHEAD]) -> Option<usize> {
        let batch_length = i32::from_be_bytes([prefix[8], prefix[9], prefix[10], prefix[11]]);
        let batch_length = usize::try_from(batch_length).ok()?;
        if batch_length < RECORD_BATCH_OVERHEAD - LOG_OVERHEAD {
            return None;
        }
        Some(LOG_OVERHEAD + batch_length)
    }

    /// Decode exactly one encoded batch. `position` is only used in errors.
    pub fn decode(data: &[u8], position: u64) -> LogResult<Self> {
        let corrupt = |reason: String| LogError::CorruptBatch { position, reason };

        if data.len() < RECORD_BATCH_OVERHEAD {
            return Err(corrupt(format!("{} bytes is shorter than a batch header", data.len())));
        }
        let mut prefix = [0u8; LOG_OVERHEAD];
        prefix.copy_from_slice(&data[..LOG_OVERHEAD]);
        match Self::framed_len(&prefix) {
            Some(len) if len == data.len() => {}
            other => {
                return Err(corrupt(format!(
                    "batch length {other:?} does not match {} available bytes",
                    data.len()
                )))
            }
        }

        let magic = data[MAGIC_OFFSET] as i8;
        if magic != MAGIC {
            return Err(LogError::UnsupportedMagic(magic));
        }

        let mut header = data;
        let base_offset = header.get_i64() as u64;
        let _batch_length = header.get_i32();
        let _leader_epoch = header.get_i32();
        let _magic = header.get_i8();
        let expected_crc = header.get_u32();
        let actual_crc = crc32fast::hash(&data[ATTRIBUTES_OFFSET..]);
        if expected_crc != actual_crc {
            return Err(LogError::CrcMismatch {
                base_offset,
                expected: expected_crc,
                actual: actual_crc,
            });
        }
        let compression = Compression::from_attributes(header.get_i16())?;
        let last_offset_delta = header.get_i32();
        let first_timestamp = header.get_i64();
        let _max_timestamp = header.get_i64();
        let _producer_id = header.get_i64();
        let _producer_epoch = header.get_i16();
        let _base_sequence = header.get_i32();
        let count = header.get_i32();
        if count < 0 {
            return Err(corrupt(format!("negative record count {count}")));
        }

        let decompressed;
        let mut body: &[u8] = match compression {
            Compression::None => header,
            Compression::Zstd => {
                decompressed = zstd::decode_all(header)
                    .map_err(|e| LogError::Compression(e.to_string()))?;
                decompressed.as_slice()
            }
        };

        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(decode_record(&mut body, base_offset, first_timestamp, position)?);
        }
        if body.has_remaining() {
            return Err(corrupt(format!("{} trailing bytes after records", body.remaining())));
        }
        if let Some(last) = records.last() {
            if last.offset != base_offset + last_offset_delta as u64 {
                return Err(corrupt("last offset delta disagrees with records".into()));
            }
        }

        Ok(Self {
            base_offset,
            first_timestamp,
            compression,
            records,
        })
    }
}

fn encode_record(buf: &mut Vec<u8>, offset_delta: i32, timestamp_delta: i64, record: &StoredRecord) {
    let body_size = record_body_size(
        offset_delta,
        timestamp_delta,
        record.key.as_deref(),
        record.value.as_deref(),
        &record.headers,
    );
    put_varint(buf, body_size as i32);
    buf.put_i8(0); // attributes
    put_varlong(buf, timestamp_delta);
    put_varint(buf, offset_delta);
    put_nullable(buf, record.key.as_deref());
    put_nullable(buf, record.value.as_deref());
    put_varint(buf, record.headers.len() as i32);
    for header in &record.headers {
        put_varint(buf, header.key.len() as i32);
        buf.put_slice(header.key.as_bytes());
        put_nullable(buf, header.value.as_deref());
    }
}

fn put_nullable(buf: &mut Vec<u8>, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            put_varint(buf, b.len() as i32);
            buf.put_slice(b);
        }
        None => put_varint(buf, -1),
    }
}

fn decode_record(
    buf: &mut &[u8],
    base_offset: Offset,
    first_timestamp: i64,
    position: u64,
) -> LogResult<StoredRecord> {
    let corrupt = |reason: &str| LogError::CorruptBatch {
        position,
        reason: reason.to_string(),
    };

    let length = get_varint(buf)?;
    let length = usize::try_from(length).map_err(|_| corrupt("negative record length"))?;
    if buf.remaining() < length {
        return Err(corrupt("record extends past end of batch"));
    }
    let data: &[u8] = *buf;
    let mut body = &data[..length];
    *buf = &data[length..];

    if !body.has_remaining() {
        return Err(corrupt("empty record"));
    }
    let _attributes = body.get_i8();
    let timestamp_delta = get_varlong(&mut body)?;
    let offset_delta = get_varint(&mut body)?;
    if offset_delta < 0 {
        return Err(corrupt("negative offset delta"));
    }
    let key = get_nullable(&mut body).ok_or_else(|| corrupt("bad key length"))?;
    let value = get_nullable(&mut body).ok_or_else(|| corrupt("bad value length"))?;
    let header_count = get_varint(&mut body)?;
    let header_count = usize::try_from(header_count).map_err(|_| corrupt("negative header count"))?;
    let mut headers = Vec::with_capacity(header_count.min(16));
    for _ in 0..header_count {
        let key = get_nullable(&mut body)
            .flatten()
            .ok_or_else(|| corrupt("bad header key"))?;
        let key = String::from_utf8(key.to_vec()).map_err(|_| corrupt("header key is not UTF-8"))?;
        let value = get_nullable(&mut body).ok_or_else(|| corrupt("bad header value length"))?;
        headers.push(Header { key, value });
    }
    if body.has_remaining() {
        return Err(corrupt("record length disagrees with contents"));
    }

    Ok(StoredRecord {
        offset: base_offset + offset_delta as u64,
        timestamp: first_timestamp + timestamp_delta,
        key,
        value,
        headers,
    })
}

/// `Some(None)` for a null field, `Some(Some(bytes))` for present bytes,
/// `None` when the length is malformed or runs past the buffer.
fn get_nullable(buf: &mut &[u8]) -> Option<Option<Bytes>> {
    let len = get_varint(buf).ok()?;
    if len == -1 {
        return Some(None);
    }
    let len = usize::try_from(len).ok()?;
    if buf.remaining() < len {
        return None;
    }
    let bytes = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Some(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_records(n: usize, value_len: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(vec![i as u8; 32], vec![(i * 7) as u8; value_len]))
            .collect()
    }

    fn estimated_size(records: &[Record]) -> usize {
        RECORD_BATCH_OVERHEAD
            + records
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    record_size_in_bytes(i as i32, 0, r.key.as_deref(), r.value.as_deref(), &r.headers)
                })
                .sum::<usize>()
    }

    #[test]
    fn header_is_61_bytes() {
        let batch = RecordBatch::from_records(0, 0, Compression::None, &[]);
        assert_eq!(batch.encode().unwrap().len(), RECORD_BATCH_OVERHEAD);
    }

    #[test]
    fn size_accounting_matches_encoding_exactly() {
        for (n, len) in [(1, 0), (3, 17), (40, 200), (5, 5000)] {
            let records = node_records(n, len);
            let batch = RecordBatch::from_records(1234, 99, Compression::None, &records);
            assert_eq!(batch.encode().unwrap().len(), estimated_size(&records), "n={n} len={len}");
        }
    }

    #[test]
    fn size_accounting_counts_nulls_and_headers() {
        let records = vec![
            Record {
                key: None,
                value: None,
                headers: vec![],
            },
            Record {
                key: Some(Bytes::from_static(b"k")),
                value: None,
                headers: vec![
                    Header {
                        key: "origin".into(),
                        value: Some(Bytes::from_static(b"sync")),
                    },
                    Header {
                        key: "empty".into(),
                        value: None,
                    },
                ],
            },
        ];
        let batch = RecordBatch::from_records(0, 0, Compression::None, &records);
        assert_eq!(batch.encode().unwrap().len(), estimated_size(&records));
    }

    #[test]
    fn decode_restores_offsets_and_payloads() {
        let records = node_records(4, 64);
        let batch = RecordBatch::from_records(10, 1_700_000_000_000, Compression::None, &records);
        let decoded = RecordBatch::decode(&batch.encode().unwrap(), 0).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.records[3].offset, 13);
        assert_eq!(decoded.last_offset(), Some(13));
    }

    #[test]
    fn zstd_batch_decodes_and_shrinks() {
        let records = node_records(20, 512);
        let plain = RecordBatch::from_records(0, 5, Compression::None, &records);
        let packed = RecordBatch::from_records(0, 5, Compression::Zstd, &records);
        let plain_bytes = plain.encode().unwrap();
        let packed_bytes = packed.encode().unwrap();
        assert!(packed_bytes.len() < plain_bytes.len());
        assert_eq!(RecordBatch::decode(&packed_bytes, 0).unwrap(), packed);
    }

    #[test]
    fn crc_detects_corruption() {
        let batch = RecordBatch::from_records(0, 0, Compression::None, &node_records(2, 8));
        let mut bytes = batch.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            RecordBatch::decode(&bytes, 0),
            Err(LogError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let batch = RecordBatch::from_records(0, 0, Compression::None, &node_records(1, 8));
        let mut bytes = batch.encode().unwrap();
        bytes[MAGIC_OFFSET] = 1;
        assert!(matches!(
            RecordBatch::decode(&bytes, 0),
            Err(LogError::UnsupportedMagic(1))
        ));
    }

    #[test]
    fn truncated_batch_rejected() {
        let batch = RecordBatch::from_records(0, 0, Compression::None, &node_records(2, 8));
        let bytes = batch.encode().unwrap();
        let err = RecordBatch::decode(&bytes[..bytes.len() - 3], 77).unwrap_err();
        assert!(matches!(err, LogError::CorruptBatch { position: 77, .. }));
    }

    #[test]
    fn framed_len_reads_prefix() {
        let batch = RecordBatch::from_records(3, 0, Compression::None, &node_records(2, 8));
        let bytes = batch.encode().unwrap();
        let mut prefix = [0u8; LOG_OVERHEAD];
        prefix.copy_from_slice(&bytes[..LOG_OVERHEAD]);
        assert_eq!(RecordBatch::framed_len(&prefix), Some(bytes.len()));
    }
}
