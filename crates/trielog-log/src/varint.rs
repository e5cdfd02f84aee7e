//! Zig-zag variable-length integers as used by the record format.
//!
//! Each byte carries 7 bits of payload and a continuation bit. Signed values
//! are zig-zag mapped first so small negative numbers (a null length of -1)
//! stay one byte long.

use bytes::{Buf, BufMut};

use crate::error::{LogError, LogResult};

/// Encoded size of a 32-bit varint.
pub fn size_of_varint(value: i32) -> usize {
    size_of_unsigned(zigzag32(value) as u64)
}

/// Encoded size of a 64-bit varint.
pub fn size_of_varlong(value: i64) -> usize {
    size_of_unsigned(zigzag64(value))
}

pub fn put_varint(buf: &mut impl BufMut, value: i32) {
    put_unsigned(buf, zigzag32(value) as u64);
}

pub fn put_varlong(buf: &mut impl BufMut, value: i64) {
    put_unsigned(buf, zigzag64(value));
}

pub fn get_varint(buf: &mut impl Buf) -> LogResult<i32> {
    let raw = get_unsigned(buf, 5)?;
    let raw = u32::try_from(raw).map_err(|_| LogError::Varint("varint exceeds 32 bits"))?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

pub fn get_varlong(buf: &mut impl Buf) -> LogResult<i64> {
    let raw = get_unsigned(buf, 10)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

fn zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn size_of_unsigned(mut value: u64) -> usize {
    let mut bytes = 1;
    while value >= 0x80 {
        value >>= 7;
        bytes += 1;
    }
    bytes
}

fn put_unsigned(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn get_unsigned(buf: &mut impl Buf, max_bytes: usize) -> LogResult<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for _ in 0..max_bytes {
        if !buf.has_remaining() {
            return Err(LogError::Varint("truncated varint"));
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(LogError::Varint("varint too long"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn null_length_is_one_byte() {
        assert_eq!(size_of_varint(-1), 1);
        let mut buf = Vec::new();
        put_varint(&mut buf, -1);
        assert_eq!(buf, vec![0x01]);
    }

    #[test]
    fn boundaries() {
        assert_eq!(size_of_varint(0), 1);
        assert_eq!(size_of_varint(63), 1);
        assert_eq!(size_of_varint(64), 2);
        assert_eq!(size_of_varint(-64), 1);
        assert_eq!(size_of_varint(-65), 2);
        assert_eq!(size_of_varint(i32::MAX), 5);
        assert_eq!(size_of_varlong(i64::MIN), 10);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut buf: &[u8] = &[0x80, 0x80];
        assert!(matches!(get_varint(&mut buf), Err(LogError::Varint(_))));
    }

    #[test]
    fn overlong_input_is_an_error() {
        let mut buf: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        assert!(matches!(get_varint(&mut buf), Err(LogError::Varint(_))));
    }

    proptest! {
        #[test]
        fn size_matches_encoding_32(value in any::<i32>()) {
            let mut buf = Vec::new();
            put_varint(&mut buf, value);
            prop_assert_eq!(buf.len(), size_of_varint(value));
            let mut slice = buf.as_slice();
            prop_assert_eq!(get_varint(&mut slice).unwrap(), value);
        }

        #[test]
        fn size_matches_encoding_64(value in any::<i64>()) {
            let mut buf = Vec::new();
            put_varlong(&mut buf, value);
            prop_assert_eq!(buf.len(), size_of_varlong(value));
            let mut slice = buf.as_slice();
            prop_assert_eq!(get_varlong(&mut slice).unwrap(), value);
        }
    }
}
