//! Binary row keys
//!
//! All integers are written big-endian with the sign bit flipped so that
//! byte order matches numeric order and prefix range scans work.

use crate::error::StoreError;
use strand_model::{Behavior, ChainKey, EntryKey, Muid, Timestamp, UserKey};

pub const MUID_LEN: usize = 20;

pub fn encode_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_i64(bytes: &[u8]) -> Result<i64, StoreError> {
    let arr: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StoreError::Corrupt("short i64".into()))?;
    Ok((u64::from_be_bytes(arr) ^ (1 << 63)) as i64)
}

fn encode_i32(v: i32) -> [u8; 4] {
    ((v as u32) ^ (1 << 31)).to_be_bytes()
}

fn decode_i32(bytes: &[u8]) -> Result<i32, StoreError> {
    let arr: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| StoreError::Corrupt("short i32".into()))?;
    Ok((u32::from_be_bytes(arr) ^ (1 << 31)) as i32)
}

fn encode_f64(v: f64) -> [u8; 8] {
    // Same total order as f64::total_cmp.
    let bits = v.to_bits();
    let flipped = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
    flipped.to_be_bytes()
}

pub fn muid(m: &Muid) -> [u8; MUID_LEN] {
    let mut out = [0u8; MUID_LEN];
    out[..8].copy_from_slice(&encode_i64(m.timestamp));
    out[8..16].copy_from_slice(&encode_i64(m.medallion));
    out[16..].copy_from_slice(&encode_i32(m.offset));
    out
}

pub fn decode_muid(bytes: &[u8]) -> Result<Muid, StoreError> {
    if bytes.len() != MUID_LEN {
        return Err(StoreError::Corrupt("muid length".into()));
    }
    Ok(Muid::new(decode_i64(&bytes[..8])?, decode_i64(&bytes[8..16])?, decode_i32(&bytes[16..])?))
}

/// Timestamp stored in the first eight bytes of an encoded muid.
pub fn muid_timestamp(bytes: &[u8]) -> Result<Timestamp, StoreError> {
    decode_i64(bytes)
}

/// `timestamp ++ medallion`: bundles in application order.
pub fn bundle(timestamp: Timestamp, medallion: i64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&encode_i64(timestamp));
    out[8..].copy_from_slice(&encode_i64(medallion));
    out
}

pub fn chain(chain: ChainKey) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&encode_i64(chain.medallion));
    out[8..].copy_from_slice(&encode_i64(chain.chain_start));
    out
}

pub fn decode_chain(bytes: &[u8]) -> Result<ChainKey, StoreError> {
    if bytes.len() != 16 {
        return Err(StoreError::Corrupt("chain key length".into()));
    }
    Ok(ChainKey::new(decode_i64(&bytes[..8])?, decode_i64(&bytes[8..])?))
}

/// Self-delimiting encoding of a semantic key.
pub fn entry_key(key: &EntryKey, out: &mut Vec<u8>) {
    match key {
        EntryKey::None => out.push(0),
        EntryKey::User(UserKey::Number(n)) => {
            out.push(1);
            out.extend_from_slice(&encode_f64(*n));
        }
        EntryKey::User(UserKey::String(s)) => {
            out.push(2);
            out.extend_from_slice(&(s.len() as u32).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        EntryKey::Describing(m) => {
            out.push(3);
            out.extend_from_slice(&muid(m));
        }
        EntryKey::Pair(l, r) => {
            out.push(4);
            out.extend_from_slice(&muid(l));
            out.extend_from_slice(&muid(r));
        }
    }
}

/// `container ++ behavior`: every entry of a container.
pub fn container_prefix(container: &Muid, behavior: Behavior) -> Vec<u8> {
    let mut out = Vec::with_capacity(MUID_LEN + 1 + 48);
    out.extend_from_slice(&muid(container));
    out.push(behavior.code() as u8);
    out
}

/// `container ++ behavior ++ key`: every version of one slot.
pub fn slot_prefix(container: &Muid, behavior: Behavior, key: &EntryKey) -> Vec<u8> {
    let mut out = container_prefix(container, behavior);
    entry_key(key, &mut out);
    out
}

/// Full entry row key; the entry id is always the last `MUID_LEN` bytes.
pub fn entry_row(container: &Muid, behavior: Behavior, key: &EntryKey, entry_id: &Muid) -> Vec<u8> {
    let mut out = slot_prefix(container, behavior, key);
    out.extend_from_slice(&muid(entry_id));
    out
}

/// `container ++ entry`: exits recorded against one entry.
pub fn exit_prefix(container: &Muid, entry_id: &Muid) -> Vec<u8> {
    let mut out = Vec::with_capacity(MUID_LEN * 3);
    out.extend_from_slice(&muid(container));
    out.extend_from_slice(&muid(entry_id));
    out
}

pub fn exit_row(container: &Muid, entry_id: &Muid, movement: &Muid) -> Vec<u8> {
    let mut out = exit_prefix(container, entry_id);
    out.extend_from_slice(&muid(movement));
    out
}

/// `pointee ++ entry row key`.
pub fn pointee_row(pointee: &Muid, entry_row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MUID_LEN + entry_row.len());
    out.extend_from_slice(&muid(pointee));
    out.extend_from_slice(entry_row);
    out
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when the prefix is all `0xff`.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_order_preserved() {
        let values = [i64::MIN, -1000, -1, 0, 1, 1643351021040000, i64::MAX];
        for pair in values.windows(2) {
            assert!(encode_i64(pair[0]) < encode_i64(pair[1]));
            assert_eq!(decode_i64(&encode_i64(pair[0])).unwrap(), pair[0]);
        }
    }

    #[test]
    fn test_f64_order_preserved() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1.0, 1e300];
        for pair in values.windows(2) {
            assert!(encode_f64(pair[0]) < encode_f64(pair[1]));
        }
    }

    #[test]
    fn test_muid_order_matches_struct_order() {
        let a = Muid::new(-1, -1, 4);
        let b = Muid::new(10, 5, 1);
        let c = Muid::new(10, 5, 2);
        let d = Muid::new(11, 1, 1);
        assert!(muid(&a) < muid(&b) && muid(&b) < muid(&c) && muid(&c) < muid(&d));
    }

    #[test]
    fn test_string_slot_does_not_match_longer_key() {
        let container = Muid::new(1, 2, 3);
        let short = slot_prefix(&container, Behavior::Directory, &EntryKey::user("ab"));
        let long = entry_row(
            &container,
            Behavior::Directory,
            &EntryKey::user("abc"),
            &Muid::new(5, 5, 5),
        );
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn test_muid_decodes_back() {
        let m = Muid::new(1643351021040000, -7, -3);
        assert_eq!(decode_muid(&muid(&m)).unwrap(), m);
        assert!(decode_muid(&muid(&m)[..12]).is_err());
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(prefix_end(&[1, 0xff]), Some(vec![2]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
    }
}
