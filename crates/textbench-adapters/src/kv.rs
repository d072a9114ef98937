//! Key layout helpers shared by the sled-backed adapters.
//!
//! Composite keys join their parts with a `0` byte. Numeric ids are stored
//! big-endian so that prefix scans return them in ascending order.

use std::path::Path;

use sled::{Db, IVec, Tree};

/// Open a sled database at `path`, or a temporary one when `path` is `None`.
pub(crate) fn open_db(path: Option<&Path>) -> sled::Result<Db> {
    match path {
        Some(path) => sled::Config::new().path(path).open(),
        None => sled::Config::new().temporary(true).open(),
    }
}

/// Join key parts with a `0` separator. A trailing separator is always
/// written so that `key(&[a])` is a strict prefix of `key(&[a, b])`.
pub(crate) fn key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len() + 1).sum();
    let mut out = Vec::with_capacity(len);
    for part in parts {
        out.extend_from_slice(part);
        out.push(0);
    }
    out
}

/// Decode the big-endian `u64` at the end of a key.
pub(crate) fn trailing_u64(bytes: &[u8]) -> Option<u64> {
    let start = bytes.len().checked_sub(8)?;
    let raw: [u8; 8] = bytes[start..].try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

/// Decode a value written by [`increment`].
pub(crate) fn decode_u64(bytes: &[u8]) -> u64 {
    bytes
        .try_into()
        .map(u64::from_be_bytes)
        .unwrap_or_default()
}

/// Atomically add `by` to the counter stored at `key`.
pub(crate) fn increment(tree: &Tree, key: impl AsRef<[u8]>, by: u64) -> sled::Result<u64> {
    let updated = tree.update_and_fetch(key, |old| {
        let current = old.map(decode_u64).unwrap_or(0);
        Some(IVec::from(&(current + by).to_be_bytes()[..]))
    })?;
    Ok(updated.as_deref().map(decode_u64).unwrap_or(0))
}

/// Read a counter, `0` when absent.
pub(crate) fn counter(tree: &Tree, key: impl AsRef<[u8]>) -> sled::Result<u64> {
    Ok(tree.get(key)?.as_deref().map(decode_u64).unwrap_or(0))
}

/// Length-prefixed partition key. No partition is a prefix of another,
/// whatever bytes the part contains.
pub(crate) fn partition(part: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + part.len());
    out.extend_from_slice(&(part.len() as u64).to_be_bytes());
    out.extend_from_slice(part);
    out
}

/// Split a key starting with [`partition`] into the part and the rest.
pub(crate) fn split_partition(key: &[u8]) -> Option<(&[u8], &[u8])> {
    let len: [u8; 8] = key.get(..8)?.try_into().ok()?;
    let end = usize::try_from(u64::from_be_bytes(len)).ok()?.checked_add(8)?;
    Some((key.get(8..end)?, &key[end..]))
}

/// Empty every tree.
pub(crate) fn clear_trees(trees: &[&Tree]) -> sled::Result<()> {
    for tree in trees {
        tree.clear()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_property() {
        let short = key(&[b"d1"]);
        let long = key(&[b"d1", b"cat"]);
        assert!(long.starts_with(&short));
        assert!(!key(&[b"d10"]).starts_with(&short));
    }

    #[test]
    fn test_trailing_u64() {
        let mut bytes = key(&[b"lemma"]);
        bytes.extend_from_slice(&42u64.to_be_bytes());
        assert_eq!(trailing_u64(&bytes), Some(42));
        assert_eq!(trailing_u64(b"short"), None);
    }

    #[test]
    fn test_increment_and_counter() {
        let db = open_db(None).unwrap();
        let tree = db.open_tree("counts").unwrap();
        assert_eq!(counter(&tree, b"a").unwrap(), 0);
        assert_eq!(increment(&tree, b"a", 2).unwrap(), 2);
        assert_eq!(increment(&tree, b"a", 3).unwrap(), 5);
        assert_eq!(counter(&tree, b"a").unwrap(), 5);
    }

    #[test]
    fn test_partition_is_never_a_prefix_of_another() {
        let a = partition(b"a");
        assert!(!partition(b"a\0b").starts_with(&a));
        assert!(!partition(b"ab").starts_with(&a));

        let mut cell = partition(b"a\0b");
        cell.extend_from_slice(b"doc");
        assert_eq!(split_partition(&cell), Some((&b"a\0b"[..], &b"doc"[..])));
        assert_eq!(split_partition(b"short"), None);
    }
}
