//! Byte-key utilities and ordered containers.
//!
//! A region is located by an unsigned lexicographic byte compare on its row
//! key / region name -- exactly what `Vec<u8>`'s own `Ord` impl already
//! gives us, so these are thin named wrappers rather than a reimplementation
//! of the comparator. Giving them names keeps the meta map and the
//! transition table from being keyed on raw `Vec<u8>` everywhere.

use std::fmt;

/// A table name, e.g. `b"myTable"`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName(pub Vec<u8>);

/// A row key within a table. Ordering is unsigned lexicographic byte
/// compare, which is what `Vec<u8>`'s derived `Ord` already implements.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RowKey(pub Vec<u8>);

/// The full region name `<table,startKey,regionId>`, serialized the way the
/// catalog and coordination service expect to see it on the wire.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionName(pub Vec<u8>);

/// Marker prefix used to recognise rows that address the root region's
/// catalog table rather than a user table (see
/// `CatalogTracker::get_meta_region_for_row`).
pub const META_TABLE_PREFIX: &[u8] = b".META.,";

impl RegionName {
    pub fn new(table: &TableName, start_key: &RowKey, region_id: u64) -> Self {
        let mut buf = Vec::with_capacity(table.0.len() + start_key.0.len() + 21);
        buf.extend_from_slice(&table.0);
        buf.push(b',');
        buf.extend_from_slice(&start_key.0);
        buf.push(b',');
        buf.extend_from_slice(region_id.to_string().as_bytes());
        RegionName(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// A fixed-width, deterministic stand-in for the region's "encoded short
    /// name": the node key the coordination-service mirror is addressed by
    /// (see spec §6). Implemented as a 64-bit FNV-1a hash -- small and
    /// dependency-free, matching the teacher's own preference for hand
    /// rolled bit-math over pulling in a hashing crate for something this
    /// small (see `util::constants`'s own hand-written bit math).
    pub fn short_name(&self) -> ShortRegionName {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;
        let mut hash = FNV_OFFSET;
        for byte in &self.0 {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        ShortRegionName(hash)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortRegionName(pub u64);

impl fmt::Display for ShortRegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn fmt_bytes(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{}", s),
        _ => {
            write!(f, "0x")?;
            for b in bytes {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bytes(&self.0, f)
    }
}
impl fmt::Debug for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableName({})", self)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bytes(&self.0, f)
    }
}
impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({})", self)
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bytes(&self.0, f)
    }
}
impl fmt::Debug for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionName({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_byte_order() {
        // 0x80 sorts after 0x7f under unsigned comparison; if this were
        // signed i8 comparison it would sort before.
        let a = RowKey(vec![0x7f]);
        let b = RowKey(vec![0x80]);
        assert!(a < b);
    }

    #[test]
    fn short_name_is_deterministic() {
        let name = RegionName(b"t1,,1".to_vec());
        assert_eq!(name.short_name(), name.short_name());
        let other = RegionName(b"t1,,2".to_vec());
        assert_ne!(name.short_name(), other.short_name());
    }

    #[test]
    fn region_name_format() {
        let table = TableName(b"t1".to_vec());
        let start = RowKey(b"aaa".to_vec());
        let name = RegionName::new(&table, &start, 7);
        assert_eq!(name.as_bytes(), b"t1,aaa,7");
    }
}
