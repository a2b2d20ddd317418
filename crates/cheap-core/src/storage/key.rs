//! Row key encoding.
//!
//! Every table lives in one sled tree. A key is a one-byte table tag followed
//! by the row's composite key, so child rows of a parent share a prefix and
//! cascades are prefix scans.
//!
//! | tag | table | key after the tag |
//! |---|---|---|
//! | `c` | catalogs | catalog id |
//! | `e` | entities | entity id |
//! | `a` | aspect_defs | catalog id, name |
//! | `p` | property_defs | aspect def id, name |
//! | `s` | aspects | catalog id, aspect def id, entity id |
//! | `v` | property_values | aspect id, property name |
//! | `h` | hierarchies | catalog id, name |
//! | `m` | hierarchy_entities | hierarchy id, position (u64 BE) or entity id |
//! | `d` | hierarchy_directory | hierarchy id, entry name |
//! | `i` | aspect def owners (index) | aspect def id |
//! | `r` | entity references (index) | entity id, key of the referencing row |
//!
//! The two index tables hold no data of their own. `i` maps an aspect def id
//! to the catalog that owns it. `r` has one empty row per aspect, membership
//! or directory entry that references an entity, so removing an entity is a
//! prefix scan.

pub(crate) const CATALOG: u8 = b'c';
pub(crate) const ENTITY: u8 = b'e';
pub(crate) const ASPECT_DEF: u8 = b'a';
pub(crate) const PROPERTY_DEF: u8 = b'p';
pub(crate) const ASPECT: u8 = b's';
pub(crate) const PROPERTY_VALUE: u8 = b'v';
pub(crate) const HIERARCHY: u8 = b'h';
pub(crate) const MEMBER: u8 = b'm';
pub(crate) const ENTRY: u8 = b'd';
pub(crate) const ASPECT_DEF_OWNER: u8 = b'i';
pub(crate) const REFERENCE: u8 = b'r';

/// Length of a table tag plus one id.
pub(crate) const ID_PREFIX_LEN: usize = 1 + 16;

/// Build a key from a table tag and its parts.
pub(crate) fn row_key(table: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(table);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Member key of an entity list position.
pub(crate) fn position_key(hierarchy_id: &[u8], position: u64) -> Vec<u8> {
    row_key(MEMBER, &[hierarchy_id, &position.to_be_bytes()])
}

/// Index key recording that the row at `key` references `entity`.
pub(crate) fn reference_key(entity: &[u8], key: &[u8]) -> Vec<u8> {
    row_key(REFERENCE, &[entity, key])
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_share_parent_prefix() {
        let hierarchy = [7u8; 16];
        let prefix = row_key(MEMBER, &[&hierarchy]);
        let first = row_key(MEMBER, &[&hierarchy, &0u64.to_be_bytes()]);
        let second = row_key(MEMBER, &[&hierarchy, &1u64.to_be_bytes()]);
        assert!(first.starts_with(&prefix));
        assert!(first < second);
        assert_eq!(first.len(), 1 + 16 + 8);
    }

    #[test]
    fn test_reference_key_embeds_row_key() {
        let entity = [3u8; 16];
        let member = position_key(&[7u8; 16], 4);
        let reference = reference_key(&entity, &member);
        assert!(reference.starts_with(&row_key(REFERENCE, &[&entity])));
        assert_eq!(&reference[ID_PREFIX_LEN..], member.as_slice());
    }

    #[test]
    fn test_big_endian_positions_sort_numerically() {
        let h = [0u8; 16];
        let k255 = row_key(MEMBER, &[&h, &255u64.to_be_bytes()]);
        let k256 = row_key(MEMBER, &[&h, &256u64.to_be_bytes()]);
        assert!(k255 < k256);
    }
}
