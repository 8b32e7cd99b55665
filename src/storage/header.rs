//! File headers
//!
//! Both headers are bincode-encoded with the default (fixint, little-endian)
//! options, so their sizes are fixed: 16 bytes for binary variants and
//! 44 bytes for the B-tree.

use crate::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Header of a binary, AVL or red-black tree file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryHeader {
    /// Live nodes in the tree
    pub node_count: u64,

    /// Bytes per record slot (payload + child pointers + variant trailer)
    pub node_size: u64,
}

impl BinaryHeader {
    pub const SIZE: u64 = 16;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(bincode::deserialize_from(reader)?)
    }
}

/// Header of a B-tree file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeHeader {
    /// Live nodes in the tree
    pub node_count: u64,

    /// Bytes per record slot
    pub node_size: u64,

    /// Values stored across all nodes
    pub key_quantity: u64,

    /// Node pointer of the root
    pub root_address: u64,

    /// Minimum degree `t`
    pub degree: i32,

    /// 32-bit copy of `node_count`
    pub node_quantity: i32,

    /// Edges from the root to any leaf
    pub height: i32,
}

impl BTreeHeader {
    pub const SIZE: u64 = 44;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let header: Self = bincode::deserialize_from(reader)?;
        if i64::from(header.node_quantity) != header.node_count as i64 {
            return Err(TreeError::Corruption(format!(
                "node_quantity {} does not match node_count {}",
                header.node_quantity, header.node_count
            )));
        }
        if header.degree < 2 || header.height < 0 {
            return Err(TreeError::Corruption(format!(
                "invalid degree {} or height {}",
                header.degree, header.height
            )));
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_header_layout() {
        let header = BinaryHeader { node_count: 3, node_size: 24 };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        assert_eq!(buf.len() as u64, BinaryHeader::SIZE);
        assert_eq!(&buf[..8], &3u64.to_le_bytes());
        assert_eq!(&buf[8..], &24u64.to_le_bytes());
        assert_eq!(BinaryHeader::read_from(&mut buf.as_slice()).unwrap(), header);
    }

    #[test]
    fn test_btree_header_layout() {
        let header = BTreeHeader {
            node_count: 3,
            node_size: 72,
            key_quantity: 6,
            root_address: 4,
            degree: 2,
            node_quantity: 3,
            height: 1,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        assert_eq!(buf.len() as u64, BTreeHeader::SIZE);
        assert_eq!(&buf[24..32], &4u64.to_le_bytes());
        assert_eq!(&buf[32..36], &2i32.to_le_bytes());
        assert_eq!(BTreeHeader::read_from(&mut buf.as_slice()).unwrap(), header);
    }

    #[test]
    fn test_btree_header_count_mismatch() {
        let header = BTreeHeader {
            node_count: 3,
            node_size: 72,
            key_quantity: 6,
            root_address: 4,
            degree: 2,
            node_quantity: 2,
            height: 1,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        assert!(matches!(
            BTreeHeader::read_from(&mut buf.as_slice()),
            Err(TreeError::Corruption(_))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let buf = [0u8; 10];
        assert!(BinaryHeader::read_from(&mut &buf[..]).is_err());
    }
}
