//! Serialization protocol of the binary variants
//!
//! ```text
//! [header 16 bytes]  node_count u64 | node_size u64
//! [slot 0]           root pointer u64, zero padded
//! [slot p >= 1]      payload | left u64 | right u64 | trailer
//! ```
//!
//! Records are written pre-order (node, left subtree, right subtree) at the
//! slot named by each node's pointer, so gaps left by removed nodes stay
//! zero-filled holes in the file.

use super::bst::{self, Balance};
use super::node::{dismantle, Link, Node, NodeAllocator, NodePointer, NULL_POINTER};
use super::ordering::KeyOrdering;
use crate::config::SyncMode;
use crate::storage::record::{get_u64, put_u64};
use crate::storage::{BinaryHeader, PayloadCodec, RecordLayout, RecordReader, RecordWriter};
use crate::{Result, TreeError};
use ahash::{AHashMap, AHashSet};
use std::path::Path;
use tracing::{debug, info, warn};

const POINTER_BYTES: usize = 16;

pub(crate) fn record_size<V, B: Balance>(codec: &dyn PayloadCodec<V>) -> u64 {
    (codec.payload_size() + POINTER_BYTES + B::TRAILER_SIZE) as u64
}

fn child_pointer<V, M>(link: &Link<V, M>) -> NodePointer {
    link.as_ref().map_or(NULL_POINTER, |node| node.node_pointer)
}

struct Encoder<'a, V> {
    writer: RecordWriter,
    codec: &'a dyn PayloadCodec<V>,
    buf: Vec<u8>,
}

impl<V> Encoder<'_, V> {
    fn write_tree<B: Balance>(&mut self, root: &Link<V, B::Meta>) -> Result<()> {
        let payload = self.codec.payload_size();
        let mut stack: Vec<&Node<V, B::Meta>> = root.as_deref().into_iter().collect();

        while let Some(node) = stack.pop() {
            self.buf.fill(0);
            self.codec.encode(&node.value, &mut self.buf[..payload])?;
            put_u64(&mut self.buf, payload, child_pointer(&node.left));
            put_u64(&mut self.buf, payload + 8, child_pointer(&node.right));
            B::encode_meta(&node.meta, &mut self.buf[payload + POINTER_BYTES..]);
            self.writer.write_record(node.node_pointer, &self.buf)?;

            stack.extend(node.right.as_deref());
            stack.extend(node.left.as_deref());
        }
        Ok(())
    }
}

pub(crate) fn serialize<V, B: Balance>(
    root: &Link<V, B::Meta>,
    node_count: u64,
    path: &Path,
    codec: &dyn PayloadCodec<V>,
    sync: SyncMode,
) -> Result<()> {
    let record_size = record_size::<V, B>(codec);
    let layout = RecordLayout::new(BinaryHeader::SIZE, record_size);
    let mut writer = RecordWriter::create(path, layout, sync)?;

    BinaryHeader { node_count, node_size: record_size }.write_to(writer.header_writer()?)?;

    let mut slot0 = vec![0u8; record_size as usize];
    put_u64(&mut slot0, 0, child_pointer(root));
    writer.write_record(NULL_POINTER, &slot0)?;

    let mut encoder = Encoder { writer, codec, buf: slot0 };
    encoder.write_tree::<B>(root)?;
    encoder.writer.commit()?;

    info!(
        path = %path.display(),
        node_count,
        record_size,
        "serialized tree"
    );
    Ok(())
}

/// Result of a successful parse
pub(crate) struct Parsed<V, M> {
    pub root: Link<V, M>,
    pub allocator: NodeAllocator,
    pub record_size: u64,
}

/// One decoded slot, children still as pointers
struct Record<V, M> {
    pointer: NodePointer,
    value: V,
    meta: M,
    left: NodePointer,
    right: NodePointer,
}

struct Decoder<'a, V> {
    reader: RecordReader,
    codec: &'a dyn PayloadCodec<V>,
    expected: u64,
    count: u64,
    max_pointer: NodePointer,
    visited: AHashSet<NodePointer>,
    buf: Vec<u8>,
}

impl<V> Decoder<'_, V> {
    fn read_record<B: Balance>(&mut self, pointer: NodePointer) -> Result<Record<V, B::Meta>> {
        if self.count >= self.expected {
            return Err(TreeError::corruption(format!(
                "more nodes reachable than the {} recorded in the header",
                self.expected
            )));
        }

        self.reader.seek_record(pointer)?;
        let pointer = self.reader.cursor_pointer()?;
        if pointer == NULL_POINTER || !self.visited.insert(pointer) {
            return Err(TreeError::corruption(format!("node {} is linked twice", pointer)));
        }
        self.reader.read_record(&mut self.buf)?;

        let payload = self.codec.payload_size();
        let record = Record {
            pointer,
            value: self.codec.decode(&self.buf[..payload])?,
            meta: B::decode_meta(&self.buf[payload + POINTER_BYTES..])?,
            left: get_u64(&self.buf, payload)?,
            right: get_u64(&self.buf, payload + 8)?,
        };

        self.count += 1;
        self.max_pointer = self.max_pointer.max(pointer);
        Ok(record)
    }

    /// Read every reachable record, then link the nodes bottom-up
    fn read_tree<B: Balance>(&mut self, root: NodePointer) -> Result<Link<V, B::Meta>> {
        let mut records = Vec::new();
        let mut pending = vec![root];
        while let Some(pointer) = pending.pop() {
            let record = self.read_record::<B>(pointer)?;
            if record.right != NULL_POINTER {
                pending.push(record.right);
            }
            if record.left != NULL_POINTER {
                pending.push(record.left);
            }
            records.push(record);
        }

        // Reversed pre-order puts every child before its parent.
        let mut built: AHashMap<NodePointer, Box<Node<V, B::Meta>>> = AHashMap::with_capacity(records.len());
        for record in records.into_iter().rev() {
            let mut node = Node::new(record.value, record.pointer, record.meta);
            node.left = built.remove(&record.left);
            node.right = built.remove(&record.right);
            B::derive_meta(&mut node);
            built.insert(record.pointer, node);
        }
        Ok(built.remove(&root))
    }
}

pub(crate) fn parse<V, K: ?Sized, B: Balance>(
    path: &Path,
    codec: &dyn PayloadCodec<V>,
    ordering: &KeyOrdering<V, K>,
) -> Result<Parsed<V, B::Meta>> {
    let mut reader = RecordReader::open(path, BinaryHeader::SIZE)?;
    let header = BinaryHeader::read_from(reader.header_reader()?)?;

    let record_size = record_size::<V, B>(codec);
    if header.node_size != record_size {
        warn!(
            path = %path.display(),
            file = header.node_size,
            expected = record_size,
            "record size mismatch"
        );
        return Err(TreeError::PayloadSize {
            expected: record_size as usize,
            actual: header.node_size as usize,
        });
    }
    reader.set_record_size(record_size)?;

    let mut slot0 = vec![0u8; record_size as usize];
    reader.seek_record(NULL_POINTER)?;
    reader.read_record(&mut slot0)?;
    let root_pointer = get_u64(&slot0, 0)?;

    if header.node_count == 0 || root_pointer == NULL_POINTER {
        if header.node_count != 0 || root_pointer != NULL_POINTER {
            warn!(path = %path.display(), node_count = header.node_count, root_pointer, "empty tree mismatch");
            return Err(TreeError::Corruption(format!(
                "header claims {} nodes but root pointer is {}",
                header.node_count, root_pointer
            )));
        }
        return Ok(Parsed { root: None, allocator: NodeAllocator::new(), record_size });
    }

    let mut decoder = Decoder {
        reader,
        codec,
        expected: header.node_count,
        count: 0,
        max_pointer: NULL_POINTER,
        visited: AHashSet::new(),
        buf: slot0,
    };
    let root = decoder.read_tree::<B>(root_pointer)?;

    if let Err(err) = validate::<V, K, B>(&root, ordering, header.node_count, decoder.count, path) {
        dismantle(root);
        return Err(err);
    }

    let allocator = NodeAllocator::resume(decoder.max_pointer, decoder.count)?;
    debug!(
        path = %path.display(),
        node_count = decoder.count,
        next_pointer = allocator.next_pointer(),
        "parsed tree"
    );
    Ok(Parsed { root, allocator, record_size })
}

fn validate<V, K: ?Sized, B: Balance>(
    root: &Link<V, B::Meta>,
    ordering: &KeyOrdering<V, K>,
    expected: u64,
    found: u64,
    path: &Path,
) -> Result<()> {
    if found != expected {
        warn!(path = %path.display(), header = expected, found, "node count mismatch");
        return Err(TreeError::Corruption(format!("header records {} nodes, found {}", expected, found)));
    }

    let depth = bst::depth(root);
    if let Some(limit) = B::depth_limit(found) {
        if depth > limit {
            warn!(path = %path.display(), depth, limit, "tree too deep for its variant");
            return Err(TreeError::Corruption(format!(
                "{} tree of {} nodes has depth {}",
                B::KIND,
                found,
                depth
            )));
        }
    }

    bst::check_order(root, ordering)
        .and_then(|_| B::check(root))
        .map_err(|reason| {
            warn!(path = %path.display(), %reason, "tree invariant violated");
            TreeError::Corruption(reason)
        })
}
