//! On-disk concerns: payload codecs, file headers and fixed-size record files

pub mod codec;
pub mod header;
pub mod record;

pub use codec::{BincodeCodec, FixedCodec, FixedWidth, FnCodec, PayloadCodec};
pub use header::{BTreeHeader, BinaryHeader};
pub use record::{RecordLayout, RecordReader, RecordWriter};
