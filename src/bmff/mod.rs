//! ISOBMFF box layer
//!
//! Parses the length-prefixed, recursively nested box format used by
//! HEIF/HEIC containers into a typed tree, and serializes that tree back
//! losslessly. Security ceilings below are fixed constants of the format
//! handling, not user-configurable knobs.

pub mod boxes;
pub mod parse;
pub mod reader;
pub mod write;

pub use boxes::{BoxHeader, BoxKind, BoxNode, FourCC, FullBoxHeader};
pub use parse::read_file;
pub use reader::{ByteRangeReader, GrowStatus};
pub use write::{derive_box_version, finalize_and_write, write_boxes};

/// Maximum box-in-box nesting depth; caps stack depth on adversarial input.
pub const MAX_BOX_NESTING_LEVEL: u32 = 20;

/// Maximum children accepted per container box.
pub const MAX_CHILDREN_PER_BOX: usize = 20_000;

/// Maximum items accepted in one `iloc` box.
pub const MAX_ILOC_ITEMS: usize = 20_000;

/// Maximum extents accepted per `iloc` item.
pub const MAX_ILOC_EXTENTS_PER_ITEM: usize = 32;

/// Largest 64-bit box size accepted; sizes must fit a signed 64-bit value.
pub const MAX_LARGE_BOX_SIZE: u64 = i64::MAX as u64;
