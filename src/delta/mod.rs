//! static deltas
//!
//! a delta is a superblock describing the target commit plus a list of
//! parts. each part carries tables of modes and xattrs, a raw data blob and
//! an op stream that rebuilds a declared list of objects.

mod builder;
mod bspatch;
mod execute;
pub mod opcode;
mod part;
mod superblock;

pub use builder::PartBuilder;
pub use bspatch::{bspatch, BSDIFF_MAGIC};
pub use execute::{apply_part, execute_part, have_all_objects};
pub use opcode::{Op, OpReader, Opcode};
pub use part::{
    validate_part, validate_part_with_limit, ModeEntry, PartCompression, PartPayload,
    MAX_PART_SIZE,
};
pub use superblock::{
    decode_object_list, encode_object_list, FallbackEntry, PartMeta, Superblock,
    OBJTYPE_CSUM_LEN, PART_VERSION,
};
