//! In-memory DEX container model (C1).
//!
//! This is the minimal shape the merge engine operates over: parsed ID
//! section vectors, data-section records keyed by their original byte
//! offset, and a header carrying the format constants from the DEX spec.
//! It is not a byte-for-byte mmap layout the way a production DEX parser
//! would use — that level of fidelity is out of scope (SPEC_FULL.md §1).

pub mod class;
pub mod code;
pub mod file;
pub mod ids;
pub mod value;

pub use class::{ClassData, ClassDefRaw, EncodedMethod};
pub use code::{CodeItem, DebugInfo, EncodedCatchHandler, TryItem};
pub use file::DexFile;
pub use ids::{FieldIdRaw, MethodIdRaw, ProtoIdRaw, TypeList};
pub use value::{Annotation, AnnotationSet, AnnotationSetRefList, AnnotationsDirectory, EncodedArray, EncodedValue};

/// Magic bytes, not including the 4-byte version + NUL trailer.
pub const DEX_MAGIC_PREFIX: [u8; 4] = *b"dex\n";

/// Endian tag for a little-endian DEX file.
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;

/// Fixed header size (all DEX versions).
pub const HEADER_SIZE: u32 = 0x70;

/// Sentinel for an absent string/type/file index embedded in records.
pub use crate::leb128::NO_INDEX;

/// DEX file header. Checksum/signature fields are carried for layout
/// fidelity but populated by the `finalize_checksums` seam (an external
/// collaborator per SPEC_FULL.md §1), not computed by this crate.
#[derive(Debug, Clone)]
pub struct DexHeader {
    pub version: [u8; 3],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub type_ids_size: u32,
    pub proto_ids_size: u32,
    pub field_ids_size: u32,
    pub method_ids_size: u32,
    pub class_defs_size: u32,
}

impl Default for DexHeader {
    fn default() -> Self {
        Self {
            version: *b"035",
            checksum: 0,
            signature: [0u8; 20],
            file_size: 0,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            map_off: 0,
            string_ids_size: 0,
            type_ids_size: 0,
            proto_ids_size: 0,
            field_ids_size: 0,
            method_ids_size: 0,
            class_defs_size: 0,
        }
    }
}

/// A section kind as enumerated in the DEX map-list (`TYPE_*_ITEM`), used to
/// size the map-list and to tag data-section kinds throughout the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum SectionKind {
    StringId = 0x0001,
    TypeId = 0x0002,
    ProtoId = 0x0003,
    FieldId = 0x0004,
    MethodId = 0x0005,
    ClassDef = 0x0006,
    MapList = 0x1000,
    TypeList = 0x1001,
    AnnotationSetRefList = 0x1002,
    AnnotationSet = 0x1003,
    ClassData = 0x2000,
    Code = 0x2001,
    StringData = 0x2002,
    DebugInfo = 0x2003,
    Annotation = 0x2004,
    EncodedArray = 0x2005,
    AnnotationsDirectory = 0x2006,
}

/// Size in bytes of one `map_item` record: `type:u16, unused:u16, size:u32, offset:u32`.
pub const MAP_ITEM_SIZE: u32 = 12;
