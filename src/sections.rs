//! C4: per-section `SectionMerge` implementations, one per DEX section
//! kind, wired in the fixed dependency order merger.rs drives them in
//! (SPEC_FULL.md §4.3): strings, then types, then the proto/field/method ID
//! sections that reference them, then class defs, then the data sections.
//!
//! Two key shapes cover everything that isn't a plain scalar:
//! - `IntArrayKey` — the documented "IntArray" order (length first, then
//!   component-wise) used for the annotation offset-list sections.
//! - `ByteKey` — a record's canonical serialized bytes, used wherever the
//!   structured value itself (not a derived scalar) is the natural dedup
//!   identity: `annotation`, `encoded_array`, `class_data`, `code_item`.
//!   Lexicographic byte order is a perfectly good total order for
//!   content-addressed dedup and sidesteps needing `Ord` on `EncodedValue`
//!   (which embeds `f32`/`f64`).

use std::cmp::Ordering;

use crate::dex::class::ClassData;
use crate::dex::code::CodeItem;
use crate::dex::ids::{FieldIdRaw, MethodIdRaw, TypeList};
use crate::dex::value::{int_array_cmp, Annotation, AnnotationSet, AnnotationSetRefList, AnnotationsDirectory, EncodedArray};
use crate::section_merge::SectionMerge;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntArrayKey(pub Vec<u32>);

impl PartialOrd for IntArrayKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for IntArrayKey {
    fn cmp(&self, other: &Self) -> Ordering {
        int_array_cmp(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteKey(pub Vec<u8>);

pub struct StringSection;
impl SectionMerge for StringSection {
    type Record = String;
    type Key = String;
    fn key(record: &String) -> String {
        record.clone()
    }
}

/// A merged file's type id is just the string id it names; dedup and sort
/// by that already-translated string index.
pub struct TypeSection;
impl SectionMerge for TypeSection {
    type Record = u32;
    type Key = u32;
    fn key(record: &u32) -> u32 {
        *record
    }
}

/// A `proto_id` paired with its resolved (already-index-translated)
/// parameter type list, so the sort key reflects proto *content* rather
/// than an as-yet-unassigned `type_list` offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProto {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub params: Vec<u32>,
}

pub struct ProtoSection;
impl SectionMerge for ProtoSection {
    type Record = ResolvedProto;
    type Key = (u32, Vec<u32>);
    fn key(record: &ResolvedProto) -> (u32, Vec<u32>) {
        (record.return_type_idx, record.params.clone())
    }
}

pub struct FieldSection;
impl SectionMerge for FieldSection {
    type Record = FieldIdRaw;
    type Key = (u16, u32, u16);
    fn key(record: &FieldIdRaw) -> (u16, u32, u16) {
        (record.class_idx, record.name_idx, record.type_idx)
    }
}

pub struct MethodSection;
impl SectionMerge for MethodSection {
    type Record = MethodIdRaw;
    type Key = (u16, u32, u16);
    fn key(record: &MethodIdRaw) -> (u16, u32, u16) {
        (record.class_idx, record.name_idx, record.proto_idx)
    }
}

pub struct TypeListSection;
impl SectionMerge for TypeListSection {
    type Record = TypeList;
    type Key = Vec<u32>;
    fn key(record: &TypeList) -> Vec<u32> {
        record.type_idx.clone()
    }
}

pub struct EncodedArraySection;
impl SectionMerge for EncodedArraySection {
    type Record = EncodedArray;
    type Key = ByteKey;
    fn key(record: &EncodedArray) -> ByteKey {
        let mut buf = Vec::new();
        record.write_to(&mut buf).expect("in-memory write cannot fail");
        ByteKey(buf)
    }
}

pub struct AnnotationSection;
impl SectionMerge for AnnotationSection {
    type Record = Annotation;
    type Key = ByteKey;
    fn key(record: &Annotation) -> ByteKey {
        let mut buf = Vec::new();
        record.write_to(&mut buf).expect("in-memory write cannot fail");
        ByteKey(buf)
    }
}

pub struct AnnotationSetSection;
impl SectionMerge for AnnotationSetSection {
    type Record = AnnotationSet;
    type Key = IntArrayKey;
    fn key(record: &AnnotationSet) -> IntArrayKey {
        IntArrayKey(record.entries.clone())
    }
}

pub struct AnnotationSetRefListSection;
impl SectionMerge for AnnotationSetRefListSection {
    type Record = AnnotationSetRefList;
    type Key = IntArrayKey;
    fn key(record: &AnnotationSetRefList) -> IntArrayKey {
        IntArrayKey(record.list.clone())
    }
}

pub struct AnnotationsDirectorySection;
impl SectionMerge for AnnotationsDirectorySection {
    type Record = AnnotationsDirectory;
    type Key = IntArrayKey;
    fn key(record: &AnnotationsDirectory) -> IntArrayKey {
        IntArrayKey(record.flatten())
    }
}

pub struct ClassDataSection;
impl SectionMerge for ClassDataSection {
    type Record = ClassData;
    type Key = ByteKey;
    fn key(record: &ClassData) -> ByteKey {
        let mut buf = Vec::new();
        record.write_to(&mut buf).expect("in-memory write cannot fail");
        ByteKey(buf)
    }
}

pub struct CodeSection;
impl SectionMerge for CodeSection {
    type Record = CodeItem;
    type Key = ByteKey;
    fn key(record: &CodeItem) -> ByteKey {
        let mut buf = Vec::new();
        record.write_to(&mut buf).expect("in-memory write cannot fail");
        ByteKey(buf)
    }
}
