//! C2: index translation from each source file's numbering to the merged
//! file's numbering.
//!
//! Every ID section of a DEX has a hard 16-bit ceiling except `string_ids`
//! (32-bit): `type_ids`, `proto_ids`, `field_ids`, and `method_ids` can
//! each hold at most 0xFFFF entries. `IndexMap::adjust_*` enforces that
//! ceiling the moment a translated index would cross it, rather than
//! deferring the failure to some later write-time assertion.

use std::collections::HashMap;

use crate::error::{MergeError, Result};
use crate::leb128::NO_INDEX;

const MAX_U16_INDEX: u32 = 0xFFFF;

/// Per-source-file translation tables, built by the section mergers (C3/C4)
/// as they walk each sorted ID section and by the unsorted mergers as they
/// dedup data records by offset.
#[derive(Debug, Default)]
pub struct IndexMap {
    string_idx: [Vec<u32>; 2],
    type_idx: [Vec<u32>; 2],
    proto_idx: [Vec<u32>; 2],
    field_idx: [Vec<u32>; 2],
    method_idx: [Vec<u32>; 2],
    type_list_off: [HashMap<u32, u32>; 2],
    annotation_off: [HashMap<u32, u32>; 2],
    annotation_set_off: [HashMap<u32, u32>; 2],
    annotation_set_ref_list_off: [HashMap<u32, u32>; 2],
    annotations_directory_off: [HashMap<u32, u32>; 2],
    encoded_array_off: [HashMap<u32, u32>; 2],
    class_data_off: [HashMap<u32, u32>; 2],
    code_off: [HashMap<u32, u32>; 2],
    debug_info_off: [HashMap<u32, u32>; 2],
}

/// Which input file an index/offset is being translated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    A,
    B,
}

impl Source {
    fn slot(self) -> usize {
        match self {
            Source::A => 0,
            Source::B => 1,
        }
    }
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_strings(&mut self, src: Source, count: usize) {
        self.string_idx[src.slot()] = vec![0; count];
    }
    pub fn reserve_types(&mut self, src: Source, count: usize) {
        self.type_idx[src.slot()] = vec![0; count];
    }
    pub fn reserve_protos(&mut self, src: Source, count: usize) {
        self.proto_idx[src.slot()] = vec![0; count];
    }
    pub fn reserve_fields(&mut self, src: Source, count: usize) {
        self.field_idx[src.slot()] = vec![0; count];
    }
    pub fn reserve_methods(&mut self, src: Source, count: usize) {
        self.method_idx[src.slot()] = vec![0; count];
    }

    pub fn set_string(&mut self, src: Source, old: u32, new: u32) {
        self.string_idx[src.slot()][old as usize] = new;
    }
    pub fn set_type(&mut self, src: Source, old: u32, new: u32) -> Result<()> {
        check_u16_limit("type", new)?;
        self.type_idx[src.slot()][old as usize] = new;
        Ok(())
    }
    pub fn set_proto(&mut self, src: Source, old: u32, new: u32) -> Result<()> {
        check_u16_limit("proto", new)?;
        self.proto_idx[src.slot()][old as usize] = new;
        Ok(())
    }
    pub fn set_field(&mut self, src: Source, old: u32, new: u32) -> Result<()> {
        check_u16_limit("field", new)?;
        self.field_idx[src.slot()][old as usize] = new;
        Ok(())
    }
    pub fn set_method(&mut self, src: Source, old: u32, new: u32) -> Result<()> {
        check_u16_limit("method", new)?;
        self.method_idx[src.slot()][old as usize] = new;
        Ok(())
    }

    pub fn set_type_list_off(&mut self, src: Source, old: u32, new: u32) {
        self.type_list_off[src.slot()].insert(old, new);
    }
    pub fn set_annotation_off(&mut self, src: Source, old: u32, new: u32) {
        self.annotation_off[src.slot()].insert(old, new);
    }
    pub fn set_annotation_set_off(&mut self, src: Source, old: u32, new: u32) {
        self.annotation_set_off[src.slot()].insert(old, new);
    }
    pub fn set_annotation_set_ref_list_off(&mut self, src: Source, old: u32, new: u32) {
        self.annotation_set_ref_list_off[src.slot()].insert(old, new);
    }
    pub fn set_annotations_directory_off(&mut self, src: Source, old: u32, new: u32) {
        self.annotations_directory_off[src.slot()].insert(old, new);
    }
    pub fn set_encoded_array_off(&mut self, src: Source, old: u32, new: u32) {
        self.encoded_array_off[src.slot()].insert(old, new);
    }
    pub fn set_class_data_off(&mut self, src: Source, old: u32, new: u32) {
        self.class_data_off[src.slot()].insert(old, new);
    }
    pub fn set_code_off(&mut self, src: Source, old: u32, new: u32) {
        self.code_off[src.slot()].insert(old, new);
    }
    pub fn set_debug_info_off(&mut self, src: Source, old: u32, new: u32) {
        self.debug_info_off[src.slot()].insert(old, new);
    }

    /// Translate a `string_ids` index. NO_INDEX passes through unchanged.
    pub fn adjust_string(&self, src: Source, old: i32) -> i32 {
        if old == NO_INDEX {
            return NO_INDEX;
        }
        self.string_idx[src.slot()][old as usize] as i32
    }
    /// Translate a `type_ids` index. NO_INDEX passes through unchanged.
    pub fn adjust_type(&self, src: Source, old: i32) -> i32 {
        if old == NO_INDEX {
            return NO_INDEX;
        }
        self.type_idx[src.slot()][old as usize] as i32
    }
    pub fn adjust_proto(&self, src: Source, old: u32) -> u32 {
        self.proto_idx[src.slot()][old as usize]
    }
    pub fn adjust_field(&self, src: Source, old: u32) -> u32 {
        self.field_idx[src.slot()][old as usize]
    }
    pub fn adjust_method(&self, src: Source, old: u32) -> u32 {
        self.method_idx[src.slot()][old as usize]
    }

    pub fn adjust_type_list_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.type_list_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_annotation_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.annotation_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_annotation_set_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.annotation_set_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_annotation_set_ref_list_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.annotation_set_ref_list_off[src.slot()]
            .get(&old)
            .unwrap_or(&0)
    }
    pub fn adjust_annotations_directory_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.annotations_directory_off[src.slot()]
            .get(&old)
            .unwrap_or(&0)
    }
    pub fn adjust_encoded_array_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.encoded_array_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_class_data_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.class_data_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_code_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.code_off[src.slot()].get(&old).unwrap_or(&0)
    }
    pub fn adjust_debug_info_off(&self, src: Source, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        *self.debug_info_off[src.slot()].get(&old).unwrap_or(&0)
    }
}

fn check_u16_limit(kind: &'static str, value: u32) -> Result<()> {
    if value > MAX_U16_INDEX {
        return Err(MergeError::IndexOverflow {
            kind,
            value,
            limit: MAX_U16_INDEX,
        });
    }
    Ok(())
}

/// Captures which strings, types, and sortable types a removal pass
/// (dropping a class entirely, e.g. a duplicate-with-conflicting-body) will
/// orphan, so the caller can decide whether to also drop the now-unused
/// string_ids/type_ids entries. Built in three phases per SPEC_FULL.md
/// §4.4: string indices referenced only by the removed classes, then type
/// indices referenced only by those strings, then the subset of removed
/// types that were themselves present in the sortable-class-def set.
#[derive(Debug, Default)]
pub struct RemovalContext {
    pub removed_strings: Vec<u32>,
    pub removed_types: Vec<u32>,
    pub removed_sortable_types: Vec<u32>,
}

impl RemovalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: mark every string index referenced only by `removed_class_idx`
    /// entries, given a reference-count table built by the caller over the
    /// surviving merged file.
    pub fn mark_strings(&mut self, candidate_string_idx: impl IntoIterator<Item = u32>) {
        self.removed_strings.extend(candidate_string_idx);
        self.removed_strings.sort_unstable();
        self.removed_strings.dedup();
    }

    /// Phase 2: of the types that only exist to name a removed string,
    /// record which type indices are now orphaned.
    pub fn mark_types(&mut self, candidate_type_idx: impl IntoIterator<Item = u32>) {
        self.removed_types.extend(candidate_type_idx);
        self.removed_types.sort_unstable();
        self.removed_types.dedup();
    }

    /// Phase 3: of the orphaned types, the subset that participated in the
    /// class-def topological sort as a sortable (i.e. class-defining) type.
    pub fn mark_sortable_types(&mut self, sortable_type_idx: &[u32]) {
        self.removed_sortable_types = self
            .removed_types
            .iter()
            .copied()
            .filter(|t| sortable_type_idx.contains(t))
            .collect();
    }
}
