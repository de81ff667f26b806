//! Top-level orchestration: wires C2 (index map) through C8 (sizing) into
//! a single `merge(a, b, options) -> DexFile`.
//!
//! The pipeline runs each section in the dependency order SPEC_FULL.md
//! §4.3 requires — every section's merge only references sections that
//! were merged earlier in this function:
//!
//! strings -> types -> protos/fields/methods -> class_defs (+ topo sort)
//! -> type_list/encoded_array/annotation (leaves) -> annotation_set
//! -> annotation_set_ref_list -> annotations_directory -> debug_info
//! -> code_item -> class_data

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, instrument, warn};

use crate::dex::class::ClassDefRaw;
use crate::dex::file::DexFile;
use crate::dex::ids::{FieldIdRaw, MethodIdRaw, ProtoIdRaw, TypeList};
use crate::dex::value::{Annotation, AnnotationSet, AnnotationSetRefList, AnnotationsDirectory, EncodedArray};
use crate::error::{MergeError, Result};
use crate::index_map::{IndexMap, RemovalContext, Source};
use crate::rewrite;
use crate::section_merge::{merge_sorted, merge_unsorted, TaggedRecord};
use crate::sections::{
    AnnotationSection, AnnotationSetRefListSection, AnnotationSetSection, AnnotationsDirectorySection,
    ClassDataSection, CodeSection, EncodedArraySection, FieldSection, MethodSection, ProtoSection,
    ResolvedProto, StringSection, TypeListSection, TypeSection,
};
use crate::sizing;
use crate::topo_sort::{self, SortableType};

/// What to do when both inputs define the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Keep the definition from the first input (A), discard the second's.
    KeepFirst,
    /// Reject the merge outright.
    Fail,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub collision_policy: CollisionPolicy,
    pub compact_threshold: usize,
    /// Fully-qualified type descriptors (e.g. `"Ltest/Type1;"`) whose class
    /// defs are dropped from the merged output, per SPEC_FULL.md §6.
    pub remove_descriptors: HashSet<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            collision_policy: CollisionPolicy::KeepFirst,
            compact_threshold: sizing::DEFAULT_COMPACTION_THRESHOLD,
            remove_descriptors: HashSet::new(),
        }
    }
}

/// Merge two DEX files into one well-formed, re-indexed DEX file.
#[instrument(skip(a, b, options), fields(a_classes = a.class_defs.len(), b_classes = b.class_defs.len()))]
pub fn merge(a: &DexFile, b: &DexFile, options: &MergeOptions) -> Result<DexFile> {
    let mut map = IndexMap::new();
    let mut out = DexFile::default();
    let mut removal = RemovalContext::new();

    merge_strings(a, b, &mut map, &mut out);
    mark_removed_strings(&out, options, &mut removal);

    merge_types(a, b, &mut map, &mut out)?;
    mark_removed_types(&out, &mut removal);

    merge_protos(a, b, &mut map, &mut out)?;
    merge_fields(a, b, &mut map, &mut out)?;
    merge_methods(a, b, &mut map, &mut out)?;

    let class_defs = merge_class_defs(a, b, &map, options, &mut removal)?;
    info!(
        merged_classes = class_defs.len(),
        removed_classes = removal.removed_sortable_types.len(),
        "class defs merged"
    );

    merge_type_lists(a, b, &mut map, &mut out);
    merge_encoded_arrays(a, b, &mut map, &mut out);
    merge_annotations(a, b, &mut map, &mut out);
    merge_annotation_sets(a, b, &mut map, &mut out);
    merge_annotation_set_ref_lists(a, b, &mut map, &mut out);
    merge_annotations_directories(a, b, &mut map, &mut out);
    merge_debug_infos(a, b, &mut map, &mut out);
    merge_code_items(a, b, &mut map, &mut out);
    merge_class_data(a, b, &mut map, &mut out);

    out.class_defs = patch_and_sort_class_defs(class_defs, &map, &out)?;

    debug!(
        strings = out.string_ids.len(),
        types = out.type_ids.len(),
        classes = out.class_defs.len(),
        "merge complete"
    );
    Ok(out)
}

/// Merge, then write, applying the size-estimate-gated compaction pass:
/// per SPEC_FULL.md §4.7, when the pessimistic estimate overshoots the
/// actual written size by at least `compact_threshold` bytes, the merged
/// file is re-merged against an empty DEX (under `CollisionPolicy::Fail`,
/// since there can be no real collisions) to produce the compacted output.
pub fn merge_and_write(a: &DexFile, b: &DexFile, options: &MergeOptions) -> Result<Vec<u8>> {
    let merged = merge(a, b, options)?;
    let estimated = sizing::estimate_pessimistic_size(&merged);
    let first_pass = merged.write_to_bytes()?;

    let mut bytes = if sizing::should_compact(estimated, first_pass.len(), options.compact_threshold) {
        debug!(estimated, actual = first_pass.len(), "compacting merged output");
        let compact_options = MergeOptions {
            collision_policy: CollisionPolicy::Fail,
            remove_descriptors: HashSet::new(),
            ..options.clone()
        };
        let compacted = merge(&merged, &DexFile::default(), &compact_options)?;
        compacted.write_to_bytes()?
    } else {
        first_pass
    };

    crate::dex::file::finalize_checksums(&mut bytes);
    Ok(bytes)
}

/// Removal phase 1: find the merged string indices matching one of the
/// configured descriptors, now that `out.string_ids` is final.
fn mark_removed_strings(out: &DexFile, options: &MergeOptions, removal: &mut RemovalContext) {
    if options.remove_descriptors.is_empty() {
        return;
    }
    let candidates = out
        .string_ids
        .iter()
        .enumerate()
        .filter(|(_, s)| options.remove_descriptors.contains(s.as_str()))
        .map(|(idx, _)| idx as u32);
    removal.mark_strings(candidates);
}

/// Removal phase 2: of the merged types, the ones naming a removed string.
fn mark_removed_types(out: &DexFile, removal: &mut RemovalContext) {
    if removal.removed_strings.is_empty() {
        return;
    }
    let candidates = out
        .type_ids
        .iter()
        .enumerate()
        .filter(|(_, &string_idx)| removal.removed_strings.contains(&string_idx))
        .map(|(idx, _)| idx as u32);
    removal.mark_types(candidates);
}

fn merge_strings(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let (merged, map_a, map_b) = merge_sorted::<StringSection>(&a.string_ids, &b.string_ids);
    map.reserve_strings(Source::A, a.string_ids.len());
    map.reserve_strings(Source::B, b.string_ids.len());
    for (old, new) in map_a.into_iter().enumerate() {
        map.set_string(Source::A, old as u32, new);
    }
    for (old, new) in map_b.into_iter().enumerate() {
        map.set_string(Source::B, old as u32, new);
    }
    out.string_ids = merged;
}

fn merge_types(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) -> Result<()> {
    let resolved_a: Vec<u32> = a
        .type_ids
        .iter()
        .map(|&s| map.adjust_string(Source::A, s as i32) as u32)
        .collect();
    let resolved_b: Vec<u32> = b
        .type_ids
        .iter()
        .map(|&s| map.adjust_string(Source::B, s as i32) as u32)
        .collect();
    let (merged, map_a, map_b) = merge_sorted::<TypeSection>(&resolved_a, &resolved_b);
    map.reserve_types(Source::A, a.type_ids.len());
    map.reserve_types(Source::B, b.type_ids.len());
    for (old, new) in map_a.into_iter().enumerate() {
        map.set_type(Source::A, old as u32, new)?;
    }
    for (old, new) in map_b.into_iter().enumerate() {
        map.set_type(Source::B, old as u32, new)?;
    }
    out.type_ids = merged;
    Ok(())
}

fn resolve_proto(src: Source, map: &IndexMap, file: &DexFile, p: &ProtoIdRaw) -> ResolvedProto {
    let params = file
        .type_lists
        .get(&p.parameters_off)
        .map(|tl| {
            tl.type_idx
                .iter()
                .map(|&t| map.adjust_type(src, t as i32) as u32)
                .collect()
        })
        .unwrap_or_default();
    ResolvedProto {
        shorty_idx: map.adjust_string(src, p.shorty_idx as i32) as u32,
        return_type_idx: map.adjust_type(src, p.return_type_idx as i32) as u32,
        params,
    }
}

fn merge_protos(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) -> Result<()> {
    let resolved_a: Vec<ResolvedProto> = a
        .proto_ids
        .iter()
        .map(|p| resolve_proto(Source::A, map, a, p))
        .collect();
    let resolved_b: Vec<ResolvedProto> = b
        .proto_ids
        .iter()
        .map(|p| resolve_proto(Source::B, map, b, p))
        .collect();
    let (merged, map_a, map_b) = merge_sorted::<ProtoSection>(&resolved_a, &resolved_b);
    map.reserve_protos(Source::A, a.proto_ids.len());
    map.reserve_protos(Source::B, b.proto_ids.len());
    for (old, new) in map_a.into_iter().enumerate() {
        map.set_proto(Source::A, old as u32, new)?;
    }
    for (old, new) in map_b.into_iter().enumerate() {
        map.set_proto(Source::B, old as u32, new)?;
    }

    out.proto_ids = merged
        .iter()
        .enumerate()
        .map(|(i, rp)| {
            let key = if rp.params.is_empty() { 0 } else { i as u32 + 1 };
            if key != 0 {
                out.type_lists.insert(
                    key,
                    TypeList {
                        type_idx: rp.params.clone(),
                    },
                );
            }
            ProtoIdRaw {
                shorty_idx: rp.shorty_idx,
                return_type_idx: rp.return_type_idx,
                parameters_off: key,
            }
        })
        .collect();
    Ok(())
}

fn merge_fields(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) -> Result<()> {
    let resolved_a: Vec<FieldIdRaw> = a
        .field_ids
        .iter()
        .map(|f| rewrite::rewrite_field_id(Source::A, map, f))
        .collect();
    let resolved_b: Vec<FieldIdRaw> = b
        .field_ids
        .iter()
        .map(|f| rewrite::rewrite_field_id(Source::B, map, f))
        .collect();
    let (merged, map_a, map_b) = merge_sorted::<FieldSection>(&resolved_a, &resolved_b);
    map.reserve_fields(Source::A, a.field_ids.len());
    map.reserve_fields(Source::B, b.field_ids.len());
    for (old, new) in map_a.into_iter().enumerate() {
        map.set_field(Source::A, old as u32, new)?;
    }
    for (old, new) in map_b.into_iter().enumerate() {
        map.set_field(Source::B, old as u32, new)?;
    }
    out.field_ids = merged;
    Ok(())
}

fn merge_methods(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) -> Result<()> {
    let resolved_a: Vec<MethodIdRaw> = a
        .method_ids
        .iter()
        .map(|m| rewrite::rewrite_method_id(Source::A, map, m))
        .collect();
    let resolved_b: Vec<MethodIdRaw> = b
        .method_ids
        .iter()
        .map(|m| rewrite::rewrite_method_id(Source::B, map, m))
        .collect();
    let (merged, map_a, map_b) = merge_sorted::<MethodSection>(&resolved_a, &resolved_b);
    map.reserve_methods(Source::A, a.method_ids.len());
    map.reserve_methods(Source::B, b.method_ids.len());
    for (old, new) in map_a.into_iter().enumerate() {
        map.set_method(Source::A, old as u32, new)?;
    }
    for (old, new) in map_b.into_iter().enumerate() {
        map.set_method(Source::B, old as u32, new)?;
    }
    out.method_ids = merged;
    Ok(())
}

fn merge_class_defs(
    a: &DexFile,
    b: &DexFile,
    map: &IndexMap,
    options: &MergeOptions,
    removal: &mut RemovalContext,
) -> Result<Vec<(ClassDefRaw, Source, u32)>> {
    let mut by_class_idx: BTreeMap<u32, (ClassDefRaw, Source, u32)> = BTreeMap::new();
    let mut all_class_idx: Vec<u32> = Vec::new();
    for (old_off, def) in a.class_defs.iter().enumerate() {
        let rewritten = rewrite::rewrite_class_def(Source::A, map, def);
        all_class_idx.push(rewritten.class_idx);
        by_class_idx.insert(rewritten.class_idx, (rewritten, Source::A, old_off as u32));
    }
    for (old_off, def) in b.class_defs.iter().enumerate() {
        let rewritten = rewrite::rewrite_class_def(Source::B, map, def);
        all_class_idx.push(rewritten.class_idx);
        if let Some(existing) = by_class_idx.get(&rewritten.class_idx) {
            match options.collision_policy {
                CollisionPolicy::KeepFirst => {
                    warn!(class_idx = rewritten.class_idx, "class defined in both inputs, keeping first");
                }
                CollisionPolicy::Fail => {
                    return Err(MergeError::Collision(format!(
                        "class type_idx {} (was {:?}@{})",
                        rewritten.class_idx, existing.1, existing.2
                    )));
                }
            }
            continue;
        }
        by_class_idx.insert(rewritten.class_idx, (rewritten, Source::B, old_off as u32));
    }

    removal.mark_sortable_types(&all_class_idx);
    if !removal.removed_types.is_empty() {
        let before = by_class_idx.len();
        by_class_idx.retain(|class_idx, _| !removal.removed_types.contains(class_idx));
        info!(
            removed = before - by_class_idx.len(),
            "class defs dropped per removal descriptor set"
        );
    }

    Ok(by_class_idx.into_values().collect())
}

fn merge_type_lists(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(
        &a.type_lists,
        &b.type_lists,
        |src, off, v| TaggedRecord {
            source: src,
            old_offset: off,
            record: rewrite::rewrite_type_list(src, map, v),
        },
    );
    let merged = merge_unsorted::<TypeListSection>(items);
    assign_and_store(merged, &mut out.type_lists, |src, old, new| {
        map.set_type_list_off(src, old, new)
    });
}

fn merge_encoded_arrays(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.encoded_arrays, &b.encoded_arrays, |src, off, v| TaggedRecord {
        source: src,
        old_offset: off,
        record: rewrite::rewrite_encoded_array(src, map, v),
    });
    let merged = merge_unsorted::<EncodedArraySection>(items);
    assign_and_store(merged, &mut out.encoded_arrays, |src, old, new| {
        map.set_encoded_array_off(src, old, new)
    });
}

fn merge_annotations(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.annotations, &b.annotations, |src, off, v| TaggedRecord {
        source: src,
        old_offset: off,
        record: rewrite::rewrite_annotation(src, map, v),
    });
    let merged = merge_unsorted::<AnnotationSection>(items);
    assign_and_store(merged, &mut out.annotations, |src, old, new| {
        map.set_annotation_off(src, old, new)
    });
}

fn merge_annotation_sets(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.annotation_sets, &b.annotation_sets, |src, off, v| TaggedRecord {
        source: src,
        old_offset: off,
        record: rewrite::rewrite_annotation_set(src, map, v),
    });
    let merged = merge_unsorted::<AnnotationSetSection>(items);
    assign_and_store(merged, &mut out.annotation_sets, |src, old, new| {
        map.set_annotation_set_off(src, old, new)
    });
}

fn merge_annotation_set_ref_lists(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(
        &a.annotation_set_ref_lists,
        &b.annotation_set_ref_lists,
        |src, off, v| TaggedRecord {
            source: src,
            old_offset: off,
            record: rewrite::rewrite_annotation_set_ref_list(src, map, v),
        },
    );
    let merged = merge_unsorted::<AnnotationSetRefListSection>(items);
    assign_and_store(merged, &mut out.annotation_set_ref_lists, |src, old, new| {
        map.set_annotation_set_ref_list_off(src, old, new)
    });
}

fn merge_annotations_directories(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(
        &a.annotations_directories,
        &b.annotations_directories,
        |src, off, v| TaggedRecord {
            source: src,
            old_offset: off,
            record: rewrite::rewrite_annotations_directory(src, map, v),
        },
    );
    let merged = merge_unsorted::<AnnotationsDirectorySection>(items);
    assign_and_store(merged, &mut out.annotations_directories, |src, old, new| {
        map.set_annotations_directory_off(src, old, new)
    });
}

fn merge_debug_infos(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.debug_infos, &b.debug_infos, |src, off, v| TaggedRecord {
        source: src,
        old_offset: off,
        record: rewrite::rewrite_debug_info(src, map, v),
    });
    // DebugInfo doesn't implement SectionMerge directly in sections.rs;
    // dedup it the same content-addressed way via its serialized bytes.
    let merged = dedup_by_bytes(items, |di| {
        let mut buf = Vec::new();
        di.write_to(&mut buf).expect("in-memory write cannot fail");
        buf
    });
    assign_and_store(merged, &mut out.debug_infos, |src, old, new| {
        map.set_debug_info_off(src, old, new)
    });
}

fn merge_code_items(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.code_items, &b.code_items, |src, off, v| {
        let mut rewritten = rewrite::rewrite_code_item(src, map, v);
        rewritten.debug_info_off = map.adjust_debug_info_off(src, v.debug_info_off);
        TaggedRecord {
            source: src,
            old_offset: off,
            record: rewritten,
        }
    });
    let merged = merge_unsorted::<CodeSection>(items);
    assign_and_store(merged, &mut out.code_items, |src, old, new| {
        map.set_code_off(src, old, new)
    });
}

fn merge_class_data(a: &DexFile, b: &DexFile, map: &mut IndexMap, out: &mut DexFile) {
    let items = collect_tagged(&a.class_data, &b.class_data, |src, off, v| {
        let mut rewritten = rewrite::rewrite_class_data(src, map, v);
        for m in rewritten
            .direct_methods
            .iter_mut()
            .chain(rewritten.virtual_methods.iter_mut())
        {
            m.code_off = map.adjust_code_off(src, m.code_off);
        }
        TaggedRecord {
            source: src,
            old_offset: off,
            record: rewritten,
        }
    });
    let merged = merge_unsorted::<ClassDataSection>(items);
    assign_and_store(merged, &mut out.class_data, |src, old, new| {
        map.set_class_data_off(src, old, new)
    });
}

fn patch_and_sort_class_defs(
    class_defs: Vec<(ClassDefRaw, Source, u32)>,
    map: &IndexMap,
    out: &DexFile,
) -> Result<Vec<ClassDefRaw>> {
    let patched: Vec<ClassDefRaw> = class_defs
        .into_iter()
        .map(|(def, src, _)| ClassDefRaw {
            interfaces_off: map.adjust_type_list_off(src, def.interfaces_off),
            annotations_off: map.adjust_annotations_directory_off(src, def.annotations_off),
            class_data_off: map.adjust_class_data_off(src, def.class_data_off),
            static_values_off: map.adjust_encoded_array_off(src, def.static_values_off),
            ..def
        })
        .collect();

    let sortables: Vec<SortableType> = patched
        .iter()
        .map(|def| SortableType {
            class_idx: def.class_idx,
            superclass_idx: def.superclass_idx,
            interface_idx: out
                .type_lists
                .get(&def.interfaces_off)
                .map(|tl| tl.type_idx.clone())
                .unwrap_or_default(),
        })
        .collect();

    let depth = topo_sort::assign_depths(&sortables)?;
    let order = topo_sort::topological_order(&sortables, &depth);
    let by_class_idx: BTreeMap<u32, ClassDefRaw> =
        patched.into_iter().map(|d| (d.class_idx, d)).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| by_class_idx.get(&idx).cloned())
        .collect())
}

fn collect_tagged<T, F>(
    a: &BTreeMap<u32, T>,
    b: &BTreeMap<u32, T>,
    rewrite_fn: F,
) -> Vec<TaggedRecord<T>>
where
    F: Fn(Source, u32, &T) -> TaggedRecord<T>,
{
    let mut out = Vec::with_capacity(a.len() + b.len());
    for (off, v) in a {
        out.push(rewrite_fn(Source::A, *off, v));
    }
    for (off, v) in b {
        out.push(rewrite_fn(Source::B, *off, v));
    }
    out
}

fn assign_and_store<T>(
    merged: Vec<(T, Vec<(Source, u32)>)>,
    target: &mut BTreeMap<u32, T>,
    mut record_alias: impl FnMut(Source, u32, u32),
) {
    for (i, (record, aliases)) in merged.into_iter().enumerate() {
        let key = i as u32 + 1;
        for (src, old_off) in aliases {
            record_alias(src, old_off, key);
        }
        target.insert(key, record);
    }
}

fn dedup_by_bytes<T: Clone>(
    items: Vec<TaggedRecord<T>>,
    to_bytes: impl Fn(&T) -> Vec<u8>,
) -> Vec<(T, Vec<(Source, u32)>)> {
    let mut keyed: Vec<(Vec<u8>, usize)> = items
        .iter()
        .enumerate()
        .map(|(i, t)| (to_bytes(&t.record), i))
        .collect();
    keyed.sort();
    let mut out: Vec<(T, Vec<(Source, u32)>)> = Vec::new();
    let mut iter = keyed.into_iter().peekable();
    while let Some((key, idx)) = iter.next() {
        let mut aliases = vec![(items[idx].source, items[idx].old_offset)];
        while let Some((next_key, _)) = iter.peek() {
            if *next_key == key {
                let (_, next_idx) = iter.next().unwrap();
                aliases.push((items[next_idx].source, items[next_idx].old_offset));
            } else {
                break;
            }
        }
        out.push((items[idx].record.clone(), aliases));
    }
    out
}
