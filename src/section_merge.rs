//! C3: the generic section-pair merger.
//!
//! Two shapes cover every DEX section (SPEC_FULL.md §4.2):
//!
//! - **Sorted** ID sections (`type_ids`, `proto_ids`, `field_ids`,
//!   `method_ids`, `class_defs` by sort key) merge with a lock-step
//!   two-pointer walk: equal keys dedup to a single output entry, smaller
//!   keys advance their own pointer. `string_ids` is also sorted this way,
//!   keyed by UTF-16 codepoint order.
//! - **Unsorted** data sections (`type_list`, the annotation family,
//!   `class_data`, `code_item`, `debug_info`) have no canonical order in
//!   the source files; the merge reads every record from both inputs,
//!   sorts by a section-specific structured key, and dedups equal keys —
//!   the *first* input's offset position wins ties, matching the
//!   `CollisionPolicy::KeepFirst` convention used for class_defs.

use std::cmp::Ordering;

use crate::index_map::Source;

/// One section's merge behavior. `Key` is whatever structured value sorts
/// and dedups the section's records (e.g. `(class_idx, name_idx, type_idx)`
/// for `field_id`, or the flattened `u32` array for `annotations_directory`).
pub trait SectionMerge {
    type Record: Clone;
    type Key: Ord + Clone;

    fn key(record: &Self::Record) -> Self::Key;
}

/// Lock-step merge of two already-sorted record slices. Returns the merged,
/// deduplicated output together with, for each input index, the output
/// index it was mapped to (in input order) — the caller uses this to
/// populate `IndexMap`.
pub fn merge_sorted<M: SectionMerge>(
    a: &[M::Record],
    b: &[M::Record],
) -> (Vec<M::Record>, Vec<u32>, Vec<u32>) {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut map_a = vec![0u32; a.len()];
    let mut map_b = vec![0u32; b.len()];

    let mut i = 0usize;
    let mut j = 0usize;
    while i < a.len() && j < b.len() {
        let ka = M::key(&a[i]);
        let kb = M::key(&b[j]);
        match ka.cmp(&kb) {
            Ordering::Less => {
                map_a[i] = out.len() as u32;
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                map_b[j] = out.len() as u32;
                out.push(b[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                map_a[i] = out.len() as u32;
                map_b[j] = out.len() as u32;
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    while i < a.len() {
        map_a[i] = out.len() as u32;
        out.push(a[i].clone());
        i += 1;
    }
    while j < b.len() {
        map_b[j] = out.len() as u32;
        out.push(b[j].clone());
        j += 1;
    }

    (out, map_a, map_b)
}

/// A record read out of an unsorted data section, tagged with the source
/// file and original (pre-merge) offset it came from — the dedup key for
/// translating that offset once the merged layout is known.
#[derive(Debug, Clone)]
pub struct TaggedRecord<T> {
    pub source: Source,
    pub old_offset: u32,
    pub record: T,
}

/// Read-sort-dedup an unsorted section. Input records from both files are
/// pooled, sorted by key, and deduplicated; when two records share a key
/// the one from `Source::A` wins if present in the tie (first-input
/// priority), otherwise whichever appeared first in the combined pool.
/// Returns the deduplicated records in sorted order, plus for each surviving
/// record every `(source, old_offset)` that now maps to it — the caller
/// folds this into `IndexMap` via the section-specific `adjust_*_off`.
pub fn merge_unsorted<M: SectionMerge>(
    items: Vec<TaggedRecord<M::Record>>,
) -> Vec<(M::Record, Vec<(Source, u32)>)> {
    let mut indexed: Vec<(M::Key, usize)> = items
        .iter()
        .enumerate()
        .map(|(idx, t)| (M::key(&t.record), idx))
        .collect();
    indexed.sort_by(|(ka, ia), (kb, ib)| ka.cmp(kb).then_with(|| ia.cmp(ib)));

    let mut out: Vec<(M::Record, Vec<(Source, u32)>)> = Vec::new();
    let mut iter = indexed.into_iter().peekable();
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
