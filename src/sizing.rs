//! C8: writer-size estimation and compaction threshold.
//!
//! Variable-length (ULEB128) encodings mean a record's exact final byte
//! length can depend on index values that are only known once the merge
//! has assigned them — which, for `class_data`'s method/field deltas,
//! happens during the very write pass that needs the length. Rather than
//! a fixed point over the writer, this estimates a pessimistic upper bound
//! (every delta costs its worst-case 5 bytes) up front, and afterward
//! measures the real written size; if the slack between estimate and
//! reality is at least `compact_threshold` bytes, the caller re-merges the
//! output against an empty DEX to produce a compacted file (SPEC_FULL.md
//! §4.7). That second merge pass lives in `merger::merge_and_write` rather
//! than here, since it needs `merge()` itself.

use crate::dex::file::DexFile;

/// Pessimistic per-record byte budgets, used before a single real offset is
/// known.
const MAX_ULEB128_BYTES: usize = 5;

/// Upper-bound estimate of the final file size, assuming every variable-length
/// field takes its maximum possible encoded width.
pub fn estimate_pessimistic_size(file: &DexFile) -> usize {
    let mut total = 0usize;
    total += 0x70; // header
    total += file.string_ids.len() * 4;
    total += file.type_ids.len() * 4;
    total += file.proto_ids.len() * 12;
    total += file.field_ids.len() * 8;
    total += file.method_ids.len() * 8;
    total += file.class_defs.len() * 32;

    for s in &file.string_ids {
        total += MAX_ULEB128_BYTES + s.len() + 1;
    }
    for tl in file.type_lists.values() {
        total += 4 + tl.type_idx.len() * 2 + 4; // + alignment slack
    }
    for arr in file.encoded_arrays.values() {
        total += MAX_ULEB128_BYTES + arr.values.len() * 16;
    }
    for ann in file.annotations.values() {
        total += 2 + MAX_ULEB128_BYTES + ann.elements.len() * (MAX_ULEB128_BYTES + 16);
    }
    for set in file.annotation_sets.values() {
        total += 4 + set.entries.len() * 4 + 4;
    }
    for list in file.annotation_set_ref_lists.values() {
        total += 4 + list.list.len() * 4 + 4;
    }
    for _ in file.annotations_directories.values() {
        total += 16 + 8 * 8;
    }
    for di in file.debug_infos.values() {
        total += MAX_ULEB128_BYTES * (2 + di.parameter_names.len()) + di.bytecode.len();
    }
    for code in file.code_items.values() {
        total += 16 + code.insns.len() * 2 + code.tries.len() * (8 + MAX_ULEB128_BYTES * 4) + 4;
    }
    for cd in file.class_data.values() {
        let field_count = cd.static_fields.len() + cd.instance_fields.len();
        let method_count = cd.direct_methods.len() + cd.virtual_methods.len();
        total += MAX_ULEB128_BYTES * (4 + field_count * 2 + method_count * 3);
    }

    total += 4 + 11 * 12; // map_list: up to 11 data-section kinds
    total
}

/// Wasted-byte threshold (pessimistic estimate minus actual written size)
/// at or above which a second, compacting merge pass is worth its cost.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1 << 20;

/// Whether a compacting second pass is worth running, given the pessimistic
/// estimate and the size actually produced by a first write pass.
pub fn should_compact(estimated: usize, actual: usize, threshold: usize) -> bool {
    if actual == 0 || estimated <= actual {
        return false;
    }
    (estimated - actual) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_estimate_covers_header_and_map() {
        let file = DexFile::default();
        let estimate = estimate_pessimistic_size(&file);
        assert!(estimate >= 0x70);
    }

    #[test]
    fn should_compact_respects_threshold() {
        assert!(!should_compact(1_000_000, 999_500, 1 << 20));
        assert!(should_compact(2_000_000, 900_000, 1 << 20));
        assert!(!should_compact(1000, 1000, 1 << 20));
    }

    #[test]
    fn should_compact_ignores_underestimates() {
        assert!(!should_compact(100, 500, 1 << 20));
    }
}
