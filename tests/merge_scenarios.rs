//! Integration tests: acceptance scenarios for merging two DEX files,
//! exercised through the public `dexmerge` API and through real files on
//! disk (mirroring what the `dex-merger` binary does).

use std::collections::HashMap;

use dexmerge::dex::{ClassData, ClassDefRaw, CodeItem, EncodedMethod, MethodIdRaw, ProtoIdRaw};
use dexmerge::leb128::NO_INDEX;
use dexmerge::{merge, merge_and_write, CollisionPolicy, DexFile, MergeError, MergeOptions};
use proptest::prelude::*;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn class_file(descriptor: &str, superclass: Option<&str>, method_name: &str) -> DexFile {
    let mut f = DexFile::default();
    let mut strings = vec![descriptor.to_string(), method_name.to_string(), "V".to_string()];
    if let Some(sup) = superclass {
        strings.push(sup.to_string());
    }
    strings.sort();
    strings.dedup();
    f.string_ids = strings;

    let idx_of = |f: &DexFile, s: &str| f.string_ids.iter().position(|x| x == s).unwrap() as u32;

    let class_str_idx = idx_of(&f, descriptor);
    f.type_ids = vec![class_str_idx];
    if let Some(sup) = superclass {
        f.type_ids.push(idx_of(&f, sup));
    }
    f.type_ids.sort();
    f.type_ids.dedup();

    let class_type_idx = f.type_ids.iter().position(|&t| t == class_str_idx).unwrap() as u32;
    let super_type_idx = superclass.map(|sup| {
        let sup_str_idx = idx_of(&f, sup);
        f.type_ids.iter().position(|&t| t == sup_str_idx).unwrap() as i32
    });

    f.method_ids = vec![MethodIdRaw {
        class_idx: class_type_idx as u16,
        proto_idx: 0,
        name_idx: idx_of(&f, method_name),
    }];
    let v_idx = idx_of(&f, "V");
    f.proto_ids = vec![ProtoIdRaw {
        shorty_idx: v_idx,
        return_type_idx: v_idx,
        parameters_off: 0,
    }];
    f.class_defs = vec![ClassDefRaw {
        class_idx: class_type_idx,
        access_flags: 1,
        superclass_idx: super_type_idx.unwrap_or(NO_INDEX),
        interfaces_off: 0,
        source_file_idx: NO_INDEX,
        annotations_off: 0,
        class_data_off: 1,
        static_values_off: 0,
    }];
    f.class_data.insert(
        1,
        ClassData {
            direct_methods: vec![EncodedMethod {
                method_idx: 0,
                access_flags: 0x10001,
                code_off: 1,
            }],
            ..Default::default()
        },
    );
    f.code_items.insert(
        1,
        CodeItem {
            registers_size: 1,
            ins_size: 0,
            outs_size: 0,
            debug_info_off: 0,
            insns: vec![0x0e00],
            tries: Vec::new(),
        },
    );
    f
}

fn class_descriptor<'a>(merged: &'a DexFile, def: &ClassDefRaw) -> &'a str {
    &merged.string_ids[merged.type_ids[def.class_idx as usize] as usize]
}

// ---------------------------------------------------------------------------
// S1 - empty B
// ---------------------------------------------------------------------------

#[test]
fn s1_merge_with_empty_b_keeps_a_unchanged() {
    let a = class_file("LFoo;", None, "m1");
    let b = DexFile::default();

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    assert_eq!(merged.class_defs.len(), 1);
    assert_eq!(class_descriptor(&merged, &merged.class_defs[0]), "LFoo;");
}

// ---------------------------------------------------------------------------
// S2 - disjoint classes
// ---------------------------------------------------------------------------

#[test]
fn s2_disjoint_classes_both_present() {
    let a = class_file("LFoo;", None, "m1");
    let b = class_file("LBar;", None, "m2");

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    assert_eq!(merged.class_defs.len(), 2);
    let names: Vec<&str> = merged
        .class_defs
        .iter()
        .map(|c| class_descriptor(&merged, c))
        .collect();
    assert!(names.contains(&"LFoo;"));
    assert!(names.contains(&"LBar;"));
}

// ---------------------------------------------------------------------------
// S3 - shared string dedup
// ---------------------------------------------------------------------------

#[test]
fn s3_shared_string_is_deduplicated() {
    let a = class_file("LFoo;", None, "hello");
    let b = class_file("LBar;", None, "hello");

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    let count = merged.string_ids.iter().filter(|s| s.as_str() == "hello").count();
    assert_eq!(count, 1);
}

// ---------------------------------------------------------------------------
// S4 / S5 - collision policies
// ---------------------------------------------------------------------------

#[test]
fn s4_collision_keep_first_drops_b() {
    let a = class_file("LFoo;", None, "m1");
    let b = class_file("LFoo;", None, "m2");

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    assert_eq!(merged.class_defs.len(), 1);
    // A's method survives, B's is dropped.
    let kept_method = &merged.string_ids[merged.method_ids[0].name_idx as usize];
    assert_eq!(kept_method, "m1");
}

#[test]
fn s5_collision_fail_reports_duplicate() {
    let a = class_file("LFoo;", None, "m1");
    let b = class_file("LFoo;", None, "m2");

    let options = MergeOptions {
        collision_policy: CollisionPolicy::Fail,
        ..MergeOptions::default()
    };
    let err = merge(&a, &b, &options).unwrap_err();
    assert!(matches!(err, MergeError::Collision(_)));
}

// ---------------------------------------------------------------------------
// S6 - topological class-def ordering
// ---------------------------------------------------------------------------

#[test]
fn s6_class_defs_respect_inheritance_order() {
    // a: LB; and LC; extends LB;
    // b: LD; extends LC;
    let a = merge_chain("LB;", "LC;", "mC");
    let b = class_file("LD;", Some("LC;"), "mD");

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    let order: Vec<&str> = merged
        .class_defs
        .iter()
        .map(|c| class_descriptor(&merged, c))
        .collect();

    let pos = |name: &str| order.iter().position(|&n| n == name).unwrap();
    assert!(pos("LB;") < pos("LC;"));
    assert!(pos("LC;") < pos("LD;"));
}

/// Builds a two-class file: `sub` extends `sup`, both defined locally.
fn merge_chain(sup: &str, sub: &str, method_name: &str) -> DexFile {
    let base = class_file(sup, None, "mBase");
    let derived = class_file(sub, Some(sup), method_name);
    merge(&base, &derived, &MergeOptions::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Round-trip through real files on disk (what the CLI binary does)
// ---------------------------------------------------------------------------

#[test]
fn merged_bytes_roundtrip_through_disk() {
    let dir = TempDir::new().unwrap();
    let a = class_file("LFoo;", None, "m1");
    let b = class_file("LBar;", None, "m2");

    let merged_bytes = merge_and_write(&a, &b, &MergeOptions::default()).unwrap();

    let out_path = dir.path().join("merged.dex");
    std::fs::write(&out_path, &merged_bytes).unwrap();

    let read_back = std::fs::read(&out_path).unwrap();
    let parsed = DexFile::read_from_bytes(&read_back).unwrap();

    assert_eq!(parsed.class_defs.len(), 2);
    assert_eq!(parsed.string_ids, {
        let mut s = parsed.string_ids.clone();
        s.sort();
        s
    });
}

#[test]
fn invariant_index_maps_are_bijective_on_survivors() {
    // Every surviving string in A and B must appear exactly once in the
    // merged output (property 3/4 from the testable-properties list).
    let a = class_file("LFoo;", None, "run");
    let b = class_file("LBar;", None, "run");

    let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for s in &merged.string_ids {
        *seen.entry(s.as_str()).or_insert(0) += 1;
    }
    for (_, count) in seen {
        assert_eq!(count, 1);
    }
}

proptest! {
    /// For any two distinct class names and method names, merging two
    /// single-class files keeps both classes and every surviving string
    /// appears exactly once: the index map is bijective on survivors
    /// regardless of which identifiers happen to collide lexicographically.
    #[test]
    fn merge_of_distinct_classes_is_always_bijective_on_strings(
        class_a in "L[A-Z][a-zA-Z]{0,8};",
        class_b in "L[A-Z][a-zA-Z]{0,8};",
        method_a in "[a-z][a-zA-Z]{0,8}",
        method_b in "[a-z][a-zA-Z]{0,8}",
    ) {
        prop_assume!(class_a != class_b);

        let a = class_file(&class_a, None, &method_a);
        let b = class_file(&class_b, None, &method_b);

        let merged = merge(&a, &b, &MergeOptions::default()).unwrap();

        prop_assert_eq!(merged.class_defs.len(), 2);
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for s in &merged.string_ids {
            *seen.entry(s.as_str()).or_insert(0) += 1;
        }
        for count in seen.values() {
            prop_assert_eq!(*count, 1);
        }
    }
}
