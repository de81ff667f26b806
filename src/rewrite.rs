//! C6: rewriting a source file's class/method/code records from its own
//! index space into the merged file's index space, using the `IndexMap`
//! built by the ID-section merges (C3/C4).

use std::io::Cursor;

use crate::bytecode::remap_instructions;
use crate::dex::class::{ClassData, ClassDefRaw, EncodedField, EncodedMethod};
use crate::dex::code::CodeItem;
use crate::dex::ids::{FieldIdRaw, MethodIdRaw, ProtoIdRaw, TypeList};
use crate::dex::value::{Annotation, AnnotationSet, AnnotationSetRefList, AnnotationsDirectory, EncodedArray, EncodedValue};
use crate::index_map::{IndexMap, Source};
use crate::leb128::{read_sleb128, read_uleb128, read_uleb128p1, write_sleb128, write_uleb128, write_uleb128p1};

pub fn rewrite_proto_id(src: Source, map: &IndexMap, p: &ProtoIdRaw) -> ProtoIdRaw {
    ProtoIdRaw {
        shorty_idx: map.adjust_string(src, p.shorty_idx as i32) as u32,
        return_type_idx: map.adjust_type(src, p.return_type_idx as i32) as u32,
        parameters_off: p.parameters_off,
    }
}

pub fn rewrite_field_id(src: Source, map: &IndexMap, f: &FieldIdRaw) -> FieldIdRaw {
    FieldIdRaw {
        class_idx: map.adjust_type(src, f.class_idx as i32) as u16,
        type_idx: map.adjust_type(src, f.type_idx as i32) as u16,
        name_idx: map.adjust_string(src, f.name_idx as i32) as u32,
    }
}

pub fn rewrite_method_id(src: Source, map: &IndexMap, m: &MethodIdRaw) -> MethodIdRaw {
    MethodIdRaw {
        class_idx: map.adjust_type(src, m.class_idx as i32) as u16,
        proto_idx: map.adjust_proto(src, m.proto_idx as u32) as u16,
        name_idx: map.adjust_string(src, m.name_idx as i32) as u32,
    }
}

pub fn rewrite_type_list(src: Source, map: &IndexMap, tl: &TypeList) -> TypeList {
    TypeList {
        type_idx: tl
            .type_idx
            .iter()
            .map(|&t| map.adjust_type(src, t as i32) as u32)
            .collect(),
    }
}

pub fn rewrite_class_def(src: Source, map: &IndexMap, def: &ClassDefRaw) -> ClassDefRaw {
    ClassDefRaw {
        class_idx: map.adjust_type(src, def.class_idx as i32) as u32,
        access_flags: def.access_flags,
        superclass_idx: map.adjust_type(src, def.superclass_idx),
        interfaces_off: def.interfaces_off,
        source_file_idx: map.adjust_string(src, def.source_file_idx),
        annotations_off: def.annotations_off,
        class_data_off: def.class_data_off,
        static_values_off: def.static_values_off,
    }
}

pub fn rewrite_class_data(src: Source, map: &IndexMap, data: &ClassData) -> ClassData {
    let rewrite_fields = |fields: &[EncodedField]| -> Vec<EncodedField> {
        fields
            .iter()
            .map(|f| EncodedField {
                field_idx: map.adjust_field(src, f.field_idx),
                access_flags: f.access_flags,
            })
            .collect()
    };
    let rewrite_methods = |methods: &[EncodedMethod]| -> Vec<EncodedMethod> {
        methods
            .iter()
            .map(|m| EncodedMethod {
                method_idx: map.adjust_method(src, m.method_idx),
                access_flags: m.access_flags,
                code_off: m.code_off,
            })
            .collect()
    };
    ClassData {
        static_fields: rewrite_fields(&data.static_fields),
        instance_fields: rewrite_fields(&data.instance_fields),
        direct_methods: rewrite_methods(&data.direct_methods),
        virtual_methods: rewrite_methods(&data.virtual_methods),
    }
}

pub fn rewrite_code_item(src: Source, map: &IndexMap, code: &CodeItem) -> CodeItem {
    let tries = code
        .tries
        .iter()
        .map(|(try_item, handler)| {
            let handlers = handler
                .handlers
                .iter()
                .map(|&(type_idx, addr)| (map.adjust_type(src, type_idx as i32) as u32, addr))
                .collect();
            (
                try_item.clone(),
                crate::dex::code::EncodedCatchHandler {
                    handlers,
                    catch_all_addr: handler.catch_all_addr,
                },
            )
        })
        .collect();
    CodeItem {
        registers_size: code.registers_size,
        ins_size: code.ins_size,
        outs_size: code.outs_size,
        debug_info_off: code.debug_info_off,
        insns: remap_instructions(src, map, &code.insns),
        tries,
    }
}

pub fn rewrite_debug_info(
    src: Source,
    map: &IndexMap,
    di: &crate::dex::code::DebugInfo,
) -> crate::dex::code::DebugInfo {
    crate::dex::code::DebugInfo {
        line_start: di.line_start,
        parameter_names: di
            .parameter_names
            .iter()
            .map(|&p| map.adjust_string(src, p))
            .collect(),
        bytecode: rewrite_debug_bytecode(src, map, &di.bytecode),
    }
}

/// Walks a `debug_info_item` opcode stream, re-emitting every opcode
/// verbatim except `START_LOCAL`(0x03)/`START_LOCAL_EXTENDED`(0x04)/
/// `SET_FILE`(0x09), whose `uleb128p1` string/type operands are remapped
/// through `map` (SPEC_FULL.md §4.5). Stops and returns what's been
/// rewritten so far if the stream ends before `END_SEQUENCE` — mirroring
/// the opaque, terminator-seeking way `DebugInfo::read_from` already
/// treats this byte range.
fn rewrite_debug_bytecode(src: Source, map: &IndexMap, bytecode: &[u8]) -> Vec<u8> {
    let mut cur = Cursor::new(bytecode);
    let mut out = Vec::with_capacity(bytecode.len());

    loop {
        let opcode = match read_u8(&mut cur) {
            Some(b) => b,
            None => break,
        };
        out.push(opcode);
        if opcode == 0x00 {
            break; // DBG_END_SEQUENCE
        }

        let rewrote = match opcode {
            0x01 => copy_uleb(&mut cur, &mut out),
            0x02 => copy_sleb(&mut cur, &mut out),
            0x03 | 0x04 => {
                copy_uleb(&mut cur, &mut out)
                    && remap_uleb_p1(&mut cur, &mut out, |p| map.adjust_string(src, p))
                    && remap_uleb_p1(&mut cur, &mut out, |t| map.adjust_type(src, t))
                    && (opcode == 0x03 || remap_uleb_p1(&mut cur, &mut out, |p| map.adjust_string(src, p)))
            }
            0x05 | 0x06 => copy_uleb(&mut cur, &mut out),
            0x07 | 0x08 => true,
            0x09 => remap_uleb_p1(&mut cur, &mut out, |p| map.adjust_string(src, p)),
            _ => true, // special opcodes (0x0A-0xFF): implicit addr/line deltas, no operands
        };
        if !rewrote {
            break;
        }
    }
    out
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Option<u8> {
    use std::io::Read;
    let mut b = [0u8; 1];
    cur.read_exact(&mut b).ok()?;
    Some(b[0])
}

fn copy_uleb(cur: &mut Cursor<&[u8]>, out: &mut Vec<u8>) -> bool {
    match read_uleb128(cur) {
        Ok(v) => write_uleb128(out, v).is_ok(),
        Err(_) => false,
    }
}

fn copy_sleb(cur: &mut Cursor<&[u8]>, out: &mut Vec<u8>) -> bool {
    match read_sleb128(cur) {
        Ok(v) => write_sleb128(out, v).is_ok(),
        Err(_) => false,
    }
}

fn remap_uleb_p1(cur: &mut Cursor<&[u8]>, out: &mut Vec<u8>, f: impl FnOnce(i32) -> i32) -> bool {
    match read_uleb128p1(cur) {
        Ok(v) => write_uleb128p1(out, f(v)).is_ok(),
        Err(_) => false,
    }
}

pub fn rewrite_encoded_value(src: Source, map: &IndexMap, v: &EncodedValue) -> EncodedValue {
    match v {
        EncodedValue::StringRef(s) => EncodedValue::StringRef(map.adjust_string(src, *s as i32) as u32),
        EncodedValue::TypeRef(t) => EncodedValue::TypeRef(map.adjust_type(src, *t as i32) as u32),
        EncodedValue::FieldRef(f) => EncodedValue::FieldRef(map.adjust_field(src, *f)),
        EncodedValue::MethodRef(m) => EncodedValue::MethodRef(map.adjust_method(src, *m)),
        EncodedValue::EnumRef(f) => EncodedValue::EnumRef(map.adjust_field(src, *f)),
        EncodedValue::Array(items) => EncodedValue::Array(
            items.iter().map(|i| rewrite_encoded_value(src, map, i)).collect(),
        ),
        EncodedValue::AnnotationValue(ann) => {
            EncodedValue::AnnotationValue(Box::new(rewrite_annotation(src, map, ann)))
        }
        other => other.clone(),
    }
}

pub fn rewrite_encoded_array(src: Source, map: &IndexMap, arr: &EncodedArray) -> EncodedArray {
    EncodedArray {
        values: arr
            .values
            .iter()
            .map(|v| rewrite_encoded_value(src, map, v))
            .collect(),
    }
}

pub fn rewrite_annotation(src: Source, map: &IndexMap, ann: &Annotation) -> Annotation {
    Annotation {
        visibility: ann.visibility,
        type_idx: map.adjust_type(src, ann.type_idx as i32) as u32,
        elements: ann
            .elements
            .iter()
            .map(|(name_idx, value)| {
                (
                    map.adjust_string(src, *name_idx as i32) as u32,
                    rewrite_encoded_value(src, map, value),
                )
            })
            .collect(),
    }
}

pub fn rewrite_annotation_set(src: Source, map: &IndexMap, set: &AnnotationSet) -> AnnotationSet {
    AnnotationSet {
        entries: set
            .entries
            .iter()
            .map(|&o| map.adjust_annotation_off(src, o))
            .collect(),
    }
}

pub fn rewrite_annotation_set_ref_list(
    src: Source,
    map: &IndexMap,
    list: &AnnotationSetRefList,
) -> AnnotationSetRefList {
    AnnotationSetRefList {
        list: list
            .list
            .iter()
            .map(|&o| map.adjust_annotation_set_off(src, o))
            .collect(),
    }
}

pub fn rewrite_annotations_directory(
    src: Source,
    map: &IndexMap,
    dir: &AnnotationsDirectory,
) -> AnnotationsDirectory {
    AnnotationsDirectory {
        class_annotations_off: map.adjust_annotation_set_off(src, dir.class_annotations_off),
        field_annotations: dir
            .field_annotations
            .iter()
            .map(|&(idx, off)| (map.adjust_field(src, idx), map.adjust_annotation_set_off(src, off)))
            .collect(),
        method_annotations: dir
            .method_annotations
            .iter()
            .map(|&(idx, off)| (map.adjust_method(src, idx), map.adjust_annotation_set_off(src, off)))
            .collect(),
        parameter_annotations: dir
            .parameter_annotations
            .iter()
            .map(|&(idx, off)| {
                (
                    map.adjust_method(src, idx),
                    map.adjust_annotation_set_ref_list_off(src, off),
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::NO_INDEX;

    fn sample_map() -> IndexMap {
        let mut map = IndexMap::new();
        map.reserve_strings(Source::A, 2);
        map.set_string(Source::A, 0, 10);
        map.set_string(Source::A, 1, 11);
        map.reserve_types(Source::A, 2);
        map.set_type(Source::A, 0, 20).unwrap();
        map.set_type(Source::A, 1, 21).unwrap();
        map.reserve_fields(Source::A, 1);
        map.set_field(Source::A, 0, 30).unwrap();
        map.reserve_methods(Source::A, 1);
        map.set_method(Source::A, 0, 40).unwrap();
        map.reserve_protos(Source::A, 1);
        map.set_proto(Source::A, 0, 50).unwrap();
        map
    }

    #[test]
    fn class_def_rewrite_preserves_no_index_sentinels() {
        let map = sample_map();
        let def = ClassDefRaw {
            class_idx: 0,
            access_flags: 1,
            superclass_idx: NO_INDEX,
            interfaces_off: 0,
            source_file_idx: NO_INDEX,
            annotations_off: 0,
            class_data_off: 0,
            static_values_off: 0,
        };
        let out = rewrite_class_def(Source::A, &map, &def);
        assert_eq!(out.class_idx, 20);
        assert_eq!(out.superclass_idx, NO_INDEX);
        assert_eq!(out.source_file_idx, NO_INDEX);
    }

    #[test]
    fn class_def_rewrite_translates_real_refs() {
        let map = sample_map();
        let def = ClassDefRaw {
            class_idx: 1,
            access_flags: 0,
            superclass_idx: 0,
            interfaces_off: 0,
            source_file_idx: 1,
            annotations_off: 0,
            class_data_off: 0,
            static_values_off: 0,
        };
        let out = rewrite_class_def(Source::A, &map, &def);
        assert_eq!(out.class_idx, 21);
        assert_eq!(out.superclass_idx, 20);
        assert_eq!(out.source_file_idx, 11);
    }

    #[test]
    fn class_data_rewrite_translates_field_and_method_indices() {
        let map = sample_map();
        let data = ClassData {
            static_fields: vec![EncodedField {
                field_idx: 0,
                access_flags: 0x9,
            }],
            direct_methods: vec![EncodedMethod {
                method_idx: 0,
                access_flags: 1,
                code_off: 5,
            }],
            ..Default::default()
        };
        let out = rewrite_class_data(Source::A, &map, &data);
        assert_eq!(out.static_fields[0].field_idx, 30);
        assert_eq!(out.direct_methods[0].method_idx, 40);
        assert_eq!(out.direct_methods[0].code_off, 5);
    }

    #[test]
    fn debug_info_rewrite_remaps_start_local_and_set_file_refs() {
        let map = sample_map();
        let mut bytecode = Vec::new();
        // SET_FILE(0x09) name=0 (uleb128p1 encodes 0 as value+1=1)
        bytecode.push(0x09);
        write_uleb128p1(&mut bytecode, 0).unwrap();
        // START_LOCAL(0x03) reg=2, name=NO_INDEX, type=1
        bytecode.push(0x03);
        write_uleb128(&mut bytecode, 2).unwrap();
        write_uleb128p1(&mut bytecode, NO_INDEX).unwrap();
        write_uleb128p1(&mut bytecode, 1).unwrap();
        bytecode.push(0x00); // END_SEQUENCE

        let di = crate::dex::code::DebugInfo {
            line_start: 1,
            parameter_names: vec![],
            bytecode,
        };
        let out = rewrite_debug_info(Source::A, &map, &di);

        let mut cur = Cursor::new(out.bytecode.as_slice());
        assert_eq!(read_u8(&mut cur), Some(0x09));
        assert_eq!(read_uleb128p1(&mut cur).unwrap(), 10); // string 0 -> 10
        assert_eq!(read_u8(&mut cur), Some(0x03));
        assert_eq!(read_uleb128(&mut cur).unwrap(), 2); // register untouched
        assert_eq!(read_uleb128p1(&mut cur).unwrap(), NO_INDEX); // sentinel preserved
        assert_eq!(read_uleb128p1(&mut cur).unwrap(), 21); // type 1 -> 21
        assert_eq!(read_u8(&mut cur), Some(0x00));
    }

    #[test]
    fn encoded_value_array_rewrites_recursively() {
        let map = sample_map();
        let v = EncodedValue::Array(vec![
            EncodedValue::StringRef(0),
            EncodedValue::TypeRef(1),
        ]);
        let out = rewrite_encoded_value(Source::A, &map, &v);
        match out {
            EncodedValue::Array(items) => {
                assert_eq!(items[0], EncodedValue::StringRef(10));
                assert_eq!(items[1], EncodedValue::TypeRef(21));
            }
            _ => panic!("expected array"),
        }
    }
}
