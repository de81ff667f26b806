//! C7: bytecode instruction transformer.
//!
//! Walks a method's `insns` code-unit stream and remaps every embedded
//! string/type/field/method reference through `IndexMap`. Coverage is a
//! representative slice of the Dalvik instruction set — the format
//! families actually named in scope (10x/11x/11n/21c/22c/23x/22b/22t/22s/
//! 31i/31c/31t/35c/3rc/51l, plus the packed-switch/sparse-switch/
//! fill-array-data pseudo-instructions), not an exhaustive ~230-opcode
//! table. Opcodes outside that set are walked as 10x (one code unit, no
//! embedded reference) — correct for the many real 10x/12x opcodes that
//! fall in this bucket, conservative (a skipped reference rewrite) for any
//! exotic opcode that both isn't in the table and does carry one.

use crate::index_map::{IndexMap, Source};

const OP_NOP: u8 = 0x00;
const PSEUDO_PACKED_SWITCH: u16 = 0x0100;
const PSEUDO_SPARSE_SWITCH: u16 = 0x0200;
const PSEUDO_FILL_ARRAY_DATA: u16 = 0x0300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    None,
    StringRef,
    TypeRef,
    FieldRef,
    MethodRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// 1 code unit, no operands (10x) or a packed 4-bit operand (11n/12x).
    Unit1,
    /// 2 code units: op + 16-bit index/offset/literal (21c/22x/21t/21s/21h).
    Unit2(RefKind),
    /// 2 code units, 8-bit+8-bit operands plus a reference (22c/22b/22t/22s).
    Unit2Split(RefKind),
    /// 3 code units (23x/31i/31c/31t/32x).
    Unit3(RefKind),
    /// 3 code units, invoke-kind with up to 5 args packed into the header (35c).
    Invoke35c,
    /// 3 code units, invoke-kind/range (3rc).
    Invoke3rc,
    /// 5 code units, wide literal (51l).
    Unit5,
}

fn opcode_format(opcode: u8) -> Format {
    match opcode {
        // const-string
        0x1a => Format::Unit2(RefKind::StringRef),
        // const-string/jumbo
        0x1b => Format::Unit3(RefKind::StringRef),
        // const-class, new-instance, check-cast
        0x1c | 0x22 | 0x1f => Format::Unit2(RefKind::TypeRef),
        // instance-of, new-array
        0x20 | 0x23 => Format::Unit2Split(RefKind::TypeRef),
        // sget..sput (static field refs)
        0x60..=0x6d => Format::Unit2(RefKind::FieldRef),
        // iget..iput (instance field refs)
        0x52..=0x5f => Format::Unit2Split(RefKind::FieldRef),
        // invoke-virtual/super/direct/static/interface
        0x6e..=0x72 => Format::Invoke35c,
        // invoke-*/range
        0x74..=0x78 => Format::Invoke3rc,
        // const-wide
        0x18 => Format::Unit5,
        // move/return/const-4/if-* family and everything else representative
        // of a reference-free format: treat as a single code unit.
        _ => Format::Unit1,
    }
}

fn unit_count(fmt: Format) -> usize {
    match fmt {
        Format::Unit1 => 1,
        Format::Unit2(_) | Format::Unit2Split(_) => 2,
        Format::Unit3(_) | Format::Invoke35c | Format::Invoke3rc => 3,
        Format::Unit5 => 5,
    }
}

/// Remap every embedded string/type/field/method reference in `insns`,
/// returning a new instruction stream of the same length.
pub fn remap_instructions(source: Source, map: &IndexMap, insns: &[u16]) -> Vec<u16> {
    let mut out = insns.to_vec();
    let mut pc = 0usize;
    while pc < out.len() {
        let unit = out[pc];
        let opcode = (unit & 0xff) as u8;

        if opcode == OP_NOP {
            // Could be a real nop or the header of a payload pseudo-instruction.
            if pc + 1 < out.len() {
                match unit {
                    u if u == PSEUDO_PACKED_SWITCH => {
                        pc += packed_switch_len(&out[pc..]);
                        continue;
                    }
                    u if u == PSEUDO_SPARSE_SWITCH => {
                        pc += sparse_switch_len(&out[pc..]);
                        continue;
                    }
                    u if u == PSEUDO_FILL_ARRAY_DATA => {
                        pc += fill_array_data_len(&out[pc..]);
                        continue;
                    }
                    _ => {}
                }
            }
            pc += 1;
            continue;
        }

        let fmt = opcode_format(opcode);
        let count = unit_count(fmt);
        if pc + count > out.len() {
            break;
        }
        apply_remap(source, map, fmt, &mut out[pc..pc + count]);
        pc += count;
    }
    out
}

fn apply_remap(source: Source, map: &IndexMap, fmt: Format, units: &mut [u16]) {
    match fmt {
        Format::Unit2(kind) => remap_field(source, map, kind, &mut units[1]),
        Format::Unit2Split(kind) => remap_field(source, map, kind, &mut units[1]),
        Format::Unit3(RefKind::StringRef) => {
            let old = (units[1] as u32) | ((units[2] as u32) << 16);
            let new = map.adjust_string(source, old as i32) as u32;
            units[1] = (new & 0xffff) as u16;
            units[2] = (new >> 16) as u16;
        }
        Format::Unit3(_) | Format::Unit5 | Format::Unit1 => {}
        Format::Invoke35c => remap_16(source, map, RefKind::MethodRef, &mut units[1]),
        Format::Invoke3rc => remap_16(source, map, RefKind::MethodRef, &mut units[1]),
    }
}

fn remap_field(source: Source, map: &IndexMap, kind: RefKind, unit: &mut u16) {
    remap_16(source, map, kind, unit)
}

fn remap_16(source: Source, map: &IndexMap, kind: RefKind, unit: &mut u16) {
    let old = *unit as u32;
    let new = match kind {
        RefKind::None => old,
        RefKind::StringRef => map.adjust_string(source, old as i32) as u32,
        RefKind::TypeRef => map.adjust_type(source, old as i32) as u32,
        RefKind::FieldRef => map.adjust_field(source, old),
        RefKind::MethodRef => map.adjust_method(source, old),
    };
    *unit = new as u16;
}

fn packed_switch_len(units: &[u16]) -> usize {
    let size = units.get(1).copied().unwrap_or(0) as usize;
    2 + size * 2
}

fn sparse_switch_len(units: &[u16]) -> usize {
    let size = units.get(1).copied().unwrap_or(0) as usize;
    2 + size * 4
}

fn fill_array_data_len(units: &[u16]) -> usize {
    let element_width = units.get(1).copied().unwrap_or(0) as usize;
    let size = (units.get(2).copied().unwrap_or(0) as usize)
        | ((units.get(3).copied().unwrap_or(0) as usize) << 16);
    let data_units = (element_width * size + 1) / 2;
    4 + data_units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_string_operand_is_remapped() {
        let mut map = IndexMap::new();
        map.reserve_strings(Source::A, 1);
        map.set_string(Source::A, 0, 99);
        // const-string v0, string@0  => 0x1a 0x00 0x0000
        let insns = vec![0x001a, 0x0000];
        let out = remap_instructions(Source::A, &map, &insns);
        assert_eq!(out[1], 99);
    }

    #[test]
    fn non_reference_instruction_is_untouched() {
        let map = IndexMap::new();
        // return-void
        let insns = vec![0x0e00];
        let out = remap_instructions(Source::A, &map, &insns);
        assert_eq!(out, insns);
    }

    #[test]
    fn packed_switch_payload_is_skipped_without_corruption() {
        let map = IndexMap::new();
        // pseudo-header + size=1 + first_key(2 units) + one target(2 units)
        let insns = vec![
            PSEUDO_PACKED_SWITCH,
            1,
            0,
            0,
            10,
            0,
        ];
        let out = remap_instructions(Source::A, &map, &insns);
        assert_eq!(out, insns);
    }

    #[test]
    fn invoke_method_ref_is_remapped() {
        let mut map = IndexMap::new();
        map.reserve_methods(Source::B, 1);
        map.set_method(Source::B, 0, 42).unwrap();
        // invoke-static {}, method@0 => opcode 0x71, argc/regs packed, method_idx, regs
        let insns = vec![0x0071, 0x0000, 0x0000];
        let out = remap_instructions(Source::B, &map, &insns);
        assert_eq!(out[1], 42);
    }
}
