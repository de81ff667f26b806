//! `class_def_item` and `class_data_item`.
//!
//! `class_data_item` stores its four method/field lists as ULEB128 deltas
//! against the previous entry's index rather than absolute indices — the
//! rewriter (C6) has to decode those deltas into absolute indices, remap
//! them through the index map, re-sort, and re-encode as deltas in the new
//! index space (SPEC_FULL.md §4.5).

use std::io::{Read, Write};

use crate::error::Result;
use crate::leb128::{read_uleb128, write_uleb128};

/// `class_def_item`. Sort key, per the class-def merge (C5), is
/// `class_idx`, but definition order within a DEX must additionally respect
/// superclass/interface precedence — enforced by the topological sort, not
/// by this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDefRaw {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: i32,
    pub interfaces_off: u32,
    pub source_file_idx: i32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl ClassDefRaw {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        use crate::leb128::read_u32;
        Ok(Self {
            class_idx: read_u32(r)?,
            access_flags: read_u32(r)?,
            superclass_idx: read_u32(r)? as i32,
            interfaces_off: read_u32(r)?,
            source_file_idx: read_u32(r)? as i32,
            annotations_off: read_u32(r)?,
            class_data_off: read_u32(r)?,
            static_values_off: read_u32(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        use crate::leb128::write_u32;
        write_u32(w, self.class_idx)?;
        write_u32(w, self.access_flags)?;
        write_u32(w, self.superclass_idx as u32)?;
        write_u32(w, self.interfaces_off)?;
        write_u32(w, self.source_file_idx as u32)?;
        write_u32(w, self.annotations_off)?;
        write_u32(w, self.class_data_off)?;
        write_u32(w, self.static_values_off)?;
        Ok(())
    }
}

/// A single entry of `class_data_item`'s four ULEB128-delta-encoded lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: u32,
}

/// A single entry of `class_data_item`'s direct/virtual method lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    /// Offset into the `code_item` data section, or 0 for abstract/native methods.
    pub code_off: u32,
}

/// `class_data_item`, fully decoded to absolute indices (the on-disk delta
/// encoding is an implementation detail of `read_from`/`write_to`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassData {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let static_fields_size = read_uleb128(r)?;
        let instance_fields_size = read_uleb128(r)?;
        let direct_methods_size = read_uleb128(r)?;
        let virtual_methods_size = read_uleb128(r)?;

        let static_fields = read_field_list(r, static_fields_size)?;
        let instance_fields = read_field_list(r, instance_fields_size)?;
        let direct_methods = read_method_list(r, direct_methods_size)?;
        let virtual_methods = read_method_list(r, virtual_methods_size)?;

        Ok(Self {
            static_fields,
            instance_fields,
            direct_methods,
            virtual_methods,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_uleb128(w, self.static_fields.len() as u32)?;
        write_uleb128(w, self.instance_fields.len() as u32)?;
        write_uleb128(w, self.direct_methods.len() as u32)?;
        write_uleb128(w, self.virtual_methods.len() as u32)?;

        write_field_list(w, &self.static_fields)?;
        write_field_list(w, &self.instance_fields)?;
        write_method_list(w, &self.direct_methods)?;
        write_method_list(w, &self.virtual_methods)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.static_fields.is_empty()
            && self.instance_fields.is_empty()
            && self.direct_methods.is_empty()
            && self.virtual_methods.is_empty()
    }
}

fn read_field_list<R: Read>(r: &mut R, count: u32) -> Result<Vec<EncodedField>> {
    let mut out = Vec::with_capacity(count as usize);
    let mut prev_idx: i64 = 0;
    for _ in 0..count {
        let delta = read_uleb128(r)? as i64;
        prev_idx += delta;
        let access_flags = read_uleb128(r)?;
        out.push(EncodedField {
            field_idx: prev_idx as u32,
            access_flags,
        });
    }
    Ok(out)
}

fn write_field_list<W: Write>(w: &mut W, fields: &[EncodedField]) -> Result<()> {
    let mut prev_idx: i64 = 0;
    for f in fields {
        let delta = f.field_idx as i64 - prev_idx;
        write_uleb128(w, delta as u32)?;
        write_uleb128(w, f.access_flags)?;
        prev_idx = f.field_idx as i64;
    }
    Ok(())
}

fn read_method_list<R: Read>(r: &mut R, count: u32) -> Result<Vec<EncodedMethod>> {
    let mut out = Vec::with_capacity(count as usize);
    let mut prev_idx: i64 = 0;
    for _ in 0..count {
        let delta = read_uleb128(r)? as i64;
        prev_idx += delta;
        let access_flags = read_uleb128(r)?;
        let code_off = read_uleb128(r)?;
        out.push(EncodedMethod {
            method_idx: prev_idx as u32,
            access_flags,
            code_off,
        });
    }
    Ok(out)
}

fn write_method_list<W: Write>(w: &mut W, methods: &[EncodedMethod]) -> Result<()> {
    let mut prev_idx: i64 = 0;
    for m in methods {
        let delta = m.method_idx as i64 - prev_idx;
        write_uleb128(w, delta as u32)?;
        write_uleb128(w, m.access_flags)?;
        write_uleb128(w, m.code_off)?;
        prev_idx = m.method_idx as i64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn class_def_roundtrip() {
        let def = ClassDefRaw {
            class_idx: 3,
            access_flags: 0x1,
            superclass_idx: 2,
            interfaces_off: 0,
            source_file_idx: -1,
            annotations_off: 0,
            class_data_off: 100,
            static_values_off: 0,
        };
        let mut buf = Vec::new();
        def.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(ClassDefRaw::read_from(&mut cur).unwrap(), def);
    }

    #[test]
    fn class_data_roundtrip_preserves_absolute_indices() {
        let data = ClassData {
            static_fields: vec![EncodedField {
                field_idx: 2,
                access_flags: 0x9,
            }],
            instance_fields: vec![
                EncodedField {
                    field_idx: 0,
                    access_flags: 0x2,
                },
                EncodedField {
                    field_idx: 5,
                    access_flags: 0x2,
                },
            ],
            direct_methods: vec![EncodedMethod {
                method_idx: 1,
                access_flags: 0x10001,
                code_off: 0,
            }],
            virtual_methods: vec![
                EncodedMethod {
                    method_idx: 4,
                    access_flags: 0x1,
                    code_off: 200,
                },
                EncodedMethod {
                    method_idx: 10,
                    access_flags: 0x1,
                    code_off: 400,
                },
            ],
        };
        let mut buf = Vec::new();
        data.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(ClassData::read_from(&mut cur).unwrap(), data);
    }

    #[test]
    fn class_data_empty() {
        let data = ClassData::default();
        assert!(data.is_empty());
        let mut buf = Vec::new();
        data.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(ClassData::read_from(&mut cur).unwrap(), data);
    }
}
