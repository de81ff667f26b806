//! Fixed-width ID section records: proto_id, field_id, method_id, and the
//! type_list data-section record.
//!
//! String IDs are represented directly as `String` in `DexFile::string_ids`
//! (the ID section there is just "index -> interned string"); type IDs are
//! represented as `u32` string-id references in `DexFile::type_ids`. Both
//! are simple enough not to need their own record struct.

use std::io::{Read, Write};

use crate::error::Result;
use crate::leb128::{read_u16, read_u32, write_u16, write_u32};

/// `proto_id_item`: sort key is `(return_type_idx, parameter type list)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoIdRaw {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    /// Offset into the type_list data section, or 0 if no parameters.
    pub parameters_off: u32,
}

impl ProtoIdRaw {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            shorty_idx: read_u32(r)?,
            return_type_idx: read_u32(r)?,
            parameters_off: read_u32(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, self.shorty_idx)?;
        write_u32(w, self.return_type_idx)?;
        write_u32(w, self.parameters_off)?;
        Ok(())
    }
}

/// `field_id_item`: sort key is `(defining class, name, type)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIdRaw {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

impl FieldIdRaw {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            class_idx: read_u16(r)?,
            type_idx: read_u16(r)?,
            name_idx: read_u32(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u16(w, self.class_idx)?;
        write_u16(w, self.type_idx)?;
        write_u32(w, self.name_idx)?;
        Ok(())
    }
}

/// `method_id_item`: sort key is `(defining class, name, proto)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodIdRaw {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

impl MethodIdRaw {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            class_idx: read_u16(r)?,
            proto_idx: read_u16(r)?,
            name_idx: read_u32(r)?,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u16(w, self.class_idx)?;
        write_u16(w, self.proto_idx)?;
        write_u32(w, self.name_idx)?;
        Ok(())
    }
}

/// `type_list`: a count-prefixed packed array of 2-byte type indices.
/// 4-byte aligned at the start of each list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeList {
    pub type_idx: Vec<u32>,
}

impl TypeList {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let size = read_u32(r)?;
        let mut type_idx = Vec::with_capacity(size as usize);
        for _ in 0..size {
            type_idx.push(read_u16(r)? as u32);
        }
        Ok(Self { type_idx })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32(w, self.type_idx.len() as u32)?;
        for &t in &self.type_idx {
            write_u16(w, t as u16)?;
        }
        Ok(())
    }

    /// Serialized byte length (count field + packed indices, unaligned).
    pub fn byte_len(&self) -> usize {
        4 + self.type_idx.len() * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn proto_id_roundtrips() {
        let p = ProtoIdRaw {
            shorty_idx: 1,
            return_type_idx: 2,
            parameters_off: 0x100,
        };
        let mut buf = Vec::new();
        p.write_to(&mut buf).unwrap();
        let back = ProtoIdRaw::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn field_id_roundtrips() {
        let f = FieldIdRaw {
            class_idx: 5,
            type_idx: 6,
            name_idx: 7,
        };
        let mut buf = Vec::new();
        f.write_to(&mut buf).unwrap();
        let back = FieldIdRaw::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(f, back);
    }

    #[test]
    fn method_id_roundtrips() {
        let m = MethodIdRaw {
            class_idx: 5,
            proto_idx: 1,
            name_idx: 9,
        };
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        let back = MethodIdRaw::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn empty_type_list_roundtrips() {
        let tl = TypeList::default();
        let mut buf = Vec::new();
        tl.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), tl.byte_len());
        let back = TypeList::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(tl, back);
    }

    #[test]
    fn type_list_roundtrips_with_entries() {
        let tl = TypeList {
            type_idx: vec![3, 4, 5],
        };
        let mut buf = Vec::new();
        tl.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), tl.byte_len());
        let back = TypeList::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(tl, back);
    }
}
