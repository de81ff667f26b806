//! `code_item`, `try_item`, `encoded_catch_handler_list`, and `debug_info_item`.
//!
//! The catch-handler list has the format's one real layout quirk: handler
//! lists are written *before* the try-item table in file order, but the
//! try items reference them by offset *relative to the start of the handler
//! list*, so a writer has to lay out handlers first and backpatch the
//! try-item offsets afterward (SPEC_FULL.md §4.5).

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::Result;
use crate::leb128::{
    read_sleb128, read_u16, read_u32, read_uleb128, read_uleb128p1, write_sleb128,
    write_u16, write_u32, write_uleb128, write_uleb128p1,
};

/// Wraps a reader to count bytes consumed, so the catch-handler-list
/// decoder can key each handler by its real byte offset into the list.
struct CountingReader<'a, R: Read> {
    inner: &'a mut R,
    count: usize,
}

impl<'a, R: Read> Read for CountingReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    /// Offset, relative to the start of the handler list, of this try's
    /// `encoded_catch_handler`.
    pub handler_off: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedCatchHandler {
    /// `(type_idx, address)` pairs, most specific first.
    pub handlers: Vec<(u32, u32)>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let size = read_sleb128(r)?;
        let count = size.unsigned_abs() as u32;
        let mut handlers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let type_idx = read_uleb128(r)?;
            let addr = read_uleb128(r)?;
            handlers.push((type_idx, addr));
        }
        let catch_all_addr = if size <= 0 {
            Some(read_uleb128(r)?)
        } else {
            None
        };
        Ok(Self {
            handlers,
            catch_all_addr,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let count = self.handlers.len() as i32;
        let size = if self.catch_all_addr.is_some() {
            -count
        } else {
            count
        };
        write_sleb128(w, size)?;
        for (type_idx, addr) in &self.handlers {
            write_uleb128(w, *type_idx)?;
            write_uleb128(w, *addr)?;
        }
        if let Some(addr) = self.catch_all_addr {
            write_uleb128(w, addr)?;
        }
        Ok(())
    }
}

/// `debug_info_item`: a line-number program. Carried as its raw opcode
/// stream plus the decoded parameter-name and line-start header fields;
/// the rewriter remaps the header's parameter names and also walks the
/// opcode stream in place to remap the string/type references embedded in
/// `DBG_SET_FILE` and `DBG_START_LOCAL[_EXTENDED]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebugInfo {
    pub line_start: u32,
    /// `uleb128p1`-encoded parameter name string indices (NO_INDEX = no name).
    pub parameter_names: Vec<i32>,
    /// Opcode stream following the header, unparsed — `DBG_END_SEQUENCE`-terminated.
    pub bytecode: Vec<u8>,
}

impl DebugInfo {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let line_start = read_uleb128(r)?;
        let params_size = read_uleb128(r)?;
        let mut parameter_names = Vec::with_capacity(params_size as usize);
        for _ in 0..params_size {
            parameter_names.push(read_uleb128p1(r)?);
        }
        let mut bytecode = Vec::new();
        loop {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            bytecode.push(b[0]);
            if b[0] == 0x00 {
                // DBG_END_SEQUENCE
                break;
            }
        }
        Ok(Self {
            line_start,
            parameter_names,
            bytecode,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_uleb128(w, self.line_start)?;
        write_uleb128(w, self.parameter_names.len() as u32)?;
        for &p in &self.parameter_names {
            write_uleb128p1(w, p)?;
        }
        w.write_all(&self.bytecode)?;
        Ok(())
    }
}

/// `code_item`, decoded with its try/catch table laid out as absolute
/// (start_addr, insn_count, handler) triples rather than the on-disk
/// handler-list-plus-offset-table indirection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
    pub tries: Vec<(TryItem, EncodedCatchHandler)>,
}

impl CodeItem {
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let registers_size = read_u16(r)?;
        let ins_size = read_u16(r)?;
        let outs_size = read_u16(r)?;
        let tries_size = read_u16(r)?;
        let debug_info_off = read_u32(r)?;
        let insns_size = read_u32(r)?;
        let mut insns = Vec::with_capacity(insns_size as usize);
        for _ in 0..insns_size {
            insns.push(read_u16(r)?);
        }
        if tries_size == 0 {
            return Ok(Self {
                registers_size,
                ins_size,
                outs_size,
                debug_info_off,
                insns,
                tries: Vec::new(),
            });
        }
        if insns_size % 2 == 1 {
            // padding before the try table when insns_size is odd
            let mut pad = [0u8; 2];
            r.read_exact(&mut pad)?;
        }
        let mut try_headers = Vec::with_capacity(tries_size as usize);
        for _ in 0..tries_size {
            try_headers.push(TryItem {
                start_addr: read_u32(r)?,
                insn_count: read_u16(r)?,
                handler_off: read_u16(r)?,
            });
        }
        let handlers_list_size = read_uleb128(r)?;
        // try_headers reference handlers by byte offset relative to the
        // start of this list (so multiple tries can share one handler);
        // track bytes consumed per handler to key a real offset -> handler
        // map instead of assuming handlers are dense and positional.
        let mut counting = CountingReader { inner: r, count: 0 };
        let mut handlers_by_offset: HashMap<u16, EncodedCatchHandler> =
            HashMap::with_capacity(handlers_list_size as usize);
        for _ in 0..handlers_list_size {
            let offset = counting.count as u16;
            let handler = EncodedCatchHandler::read_from(&mut counting)?;
            handlers_by_offset.insert(offset, handler);
        }
        let tries = try_headers
            .into_iter()
            .map(|t| {
                let handler = handlers_by_offset.get(&t.handler_off).cloned().unwrap_or_default();
                (t, handler)
            })
            .collect();
        Ok(Self {
            registers_size,
            ins_size,
            outs_size,
            debug_info_off,
            insns,
            tries,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u16(w, self.registers_size)?;
        write_u16(w, self.ins_size)?;
        write_u16(w, self.outs_size)?;
        write_u16(w, self.tries.len() as u16)?;
        write_u32(w, self.debug_info_off)?;
        write_u32(w, self.insns.len() as u32)?;
        for insn in &self.insns {
            write_u16(w, *insn)?;
        }
        if self.tries.is_empty() {
            return Ok(());
        }
        if self.insns.len() % 2 == 1 {
            write_u16(w, 0)?;
        }
        // Backpatch pass: serialize handlers first to learn each one's byte
        // offset within the handler list, then emit try items referencing
        // those offsets, per the format's forward-reference layout.
        let mut handler_bytes = Vec::new();
        let mut offsets = Vec::with_capacity(self.tries.len());
        for (_, handler) in &self.tries {
            offsets.push(handler_bytes.len() as u16);
            handler.write_to(&mut handler_bytes)?;
        }
        for (i, (try_item, _)) in self.tries.iter().enumerate() {
            write_u32(w, try_item.start_addr)?;
            write_u16(w, try_item.insn_count)?;
            write_u16(w, offsets[i])?;
        }
        write_uleb128(w, self.tries.len() as u32)?;
        w.write_all(&handler_bytes)?;
        Ok(())
    }

    /// Serialized byte length, used by the size estimator (C8).
    pub fn byte_len(&self) -> usize {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("in-memory write cannot fail");
        buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn catch_handler_roundtrip_with_catch_all() {
        let h = EncodedCatchHandler {
            handlers: vec![(1, 10), (2, 20)],
            catch_all_addr: Some(30),
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(EncodedCatchHandler::read_from(&mut cur).unwrap(), h);
    }

    #[test]
    fn catch_handler_roundtrip_without_catch_all() {
        let h = EncodedCatchHandler {
            handlers: vec![(5, 50)],
            catch_all_addr: None,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(EncodedCatchHandler::read_from(&mut cur).unwrap(), h);
    }

    #[test]
    fn debug_info_roundtrip() {
        let di = DebugInfo {
            line_start: 3,
            parameter_names: vec![-1, 5, 7],
            bytecode: vec![0x01, 0x02, 0x00],
        };
        let mut buf = Vec::new();
        di.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(DebugInfo::read_from(&mut cur).unwrap(), di);
    }

    #[test]
    fn code_item_roundtrip_no_tries() {
        let code = CodeItem {
            registers_size: 2,
            ins_size: 1,
            outs_size: 0,
            debug_info_off: 0,
            insns: vec![0x0e00],
            tries: Vec::new(),
        };
        let mut buf = Vec::new();
        code.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(CodeItem::read_from(&mut cur).unwrap(), code);
    }

    #[test]
    fn code_item_read_resolves_handlers_by_real_offset_not_position() {
        // Two handlers of different encoded width: handler A (catch-all
        // only, 2 bytes) at offset 0, handler B (one typed pair, 3 bytes)
        // at offset 2. try0 references B (offset 2), try1 references A
        // (offset 0) -- the reverse of decode order, so a positional
        // (index-modulo-count) lookup would swap them.
        let mut buf = Vec::new();
        write_u16(&mut buf, 1).unwrap(); // registers_size
        write_u16(&mut buf, 0).unwrap(); // ins_size
        write_u16(&mut buf, 0).unwrap(); // outs_size
        write_u16(&mut buf, 2).unwrap(); // tries_size
        write_u32(&mut buf, 0).unwrap(); // debug_info_off
        write_u32(&mut buf, 1).unwrap(); // insns_size
        write_u16(&mut buf, 0x0e00).unwrap(); // insns
        write_u16(&mut buf, 0).unwrap(); // padding (insns_size is odd)
        write_u32(&mut buf, 0).unwrap(); // try0.start_addr
        write_u16(&mut buf, 1).unwrap(); // try0.insn_count
        write_u16(&mut buf, 2).unwrap(); // try0.handler_off -> B
        write_u32(&mut buf, 5).unwrap(); // try1.start_addr
        write_u16(&mut buf, 1).unwrap(); // try1.insn_count
        write_u16(&mut buf, 0).unwrap(); // try1.handler_off -> A
        write_uleb128(&mut buf, 2).unwrap(); // handlers_list_size
        write_sleb128(&mut buf, 0).unwrap(); // handler A: size=0, catch-all only
        write_uleb128(&mut buf, 11).unwrap(); // handler A: catch_all_addr
        write_sleb128(&mut buf, 1).unwrap(); // handler B: size=1, no catch-all
        write_uleb128(&mut buf, 3).unwrap(); // handler B: type_idx
        write_uleb128(&mut buf, 4).unwrap(); // handler B: addr

        let mut cur = Cursor::new(buf);
        let code = CodeItem::read_from(&mut cur).unwrap();

        assert_eq!(code.tries[0].1.handlers, vec![(3, 4)]);
        assert_eq!(code.tries[0].1.catch_all_addr, None);
        assert_eq!(code.tries[1].1.handlers, Vec::new());
        assert_eq!(code.tries[1].1.catch_all_addr, Some(11));
    }

    #[test]
    fn code_item_roundtrip_with_single_try() {
        let code = CodeItem {
            registers_size: 3,
            ins_size: 1,
            outs_size: 2,
            debug_info_off: 0,
            insns: vec![0x0100, 0x0200, 0x0e00],
            tries: vec![(
                TryItem {
                    start_addr: 0,
                    insn_count: 2,
                    handler_off: 0,
                },
                EncodedCatchHandler {
                    handlers: vec![(3, 2)],
                    catch_all_addr: None,
                },
            )],
        };
        let mut buf = Vec::new();
        code.write_to(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        let decoded = CodeItem::read_from(&mut cur).unwrap();
        assert_eq!(decoded.insns, code.insns);
        assert_eq!(decoded.tries.len(), 1);
        assert_eq!(decoded.tries[0].0.start_addr, 0);
        assert_eq!(decoded.tries[0].1.handlers, vec![(3, 2)]);
    }
}
