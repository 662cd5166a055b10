//! Two-pass symbol resolution. A symbol is either an address (resolved to
//! `defining segment's base + offset`) or a `.VALUE` (resolved to the raw
//! offset field, no base added). Every reference is recorded with a
//! placeholder zero word already written at its site; patching later
//! verifies that placeholder is still zero, which doubles as a guard
//! against patching the same reference twice.

use crate::error::{AsmError, AsmErrorKind};
use crate::segment::Segment;

struct SymbolRef {
    seg_offset: u32,
    src_line: usize,
    seg_index: usize,
}

struct SymbolHead {
    name: String,
    known: bool,
    is_value: bool,
    offset: u32,
    src_line: usize,
    seg_index: usize,
    filename: String,
    refs: Vec<SymbolRef>,
}

#[derive(Default)]
pub struct SymbolTable {
    heads: Vec<SymbolHead>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut SymbolHead> {
        self.heads.iter_mut().find(|h| h.name == name)
    }

    fn add_def(
        &mut self,
        name: &str,
        offset: u32,
        src_line: usize,
        seg_index: usize,
        filename: &str,
        is_value: bool,
    ) -> Result<(), AsmError> {
        if let Some(head) = self.find_mut(name) {
            if head.known {
                return Err(AsmError::new(
                    filename,
                    src_line,
                    AsmErrorKind::DuplicateSymbol(name.to_string()),
                ));
            }
            head.known = true;
            head.offset = offset;
            head.src_line = src_line;
            head.seg_index = seg_index;
            head.is_value = is_value;
            head.filename = filename.to_string();
        } else {
            self.heads.push(SymbolHead {
                name: name.to_string(),
                known: true,
                is_value,
                offset,
                src_line,
                seg_index,
                filename: filename.to_string(),
                refs: Vec::new(),
            });
        }
        Ok(())
    }

    /// Declare a label at the current segment offset (an address symbol).
    pub fn add_symbol(
        &mut self,
        name: &str,
        offset: u32,
        src_line: usize,
        seg_index: usize,
        filename: &str,
    ) -> Result<(), AsmError> {
        self.add_def(name, offset, src_line, seg_index, filename, false)
    }

    /// Declare a `.VALUE` symbol: its resolved value is the literal itself.
    pub fn add_value(
        &mut self,
        name: &str,
        value: u32,
        src_line: usize,
        seg_index: usize,
        filename: &str,
    ) -> Result<(), AsmError> {
        self.add_def(name, value, src_line, seg_index, filename, true)
    }

    /// Record a reference to `name` at `seg_offset` within `seg_index`. The
    /// caller has already written a placeholder zero word there.
    pub fn add_ref(&mut self, name: &str, seg_offset: u32, src_line: usize, seg_index: usize) {
        if self.find_mut(name).is_none() {
            self.heads.push(SymbolHead {
                name: name.to_string(),
                known: false,
                is_value: false,
                offset: 0,
                src_line,
                seg_index: 0,
                filename: String::new(),
                refs: Vec::new(),
            });
        }
        let head = self.find_mut(name).expect("just inserted or already present");
        head.refs.push(SymbolRef {
            seg_offset,
            src_line,
            seg_index,
        });
    }

    fn check_all_known(&self) -> Result<(), AsmError> {
        for head in &self.heads {
            if !head.known {
                let line = head.refs.first().map_or(head.src_line, |r| r.src_line);
                return Err(AsmError::new(
                    "<unresolved>",
                    line,
                    AsmErrorKind::UndefinedSymbol(head.name.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Patch every reference into its owning segment. Must be called after
    /// every input file has been assembled (pass 2).
    pub fn patch_all(&self, segments: &mut [Segment]) -> Result<(), AsmError> {
        self.check_all_known()?;
        for head in &self.heads {
            let resolved = if head.is_value {
                head.offset
            } else {
                segments[head.seg_index].base + head.offset
            };
            for r in &head.refs {
                let seg = &mut segments[r.seg_index];
                if seg.read_word(r.seg_offset) != 0 {
                    return Err(AsmError::new(
                        seg.filename.clone(),
                        r.src_line,
                        AsmErrorKind::DoublePatch(head.name.clone()),
                    ));
                }
                seg.modify_word(r.seg_offset, resolved);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_address_symbol_to_base_plus_offset() {
        let mut table = SymbolTable::new();
        table.add_symbol("LOOP", 4, 1, 0, "a.asm").unwrap();
        table.add_ref("LOOP", 2, 2, 0);
        let mut segs = vec![Segment::new(0x100, "a.asm")];
        segs[0].add_word(0);
        segs[0].add_word(0);
        segs[0].add_word(0);
        table.patch_all(&mut segs).unwrap();
        assert_eq!(segs[0].read_word(2), 0x104);
    }

    #[test]
    fn value_symbol_resolves_to_raw_offset_with_no_base() {
        let mut table = SymbolTable::new();
        table.add_value("LIMIT", 42, 1, 0, "a.asm").unwrap();
        table.add_ref("LIMIT", 0, 2, 0);
        let mut segs = vec![Segment::new(0x100, "a.asm")];
        segs[0].add_word(0);
        table.patch_all(&mut segs).unwrap();
        assert_eq!(segs[0].read_word(0), 42);
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let mut table = SymbolTable::new();
        table.add_symbol("X", 0, 1, 0, "a.asm").unwrap();
        let err = table.add_symbol("X", 1, 2, 0, "a.asm").unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::DuplicateSymbol(_)));
    }

    #[test]
    fn undefined_symbol_fails_at_patch_time() {
        let mut table = SymbolTable::new();
        table.add_ref("GHOST", 0, 5, 0);
        let mut segs = vec![Segment::new(0, "a.asm")];
        segs[0].add_word(0);
        let err = table.patch_all(&mut segs).unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::UndefinedSymbol(_)));
    }
}
