//! Two-pass line-oriented assembler. Each source line becomes either a
//! label declaration, a directive, or an instruction; symbol references are
//! replaced with a zero placeholder and recorded for patching once every
//! input file has been walked.
//!
//! Tokenizing ignores punctuation except as a separator, same as the
//! original tool: `ADD R0, R2, R2` and `ADD R0 + R2 = R2` tokenize
//! identically.

use w56_core::{ArityClass, Instruction, OperandKind, RegisterArg};

use crate::error::{AsmError, AsmErrorKind};
use crate::segment::Segment;
use crate::symtab::SymbolTable;

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect()
}

fn strip_comment(line: &str) -> &str {
    if let Some(pos) = line.find(['*', '#']) {
        &line[..pos]
    } else {
        line
    }
}

fn parse_number(tok: &str, file: &str, line: usize) -> Result<u32, AsmError> {
    let parsed = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        tok.parse::<u32>()
    };
    parsed.map_err(|_| AsmError::new(file, line, AsmErrorKind::LiteralOverflow(tok.to_string())))
}

fn build_reg(tok: &str, file: &str, line: usize) -> Result<RegisterArg, AsmError> {
    let kind = match tok.as_bytes().first() {
        Some(b'R') => OperandKind::Value,
        Some(b'I') => OperandKind::Indirect,
        _ => {
            return Err(AsmError::new(
                file,
                line,
                AsmErrorKind::Parse(format!("expected a register argument, found {tok}")),
            ))
        }
    };
    let regnum: u8 = tok[1..]
        .parse()
        .map_err(|_| AsmError::new(file, line, AsmErrorKind::Parse(format!("bad register {tok}"))))?;
    if regnum > 15 {
        return Err(AsmError::new(
            file,
            line,
            AsmErrorKind::Parse(format!("register out of range: {tok}")),
        ));
    }
    Ok(RegisterArg { kind, reg: regnum })
}

fn unused() -> RegisterArg {
    RegisterArg {
        kind: OperandKind::Unused,
        reg: 0,
    }
}

fn null() -> RegisterArg {
    RegisterArg {
        kind: OperandKind::Null,
        reg: 0,
    }
}

/// Text-encoding flavor for the `.TXTN`/`.TXTM`/`.TXTL` directives.
enum TextMode {
    /// One character per word (N).
    OnePerWord,
    /// Four characters packed per word, first character in the high byte
    /// (M). A trailing group of fewer than four characters is zero-padded
    /// in the unused low-order byte positions.
    PackedMsbFirst,
    /// Four characters packed per word, first character in the low byte
    /// (L). A trailing group of fewer than four characters is zero-padded
    /// in the unused high-order byte positions.
    PackedLsbFirst,
}

struct Assembler {
    segments: Vec<Segment>,
    symbols: SymbolTable,
    cur_seg: usize,
    filename: String,
}

impl Assembler {
    fn cur(&mut self) -> &mut Segment {
        &mut self.segments[self.cur_seg]
    }

    fn cur_offset(&self) -> u32 {
        self.segments[self.cur_seg].len() as u32
    }

    fn emit_text(&mut self, text: &str, mode: TextMode) {
        match mode {
            TextMode::OnePerWord => {
                for ch in text.bytes() {
                    self.cur().add_word(u32::from(ch));
                }
            }
            TextMode::PackedMsbFirst | TextMode::PackedLsbFirst => {
                for chunk in text.as_bytes().chunks(4) {
                    let mut word = 0u32;
                    for (i, &byte) in chunk.iter().enumerate() {
                        let shift = match mode {
                            TextMode::PackedMsbFirst => 24 - i * 8,
                            _ => i * 8,
                        };
                        word |= u32::from(byte) << shift;
                    }
                    self.cur().add_word(word);
                }
            }
        }
    }

    fn start_segment(&mut self, base: u32) {
        self.segments.push(Segment::new(base, &self.filename));
        self.cur_seg = self.segments.len() - 1;
    }

    fn declare_symbol(&mut self, name: &str, line: usize, is_value: bool, value: u32) -> Result<(), AsmError> {
        if is_value {
            self.symbols.add_value(name, value, line, self.cur_seg, &self.filename)
        } else {
            self.symbols
                .add_symbol(name, self.cur_offset(), line, self.cur_seg, &self.filename)
        }
    }

    fn add_ref_here(&mut self, name: &str, line: usize) {
        let offset = self.cur_offset();
        let seg = self.cur_seg;
        self.symbols.add_ref(name, offset, line, seg);
        self.cur().add_word(0);
    }

    /// Extract a leading `$` symbol from a raw (not-yet-comment-stripped)
    /// line. Mirrors the original's `InLine.find('$')`: a `$` at column 0
    /// is a declaration, anywhere else it's a reference.
    fn split_leading_symbol(line: &str) -> (Option<&str>, &str) {
        let Some(pos) = line.find('$') else {
            return (None, line);
        };
        let rest = &line[pos + 1..];
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..end];
        if pos == 0 {
            (Some(name), &rest[end..])
        } else {
            (None, line)
        }
    }

    /// Directives tokenize like anything else (tokenizing drops the leading
    /// `.`), so `keyword` here is the bare word: `ADDR`, `TXTN`, and so on.
    fn handle_directive(&mut self, keyword: &str, rest: &[&str], line: usize) -> Result<bool, AsmError> {
        match keyword {
            "ADDR" => {
                let base = rest.first().ok_or_else(|| {
                    AsmError::new(&self.filename, line, AsmErrorKind::Parse(".ADDR needs an address".into()))
                })?;
                let base = parse_number(base, &self.filename, line)?;
                if self.cur().is_empty() {
                    self.cur().base = base;
                } else {
                    self.start_segment(base);
                }
                Ok(true)
            }
            "VALUE" => {
                let name = rest.first().ok_or_else(|| {
                    AsmError::new(&self.filename, line, AsmErrorKind::Parse(".VALUE needs a name".into()))
                })?;
                let value = rest.get(1).ok_or_else(|| {
                    AsmError::new(&self.filename, line, AsmErrorKind::Parse(".VALUE needs a literal".into()))
                })?;
                let value = parse_number(value, &self.filename, line)?;
                self.declare_symbol(name, line, true, value)?;
                Ok(true)
            }
            "TXTN" | "TXTM" | "TXTL" => {
                let mode = match keyword {
                    "TXTN" => TextMode::OnePerWord,
                    "TXTM" => TextMode::PackedMsbFirst,
                    _ => TextMode::PackedLsbFirst,
                };
                let text = rest.join(" ");
                self.emit_text(&text, mode);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn assemble_line(&mut self, raw_line: &str, line_no: usize) -> Result<(), AsmError> {
        let (decl, after_decl) = Self::split_leading_symbol(raw_line);
        let stripped = strip_comment(after_decl);

        if let Some(name) = decl {
            let peek = tokenize(stripped);
            if peek.first().map(|t| t.eq_ignore_ascii_case("VALUE")).unwrap_or(false) {
                let value = peek.get(1).ok_or_else(|| {
                    AsmError::new(&self.filename, line_no, AsmErrorKind::Parse(".VALUE needs a literal".into()))
                })?;
                let value = parse_number(value, &self.filename, line_no)?;
                self.declare_symbol(name, line_no, true, value)?;
            } else {
                self.declare_symbol(name, line_no, false, 0)?;
                if !peek.is_empty() {
                    self.assemble_tokens(stripped, line_no)?;
                }
            }
            return Ok(());
        }

        let peek = tokenize(stripped);
        if peek.is_empty() {
            return Ok(());
        }

        let upper_keyword = peek[0].to_ascii_uppercase();
        if matches!(upper_keyword.as_str(), "ADDR" | "VALUE" | "TXTN" | "TXTM" | "TXTL")
            && self.handle_directive(&upper_keyword, &peek[1..], line_no)?
        {
            return Ok(());
        }

        // A bare numeric literal is raw data, same as the original tool.
        if peek.len() == 1 && peek[0].chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let word = parse_number(peek[0], &self.filename, line_no)?;
            self.cur().add_word(word);
            return Ok(());
        }

        self.assemble_tokens(stripped, line_no)
    }

    /// If `stripped` carries a `$symbol` reference, splice a placeholder
    /// `0` in its place before tokenizing, same idea as the original tool's
    /// line fix-up (it only ever spliced at the end of the line, since it
    /// only allowed symbol references on control-flow instructions; MOVE's
    /// literal-source escape needs the substitution to work mid-line too).
    fn assemble_tokens(&mut self, stripped: &str, line_no: usize) -> Result<(), AsmError> {
        let Some(sym_pos) = stripped.find('$') else {
            let tokens = tokenize(stripped);
            return self.assemble_instruction(&tokens, None, line_no);
        };
        let rest = &stripped[sym_pos + 1..];
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = rest[..end].to_string();
        let fixed = format!("{}0{}", &stripped[..sym_pos], &rest[end..]);
        let tokens = tokenize(&fixed);
        self.assemble_instruction(&tokens, Some(&name), line_no)
    }

    fn assemble_instruction(
        &mut self,
        tokens: &[&str],
        symbol_ref: Option<&str>,
        line_no: usize,
    ) -> Result<(), AsmError> {
        let mnemonic = tokens[0];
        let (opcode, class) = w56_core::opcode_for_mnemonic(mnemonic).ok_or_else(|| {
            AsmError::new(&self.filename, line_no, AsmErrorKind::Parse(format!("unknown mnemonic {mnemonic}")))
        })?;

        let need = |n: usize| -> Result<(), AsmError> {
            if tokens.len() < n {
                Err(AsmError::new(
                    &self.filename,
                    line_no,
                    AsmErrorKind::Parse("not enough operands".into()),
                ))
            } else {
                Ok(())
            }
        };

        let (src1, src2, dest, raw_literal) = match class {
            ArityClass::NoArgs => (unused(), unused(), unused(), None),
            ArityClass::SrcOnly => {
                need(2)?;
                (build_reg(tokens[1], &self.filename, line_no)?, unused(), unused(), None)
            }
            ArityClass::DestOnly => {
                need(2)?;
                (unused(), unused(), build_reg(tokens[1], &self.filename, line_no)?, None)
            }
            ArityClass::SrcDest => {
                need(3)?;
                if symbol_ref.is_some() || tokens[1].chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    let lit = if symbol_ref.is_some() {
                        0
                    } else {
                        parse_number(tokens[1], &self.filename, line_no)?
                    };
                    (null(), null(), build_reg(tokens[2], &self.filename, line_no)?, Some(lit))
                } else {
                    (
                        build_reg(tokens[1], &self.filename, line_no)?,
                        unused(),
                        build_reg(tokens[2], &self.filename, line_no)?,
                        None,
                    )
                }
            }
            ArityClass::TwoSrcDest => {
                need(4)?;
                (
                    build_reg(tokens[1], &self.filename, line_no)?,
                    build_reg(tokens[2], &self.filename, line_no)?,
                    build_reg(tokens[3], &self.filename, line_no)?,
                    None,
                )
            }
            ArityClass::ControlFlow => {
                need(2)?;
                if symbol_ref.is_some() || tokens[1].chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    let lit = if symbol_ref.is_some() {
                        0
                    } else {
                        parse_number(tokens[1], &self.filename, line_no)?
                    };
                    (unused(), unused(), null(), Some(lit))
                } else {
                    (unused(), unused(), build_reg(tokens[1], &self.filename, line_no)?, None)
                }
            }
        };

        let word = Instruction::encode(opcode, src1, src2, dest);
        self.cur().add_word(word);

        if let Some(lit) = raw_literal {
            if let Some(name) = symbol_ref {
                self.add_ref_here(name, line_no);
            } else {
                self.cur().add_word(lit);
            }
        }
        Ok(())
    }
}

/// Reject the job if any two non-empty segments occupy overlapping address
/// ranges. Must run after patching, since patching is what makes every
/// segment's base address final.
fn check_no_overlapping_segments(segments: &[Segment]) -> Result<(), AsmError> {
    let mut ranges: Vec<(u32, u32, &Segment)> = segments
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| (s.base, s.base + s.len() as u32, s))
        .collect();
    ranges.sort_by_key(|(base, _, _)| *base);
    for pair in ranges.windows(2) {
        let (_, end_a, seg_a) = pair[0];
        let (start_b, _, seg_b) = pair[1];
        if start_b < end_a {
            return Err(AsmError::new(
                seg_b.filename.clone(),
                1,
                AsmErrorKind::OverlappingSegments(format!(
                    "segment at 0x{:08X} (from {}) overlaps segment at 0x{:08X} (from {})",
                    seg_b.base, seg_b.filename, seg_a.base, seg_a.filename
                )),
            ));
        }
    }
    Ok(())
}

/// Assemble one or more source files into their segments and a patched
/// symbol table. Each input is `(filename, contents)`. Every file starts a
/// fresh segment at `origin`; a `.ADDR` directive inside a file starts
/// another.
pub fn assemble(inputs: &[(String, String)], origin: u32) -> Result<Vec<Segment>, AsmError> {
    let mut asm = Assembler {
        segments: Vec::new(),
        symbols: SymbolTable::new(),
        cur_seg: 0,
        filename: String::new(),
    };

    for (filename, contents) in inputs {
        asm.filename = filename.clone();
        asm.segments.push(Segment::new(origin, filename.clone()));
        asm.cur_seg = asm.segments.len() - 1;

        for (idx, raw_line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw_line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('*') || trimmed.starts_with('#') {
                continue;
            }
            asm.assemble_line(raw_line, line_no)?;
        }
    }

    asm.symbols.patch_all(&mut asm.segments)?;
    check_no_overlapping_segments(&asm.segments)?;
    Ok(asm.segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm_one(src: &str) -> Vec<Segment> {
        assemble(&[("t.asm".to_string(), src.to_string())], 0).unwrap()
    }

    #[test]
    fn assembles_a_loop_with_a_backward_jump() {
        let segs = asm_one(
            "\tMOVE 10, R0\n\tMOVE 0, R2\n$LOOP\n\tADD R0, R2, R2\n\tDECR R0\n\tJNZERO $LOOP\n\tHALT\n",
        );
        assert_eq!(segs.len(), 1);
        // two MOVE-literal lines (2 words each) put $LOOP at offset 4;
        // ADD and DECR are single-word, so JNZERO lands at offset 6.
        let jnzero_word = segs[0].read_word(6);
        let ins = Instruction::decode(jnzero_word);
        assert!(ins.literal_in_use);
        assert_eq!(segs[0].read_word(7), 4);
    }

    #[test]
    fn punctuation_is_just_a_separator() {
        let a = asm_one("\tADD R0, R2, R2\n");
        let b = asm_one("\tADD R0 + R2 = R2\n");
        assert_eq!(a[0].read_word(0), b[0].read_word(0));
    }

    #[test]
    fn value_directive_resolves_without_a_base_offset() {
        let segs = asm_one("$LIMIT .VALUE 42\n\tMOVE $LIMIT, R0\n");
        assert_eq!(segs[0].read_word(1), 42);
    }

    #[test]
    fn addr_directive_starts_a_new_segment() {
        let segs = asm_one("\tNOP\n.ADDR 0x200\n\tHALT\n");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1].base, 0x200);
    }

    #[test]
    fn txtn_emits_one_character_per_word() {
        let segs = asm_one(".TXTN hi\n");
        assert_eq!(segs[0].len(), 2);
        assert_eq!(segs[0].read_word(0), u32::from(b'h'));
        assert_eq!(segs[0].read_word(1), u32::from(b'i'));
    }

    #[test]
    fn txtm_packs_four_characters_msb_first() {
        let segs = asm_one(".TXTM abcde\n");
        assert_eq!(segs[0].len(), 2);
        assert_eq!(
            segs[0].read_word(0),
            (u32::from(b'a') << 24) | (u32::from(b'b') << 16) | (u32::from(b'c') << 8) | u32::from(b'd')
        );
        assert_eq!(segs[0].read_word(1), u32::from(b'e') << 24);
    }

    #[test]
    fn txtl_packs_four_characters_lsb_first() {
        let segs = asm_one(".TXTL abcd\n");
        assert_eq!(segs[0].len(), 1);
        assert_eq!(
            segs[0].read_word(0),
            u32::from(b'a') | (u32::from(b'b') << 8) | (u32::from(b'c') << 16) | (u32::from(b'd') << 24)
        );
    }

    #[test]
    fn addr_sets_base_in_place_when_segment_still_empty() {
        let segs = asm_one(".ADDR 0x300\n\tHALT\n");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].base, 0x300);
    }

    #[test]
    fn undefined_symbol_is_a_fatal_error() {
        let err = assemble(&[("t.asm".to_string(), "\tJMP $NOWHERE\n".to_string())], 0).unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::UndefinedSymbol(_)));
    }

    #[test]
    fn comment_only_lines_are_skipped() {
        let segs = asm_one("* a comment\n\tNOP\t* trailing note\n");
        assert_eq!(segs[0].len(), 1);
    }

    #[test]
    fn hash_also_marks_a_comment() {
        let segs = asm_one("# a comment\n\tNOP\t# trailing note\n");
        assert_eq!(segs[0].len(), 1);
    }

    #[test]
    fn standalone_value_directive_declares_a_symbol() {
        let segs = asm_one(".VALUE LIMIT 42\n\tMOVE $LIMIT, R0\n");
        assert_eq!(segs[0].read_word(1), 42);
    }

    #[test]
    fn overlapping_segments_are_rejected() {
        let err = assemble(
            &[(
                "t.asm".to_string(),
                ".ADDR 0x100\n\tNOP\n\tNOP\n.ADDR 0x101\n\tHALT\n".to_string(),
            )],
            0,
        )
        .unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::OverlappingSegments(_)));
    }

    #[test]
    fn adjacent_segments_do_not_overlap() {
        let segs = asm_one(".ADDR 0x100\n\tNOP\n\tNOP\n.ADDR 0x102\n\tHALT\n");
        assert_eq!(segs.len(), 2);
    }
}
