//! Instruction word decode, disassembly, and the opcode table shared with
//! the assembler.
//!
//! A 32-bit instruction word is `[opcode:8][src1:8][src2:8][dest:8]`. Each
//! operand byte's low nibble is a register index; the high nibble is a kind
//! tag. Two escapes let an operand byte pair request a trailing literal word
//! instead of a register: `SRC1 == SRC2 == NULL` on a src+dest opcode, or
//! `DEST == NULL` on a control-flow opcode.

/// Register-index mask within an operand byte.
pub const REG_NUM_MASK: u8 = 0x0F;
/// Set: the operand byte failed validation and should fault the CPU.
pub const REG_ERR: u8 = 0x10;
/// Set: operand intentionally unused by this opcode.
pub const REG_UNUSED: u8 = 0x20;
/// Set: operand is an address held in the named register.
pub const REG_IND: u8 = 0x40;
/// Set: operand is the named register's value itself.
pub const REG_VAL: u8 = 0x80;
/// Reserved sentinel meaning "no register, possibly a literal follows".
pub const REG_NULL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Unused,
    Indirect,
    Value,
    Null,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterArg {
    pub kind: OperandKind,
    pub reg: u8,
}

impl RegisterArg {
    #[must_use]
    pub fn decode(byte: u8) -> Self {
        if byte == REG_NULL {
            return Self {
                kind: OperandKind::Null,
                reg: 0,
            };
        }
        let reg = byte & REG_NUM_MASK;
        if byte & REG_ERR != 0 {
            Self {
                kind: OperandKind::Invalid,
                reg,
            }
        } else if byte & REG_VAL != 0 {
            Self {
                kind: OperandKind::Value,
                reg,
            }
        } else if byte & REG_IND != 0 {
            Self {
                kind: OperandKind::Indirect,
                reg,
            }
        } else if byte & REG_UNUSED != 0 {
            Self {
                kind: OperandKind::Unused,
                reg,
            }
        } else {
            Self {
                kind: OperandKind::Invalid,
                reg,
            }
        }
    }

    #[must_use]
    pub fn encode(self) -> u8 {
        match self.kind {
            OperandKind::Null => REG_NULL,
            OperandKind::Unused => REG_UNUSED | (self.reg & REG_NUM_MASK),
            OperandKind::Indirect => REG_IND | (self.reg & REG_NUM_MASK),
            OperandKind::Value => REG_VAL | (self.reg & REG_NUM_MASK),
            OperandKind::Invalid => REG_ERR,
        }
    }

    /// True for any of the three structurally well-formed kinds
    /// (unused/indirect/value) as opposed to invalid or reserved-null.
    #[must_use]
    pub fn is_valid_kind(&self) -> bool {
        matches!(
            self.kind,
            OperandKind::Unused | OperandKind::Indirect | OperandKind::Value
        )
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind == OperandKind::Null
    }

    fn print(self, out: &mut String) {
        match self.kind {
            OperandKind::Value => out.push_str(&format!("R{}", self.reg)),
            OperandKind::Indirect => out.push_str(&format!("I{}", self.reg)),
            _ => out.push_str("?"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityClass {
    NoArgs,
    SrcOnly,
    DestOnly,
    SrcDest,
    TwoSrcDest,
    ControlFlow,
}

macro_rules! opcode_table {
    ($($mnemonic:literal, $op:literal, $class:ident;)*) => {
        /// `(mnemonic, opcode, arity class)` for every defined instruction,
        /// in catalogue order. Shared by the decoder and the assembler.
        #[must_use]
        pub fn opcode_table() -> &'static [(&'static str, u8, ArityClass)] {
            &[$(($mnemonic, $op, ArityClass::$class)),*]
        }
    };
}

opcode_table! {
    "MOVE", 0x01, SrcDest;
    "CMP", 0x08, SrcDest;
    "ADD", 0x11, TwoSrcDest;
    "SUB", 0x12, TwoSrcDest;
    "AND", 0x13, TwoSrcDest;
    "OR", 0x14, TwoSrcDest;
    "XOR", 0x15, TwoSrcDest;
    "SHIFTR", 0x16, TwoSrcDest;
    "SHIFTL", 0x17, TwoSrcDest;
    "NOT", 0x20, DestOnly;
    "INCR", 0x21, DestOnly;
    "DECR", 0x22, DestOnly;
    "PUSH", 0x30, SrcOnly;
    "POP", 0x31, DestOnly;
    "JZERO", 0x32, ControlFlow;
    "JNZERO", 0x33, ControlFlow;
    "JOVER", 0x34, ControlFlow;
    "JNOVER", 0x35, ControlFlow;
    "JUNDER", 0x36, ControlFlow;
    "JNUNDER", 0x37, ControlFlow;
    "JMP", 0x38, ControlFlow;
    "CALL", 0x39, ControlFlow;
    "SETFHAP", 0x3A, SrcOnly;
    "SETIHAP", 0x3B, SrcOnly;
    "SSTATE", 0x50, NoArgs;
    "LSTATE", 0x51, NoArgs;
    "RETURN", 0x52, NoArgs;
    "IRET", 0x53, NoArgs;
    "SIGNED", 0x54, NoArgs;
    "UNSIGNED", 0x55, NoArgs;
    "INTENA", 0x56, NoArgs;
    "INTDIS", 0x57, NoArgs;
    "NOP", 0xF0, NoArgs;
    "HALT", 0xFF, NoArgs;
}

#[must_use]
pub fn arity_class_for_opcode(opcode: u8) -> Option<ArityClass> {
    opcode_table()
        .iter()
        .find(|(_, op, _)| *op == opcode)
        .map(|(_, _, class)| *class)
}

#[must_use]
pub fn mnemonic_for_opcode(opcode: u8) -> Option<&'static str> {
    opcode_table()
        .iter()
        .find(|(_, op, _)| *op == opcode)
        .map(|(mnemonic, _, _)| *mnemonic)
}

#[must_use]
pub fn opcode_for_mnemonic(mnemonic: &str) -> Option<(u8, ArityClass)> {
    let upper = mnemonic.to_ascii_uppercase();
    opcode_table()
        .iter()
        .find(|(name, _, _)| *name == upper)
        .map(|(_, op, class)| (*op, *class))
}

/// A decoded instruction word, plus whatever literal-escape state the
/// decoder derived from the opcode's arity class.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub raw: u32,
    pub opcode: u8,
    pub src1: RegisterArg,
    pub src2: RegisterArg,
    pub dest: RegisterArg,
    pub class: Option<ArityClass>,
    pub literal_in_use: bool,
}

impl Instruction {
    #[must_use]
    pub fn decode(word: u32) -> Self {
        let opcode = ((word >> 24) & 0xFF) as u8;
        let src1 = RegisterArg::decode(((word >> 16) & 0xFF) as u8);
        let src2 = RegisterArg::decode(((word >> 8) & 0xFF) as u8);
        let dest = RegisterArg::decode((word & 0xFF) as u8);
        let class = arity_class_for_opcode(opcode);
        let literal_in_use = match class {
            Some(ArityClass::SrcDest) => src1.is_null() && src2.is_null(),
            Some(ArityClass::ControlFlow) => dest.is_null(),
            _ => false,
        };
        Self {
            raw: word,
            opcode,
            src1,
            src2,
            dest,
            class,
            literal_in_use,
        }
    }

    /// Encode a fully-formed instruction word from its parts. Used by the
    /// assembler; the CPU only ever calls `decode`.
    #[must_use]
    pub fn encode(opcode: u8, src1: RegisterArg, src2: RegisterArg, dest: RegisterArg) -> u32 {
        (u32::from(opcode) << 24)
            | (u32::from(src1.encode()) << 16)
            | (u32::from(src2.encode()) << 8)
            | u32::from(dest.encode())
    }

    /// 1 or 2 — whether a literal word follows this instruction in memory.
    #[must_use]
    pub fn size_in_memory(&self) -> u32 {
        if self.literal_in_use { 2 } else { 1 }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(class) = self.class else {
            return false;
        };
        match class {
            ArityClass::NoArgs => true,
            ArityClass::SrcOnly => self.src1.is_valid_kind(),
            ArityClass::DestOnly => self.dest.is_valid_kind(),
            ArityClass::SrcDest => {
                self.dest.is_valid_kind()
                    && (self.src1.is_valid_kind() || (self.src1.is_null() && self.src2.is_null()))
            }
            ArityClass::ControlFlow => self.dest.is_valid_kind() || self.literal_in_use,
            ArityClass::TwoSrcDest => {
                self.src1.is_valid_kind() && self.src2.is_valid_kind() && self.dest.is_valid_kind()
            }
        }
    }

    /// Canonical disassembly. `literal` is the trailing word already fetched
    /// by the caller, required exactly when `literal_in_use` is true.
    #[must_use]
    pub fn disassemble(&self, literal: Option<u32>) -> String {
        if !self.is_valid() {
            return format!("0x{:08X}", self.raw);
        }
        let Some(mnemonic) = mnemonic_for_opcode(self.opcode) else {
            return format!("0x{:08X}", self.raw);
        };
        let Some(class) = self.class else {
            return format!("0x{:08X}", self.raw);
        };
        let mut out = String::from(mnemonic);
        let mut args: Vec<String> = Vec::new();
        match class {
            ArityClass::NoArgs => {}
            ArityClass::SrcOnly => {
                let mut s = String::new();
                self.src1.print(&mut s);
                args.push(s);
            }
            ArityClass::DestOnly => {
                let mut s = String::new();
                self.dest.print(&mut s);
                args.push(s);
            }
            ArityClass::SrcDest => {
                if self.literal_in_use {
                    args.push(format!("0x{:08X}", literal.unwrap_or(0)));
                } else {
                    let mut s = String::new();
                    self.src1.print(&mut s);
                    args.push(s);
                }
                let mut d = String::new();
                self.dest.print(&mut d);
                args.push(d);
            }
            ArityClass::TwoSrcDest => {
                let mut s1 = String::new();
                self.src1.print(&mut s1);
                let mut s2 = String::new();
                self.src2.print(&mut s2);
                let mut d = String::new();
                self.dest.print(&mut d);
                args.push(s1);
                args.push(s2);
                args.push(d);
            }
            ArityClass::ControlFlow => {
                if self.literal_in_use {
                    args.push(format!("0x{:08X}", literal.unwrap_or(0)));
                } else {
                    let mut d = String::new();
                    self.dest.print(&mut d);
                    args.push(d);
                }
            }
        }
        if !args.is_empty() {
            out.push(' ');
            out.push_str(&args.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(kind: OperandKind, reg: u8) -> RegisterArg {
        RegisterArg { kind, reg }
    }

    #[test]
    fn decodes_move_with_two_registers() {
        let word = Instruction::encode(
            0x01,
            arg(OperandKind::Value, 1),
            arg(OperandKind::Unused, 0),
            arg(OperandKind::Value, 0),
        );
        let ins = Instruction::decode(word);
        assert_eq!(ins.opcode, 0x01);
        assert!(!ins.literal_in_use);
        assert!(ins.is_valid());
        assert_eq!(ins.disassemble(None), "MOVE R1, R0");
    }

    #[test]
    fn move_literal_escape_needs_two_words() {
        let word = Instruction::encode(
            0x01,
            arg(OperandKind::Null, 0),
            arg(OperandKind::Null, 0),
            arg(OperandKind::Value, 0),
        );
        let ins = Instruction::decode(word);
        assert!(ins.literal_in_use);
        assert_eq!(ins.size_in_memory(), 2);
        assert_eq!(ins.disassemble(Some(5)), "MOVE 0x00000005, R0");
    }

    #[test]
    fn control_flow_literal_escape_is_dest_null() {
        let word = Instruction::encode(
            0x38,
            arg(OperandKind::Unused, 0),
            arg(OperandKind::Unused, 0),
            arg(OperandKind::Null, 0),
        );
        let ins = Instruction::decode(word);
        assert!(ins.literal_in_use);
        assert_eq!(ins.disassemble(Some(0x100)), "JMP 0x00000100");
    }

    #[test]
    fn opcode_zero_is_invalid_and_prints_raw() {
        let ins = Instruction::decode(0);
        assert!(!ins.is_valid());
        assert_eq!(ins.disassemble(None), "0x00000000");
    }

    #[test]
    fn two_src_dest_requires_all_three_operands_valid() {
        let word = Instruction::encode(
            0x11,
            arg(OperandKind::Value, 0),
            arg(OperandKind::Invalid, 0),
            arg(OperandKind::Value, 2),
        );
        assert!(!Instruction::decode(word).is_valid());
    }

    #[test]
    fn no_args_opcode_is_always_valid() {
        let word = Instruction::encode(
            0xFF,
            arg(OperandKind::Unused, 0),
            arg(OperandKind::Unused, 0),
            arg(OperandKind::Unused, 0),
        );
        assert!(Instruction::decode(word).is_valid());
    }

    #[test]
    fn round_trips_through_opcode_table() {
        for (mnemonic, op, class) in opcode_table() {
            assert_eq!(arity_class_for_opcode(*op), Some(*class));
            assert_eq!(opcode_for_mnemonic(mnemonic), Some((*op, *class)));
            assert_eq!(mnemonic_for_opcode(*op), Some(*mnemonic));
        }
    }
}
