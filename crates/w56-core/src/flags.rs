//! Bit layout of the FLG register (R13).
//!
//! FLG stays a plain 32-bit word so it can sit in the register file like
//! anything else, but callers are expected to go through named helpers
//! (`w56_cpu::Cpu::set_flag` and friends) rather than twiddling bits by hand.

pub const FLG_OVER: u32 = 0x0000_0001;
pub const FLG_UNDER: u32 = 0x0000_0002;
pub const FLG_ZERO: u32 = 0x0000_0008;
pub const FLG_IN_INT: u32 = 0x0000_0010;
pub const FLG_INTEN0: u32 = 0x0001_0000;
pub const FLG_INTEN1: u32 = 0x0002_0000;
pub const FLG_INTEN2: u32 = 0x0004_0000;
pub const FLG_INTEN3: u32 = 0x0008_0000;
pub const FLG_SIGNED: u32 = 0x2000_0000;
pub const FLG_INTENA: u32 = 0x4000_0000;
pub const FLG_FAULT: u32 = 0x8000_0000;

/// Per-interrupt-line enable bits, indexed by line number 0..4.
pub const FLG_INTEN_LINES: [u32; 4] = [FLG_INTEN0, FLG_INTEN1, FLG_INTEN2, FLG_INTEN3];

/// Mask of the three flags every arithmetic opcode clears before computing.
pub const FLG_MATH_MASK: u32 = FLG_OVER | FLG_UNDER | FLG_ZERO;
