//! Fault taxonomy. A fault never escapes `Cpu::step` as a Rust error — it is
//! returned by an executor as a plain value and handled entirely by the
//! fault-dispatch step of the fetch/decode/execute loop.

/// High bit of R0 on entry to the fault handler when the CPU could not
/// recover and halted instead.
pub const FAULT_DOUBLE_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    BadInstruction,
    BadAddress,
    Stack,
}

impl Fault {
    /// Ordinal stored in R0 and used to index the fault handler array:
    /// `mem[FHAP + (code - 1)]`.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Fault::BadInstruction => 1,
            Fault::BadAddress => 2,
            Fault::Stack => 3,
        }
    }
}
