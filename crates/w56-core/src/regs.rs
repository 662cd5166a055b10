//! Register file layout.
//!
//! R0..R12 are general purpose. R13/R14/R15 are aliased as FLG/SP/IP by the
//! instruction set, but they are ordinary registers: nothing stops code from
//! addressing R13 directly.

/// Number of registers in the register file.
pub const NUM_REGS: usize = 16;

/// R13 — flags register.
pub const REG_FLG: usize = 13;

/// R14 — stack pointer. The stack grows upward from SP.
pub const REG_SP: usize = 14;

/// R15 — instruction pointer.
pub const REG_IP: usize = 15;
