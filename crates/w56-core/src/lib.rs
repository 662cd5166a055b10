//! Core data types shared by every crate in the word56 emulator: the word
//! memory, the instruction decoder, the peripheral bus contract, and the
//! CPU state snapshot.
//!
//! Nothing here drives the fetch/decode/execute loop itself — that lives in
//! `w56-cpu`, which depends on this crate for its vocabulary.

mod fault;
mod flags;
mod instruction;
mod memory;
mod peripheral;
mod regs;
mod state;

pub use fault::Fault;
pub use flags::*;
pub use instruction::{
    ArityClass, Instruction, OperandKind, RegisterArg, arity_class_for_opcode, mnemonic_for_opcode,
    opcode_for_mnemonic, opcode_table,
};
pub use memory::{BASE_IO_MEM, MEM_READ_INVALID, Memory};
pub use peripheral::{
    DEVICE_WINDOW_LEN, DeviceClass, MAX_DEVICES, Peripheral, PeripheralSlot, PeripheralTable,
    PeripheralTableError,
};
pub use regs::{NUM_REGS, REG_FLG, REG_IP, REG_SP};
pub use state::CpuState;
