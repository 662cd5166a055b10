//! Fetch/decode/execute loop for the word56 machine.
//!
//! [`Cpu`] owns the register file, the flat memory, and the peripheral
//! bus, and drives them through a single-threaded `step()` loop. Faults
//! never escape as Rust errors: executors return a plain [`w56_core::Fault`]
//! value and `step()` handles it entirely by redirecting the instruction
//! pointer through the fault handler table.

mod cpu;

pub use cpu::{Cpu, FHAP_TABLE_SIZE, IHAP_TABLE_SIZE, MAX_ADDR, STATE_SIZE};
