//! Drives a [`w56_cpu::Cpu`] from a background thread at a selectable rate,
//! publishing state snapshots and printer lines to a foreground observer.
//! This is the library half of the `emu` interactive CLI.

mod controller;
mod shared_printer;

pub use controller::{RunController, RunEvent, RunState};
pub use shared_printer::SharedPrinter;
