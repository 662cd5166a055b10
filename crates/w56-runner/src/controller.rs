//! Drives the CPU from a background thread at a selectable rate, reporting
//! snapshots and printer lines back to the foreground thread. Grounded on
//! the reference workspace's CPU-spinner thread: a mutex-guarded run state,
//! a condition variable to park/wake the driver, and a channel fanning
//! state updates out to observers.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use w56_core::CpuState;
use w56_cpu::Cpu;

use crate::shared_printer::SharedPrinter;

/// Mirrors the original `CPURunState` enum, minus the Qt-specific names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Step,
    Slow,
    Medium,
    Fast,
    FreeRun,
    Halted,
    Exiting,
}

const MSEC_SLOW: u64 = 1000;
const MSEC_MEDIUM: u64 = 100;
const MSEC_FAST: u64 = 17;
/// Instructions executed per check-in while free-running.
const FREERUN_BATCH: u32 = 10_001;

/// Events the driver thread publishes to observers.
pub enum RunEvent {
    StateUpdate(CpuState),
    PrinterLine(String),
}

struct Shared {
    state: Mutex<RunState>,
    condvar: Condvar,
}

/// Owns the CPU and a background driver thread. Direct access to CPU state
/// (registers, memory) is only safe while `quiesce`d.
pub struct RunController {
    shared: Arc<Shared>,
    cpu: Arc<Mutex<Cpu>>,
    printer: Arc<Mutex<w56_printotron::PrintOTron>>,
    events: Receiver<RunEvent>,
    handle: Option<JoinHandle<()>>,
}

impl RunController {
    /// Builds the machine and brings it up: resets, then writes `rom_image`
    /// starting at address 0. This is the same mechanism that backs the
    /// `emu` CLI's `[binfile]` argument (pre-loaded at address 0 per its
    /// external contract) and the ROM loader's "fixed image before reset":
    /// both describe one atomic bring-up step performed once, here, at
    /// construction, rather than something a caller does to an
    /// already-running machine — a later `reset()` would otherwise erase
    /// the image.
    #[must_use]
    pub fn new(mut cpu: Cpu, printer: SharedPrinter, rom_image: &[u32]) -> Self {
        cpu.reset();
        cpu.add_device(Box::new(printer.clone()))
            .expect("printer is the first device registered on a freshly reset peripheral table");
        for (i, word) in rom_image.iter().enumerate() {
            cpu.write_mem(i as u32, *word);
        }
        cpu.peripherals_mut().power_on_reset();

        let cpu = Arc::new(Mutex::new(cpu));
        let shared = Arc::new(Shared {
            state: Mutex::new(RunState::Stopped),
            condvar: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel();

        let driver_cpu = Arc::clone(&cpu);
        let driver_shared = Arc::clone(&shared);
        let driver_printer = printer.handle();
        let handle = thread::spawn(move || drive(driver_cpu, driver_shared, driver_printer, tx));

        Self {
            shared,
            cpu,
            printer: printer.handle(),
            events: rx,
            handle: Some(handle),
        }
    }

    /// Request a new run state. Ignored once the driver has halted or is
    /// exiting, same as the original's guard.
    pub fn change_state(&self, new_state: RunState) {
        let mut state = self.shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(*state, RunState::Halted | RunState::Exiting) {
            return;
        }
        let was_parked = matches!(*state, RunState::Stopped);
        *state = new_state;
        if was_parked {
            self.shared.condvar.notify_one();
        }
    }

    /// Stop the driver and block until it is parked, so direct CPU access
    /// below is race-free.
    pub fn quiesce(&self) {
        self.change_state(RunState::Stopped);
        // The driver releases the cpu lock as soon as it parks; taking and
        // immediately dropping the lock here is enough to know it is idle.
        drop(self.cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner));
    }

    /// Resume running at `state` after a `quiesce`.
    pub fn go(&self, state: RunState) {
        self.change_state(state);
    }

    /// Next available observer event, if any, without blocking.
    pub fn try_recv_event(&self) -> Option<RunEvent> {
        self.events.try_recv().ok()
    }

    /// Direct register read. Caller must have called `quiesce` first.
    #[must_use]
    pub fn read_reg(&self, idx: usize) -> u32 {
        self.cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).read_reg(idx)
    }

    pub fn write_reg(&self, idx: usize, value: u32) {
        self.cpu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write_reg(idx, value);
    }

    #[must_use]
    pub fn read_mem(&self, addr: u32) -> u32 {
        self.cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).read_mem(addr)
    }

    pub fn write_mem(&self, addr: u32, value: u32) {
        self.cpu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write_mem(addr, value);
    }

    #[must_use]
    pub fn dump_state(&self) -> CpuState {
        self.cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).dump_state()
    }

    /// Reset then reload a program at address 0, per the spec's
    /// program-loading contract. Caller must `quiesce` first.
    pub fn load_program(&self, words: &[u32]) {
        let mut cpu = self.cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cpu.reset();
        for (i, word) in words.iter().enumerate() {
            cpu.write_mem(i as u32, *word);
        }
    }

    #[must_use]
    pub fn printer_handle(&self) -> Arc<Mutex<w56_printotron::PrintOTron>> {
        Arc::clone(&self.printer)
    }

    #[must_use]
    pub fn cpu_handle(&self) -> Arc<Mutex<Cpu>> {
        Arc::clone(&self.cpu)
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.change_state(RunState::Exiting);
        {
            let mut state = self.shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *state = RunState::Exiting;
            self.shared.condvar.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn drive(
    cpu: Arc<Mutex<Cpu>>,
    shared: Arc<Shared>,
    printer: Arc<Mutex<w56_printotron::PrintOTron>>,
    events: Sender<RunEvent>,
) {
    loop {
        let local_state = {
            let state = shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *state
        };

        match local_state {
            RunState::Step => {
                cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).step();
            }
            RunState::Slow => run_then_wait(&cpu, MSEC_SLOW),
            RunState::Medium => run_then_wait(&cpu, MSEC_MEDIUM),
            RunState::Fast => run_then_wait(&cpu, MSEC_FAST),
            RunState::FreeRun => {
                let mut guard = cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                for _ in 0..FREERUN_BATCH {
                    if guard.is_halted() {
                        break;
                    }
                    guard.step();
                }
            }
            RunState::Halted | RunState::Stopped | RunState::Exiting => {}
        }

        if !matches!(local_state, RunState::Exiting) {
            let snapshot = cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).dump_state();
            let _ = events.send(RunEvent::StateUpdate(snapshot));
        }

        {
            let mut printer = printer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            while printer.is_output_ready() {
                if let Some(line) = printer.get_output_line() {
                    let _ = events.send(RunEvent::PrinterLine(line));
                } else {
                    break;
                }
            }
        }

        let mut state = shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == RunState::Exiting {
            return;
        }
        if cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner).is_halted() {
            *state = RunState::Halted;
        }
        if *state == RunState::Step {
            *state = RunState::Stopped;
        }
        if matches!(*state, RunState::Stopped | RunState::Halted) {
            state = shared.condvar.wait(state).unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        drop(state);
    }
}

fn run_then_wait(cpu: &Arc<Mutex<Cpu>>, msec: u64) {
    let halted = {
        let mut guard = cpu.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.step();
        guard.is_halted()
    };
    if !halted {
        thread::sleep(Duration::from_millis(msec));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use w56_core::{Instruction, OperandKind, RegisterArg};

    fn halt_word() -> u32 {
        let unused = RegisterArg {
            kind: OperandKind::Unused,
            reg: 0,
        };
        Instruction::encode(0xFF, unused, unused, unused)
    }

    #[test]
    fn step_executes_exactly_one_instruction_then_parks() {
        let cpu = Cpu::new();
        let printer = SharedPrinter::new(1);
        let rom = vec![halt_word()];
        let ctrl = RunController::new(cpu, printer, &rom);
        ctrl.change_state(RunState::Step);
        std::thread::sleep(Duration::from_millis(50));
        assert!(ctrl.dump_state().halted);
    }

    #[test]
    fn quiesce_allows_direct_register_access() {
        let cpu = Cpu::new();
        let printer = SharedPrinter::new(1);
        let rom = vec![0u32; 4];
        let ctrl = RunController::new(cpu, printer, &rom);
        ctrl.quiesce();
        ctrl.write_reg(0, 42);
        assert_eq!(ctrl.read_reg(0), 42);
    }
}
