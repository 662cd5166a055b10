//! Wraps a `PrintOTron` behind an `Arc<Mutex<_>>` so the run controller can
//! drain ready output lines from the foreground thread while the same
//! device instance is wired into the CPU's peripheral bus.

use std::sync::{Arc, Mutex};

use w56_core::{DeviceClass, Peripheral};
use w56_printotron::PrintOTron;

#[derive(Clone)]
pub struct SharedPrinter(pub Arc<Mutex<PrintOTron>>);

impl SharedPrinter {
    #[must_use]
    pub fn new(ddn: u32) -> Self {
        Self(Arc::new(Mutex::new(PrintOTron::new(ddn))))
    }

    #[must_use]
    pub fn handle(&self) -> Arc<Mutex<PrintOTron>> {
        Arc::clone(&self.0)
    }
}

impl Peripheral for SharedPrinter {
    fn mem_size(&self) -> u32 {
        w56_printotron::MEM_SIZE
    }

    fn ddn(&self) -> u32 {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).ddn()
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Printer
    }

    fn read_io(&mut self, offset: u32) -> u32 {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .read_io(offset)
    }

    fn write_io(&mut self, offset: u32, value: u32) {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write_io(offset, value);
    }

    fn power_on_reset(&mut self) {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .power_on_reset();
    }
}
