//! The memory-mapped peripheral bus: device contract, table layout, and
//! dispatch.
//!
//! The I/O region starts at [`crate::BASE_IO_MEM`] and spans exactly sixteen
//! 64 K-word windows. Window 0 is the peripheral table itself (read-only,
//! four words per slot); windows 1..15 belong to up to 15 registered
//! devices, one window each.

use crate::memory::BASE_IO_MEM;
use crate::flags::FLG_INTEN_LINES;

/// Words per I/O window (table window and each device window alike).
pub const DEVICE_WINDOW_LEN: u32 = 0x1_0000;
/// Device slots available beyond the table's own window.
pub const MAX_DEVICES: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Printer,
    Tape,
    CardReader,
    CardPunch,
    RandomAccessStorage,
}

/// Capability trait every peripheral implements. Object-safe so the table
/// can hold `Box<dyn Peripheral>` regardless of concrete device type.
/// Requires `Send` so a whole `Cpu` can be handed to the run controller's
/// driver thread.
pub trait Peripheral: Send {
    fn mem_size(&self) -> u32;
    fn ddn(&self) -> u32;
    fn device_class(&self) -> DeviceClass;
    fn read_io(&mut self, offset: u32) -> u32;
    fn write_io(&mut self, offset: u32, value: u32);

    fn interrupt_supported(&self) -> bool {
        false
    }

    fn interrupt_active(&self) -> bool {
        false
    }

    /// Advance any time-dependent internal state (device clocks, timers).
    fn do_background(&mut self) {}

    fn power_on_reset(&mut self);
}

pub struct PeripheralSlot {
    pub ddn: u32,
    pub base_addr: u32,
    pub io_mem_len: u32,
    pub interrupt_line: u32,
    pub device: Box<dyn Peripheral>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralTableError {
    AlreadyPresent,
    WindowTooLarge,
    TableFull,
}

#[derive(Default)]
pub struct PeripheralTable {
    slots: Vec<PeripheralSlot>,
}

impl PeripheralTable {
    #[must_use]
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn add_device(
        &mut self,
        device: Box<dyn Peripheral>,
    ) -> Result<usize, PeripheralTableError> {
        if self.slots.len() >= MAX_DEVICES {
            return Err(PeripheralTableError::TableFull);
        }
        if device.mem_size() > 0xFFFF {
            return Err(PeripheralTableError::WindowTooLarge);
        }
        let ddn = device.ddn();
        if self.slots.iter().any(|s| s.ddn == ddn) {
            return Err(PeripheralTableError::AlreadyPresent);
        }
        let index = self.slots.len();
        let base_addr = BASE_IO_MEM + (index as u32 + 1) * DEVICE_WINDOW_LEN;
        self.slots.push(PeripheralSlot {
            ddn,
            base_addr,
            io_mem_len: device.mem_size(),
            interrupt_line: index as u32,
            device,
        });
        Ok(index)
    }

    /// Idempotent: removing an unregistered DDN is a no-op.
    pub fn remove_device(&mut self, ddn: u32) {
        self.slots.retain(|s| s.ddn != ddn);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.interrupt_line = i as u32;
            slot.base_addr = BASE_IO_MEM + (i as u32 + 1) * DEVICE_WINDOW_LEN;
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[PeripheralSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [PeripheralSlot] {
        &mut self.slots
    }

    fn table_read(&self, offset: u32) -> u32 {
        let entry = (offset / 4) as usize;
        let field = offset % 4;
        let Some(slot) = self.slots.get(entry) else {
            return 0;
        };
        match field {
            0 => slot.ddn,
            1 => slot.base_addr,
            2 => slot.io_mem_len,
            _ => slot.interrupt_line,
        }
    }

    /// Dispatch a read to `addr`, which must be `>= BASE_IO_MEM`.
    #[must_use]
    pub fn read(&mut self, addr: u32) -> u32 {
        let rel = addr - BASE_IO_MEM;
        let window = rel / DEVICE_WINDOW_LEN;
        let off = rel % DEVICE_WINDOW_LEN;
        if window == 0 {
            return if off < 64 { self.table_read(off) } else { 0 };
        }
        let slot_index = (window - 1) as usize;
        match self.slots.get_mut(slot_index) {
            Some(slot) if off < slot.io_mem_len => slot.device.read_io(off),
            _ => 0,
        }
    }

    /// Dispatch a write to `addr`, which must be `>= BASE_IO_MEM`. Writes to
    /// the table window, or past a slot's declared window, are ignored.
    pub fn write(&mut self, addr: u32, value: u32) {
        let rel = addr - BASE_IO_MEM;
        let window = rel / DEVICE_WINDOW_LEN;
        let off = rel % DEVICE_WINDOW_LEN;
        if window == 0 {
            return;
        }
        let slot_index = (window - 1) as usize;
        if let Some(slot) = self.slots.get_mut(slot_index) {
            if off < slot.io_mem_len {
                slot.device.write_io(off, value);
            }
        }
    }

    pub fn do_background(&mut self) {
        for slot in &mut self.slots {
            slot.device.do_background();
        }
    }

    pub fn power_on_reset(&mut self) {
        for slot in &mut self.slots {
            slot.device.power_on_reset();
        }
    }

    /// Lowest-numbered interrupt line currently asserted by a device whose
    /// per-line enable bit is set in `flg` (lines >= 4 have no individual
    /// enable bit and are always eligible).
    #[must_use]
    pub fn poll_interrupt(&self, flg: u32) -> Option<u32> {
        self.slots
            .iter()
            .filter(|s| s.device.interrupt_supported() && s.device.interrupt_active())
            .map(|s| s.interrupt_line)
            .filter(|&line| {
                (line as usize) >= FLG_INTEN_LINES.len() || flg & FLG_INTEN_LINES[line as usize] != 0
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        ddn: u32,
        size: u32,
        active: bool,
    }

    impl Peripheral for Stub {
        fn mem_size(&self) -> u32 {
            self.size
        }
        fn ddn(&self) -> u32 {
            self.ddn
        }
        fn device_class(&self) -> DeviceClass {
            DeviceClass::Printer
        }
        fn read_io(&mut self, offset: u32) -> u32 {
            offset
        }
        fn write_io(&mut self, _offset: u32, _value: u32) {}
        fn interrupt_supported(&self) -> bool {
            true
        }
        fn interrupt_active(&self) -> bool {
            self.active
        }
        fn power_on_reset(&mut self) {}
    }

    #[test]
    fn first_device_gets_window_one() {
        let mut table = PeripheralTable::new();
        let idx = table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 16,
                active: false,
            }))
            .unwrap();
        assert_eq!(idx, 0);
        assert_eq!(table.slots()[0].base_addr, BASE_IO_MEM + DEVICE_WINDOW_LEN);
    }

    #[test]
    fn duplicate_ddn_rejected() {
        let mut table = PeripheralTable::new();
        table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 4,
                active: false,
            }))
            .unwrap();
        let err = table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 4,
                active: false,
            }))
            .unwrap_err();
        assert_eq!(err, PeripheralTableError::AlreadyPresent);
    }

    #[test]
    fn oversized_window_rejected() {
        let mut table = PeripheralTable::new();
        let err = table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 0x1_0000,
                active: false,
            }))
            .unwrap_err();
        assert_eq!(err, PeripheralTableError::WindowTooLarge);
    }

    #[test]
    fn table_full_after_fifteen() {
        let mut table = PeripheralTable::new();
        for i in 0..15 {
            table
                .add_device(Box::new(Stub {
                    ddn: i,
                    size: 4,
                    active: false,
                }))
                .unwrap();
        }
        let err = table
            .add_device(Box::new(Stub {
                ddn: 99,
                size: 4,
                active: false,
            }))
            .unwrap_err();
        assert_eq!(err, PeripheralTableError::TableFull);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = PeripheralTable::new();
        table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 4,
                active: false,
            }))
            .unwrap();
        table.remove_device(1);
        table.remove_device(1);
        assert!(table.slots().is_empty());
    }

    #[test]
    fn unregistered_slot_reads_zero() {
        let mut table = PeripheralTable::new();
        assert_eq!(table.read(BASE_IO_MEM + DEVICE_WINDOW_LEN), 0);
    }

    #[test]
    fn table_window_reports_ddn_in_first_field() {
        let mut table = PeripheralTable::new();
        table
            .add_device(Box::new(Stub {
                ddn: 0x4142_4344,
                size: 4,
                active: false,
            }))
            .unwrap();
        assert_eq!(table.read(BASE_IO_MEM), 0x4142_4344);
    }

    #[test]
    fn poll_interrupt_picks_lowest_line() {
        let mut table = PeripheralTable::new();
        table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 4,
                active: true,
            }))
            .unwrap();
        table
            .add_device(Box::new(Stub {
                ddn: 2,
                size: 4,
                active: true,
            }))
            .unwrap();
        assert_eq!(table.poll_interrupt(FLG_INTEN_LINES[0] | FLG_INTEN_LINES[1]), Some(0));
    }

    #[test]
    fn poll_interrupt_respects_enable_bit() {
        let mut table = PeripheralTable::new();
        table
            .add_device(Box::new(Stub {
                ddn: 1,
                size: 4,
                active: true,
            }))
            .unwrap();
        assert_eq!(table.poll_interrupt(0), None);
        assert_eq!(table.poll_interrupt(FLG_INTEN_LINES[0]), Some(0));
    }
}
