//! Print-o-Tron XL: a one-character-at-a-time line printer.
//!
//! Offset 0 is STATUS (read-only), offset 1 is OUTPUT (write one character
//! per word), offset 2 is CONTROL (LINE_RELEASE/PAGE_RELEASE). Any other
//! offset reads back [`w56_core::MEM_READ_INVALID`].
//!
//! Unlike the device this is modeled on, PAGE_RELEASE never discards a
//! partially written line: it queues whatever is in the buffer (even if
//! empty) and then queues a separate form-feed line, so a host observer
//! sees both.

use std::collections::VecDeque;

use w56_core::{DeviceClass, Peripheral, MEM_READ_INVALID};

pub const REG_STATUS: u32 = 0;
pub const REG_OUTPUT: u32 = 1;
pub const REG_CONTROL: u32 = 2;
pub const MEM_SIZE: u32 = 3;

pub const STATUS_NO_PAPER: u32 = 0;
pub const STATUS_OK: u32 = 1;
pub const STATUS_BUSY: u32 = 2;

pub const CONTROL_LINE_RELEASE: u32 = 0x1;
pub const CONTROL_PAGE_RELEASE: u32 = 0x2;

const FORM_FEED: &str = "\x0C";

pub struct PrintOTron {
    ddn: u32,
    buffer: String,
    status: u32,
    pending: VecDeque<String>,
}

impl PrintOTron {
    #[must_use]
    pub fn new(ddn: u32) -> Self {
        Self {
            ddn,
            buffer: String::new(),
            status: STATUS_NO_PAPER,
            pending: VecDeque::new(),
        }
    }

    /// Polled by the host each tick. The first poll after construction or
    /// reset transitions NO_PAPER to OK, modeling the UI "loading paper".
    pub fn is_output_ready(&mut self) -> bool {
        if self.status == STATUS_NO_PAPER {
            self.status = STATUS_OK;
        }
        !self.pending.is_empty()
    }

    /// Pop the next queued line, if any. Transitions back to OK once the
    /// queue drains.
    pub fn get_output_line(&mut self) -> Option<String> {
        let line = self.pending.pop_front()?;
        if self.pending.is_empty() {
            self.status = STATUS_OK;
        }
        Some(line)
    }
}

impl Peripheral for PrintOTron {
    fn mem_size(&self) -> u32 {
        MEM_SIZE
    }

    fn ddn(&self) -> u32 {
        self.ddn
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::Printer
    }

    fn read_io(&mut self, offset: u32) -> u32 {
        if offset == REG_STATUS {
            self.status
        } else {
            MEM_READ_INVALID
        }
    }

    fn write_io(&mut self, offset: u32, value: u32) {
        match offset {
            REG_OUTPUT => self.buffer.push((value & 0xFF) as u8 as char),
            REG_CONTROL => {
                if value & CONTROL_LINE_RELEASE != 0 {
                    self.status = STATUS_BUSY;
                    self.pending.push_back(std::mem::take(&mut self.buffer));
                }
                if value & CONTROL_PAGE_RELEASE != 0 {
                    self.status = STATUS_BUSY;
                    self.pending.push_back(std::mem::take(&mut self.buffer));
                    self.pending.push_back(FORM_FEED.to_string());
                }
            }
            _ => {}
        }
    }

    fn power_on_reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.status = STATUS_NO_PAPER;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_clears_no_paper() {
        let mut printer = PrintOTron::new(1);
        assert_eq!(printer.read_io(REG_STATUS), STATUS_NO_PAPER);
        printer.is_output_ready();
        assert_eq!(printer.read_io(REG_STATUS), STATUS_OK);
    }

    #[test]
    fn line_release_queues_the_buffered_text() {
        let mut printer = PrintOTron::new(1);
        for c in "HI".bytes() {
            printer.write_io(REG_OUTPUT, u32::from(c));
        }
        printer.write_io(REG_CONTROL, CONTROL_LINE_RELEASE);
        assert!(printer.is_output_ready());
        assert_eq!(printer.get_output_line().as_deref(), Some("HI"));
        assert!(!printer.is_output_ready());
    }

    #[test]
    fn page_release_queues_buffer_then_a_separate_form_feed_even_when_empty() {
        let mut printer = PrintOTron::new(1);
        printer.write_io(REG_CONTROL, CONTROL_PAGE_RELEASE);
        assert_eq!(printer.get_output_line().as_deref(), Some(""));
        assert_eq!(printer.get_output_line().as_deref(), Some(FORM_FEED));
        assert!(printer.get_output_line().is_none());
    }

    #[test]
    fn invalid_offset_reads_sentinel() {
        let mut printer = PrintOTron::new(1);
        assert_eq!(printer.read_io(9), MEM_READ_INVALID);
    }

    #[test]
    fn reset_drops_pending_output() {
        let mut printer = PrintOTron::new(1);
        printer.write_io(REG_OUTPUT, u32::from(b'X'));
        printer.write_io(REG_CONTROL, CONTROL_LINE_RELEASE);
        printer.power_on_reset();
        assert!(!printer.is_output_ready());
        assert_eq!(printer.read_io(REG_STATUS), STATUS_NO_PAPER);
    }
}
