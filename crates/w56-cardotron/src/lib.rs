//! Card-o-Tron 3CS: a combined card scanner and puncher sharing one I/O
//! window. The scanner half reads [`w56_carddeck`] records out of an
//! in-memory hopper loaded ahead of time; the puncher half accumulates
//! records written by the running program for the host to retrieve.
//!
//! Both halves simulate their mechanical delay the same way: a command
//! starts the action and flips a busy bit, and every subsequent register
//! access checks a wall-clock deadline before answering, so the busy bit
//! (and the data behind it) only clears once real time has passed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use w56_carddeck::{write_record, CardRecord, RecordKind};
use w56_core::{DeviceClass, Peripheral, MEM_READ_INVALID};

pub const MAX_CARD_LEN: usize = 32;
pub const SCAN_MSEC: u64 = 100;
pub const PUNCH_MSEC: u64 = 200;

pub const SCAN_REG_STATUS: u32 = 0x00;
pub const SCAN_REG_CARD_INFO: u32 = 0x01;
pub const SCAN_REG_COMMAND: u32 = 0x02;
pub const SCAN_REG_READ_BUF: u32 = 0x03;

pub const PUNCH_REG_STATUS: u32 = 0x23;
pub const PUNCH_REG_COMMAND: u32 = 0x24;
pub const PUNCH_REG_CARD_INFO: u32 = 0x25;
pub const PUNCH_REG_WRITE_BUF: u32 = 0x26;

pub const MEM_SIZE: u32 = 0x46;

pub const SCAN_STATUS_EMPTY: u32 = 0x0;
pub const SCAN_STATUS_READY: u32 = 0x1;
pub const SCAN_STATUS_READING: u32 = 0x2;
pub const SCAN_STATUS_COMPLETE: u32 = 0x4;

pub const SCAN_CMD_READ: u32 = 0x1;
pub const SCAN_CMD_ABORT: u32 = 0x2;

pub const PUNCH_STATUS_EMPTY: u32 = 0x0;
pub const PUNCH_STATUS_READY: u32 = 0x1;
pub const PUNCH_STATUS_BUSY: u32 = 0x2;

pub const PUNCH_CMD_WRITE: u32 = 0x1;
pub const PUNCH_CMD_FLUSH: u32 = 0x2;

/// Bits 8-10 of the card-info register select the record kind; bits 0-7
/// hold the word count.
const INFO_LEN_MASK: u32 = 0xFF;
const INFO_TYPE_MASK: u32 = 0x700;

fn info_kind(info: u32) -> RecordKind {
    match info & INFO_TYPE_MASK {
        0x100 => RecordKind::Literal,
        0x200 => RecordKind::Modify,
        0x300 => RecordKind::Unresolved,
        0x400 => RecordKind::Binary,
        _ => RecordKind::Code,
    }
}

fn kind_info_bits(kind: RecordKind) -> u32 {
    match kind {
        RecordKind::Code => 0x000,
        RecordKind::Literal => 0x100,
        RecordKind::Modify => 0x200,
        RecordKind::Unresolved => 0x300,
        RecordKind::Binary => 0x400,
    }
}

pub struct CardOTron {
    ddn: u32,

    hopper: VecDeque<CardRecord>,
    scan_status: u32,
    scan_card_info: u32,
    read_buf: [u32; MAX_CARD_LEN],
    reading: bool,
    read_start: Option<Instant>,

    punch_status: u32,
    punch_card_info: u32,
    write_buf: [u32; MAX_CARD_LEN],
    writing: bool,
    write_start: Option<Instant>,
    punched: Vec<CardRecord>,
}

impl CardOTron {
    #[must_use]
    pub fn new(ddn: u32) -> Self {
        Self {
            ddn,
            hopper: VecDeque::new(),
            scan_status: SCAN_STATUS_EMPTY,
            scan_card_info: 0,
            read_buf: [0; MAX_CARD_LEN],
            reading: false,
            read_start: None,
            punch_status: PUNCH_STATUS_EMPTY,
            punch_card_info: 0,
            write_buf: [0; MAX_CARD_LEN],
            writing: false,
            write_start: None,
            punched: Vec::new(),
        }
    }

    /// Load cards into the scan hopper, replacing whatever was there.
    pub fn load_deck(&mut self, records: Vec<CardRecord>) {
        self.hopper = records.into_iter().collect();
        self.scan_status = SCAN_STATUS_READY;
    }

    /// True while a card read is mechanically in progress.
    pub fn is_reading(&mut self) -> bool {
        self.check_read_timer();
        self.reading
    }

    /// True while a card punch is mechanically in progress.
    pub fn is_punching(&mut self) -> bool {
        self.check_write_timer();
        self.writing
    }

    /// Drain and format every card punched so far, for the host to persist.
    pub fn take_punched_text(&mut self) -> String {
        self.punched.drain(..).map(|r| write_record(&r)).collect()
    }

    fn check_read_timer(&mut self) {
        if self.reading {
            if let Some(start) = self.read_start {
                if start.elapsed() >= Duration::from_millis(SCAN_MSEC) {
                    self.reading = false;
                    self.scan_status = SCAN_STATUS_READY | SCAN_STATUS_COMPLETE;
                }
            }
        }
    }

    fn check_write_timer(&mut self) {
        if self.writing {
            if let Some(start) = self.write_start {
                if start.elapsed() >= Duration::from_millis(PUNCH_MSEC) {
                    self.writing = false;
                    self.punch_status = PUNCH_STATUS_READY;
                }
            }
        }
    }

    fn read_next_card(&mut self) {
        if self.scan_status & SCAN_STATUS_READY != SCAN_STATUS_READY {
            return;
        }
        let Some(record) = self.hopper.pop_front() else {
            self.scan_status = SCAN_STATUS_COMPLETE;
            self.reading = false;
            return;
        };
        let len = record.words.len().min(MAX_CARD_LEN);
        self.read_buf = [0; MAX_CARD_LEN];
        self.read_buf[..len].copy_from_slice(&record.words[..len]);
        self.scan_card_info = kind_info_bits(record.kind) | (len as u32 & INFO_LEN_MASK);
        self.reading = true;
        self.scan_status = SCAN_STATUS_READING;
        self.read_start = Some(Instant::now());
    }

    fn write_card(&mut self) {
        if self.punch_status != PUNCH_STATUS_READY {
            return;
        }
        self.writing = true;
        self.punch_status = PUNCH_STATUS_BUSY;
        self.write_start = Some(Instant::now());
        let len = (self.punch_card_info & INFO_LEN_MASK) as usize;
        let len = len.min(MAX_CARD_LEN);
        self.punched.push(CardRecord {
            kind: info_kind(self.punch_card_info),
            base_addr: 0,
            words: self.write_buf[..len].to_vec(),
        });
    }
}

impl Peripheral for CardOTron {
    fn mem_size(&self) -> u32 {
        MEM_SIZE
    }

    fn ddn(&self) -> u32 {
        self.ddn
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::CardReader
    }

    fn read_io(&mut self, offset: u32) -> u32 {
        self.check_read_timer();
        self.check_write_timer();
        match offset {
            SCAN_REG_STATUS => self.scan_status,
            SCAN_REG_CARD_INFO => {
                if self.reading {
                    0
                } else {
                    self.scan_card_info
                }
            }
            SCAN_REG_COMMAND => MEM_READ_INVALID,
            PUNCH_REG_STATUS => self.punch_status,
            _ if (SCAN_REG_READ_BUF..SCAN_REG_READ_BUF + MAX_CARD_LEN as u32).contains(&offset) => {
                if self.reading {
                    0
                } else {
                    self.read_buf[(offset - SCAN_REG_READ_BUF) as usize]
                }
            }
            _ => MEM_READ_INVALID,
        }
    }

    fn write_io(&mut self, offset: u32, value: u32) {
        self.check_read_timer();
        match offset {
            SCAN_REG_COMMAND => {
                if value & SCAN_CMD_READ != 0 {
                    self.read_next_card();
                } else if value & SCAN_CMD_ABORT != 0 {
                    self.hopper.clear();
                    self.reading = false;
                    self.scan_status = SCAN_STATUS_EMPTY;
                }
            }
            _ => {
                self.check_write_timer();
                if self.writing {
                    return;
                }
                match offset {
                    PUNCH_REG_COMMAND => {
                        if value & PUNCH_CMD_WRITE != 0 {
                            self.write_card();
                        } else if value & PUNCH_CMD_FLUSH != 0 {
                            self.write_buf = [0; MAX_CARD_LEN];
                            self.punch_status = PUNCH_STATUS_READY;
                        }
                    }
                    PUNCH_REG_CARD_INFO => self.punch_card_info = value,
                    _ if (PUNCH_REG_WRITE_BUF..PUNCH_REG_WRITE_BUF + MAX_CARD_LEN as u32)
                        .contains(&offset) =>
                    {
                        self.write_buf[(offset - PUNCH_REG_WRITE_BUF) as usize] = value;
                    }
                    _ => {}
                }
            }
        }
    }

    fn power_on_reset(&mut self) {
        self.hopper.clear();
        self.reading = false;
        self.scan_status = SCAN_STATUS_EMPTY;
        self.writing = false;
        self.punch_status = PUNCH_STATUS_EMPTY;
        self.write_buf = [0; MAX_CARD_LEN];
        self.punched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_command_is_ignored_without_a_loaded_deck() {
        let mut dev = CardOTron::new(1);
        dev.write_io(SCAN_REG_COMMAND, SCAN_CMD_READ);
        assert_eq!(dev.read_io(SCAN_REG_STATUS), SCAN_STATUS_EMPTY);
    }

    #[test]
    fn scanning_hides_buffer_contents_until_the_mechanical_delay_elapses() {
        let mut dev = CardOTron::new(1);
        dev.load_deck(vec![CardRecord {
            kind: RecordKind::Code,
            base_addr: 0,
            words: vec![0xAA, 0xBB],
        }]);
        dev.write_io(SCAN_REG_COMMAND, SCAN_CMD_READ);
        assert_eq!(dev.read_io(SCAN_REG_STATUS), SCAN_STATUS_READING);
        assert_eq!(dev.read_io(SCAN_REG_READ_BUF), 0);
        assert!(dev.is_reading());
    }

    #[test]
    fn exhausted_hopper_reports_complete_not_ready() {
        let mut dev = CardOTron::new(1);
        dev.load_deck(vec![]);
        dev.write_io(SCAN_REG_COMMAND, SCAN_CMD_READ);
        assert_eq!(dev.read_io(SCAN_REG_STATUS), SCAN_STATUS_COMPLETE);
    }

    #[test]
    fn punch_command_queues_a_record_and_goes_busy() {
        let mut dev = CardOTron::new(1);
        dev.punch_status = PUNCH_STATUS_READY;
        dev.write_io(PUNCH_REG_CARD_INFO, 2); // 2 words, Code kind
        dev.write_io(PUNCH_REG_WRITE_BUF, 0x11);
        dev.write_io(PUNCH_REG_WRITE_BUF + 1, 0x22);
        dev.write_io(PUNCH_REG_COMMAND, PUNCH_CMD_WRITE);
        assert_eq!(dev.read_io(PUNCH_REG_STATUS), PUNCH_STATUS_BUSY);
        let text = dev.take_punched_text();
        assert!(text.contains("C 2"));
    }

    #[test]
    fn writes_while_busy_are_ignored() {
        let mut dev = CardOTron::new(1);
        dev.punch_status = PUNCH_STATUS_READY;
        dev.write_io(PUNCH_REG_CARD_INFO, 1);
        dev.write_io(PUNCH_REG_WRITE_BUF, 1);
        dev.write_io(PUNCH_REG_COMMAND, PUNCH_CMD_WRITE);
        dev.write_io(PUNCH_REG_CARD_INFO, 99);
        assert_eq!(dev.punch_card_info, 1);
    }
}
