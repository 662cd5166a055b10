//! Stor-o-Tron: longitudinal random-access storage. A command (SEEK/READ/
//! WRITE/RESET) latches the device BUSY and a wall-clock deadline; every
//! register access checks that deadline and drops back to IDLE once it has
//! passed, the same lazy-timer pattern used by `w56-cardotron`.
//!
//! Seek addressing is `(head * num_positions + position) * sector_bytes` —
//! the device this is modeled on instead multiplied head directly by
//! position, which silently aliased most of the disk.

use std::io::{Read, Seek, SeekFrom, Write};
use std::time::{Duration, Instant};

use w56_core::{DeviceClass, Peripheral, MEM_READ_INVALID};

pub const SECTOR_WORDS: usize = 1024;
pub const NUM_HEADS: u32 = 4;
pub const NUM_POSITIONS: u32 = 1024;

pub const SEEK_MSEC: u64 = 200;
pub const READ_MSEC: u64 = 17;
pub const WRITE_MSEC: u64 = 17;

pub const REG_STATUS: u32 = 0;
pub const REG_COMMAND: u32 = 1;
pub const REG_HEADSEL: u32 = 2;
pub const REG_POSSEL: u32 = 3;
pub const REG_BUFFER: u32 = 4;
pub const MEM_SIZE: u32 = REG_BUFFER + SECTOR_WORDS as u32;

const STATE_READY: u32 = 0;
const STATE_BUSY: u32 = 1;
const STATE_ERR: u32 = 2;

const HEAD_COUNT_SHIFT: u32 = 24;
const POS_COUNT_SHIFT: u32 = 8;

pub const COMMAND_SEEK: u32 = 1;
pub const COMMAND_READ: u32 = 2;
pub const COMMAND_WRITE: u32 = 3;
pub const COMMAND_RESET: u32 = 4;

pub struct StorOTron<F> {
    ddn: u32,
    state: u32,
    buffer: [u32; SECTOR_WORDS],
    current_head: u32,
    current_pos: u32,
    deadline: Option<Instant>,
    file: Option<F>,
}

impl<F: Read + Write + Seek> StorOTron<F> {
    /// `file` is the backing store, already open and positioned at zero.
    /// `None` models a device with no medium loaded: it reports `STATE_ERR`
    /// forever, same as the original's constructor contract.
    #[must_use]
    pub fn new(ddn: u32, file: Option<F>) -> Self {
        let state = if file.is_some() {
            STATE_READY
        } else {
            STATE_ERR
        };
        Self {
            ddn,
            state,
            buffer: [0; SECTOR_WORDS],
            current_head: 0,
            current_pos: 0,
            deadline: None,
            file,
        }
    }

    fn status_word(&self) -> u32 {
        (NUM_HEADS << HEAD_COUNT_SHIFT) | (NUM_POSITIONS << POS_COUNT_SHIFT) | self.state
    }

    fn start_timer(&mut self, msec: u64) {
        self.deadline = Some(Instant::now() + Duration::from_millis(msec));
    }

    fn check_timer(&mut self) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.state = STATE_READY;
            }
        }
    }

    fn sector_offset(&self) -> u64 {
        let sector_bytes = (SECTOR_WORDS * 4) as u64;
        (u64::from(self.current_head) * u64::from(NUM_POSITIONS) + u64::from(self.current_pos))
            * sector_bytes
    }

    fn read_from_file(&mut self) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let offset = self.sector_offset();
        let mut bytes = vec![0u8; SECTOR_WORDS * 4];
        if file.seek(SeekFrom::Start(offset)).is_err() || file.read_exact(&mut bytes).is_err() {
            self.state = STATE_ERR;
            return;
        }
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            self.buffer[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    fn write_to_file(&mut self) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let offset = self.sector_offset();
        let mut bytes = Vec::with_capacity(SECTOR_WORDS * 4);
        for word in &self.buffer {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        if file.seek(SeekFrom::Start(offset)).is_err() || file.write_all(&bytes).is_err() {
            self.state = STATE_ERR;
        }
    }
}

impl<F: Read + Write + Seek> Peripheral for StorOTron<F> {
    fn mem_size(&self) -> u32 {
        MEM_SIZE
    }

    fn ddn(&self) -> u32 {
        self.ddn
    }

    fn device_class(&self) -> DeviceClass {
        DeviceClass::RandomAccessStorage
    }

    fn read_io(&mut self, offset: u32) -> u32 {
        self.check_timer();
        match offset {
            REG_STATUS => self.status_word(),
            REG_COMMAND => MEM_READ_INVALID,
            REG_HEADSEL => self.current_head,
            REG_POSSEL => self.current_pos,
            _ if (REG_BUFFER..REG_BUFFER + SECTOR_WORDS as u32).contains(&offset) => {
                self.buffer[(offset - REG_BUFFER) as usize]
            }
            _ => MEM_READ_INVALID,
        }
    }

    fn write_io(&mut self, offset: u32, value: u32) {
        self.check_timer();
        match offset {
            REG_COMMAND => {
                if self.state == STATE_READY {
                    self.state = STATE_BUSY;
                    match value {
                        COMMAND_SEEK => self.start_timer(SEEK_MSEC),
                        COMMAND_READ => {
                            self.start_timer(READ_MSEC);
                            self.read_from_file();
                        }
                        COMMAND_WRITE => {
                            self.start_timer(WRITE_MSEC);
                            self.write_to_file();
                        }
                        COMMAND_RESET => self.power_on_reset(),
                        _ => self.state = STATE_READY,
                    }
                }
            }
            REG_HEADSEL => {
                if self.state == STATE_READY && value < NUM_HEADS {
                    self.current_head = value;
                }
            }
            REG_POSSEL => {
                if self.state == STATE_READY && value < NUM_POSITIONS {
                    self.current_pos = value;
                }
            }
            _ if (REG_BUFFER..REG_BUFFER + SECTOR_WORDS as u32).contains(&offset) => {
                self.buffer[(offset - REG_BUFFER) as usize] = value;
            }
            _ => {}
        }
    }

    fn power_on_reset(&mut self) {
        if self.file.is_some() {
            self.state = STATE_READY;
            self.current_head = 0;
            self.current_pos = 0;
            self.buffer = [0; SECTOR_WORDS];
        } else {
            self.state = STATE_ERR;
        }
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn blank_disk() -> Cursor<Vec<u8>> {
        Cursor::new(vec![0u8; (NUM_HEADS * NUM_POSITIONS) as usize * SECTOR_WORDS * 4])
    }

    #[test]
    fn no_medium_reports_err_state() {
        let dev: StorOTron<Cursor<Vec<u8>>> = StorOTron::new(1, None);
        assert_eq!(dev.state, STATE_ERR);
    }

    #[test]
    fn write_then_read_round_trips_through_the_backing_file() {
        let mut dev = StorOTron::new(1, Some(blank_disk()));
        dev.write_io(REG_HEADSEL, 2);
        dev.write_io(REG_POSSEL, 7);
        dev.write_io(REG_BUFFER, 0xDEAD_BEEF);
        dev.write_io(REG_COMMAND, COMMAND_WRITE);
        // writing is synchronous internally; only visibility is delayed
        dev.buffer = [0; SECTOR_WORDS];
        dev.state = STATE_READY;
        dev.write_io(REG_HEADSEL, 2);
        dev.write_io(REG_POSSEL, 7);
        dev.write_io(REG_COMMAND, COMMAND_READ);
        assert_eq!(dev.read_io(REG_BUFFER), 0xDEAD_BEEF);
    }

    #[test]
    fn distinct_head_position_pairs_do_not_alias() {
        let mut dev = StorOTron::new(1, Some(blank_disk()));
        dev.write_io(REG_HEADSEL, 1);
        dev.write_io(REG_POSSEL, 2);
        dev.write_io(REG_BUFFER, 111);
        dev.write_io(REG_COMMAND, COMMAND_WRITE);
        dev.state = STATE_READY;

        dev.write_io(REG_HEADSEL, 2);
        dev.write_io(REG_POSSEL, 1);
        dev.write_io(REG_BUFFER, 222);
        dev.write_io(REG_COMMAND, COMMAND_WRITE);
        dev.state = STATE_READY;

        dev.write_io(REG_HEADSEL, 1);
        dev.write_io(REG_POSSEL, 2);
        dev.write_io(REG_COMMAND, COMMAND_READ);
        assert_eq!(dev.read_io(REG_BUFFER), 111);

        dev.write_io(REG_HEADSEL, 2);
        dev.write_io(REG_POSSEL, 1);
        dev.write_io(REG_COMMAND, COMMAND_READ);
        assert_eq!(dev.read_io(REG_BUFFER), 222);
    }

    #[test]
    fn commands_are_ignored_while_busy() {
        let mut dev = StorOTron::new(1, Some(blank_disk()));
        dev.write_io(REG_COMMAND, COMMAND_SEEK);
        assert_eq!(dev.state, STATE_BUSY);
        dev.write_io(REG_HEADSEL, 3); // ignored: not idle
        assert_eq!(dev.current_head, 0);
    }
}
