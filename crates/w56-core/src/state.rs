//! Immutable CPU state snapshot, the one thing that crosses from the driver
//! thread to observers (see `w56-runner`).

use crate::regs::NUM_REGS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuState {
    pub registers: [u32; NUM_REGS],
    pub halted: bool,
    pub fhap_base: u32,
    pub ihap_base: u32,
}

impl CpuState {
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            registers: [0; NUM_REGS],
            halted: false,
            fhap_base: 0,
            ihap_base: 0,
        }
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::zeroed()
    }
}
