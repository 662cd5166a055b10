use w56_core::{
    ArityClass, CpuState, Fault, Instruction, Memory, OperandKind, Peripheral, PeripheralTable,
    PeripheralTableError, RegisterArg, BASE_IO_MEM, FAULT_DOUBLE_BIT, FLG_FAULT, FLG_IN_INT,
    FLG_INTENA, FLG_MATH_MASK, FLG_OVER, FLG_SIGNED, FLG_UNDER, FLG_ZERO, NUM_REGS, REG_FLG,
    REG_IP, REG_SP,
};

/// Highest addressable word. Memory is a flat 32-bit address space.
pub const MAX_ADDR: u32 = u32::MAX;
/// Registers pushed or popped by a single SSTATE/LSTATE.
pub const STATE_SIZE: u32 = NUM_REGS as u32;
/// Words reserved per fault handler table, one slot per fault code.
pub const FHAP_TABLE_SIZE: u32 = 16;
/// Words reserved per interrupt handler table, one slot per interrupt line.
pub const IHAP_TABLE_SIZE: u32 = 32;

/// The machine: register file, flat memory, peripheral bus, and the
/// fetch/decode/execute loop that drives them.
pub struct Cpu {
    memory: Memory,
    regs: [u32; NUM_REGS],
    halted: bool,
    fhap_base: u32,
    ihap_base: u32,
    peripherals: PeripheralTable,
}

impl Cpu {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Memory::default().capacity())
    }

    #[must_use]
    pub fn with_capacity(capacity: u32) -> Self {
        Self {
            memory: Memory::new(capacity),
            regs: [0; NUM_REGS],
            halted: false,
            fhap_base: 0,
            ihap_base: 0,
            peripherals: PeripheralTable::new(),
        }
    }

    #[must_use]
    pub fn read_reg(&self, idx: usize) -> u32 {
        assert!(idx < NUM_REGS, "register index {idx} out of range");
        self.regs[idx]
    }

    pub fn write_reg(&mut self, idx: usize, value: u32) {
        assert!(idx < NUM_REGS, "register index {idx} out of range");
        self.regs[idx] = value;
    }

    /// Size of the populated linear memory region, in words. Addresses at
    /// or above this (and below [`BASE_IO_MEM`]) read as
    /// [`w56_core::MEM_READ_INVALID`] and silently drop writes.
    #[must_use]
    pub fn memory_capacity(&self) -> u32 {
        self.memory.capacity()
    }

    #[must_use]
    pub fn read_mem(&mut self, addr: u32) -> u32 {
        if addr >= BASE_IO_MEM {
            self.peripherals.read(addr)
        } else {
            self.memory.read(addr)
        }
    }

    pub fn write_mem(&mut self, addr: u32, value: u32) {
        if addr >= BASE_IO_MEM {
            self.peripherals.write(addr, value);
        } else {
            self.memory.write(addr, value);
        }
    }

    pub fn set_flag(&mut self, mask: u32) {
        self.regs[REG_FLG] |= mask;
    }

    pub fn clear_flag(&mut self, mask: u32) {
        self.regs[REG_FLG] &= !mask;
    }

    #[must_use]
    pub fn is_set(&self, mask: u32) -> bool {
        self.regs[REG_FLG] & mask != 0
    }

    pub fn clear_math_flags(&mut self) {
        self.clear_flag(FLG_MATH_MASK);
    }

    fn indicate_zero(&mut self, value: u32) {
        if value == 0 {
            self.set_flag(FLG_ZERO);
        } else {
            self.clear_flag(FLG_ZERO);
        }
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Re-zero memory, registers, the halted flag, and both handler table
    /// bases. Registered peripherals are left alone — the run controller
    /// resets devices separately, as part of bring-up.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.regs = [0; NUM_REGS];
        self.halted = false;
        self.fhap_base = 0;
        self.ihap_base = 0;
    }

    pub fn add_device(
        &mut self,
        device: Box<dyn Peripheral>,
    ) -> Result<usize, PeripheralTableError> {
        self.peripherals.add_device(device)
    }

    pub fn remove_device(&mut self, ddn: u32) {
        self.peripherals.remove_device(ddn);
    }

    #[must_use]
    pub fn peripherals(&self) -> &PeripheralTable {
        &self.peripherals
    }

    pub fn peripherals_mut(&mut self) -> &mut PeripheralTable {
        &mut self.peripherals
    }

    #[must_use]
    pub fn dump_state(&self) -> CpuState {
        CpuState {
            registers: self.regs,
            halted: self.halted,
            fhap_base: self.fhap_base,
            ihap_base: self.ihap_base,
        }
    }

    /// Run a single fetch/decode/execute cycle, or dispatch a pending
    /// interrupt instead. A no-op once halted.
    pub fn step(&mut self) {
        if self.halted {
            return;
        }
        self.peripherals.do_background();
        if self.dispatch_pending_interrupt() {
            return;
        }
        let iaddr = self.read_reg(REG_IP);
        self.write_reg(REG_IP, iaddr.wrapping_add(1));
        let word = self.read_mem(iaddr);
        let instr = Instruction::decode(word);
        let fault = self.execute(&instr);
        if let Some(f) = fault {
            self.dispatch_fault(f, iaddr);
        }
    }

    fn dispatch_pending_interrupt(&mut self) -> bool {
        if !self.is_set(FLG_INTENA) || self.is_set(FLG_FAULT) || self.is_set(FLG_IN_INT) {
            return false;
        }
        let flg = self.read_reg(REG_FLG);
        let Some(line) = self.peripherals.poll_interrupt(flg) else {
            return false;
        };
        self.set_flag(FLG_IN_INT);
        if self.push_state().is_err() {
            self.clear_flag(FLG_IN_INT);
            let ip = self.read_reg(REG_IP);
            self.dispatch_fault(Fault::Stack, ip);
            return true;
        }
        self.write_reg(0, line);
        let handler_addr = self.ihap_base.wrapping_add(line);
        let new_ip = self.read_mem(handler_addr);
        self.write_reg(REG_IP, new_ip);
        true
    }

    fn dispatch_fault(&mut self, fault: Fault, fault_addr: u32) {
        if self.is_set(FLG_FAULT) {
            self.halt();
            self.write_reg(0, FAULT_DOUBLE_BIT);
            return;
        }
        self.write_reg(REG_IP, fault_addr);
        self.set_flag(FLG_FAULT);
        if self.push_state().is_err() {
            self.halt();
            self.write_reg(0, FAULT_DOUBLE_BIT);
            return;
        }
        self.write_reg(0, fault.code());
        let handler_addr = self.fhap_base.wrapping_add(fault.code() - 1);
        let new_ip = self.read_mem(handler_addr);
        self.write_reg(REG_IP, new_ip);
    }

    /// Bounds-check and install a new fault handler table base.
    pub fn set_fhap(&mut self, base: u32) -> Option<Fault> {
        if base > MAX_ADDR - FHAP_TABLE_SIZE {
            return Some(Fault::BadAddress);
        }
        self.fhap_base = base;
        None
    }

    /// Bounds-check and install a new interrupt handler table base.
    pub fn set_ihap(&mut self, base: u32) -> Option<Fault> {
        if base > MAX_ADDR - IHAP_TABLE_SIZE {
            return Some(Fault::BadAddress);
        }
        self.ihap_base = base;
        None
    }

    fn push_word(&mut self, value: u32) -> Result<(), Fault> {
        let sp = self.read_reg(REG_SP);
        if sp == MAX_ADDR {
            return Err(Fault::Stack);
        }
        self.write_mem(sp, value);
        self.write_reg(REG_SP, sp + 1);
        Ok(())
    }

    fn pop_word(&mut self) -> Result<u32, Fault> {
        let sp = self.read_reg(REG_SP);
        if sp == 0 {
            return Err(Fault::Stack);
        }
        let new_sp = sp - 1;
        let value = self.read_mem(new_sp);
        self.write_reg(REG_SP, new_sp);
        Ok(value)
    }

    fn push_state(&mut self) -> Result<(), Fault> {
        let sp = self.read_reg(REG_SP);
        if sp > MAX_ADDR - STATE_SIZE {
            return Err(Fault::Stack);
        }
        for i in 0..STATE_SIZE {
            let value = self.read_reg(i as usize);
            self.write_mem(sp + i, value);
        }
        self.write_reg(REG_SP, sp + STATE_SIZE);
        Ok(())
    }

    /// Pops sixteen registers off the stack, including SP itself — which
    /// lands back at its pre-push value as a side effect of the loop below.
    fn pop_state(&mut self) -> Result<(), Fault> {
        let sp = self.read_reg(REG_SP);
        if sp < STATE_SIZE {
            return Err(Fault::Stack);
        }
        let base = sp - STATE_SIZE;
        for i in 0..STATE_SIZE {
            let value = self.read_mem(base + i);
            self.write_reg(i as usize, value);
        }
        Ok(())
    }

    fn read_operand(&mut self, arg: RegisterArg) -> Result<u32, Fault> {
        match arg.kind {
            OperandKind::Value => Ok(self.read_reg(arg.reg as usize)),
            OperandKind::Indirect => {
                let addr = self.read_reg(arg.reg as usize);
                Ok(self.read_mem(addr))
            }
            _ => Err(Fault::BadInstruction),
        }
    }

    fn write_operand(&mut self, arg: RegisterArg, value: u32) -> Result<(), Fault> {
        match arg.kind {
            OperandKind::Value => {
                self.write_reg(arg.reg as usize, value);
                Ok(())
            }
            OperandKind::Indirect => {
                let addr = self.read_reg(arg.reg as usize);
                self.write_mem(addr, value);
                Ok(())
            }
            _ => Err(Fault::BadInstruction),
        }
    }

    fn fetch_literal(&mut self) -> u32 {
        let ip = self.read_reg(REG_IP);
        self.write_reg(REG_IP, ip.wrapping_add(1));
        self.read_mem(ip)
    }

    fn execute(&mut self, instr: &Instruction) -> Option<Fault> {
        if !instr.is_valid() {
            return Some(Fault::BadInstruction);
        }
        match instr.class {
            Some(ArityClass::NoArgs) => self.exec_no_args(instr),
            Some(ArityClass::SrcOnly) => self.exec_src_only(instr),
            Some(ArityClass::DestOnly) => self.exec_dest_only(instr),
            Some(ArityClass::SrcDest) => self.exec_src_dest(instr),
            Some(ArityClass::TwoSrcDest) => self.exec_two_src_dest(instr),
            Some(ArityClass::ControlFlow) => self.exec_control_flow(instr),
            None => Some(Fault::BadInstruction),
        }
    }

    fn exec_no_args(&mut self, instr: &Instruction) -> Option<Fault> {
        match instr.opcode {
            0x50 => self.push_state().err(), // SSTATE
            0x51 => self.restore_state_keeping_ip_and_r0().err(), // LSTATE
            0x52 => match self.pop_word() {
                // RETURN
                Ok(target) => {
                    self.write_reg(REG_IP, target);
                    None
                }
                Err(f) => Some(f),
            },
            0x53 => {
                // IRET
                let result = self.restore_state_keeping_ip_and_r0();
                self.clear_flag(FLG_IN_INT);
                result.err()
            }
            0x54 => {
                self.set_flag(FLG_SIGNED);
                None
            }
            0x55 => {
                self.clear_flag(FLG_SIGNED);
                None
            }
            0x56 => {
                self.set_flag(FLG_INTENA);
                None
            }
            0x57 => {
                self.clear_flag(FLG_INTENA);
                None
            }
            0xF0 => None, // NOP
            0xFF => {
                self.halt();
                None
            }
            _ => Some(Fault::BadInstruction),
        }
    }

    /// LSTATE restores all sixteen registers except IP and R0, which keep
    /// carrying the fault/interrupt entry values (a return value, in R0's
    /// case) until the handler explicitly overwrites them.
    fn restore_state_keeping_ip_and_r0(&mut self) -> Result<(), Fault> {
        let ip = self.read_reg(REG_IP);
        let r0 = self.read_reg(0);
        let result = self.pop_state();
        self.write_reg(REG_IP, ip);
        self.write_reg(0, r0);
        result
    }

    fn exec_src_only(&mut self, instr: &Instruction) -> Option<Fault> {
        let value = match self.read_operand(instr.src1) {
            Ok(v) => v,
            Err(f) => return Some(f),
        };
        match instr.opcode {
            0x30 => self.push_word(value).err(), // PUSH
            0x3A => self.set_fhap(value),         // SETFHAP
            0x3B => self.set_ihap(value),         // SETIHAP
            _ => Some(Fault::BadInstruction),
        }
    }

    fn exec_dest_only(&mut self, instr: &Instruction) -> Option<Fault> {
        if instr.opcode == 0x31 {
            // POP
            return match self.pop_word() {
                Ok(v) => self.write_operand(instr.dest, v).err(),
                Err(f) => Some(f),
            };
        }
        let mut value = match self.read_operand(instr.dest) {
            Ok(v) => v,
            Err(f) => return Some(f),
        };
        self.clear_math_flags();
        match instr.opcode {
            0x20 => value = !value, // NOT
            0x21 => {
                // INCR
                if self.is_set(FLG_SIGNED) {
                    let signed = (value as i32).wrapping_add(1);
                    if signed == i32::MIN {
                        self.set_flag(FLG_OVER);
                    }
                    value = signed as u32;
                } else {
                    value = value.wrapping_add(1);
                    if value == 0 {
                        self.set_flag(FLG_OVER);
                    }
                }
            }
            0x22 => {
                // DECR
                if self.is_set(FLG_SIGNED) {
                    let signed = (value as i32).wrapping_sub(1);
                    if signed == i32::MAX {
                        self.set_flag(FLG_UNDER);
                    }
                    value = signed as u32;
                } else {
                    if value == 0 {
                        self.set_flag(FLG_UNDER);
                    }
                    value = value.wrapping_sub(1);
                }
            }
            _ => return Some(Fault::BadInstruction),
        }
        self.indicate_zero(value);
        self.write_operand(instr.dest, value).err()
    }

    fn exec_src_dest(&mut self, instr: &Instruction) -> Option<Fault> {
        match instr.opcode {
            0x01 => {
                // MOVE
                let value = if instr.literal_in_use {
                    self.fetch_literal()
                } else {
                    match self.read_operand(instr.src1) {
                        Ok(v) => v,
                        Err(f) => return Some(f),
                    }
                };
                self.write_operand(instr.dest, value).err()
            }
            0x08 => {
                // CMP
                let src = match self.read_operand(instr.src1) {
                    Ok(v) => v,
                    Err(f) => return Some(f),
                };
                let dest = match self.read_operand(instr.dest) {
                    Ok(v) => v,
                    Err(f) => return Some(f),
                };
                self.clear_math_flags();
                let ordering = if self.is_set(FLG_SIGNED) {
                    (src as i32).cmp(&(dest as i32))
                } else {
                    src.cmp(&dest)
                };
                match ordering {
                    std::cmp::Ordering::Equal => self.set_flag(FLG_ZERO),
                    std::cmp::Ordering::Less => self.set_flag(FLG_UNDER),
                    std::cmp::Ordering::Greater => self.set_flag(FLG_OVER),
                }
                None
            }
            _ => Some(Fault::BadInstruction),
        }
    }

    fn exec_two_src_dest(&mut self, instr: &Instruction) -> Option<Fault> {
        let src1 = match self.read_operand(instr.src1) {
            Ok(v) => v,
            Err(f) => return Some(f),
        };
        let src2 = match self.read_operand(instr.src2) {
            Ok(v) => v,
            Err(f) => return Some(f),
        };
        self.clear_math_flags();
        let signed = self.is_set(FLG_SIGNED);
        let result = match instr.opcode {
            0x11 => {
                // ADD
                if signed {
                    let r = (src1 as i32).wrapping_add(src2 as i32);
                    if (r as i64) != i64::from(src1 as i32) + i64::from(src2 as i32) {
                        self.set_flag(FLG_OVER);
                    }
                    r as u32
                } else {
                    let r = src1.wrapping_add(src2);
                    if r < src1 {
                        self.set_flag(FLG_OVER);
                    }
                    r
                }
            }
            0x12 => {
                // SUB
                if signed {
                    let r = (src1 as i32).wrapping_sub(src2 as i32);
                    if (r as i64) != i64::from(src1 as i32) - i64::from(src2 as i32) {
                        self.set_flag(FLG_UNDER);
                    }
                    r as u32
                } else {
                    let r = src1.wrapping_sub(src2);
                    if src1 < src2 {
                        self.set_flag(FLG_UNDER);
                    }
                    r
                }
            }
            0x13 => src1 & src2,
            0x14 => src1 | src2,
            0x15 => src1 ^ src2,
            0x16 => {
                // SHIFTR
                if src2 >= 32 {
                    0
                } else {
                    let r = src1 >> src2;
                    if (r << src2) != src1 {
                        self.set_flag(FLG_UNDER);
                    }
                    r
                }
            }
            0x17 => {
                // SHIFTL
                if src2 >= 32 {
                    0
                } else {
                    let r = src1 << src2;
                    if (r >> src2) != src1 {
                        self.set_flag(FLG_OVER);
                    }
                    r
                }
            }
            _ => return Some(Fault::BadInstruction),
        };
        self.indicate_zero(result);
        self.write_operand(instr.dest, result).err()
    }

    fn exec_control_flow(&mut self, instr: &Instruction) -> Option<Fault> {
        let target = if instr.literal_in_use {
            self.fetch_literal()
        } else {
            match self.read_operand(instr.dest) {
                Ok(v) => v,
                Err(f) => return Some(f),
            }
        };
        match instr.opcode {
            0x32 if self.is_set(FLG_ZERO) => self.jump(target),
            0x33 if !self.is_set(FLG_ZERO) => self.jump(target),
            0x34 if self.is_set(FLG_OVER) => self.jump(target),
            0x35 if !self.is_set(FLG_OVER) => self.jump(target),
            0x36 if self.is_set(FLG_UNDER) => self.jump(target),
            0x37 if !self.is_set(FLG_UNDER) => self.jump(target),
            0x32..=0x37 => None, // condition not met, fall through
            0x38 => self.jump(target), // JMP
            0x39 => {
                // CALL
                let return_addr = self.read_reg(REG_IP);
                match self.push_word(return_addr) {
                    Ok(()) => self.jump(target),
                    Err(f) => Some(f),
                }
            }
            _ => Some(Fault::BadInstruction),
        }
    }

    fn jump(&mut self, target: u32) -> Option<Fault> {
        self.write_reg(REG_IP, target);
        None
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use w56_core::{FLG_INTEN_LINES, Instruction as Ins, OperandKind as Kind, RegisterArg as Arg};

    fn value(reg: u8) -> RegisterArg {
        Arg {
            kind: Kind::Value,
            reg,
        }
    }
    fn unused() -> RegisterArg {
        Arg {
            kind: Kind::Unused,
            reg: 0,
        }
    }
    fn null() -> RegisterArg {
        Arg {
            kind: Kind::Null,
            reg: 0,
        }
    }

    fn load(cpu: &mut Cpu, addr: u32, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            cpu.write_mem(addr + i as u32, *w);
        }
    }

    #[test]
    fn move_literal_loads_register_and_skips_the_trailing_word() {
        let mut cpu = Cpu::with_capacity(64);
        let word = Ins::encode(0x01, null(), null(), value(1));
        load(&mut cpu, 0, &[word, 0xCAFEBABE]);
        cpu.step();
        assert_eq!(cpu.read_reg(1), 0xCAFEBABE);
        assert_eq!(cpu.read_reg(REG_IP), 2);
    }

    #[test]
    fn add_sets_overflow_on_unsigned_wraparound() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.write_reg(1, 0xFFFF_FFFF);
        cpu.write_reg(2, 2);
        let word = Ins::encode(0x11, value(1), value(2), value(3));
        load(&mut cpu, 0, &[word]);
        cpu.step();
        assert_eq!(cpu.read_reg(3), 1);
        assert!(cpu.is_set(FLG_OVER));
    }

    #[test]
    fn shift_by_32_or_more_clears_the_result() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.write_reg(1, 0xFF);
        cpu.write_reg(2, 32);
        let word = Ins::encode(0x16, value(1), value(2), value(3));
        load(&mut cpu, 0, &[word]);
        cpu.step();
        assert_eq!(cpu.read_reg(3), 0);
    }

    #[test]
    fn shiftr_sets_under_on_lost_bits() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.write_reg(1, 0b1011);
        cpu.write_reg(2, 1);
        let word = Ins::encode(0x16, value(1), value(2), value(3));
        load(&mut cpu, 0, &[word]);
        cpu.step();
        assert_eq!(cpu.read_reg(3), 0b0101);
        assert!(cpu.is_set(FLG_UNDER));
    }

    #[test]
    fn bad_instruction_dispatches_through_fhap_zero_based() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.set_fhap(0x10);
        // handler for code 1 (Bad-Instruction) lives at FHAP + (1 - 1) = 0x10
        load(&mut cpu, 0x10, &[0x20]);
        load(&mut cpu, 0x20, &[Ins::encode(0x52, unused(), unused(), unused())]); // RETURN is a placeholder target
        // opcode 0 at address 0 is invalid
        cpu.step();
        assert!(cpu.is_set(FLG_FAULT));
        assert_eq!(cpu.read_reg(0), 1);
        assert_eq!(cpu.read_reg(REG_IP), 0x20);
    }

    #[test]
    fn fault_recovery_restores_caller_state_via_iret() {
        let mut cpu = Cpu::with_capacity(0x2000);
        cpu.set_fhap(0x40);
        // the FHAP slot holds a pointer to the handler, not the handler itself
        load(&mut cpu, 0x40, &[0x50]);
        // handler: MOVE 0xF, R3 ; IRET
        load(
            &mut cpu,
            0x50,
            &[
                Ins::encode(0x01, null(), null(), value(3)),
                0xF,
                Ins::encode(0x53, unused(), unused(), unused()),
            ],
        );
        cpu.write_reg(REG_SP, 0x1000);
        // bad instruction at address 0
        cpu.step();
        assert!(cpu.is_set(FLG_FAULT));
        assert_eq!(cpu.read_reg(REG_IP), 0x50);
        cpu.step(); // MOVE 0xF, R3
        cpu.step(); // IRET
        assert_eq!(cpu.read_reg(3), 0xF);
        assert!(!cpu.is_set(FLG_FAULT));
        assert_eq!(cpu.read_reg(REG_IP), 1); // past the one-word faulting instruction
    }

    #[test]
    fn double_fault_halts_with_high_bit_in_r0() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.set_fhap(0); // handler for code 1 lives at address 0, itself opcode 0
        cpu.step(); // faults, redirects IP to 0
        assert!(!cpu.is_halted());
        cpu.step(); // faults again while FAULT is already set: double fault
        assert!(cpu.is_halted());
        assert_eq!(cpu.read_reg(0), FAULT_DOUBLE_BIT);
        cpu.step(); // halted: a further step is a no-op
        assert!(cpu.is_halted());
    }

    #[test]
    fn interrupt_dispatch_picks_lowest_enabled_line() {
        struct AlwaysActive {
            ddn: u32,
        }
        impl Peripheral for AlwaysActive {
            fn mem_size(&self) -> u32 {
                4
            }
            fn ddn(&self) -> u32 {
                self.ddn
            }
            fn device_class(&self) -> w56_core::DeviceClass {
                w56_core::DeviceClass::Printer
            }
            fn read_io(&mut self, _offset: u32) -> u32 {
                0
            }
            fn write_io(&mut self, _offset: u32, _value: u32) {}
            fn interrupt_supported(&self) -> bool {
                true
            }
            fn interrupt_active(&self) -> bool {
                true
            }
            fn power_on_reset(&mut self) {}
        }

        let mut cpu = Cpu::with_capacity(64);
        cpu.add_device(Box::new(AlwaysActive { ddn: 1 })).unwrap();
        cpu.add_device(Box::new(AlwaysActive { ddn: 2 })).unwrap();
        cpu.set_ihap(0x20);
        cpu.write_reg(REG_SP, 0x1000);
        cpu.set_flag(FLG_INTENA);
        cpu.set_flag(FLG_INTEN_LINES[0]);
        cpu.write_mem(0x20, 0x1234); // IHAP + line 0
        load(&mut cpu, 0, &[Ins::encode(0xF0, unused(), unused(), unused())]); // NOP, never reached
        cpu.step();
        assert!(cpu.is_set(FLG_IN_INT));
        assert_eq!(cpu.read_reg(0), 0);
        assert_eq!(cpu.read_reg(REG_IP), 0x1234);
    }

    #[test]
    fn call_and_return_round_trip_through_the_stack() {
        let mut cpu = Cpu::with_capacity(64);
        cpu.write_reg(REG_SP, 0x10);
        let call = Ins::encode(0x39, unused(), unused(), value(1));
        cpu.write_reg(1, 0x30);
        load(&mut cpu, 0, &[call]);
        load(&mut cpu, 0x30, &[Ins::encode(0x52, unused(), unused(), unused())]);
        cpu.step(); // CALL R1
        assert_eq!(cpu.read_reg(REG_IP), 0x30);
        cpu.step(); // RETURN
        assert_eq!(cpu.read_reg(REG_IP), 1);
    }
}
