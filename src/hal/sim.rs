//! Host models of the USI, the program memory and the signature row

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::digital::v2::OutputPin;

use super::flash::{DeviceInfo, FlashError, FlashMemory};
use super::usi::UsiPort;
use crate::config::{FLASH_SIZE, PAGE_SIZE};

#[derive(Default)]
struct UsiRegs {
    data: u8,
    sda_output: bool,
    scl_high: bool,
    sda_high: bool,
    start_flag: bool,
    overflow_flag: bool,
    start_enabled: bool,
    overflow_enabled: bool,
    counter_bits: u8,
}

/// USI register model. Clones share the same registers, so a [`BusMaster`]
/// can drive the lines while the slave owns its copy.
#[derive(Clone)]
pub struct SimUsi {
    regs: Rc<RefCell<UsiRegs>>,
}

impl SimUsi {
    pub fn new() -> Self {
        Self {
            regs: Rc::new(RefCell::new(UsiRegs {
                scl_high: true,
                sda_high: true,
                ..UsiRegs::default()
            })),
        }
    }

    /// Bits the counter is armed for (8 or 1)
    pub fn counter_bits(&self) -> u8 {
        self.regs.borrow().counter_bits
    }
}

impl Default for SimUsi {
    fn default() -> Self {
        Self::new()
    }
}

impl UsiPort for SimUsi {
    fn start_condition_pending(&self) -> bool {
        let regs = self.regs.borrow();
        regs.start_flag && regs.start_enabled
    }

    fn counter_overflow_pending(&self) -> bool {
        let regs = self.regs.borrow();
        regs.overflow_flag && regs.overflow_enabled
    }

    fn data(&self) -> u8 {
        self.regs.borrow().data
    }

    fn set_data(&mut self, byte: u8) {
        self.regs.borrow_mut().data = byte;
    }

    fn set_sda_output(&mut self, output: bool) {
        self.regs.borrow_mut().sda_output = output;
    }

    fn scl_is_high(&self) -> bool {
        self.regs.borrow().scl_high
    }

    fn sda_is_high(&self) -> bool {
        self.regs.borrow().sda_high
    }

    fn init_lines(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.scl_high = true;
        regs.sda_high = true;
        regs.sda_output = false;
    }

    fn detect_start(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.start_enabled = true;
        regs.overflow_enabled = false;
    }

    fn detect_restart(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.start_enabled = true;
        regs.overflow_enabled = true;
    }

    fn shift_address_bits(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.start_flag = false;
        regs.overflow_flag = false;
        regs.counter_bits = 8;
    }

    fn shift_data_bits(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.overflow_flag = false;
        regs.counter_bits = 8;
    }

    fn shift_ack_bit(&mut self) {
        let mut regs = self.regs.borrow_mut();
        regs.overflow_flag = false;
        regs.counter_bits = 1;
    }
}

/// Scripted bus master. Every bus phase sets the matching USI flag and then
/// calls `poll` so the slave can react before the next phase.
pub struct BusMaster {
    regs: Rc<RefCell<UsiRegs>>,
}

impl BusMaster {
    pub fn new(usi: &SimUsi) -> Self {
        Self {
            regs: usi.regs.clone(),
        }
    }

    pub fn start(&self, poll: &mut impl FnMut()) {
        {
            let mut regs = self.regs.borrow_mut();
            regs.start_flag = true;
            regs.sda_high = false;
            regs.scl_high = false;
        }
        poll();
    }

    pub fn stop(&self) {
        let mut regs = self.regs.borrow_mut();
        regs.sda_high = true;
        regs.scl_high = true;
    }

    /// Clock a byte from master to slave
    pub fn shift_out(&self, byte: u8, poll: &mut impl FnMut()) {
        {
            let mut regs = self.regs.borrow_mut();
            regs.data = byte;
            regs.overflow_flag = true;
        }
        poll();
    }

    /// Clock the slave's acknowledge bit; `true` when the slave pulls SDA low
    pub fn clock_ack(&self, poll: &mut impl FnMut()) -> bool {
        let ack = {
            let mut regs = self.regs.borrow_mut();
            let ack = regs.sda_output && regs.data & 0x80 == 0;
            regs.overflow_flag = true;
            ack
        };
        poll();
        ack
    }

    /// Clock a byte from slave to master. A released line reads 0xFF.
    pub fn shift_in(&self, poll: &mut impl FnMut()) -> u8 {
        let byte = {
            let mut regs = self.regs.borrow_mut();
            regs.overflow_flag = true;
            if regs.sda_output {
                regs.data
            } else {
                0xFF
            }
        };
        poll();
        byte
    }

    pub fn send_ack(&self, ack: bool, poll: &mut impl FnMut()) {
        {
            let mut regs = self.regs.borrow_mut();
            regs.data = if ack { 0x00 } else { 0x01 };
            regs.overflow_flag = true;
        }
        poll();
    }

    /// Full write transaction to `address`; `false` if any byte was NACKed
    pub fn write(&self, address: u8, bytes: &[u8], poll: &mut impl FnMut()) -> bool {
        self.write_address_byte(address << 1, bytes, poll)
    }

    pub fn write_address_byte(&self, address_byte: u8, bytes: &[u8], poll: &mut impl FnMut()) -> bool {
        self.start(poll);
        self.shift_out(address_byte, poll);
        if !self.clock_ack(poll) {
            self.stop();
            return false;
        }
        for &byte in bytes {
            self.shift_out(byte, poll);
            if !self.clock_ack(poll) {
                self.stop();
                return false;
            }
        }
        self.stop();
        true
    }

    /// Full read transaction of `len` bytes, NACKing the last one
    pub fn read(&self, address: u8, len: usize, poll: &mut impl FnMut()) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len);
        self.start(poll);
        self.shift_out((address << 1) | 0x01, poll);
        if !self.clock_ack(poll) {
            self.stop();
            return bytes;
        }
        for i in 0..len {
            bytes.push(self.shift_in(poll));
            self.send_ack(i + 1 < len, poll);
        }
        self.stop();
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Erase(u16),
    Write(u16),
}

struct FlashState {
    memory: Vec<u8>,
    buffer: Vec<u16>,
    log: Vec<FlashOp>,
    fail_next: Option<FlashError>,
}

/// 8 KiB NOR flash with a temporary page buffer. Clones share storage, so a
/// test can inspect the memory while the bootloader owns a handle.
#[derive(Clone)]
pub struct SimFlash {
    state: Rc<RefCell<FlashState>>,
}

impl SimFlash {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FlashState {
                memory: vec![0xFF; FLASH_SIZE as usize],
                buffer: vec![0xFFFF; (PAGE_SIZE / 2) as usize],
                log: Vec::new(),
                fail_next: None,
            })),
        }
    }

    /// Program bytes directly, bypassing the page buffer
    pub fn load(&self, addr: u16, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let start = addr as usize;
        state.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn read(&self, addr: u16, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        state.memory[addr as usize..addr as usize + len].to_vec()
    }

    pub fn word(&self, addr: u16) -> u16 {
        FlashMemory::read_word(self, addr)
    }

    pub fn is_erased(&self, addr: u16, len: usize) -> bool {
        self.read(addr, len).iter().all(|&b| b == 0xFF)
    }

    pub fn ops(&self) -> Vec<FlashOp> {
        self.state.borrow().log.clone()
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().log.clear();
    }

    /// Make the next erase or write fail with `error`
    pub fn fail_next(&self, error: FlashError) {
        self.state.borrow_mut().fail_next = Some(error);
    }

    fn check(state: &mut FlashState, addr: u16) -> Result<(), FlashError> {
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        if addr >= FLASH_SIZE {
            return Err(FlashError::OutOfRange);
        }
        if addr % PAGE_SIZE != 0 {
            return Err(FlashError::Misaligned);
        }
        Ok(())
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashMemory for SimFlash {
    fn fill_word(&mut self, addr: u16, word: u16) {
        let slot = ((addr % PAGE_SIZE) / 2) as usize;
        self.state.borrow_mut().buffer[slot] = word;
    }

    fn clear_page_buffer(&mut self) {
        self.state.borrow_mut().buffer.fill(0xFFFF);
    }

    fn erase_page(&mut self, addr: u16) -> Result<(), FlashError> {
        let mut state = self.state.borrow_mut();
        Self::check(&mut state, addr)?;
        let start = addr as usize;
        state.memory[start..start + PAGE_SIZE as usize].fill(0xFF);
        state.log.push(FlashOp::Erase(addr));
        Ok(())
    }

    fn write_page(&mut self, addr: u16) -> Result<(), FlashError> {
        let mut state = self.state.borrow_mut();
        Self::check(&mut state, addr)?;
        let start = addr as usize;
        for slot in 0..(PAGE_SIZE / 2) as usize {
            let [lo, hi] = state.buffer[slot].to_le_bytes();
            state.memory[start + slot * 2] &= lo;
            state.memory[start + slot * 2 + 1] &= hi;
        }
        state.buffer.fill(0xFFFF);
        state.log.push(FlashOp::Write(addr));
        Ok(())
    }

    fn read_byte(&self, addr: u16) -> u8 {
        self.state
            .borrow()
            .memory
            .get(addr as usize)
            .copied()
            .unwrap_or(0xFF)
    }
}

/// Signature row of an ATtiny85 with factory fuses
#[derive(Debug, Clone, Copy)]
pub struct SimDevice {
    pub low_fuse: u8,
    pub high_fuse: u8,
    pub extended_fuse: u8,
    pub lock_bits: u8,
    /// Imprint table: sig0, cal 8 MHz, sig1, cal 6.4 MHz, sig2
    pub signature: [u8; 5],
    pub osccal: u8,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self {
            low_fuse: 0xE1,
            high_fuse: 0xDD,
            extended_fuse: 0xFE,
            lock_bits: 0xFF,
            signature: [0x1E, 0x8A, 0x93, 0x72, 0x0B],
            osccal: 0x8A,
        }
    }
}

impl DeviceInfo for SimDevice {
    fn low_fuse(&self) -> u8 {
        self.low_fuse
    }

    fn high_fuse(&self) -> u8 {
        self.high_fuse
    }

    fn extended_fuse(&self) -> u8 {
        self.extended_fuse
    }

    fn lock_bits(&self) -> u8 {
        self.lock_bits
    }

    fn signature_byte(&self, index: u8) -> u8 {
        self.signature.get(index as usize).copied().unwrap_or(0xFF)
    }

    fn osccal(&self) -> u8 {
        self.osccal
    }
}

/// Output pin recording its level and the number of level changes
#[derive(Clone, Default)]
pub struct SimPin {
    high: Rc<Cell<bool>>,
    changes: Rc<Cell<u32>>,
}

impl SimPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.get()
    }

    pub fn changes(&self) -> u32 {
        self.changes.get()
    }

    fn drive(&self, high: bool) {
        if self.high.get() != high {
            self.changes.set(self.changes.get() + 1);
        }
        self.high.set(high);
    }
}

impl OutputPin for SimPin {
    type Error = Infallible;

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_write_only_clears_bits() {
        let mut flash = SimFlash::new();
        flash.load(0x40, &[0x0F; 2]);
        flash.fill_word(0x40, 0xF0F0);
        flash.write_page(0x40).unwrap();
        assert_eq!(flash.read(0x40, 2), vec![0x00, 0x00]);
        assert!(flash.is_erased(0x42, 62));
        assert_eq!(flash.ops(), vec![FlashOp::Write(0x40)]);
    }

    #[test]
    fn rejects_misaligned_page() {
        let mut flash = SimFlash::new();
        assert_eq!(flash.erase_page(0x41), Err(FlashError::Misaligned));
        assert_eq!(flash.write_page(FLASH_SIZE), Err(FlashError::OutOfRange));
        assert!(flash.ops().is_empty());
    }

    #[test]
    fn injected_failure_is_one_shot() {
        let mut flash = SimFlash::new();
        flash.fail_next(FlashError::Busy);
        assert_eq!(flash.erase_page(0), Err(FlashError::Busy));
        assert_eq!(flash.erase_page(0), Ok(()));
    }
}
