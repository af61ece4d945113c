//! Self-programming flash and device identification

use ufmt::derive::uDebug;

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum FlashError {
    /// Address beyond the end of flash
    OutOfRange,
    /// Page operation on an address that is not page aligned
    Misaligned,
    /// A previous self-programming operation has not completed
    Busy,
}

/// Page-oriented access to the program memory.
///
/// Writes go through a temporary page buffer: words are filled into it and
/// committed with `write_page`. Flash cells can only be cleared by a write,
/// so a page must be erased before it takes arbitrary data.
pub trait FlashMemory {
    /// Load one little-endian word into the temporary buffer slot for `addr`
    fn fill_word(&mut self, addr: u16, word: u16);

    /// Reset every temporary buffer slot to the erased value
    fn clear_page_buffer(&mut self);

    fn erase_page(&mut self, addr: u16) -> Result<(), FlashError>;

    /// Commit the temporary buffer to the page at `addr`
    fn write_page(&mut self, addr: u16) -> Result<(), FlashError>;

    fn read_byte(&self, addr: u16) -> u8;

    fn read_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read_byte(addr), self.read_byte(addr.wrapping_add(1))])
    }
}

/// Fuse, lock and signature bytes plus the oscillator calibration
pub trait DeviceInfo {
    fn low_fuse(&self) -> u8;
    fn high_fuse(&self) -> u8;
    fn extended_fuse(&self) -> u8;
    fn lock_bits(&self) -> u8;
    /// Signature imprint table byte (0, 2, 4: signature; 1, 3: calibration)
    fn signature_byte(&self, index: u8) -> u8;
    /// Current OSCCAL register value
    fn osccal(&self) -> u8;
}

#[cfg(target_arch = "avr")]
pub use self::avr::Tiny85Flash;

#[cfg(target_arch = "avr")]
mod avr {
    use super::{DeviceInfo, FlashError, FlashMemory};
    use crate::config::{FLASH_SIZE, PAGE_SIZE};
    use avr_device::attiny85::CPU;
    use core::arch::asm;

    // SPMCSR command bits
    const SPMEN: u8 = 1 << 0;
    const PGERS: u8 = 1 << 1;
    const PGWRT: u8 = 1 << 2;
    const RFLB: u8 = 1 << 3;
    const CTPB: u8 = 1 << 4;
    const RSIG: u8 = 1 << 5;

    // Z-pointer addresses for fuse and lock bit reads
    const LOW_FUSE: u16 = 0x0000;
    const LOCK_BITS: u16 = 0x0001;
    const EXTENDED_FUSE: u16 = 0x0002;
    const HIGH_FUSE: u16 = 0x0003;

    /// Program memory accessed through `spm` and `lpm`
    pub struct Tiny85Flash {
        _private: (),
    }

    impl Tiny85Flash {
        pub fn new() -> Self {
            Self { _private: () }
        }

        #[inline(always)]
        fn spm_busy(&self) -> bool {
            let status: u8;
            unsafe {
                asm!("in {0}, 0x37", out(reg) status);
            }
            status & SPMEN != 0
        }

        #[inline(always)]
        fn spm(&mut self, command: u8, addr: u16) {
            unsafe {
                asm!(
                    "out 0x37, {cmd}",
                    "spm",
                    cmd = in(reg) command,
                    in("Z") addr,
                );
            }
        }

        fn spm_checked(&mut self, command: u8, addr: u16) -> Result<(), FlashError> {
            if addr >= FLASH_SIZE {
                return Err(FlashError::OutOfRange);
            }
            if addr % PAGE_SIZE != 0 {
                return Err(FlashError::Misaligned);
            }
            if self.spm_busy() {
                return Err(FlashError::Busy);
            }
            // The CPU halts until the operation completes
            self.spm(command, addr);
            Ok(())
        }

        #[inline(always)]
        fn read_lock_fuse(&self, addr: u16) -> u8 {
            let value: u8;
            unsafe {
                asm!(
                    "out 0x37, {cmd}",
                    "lpm {out}, Z",
                    cmd = in(reg) RFLB | SPMEN,
                    out = out(reg) value,
                    in("Z") addr,
                );
            }
            value
        }
    }

    impl FlashMemory for Tiny85Flash {
        fn fill_word(&mut self, addr: u16, word: u16) {
            // r1:r0 carries the word, r1 is restored as the zero register
            unsafe {
                asm!(
                    "movw r0, {data}",
                    "out 0x37, {cmd}",
                    "spm",
                    "clr r1",
                    data = in(reg_pair) word,
                    cmd = in(reg) SPMEN,
                    in("Z") addr,
                );
            }
        }

        fn clear_page_buffer(&mut self) {
            self.spm(CTPB | SPMEN, 0);
        }

        fn erase_page(&mut self, addr: u16) -> Result<(), FlashError> {
            self.spm_checked(PGERS | SPMEN, addr)
        }

        fn write_page(&mut self, addr: u16) -> Result<(), FlashError> {
            self.spm_checked(PGWRT | SPMEN, addr)
        }

        fn read_byte(&self, addr: u16) -> u8 {
            let value: u8;
            unsafe {
                asm!("lpm {0}, Z", out(reg) value, in("Z") addr);
            }
            value
        }
    }

    impl DeviceInfo for Tiny85Flash {
        fn low_fuse(&self) -> u8 {
            self.read_lock_fuse(LOW_FUSE)
        }

        fn high_fuse(&self) -> u8 {
            self.read_lock_fuse(HIGH_FUSE)
        }

        fn extended_fuse(&self) -> u8 {
            self.read_lock_fuse(EXTENDED_FUSE)
        }

        fn lock_bits(&self) -> u8 {
            self.read_lock_fuse(LOCK_BITS)
        }

        fn signature_byte(&self, index: u8) -> u8 {
            let value: u8;
            unsafe {
                asm!(
                    "out 0x37, {cmd}",
                    "lpm {out}, Z",
                    cmd = in(reg) RSIG | SPMEN,
                    out = out(reg) value,
                    in("Z") index as u16,
                );
            }
            value
        }

        fn osccal(&self) -> u8 {
            unsafe { (*CPU::ptr()).osccal.read().bits() }
        }
    }

    impl Default for Tiny85Flash {
        fn default() -> Self {
            Self::new()
        }
    }
}
