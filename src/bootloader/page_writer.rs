//! Page staging, flash commits and the application trampoline
//!
//! The application's reset vector never reaches flash. Page 0 is written with
//! a jump into the bootloader, and the original target is reached through a
//! relative jump ("trampoline") stored in the last word before the bootloader.

use super::state::{BootloaderState, Flag};
use crate::config::{Config, RESET_PAGE};
use crate::hal::flash::{FlashError, FlashMemory};

/// Base opcode of `rjmp k`
const RJMP: u16 = 0xC000;

/// 12-bit displacement field of `rjmp`
const RJMP_MASK: u16 = 0x0FFF;

const ERASED_WORD: u16 = 0xFFFF;

/// Relative jump placed at `boot_start_word - 1` that lands on the target of
/// the application's original reset instruction `app_reset` (itself an
/// `rjmp` at word 0).
pub fn trampoline_word(boot_start_word: u16, app_reset: u16) -> u16 {
    let target = app_reset.wrapping_add(1) & RJMP_MASK;
    (boot_start_word.wrapping_sub(target).wrapping_neg() & RJMP_MASK) | RJMP
}

/// `rjmp` written at word 0 so a reset always enters the bootloader
pub fn reset_jump_word(boot_start: u16) -> u16 {
    RJMP + ((boot_start / 2 - 1) & RJMP_MASK)
}

pub struct PageWriter<'a, F> {
    config: &'a Config,
    state: &'a mut BootloaderState,
    flash: &'a mut F,
}

impl<'a, F: FlashMemory> PageWriter<'a, F> {
    pub fn new(config: &'a Config, state: &'a mut BootloaderState, flash: &'a mut F) -> Self {
        Self {
            config,
            state,
            flash,
        }
    }

    /// Copy little-endian word pairs from `data` into the page buffer and
    /// return their sum. At the reset vector the first word is captured and
    /// replaced by a jump to the bootloader; it still counts in the sum.
    pub fn stage(&mut self, data: &[u8]) -> u8 {
        let mut sum = 0u8;
        let mut data = data;

        if self.state.page_addr.wrapping_add(self.state.page_ix as u16) == RESET_PAGE && data.len() >= 2 {
            self.state.app_reset_lsb = data[0];
            self.state.app_reset_msb = data[1];
            self.flash.fill_word(RESET_PAGE, reset_jump_word(self.config.boot_start));
            sum = sum.wrapping_add(data[0]).wrapping_add(data[1]);
            self.state.page_ix = self.state.page_ix.saturating_add(2);
            data = &data[2..];
            tml_log!(debug, "reset vector {=u16:#x} captured", self.state.app_reset());
        }

        for pair in data.chunks_exact(2) {
            if (self.state.page_ix as u16) < self.config.page_size {
                let addr = self.state.page_addr + self.state.page_ix as u16;
                self.flash.fill_word(addr, u16::from_le_bytes([pair[0], pair[1]]));
            }
            sum = sum.wrapping_add(pair[0]).wrapping_add(pair[1]);
            self.state.page_ix = self.state.page_ix.saturating_add(2);
        }
        sum
    }

    /// Page buffer is full and its destination belongs to the application
    pub fn page_ready(&self) -> bool {
        self.state.page_ix as u16 == self.config.page_size && self.state.page_addr < self.config.app_limit()
    }

    pub fn trampoline(&self) -> u16 {
        trampoline_word(self.config.boot_start / 2, self.state.app_reset())
    }

    /// Write the staged page. A page that fails the trampoline check marks
    /// the application for deletion; flash errors are returned.
    pub fn commit(&mut self) -> Result<(), FlashError> {
        let page = self.state.page_addr;
        let result = self.write_staged(page);
        self.state.page_ix = 0;
        result
    }

    fn write_staged(&mut self, page: u16) -> Result<(), FlashError> {
        if self.config.force_erase_pg {
            self.flash.erase_page(page)?;
        }
        self.flash.write_page(page)?;
        tml_log!(debug, "page {=u16:#x} written", page);

        if self.config.auto_page_addr {
            if page == RESET_PAGE {
                self.install_trampoline()?;
            }
            if self.config.app_use_tpl_pg && page == self.config.trampoline_page() {
                self.verify_trampoline()?;
            }
            self.state.page_addr = page + self.config.page_size;
        }
        Ok(())
    }

    /// Rebuild the trampoline page: erased words plus the trampoline in the
    /// last slot
    pub fn install_trampoline(&mut self) -> Result<(), FlashError> {
        let page = self.config.trampoline_page();
        let tpl = self.trampoline();
        self.flash.erase_page(page)?;
        let mut addr = page;
        while addr < self.config.trampoline_addr() {
            self.flash.fill_word(addr, ERASED_WORD);
            addr += 2;
        }
        self.flash.fill_word(self.config.trampoline_addr(), tpl);
        self.flash.write_page(page)?;
        tml_log!(info, "trampoline {=u16:#x} installed", tpl);
        Ok(())
    }

    /// The application wrote the trampoline page: keep the trampoline if the
    /// slot was left alone, re-install it if erased, otherwise the image is
    /// unsafe to run.
    fn verify_trampoline(&mut self) -> Result<(), FlashError> {
        let tpl = self.trampoline();
        let slot = self.flash.read_word(self.config.trampoline_addr());
        if slot == tpl {
            return Ok(());
        }
        if slot == ERASED_WORD {
            self.flash.clear_page_buffer();
            self.flash.fill_word(self.config.trampoline_addr(), tpl);
            self.flash.write_page(self.config.trampoline_page())?;
            tml_log!(info, "trampoline {=u16:#x} re-installed", tpl);
            return Ok(());
        }
        tml_log!(warn, "application overwrites trampoline slot");
        self.state.flags.set(Flag::DeleteFlash);
        Ok(())
    }

    /// Erase every page below the bootloader, trampoline page included
    pub fn erase_application(&mut self) -> Result<(), FlashError> {
        let mut result = Ok(());
        let mut page = self.config.boot_start;
        while page != RESET_PAGE {
            page -= self.config.page_size;
            result = result.and(self.flash.erase_page(page));
        }
        self.state.page_addr = RESET_PAGE;
        self.state.page_ix = 0;
        result
    }
}
