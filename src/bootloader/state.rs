//! Mutable bootloader state shared by the dispatcher and the scheduler

/// Independent status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[repr(u8)]
pub enum Flag {
    /// Get-Version received
    Init1 = 0,
    /// Soft-Init received
    Init2 = 1,
    /// Whole-application erase pending
    DeleteFlash = 2,
    /// Application launch pending
    ExitToApp = 3,
    /// A bus transaction just completed
    SlowOpsReady = 4,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    #[inline]
    pub fn set(&mut self, flag: Flag) {
        self.0 |= 1 << flag as u8;
    }

    #[inline]
    pub fn clear(&mut self, flag: Flag) {
        self.0 &= !(1 << flag as u8);
    }

    #[inline]
    pub fn contains(&self, flag: Flag) -> bool {
        self.0 & (1 << flag as u8) != 0
    }

    /// Clear `flag`, returning whether it was set
    #[inline]
    pub fn take(&mut self, flag: Flag) -> bool {
        let set = self.contains(flag);
        self.clear(flag);
        set
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootloaderState {
    /// Destination of the next page commit, always page aligned
    pub page_addr: u16,
    /// Bytes staged in the page buffer
    pub page_ix: u8,
    pub flags: Flags,
    /// Application reset vector captured from the first word of page 0
    pub app_reset_lsb: u8,
    pub app_reset_msb: u8,
}

impl BootloaderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_reset(&self) -> u16 {
        u16::from_le_bytes([self.app_reset_lsb, self.app_reset_msb])
    }

    /// Handshake complete: Get-Version, plus Soft-Init when two-step
    pub fn is_initialized(&self, two_step: bool) -> bool {
        self.flags.contains(Flag::Init1) && (!two_step || self.flags.contains(Flag::Init2))
    }
}
