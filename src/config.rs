//! Build-time configuration for the bootloader

use ufmt::derive::uDebug;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/build_config.rs"));
}

/// Flash page size on the ATtiny85, in bytes
pub const PAGE_SIZE: u16 = 64;

/// Total flash size on the ATtiny85, in bytes
pub const FLASH_SIZE: u16 = 8192;

/// Page holding the interrupt vector table
pub const RESET_PAGE: u16 = 0x0000;

/// Receive ring buffer capacity (power of two)
pub const TWI_RX_BUFFER_SIZE: usize = 128;

/// Transmit ring buffer capacity (power of two)
pub const TWI_TX_BUFFER_SIZE: usize = 128;

/// Largest command frame the transport hands to the dispatcher
pub const FRAME_CAPACITY: usize = TWI_RX_BUFFER_SIZE;

/// Consecutive Read-Flash checksum mismatches a dump tolerates
pub const MAX_CHECKSUM_ERRORS: u8 = 3;

/// Idle passes before the first LED toggle while waiting for the handshake
pub const SHORT_LED_DLY: u16 = 0xFF;

/// Idle passes between the following toggles (the 16-bit counter wraps)
pub const LONG_LED_DLY: u16 = 0xFFFF;

/// LED toggles before the application is started when autorun is enabled
pub const SHORT_EXIT_DLY: u8 = 0x0A;

/// Bootloader version reported by Get-Version
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 6;

/// Signature character reported by Get-Version ('T')
pub const SIGNATURE: u8 = 84;

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ConfigError {
    /// Bootloader start is not page aligned or lies outside flash
    BadBootStart,
    /// Bus address outside the bootloader range (8..=35)
    BadAddress,
    /// Packet sizes must be even, non-zero and fit the page/buffers
    BadPacketSize,
    /// Without automatic page addressing the remote side must set addresses
    MissingPageAddressing,
}

/// Bootloader configuration.
///
/// On the target this is always [`Config::BUILD`], so every feature check
/// folds to a constant. Tests build variants to exercise each option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub twi_addr: u8,
    /// Bootloader start, byte address
    pub boot_start: u16,
    pub page_size: u16,
    /// Data bytes carried by one Write-Page-Data frame
    pub mst_packet_size: u8,
    /// Largest Read-Flash reply payload
    pub slv_packet_size: u8,
    /// Idle passes before the first blink
    pub led_delay: u16,
    /// Reload value after each blink
    pub led_period: u16,
    /// Blinks before autorun starts the application
    pub exit_delay: u8,

    // Feature byte
    pub enable_led_ui: bool,
    pub auto_page_addr: bool,
    pub app_use_tpl_pg: bool,
    pub cmd_setpgaddr: bool,
    pub two_step_init: bool,
    pub use_wdt_reset: bool,
    pub app_autorun: bool,
    pub cmd_readflash: bool,

    // Extended feature byte
    pub force_erase_pg: bool,
    pub cmd_readdevs: bool,
    pub check_empty_fl: bool,
}

impl Config {
    /// Configuration selected by Cargo features and `build.rs`
    pub const BUILD: Config = Config {
        twi_addr: generated::TWI_ADDR,
        boot_start: generated::BOOT_START,
        page_size: PAGE_SIZE,
        mst_packet_size: 32,
        slv_packet_size: 32,
        led_delay: SHORT_LED_DLY,
        led_period: LONG_LED_DLY,
        exit_delay: SHORT_EXIT_DLY,
        enable_led_ui: cfg!(feature = "led-ui"),
        auto_page_addr: cfg!(feature = "auto-page-addr"),
        app_use_tpl_pg: cfg!(feature = "app-use-tpl-pg"),
        cmd_setpgaddr: cfg!(feature = "cmd-setpgaddr"),
        two_step_init: cfg!(feature = "two-step-init"),
        use_wdt_reset: cfg!(feature = "use-wdt-reset"),
        app_autorun: cfg!(feature = "app-autorun"),
        cmd_readflash: cfg!(feature = "cmd-readflash"),
        force_erase_pg: cfg!(feature = "force-erase-pg"),
        cmd_readdevs: cfg!(feature = "cmd-readdevs"),
        check_empty_fl: cfg!(feature = "check-empty-fl"),
    };

    /// Checked at compile time for [`Config::BUILD`] by the firmware entry
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0
            || !self.page_size.is_power_of_two()
            || self.boot_start % self.page_size != 0
            || self.boot_start < 2 * self.page_size
            || self.boot_start >= FLASH_SIZE
        {
            return Err(ConfigError::BadBootStart);
        }
        if self.twi_addr < 8 || self.twi_addr > 35 {
            return Err(ConfigError::BadAddress);
        }
        let mst = self.mst_packet_size as u16;
        if mst == 0 || mst % 2 != 0 || mst > self.page_size || self.page_size % mst != 0 {
            return Err(ConfigError::BadPacketSize);
        }
        // ack + data + checksum must fit the transmit buffer
        if self.slv_packet_size == 0 || self.slv_packet_size as usize + 2 > TWI_TX_BUFFER_SIZE {
            return Err(ConfigError::BadPacketSize);
        }
        if !self.auto_page_addr && !self.cmd_setpgaddr {
            return Err(ConfigError::MissingPageAddressing);
        }
        Ok(())
    }

    /// Feature byte as reported by Get-Version
    pub const fn features(&self) -> u8 {
        (self.enable_led_ui as u8)
            | (self.auto_page_addr as u8) << 1
            | (self.app_use_tpl_pg as u8) << 2
            | (self.cmd_setpgaddr as u8) << 3
            | (self.two_step_init as u8) << 4
            | (self.use_wdt_reset as u8) << 5
            | (self.app_autorun as u8) << 6
            | (self.cmd_readflash as u8) << 7
    }

    /// Extended feature byte as reported by Get-Version.
    /// Bit 3 (page index check) is always set.
    pub const fn ext_features(&self) -> u8 {
        (self.force_erase_pg as u8) << 1
            | 1 << 3
            | (self.cmd_readdevs as u8) << 4
            | (self.check_empty_fl as u8) << 6
    }

    /// First byte of the page reserved for the trampoline
    pub const fn trampoline_page(&self) -> u16 {
        self.boot_start - self.page_size
    }

    /// Byte address of the trampoline instruction (last slot before the bootloader)
    pub const fn trampoline_addr(&self) -> u16 {
        self.boot_start - 2
    }

    /// Highest page address (exclusive) the application may occupy
    pub const fn app_limit(&self) -> u16 {
        if self.app_use_tpl_pg || !self.auto_page_addr {
            self.boot_start
        } else {
            self.boot_start - self.page_size
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::BUILD
    }
}
