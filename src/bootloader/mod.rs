//! Bootloader main loop
//!
//! Each [`Bootloader::poll`] pass services the USI flags and then, only once
//! the handshake is complete and the master has just ended a read with a
//! NACK, runs at most one slow operation: whole-flash erase, application
//! exit or page commit, in that order.

pub mod dispatcher;
pub mod page_writer;
pub mod state;


use embedded_hal::digital::v2::OutputPin;
use ufmt::derive::uDebug;

pub use dispatcher::Dispatcher;
pub use page_writer::{reset_jump_word, trampoline_word, PageWriter};
pub use state::{BootloaderState, Flag, Flags};

use crate::config::Config;
use crate::drivers::StatusLed;
use crate::hal::flash::{DeviceInfo, FlashMemory};
use crate::hal::usi::UsiPort;
use crate::protocol::UsiTwiSlave;

/// How control leaves the bootloader
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Handoff {
    /// Jump to the trampoline, which continues at the application entry
    RunApplication,
    /// Start over, through a watchdog reset or a jump to the bootloader start
    Restart { watchdog: bool },
}

pub struct Bootloader<U, F, D, L> {
    config: Config,
    transport: UsiTwiSlave<U>,
    flash: F,
    device: D,
    led: StatusLed<L>,
    state: BootloaderState,
    led_delay: u16,
    exit_delay: u8,
    initialized: bool,
}

impl<U, F, D, L> Bootloader<U, F, D, L>
where
    U: UsiPort,
    F: FlashMemory,
    D: DeviceInfo,
    L: OutputPin,
{
    pub fn new(config: Config, usi: U, mut flash: F, device: D, led: StatusLed<L>) -> Self {
        flash.clear_page_buffer();
        Self {
            transport: UsiTwiSlave::new(usi, config.twi_addr),
            flash,
            device,
            led,
            state: BootloaderState::new(),
            led_delay: config.led_delay,
            exit_delay: config.exit_delay,
            initialized: false,
            config,
        }
    }

    /// Poll until a handoff is requested
    pub fn run(&mut self) -> Handoff {
        loop {
            if let Some(handoff) = self.poll() {
                return handoff;
            }
        }
    }

    /// One main-loop pass
    pub fn poll(&mut self) -> Option<Handoff> {
        let mut dispatcher = Dispatcher::new(&self.config, &mut self.state, &mut self.flash, &self.device);
        if self.transport.poll(&mut dispatcher).is_ok() {
            self.state.flags.set(Flag::SlowOpsReady);
        }
        let slow_ops_ready = self.state.flags.take(Flag::SlowOpsReady);

        if !self.state.is_initialized(self.config.two_step_init) {
            return self.idle_pass();
        }
        if !self.initialized {
            self.initialized = true;
            tml_log!(info, "handshake complete");
            self.led_off();
        }
        if slow_ops_ready {
            self.slow_ops()
        } else {
            None
        }
    }

    /// A pending erase always wins over an application launch, and a page
    /// that fails to commit is erased in the same pass.
    fn slow_ops(&mut self) -> Option<Handoff> {
        if self.state.flags.contains(Flag::DeleteFlash) {
            self.begin_slow_op();
            return Some(self.safety_erase());
        }

        if self.state.flags.contains(Flag::ExitToApp) {
            self.begin_slow_op();
            tml_log!(info, "exit to application");
            return Some(Handoff::RunApplication);
        }

        if self.page_writer().page_ready() {
            self.begin_slow_op();
            self.led_toggle();
            if let Err(error) = self.page_writer().commit() {
                tml_log!(error, "page commit failed: {}", error);
                self.state.flags.set(Flag::DeleteFlash);
            }
            if self.state.flags.contains(Flag::DeleteFlash) {
                return Some(self.safety_erase());
            }
        }
        None
    }

    fn safety_erase(&mut self) -> Handoff {
        self.led_on();
        tml_log!(warn, "erasing application");
        if let Err(error) = self.page_writer().erase_application() {
            tml_log!(error, "erase failed: {}", error);
        }
        Handoff::Restart {
            watchdog: self.config.use_wdt_reset,
        }
    }

    /// Not initialized: blink and count down to the application autorun.
    /// The first blink comes after `led_delay` passes, the next ones every
    /// `led_period + 1` passes.
    fn idle_pass(&mut self) -> Option<Handoff> {
        if self.led_delay > 0 {
            self.led_delay -= 1;
            return None;
        }
        self.led_delay = self.config.led_period;
        self.led_toggle();

        if self.config.app_autorun {
            if self.exit_delay == 0 {
                tml_log!(info, "no handshake, starting application");
                return Some(Handoff::RunApplication);
            }
            self.exit_delay -= 1;
        }
        None
    }

    #[inline]
    fn begin_slow_op(&self) {
        debug_assert!(self.transport.is_idle(), "slow operation inside a bus transaction");
    }

    fn page_writer(&mut self) -> PageWriter<'_, F> {
        PageWriter::new(&self.config, &mut self.state, &mut self.flash)
    }

    fn led_on(&mut self) {
        if self.config.enable_led_ui {
            let _ = self.led.on();
        }
    }

    fn led_off(&mut self) {
        if self.config.enable_led_ui {
            let _ = self.led.off();
        }
    }

    fn led_toggle(&mut self) {
        if self.config.enable_led_ui {
            let _ = self.led.toggle();
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &BootloaderState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized(self.config.two_step_init)
    }

    /// Transport is between transactions, waiting for a start condition
    pub fn is_transport_idle(&self) -> bool {
        self.transport.is_idle()
    }
}
