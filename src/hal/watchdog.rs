//! ATtiny85 watchdog timer in system reset mode

use avr_device::attiny85::{CPU, WDT};
use embedded_hal::watchdog::{Watchdog as Feed, WatchdogDisable, WatchdogEnable};

// WDTCR
const WDCE: u8 = 1 << 4;
const WDE: u8 = 1 << 3;
const WDP3: u8 = 1 << 5;

// MCUSR
const WDRF: u8 = 1 << 3;

#[derive(Clone, Copy)]
#[repr(u8)]
pub enum WatchdogTimeout {
    Ms16 = 0,
    Ms32 = 1,
    Ms64 = 2,
    Ms125 = 3,
    Ms250 = 4,
    Ms500 = 5,
    Ms1000 = 6,
    Ms2000 = 7,
    Ms4000 = 8,
    Ms8000 = 9,
}

impl WatchdogTimeout {
    #[inline]
    fn prescaler_bits(self) -> u8 {
        let value = self as u8;
        // WDP3 sits apart from WDP2..0
        (value & 0x07) | if value & 0x08 != 0 { WDP3 } else { 0 }
    }
}

pub struct Watchdog {
    _private: (),
}

impl Watchdog {
    #[inline]
    pub fn new(_wdt: WDT) -> Self {
        Self { _private: () }
    }
}

impl WatchdogEnable for Watchdog {
    type Time = WatchdogTimeout;

    #[inline]
    fn start<T: Into<WatchdogTimeout>>(&mut self, period: T) {
        let timeout = period.into();
        unsafe {
            let p = WDT::ptr();
            // Timed sequence: change enable, then prescaler and reset mode
            (*p).wdtcr.write(|w| w.bits(WDCE | WDE));
            (*p).wdtcr.write(|w| w.bits(WDE | timeout.prescaler_bits()));
        }
    }
}

impl Feed for Watchdog {
    #[inline]
    fn feed(&mut self) {
        avr_device::asm::wdr();
    }
}

impl WatchdogDisable for Watchdog {
    #[inline]
    fn disable(&mut self) {
        unsafe {
            // WDE is forced on while the reset flag is set
            (*CPU::ptr()).mcusr.modify(|r, w| w.bits(r.bits() & !WDRF));
            let p = WDT::ptr();
            (*p).wdtcr.write(|w| w.bits(WDCE | WDE));
            (*p).wdtcr.write(|w| w.bits(0x00));
        }
    }
}
