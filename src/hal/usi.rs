//! Universal Serial Interface in two-wire mode
//!
//! The bootloader runs with interrupts disabled, so the USI status flags
//! are polled from the main loop instead of raising vectors.

/// Register-level access to a USI peripheral wired to SDA/SCL.
///
/// The `detect_*` and `shift_*` methods each map to one control or status
/// register write. Composite operations are provided on top of them.
pub trait UsiPort {
    /// Start condition flag is set and the start detector is enabled
    fn start_condition_pending(&self) -> bool;
    /// 4-bit counter overflow flag is set and overflow handling is enabled
    fn counter_overflow_pending(&self) -> bool;

    fn data(&self) -> u8;
    fn set_data(&mut self, byte: u8);

    /// Drive (`true`) or float (`false`) the SDA line
    fn set_sda_output(&mut self, output: bool);
    fn scl_is_high(&self) -> bool;
    fn sda_is_high(&self) -> bool;

    /// Release both lines high and leave SDA as input
    fn init_lines(&mut self);

    /// Two-wire mode, start detector on, counter overflow off
    fn detect_start(&mut self);
    /// Two-wire mode holding SCL on overflow, start detector and overflow on
    fn detect_restart(&mut self);

    /// Clear every status flag and arm the counter for 8 bits
    fn shift_address_bits(&mut self);
    /// Clear every status flag except start and arm the counter for 8 bits
    fn shift_data_bits(&mut self);
    /// Clear every status flag except start and arm the counter for 1 bit
    fn shift_ack_bit(&mut self);

    /// Re-arm for the next start condition and address byte
    #[inline]
    fn wait_for_address(&mut self) {
        self.detect_start();
        self.shift_data_bits();
    }

    #[inline]
    fn send_byte(&mut self) {
        self.set_sda_output(true);
        self.shift_data_bits();
    }

    #[inline]
    fn receive_byte(&mut self) {
        self.set_sda_output(false);
        self.shift_data_bits();
    }

    #[inline]
    fn send_ack(&mut self) {
        self.set_data(0);
        self.set_sda_output(true);
        self.shift_ack_bit();
    }

    #[inline]
    fn receive_ack(&mut self) {
        self.set_data(0);
        self.set_sda_output(false);
        self.shift_ack_bit();
    }
}

#[cfg(target_arch = "avr")]
pub use self::avr::Usi;

#[cfg(target_arch = "avr")]
mod avr {
    use super::UsiPort;
    use avr_device::attiny85::{PORTB, USI};
    use core::marker::PhantomData;

    const SDA: u8 = 0; // PB0
    const SCL: u8 = 2; // PB2

    // USISR
    const USISIF: u8 = 7;
    const USIOIF: u8 = 6;
    const USIPF: u8 = 5;
    const USIDC: u8 = 4;

    // USICR
    const USISIE: u8 = 7;
    const USIOIE: u8 = 6;
    const USIWM1: u8 = 5;
    const USIWM0: u8 = 4;
    const USICS1: u8 = 3;

    /// USI on PB0 (SDA) and PB2 (SCL)
    pub struct Usi {
        _usi: PhantomData<USI>,
    }

    impl Usi {
        pub fn new(_usi: USI) -> Self {
            Self { _usi: PhantomData }
        }

        #[inline(always)]
        fn usisr(&self) -> u8 {
            unsafe { (*USI::ptr()).usisr.read().bits() }
        }

        #[inline(always)]
        fn usicr(&self) -> u8 {
            unsafe { (*USI::ptr()).usicr.read().bits() }
        }

        #[inline(always)]
        fn pinb(&self) -> u8 {
            unsafe { (*PORTB::ptr()).pinb.read().bits() }
        }
    }

    impl UsiPort for Usi {
        #[inline(always)]
        fn start_condition_pending(&self) -> bool {
            self.usisr() & (1 << USISIF) != 0 && self.usicr() & (1 << USISIE) != 0
        }

        #[inline(always)]
        fn counter_overflow_pending(&self) -> bool {
            self.usisr() & (1 << USIOIF) != 0 && self.usicr() & (1 << USIOIE) != 0
        }

        #[inline(always)]
        fn data(&self) -> u8 {
            unsafe { (*USI::ptr()).usidr.read().bits() }
        }

        #[inline(always)]
        fn set_data(&mut self, byte: u8) {
            unsafe { (*USI::ptr()).usidr.write(|w| w.bits(byte)) }
        }

        #[inline(always)]
        fn set_sda_output(&mut self, output: bool) {
            unsafe {
                (*PORTB::ptr()).ddrb.modify(|r, w| {
                    if output {
                        w.bits(r.bits() | (1 << SDA))
                    } else {
                        w.bits(r.bits() & !(1 << SDA))
                    }
                });
            }
        }

        #[inline(always)]
        fn scl_is_high(&self) -> bool {
            self.pinb() & (1 << SCL) != 0
        }

        #[inline(always)]
        fn sda_is_high(&self) -> bool {
            self.pinb() & (1 << SDA) != 0
        }

        fn init_lines(&mut self) {
            unsafe {
                let p = PORTB::ptr();
                (*p).ddrb.modify(|r, w| w.bits(r.bits() | (1 << SDA) | (1 << SCL)));
                (*p).portb.modify(|r, w| w.bits(r.bits() | (1 << SDA) | (1 << SCL)));
                (*p).ddrb.modify(|r, w| w.bits(r.bits() & !(1 << SDA)));
            }
        }

        #[inline(always)]
        fn detect_start(&mut self) {
            // External positive edge clock, SCL not held on overflow
            unsafe {
                (*USI::ptr())
                    .usicr
                    .write(|w| w.bits((1 << USISIE) | (1 << USIWM1) | (1 << USICS1)));
            }
        }

        #[inline(always)]
        fn detect_restart(&mut self) {
            unsafe {
                (*USI::ptr()).usicr.write(|w| {
                    w.bits((1 << USISIE) | (1 << USIOIE) | (1 << USIWM1) | (1 << USIWM0) | (1 << USICS1))
                });
            }
        }

        #[inline(always)]
        fn shift_address_bits(&mut self) {
            unsafe {
                (*USI::ptr())
                    .usisr
                    .write(|w| w.bits((1 << USISIF) | (1 << USIOIF) | (1 << USIPF) | (1 << USIDC)));
            }
        }

        #[inline(always)]
        fn shift_data_bits(&mut self) {
            unsafe {
                (*USI::ptr())
                    .usisr
                    .write(|w| w.bits((1 << USIOIF) | (1 << USIPF) | (1 << USIDC)));
            }
        }

        #[inline(always)]
        fn shift_ack_bit(&mut self) {
            // Counter preset to 14: two edges left before overflow
            unsafe {
                (*USI::ptr())
                    .usisr
                    .write(|w| w.bits((1 << USIOIF) | (1 << USIPF) | (1 << USIDC) | 0x0E));
            }
        }
    }
}
