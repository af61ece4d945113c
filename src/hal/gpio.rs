//! PORTB output pins for the ATtiny85

use avr_device::attiny85::PORTB;
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::digital::v2::OutputPin;

/// PORTB pin `P` configured as a push-pull output
pub struct OutputPb<const P: u8> {
    _port: PhantomData<PORTB>,
}

impl<const P: u8> OutputPb<P> {
    pub fn new() -> Self {
        unsafe {
            (*PORTB::ptr()).ddrb.modify(|r, w| w.bits(r.bits() | (1 << P)));
        }
        Self { _port: PhantomData }
    }
}

impl<const P: u8> OutputPin for OutputPb<P> {
    type Error = Infallible;

    #[inline]
    fn set_high(&mut self) -> Result<(), Self::Error> {
        unsafe {
            (*PORTB::ptr()).portb.modify(|r, w| w.bits(r.bits() | (1 << P)));
        }
        Ok(())
    }

    #[inline]
    fn set_low(&mut self) -> Result<(), Self::Error> {
        unsafe {
            (*PORTB::ptr()).portb.modify(|r, w| w.bits(r.bits() & !(1 << P)));
        }
        Ok(())
    }
}

/// Status LED on PB1
pub type LedPin = OutputPb<1>;
