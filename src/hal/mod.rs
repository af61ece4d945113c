//! Hardware access for the ATtiny85.
//!
//! `usi` and `flash` define the traits the bootloader engine is written
//! against; their register-level implementations and the remaining modules
//! only exist on the AVR target.

pub mod flash;
pub mod usi;

#[cfg(target_arch = "avr")]
pub mod gpio;
#[cfg(target_arch = "avr")]
pub mod system;
#[cfg(target_arch = "avr")]
pub mod watchdog;

#[cfg(test)]
pub mod sim;

pub use flash::{DeviceInfo, FlashError, FlashMemory};
pub use usi::UsiPort;

#[cfg(target_arch = "avr")]
pub use flash::Tiny85Flash;
#[cfg(target_arch = "avr")]
pub use gpio::LedPin;
#[cfg(target_arch = "avr")]
pub use usi::Usi;
#[cfg(target_arch = "avr")]
pub use watchdog::{Watchdog, WatchdogTimeout};
