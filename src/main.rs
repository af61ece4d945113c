#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]

#[cfg(target_arch = "avr")]
use panic_halt as _;

use twiboot::Config;

#[cfg(target_arch = "avr")]
use avr_device::attiny85::Peripherals;
#[cfg(target_arch = "avr")]
use embedded_hal::watchdog::{WatchdogDisable, WatchdogEnable};
#[cfg(target_arch = "avr")]
use twiboot::drivers::StatusLed;
#[cfg(target_arch = "avr")]
use twiboot::hal::system::{disable_interrupts, jump_to};
#[cfg(target_arch = "avr")]
use twiboot::hal::{LedPin, Tiny85Flash, Usi, Watchdog, WatchdogTimeout};
#[cfg(target_arch = "avr")]
use twiboot::{Bootloader, Handoff};

const _: () = match Config::BUILD.validate() {
    Ok(()) => (),
    Err(_) => panic!("invalid bootloader configuration"),
};

#[cfg(target_arch = "avr")]
#[avr_device::entry]
fn main() -> ! {
    disable_interrupts();

    let dp = match Peripherals::take() {
        Some(dp) => dp,
        None => loop {},
    };

    let mut wdt = Watchdog::new(dp.WDT);
    wdt.disable();

    let config = Config::BUILD;
    let led = match StatusLed::new(LedPin::new()) {
        Ok(led) => led,
        Err(never) => match never {},
    };
    let mut bootloader = Bootloader::new(config, Usi::new(dp.USI), Tiny85Flash::new(), Tiny85Flash::new(), led);

    match bootloader.run() {
        // The trampoline continues at the application's own reset target
        Handoff::RunApplication => unsafe { jump_to(config.trampoline_addr() / 2) },
        Handoff::Restart { watchdog: true } => {
            wdt.start(WatchdogTimeout::Ms16);
            #[allow(clippy::empty_loop)]
            loop {}
        }
        Handoff::Restart { watchdog: false } => unsafe { jump_to(config.boot_start / 2) },
    }
}

// Host builds only run the library tests
#[cfg(not(target_arch = "avr"))]
fn main() {}
