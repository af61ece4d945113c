//! USI-TWI bootloader for ATtiny85.
//!
//! The bus transport, command dispatcher and flash page writer are written
//! against the traits in [`hal`], so the whole protocol runs on the host
//! under test. The AVR implementations live behind `target_arch = "avr"`.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

#[macro_use]
pub mod log;

pub mod bootloader;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod host;
pub mod protocol;

pub use bootloader::{Bootloader, Handoff};
pub use config::Config;
