use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_TWI_ADDR: u8 = 11;
const DEFAULT_BOOT_START: u16 = 0x1A40;
const PAGE_SIZE: u16 = 64;

fn parse_u16(value: &str) -> Option<u16> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    println!("cargo:rerun-if-env-changed=TWIBOOT_TWI_ADDR");
    println!("cargo:rerun-if-env-changed=TWIBOOT_START");
    println!("cargo:rerun-if-changed=build.rs");

    // Bus address: 8..=35 belongs to bootloaders, 36..=63 to applications
    let mut twi_addr = env::var("TWIBOOT_TWI_ADDR")
        .ok()
        .and_then(|v| parse_u16(&v))
        .unwrap_or(DEFAULT_TWI_ADDR as u16);
    if !(8..=35).contains(&twi_addr) {
        println!(
            "cargo:warning=TWI address {} out of range (8 to 35), using {}",
            twi_addr, DEFAULT_TWI_ADDR
        );
        twi_addr = DEFAULT_TWI_ADDR as u16;
    }

    let boot_start = env::var("TWIBOOT_START")
        .ok()
        .and_then(|v| parse_u16(&v))
        .unwrap_or(DEFAULT_BOOT_START);
    if boot_start % PAGE_SIZE != 0 {
        panic!("TWIBOOT_START must be a multiple of the flash page size ({})", PAGE_SIZE);
    }

    let generated = format!(
        "/// Bus address selected at build time.\n\
         pub const TWI_ADDR: u8 = {};\n\
         /// Bootloader start (byte address) selected at build time.\n\
         pub const BOOT_START: u16 = {:#06x};\n",
        twi_addr, boot_start
    );
    fs::write(out_dir.join("build_config.rs"), generated).unwrap();

    // Only the firmware image needs the AVR link layout; host builds run the tests
    let target = env::var("TARGET").unwrap();
    if target.contains("avr") {
        println!("cargo:rustc-link-arg=-mmcu=attiny85");
        println!("cargo:rustc-link-arg=-Wl,--section-start=.text={:#x}", boot_start);
        println!("cargo:warning=Building bootloader for ATtiny85 at {:#06x}", boot_start);
    }
}
