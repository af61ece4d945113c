//! Control transfer out of the bootloader

use core::arch::asm;

/// Globally disable interrupts. The bootloader never re-enables them.
#[inline(always)]
pub fn disable_interrupts() {
    avr_device::interrupt::disable();
}

/// Jump to the instruction at word address `word_addr`
///
/// # Safety
///
/// The target must hold valid code. Nothing of the bootloader's state
/// survives the jump.
#[inline(always)]
pub unsafe fn jump_to(word_addr: u16) -> ! {
    asm!("ijmp", in("Z") word_addr, options(noreturn));
}
