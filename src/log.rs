//! Logging front end.
//!
//! `tml_log!` forwards to `defmt` when the `defmt-log` feature is enabled.
//! Otherwise the arguments are evaluated and dropped, so the bootloader image
//! carries no formatting code.

#[cfg(not(feature = "defmt-log"))]
#[macro_export]
macro_rules! tml_log {
    ($level:ident, $($arg:expr),*) => { { $( let _ = $arg; )* } }
}

#[cfg(feature = "defmt-log")]
#[macro_export]
macro_rules! tml_log {
    (trace, $($arg:expr),*) => { defmt::trace!($($arg),*); };
    (debug, $($arg:expr),*) => { defmt::debug!($($arg),*); };
    (info, $($arg:expr),*) => { defmt::info!($($arg),*); };
    (warn, $($arg:expr),*) => { defmt::warn!($($arg),*); };
    (error, $($arg:expr),*) => { defmt::error!($($arg),*); };
}
