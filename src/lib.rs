#![cfg_attr(not(test), no_std)]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

pub mod rcc;

pub mod delay;
pub mod gpio;

pub mod hexdump;
pub mod spi;
pub mod tm1638;

#[cfg(test)]
mod testing;
