//! SPI
//!
//! A transaction engine for one physical serial bus shared by several logical
//! peers. Each peer keeps its own [`Config`] and [`TransactionContext`]; the
//! [`Spi`] engine applies a config, runs one context's transfer at a time and
//! lets the caller block on completion.

/*
Supports full-duplex synchronous serial mode
Supports single-wire half-duplex mode
Master mode only
8-bit data frames
Clock frequencies sysclk/2 down to sysclk/256
Data order supports MSB or LSB first
Supports changing clock phase and polarity
Chip select is left to the peer driver
*/

use embedded_hal::digital;

mod config;
mod context;
mod engine;
mod phy;


pub use config::{BitOrder, ClockRate, Config, ConfigError, Duplex, SampleEdge};
pub use context::TransactionContext;
pub use engine::{Spi, State};
pub use phy::{BitBang, Phy};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The requested configuration can't be realized.
    Config(ConfigError),
    /// No configuration has been applied yet.
    NotConfigured,
    /// The transmit window runs past the end of the transmit buffer.
    TxOverflow,
    /// More bytes requested than the receive buffer holds.
    RxOverflow,
    /// The bytes touched belong to a transaction still in flight.
    Busy,
    /// A bus pin failed.
    Pin(digital::ErrorKind),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<digital::ErrorKind> for Error {
    fn from(kind: digital::ErrorKind) -> Self {
        Error::Pin(kind)
    }
}
