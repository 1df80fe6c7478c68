use embedded_hal::spi::{Mode, Phase, Polarity};
use fugit::HertzU32 as Hertz;

use crate::gpio::Level;
use crate::rcc::{Clocks, Prescaler};

/// Order in which the bits of a byte are shifted onto the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

impl BitOrder {
    #[inline]
    const fn shift(self, n: u8) -> u8 {
        match self {
            BitOrder::MsbFirst => 7 - n,
            BitOrder::LsbFirst => n,
        }
    }

    /// Level of the `n`th bit of `byte` to go out on the wire.
    #[inline]
    pub(crate) fn wire_bit(self, byte: u8, n: u8) -> Level {
        Level::from((byte >> self.shift(n)) & 1)
    }

    /// Mask for the `n`th bit to come in off the wire.
    #[inline]
    pub(crate) const fn wire_mask(self, n: u8) -> u8 {
        1 << self.shift(n)
    }
}

/// Supported serial clock frequencies.
///
/// These are classes rather than arbitrary frequencies: each one has to come
/// out of the processor clock through an exact prescaler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockRate {
    Khz125,
    Khz250,
    Khz500,
    Mhz1,
    Mhz2,
    Mhz4,
    Mhz8,
}

impl ClockRate {
    pub const fn frequency(self) -> Hertz {
        let hz = match self {
            ClockRate::Khz125 => 125_000,
            ClockRate::Khz250 => 250_000,
            ClockRate::Khz500 => 500_000,
            ClockRate::Mhz1 => 1_000_000,
            ClockRate::Mhz2 => 2_000_000,
            ClockRate::Mhz4 => 4_000_000,
            ClockRate::Mhz8 => 8_000_000,
        };
        Hertz::from_raw(hz)
    }

    /// Half of one clock period, the time between two clock edges.
    pub const fn half_period_ns(self) -> u32 {
        500_000_000 / self.frequency().to_Hz()
    }
}

/// Which clock transition of a bit period latches the data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleEdge {
    /// Data is valid before the first edge and sampled on it.
    First,
    /// Data changes on the first edge and is sampled on the second.
    Second,
}

/// Whether transmit and receive have separate lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Duplex {
    /// Separate data out and data in lines, shifted in the same clocks.
    Full,
    /// One bidirectional data line: transmit first, then receive.
    Half,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Faster than `sysclk / 2`.
    ClockRateTooHigh,
    /// Slower than `sysclk / 256`.
    ClockRateTooLow,
    /// In range, but not `sysclk` divided by a power of two.
    ClockRateNotDerivable,
    /// Full duplex asked of a bus without a data input line.
    FullDuplexUnwired,
}

/// Wire format of one peer on the bus.
///
/// `idle_level` is the level the bus rests at between transfers: the clock
/// idles there (clock polarity) and so does the data out line, which is also
/// what a full duplex transfer shifts out once its transmit bytes run out.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub bit_order: BitOrder,
    pub clock_rate: ClockRate,
    pub idle_level: Level,
    pub sample_edge: SampleEdge,
    pub duplex: Duplex,
}

impl Default for Config {
    /// MSB first, 1 MHz, mode 0, full duplex
    fn default() -> Self {
        Self::new(BitOrder::MsbFirst, ClockRate::Mhz1)
    }
}

impl Config {
    pub const fn new(bit_order: BitOrder, clock_rate: ClockRate) -> Self {
        Self {
            bit_order,
            clock_rate,
            idle_level: Level::Low,
            sample_edge: SampleEdge::First,
            duplex: Duplex::Full,
        }
    }

    pub const fn with_idle_level(mut self, idle_level: Level) -> Self {
        self.idle_level = idle_level;
        self
    }

    pub const fn with_sample_edge(mut self, sample_edge: SampleEdge) -> Self {
        self.sample_edge = sample_edge;
        self
    }

    pub const fn with_duplex(mut self, duplex: Duplex) -> Self {
        self.duplex = duplex;
        self
    }

    /// Clock polarity and phase in `embedded-hal` terms.
    pub fn mode(&self) -> Mode {
        Mode {
            polarity: match self.idle_level {
                Level::Low => Polarity::IdleLow,
                Level::High => Polarity::IdleHigh,
            },
            phase: match self.sample_edge {
                SampleEdge::First => Phase::CaptureOnFirstTransition,
                SampleEdge::Second => Phase::CaptureOnSecondTransition,
            },
        }
    }

    /// The byte an idle data line reads as.
    pub const fn idle_byte(&self) -> u8 {
        match self.idle_level {
            Level::Low => 0x00,
            Level::High => 0xff,
        }
    }

    /// Check the clock rate against `clocks` and find its prescaler.
    pub fn validate(&self, clocks: &Clocks) -> Result<Prescaler, ConfigError> {
        let sysclk = clocks.sysclk.to_Hz();
        let rate = self.clock_rate.frequency().to_Hz();

        if rate > sysclk / Prescaler::MIN_DIVIDER {
            return Err(ConfigError::ClockRateTooHigh);
        }
        if rate < sysclk / Prescaler::MAX_DIVIDER {
            return Err(ConfigError::ClockRateTooLow);
        }
        clocks
            .derive(self.clock_rate.frequency())
            .ok_or(ConfigError::ClockRateNotDerivable)
    }
}
