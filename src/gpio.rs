//! GPIO
//!
//! Pin vocabulary shared by the bus drivers. Concrete pins come from the board
//! HAL through the `embedded-hal` digital traits; the only thing added here is
//! [`FlexPin`], for a line that has to change direction at run time.

use core::convert::Infallible;
use core::ops::Not;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

/// Pull setting for an input.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        match val {
            true => Self::High,
            false => Self::Low,
        }
    }
}

impl From<u8> for Level {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Low,
            _ => Self::High,
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        match level {
            Level::Low => false,
            Level::High => true,
        }
    }
}

impl From<Level> for PinState {
    fn from(level: Level) -> PinState {
        match level {
            Level::Low => PinState::Low,
            Level::High => PinState::High,
        }
    }
}

impl Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// GPIO flexible pin.
///
/// A line that can be switched between input and output while it is in use,
/// such as the shared data line of a single-wire bus. The output level latched
/// with `set_high`/`set_low` while in input mode is the level driven as soon
/// as the pin enters output mode.
pub trait FlexPin: InputPin + OutputPin {
    /// Put the pin into input mode, releasing the line.
    fn set_as_input(&mut self, pull: Pull) -> Result<(), Self::Error>;

    /// Put the pin into output mode.
    fn set_as_output(&mut self) -> Result<(), Self::Error>;
}

/// Placeholder for an input that isn't wired.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl InputPin for NoPin {
    #[inline]
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    #[inline]
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
