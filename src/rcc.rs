use fugit::HertzU32 as Hertz;

/// Internal RC oscillator, undivided.
pub const HSI_FREQUENCY: Hertz = Hertz::from_raw(16_000_000);

// Power on default: HSI / 8
const DEFAULT_FREQUENCY: Hertz = Hertz::from_raw(2_000_000);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Clocks {
    /// Processor clock, which also feeds the serial clock generator.
    pub sysclk: Hertz,
}

impl Clocks {
    pub const fn new(sysclk: Hertz) -> Self {
        Self { sysclk }
    }

    /// HSI with the divider cleared.
    pub const fn hsi() -> Self {
        Self::new(HSI_FREQUENCY)
    }

    /// The prescaler that turns `sysclk` into exactly `rate`, if there is one.
    pub fn derive(&self, rate: Hertz) -> Option<Prescaler> {
        let sysclk = self.sysclk.to_Hz();
        let rate = rate.to_Hz();

        if rate == 0 || sysclk % rate != 0 {
            return None;
        }
        Prescaler::from_divider(sysclk / rate)
    }
}

impl Default for Clocks {
    fn default() -> Self {
        Self::new(DEFAULT_FREQUENCY)
    }
}

/// Serial clock prescaler: `sysclk / 2` up to `sysclk / 256`, powers of two only.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Prescaler {
    shift: u8,
}

impl Prescaler {
    pub const MIN_DIVIDER: u32 = 2;
    pub const MAX_DIVIDER: u32 = 256;

    pub const fn from_divider(divider: u32) -> Option<Self> {
        if divider < Self::MIN_DIVIDER || divider > Self::MAX_DIVIDER || !divider.is_power_of_two() {
            return None;
        }
        Some(Self {
            shift: divider.trailing_zeros() as u8,
        })
    }

    #[inline]
    pub const fn divider(self) -> u32 {
        1 << self.shift
    }

    /// Baud rate control field: 0b000 = /2 ... 0b111 = /256
    #[inline]
    pub const fn bits(self) -> u8 {
        self.shift - 1
    }
}
