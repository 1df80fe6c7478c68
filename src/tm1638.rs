//! TM1638 LED and key scan driver
//!
//! The TM1638 sits on a single-wire bus: clock, one bidirectional data line
//! and its own strobe. Data is LSB first, the clock idles high and bits are
//! latched on the rising edge. Display memory is 16 registers; on the common
//! "LED&KEY" boards even addresses hold the 7-segment digits and odd addresses
//! the discrete LEDs.
//!
//! ```ignore
//! static DISPLAY: Tm1638Context = Tm1638Context::new();
//!
//! let mut display = Tm1638::new(&DISPLAY, stb, delay)?;
//! display.init(&mut spi)?;
//! display.put_str(0, "HELLO 1.0");
//! display.flush(&mut spi)?;
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use heapless::Deque;

use crate::gpio::Level;
use crate::spi::{BitOrder, ClockRate, Config, Duplex, Error, Phy, SampleEdge, Spi, TransactionContext};

/// Command byte, 16 display registers.
pub type Tm1638Context = TransactionContext<17, 4>;

pub const DIGITS: usize = 8;

const CMD_DATA_WRITE: u8 = 0x40;
const CMD_READ_KEYS: u8 = 0x42;
const CMD_DISPLAY_OFF: u8 = 0x80;
const CMD_DISPLAY_ON: u8 = 0x88;
const CMD_ADDRESS: u8 = 0xc0;

const MAX_BRIGHTNESS: u8 = 7;
const DECIMAL_POINT: u8 = 0x80;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyEvent {
    Pressed(u8),
    Released(u8),
}

pub struct Tm1638<'a, STB, D> {
    ctx: &'a Tm1638Context,
    strobe: STB,
    delay: D,
    display: [u8; 16],
    brightness: u8,
    keys: u8,
    events: Deque<KeyEvent, 8>,
}

fn pin<E: digital::Error>(err: E) -> Error {
    Error::Pin(err.kind())
}

impl<'a, STB: OutputPin, D: DelayNs> Tm1638<'a, STB, D> {
    pub const CONFIG: Config = Config::new(BitOrder::LsbFirst, ClockRate::Mhz1)
        .with_idle_level(Level::High)
        .with_sample_edge(SampleEdge::Second)
        .with_duplex(Duplex::Half);

    pub fn new(ctx: &'a Tm1638Context, mut strobe: STB, delay: D) -> Result<Self, Error> {
        strobe.set_high().map_err(pin)?;

        Ok(Self {
            ctx,
            strobe,
            delay,
            display: [0; 16],
            brightness: MAX_BRIGHTNESS,
            keys: 0,
            events: Deque::new(),
        })
    }

    /// Display on at the current brightness, auto-increment writes, all
    /// registers cleared.
    pub fn init<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<(), Error> {
        self.display = [0; 16];
        self.flush(spi)?;
        self.command(spi, &[CMD_DISPLAY_ON | self.brightness])
    }

    /// Display on at `level`, 0 dimmest to 7 brightest.
    pub fn set_brightness<P: Phy, SD: DelayNs>(
        &mut self,
        spi: &mut Spi<'a, P, SD>,
        level: u8,
    ) -> Result<(), Error> {
        self.brightness = level.min(MAX_BRIGHTNESS);
        self.command(spi, &[CMD_DISPLAY_ON | self.brightness])
    }

    pub fn display_off<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<(), Error> {
        self.command(spi, &[CMD_DISPLAY_OFF])
    }

    /// Raw segments for digit `pos`. Takes effect on the next flush.
    pub fn set_digit(&mut self, pos: usize, segments: u8) {
        if let Some(reg) = pos.checked_mul(2).and_then(|i| self.display.get_mut(i)) {
            *reg = segments;
        }
    }

    pub fn set_led(&mut self, led: usize, on: bool) {
        let reg = led.checked_mul(2).and_then(|i| i.checked_add(1));
        if let Some(reg) = reg.and_then(|i| self.display.get_mut(i)) {
            *reg = on as u8;
        }
    }

    /// Write `s` from digit `pos` on, returning the digit after the last one
    /// written. A `.` lights the decimal point of the digit before it.
    pub fn put_str(&mut self, mut pos: usize, s: &str) -> usize {
        let mut last = None;
        for c in s.chars() {
            if c == '.' {
                if let Some(prev) = last.take() {
                    self.display[prev * 2] |= DECIMAL_POINT;
                    continue;
                }
            }
            if pos >= DIGITS {
                break;
            }
            self.set_digit(pos, segments(c));
            last = Some(pos);
            pos += 1;
        }
        pos
    }

    /// Push the shadow registers to the display.
    pub fn flush<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<(), Error> {
        self.command(spi, &[CMD_DATA_WRITE])?;

        let mut frame = [0; 17];
        frame[0] = CMD_ADDRESS;
        frame[1..].copy_from_slice(&self.display);
        self.command(spi, &frame)
    }

    /// Scan the keys. Bit `n` of the result is key `n`.
    pub fn read_keys<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<u8, Error> {
        self.select(spi)?;

        let scan = self.read_scan(spi);
        self.deselect()?;
        let scan = scan?;

        // Each scan byte carries two keys, in bits 0 and 4.
        let keys = scan.iter().enumerate().fold(0u8, |keys, (i, byte)| {
            let lo = (byte & 0x01) << (2 * i);
            let hi = ((byte >> 4) & 0x01) << (2 * i + 1);
            keys | lo | hi
        });
        trace!("tm1638: keys {=u8:#x}", keys);
        Ok(keys)
    }

    /// Scan the keys and queue an event for every key that changed.
    pub fn poll<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<(), Error> {
        let keys = self.read_keys(spi)?;
        let changed = keys ^ self.keys;
        self.keys = keys;

        for key in (0..8).filter(|k| changed & (1 << k) != 0) {
            let event = match keys & (1 << key) {
                0 => KeyEvent::Released(key),
                _ => KeyEvent::Pressed(key),
            };
            if self.events.push_back(event).is_err() {
                warn!("tm1638: key event dropped");
            }
        }
        Ok(())
    }

    pub fn next_key(&mut self) -> Option<KeyEvent> {
        self.events.pop_front()
    }

    pub fn free(self) -> (STB, D) {
        (self.strobe, self.delay)
    }

    fn read_scan<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<[u8; 4], Error> {
        self.load(&[CMD_READ_KEYS])?;
        spi.exchange(self.ctx)?;

        // Twait before the first key bit
        self.delay.delay_us(1);

        self.ctx.set_counts(0, 4);
        spi.exchange(self.ctx)?;

        let mut scan = [0; 4];
        self.ctx.read_rx(&mut scan);
        Ok(scan)
    }

    /// One command, framed by its own strobe pulse.
    fn command<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>, bytes: &[u8]) -> Result<(), Error> {
        self.select(spi)?;
        let result = self.load(bytes).and_then(|()| spi.exchange(self.ctx));
        self.deselect()?;
        result
    }

    fn load(&self, bytes: &[u8]) -> Result<(), Error> {
        self.ctx.write_tx(0, bytes)?;
        self.ctx.set_tx_offset(0);
        self.ctx.set_counts(bytes.len(), 0);
        Ok(())
    }

    /// Take the bus for this chip: finish whatever else is running, switch to
    /// our profile, strobe low.
    fn select<P: Phy, SD: DelayNs>(&mut self, spi: &mut Spi<'a, P, SD>) -> Result<(), Error> {
        spi.wait()?;
        spi.apply(Self::CONFIG)?;
        self.strobe.set_low().map_err(pin)?;
        self.delay.delay_ns(500);
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Error> {
        self.delay.delay_ns(500);
        self.strobe.set_high().map_err(pin)
    }
}

/// 7-segment pattern for `c`, blank if it has none.
pub fn segments(c: char) -> u8 {
    const NUMERALS: [u8; 10] = [0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f];

    match c {
        '0'..='9' => NUMERALS[c as usize - '0' as usize],
        'A' | 'a' => 0x77,
        'B' | 'b' => 0x7c,
        'C' => 0x39,
        'c' => 0x58,
        'D' | 'd' => 0x5e,
        'E' | 'e' => 0x79,
        'F' | 'f' => 0x71,
        'G' | 'g' => 0x3d,
        'H' => 0x76,
        'h' => 0x74,
        'I' | 'i' => 0x30,
        'J' | 'j' => 0x1e,
        'L' | 'l' => 0x38,
        'N' | 'n' => 0x54,
        'O' => 0x3f,
        'o' => 0x5c,
        'P' | 'p' => 0x73,
        'R' | 'r' => 0x50,
        'S' | 's' => 0x6d,
        'T' | 't' => 0x78,
        'U' => 0x3e,
        'u' => 0x1c,
        'Y' | 'y' => 0x6e,
        '-' => 0x40,
        '_' => 0x08,
        _ => 0x00,
    }
}
