use embedded_hal::digital::{Error as _, ErrorKind, InputPin, OutputPin, PinState};

use super::Duplex;
use crate::gpio::{FlexPin, Level, NoPin, Pull};

/// Line-level access to the bus.
///
/// The engine only ever asks for one clock or data line change at a time; the
/// bit timing between those changes is the engine's business.
pub trait Phy {
    /// Set the clock line.
    fn set_clock(&mut self, level: Level) -> Result<(), ErrorKind>;

    /// Drive the data out line, turning it into an output if it was released.
    fn drive(&mut self, level: Level) -> Result<(), ErrorKind>;

    /// Stop driving the data out line and leave it as an input.
    fn release(&mut self) -> Result<(), ErrorKind>;

    /// Read the line data comes in on: the dedicated input in full duplex,
    /// the shared line in half duplex.
    fn sample(&mut self, duplex: Duplex) -> Result<Level, ErrorKind>;

    /// Whether the data out line is currently an output.
    fn is_driving(&self) -> bool;

    /// Whether a separate data input line is wired up.
    fn has_input_line(&self) -> bool;
}

/// Bit-banged bus on plain GPIO pins.
///
/// `sdo` is the data out line (MOSI), which doubles as the bidirectional data
/// line in half duplex, so it has to be able to change direction. `sdi` is the
/// data in line (MISO), absent on single-wire buses.
pub struct BitBang<SCK, SDO, SDI = NoPin> {
    sck: SCK,
    sdo: SDO,
    sdi: Option<SDI>,
    driving: bool,
}

impl<SCK, SDO, SDI> BitBang<SCK, SDO, SDI>
where
    SCK: OutputPin,
    SDO: FlexPin,
    SDI: InputPin,
{
    /// Four wire bus (chip select is the peer driver's). The data out line
    /// starts released until a configuration is applied.
    pub fn new(sck: SCK, sdo: SDO, sdi: SDI) -> Result<Self, ErrorKind> {
        Self::new_inner(sck, sdo, Some(sdi))
    }

    fn new_inner(sck: SCK, mut sdo: SDO, sdi: Option<SDI>) -> Result<Self, ErrorKind> {
        sdo.set_as_input(Pull::None).map_err(|e| e.kind())?;

        Ok(Self {
            sck,
            sdo,
            sdi,
            driving: false,
        })
    }

    pub fn free(self) -> (SCK, SDO, Option<SDI>) {
        (self.sck, self.sdo, self.sdi)
    }
}

impl<SCK, SDO> BitBang<SCK, SDO, NoPin>
where
    SCK: OutputPin,
    SDO: FlexPin,
{
    /// Single-wire bus: clock plus one bidirectional data line.
    pub fn single_wire(sck: SCK, sdio: SDO) -> Result<Self, ErrorKind> {
        Self::new_inner(sck, sdio, None)
    }
}

impl<SCK, SDO, SDI> Phy for BitBang<SCK, SDO, SDI>
where
    SCK: OutputPin,
    SDO: FlexPin,
    SDI: InputPin,
{
    #[inline]
    fn set_clock(&mut self, level: Level) -> Result<(), ErrorKind> {
        self.sck.set_state(PinState::from(level)).map_err(|e| e.kind())
    }

    fn drive(&mut self, level: Level) -> Result<(), ErrorKind> {
        // Latch the level first so the line never glitches when it turns around.
        self.sdo.set_state(PinState::from(level)).map_err(|e| e.kind())?;
        if !self.driving {
            self.sdo.set_as_output().map_err(|e| e.kind())?;
            self.driving = true;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), ErrorKind> {
        if self.driving {
            self.sdo.set_as_input(Pull::None).map_err(|e| e.kind())?;
            self.driving = false;
        }
        Ok(())
    }

    fn sample(&mut self, duplex: Duplex) -> Result<Level, ErrorKind> {
        let high = match (duplex, self.sdi.as_mut()) {
            (Duplex::Full, Some(sdi)) => sdi.is_high().map_err(|e| e.kind())?,
            (Duplex::Full, None) => return Err(ErrorKind::Other),
            (Duplex::Half, _) => self.sdo.is_high().map_err(|e| e.kind())?,
        };
        Ok(Level::from(high))
    }

    #[inline]
    fn is_driving(&self) -> bool {
        self.driving
    }

    #[inline]
    fn has_input_line(&self) -> bool {
        self.sdi.is_some()
    }
}
