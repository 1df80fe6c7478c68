//! Simulated bus for the unit tests.
//!
//! All pins share one [`Wire`], which records every clock transition together
//! with the data line level at that moment. An optional [`Peer`] listens on
//! the wire and answers key scans the way a TM1638 does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};

use crate::gpio::{FlexPin, Level, Pull};
use crate::spi::{Config, SampleEdge};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    /// Clock level after the transition.
    pub sck: Level,
    /// Data line level when the clock moved.
    pub data: Level,
    pub master_driving: bool,
}

pub struct Wire {
    sck: Option<Level>,
    master_driving: bool,
    master_level: Level,
    peer_level: Option<Level>,
    pub edges: Vec<Edge>,
    pub peer: Option<Peer>,
    /// Times both ends drove the data line at once.
    pub contention: usize,
    pub clock_calls: usize,
    /// Fail the clock pin once, on this call.
    pub clock_fault_at: Option<usize>,
}

impl Wire {
    fn new() -> Self {
        Self {
            sck: None,
            master_driving: false,
            master_level: Level::Low,
            peer_level: None,
            edges: Vec::new(),
            peer: None,
            contention: 0,
            clock_calls: 0,
            clock_fault_at: None,
        }
    }

    /// Level seen on the data line. Pulled up when nobody drives it.
    pub fn line(&self) -> Level {
        if self.master_driving {
            self.master_level
        } else {
            self.peer_level.unwrap_or(Level::High)
        }
    }

    pub fn master_driving(&self) -> bool {
        self.master_driving
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// Bits latched on the sample edges of `config`.
    pub fn sampled(&self, config: &Config) -> Vec<Level> {
        let sample_level = match config.sample_edge {
            SampleEdge::First => !config.idle_level,
            SampleEdge::Second => config.idle_level,
        };
        self.edges
            .iter()
            .filter(|e| e.sck == sample_level)
            .map(|e| e.data)
            .collect()
    }

    /// Sampled bits reassembled into bytes in `config`'s bit order.
    pub fn sampled_bytes(&self, config: &Config) -> Vec<u8> {
        self.sampled(config)
            .chunks(8)
            .map(|bits| {
                bits.iter().enumerate().fold(0u8, |byte, (n, &bit)| match bit {
                    Level::High => byte | config.bit_order.wire_mask(n as u8),
                    Level::Low => byte,
                })
            })
            .collect()
    }

    fn check_contention(&mut self) {
        if self.master_driving && self.peer_level.is_some() {
            self.contention += 1;
        }
    }

    fn set_clock(&mut self, level: Level) -> Result<(), ErrorKind> {
        self.clock_calls += 1;
        if self.clock_fault_at == Some(self.clock_calls) {
            return Err(ErrorKind::Other);
        }
        let previous = self.sck.replace(level);
        if previous.is_none() || previous == Some(level) {
            return Ok(());
        }

        self.edges.push(Edge {
            sck: level,
            data: self.line(),
            master_driving: self.master_driving,
        });

        let line = self.line();
        let master_driving = self.master_driving;
        if let Some(peer) = self.peer.as_mut() {
            self.peer_level = peer.on_clock(level, line, master_driving, self.peer_level);
        }
        self.check_contention();
        Ok(())
    }

    fn set_master(&mut self, driving: bool, level: Level) {
        self.master_driving = driving;
        self.master_level = level;
        self.check_contention();
    }

    fn set_strobe(&mut self, level: Level) {
        if let Some(peer) = self.peer.as_mut() {
            peer.on_strobe(level);
            if level == Level::High {
                self.peer_level = None;
            }
        }
    }
}

/// A key scanning display driver on the far end of a single-wire bus.
///
/// Clocked LSB first, idle high, data latched on the rising edge. After a
/// 0x42 command it drives `keys` back on the falling edges until the strobe
/// goes high.
pub struct Peer {
    pub keys: [u8; 4],
    /// Bytes received, one entry per strobe frame.
    pub frames: Vec<Vec<u8>>,
    selected: bool,
    shift: u8,
    bits: u8,
    reply: Option<usize>,
}

impl Peer {
    pub fn new(keys: [u8; 4]) -> Self {
        Self {
            keys,
            frames: Vec::new(),
            selected: false,
            shift: 0,
            bits: 0,
            reply: None,
        }
    }

    fn on_strobe(&mut self, level: Level) {
        match level {
            Level::Low => {
                self.selected = true;
                self.frames.push(Vec::new());
            }
            Level::High => self.selected = false,
        }
        self.shift = 0;
        self.bits = 0;
        self.reply = None;
    }

    fn on_clock(
        &mut self,
        sck: Level,
        line: Level,
        master_driving: bool,
        driving: Option<Level>,
    ) -> Option<Level> {
        if !self.selected {
            return None;
        }

        match (sck, self.reply) {
            (Level::High, None) if master_driving => {
                if line == Level::High {
                    self.shift |= 1 << self.bits;
                }
                self.bits += 1;
                if self.bits == 8 {
                    let byte = self.shift;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.push(byte);
                    }
                    if byte == 0x42 {
                        self.reply = Some(0);
                    }
                    self.shift = 0;
                    self.bits = 0;
                }
                driving
            }
            (Level::Low, Some(bit)) => {
                let byte = self.keys.get(bit / 8)?;
                self.reply = Some(bit + 1);
                Some(Level::from((byte >> (bit % 8)) & 1))
            }
            _ => driving,
        }
    }
}

pub type Shared = Rc<RefCell<Wire>>;

/// One simulated bus: hand out pins, then inspect the wire.
pub struct Bench {
    pub wire: Shared,
    pub elapsed: Rc<Cell<u64>>,
}

impl Bench {
    pub fn new() -> Self {
        Self {
            wire: Rc::new(RefCell::new(Wire::new())),
            elapsed: Rc::new(Cell::new(0)),
        }
    }

    pub fn with_peer(keys: [u8; 4]) -> Self {
        let bench = Self::new();
        bench.wire.borrow_mut().peer = Some(Peer::new(keys));
        bench
    }

    pub fn clock(&self) -> MockClock {
        MockClock(self.wire.clone())
    }

    pub fn data(&self) -> MockData {
        MockData {
            wire: self.wire.clone(),
            output: false,
            latched: Level::Low,
        }
    }

    /// Data in line tied to the data out line.
    pub fn loopback(&self) -> MockInput {
        MockInput(self.wire.clone())
    }

    pub fn strobe(&self) -> MockStrobe {
        MockStrobe(self.wire.clone())
    }

    pub fn delay(&self) -> MockDelay {
        MockDelay(self.elapsed.clone())
    }

    /// Bytes the peer received, per strobe frame.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.wire
            .borrow()
            .peer
            .as_ref()
            .map(|p| p.frames.clone())
            .unwrap_or_default()
    }
}

pub struct MockClock(Shared);

impl ErrorType for MockClock {
    type Error = ErrorKind;
}

impl OutputPin for MockClock {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_clock(Level::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_clock(Level::High)
    }
}

pub struct MockData {
    wire: Shared,
    output: bool,
    latched: Level,
}

impl ErrorType for MockData {
    type Error = ErrorKind;
}

impl MockData {
    fn latch(&mut self, level: Level) {
        self.latched = level;
        if self.output {
            self.wire.borrow_mut().set_master(true, level);
        }
    }
}

impl OutputPin for MockData {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.latch(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.latch(Level::High);
        Ok(())
    }
}

impl InputPin for MockData {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.wire.borrow().line().into())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_high()?)
    }
}

impl FlexPin for MockData {
    fn set_as_input(&mut self, _pull: Pull) -> Result<(), Self::Error> {
        self.output = false;
        self.wire.borrow_mut().set_master(false, self.latched);
        Ok(())
    }

    fn set_as_output(&mut self) -> Result<(), Self::Error> {
        self.output = true;
        self.wire.borrow_mut().set_master(true, self.latched);
        Ok(())
    }
}

pub struct MockInput(Shared);

impl ErrorType for MockInput {
    type Error = ErrorKind;
}

impl InputPin for MockInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.borrow().line().into())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_high()?)
    }
}

pub struct MockStrobe(Shared);

impl ErrorType for MockStrobe {
    type Error = ErrorKind;
}

impl OutputPin for MockStrobe {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_strobe(Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_strobe(Level::High);
        Ok(())
    }
}

/// Adds up requested delays instead of waiting.
#[derive(Clone)]
pub struct MockDelay(Rc<Cell<u64>>);

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}
