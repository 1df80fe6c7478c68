use embedded_hal::delay::DelayNs;

use super::context::sealed::Transfer;
use super::context::Window;
use super::{Config, Duplex, Error, Phy, SampleEdge, TransactionContext};
use crate::rcc::{Clocks, Prescaler};

/// Where the engine is in its cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No configuration applied yet.
    Idle,
    /// Configured, bus free.
    Configured,
    /// A transaction owns the bus.
    Transferring,
}

/// The applied profile.
#[derive(Copy, Clone)]
struct Active {
    config: Config,
    prescaler: Prescaler,
    half_period_ns: u32,
}

struct InFlight<'a> {
    ctx: &'a dyn Transfer,
    window: Window,
    /// Bytes already on the wire, both phases counted.
    shifted: usize,
}

impl InFlight<'_> {
    fn total(&self, duplex: Duplex) -> usize {
        match duplex {
            Duplex::Full => self.window.tx_count.max(self.window.rx_count),
            Duplex::Half => self.window.tx_count + self.window.rx_count,
        }
    }
}

/// SPI transaction engine, host role.
///
/// Owns the physical bus. Transactions run one at a time in the order they
/// were started: [`start`](Spi::start) returns as soon as the transaction owns
/// the bus, [`poll`](Spi::poll) moves it along a byte at a time and
/// [`wait`](Spi::wait) blocks until the bus is free again.
///
/// Bits only move inside `poll`, `wait`, `wait_async` and the calls built on
/// them. A context's done flag never turns true for a caller that just spins
/// on [`is_done`](Spi::is_done) without driving the engine.
///
/// The contexts handed to `start` have to outlive the engine's borrow of them
/// (`'a`), which in practice means `static` contexts or contexts declared
/// before the engine.
pub struct Spi<'a, P: Phy, D: DelayNs> {
    phy: P,
    delay: D,
    clocks: Clocks,
    active: Option<Active>,
    in_flight: Option<InFlight<'a>>,
}

impl<'a, P: Phy, D: DelayNs> Spi<'a, P, D> {
    /// Create a new SPI driver. Nothing touches the bus until the first
    /// [`apply`](Spi::apply).
    pub fn new(phy: P, delay: D, clocks: Clocks) -> Self {
        Self {
            phy,
            delay,
            clocks,
            active: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> State {
        match (&self.in_flight, &self.active) {
            (Some(_), _) => State::Transferring,
            (None, Some(_)) => State::Configured,
            (None, None) => State::Idle,
        }
    }

    /// The configuration transfers currently run under.
    pub fn config(&self) -> Option<Config> {
        self.active.map(|a| a.config)
    }

    pub fn prescaler(&self) -> Option<Prescaler> {
        self.active.map(|a| a.prescaler)
    }

    /// Install `config` for subsequent transfers.
    ///
    /// A configuration the bus can't realize is rejected before anything else
    /// happens; the active one stays in place. Otherwise this waits out any
    /// transfer in flight, then parks the bus at the new idle levels.
    pub fn apply(&mut self, config: Config) -> Result<(), Error> {
        let prescaler = config.validate(&self.clocks)?;
        if config.duplex == Duplex::Full && !self.phy.has_input_line() {
            return Err(super::ConfigError::FullDuplexUnwired.into());
        }

        self.wait()?;

        self.phy.set_clock(config.idle_level)?;
        self.park(&config)?;

        self.active = Some(Active {
            config,
            prescaler,
            half_period_ns: config.clock_rate.half_period_ns(),
        });
        debug!("spi: applied {}, prescaler {}", config, prescaler);
        Ok(())
    }

    /// Begin a transaction on `ctx` with its current counts.
    ///
    /// If another transaction is in flight, it is run to completion first, so
    /// transactions never overtake or interleave. Returns once `ctx` owns the
    /// bus; a transaction with nothing to send or receive is done on return.
    pub fn start<const TX: usize, const RX: usize>(
        &mut self,
        ctx: &'a TransactionContext<TX, RX>,
    ) -> Result<(), Error> {
        self.wait()?;

        if self.active.is_none() {
            return Err(Error::NotConfigured);
        }

        let window = ctx.begin()?;
        if window.is_empty() {
            ctx.complete();
            return Ok(());
        }

        trace!(
            "spi: start tx {}@{} rx {}",
            window.tx_count,
            window.tx_offset,
            window.rx_count
        );
        self.in_flight = Some(InFlight {
            ctx,
            window,
            shifted: 0,
        });
        Ok(())
    }

    /// Move the transaction in flight along by one byte.
    ///
    /// `WouldBlock` while bytes remain, `Ok` once the bus is free. On a pin
    /// error the transaction is abandoned without being marked done.
    pub fn poll(&mut self) -> nb::Result<(), Error> {
        let Some(mut flight) = self.in_flight.take() else {
            return Ok(());
        };
        let Some(active) = self.active else {
            return Err(nb::Error::Other(Error::NotConfigured));
        };

        match self.shift_next(&active, &mut flight) {
            Ok(()) if flight.shifted < flight.total(active.config.duplex) => {
                self.in_flight = Some(flight);
                Err(nb::Error::WouldBlock)
            }
            Ok(()) => {
                if let Err(err) = self.park(&active.config) {
                    flight.ctx.abandon();
                    return Err(nb::Error::Other(err));
                }
                flight.ctx.complete();
                trace!("spi: done after {} bytes", flight.shifted);
                Ok(())
            }
            Err(err) => {
                warn!("spi: transfer abandoned after {} bytes: {}", flight.shifted, err);
                flight.ctx.abandon();
                // Best effort, the bus is already in trouble.
                let _ = self.park(&active.config);
                Err(nb::Error::Other(err))
            }
        }
    }

    /// Block until no transaction is in flight. Returns at once when idle.
    pub fn wait(&mut self) -> Result<(), Error> {
        nb::block!(self.poll())
    }

    /// Like [`wait`](Spi::wait), yielding to the executor between bytes.
    #[cfg(feature = "embassy")]
    pub async fn wait_async(&mut self) -> Result<(), Error> {
        loop {
            match self.poll() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => embassy_futures::yield_now().await,
                Err(nb::Error::Other(err)) => return Err(err),
            }
        }
    }

    /// Run a transaction on `ctx` to completion.
    pub fn exchange<const TX: usize, const RX: usize>(
        &mut self,
        ctx: &'a TransactionContext<TX, RX>,
    ) -> Result<(), Error> {
        self.start(ctx)?;
        self.wait()
    }

    /// Whether `ctx`'s last transaction has finished. Doesn't move the
    /// transfer along; pair it with [`poll`](Spi::poll) when spinning.
    #[inline]
    pub fn is_done<const TX: usize, const RX: usize>(&self, ctx: &TransactionContext<TX, RX>) -> bool {
        ctx.is_done()
    }

    /// Give the bus back. Any transaction in flight is dropped unfinished.
    pub fn free(self) -> (P, D) {
        if let Some(flight) = self.in_flight {
            flight.ctx.abandon();
        }
        (self.phy, self.delay)
    }

    /// Lines at rest: the data line sits at the idle level in full duplex and
    /// is released in half duplex.
    fn park(&mut self, config: &Config) -> Result<(), Error> {
        match config.duplex {
            Duplex::Full => self.phy.drive(config.idle_level)?,
            Duplex::Half => self.phy.release()?,
        }
        Ok(())
    }

    fn shift_next(&mut self, active: &Active, flight: &mut InFlight<'a>) -> Result<(), Error> {
        let config = &active.config;
        let window = flight.window;
        let i = flight.shifted;

        match config.duplex {
            Duplex::Full => {
                let out = if i < window.tx_count {
                    flight.ctx.tx_byte(window.tx_offset + i)
                } else {
                    config.idle_byte()
                };
                let received = self.shift_byte(active, Some(out))?;
                if i < window.rx_count {
                    flight.ctx.store_rx(i, received);
                }
            }
            Duplex::Half if i < window.tx_count => {
                let out = flight.ctx.tx_byte(window.tx_offset + i);
                self.shift_byte(active, Some(out))?;
            }
            Duplex::Half => {
                // Turn the line around before the peer's first clock.
                if self.phy.is_driving() {
                    self.phy.release()?;
                }
                let received = self.shift_byte(active, None)?;
                flight.ctx.store_rx(i - window.tx_count, received);
            }
        }

        flight.shifted += 1;
        Ok(())
    }

    /// Clock one byte. `out` is driven onto the data line when given; in half
    /// duplex `None` leaves the line to the peer.
    fn shift_byte(&mut self, active: &Active, out: Option<u8>) -> Result<u8, Error> {
        let config = &active.config;
        let idle = config.idle_level;
        let half = active.half_period_ns;
        let mut received = 0u8;

        for n in 0..8 {
            let bit = out.map(|byte| config.bit_order.wire_bit(byte, n));

            let level = match config.sample_edge {
                SampleEdge::First => {
                    if let Some(bit) = bit {
                        self.phy.drive(bit)?;
                    }
                    self.delay.delay_ns(half);
                    self.phy.set_clock(!idle)?;
                    let level = self.phy.sample(config.duplex)?;
                    self.delay.delay_ns(half);
                    self.phy.set_clock(idle)?;
                    level
                }
                SampleEdge::Second => {
                    self.phy.set_clock(!idle)?;
                    if let Some(bit) = bit {
                        self.phy.drive(bit)?;
                    }
                    self.delay.delay_ns(half);
                    self.phy.set_clock(idle)?;
                    let level = self.phy.sample(config.duplex)?;
                    self.delay.delay_ns(half);
                    level
                }
            };

            if bool::from(level) {
                received |= config.bit_order.wire_mask(n);
            }
        }
        Ok(received)
    }
}
