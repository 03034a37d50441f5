//! Physical layer transports.
//!
//! The host talks to the card through a [Phy]: either the native SD bus ([SdPhy], 1 or 4 data
//! lines) or SPI ([SpiPhy]). Both are built on two collaborators supplied by the simulation: a
//! [Clock] that owns the bus clock and suspends the caller until the next edge, and [Pins] that
//! drive and sample the bus lines.
//!
//! The host changes its outputs after a falling edge and samples on the rising edge.

use fugit::HertzU32;

use crate::{BitSeq, BusWidth, Error, Mode};

mod sd;
mod spi;

pub use sd::SdPhy;
pub use spi::SpiPhy;

/// Represents the sampled level of a bus line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// The line is driven or pulled low.
    Low,
    /// The line is driven or pulled high.
    High,
    /// The line level is undefined, e.g. during bus turnaround or contention.
    Unknown,
}

impl Level {
    /// Converts a bool into a [Level].
    pub const fn from_bool(val: bool) -> Self {
        match val {
            false => Self::Low,
            true => Self::High,
        }
    }
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        Self::from_bool(val)
    }
}

/// Represents a clock edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    /// Low to high transition.
    Rising,
    /// High to low transition.
    Falling,
}

/// Represents one of the SDIO bus lines.
///
/// In SPI mode CMD carries MOSI, DAT0 carries MISO and DAT3 carries CS.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// Command line.
    Cmd,
    /// Data line 0.
    Dat0,
    /// Data line 1.
    Dat1,
    /// Data line 2.
    Dat2,
    /// Data line 3.
    Dat3,
}

impl Line {
    /// All data lines, in lane order.
    pub const DATA: [Self; 4] = [Self::Dat0, Self::Dat1, Self::Dat2, Self::Dat3];

    /// Gets the name of the line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cmd => "CMD",
            Self::Dat0 => "DAT0",
            Self::Dat1 => "DAT1",
            Self::Dat2 => "DAT2",
            Self::Dat3 => "DAT3",
        }
    }
}

impl core::fmt::Display for Line {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Clock source driving the bus clock.
///
/// [wait_edge](Clock::wait_edge) is the only point where the host yields to the simulation.
pub trait Clock {
    /// Starts generating the bus clock at `rate`.
    fn start(&mut self, rate: HertzU32);

    /// Stops the bus clock.
    fn stop(&mut self);

    /// Gets whether the clock is running.
    fn is_running(&self) -> bool;

    /// Gets the current clock rate.
    fn rate(&self) -> HertzU32;

    /// Suspends until the next `edge` of the bus clock.
    fn wait_edge(&mut self, edge: Edge);
}

/// Drive and sample access to the bus lines.
///
/// Released lines are resolved by the simulation; an undriven line reads high.
pub trait Pins {
    /// Drives `line` to the given level.
    fn drive(&mut self, line: Line, high: bool);

    /// Stops driving `line`.
    fn release(&mut self, line: Line);

    /// Samples the resolved level of `line`.
    fn sample(&self, line: Line) -> Level;
}

/// Counts samples of unknown level and reports them once per bus phase.
///
/// Unknown samples are diagnostics, never protocol errors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct XWarner {
    total: u32,
    phase: u32,
    first: Option<Line>,
}

impl XWarner {
    /// Creates a new [XWarner].
    pub const fn new() -> Self {
        Self {
            total: 0,
            phase: 0,
            first: None,
        }
    }

    /// Resolves a sample to a bit, treating an unknown level as 1.
    pub fn bit(&mut self, level: Level, line: Line) -> bool {
        match level {
            Level::Low => false,
            Level::High => true,
            Level::Unknown => {
                self.record(line);
                true
            }
        }
    }

    /// Gets whether a sample is a start bit. Unknown levels never are.
    pub fn is_start(&mut self, level: Level, line: Line) -> bool {
        !self.bit(level, line)
    }

    fn record(&mut self, line: Line) {
        self.total = self.total.saturating_add(1);
        self.phase = self.phase.saturating_add(1);
        self.first.get_or_insert(line);
    }

    /// Closes the current phase, warning if it saw unknown samples.
    pub fn end_phase(&mut self, phase: &'static str) {
        if let Some(line) = self.first.take() {
            warn!(
                "{} unknown sample(s) during {}, first on {}",
                self.phase,
                phase,
                line.name()
            );
        }

        self.phase = 0;
    }

    /// Gets the total number of unknown samples seen.
    pub const fn total(&self) -> u32 {
        self.total
    }
}

/// Bit-level access to the bus shared by the transports.
#[derive(Debug)]
pub struct Bus<C, P> {
    clock: C,
    pins: P,
    xwarner: XWarner,
}

impl<C: Clock, P: Pins> Bus<C, P> {
    /// Creates a new [Bus] with every line released.
    pub fn new(clock: C, mut pins: P) -> Self {
        pins.release(Line::Cmd);
        Line::DATA.into_iter().for_each(|line| pins.release(line));

        Self {
            clock,
            pins,
            xwarner: XWarner::new(),
        }
    }

    /// Gets the clock and pins back.
    pub fn into_inner(self) -> (C, P) {
        (self.clock, self.pins)
    }

    /// Gets the clock source.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Gets the unknown sample diagnostics.
    pub fn xwarner(&mut self) -> &mut XWarner {
        &mut self.xwarner
    }

    /// Restarts the clock at `rate`.
    pub fn restart_clock(&mut self, rate: HertzU32) -> Result<(), Error> {
        if rate.raw() == 0 {
            return Err(Error::invalid_argument(crate::Argument::ClockRate(0)));
        }

        if self.clock.is_running() {
            self.clock.stop();
        }
        self.clock.start(rate);

        debug!("bus clock set to {} Hz", rate.raw());
        Ok(())
    }

    fn edge(&mut self, edge: Edge) -> Result<(), Error> {
        if !self.clock.is_running() {
            return Err(Error::ClockStopped);
        }

        self.clock.wait_edge(edge);
        Ok(())
    }

    /// Waits for the next falling edge.
    pub fn falling(&mut self) -> Result<(), Error> {
        self.edge(Edge::Falling)
    }

    /// Waits for the next rising edge.
    pub fn rising(&mut self) -> Result<(), Error> {
        self.edge(Edge::Rising)
    }

    /// Drives `line` after the next falling edge.
    pub fn drive_bit(&mut self, line: Line, high: bool) -> Result<(), Error> {
        self.falling()?;
        self.pins.drive(line, high);
        Ok(())
    }

    /// Drives one symbol on the first `width` data lines after the next falling edge.
    pub fn drive_symbol(&mut self, width: BusWidth, symbol: u8) -> Result<(), Error> {
        self.falling()?;

        for (lane, line) in Line::DATA.into_iter().take(width.lines()).enumerate() {
            self.pins.drive(line, (symbol >> lane) & 1 != 0);
        }

        Ok(())
    }

    /// Drives `line` without waiting for an edge.
    pub fn drive(&mut self, line: Line, high: bool) {
        self.pins.drive(line, high);
    }

    /// Releases `line` without waiting for an edge.
    pub fn release(&mut self, line: Line) {
        self.pins.release(line);
    }

    /// Samples `line` at the next rising edge, treating unknown levels as 1.
    pub fn read_bit(&mut self, line: Line) -> Result<bool, Error> {
        self.rising()?;
        let level = self.pins.sample(line);
        Ok(self.xwarner.bit(level, line))
    }

    /// Samples the first `width` data lines at the next rising edge.
    pub fn read_symbol(&mut self, width: BusWidth) -> Result<u8, Error> {
        self.rising()?;

        let mut symbol = 0;
        for (lane, line) in Line::DATA.into_iter().take(width.lines()).enumerate() {
            let level = self.pins.sample(line);
            symbol |= (self.xwarner.bit(level, line) as u8) << lane;
        }

        Ok(symbol)
    }

    /// Waits up to `timeout` rising edges for a start bit (low) on `line`.
    ///
    /// High-impedance and unknown samples before the start bit are tolerated.
    pub fn wait_start(&mut self, line: Line, timeout: u32) -> Result<(), Error> {
        for _ in 0..timeout.max(1) {
            self.rising()?;
            let level = self.pins.sample(line);

            if self.xwarner.is_start(level, line) {
                return Ok(());
            }
        }

        Err(Error::TransportTimeout)
    }

    /// Waits up to `timeout` rising edges for `line` to be released high.
    pub fn wait_high(&mut self, line: Line, timeout: u32) -> Result<(), Error> {
        for _ in 0..timeout.max(1) {
            self.rising()?;

            if self.pins.sample(line) == Level::High {
                return Ok(());
            }
        }

        Err(Error::TransportTimeout)
    }

    /// Receives a frame of `bits` bits on `line`, including its start bit.
    pub fn receive_frame(&mut self, line: Line, bits: usize, timeout: u32) -> Result<BitSeq, Error> {
        let result = self.wait_start(line, timeout).and_then(|_| {
            let mut frame = BitSeq::new();
            frame.push(false);

            while frame.len() < bits.min(BitSeq::CAPACITY) {
                let bit = self.read_bit(line)?;
                frame.push(bit);
            }

            Ok(frame)
        });

        self.xwarner.end_phase("response");
        result
    }

    /// Clocks `cycles` idle cycles.
    pub fn idle(&mut self, cycles: u32) -> Result<(), Error> {
        for _ in 0..cycles {
            self.falling()?;
        }

        Ok(())
    }
}

/// Capability interface of a physical layer transport.
pub trait Phy {
    /// Gets the bus mode of the transport.
    fn mode(&self) -> Mode;

    /// Gets the active data bus width.
    fn bus_width(&self) -> BusWidth;

    /// Reconfigures the number of data lines used for data blocks.
    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error>;

    /// Gets the bus clock rate.
    fn clock_rate(&self) -> HertzU32;

    /// Stops and restarts the bus clock at `rate`.
    fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error>;

    /// Drives a command frame.
    fn send_command(&mut self, frame: &BitSeq) -> Result<(), Error>;

    /// Samples a response of `bits` bits, waiting up to `timeout` cycles for its start bit.
    fn receive_response(&mut self, bits: usize, timeout: u32) -> Result<BitSeq, Error>;

    /// Waits up to `timeout` cycles for the card to stop signalling busy.
    fn wait_busy(&mut self, timeout: u32) -> Result<(), Error>;

    /// Sends a data block and waits for the card to accept it.
    fn send_data_block(&mut self, data: &[u8], timeout: u32) -> Result<(), Error>;

    /// Receives a data block into `buf`, waiting up to `timeout` cycles for its start.
    fn receive_data_block(&mut self, buf: &mut [u8], timeout: u32) -> Result<(), Error>;

    /// Clocks `cycles` idle cycles.
    fn idle(&mut self, cycles: u32) -> Result<(), Error>;

    /// Holds DAT2 low for `cycles` clock cycles to pause a multi-block read between blocks.
    ///
    /// Only the SD bus has a read wait signal.
    fn read_wait(&mut self, cycles: u32) -> Result<(), Error> {
        let _ = cycles;
        Err(Error::Unsupported)
    }

    /// Releases the bus at the end of a transaction.
    fn finish(&mut self) -> Result<(), Error>;

    /// Gets the number of unknown samples seen so far.
    fn unknown_samples(&self) -> u32;
}

/// Closed set of the supported transports.
#[derive(Debug)]
pub enum AnyPhy<C, P> {
    /// Native SD bus transport.
    Sd(SdPhy<C, P>),
    /// SPI transport.
    Spi(SpiPhy<C, P>),
}

impl<C: Clock, P: Pins> AnyPhy<C, P> {
    /// Creates an SD bus transport.
    pub fn sd(clock: C, pins: P) -> Self {
        Self::Sd(SdPhy::new(clock, pins))
    }

    /// Creates an SPI transport.
    pub fn spi(clock: C, pins: P) -> Self {
        Self::Spi(SpiPhy::new(clock, pins))
    }

    /// Creates the transport for `mode`.
    pub fn new(mode: Mode, clock: C, pins: P) -> Self {
        match mode {
            Mode::Sd => Self::sd(clock, pins),
            Mode::Spi => Self::spi(clock, pins),
        }
    }
}

impl<C, P> From<SdPhy<C, P>> for AnyPhy<C, P> {
    fn from(val: SdPhy<C, P>) -> Self {
        Self::Sd(val)
    }
}

impl<C, P> From<SpiPhy<C, P>> for AnyPhy<C, P> {
    fn from(val: SpiPhy<C, P>) -> Self {
        Self::Spi(val)
    }
}

macro_rules! delegate {
    ($self:ident, $phy:ident => $body:expr) => {
        match $self {
            AnyPhy::Sd($phy) => $body,
            AnyPhy::Spi($phy) => $body,
        }
    };
}

impl<C: Clock, P: Pins> Phy for AnyPhy<C, P> {
    fn mode(&self) -> Mode {
        delegate!(self, phy => phy.mode())
    }

    fn bus_width(&self) -> BusWidth {
        delegate!(self, phy => phy.bus_width())
    }

    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error> {
        delegate!(self, phy => phy.set_bus_width(width))
    }

    fn clock_rate(&self) -> HertzU32 {
        delegate!(self, phy => phy.clock_rate())
    }

    fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error> {
        delegate!(self, phy => phy.set_clock_rate(rate))
    }

    fn send_command(&mut self, frame: &BitSeq) -> Result<(), Error> {
        delegate!(self, phy => phy.send_command(frame))
    }

    fn receive_response(&mut self, bits: usize, timeout: u32) -> Result<BitSeq, Error> {
        delegate!(self, phy => phy.receive_response(bits, timeout))
    }

    fn wait_busy(&mut self, timeout: u32) -> Result<(), Error> {
        delegate!(self, phy => phy.wait_busy(timeout))
    }

    fn send_data_block(&mut self, data: &[u8], timeout: u32) -> Result<(), Error> {
        delegate!(self, phy => phy.send_data_block(data, timeout))
    }

    fn receive_data_block(&mut self, buf: &mut [u8], timeout: u32) -> Result<(), Error> {
        delegate!(self, phy => phy.receive_data_block(buf, timeout))
    }

    fn idle(&mut self, cycles: u32) -> Result<(), Error> {
        delegate!(self, phy => phy.idle(cycles))
    }

    fn read_wait(&mut self, cycles: u32) -> Result<(), Error> {
        delegate!(self, phy => phy.read_wait(cycles))
    }

    fn finish(&mut self) -> Result<(), Error> {
        delegate!(self, phy => phy.finish())
    }

    fn unknown_samples(&self) -> u32 {
        delegate!(self, phy => phy.unknown_samples())
    }
}
