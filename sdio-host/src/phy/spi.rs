use fugit::HertzU32;

use super::{Bus, Clock, Line, Phy, Pins};
use crate::{
    Argument,
    BitSeq,
    BusWidth,
    Error,
    Mode,
    data::{decode_data_block, encode_data_block},
};

const MOSI: Line = Line::Cmd;
const MISO: Line = Line::Dat0;
const CS: Line = Line::Dat3;

/// Idle cycles clocked after chip select is released.
const TRAILING_CYCLES: u32 = 8;

/// Start token of single block transfers.
const START_TOKEN: u8 = 0xfe;

/// Data response status of an accepted write.
const STATUS_ACCEPTED: u8 = 0b010;
/// Data response status of a write with a CRC error.
const STATUS_CRC_ERROR: u8 = 0b101;

/// SPI transport: MOSI on CMD, MISO on DAT0 and active-low CS on DAT3.
///
/// Chip select is asserted by [send_command](Phy::send_command) and held until
/// [finish](Phy::finish), so a CMD53 keeps the card selected across its data blocks.
#[derive(Debug)]
pub struct SpiPhy<C, P> {
    bus: Bus<C, P>,
    selected: bool,
}

impl<C: Clock, P: Pins> SpiPhy<C, P> {
    /// Creates a new [SpiPhy] with chip select released and MOSI idle high.
    pub fn new(clock: C, pins: P) -> Self {
        let mut bus = Bus::new(clock, pins);
        bus.drive(CS, true);
        bus.drive(MOSI, true);

        Self {
            bus,
            selected: false,
        }
    }

    /// Gets the clock and pins back.
    pub fn into_inner(self) -> (C, P) {
        self.bus.into_inner()
    }

    fn assert_cs(&mut self) -> Result<(), Error> {
        if !self.selected {
            self.bus.drive_bit(CS, false)?;
            self.selected = true;
        }

        Ok(())
    }

    fn deassert_cs(&mut self) -> Result<(), Error> {
        if self.selected {
            self.bus.drive_bit(CS, true)?;
            self.selected = false;
        }

        Ok(())
    }

    fn read_data_response(&mut self, timeout: u32) -> Result<(), Error> {
        self.bus.wait_start(MISO, timeout)?;

        let mut status = 0u8;
        for _ in 0..3 {
            status = (status << 1) | self.bus.read_bit(MISO)? as u8;
        }

        if !self.bus.read_bit(MISO)? {
            return Err(Error::Framing);
        }

        match status {
            STATUS_ACCEPTED => Ok(()),
            STATUS_CRC_ERROR => Err(Error::CrcMismatch),
            other => Err(Error::WriteRejected(other)),
        }
    }
}

impl<C: Clock, P: Pins> Phy for SpiPhy<C, P> {
    fn mode(&self) -> Mode {
        Mode::Spi
    }

    fn bus_width(&self) -> BusWidth {
        BusWidth::One
    }

    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error> {
        match width {
            BusWidth::One => Ok(()),
            BusWidth::Four => Err(Error::invalid_argument(Argument::BusWidth(4))),
        }
    }

    fn clock_rate(&self) -> HertzU32 {
        self.bus.clock().rate()
    }

    fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error> {
        self.bus.restart_clock(rate)
    }

    fn send_command(&mut self, frame: &BitSeq) -> Result<(), Error> {
        self.assert_cs()?;

        for bit in frame.iter() {
            self.bus.drive_bit(MOSI, bit)?;
        }

        self.bus.drive_bit(MOSI, true)
    }

    fn receive_response(&mut self, bits: usize, timeout: u32) -> Result<BitSeq, Error> {
        self.bus.receive_frame(MISO, bits, timeout)
    }

    fn wait_busy(&mut self, timeout: u32) -> Result<(), Error> {
        self.bus.wait_high(MISO, timeout)
    }

    fn send_data_block(&mut self, data: &[u8], timeout: u32) -> Result<(), Error> {
        let symbols = encode_data_block(data, BusWidth::One)?;

        for i in (0..8).rev() {
            self.bus.drive_bit(MOSI, (START_TOKEN >> i) & 1 != 0)?;
        }
        for symbol in symbols {
            self.bus.drive_bit(MOSI, symbol & 1 != 0)?;
        }
        self.bus.drive_bit(MOSI, true)?;

        let result = self
            .read_data_response(timeout)
            .and_then(|_| self.bus.wait_high(MISO, timeout));

        self.bus.xwarner().end_phase("write");
        result
    }

    fn receive_data_block(&mut self, buf: &mut [u8], timeout: u32) -> Result<(), Error> {
        // the start token ends with the only low bit of the token
        if let Err(err) = self.bus.wait_start(MISO, timeout) {
            self.bus.xwarner().end_phase("read");
            return Err(err);
        }

        let mut stopped = None;
        let bus = &mut self.bus;
        let mut symbols = core::iter::from_fn(|| match bus.read_bit(MISO) {
            Ok(bit) => Some(bit as u8),
            Err(err) => {
                stopped = Some(err);
                None
            }
        });

        let decoded = decode_data_block(&mut symbols, BusWidth::One, buf);
        drop(symbols);

        self.bus.xwarner().end_phase("read");

        match stopped {
            Some(err) => Err(err),
            None => decoded,
        }
    }

    fn idle(&mut self, cycles: u32) -> Result<(), Error> {
        self.bus.idle(cycles)
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.deassert_cs()?;
        self.bus.idle(TRAILING_CYCLES)
    }

    fn unknown_samples(&self) -> u32 {
        self.bus.xwarner.total()
    }
}
