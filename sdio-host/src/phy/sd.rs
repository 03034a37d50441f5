use fugit::HertzU32;

use super::{Bus, Clock, Line, Phy, Pins};
use crate::{
    BitSeq,
    BusWidth,
    Error,
    Mode,
    data::{decode_data_block, encode_data_block},
};

/// Idle cycles clocked after a transaction (N<sub>CC</sub>).
const TRAILING_CYCLES: u32 = 8;

/// CRC status token of an accepted write.
const STATUS_ACCEPTED: u8 = 0b010;
/// CRC status token of a write with a CRC error.
const STATUS_CRC_ERROR: u8 = 0b101;

/// Native SD bus transport over CMD and DAT0..DAT3.
#[derive(Debug)]
pub struct SdPhy<C, P> {
    bus: Bus<C, P>,
    width: BusWidth,
}

impl<C: Clock, P: Pins> SdPhy<C, P> {
    /// Creates a new [SdPhy] in 1-bit mode with every line released.
    pub fn new(clock: C, pins: P) -> Self {
        Self {
            bus: Bus::new(clock, pins),
            width: BusWidth::One,
        }
    }

    /// Gets the clock and pins back.
    pub fn into_inner(self) -> (C, P) {
        self.bus.into_inner()
    }

    fn release_data(&mut self) {
        Line::DATA.into_iter().for_each(|line| self.bus.release(line));
    }

    fn read_crc_status(&mut self, timeout: u32) -> Result<(), Error> {
        self.bus.wait_start(Line::Dat0, timeout)?;

        let mut status = 0u8;
        for _ in 0..3 {
            status = (status << 1) | self.bus.read_bit(Line::Dat0)? as u8;
        }

        if !self.bus.read_bit(Line::Dat0)? {
            return Err(Error::Framing);
        }

        match status {
            STATUS_ACCEPTED => Ok(()),
            STATUS_CRC_ERROR => Err(Error::CrcMismatch),
            other => Err(Error::WriteRejected(other)),
        }
    }
}

impl<C: Clock, P: Pins> Phy for SdPhy<C, P> {
    fn mode(&self) -> Mode {
        Mode::Sd
    }

    fn bus_width(&self) -> BusWidth {
        self.width
    }

    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error> {
        self.release_data();
        self.width = width;

        debug!("SD bus width set to {}", width.lines());
        Ok(())
    }

    fn clock_rate(&self) -> HertzU32 {
        self.bus.clock().rate()
    }

    fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error> {
        self.bus.restart_clock(rate)
    }

    fn send_command(&mut self, frame: &BitSeq) -> Result<(), Error> {
        for bit in frame.iter() {
            self.bus.drive_bit(Line::Cmd, bit)?;
        }

        self.bus.falling()?;
        self.bus.release(Line::Cmd);

        Ok(())
    }

    fn receive_response(&mut self, bits: usize, timeout: u32) -> Result<BitSeq, Error> {
        self.bus.receive_frame(Line::Cmd, bits, timeout)
    }

    fn wait_busy(&mut self, timeout: u32) -> Result<(), Error> {
        self.bus.wait_high(Line::Dat0, timeout)
    }

    fn send_data_block(&mut self, data: &[u8], timeout: u32) -> Result<(), Error> {
        let width = self.width;
        let symbols = encode_data_block(data, width)?;

        self.bus.drive_symbol(width, 0)?;
        for symbol in symbols {
            self.bus.drive_symbol(width, symbol)?;
        }
        self.bus.drive_symbol(width, width.line_mask())?;

        self.bus.falling()?;
        self.release_data();

        let result = self
            .read_crc_status(timeout)
            .and_then(|_| self.bus.wait_high(Line::Dat0, timeout));

        self.bus.xwarner().end_phase("write");
        result
    }

    fn receive_data_block(&mut self, buf: &mut [u8], timeout: u32) -> Result<(), Error> {
        let width = self.width;

        if let Err(err) = self.bus.wait_start(Line::Dat0, timeout) {
            self.bus.xwarner().end_phase("read");
            return Err(err);
        }

        let mut stopped = None;
        let bus = &mut self.bus;
        let mut symbols = core::iter::from_fn(|| match bus.read_symbol(width) {
            Ok(symbol) => Some(symbol),
            Err(err) => {
                stopped = Some(err);
                None
            }
        });

        let decoded = decode_data_block(&mut symbols, width, buf);
        drop(symbols);

        let result = match (stopped, decoded) {
            (Some(err), _) => Err(err),
            (None, Err(err)) => Err(err),
            (None, Ok(())) => match self.bus.read_symbol(width)? {
                end if end == width.line_mask() => Ok(()),
                _ => Err(Error::Framing),
            },
        };

        self.bus.xwarner().end_phase("read");
        result
    }

    fn idle(&mut self, cycles: u32) -> Result<(), Error> {
        self.bus.idle(cycles)
    }

    fn read_wait(&mut self, cycles: u32) -> Result<(), Error> {
        self.bus.drive_bit(Line::Dat2, false)?;
        let result = self.bus.idle(cycles);
        self.bus.release(Line::Dat2);

        trace!("read wait held for {} cycles", cycles);
        result
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.bus.idle(TRAILING_CYCLES)
    }

    fn unknown_samples(&self) -> u32 {
        self.bus.xwarner.total()
    }
}
