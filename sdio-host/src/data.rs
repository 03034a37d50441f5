//! Data block framing with one CRC16 per active data line.
//!
//! A symbol holds the levels of the active data lines during one bit-time, with DAT0 in bit 0.
//! In 1-bit mode each byte takes 8 symbols, MSB first. In 4-bit mode each byte takes 2 symbols:
//! the high nibble, then the low nibble, with bit `4 + n` (then bit `n`) on DAT`n`. Start and
//! end bits are framed by the transport.

use crate::{Argument, BusWidth, Error, crc::Crc16};

/// Largest data block in bytes.
pub const MAX_BLOCK_LEN: usize = 512;
/// Number of CRC symbols that follow the data symbols.
pub const CRC_SYMBOLS: usize = 16;

/// Running CRC16 of each active data line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LaneCrc {
    width: BusWidth,
    lanes: [Crc16; 4],
}

impl LaneCrc {
    /// Creates a new [LaneCrc] for the given bus width.
    pub const fn new(width: BusWidth) -> Self {
        Self {
            width,
            lanes: [Crc16::new(); 4],
        }
    }

    /// Shifts one symbol into the lane CRCs.
    pub fn update(&mut self, symbol: u8) {
        for (lane, crc) in self.lanes.iter_mut().take(self.width.lines()).enumerate() {
            *crc = crc.update((symbol >> lane) & 1 != 0);
        }
    }

    /// Gets the CRC of each lane; inactive lanes stay zero.
    pub const fn lanes(&self) -> [Crc16; 4] {
        self.lanes
    }

    /// Gets the CRC symbol sent at `index` (0..16), MSB of each lane CRC first.
    pub fn symbol(&self, index: usize) -> u8 {
        let shift = CRC_SYMBOLS - 1 - index;

        self.lanes
            .iter()
            .take(self.width.lines())
            .enumerate()
            .fold(0, |acc, (lane, crc)| {
                acc | ((((crc.into_u16() >> shift) & 1) as u8) << lane)
            })
    }
}

/// Gets the number of data symbols of a block of `len` bytes.
pub const fn data_symbols(len: usize, width: BusWidth) -> usize {
    len * width.symbols_per_byte()
}

fn check_len(len: usize) -> Result<(), Error> {
    if len == 0 || len > MAX_BLOCK_LEN {
        Err(Error::invalid_argument(Argument::BlockLength(len)))
    } else {
        Ok(())
    }
}

fn byte_symbols(byte: u8, width: BusWidth) -> impl Iterator<Item = u8> {
    let count = width.symbols_per_byte();
    let bits = 8 / count;
    let mask = ((1u16 << bits) - 1) as u8;

    (0..count).map(move |i| (byte >> ((count - 1 - i) * bits)) & mask)
}

/// Encodes a data block into its data symbols followed by its 16 CRC symbols.
pub fn encode_data_block(
    data: &[u8],
    width: BusWidth,
) -> Result<impl Iterator<Item = u8> + '_, Error> {
    check_len(data.len())?;

    let mut crc = LaneCrc::new(width);
    data.iter()
        .flat_map(|&b| byte_symbols(b, width))
        .for_each(|s| crc.update(s));

    Ok(data
        .iter()
        .flat_map(move |&b| byte_symbols(b, width))
        .chain((0..CRC_SYMBOLS).map(move |i| crc.symbol(i))))
}

/// Decodes the data and CRC symbols of a block into `out`, verifying every lane CRC.
///
/// Exactly `out.len()` bytes worth of data symbols and 16 CRC symbols are consumed. Returns
/// [Error::Framing] if the symbols run out and [Error::CrcMismatch] if any lane CRC differs.
pub fn decode_data_block<I>(symbols: &mut I, width: BusWidth, out: &mut [u8]) -> Result<(), Error>
where
    I: Iterator<Item = u8>,
{
    check_len(out.len())?;

    let count = width.symbols_per_byte();
    let bits = 8 / count;
    let mut crc = LaneCrc::new(width);

    for byte in out.iter_mut() {
        let mut value = 0u8;

        for _ in 0..count {
            let symbol = symbols.next().ok_or(Error::Framing)? & width.line_mask();
            crc.update(symbol);
            value = (value << bits) | symbol;
        }

        *byte = value;
    }

    let mut received = [0u16; 4];
    for _ in 0..CRC_SYMBOLS {
        let symbol = symbols.next().ok_or(Error::Framing)?;

        for (lane, rx) in received.iter_mut().take(width.lines()).enumerate() {
            *rx = (*rx << 1) | ((symbol >> lane) & 1) as u16;
        }
    }

    let expected = crc.lanes();
    for lane in 0..width.lines() {
        if expected[lane].into_u16() != received[lane] {
            warn!(
                "data CRC mismatch on DAT{}: expected {:#06x}, received {:#06x}",
                lane,
                expected[lane].into_u16(),
                received[lane]
            );
            return Err(Error::CrcMismatch);
        }
    }

    Ok(())
}
