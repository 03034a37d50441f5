//! CRC7 and CRC16 checksums for command, response, and data frames.
//!
//! Authored-by: sdmmc-core developers
//! Originally licensed as GPLv3
//! Permitted for distribution under APACHE or MIT by esp-rs

const CRC7_POLY: u8 = 0b1000_1001;
const CRC7_MASK: u8 = 0x7f;
const CRC16_POLY: u16 = 0x1021;

/// Represents the 7-bit CRC used to protect SDIO commands and responses.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc7(u8);

impl Crc7 {
    /// Creates a new [Crc7] with the zero initial value.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Gets the inner representation of the [Crc7] bits.
    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// Converts a [`u8`] into a [Crc7].
    pub const fn from_u8(val: u8) -> Self {
        Self(val & CRC7_MASK)
    }

    /// Shifts a single message bit into the [Crc7].
    ///
    /// ```no_build,no_run
    /// Generator Polynomial: G(x) = x^7 + x^3 + 1
    /// ```
    pub const fn update(self, bit: bool) -> Self {
        let feedback = ((self.0 >> 6) & 1 != 0) ^ bit;
        let crc = (self.0 << 1) & CRC7_MASK;

        if feedback {
            Self(crc ^ (CRC7_POLY & CRC7_MASK))
        } else {
            Self(crc)
        }
    }

    /// Calculates the CRC7 over the `count` most significant bits of `bits`, MSB first.
    ///
    /// The message does not need to be byte aligned.
    pub const fn calculate_bits(bits: u64, count: u32) -> Self {
        let mut crc = Self::new();
        let mut i = count;

        while i > 0 {
            i -= 1;
            crc = crc.update((bits >> i) & 1 != 0);
        }

        crc
    }

    /// Calculates the CRC7 value over a byte-aligned message.
    ///
    /// Implementation based on the lookup table algorithm from: [hazelnusse/crc7](https://github.com/hazelnusse/crc7).
    pub const fn calculate(data: &[u8]) -> Self {
        let mut crc = 0;
        let mut i = 0;
        let len = data.len();

        while i < len {
            crc = Self::crc_table((crc << 1) ^ data[i]);
            i = i.saturating_add(1);
        }

        Self(crc)
    }

    // Calculates the CRC-7 lookup value based on the `crc` value.
    #[inline(always)]
    const fn crc_table(mut crc: u8) -> u8 {
        crc ^= Self::crc_rem(crc);
        let mut j = 1;

        while j < 8 {
            crc = (crc << 1) ^ Self::crc_rem(crc << 1);
            j += 1;
        }

        crc
    }

    // Used to clear leading bit from CRC value.
    //
    // If the leading bit is set, adds the CRC-7 polynomial to correct the value.
    #[inline(always)]
    const fn crc_rem(val: u8) -> u8 {
        if val & 0x80 != 0 { CRC7_POLY } else { 0 }
    }
}

impl From<u8> for Crc7 {
    fn from(val: u8) -> Self {
        Self::from_u8(val)
    }
}

impl From<Crc7> for u8 {
    fn from(val: Crc7) -> Self {
        val.into_u8()
    }
}

/// Represents the CRC16-CCITT carried by each active data line after a data block.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc16(u16);

impl Crc16 {
    /// Creates a new [Crc16] with the zero initial value.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Converts a [`u16`] into a [Crc16].
    pub const fn from_u16(val: u16) -> Self {
        Self(val)
    }

    /// Gets the inner representation of the [Crc16] bits.
    pub const fn into_u16(self) -> u16 {
        self.0
    }

    /// Shifts a single message bit into the [Crc16].
    ///
    /// ```no_build,no_run
    /// Generator Polynomial: G(x) = x^16 + x^12 + x^5 + 1
    /// ```
    pub const fn update(self, bit: bool) -> Self {
        let feedback = ((self.0 >> 15) & 1 != 0) ^ bit;
        let crc = self.0 << 1;

        if feedback {
            Self(crc ^ CRC16_POLY)
        } else {
            Self(crc)
        }
    }

    /// Shifts a full byte into the [Crc16], MSB first.
    pub const fn update_byte(self, byte: u8) -> Self {
        let mut crc = self;
        let mut i = 8;

        while i > 0 {
            i -= 1;
            crc = crc.update((byte >> i) & 1 != 0);
        }

        crc
    }

    /// Calculates the CRC16 over a byte-aligned message.
    pub const fn calculate(data: &[u8]) -> Self {
        let mut crc = Self::new();
        let mut i = 0;

        while i < data.len() {
            crc = crc.update_byte(data[i]);
            i += 1;
        }

        crc
    }
}

impl From<u16> for Crc16 {
    fn from(val: u16) -> Self {
        Self::from_u16(val)
    }
}

impl From<Crc16> for u16 {
    fn from(val: Crc16) -> Self {
        val.into_u16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc7() {
        [0b1001010, 0b0101010, 0b0110011]
            .map(Crc7::from)
            .into_iter()
            .zip([
                [0b0100_0000, 0x00, 0x00, 0x00, 0x00],
                [0b0101_0001, 0x00, 0x00, 0x00, 0x00],
                [0b0001_0001, 0x00, 0x00, 0b0000_1001, 0x00],
            ])
            .for_each(|(exp_crc, data)| {
                assert_eq!(Crc7::calculate(data.as_ref()), exp_crc);

                let bits = data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                assert_eq!(Crc7::calculate_bits(bits, 40), exp_crc);
            });
    }

    #[test]
    fn test_crc7_detects_single_bit_errors() {
        // CMD52 write to function 1, register 0x100
        let frame = 0x74_9002_00ab_u64;
        let good = Crc7::calculate_bits(frame, 40);

        for bit in 0..40 {
            assert_ne!(Crc7::calculate_bits(frame ^ (1 << bit), 40), good, "bit {bit}");
        }
    }

    #[test]
    fn test_crc16() {
        // CSD register read back from a card
        let data = [
            0x00, 0x26, 0x00, 0x32, 0x5F, 0x5A, 0x83, 0xAE, 0xFE, 0xFB, 0xCF, 0xFF, 0x92, 0x80,
            0x40, 0xDF,
        ];
        assert_eq!(Crc16::calculate(&data), Crc16::from(0x9fc5));

        assert_eq!(Crc16::calculate(b"123456789"), Crc16::from(0x31c3));
        assert_eq!(Crc16::calculate(&[0xff; 512]), Crc16::from(0x7fa1));
    }

    #[test]
    fn test_crc16_detects_corruption() {
        let mut data = [0u8; 64];
        data.iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        let good = Crc16::calculate(&data);

        data[17] ^= 0x10;
        assert_ne!(Crc16::calculate(&data), good);
    }
}
