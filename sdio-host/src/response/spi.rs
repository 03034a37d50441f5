//! SPI mode responses. SPI responses carry no CRC.

use crate::io_ocr::IoOcr;

bitfield::bitfield! {
    /// Represents the Modified R1 response used by SDIO cards in SPI mode.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ModifiedR1(u8);
    impl Debug;
    /// Represents the start bit (always 0).
    pub start, _: 7;
    /// Indicates a parameter error.
    pub parameter_error, set_parameter_error: 6;
    /// Indicates a function number error.
    pub function_number_error, set_function_number_error: 4;
    /// Indicates a CRC error.
    pub crc_error, set_crc_error: 3;
    /// Indicates an illegal command.
    pub illegal_command, set_illegal_command: 2;
    /// Indicates idle status.
    pub idle, set_idle: 0;
}

impl ModifiedR1 {
    /// Represents the bit length of the response.
    pub const BITS: usize = 8;
    /// Represents the bitmask of the defined fields.
    pub const MASK: u8 = 0x5d;
    /// Represents the error bits.
    pub const ERROR_MASK: u8 = 0x5c;

    /// Creates a new [ModifiedR1] with no bits set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Converts a [`u8`] into a [ModifiedR1].
    pub const fn from_inner(val: u8) -> Self {
        Self(val)
    }

    /// Converts the [ModifiedR1] into a [`u8`].
    pub const fn into_inner(self) -> u8 {
        self.0
    }

    /// Gets whether any error bit is set.
    pub const fn is_err(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

impl core::fmt::Display for ModifiedR1 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "R1 {{")?;
        write!(f, " parameter_error: {},", self.parameter_error())?;
        write!(
            f,
            " function_number_error: {},",
            self.function_number_error()
        )?;
        write!(f, " crc_error: {},", self.crc_error())?;
        write!(f, " illegal_command: {},", self.illegal_command())?;
        write!(f, " idle: {}", self.idle())?;
        write!(f, " }}")
    }
}

bitfield::bitfield! {
    /// Represents the SPI mode R4 (`IO_SEND_OP_COND`) response.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R4(u64);
    impl Debug;
    u8;
    raw_modified_r1, _: 39, 32;
    /// Indicates the card is ready to operate after initialization.
    pub ready, _: 31;
    /// Represents the number of I/O functions.
    pub number_of_functions, _: 30, 28;
    /// Indicates the card also contains SD memory.
    pub memory_present, _: 27;
    /// Represents the raw I/O OCR field.
    pub u32, raw_io_ocr, _: 23, 0;
}

impl R4 {
    /// Represents the bit length of the response.
    pub const BITS: usize = 40;

    /// Creates a new [R4] response.
    pub const fn new(
        r1: ModifiedR1,
        ready: bool,
        number_of_functions: u8,
        memory_present: bool,
        io_ocr: IoOcr,
    ) -> Self {
        Self(
            ((r1.into_inner() as u64) << 32)
                | ((ready as u64) << 31)
                | (((number_of_functions & 0b111) as u64) << 28)
                | ((memory_present as u64) << 27)
                | io_ocr.into_u32() as u64,
        )
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 40-bit response.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the Modified R1 response.
    pub fn modified_r1(&self) -> ModifiedR1 {
        ModifiedR1::from_inner(self.raw_modified_r1())
    }

    /// Gets the I/O OCR register.
    pub fn io_ocr(&self) -> IoOcr {
        IoOcr::from_u32(self.raw_io_ocr())
    }
}

bitfield::bitfield! {
    /// Represents the SPI mode R5 (`IO_RW_DIRECT` + `IO_RW_EXTENDED`) response.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R5(u16);
    impl Debug;
    u8;
    raw_modified_r1, _: 15, 8;
    /// Represents the R/W response data.
    pub data, _: 7, 0;
}

impl R5 {
    /// Represents the bit length of the response.
    pub const BITS: usize = 16;

    /// Creates a new [R5] response.
    pub const fn new(r1: ModifiedR1, data: u8) -> Self {
        Self(((r1.into_inner() as u16) << 8) | data as u16)
    }

    pub(crate) const fn from_raw(val: u16) -> Self {
        Self(val)
    }

    /// Gets the raw 16-bit response.
    pub const fn into_u16(self) -> u16 {
        self.0
    }

    /// Gets the Modified R1 response.
    pub fn modified_r1(&self) -> ModifiedR1 {
        ModifiedR1::from_inner(self.raw_modified_r1())
    }

    /// Gets whether the [R5] response has any errors set.
    pub fn is_err(&self) -> bool {
        self.modified_r1().is_err()
    }
}

bitfield::bitfield! {
    /// Represents the SPI mode R7 (card interface condition) response.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R7(u64);
    impl Debug;
    u8;
    raw_modified_r1, _: 39, 32;
    /// Represents the accepted voltage range.
    pub voltage_accepted, _: 11, 8;
    /// Represents the echoed check pattern.
    pub check_pattern, _: 7, 0;
}

impl R7 {
    /// Represents the bit length of the response.
    pub const BITS: usize = 40;

    /// Creates a new [R7] response.
    pub const fn new(r1: ModifiedR1, voltage_accepted: u8, check_pattern: u8) -> Self {
        Self(
            ((r1.into_inner() as u64) << 32)
                | (((voltage_accepted & 0xf) as u64) << 8)
                | check_pattern as u64,
        )
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 40-bit response.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the Modified R1 response.
    pub fn modified_r1(&self) -> ModifiedR1 {
        ModifiedR1::from_inner(self.raw_modified_r1())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_r1() {
        let mut r1 = ModifiedR1::new();
        r1.set_idle(true);
        assert_eq!(r1.into_inner(), 0x01);
        assert!(!r1.is_err());

        r1.set_crc_error(true);
        assert!(r1.is_err());
        assert_eq!(r1.into_inner() & !ModifiedR1::MASK, 0);
    }

    #[test]
    fn test_r4_r5() {
        let r4 = R4::new(ModifiedR1::new(), true, 1, true, IoOcr::from_u32(0x00ff_8000));
        assert!(r4.ready());
        assert!(r4.memory_present());
        assert_eq!(r4.number_of_functions(), 1);
        assert_eq!(r4.io_ocr().into_u32(), 0x00ff_8000);
        assert_eq!(r4.into_u64() >> 39, 0);

        let mut r1 = ModifiedR1::new();
        r1.set_function_number_error(true);
        let r5 = R5::new(r1, 0x42);
        assert_eq!(r5.data(), 0x42);
        assert!(r5.is_err());
        assert_eq!(r5.into_u16(), 0x1042);
    }
}
