//! SD mode responses. All formats are 48 bits long.

use super::{CardStatus, Flags};
use crate::{crc::Crc7, io_ocr::IoOcr};

/// Index field of responses that carry no command index (R3, R4).
pub const RESERVED_INDEX: u8 = 0x3f;

// Builds a 48-bit card-to-host frame with a CRC7 over the first 40 bits.
pub(crate) const fn frame(index: u8, payload: u32) -> u64 {
    let head = (((index & 0x3f) as u64) << 32) | payload as u64;
    let crc = Crc7::calculate_bits(head, 40).into_u8() as u64;

    (head << 8) | (crc << 1) | 1
}

bitfield::bitfield! {
    /// Represents the R1 (normal) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R1(u64);
    impl Debug;
    u8;
    /// Represents the command index field.
    pub command_index, _: 45, 40;
    /// Represents the raw card status field.
    pub u32, raw_card_status, _: 39, 8;
    /// Represents the CRC7 field.
    pub raw_crc, _: 7, 1;
}

impl R1 {
    /// Creates a new [R1] frame.
    pub const fn new(index: u8, status: CardStatus) -> Self {
        Self(frame(index, status.into_u32()))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the card status.
    pub fn card_status(&self) -> CardStatus {
        CardStatus::from_u32(self.raw_card_status())
    }
}

bitfield::bitfield! {
    /// Represents the R3 (OCR register) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R3(u64);
    impl Debug;
    /// Indicates the card has finished power up.
    pub ready, _: 39;
    /// Represents the OCR register.
    pub u32, ocr, _: 39, 8;
}

impl R3 {
    /// Creates a new [R3] frame.
    pub const fn new(ocr: u32) -> Self {
        Self(frame(RESERVED_INDEX, ocr))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

bitfield::bitfield! {
    /// Represents the R4 (`IO_SEND_OP_COND`) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R4(u64);
    impl Debug;
    u8;
    /// Indicates the card is ready to operate after initialization.
    pub ready, _: 39;
    /// Represents the number of I/O functions.
    pub number_of_functions, _: 38, 36;
    /// Indicates the card also contains SD memory.
    pub memory_present, _: 35;
    /// Represents the raw I/O OCR field.
    pub u32, raw_io_ocr, _: 31, 8;
}

impl R4 {
    /// Creates a new [R4] frame.
    pub const fn new(
        ready: bool,
        number_of_functions: u8,
        memory_present: bool,
        io_ocr: IoOcr,
    ) -> Self {
        let payload = ((ready as u32) << 31)
            | (((number_of_functions & 0b111) as u32) << 28)
            | ((memory_present as u32) << 27)
            | io_ocr.into_u32();

        Self(frame(RESERVED_INDEX, payload))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the I/O OCR register.
    pub fn io_ocr(&self) -> IoOcr {
        IoOcr::from_u32(self.raw_io_ocr())
    }
}

bitfield::bitfield! {
    /// Represents the R5 (`IO_RW_DIRECT` + `IO_RW_EXTENDED`) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R5(u64);
    impl Debug;
    u8;
    /// Represents the command index field.
    pub command_index, _: 45, 40;
    /// Represents the raw response flags.
    pub raw_flags, _: 23, 16;
    /// Represents the register data for CMD52.
    pub data, _: 15, 8;
    /// Represents the CRC7 field.
    pub raw_crc, _: 7, 1;
}

impl R5 {
    /// Creates a new [R5] frame.
    pub const fn new(index: u8, flags: Flags, data: u8) -> Self {
        Self(frame(index, ((flags.into_u8() as u32) << 8) | data as u32))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the response flags.
    pub fn flags(&self) -> Flags {
        Flags::from_u8(self.raw_flags())
    }
}

bitfield::bitfield! {
    /// Represents the R6 (published RCA) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R6(u64);
    impl Debug;
    u8;
    /// Represents the command index field.
    pub command_index, _: 45, 40;
    /// Represents the new relative card address.
    pub u16, rca, _: 39, 24;
    /// Represents the condensed card status bits.
    pub u16, raw_status, _: 23, 8;
}

impl R6 {
    /// Creates a new [R6] frame.
    pub const fn new(index: u8, rca: u16, status: CardStatus) -> Self {
        let raw = status.into_u32();
        let status = (((raw >> 23) & 1) << 15)
            | (((raw >> 22) & 1) << 14)
            | (((raw >> 19) & 1) << 13)
            | (raw & 0x1fff);

        Self(frame(index, ((rca as u32) << 16) | status))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Gets the card status bits carried by the response, in R1 positions.
    pub fn card_status(&self) -> CardStatus {
        let raw = self.raw_status() as u32;

        CardStatus::from_u32(
            (((raw >> 15) & 1) << 23)
                | (((raw >> 14) & 1) << 22)
                | (((raw >> 13) & 1) << 19)
                | (raw & 0x1fff),
        )
    }
}

bitfield::bitfield! {
    /// Represents the R7 (card interface condition) response.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct R7(u64);
    impl Debug;
    u8;
    /// Represents the command index field.
    pub command_index, _: 45, 40;
    /// Represents the accepted voltage range.
    pub voltage_accepted, _: 19, 16;
    /// Represents the echoed check pattern.
    pub check_pattern, _: 15, 8;
}

impl R7 {
    /// Creates a new [R7] frame.
    pub const fn new(index: u8, voltage_accepted: u8, check_pattern: u8) -> Self {
        Self(frame(
            index,
            (((voltage_accepted & 0xf) as u32) << 8) | check_pattern as u32,
        ))
    }

    pub(crate) const fn from_raw(val: u64) -> Self {
        Self(val)
    }

    /// Gets the raw 48-bit frame.
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::IoCurrentState;

    #[test]
    fn test_r5_fields() {
        let r5 = R5::new(52, Flags::new(IoCurrentState::Command), 0x5a);

        assert_eq!(r5.command_index(), 52);
        assert_eq!(r5.data(), 0x5a);
        assert_eq!(r5.flags().io_current_state(), IoCurrentState::Command);
        assert_eq!(r5.into_u64() >> 46, 0);
        assert_eq!(r5.into_u64() & 1, 1);
    }

    #[test]
    fn test_r4_fields() {
        let r4 = R4::new(true, 2, false, IoOcr::from_u32(0x00ff_8000));

        assert!(r4.ready());
        assert_eq!(r4.number_of_functions(), 2);
        assert!(!r4.memory_present());
        assert_eq!(r4.io_ocr().into_u32(), 0x00ff_8000);
        assert_eq!((r4.into_u64() >> 40) & 0x3f, RESERVED_INDEX as u64);

        let head = r4.into_u64() >> 8;
        assert_eq!((r4.into_u64() >> 1) & 0x7f, Crc7::calculate_bits(head, 40).into_u8() as u64);
    }

    #[test]
    fn test_r6_status_mapping() {
        let mut status = CardStatus::from_u32(0);
        status.set_com_crc_error(true);
        status.set_current_state(CardStatus::IO_STATE);

        let r6 = R6::new(3, 0x0001, status);
        assert_eq!(r6.rca(), 0x0001);
        assert_eq!(r6.raw_status(), 0x9e00);
        assert_eq!(r6.card_status(), status);
    }

    #[test]
    fn test_r7_fields() {
        let r7 = R7::new(8, 1, 0xaa);

        assert_eq!(r7.command_index(), 8);
        assert_eq!(r7.voltage_accepted(), 1);
        assert_eq!(r7.check_pattern(), 0xaa);
    }
}
