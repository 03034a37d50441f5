//! SDIO response types and response decoding.

use crate::{BitSeq, Error, Mode, crc::Crc7, error::Fault, io_ocr::IoOcr};

mod flags;
pub mod sd;
pub mod spi;

pub use flags::{CardStatus, Flags, IoCurrentState};

/// Represents the response format expected for a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseKind {
    /// No response is sent.
    None,
    /// Normal response with card status.
    R1,
    /// Normal response followed by busy signalling on DAT0.
    R1b,
    /// OCR register response.
    R3,
    /// `IO_SEND_OP_COND` response.
    R4,
    /// `IO_RW_DIRECT`/`IO_RW_EXTENDED` response.
    R5,
    /// Published RCA response.
    R6,
    /// Card interface condition response.
    R7,
}

impl ResponseKind {
    /// Gets the number of bits of the response on the wire in the given bus mode.
    pub const fn bits(self, mode: Mode) -> usize {
        match (self, mode) {
            (Self::None, _) => 0,
            (_, Mode::Sd) => 48,
            (Self::R1 | Self::R1b | Self::R6, Mode::Spi) => spi::ModifiedR1::BITS,
            (Self::R5, Mode::Spi) => spi::R5::BITS,
            (Self::R3 | Self::R4 | Self::R7, Mode::Spi) => spi::R4::BITS,
        }
    }

    /// Gets whether the card may signal busy on DAT0 after the response.
    pub const fn has_busy(self) -> bool {
        matches!(self, Self::R1b)
    }
}

/// Reasons a sampled response was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidResponse {
    /// No start bit was seen within the timeout.
    Timeout,
    /// The CRC7 field did not match the frame.
    Crc {
        /// The CRC computed over the received frame.
        expected: Crc7,
        /// The CRC field of the received frame.
        received: Crc7,
    },
    /// The start, transmission, or end bit had the wrong value.
    Framing,
    /// The response had the wrong number of bits.
    Length(usize),
    /// The reserved index field of an R3/R4 response was not all ones.
    Reserved,
}

impl InvalidResponse {
    /// Gets the transport [Fault] corresponding to the rejection.
    pub const fn fault(self) -> Fault {
        match self {
            Self::Timeout => Fault::Timeout,
            Self::Crc { .. } => Fault::Crc,
            Self::Framing | Self::Length(_) | Self::Reserved => Fault::Framing,
        }
    }
}

/// Normalized `IO_SEND_OP_COND` result, common to SD and SPI mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpCond {
    /// The card finished its power up sequence.
    pub ready: bool,
    /// The number of I/O functions.
    pub number_of_functions: u8,
    /// The card also contains SD memory.
    pub memory_present: bool,
    /// The card I/O OCR.
    pub io_ocr: IoOcr,
}

/// Represents a decoded response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    /// The command has no response.
    None,
    /// SD mode R1 (or R1b) response.
    R1(sd::R1),
    /// SD mode R3 response.
    R3(sd::R3),
    /// SD mode R4 response.
    R4(sd::R4),
    /// SD mode R5 response.
    R5(sd::R5),
    /// SD mode R6 response.
    R6(sd::R6),
    /// SD mode R7 response.
    R7(sd::R7),
    /// SPI mode R1 response.
    SpiR1(spi::ModifiedR1),
    /// SPI mode R4 response.
    SpiR4(spi::R4),
    /// SPI mode R5 response.
    SpiR5(spi::R5),
    /// SPI mode R7 response.
    SpiR7(spi::R7),
    /// The sampled bits did not form a valid response.
    Invalid(InvalidResponse),
}

impl Response {
    /// Decodes a response sampled in the given bus mode.
    pub fn decode_for(mode: Mode, bits: &BitSeq, kind: ResponseKind) -> Self {
        match mode {
            Mode::Sd => Self::decode(bits, kind),
            Mode::Spi => Self::decode_spi(bits, kind),
        }
    }

    /// Decodes an SD mode response sampled from the CMD line.
    ///
    /// Checks the length, start, transmission, and end bits, then recomputes the CRC7 over the
    /// first 40 bits. R3 and R4 must also carry the reserved all-ones index field.
    pub fn decode(bits: &BitSeq, kind: ResponseKind) -> Self {
        if matches!(kind, ResponseKind::None) {
            return Self::None;
        }

        if bits.len() != 48 {
            return Self::Invalid(InvalidResponse::Length(bits.len()));
        }

        let raw = bits.value();

        if (raw >> 47) & 1 != 0 || (raw >> 46) & 1 != 0 || raw & 1 != 1 {
            return Self::Invalid(InvalidResponse::Framing);
        }

        let expected = Crc7::calculate_bits(raw >> 8, 40);
        let received = Crc7::from_u8(((raw >> 1) & 0x7f) as u8);

        if expected != received {
            return Self::Invalid(InvalidResponse::Crc { expected, received });
        }

        let index = ((raw >> 40) & 0x3f) as u8;
        if matches!(kind, ResponseKind::R3 | ResponseKind::R4) && index != sd::RESERVED_INDEX {
            return Self::Invalid(InvalidResponse::Reserved);
        }

        match kind {
            ResponseKind::None => Self::None,
            ResponseKind::R1 | ResponseKind::R1b => Self::R1(sd::R1::from_raw(raw)),
            ResponseKind::R3 => Self::R3(sd::R3::from_raw(raw)),
            ResponseKind::R4 => Self::R4(sd::R4::from_raw(raw)),
            ResponseKind::R5 => Self::R5(sd::R5::from_raw(raw)),
            ResponseKind::R6 => Self::R6(sd::R6::from_raw(raw)),
            ResponseKind::R7 => Self::R7(sd::R7::from_raw(raw)),
        }
    }

    /// Decodes an SPI mode response sampled from MISO.
    pub fn decode_spi(bits: &BitSeq, kind: ResponseKind) -> Self {
        let expected = kind.bits(Mode::Spi);

        if expected == 0 {
            return Self::None;
        }

        if bits.len() != expected {
            return Self::Invalid(InvalidResponse::Length(bits.len()));
        }

        if bits.bit(0) != Some(false) {
            return Self::Invalid(InvalidResponse::Framing);
        }

        let raw = bits.value();

        match kind {
            ResponseKind::None => Self::None,
            ResponseKind::R1 | ResponseKind::R1b | ResponseKind::R6 => {
                Self::SpiR1(spi::ModifiedR1::from_inner(raw as u8))
            }
            ResponseKind::R3 | ResponseKind::R4 => Self::SpiR4(spi::R4::from_raw(raw)),
            ResponseKind::R5 => Self::SpiR5(spi::R5::from_raw(raw as u16)),
            ResponseKind::R7 => Self::SpiR7(spi::R7::from_raw(raw)),
        }
    }

    /// Encodes the response into the bit sequence a card drives for it.
    pub fn encode(&self) -> BitSeq {
        match self {
            Self::None | Self::Invalid(_) => BitSeq::new(),
            Self::R1(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::R3(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::R4(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::R5(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::R6(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::R7(r) => BitSeq::from_u64(r.into_u64(), 48),
            Self::SpiR1(r) => BitSeq::from_u64(r.into_inner() as u64, spi::ModifiedR1::BITS),
            Self::SpiR4(r) => BitSeq::from_u64(r.into_u64(), spi::R4::BITS),
            Self::SpiR5(r) => BitSeq::from_u64(r.into_u16() as u64, spi::R5::BITS),
            Self::SpiR7(r) => BitSeq::from_u64(r.into_u64(), spi::R7::BITS),
        }
    }

    /// Gets the command index echoed by the response, for formats that carry one.
    pub fn command_index(&self) -> Option<u8> {
        match self {
            Self::R1(r) => Some(r.command_index()),
            Self::R5(r) => Some(r.command_index()),
            Self::R6(r) => Some(r.command_index()),
            Self::R7(r) => Some(r.command_index()),
            _ => None,
        }
    }

    /// Gets the register data of an R5 response.
    pub fn data(&self) -> Option<u8> {
        match self {
            Self::R5(r) => Some(r.data()),
            Self::SpiR5(r) => Some(r.data()),
            _ => None,
        }
    }

    /// Gets the normalized operating condition of an R4 response.
    pub fn op_cond(&self) -> Option<OpCond> {
        match self {
            Self::R4(r) => Some(OpCond {
                ready: r.ready(),
                number_of_functions: r.number_of_functions(),
                memory_present: r.memory_present(),
                io_ocr: r.io_ocr(),
            }),
            Self::SpiR4(r) => Some(OpCond {
                ready: r.ready(),
                number_of_functions: r.number_of_functions(),
                memory_present: r.memory_present(),
                io_ocr: r.io_ocr(),
            }),
            _ => None,
        }
    }

    /// Gets the Modified R1 carried by an SPI response.
    pub fn modified_r1(&self) -> Option<spi::ModifiedR1> {
        match self {
            Self::SpiR1(r) => Some(*r),
            Self::SpiR4(r) => Some(r.modified_r1()),
            Self::SpiR5(r) => Some(r.modified_r1()),
            Self::SpiR7(r) => Some(r.modified_r1()),
            _ => None,
        }
    }

    /// Gets the rejection reason of an invalid response.
    pub const fn invalid(&self) -> Option<InvalidResponse> {
        match self {
            Self::Invalid(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Checks the error bits carried by the response.
    ///
    /// A CRC error reported by the card is returned as [Error::CrcMismatch] so the command can be
    /// retried. An R1 whose current state is not the I/O state is rejected as
    /// [Error::CardStatus].
    pub fn check_status(&self) -> Result<(), Error> {
        match self {
            Self::Invalid(reason) => Err(reason.fault().into()),
            Self::R1(r) => {
                let status = r.card_status();
                match status {
                    s if s.com_crc_error() => Err(Error::CrcMismatch),
                    s if s.is_err() => Err(Error::CardStatus(s.into_u32())),
                    s if s.current_state() != CardStatus::IO_STATE => {
                        Err(Error::CardStatus(s.into_u32()))
                    }
                    _ => Ok(()),
                }
            }
            Self::R6(r) => {
                let status = r.card_status();
                match status {
                    s if s.com_crc_error() => Err(Error::CrcMismatch),
                    s if s.is_err() => Err(Error::CardStatus(s.into_u32())),
                    _ => Ok(()),
                }
            }
            Self::R5(r) => match r.flags() {
                f if f.com_crc_error() => Err(Error::CrcMismatch),
                f if f.is_err() => Err(Error::IoStatus(f)),
                _ => Ok(()),
            },
            other => match other.modified_r1() {
                Some(r1) if r1.crc_error() => Err(Error::CrcMismatch),
                Some(r1) if r1.is_err() => Err(Error::CardStatus(r1.into_inner() as u32)),
                _ => Ok(()),
            },
        }
    }
}

impl core::fmt::Display for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::R1(r) => write!(f, "R1 {{ CMD{}, status: {:#010x} }}", r.command_index(), r.raw_card_status()),
            Self::R3(r) => write!(f, "R3 {{ ocr: {:#010x} }}", r.ocr()),
            Self::R4(r) => write!(
                f,
                "R4 {{ ready: {}, functions: {}, memory: {}, ocr: {:#08x} }}",
                r.ready(),
                r.number_of_functions(),
                r.memory_present(),
                r.raw_io_ocr()
            ),
            Self::R5(r) => write!(f, "R5 {{ CMD{}, {}, data: {:#04x} }}", r.command_index(), r.flags(), r.data()),
            Self::R6(r) => write!(f, "R6 {{ CMD{}, rca: {:#06x}, status: {:#06x} }}", r.command_index(), r.rca(), r.raw_status()),
            Self::R7(r) => write!(f, "R7 {{ CMD{}, voltage: {:#x}, pattern: {:#04x} }}", r.command_index(), r.voltage_accepted(), r.check_pattern()),
            Self::SpiR1(r) => write!(f, "{r}"),
            Self::SpiR4(r) => write!(
                f,
                "R4 {{ {}, ready: {}, functions: {}, memory: {}, ocr: {:#08x} }}",
                r.modified_r1(),
                r.ready(),
                r.number_of_functions(),
                r.memory_present(),
                r.raw_io_ocr()
            ),
            Self::SpiR5(r) => write!(f, "R5 {{ {}, data: {:#04x} }}", r.modified_r1(), r.data()),
            Self::SpiR7(r) => write!(f, "R7 {{ {}, pattern: {:#04x} }}", r.modified_r1(), r.check_pattern()),
            Self::Invalid(reason) => write!(f, "invalid: {reason:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_r5() {
        let r5 = sd::R5::new(52, Flags::new(IoCurrentState::Command), 0x12);
        let bits = Response::R5(r5).encode();

        let response = Response::decode(&bits, ResponseKind::R5);
        assert_eq!(response, Response::R5(r5));
        assert_eq!(response.command_index(), Some(52));
        assert_eq!(response.data(), Some(0x12));
        assert_eq!(response.check_status(), Ok(()));
    }

    #[test]
    fn test_decode_rejects_crc_error() {
        let r5 = sd::R5::new(52, Flags::new(IoCurrentState::Command), 0x12);
        let mut bits = Response::R5(r5).encode();
        bits.flip(30);

        let response = Response::decode(&bits, ResponseKind::R5);
        assert!(matches!(response.invalid(), Some(InvalidResponse::Crc { .. })));
        assert_eq!(response.check_status(), Err(Error::CrcMismatch));
    }

    #[test]
    fn test_decode_framing() {
        let bits = Response::R6(sd::R6::new(3, 1, CardStatus::from_u32(0))).encode();

        let mut no_end = bits;
        no_end.flip(47);
        assert_eq!(
            Response::decode(&no_end, ResponseKind::R6),
            Response::Invalid(InvalidResponse::Framing)
        );

        let mut host_dir = bits;
        host_dir.flip(1);
        assert_eq!(
            Response::decode(&host_dir, ResponseKind::R6),
            Response::Invalid(InvalidResponse::Framing)
        );

        assert_eq!(
            Response::decode(&BitSeq::from_u64(0, 40), ResponseKind::R6),
            Response::Invalid(InvalidResponse::Length(40))
        );
    }

    #[test]
    fn test_decode_r4_checks_crc_and_reserved_index() {
        let r4 = sd::R4::new(true, 1, false, IoOcr::from_u32(0x00ff_8000));
        let bits = Response::R4(r4).encode();
        assert_eq!((bits.value() >> 1) & 0x7f, 0x48);

        let op_cond = Response::decode(&bits, ResponseKind::R4).op_cond().unwrap();
        assert!(op_cond.ready);
        assert_eq!(op_cond.number_of_functions, 1);
        assert_eq!(op_cond.io_ocr.into_u32(), 0x00ff_8000);

        // a flipped OCR bit no longer matches the CRC7
        let mut corrupt = bits;
        corrupt.flip(20);
        assert!(matches!(
            Response::decode(&corrupt, ResponseKind::R4).invalid(),
            Some(InvalidResponse::Crc { .. })
        ));

        // the old all-ones CRC field is not accepted
        let all_ones = BitSeq::from_u64(bits.value() | (0x7f << 1), 48);
        assert!(matches!(
            Response::decode(&all_ones, ResponseKind::R4).invalid(),
            Some(InvalidResponse::Crc { .. })
        ));

        // a valid CRC over a non-reserved index field
        let wrong_index = sd::frame(0x05, (bits.value() >> 8) as u32);
        assert_eq!(
            Response::decode(&BitSeq::from_u64(wrong_index, 48), ResponseKind::R4),
            Response::Invalid(InvalidResponse::Reserved)
        );
    }

    #[test]
    fn test_decode_spi() {
        let mut r1 = spi::ModifiedR1::new();
        r1.set_idle(true);

        let bits = Response::SpiR1(r1).encode();
        assert_eq!(bits.len(), 8);
        assert_eq!(Response::decode_spi(&bits, ResponseKind::R1), Response::SpiR1(r1));

        let r5 = spi::R5::new(spi::ModifiedR1::new(), 0x99);
        let bits = Response::SpiR5(r5).encode();
        assert_eq!(Response::decode_for(Mode::Spi, &bits, ResponseKind::R5).data(), Some(0x99));

        assert_eq!(
            Response::decode_spi(&BitSeq::from_u64(0x80, 8), ResponseKind::R1),
            Response::Invalid(InvalidResponse::Framing)
        );
        assert_eq!(
            Response::decode_spi(&BitSeq::from_u64(0, 8), ResponseKind::R5),
            Response::Invalid(InvalidResponse::Length(8))
        );
    }

    #[test]
    fn test_status_errors() {
        let mut flags = Flags::new(IoCurrentState::Command);
        flags.set_out_of_range(true);
        let response = Response::R5(sd::R5::new(52, flags, 0));
        assert_eq!(response.check_status(), Err(Error::IoStatus(flags)));

        let mut r1 = spi::ModifiedR1::new();
        r1.set_crc_error(true);
        let response = Response::SpiR5(spi::R5::new(r1, 0));
        assert_eq!(response.check_status(), Err(Error::CrcMismatch));
    }

    #[test]
    fn test_r1_requires_io_state() {
        let mut status = CardStatus::from_u32(0);
        status.set_current_state(CardStatus::IO_STATE);
        assert_eq!(Response::R1(sd::R1::new(7, status)).check_status(), Ok(()));

        // transfer state of a memory card
        status.set_current_state(0x4);
        assert_eq!(
            Response::R1(sd::R1::new(7, status)).check_status(),
            Err(Error::CardStatus(0x0800))
        );
    }
}
