//! Error types returned by the SDIO host.

use crate::{response::Flags, state::State};

/// Identifies the caller-supplied argument rejected by an operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Argument {
    /// The function number does not fit in 3 bits.
    FunctionNumber(u8),
    /// The register address does not fit in 17 bits.
    RegisterAddress(u32),
    /// The CMD53 byte count is zero or larger than 512.
    ByteCount(u16),
    /// The CMD53 block count is zero or larger than 511.
    BlockCount(u16),
    /// The block length is zero, larger than 512, or exceeds the function maximum.
    BlockLength(usize),
    /// The data buffer length does not match the requested transfer.
    BufferLength(usize),
    /// The bus width is not supported by the transport.
    BusWidth(u8),
    /// The clock rate is zero.
    ClockRate(u32),
    /// The command index does not fit in 6 bits.
    CommandIndex(u8),
}

impl core::fmt::Display for Argument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FunctionNumber(n) => write!(f, "function number: {n}"),
            Self::RegisterAddress(a) => write!(f, "register address: {a:#x}"),
            Self::ByteCount(c) => write!(f, "byte count: {c}"),
            Self::BlockCount(c) => write!(f, "block count: {c}"),
            Self::BlockLength(l) => write!(f, "block length: {l}"),
            Self::BufferLength(l) => write!(f, "buffer length: {l}"),
            Self::BusWidth(w) => write!(f, "bus width: {w}"),
            Self::ClockRate(r) => write!(f, "clock rate: {r} Hz"),
            Self::CommandIndex(i) => write!(f, "command index: {i}"),
        }
    }
}

/// Transient transport faults that an operation may be retried on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// No start bit was seen within the timeout.
    Timeout,
    /// A CRC7 or CRC16 check failed.
    Crc,
    /// A start, transmission, or end bit had the wrong value.
    Framing,
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Crc => write!(f, "crc mismatch"),
            Self::Framing => write!(f, "framing"),
        }
    }
}

/// Represents an SDIO host error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The card did not answer within the configured number of clock cycles.
    TransportTimeout,
    /// A response or data block failed its CRC check.
    CrcMismatch,
    /// A response or data block had malformed start, transmission, or end bits.
    Framing,
    /// A caller-supplied argument was out of range.
    InvalidArgument(Argument),
    /// The card never reported ready during operating condition negotiation.
    CardNotReady,
    /// The card supports none of the voltages in the host window.
    VoltageMismatch {
        /// The card I/O OCR.
        card: u32,
        /// The host voltage window.
        host: u32,
    },
    /// The response index did not match the issued command.
    UnexpectedResponseType {
        /// The index of the issued command.
        expected: u8,
        /// The index found in the response.
        received: u8,
    },
    /// The card reported an error in the R5 response flags.
    IoStatus(Flags),
    /// The card reported an error in the R1/R6 card status.
    CardStatus(u32),
    /// The card rejected a written data block with the given status token.
    WriteRejected(u8),
    /// The operation still failed after the configured number of attempts.
    RetriesExhausted {
        /// The number of attempts made.
        attempts: u8,
        /// The fault seen on the final attempt.
        last: Fault,
    },
    /// Indicates an invalid transaction state transition.
    InvalidTransition {
        /// Represents the current state.
        from: State,
        /// Represents the transition state.
        to: State,
    },
    /// The transport clock is not running.
    ClockStopped,
    /// The operation is not supported by the transport or card.
    Unsupported,
}

impl Error {
    /// Creates an invalid argument [Error].
    #[inline]
    pub const fn invalid_argument(arg: Argument) -> Self {
        Self::InvalidArgument(arg)
    }

    /// Creates an invalid transition [Error].
    #[inline]
    pub const fn invalid_transition(from: State, to: State) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Gets the transient [Fault] behind the error, if the operation may be retried.
    pub const fn fault(&self) -> Option<Fault> {
        match self {
            Self::TransportTimeout => Some(Fault::Timeout),
            Self::CrcMismatch => Some(Fault::Crc),
            Self::Framing => Some(Fault::Framing),
            _ => None,
        }
    }

    /// Gets whether the error is a transient transport fault.
    pub const fn is_transient(&self) -> bool {
        self.fault().is_some()
    }
}

impl From<Fault> for Error {
    fn from(val: Fault) -> Self {
        match val {
            Fault::Timeout => Self::TransportTimeout,
            Fault::Crc => Self::CrcMismatch,
            Fault::Framing => Self::Framing,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TransportTimeout => write!(f, "transport timeout"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::Framing => write!(f, "framing error"),
            Self::InvalidArgument(arg) => write!(f, "invalid argument: {arg}"),
            Self::CardNotReady => write!(f, "card not ready"),
            Self::VoltageMismatch { card, host } => {
                write!(f, "no common voltage: card OCR {card:#08x}, host window {host:#08x}")
            }
            Self::UnexpectedResponseType { expected, received } => {
                write!(f, "unexpected response: expected CMD{expected}, received CMD{received}")
            }
            Self::IoStatus(flags) => write!(f, "I/O status error: {flags}"),
            Self::CardStatus(status) => write!(f, "card status error: {status:#010x}"),
            Self::WriteRejected(status) => write!(f, "write rejected: status {status:#05b}"),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {attempts} attempts: {last}")
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid state transition, from: {from}, to: {to}")
            }
            Self::ClockStopped => write!(f, "clock stopped"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

impl core::error::Error for Error {}
