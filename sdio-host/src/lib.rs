//! # SDIO 2.0 host
//!
//! ## Overview
//!
//! Host side of the SDIO 2.0 protocol for driving a device-under-test in an event-driven
//! hardware simulation. The crate builds and frames commands, decodes responses, runs the card
//! initialization handshake and performs CMD52/CMD53 transfers over the native SD bus (1 or 4
//! data lines) or SPI.
//!
//! The simulation supplies the bus clock and the pins through the [phy::Clock] and
//! [phy::Pins] traits; everything above them is implemented here.
//!
//! ## Example
//!
//! ```rust, no_run
//! # use sdio_host::{Config, SdioHost, phy::{AnyPhy, Clock, Pins}};
//! # fn run<C: Clock, P: Pins>(clock: C, pins: P) -> Result<(), sdio_host::Error> {
//! let phy = AnyPhy::sd(clock, pins);
//! let mut host = SdioHost::new(phy, Config::new())?;
//!
//! let card = host.sdio_init(true)?;
//! let revision = host.read_reg(sdio_host::FunctionNumber::Registers, 0x00)?;
//! # let _ = (card, revision);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// MUST be the first module
mod fmt;

mod bits;
pub mod cccr;
pub mod command;
mod config;
mod context;
pub mod crc;
pub mod data;
mod error;
mod host;
mod init;
mod io_ocr;
pub mod phy;
pub mod response;
mod state;

pub use bits::BitSeq;
pub use command::{BlockMode, Command, CommandIndex, FunctionNumber, OpCode};
pub use config::Config;
pub use context::{CardContext, CardInfo, FunctionInfo};
pub use error::{Argument, Error, Fault};
pub use host::{SdioHost, TransferData};
pub use init::{InitError, InitSequence, InitStage, InitState};
pub use io_ocr::IoOcr;
pub use response::{Response, ResponseKind};
pub use state::State;

/// Represents the bus mode of the transport.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Native SD bus.
    #[default]
    Sd,
    /// SPI bus.
    Spi,
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Represents the number of data lines used for data blocks.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusWidth {
    /// DAT0 only.
    #[default]
    One  = 1,
    /// DAT0 to DAT3.
    Four = 4,
}

impl BusWidth {
    /// Attempts to convert a line count into a [BusWidth].
    pub const fn try_from_u8(val: u8) -> Result<Self, Error> {
        match val {
            1 => Ok(Self::One),
            4 => Ok(Self::Four),
            _ => Err(Error::invalid_argument(Argument::BusWidth(val))),
        }
    }

    /// Gets the number of active data lines.
    pub const fn lines(self) -> usize {
        self as usize
    }

    /// Gets the mask of the active data lines in a symbol.
    pub const fn line_mask(self) -> u8 {
        match self {
            Self::One => 0b0001,
            Self::Four => 0b1111,
        }
    }

    /// Gets the number of symbols (bit-times) needed for one byte.
    pub const fn symbols_per_byte(self) -> usize {
        8 / self.lines()
    }

    /// Gets the bus width field of the CCCR bus interface control register.
    pub const fn cccr_bits(self) -> u8 {
        match self {
            Self::One => 0b00,
            Self::Four => 0b10,
        }
    }
}

impl TryFrom<u8> for BusWidth {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(val)
    }
}
