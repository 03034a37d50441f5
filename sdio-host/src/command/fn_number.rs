use crate::{Argument, Error};

/// Represents the SDIO command function number.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, strum::EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FunctionNumber {
    /// Indicates access to the Common I/O Area:
    /// - CCCR (Card Common Control Registers)
    /// - FBR (Function Basic Registers)
    /// - CIS (Card Information Structure)
    Registers = 0,
    /// I/O function 1.
    Io1       = 1,
    /// I/O function 2.
    Io2       = 2,
    /// I/O function 3.
    Io3       = 3,
    /// I/O function 4.
    Io4       = 4,
    /// I/O function 5.
    Io5       = 5,
    /// I/O function 6.
    Io6       = 6,
    /// I/O function 7.
    Io7       = 7,
}

impl FunctionNumber {
    /// Maximum function number addressable by a 3-bit field.
    pub const MAX: u8 = 7;

    /// Creates a new [FunctionNumber].
    pub const fn new() -> Self {
        Self::Registers
    }

    /// Attempts to convert a [`u8`] into a [FunctionNumber].
    pub const fn try_from_u8(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::Registers),
            1 => Ok(Self::Io1),
            2 => Ok(Self::Io2),
            3 => Ok(Self::Io3),
            4 => Ok(Self::Io4),
            5 => Ok(Self::Io5),
            6 => Ok(Self::Io6),
            7 => Ok(Self::Io7),
            _ => Err(Error::invalid_argument(Argument::FunctionNumber(val))),
        }
    }

    /// Converts a [FunctionNumber] into a [`u8`].
    pub const fn into_u8(self) -> u8 {
        self as u8
    }

    /// Gets the base address of the function's FBR in the Common I/O Area.
    pub const fn fbr_base(self) -> u32 {
        (self as u32) << 8
    }
}

impl Default for FunctionNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<u8> for FunctionNumber {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(val)
    }
}

impl From<FunctionNumber> for u8 {
    fn from(val: FunctionNumber) -> Self {
        val.into_u8()
    }
}

impl core::fmt::Display for FunctionNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "F{}", self.into_u8())
    }
}
