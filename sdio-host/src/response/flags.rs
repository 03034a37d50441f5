/// Represents the current I/O state reported in R5 responses.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoCurrentState {
    /// Indicates the card is disabled.
    Disabled = 0,
    /// Indicates the card's DAT lines are free.
    Command  = 1,
    /// Indicates an active data transfer.
    Transfer = 2,
    /// Reserved encoding.
    Reserved = 3,
}

impl IoCurrentState {
    /// Creates a new [IoCurrentState].
    pub const fn new() -> Self {
        Self::Disabled
    }

    /// Converts the two-bit field into an [IoCurrentState].
    pub const fn from_inner(val: u8) -> Self {
        match val & 0b11 {
            0 => Self::Disabled,
            1 => Self::Command,
            2 => Self::Transfer,
            _ => Self::Reserved,
        }
    }

    /// Converts the [IoCurrentState] into an inner value.
    pub const fn into_inner(self) -> u8 {
        self as u8
    }
}

impl Default for IoCurrentState {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for IoCurrentState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Command => write!(f, "command"),
            Self::Transfer => write!(f, "transfer"),
            Self::Reserved => write!(f, "reserved"),
        }
    }
}

bitfield::bitfield! {
    /// Represents the response flags carried by SD mode R5 responses.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Flags(u8);
    impl Debug;
    u8;
    /// The CRC of the previous command failed.
    pub com_crc_error, set_com_crc_error: 7;
    /// The command is not legal for the card state.
    pub illegal_command, set_illegal_command: 6;
    raw_io_current_state, set_raw_io_current_state: 5, 4;
    /// A general or unknown error occurred.
    pub error, set_error: 3;
    /// An invalid function number was requested.
    pub function_number, set_function_number: 1;
    /// The command argument was out of the allowed range.
    pub out_of_range, set_out_of_range: 0;
}

impl Flags {
    /// Error bits of the flags byte.
    pub const ERROR_MASK: u8 = 0b1100_1011;

    /// Creates [Flags] with no errors and the given I/O state.
    pub fn new(state: IoCurrentState) -> Self {
        let mut flags = Self(0);
        flags.set_io_current_state(state);
        flags
    }

    /// Converts a [`u8`] into [Flags].
    pub const fn from_u8(val: u8) -> Self {
        Self(val)
    }

    /// Converts the [Flags] into a [`u8`].
    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// Gets the current I/O state.
    pub fn io_current_state(&self) -> IoCurrentState {
        IoCurrentState::from_inner(self.raw_io_current_state())
    }

    /// Sets the current I/O state.
    pub fn set_io_current_state(&mut self, state: IoCurrentState) {
        self.set_raw_io_current_state(state.into_inner());
    }

    /// Gets whether any error flag is set.
    pub const fn is_err(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

impl core::fmt::Display for Flags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Flags {{")?;
        write!(f, " com_crc_error: {},", self.com_crc_error())?;
        write!(f, " illegal_command: {},", self.illegal_command())?;
        write!(f, " io_current_state: {},", self.io_current_state())?;
        write!(f, " error: {},", self.error())?;
        write!(f, " function_number: {},", self.function_number())?;
        write!(f, " out_of_range: {}", self.out_of_range())?;
        write!(f, " }}")
    }
}

bitfield::bitfield! {
    /// Represents the 32-bit card status carried by R1 responses.
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CardStatus(u32);
    impl Debug;
    u8;
    /// The command argument was out of range.
    pub out_of_range, set_out_of_range: 31;
    /// The CRC of the previous command failed.
    pub com_crc_error, set_com_crc_error: 23;
    /// The command is not legal for the card state.
    pub illegal_command, set_illegal_command: 22;
    /// A general or unknown error occurred.
    pub error, set_error: 19;
    /// Represents the card state; I/O only cards report `0xf`.
    pub current_state, set_current_state: 12, 9;
}

impl CardStatus {
    /// Error bits of the card status.
    pub const ERROR_MASK: u32 = 0x80c8_0000;
    /// Current state reported by I/O only cards.
    pub const IO_STATE: u8 = 0xf;

    /// Converts a [`u32`] into a [CardStatus].
    pub const fn from_u32(val: u32) -> Self {
        Self(val)
    }

    /// Converts the [CardStatus] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Gets whether any error bit is set.
    pub const fn is_err(&self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut flags = Flags::new(IoCurrentState::Transfer);
        assert_eq!(flags.into_u8(), 0x20);
        assert!(!flags.is_err());

        flags.set_function_number(true);
        assert!(flags.is_err());
        assert_eq!(flags.io_current_state(), IoCurrentState::Transfer);

        assert!(Flags::from_u8(0x80).com_crc_error());
        assert!(Flags::from_u8(0x01).out_of_range());
    }

    #[test]
    fn test_card_status() {
        let mut status = CardStatus::from_u32(0);
        status.set_current_state(CardStatus::IO_STATE);
        assert_eq!(status.into_u32(), 0x1e00);
        assert!(!status.is_err());

        status.set_illegal_command(true);
        assert!(status.is_err());
    }
}
