use crate::{
    Argument,
    Error,
    Mode,
    response::ResponseKind,
};

/// Represents the command indices issued by the SDIO host.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::IntoStaticStr)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandIndex {
    /// Represents the `GO_IDLE_STATE` command (CMD0) index.
    GoIdleState      = 0,
    /// Represents the `SEND_RELATIVE_ADDR` command (CMD3) index.
    SendRelativeAddr = 3,
    /// Represents the `IO_SEND_OP_COND` command (CMD5) index.
    IoSendOpCond     = 5,
    /// Represents the `SELECT/DESELECT_CARD` command (CMD7) index.
    SelectCard       = 7,
    /// Represents the `SEND_IF_COND` command (CMD8) index.
    SendIfCond       = 8,
    /// Represents the I/O Read/Write Direct command (CMD52) index.
    IoRwDirect       = 52,
    /// Represents the I/O Read/Write Extended command (CMD53) index.
    IoRwExtended     = 53,
}

impl CommandIndex {
    /// Represents the largest index that fits the 6-bit field.
    pub const MAX: u8 = 0x3f;

    /// Creates a new [CommandIndex].
    pub const fn new() -> Self {
        Self::GoIdleState
    }

    /// Attempts to convert an inner value into a [CommandIndex].
    pub const fn try_from_inner(val: u8) -> Result<Self, Error> {
        match val {
            0 => Ok(Self::GoIdleState),
            3 => Ok(Self::SendRelativeAddr),
            5 => Ok(Self::IoSendOpCond),
            7 => Ok(Self::SelectCard),
            8 => Ok(Self::SendIfCond),
            52 => Ok(Self::IoRwDirect),
            53 => Ok(Self::IoRwExtended),
            _ => Err(Error::invalid_argument(Argument::CommandIndex(val))),
        }
    }

    /// Converts the [CommandIndex] into an inner value.
    pub const fn into_inner(self) -> u8 {
        self as u8
    }

    /// Gets the response format the card answers the command with in the given bus mode.
    pub const fn response_kind(self, mode: Mode) -> ResponseKind {
        match (self, mode) {
            (Self::GoIdleState, Mode::Sd) => ResponseKind::None,
            (Self::GoIdleState, Mode::Spi) => ResponseKind::R1,
            (Self::SendRelativeAddr, _) => ResponseKind::R6,
            (Self::IoSendOpCond, _) => ResponseKind::R4,
            (Self::SelectCard, _) => ResponseKind::R1b,
            (Self::SendIfCond, _) => ResponseKind::R7,
            (Self::IoRwDirect | Self::IoRwExtended, _) => ResponseKind::R5,
        }
    }
}

impl Default for CommandIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<u8> for CommandIndex {
    type Error = Error;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::try_from_inner(val)
    }
}

impl From<CommandIndex> for u8 {
    fn from(val: CommandIndex) -> Self {
        val.into_inner()
    }
}

impl core::fmt::Display for CommandIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "CMD{} ({name})", self.into_inner())
    }
}
