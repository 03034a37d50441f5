//! SDIO command types and 48-bit command framing.

use crate::{Argument, BitSeq, Error, crc::Crc7};

mod arg;
mod block_mode;
mod flag;
mod fn_number;
mod index;
mod op_code;

pub use arg::{Cmd5, Cmd8, Cmd52, Cmd53, REGISTER_ADDRESS_MAX};
pub use block_mode::BlockMode;
pub use flag::{RawFlag, RwFlag};
pub use fn_number::FunctionNumber;
pub use index::CommandIndex;
pub use op_code::OpCode;

bitfield::bitfield! {
    /// Represents a 48-bit command frame as sent on the CMD line.
    ///
    /// The frame is immutable: the CRC is computed at construction.
    #[derive(Clone, Copy, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Command(u64);
    impl Debug;
    u8;
    /// Represents the start bit (always 0).
    pub start, _: 47;
    /// Represents the direction bit (1 for host to card).
    pub transmission, _: 46;
    /// Represents the command index field.
    pub raw_index, _: 45, 40;
    /// Represents the command argument.
    pub u32, argument, _: 39, 8;
    /// Represents the CRC7 field.
    pub raw_crc, _: 7, 1;
    /// Represents the end bit (always 1).
    pub end, _: 0;
}

impl Command {
    /// Represents the bit length of a command frame.
    pub const BITS: usize = 48;

    /// Creates a new [Command] frame.
    pub const fn new(index: CommandIndex, argument: u32) -> Self {
        Self::build(index.into_inner(), argument)
    }

    /// Creates a [Command] frame for an arbitrary 6-bit index.
    pub const fn try_new_raw(index: u8, argument: u32) -> Result<Self, Error> {
        if index > CommandIndex::MAX {
            Err(Error::invalid_argument(Argument::CommandIndex(index)))
        } else {
            Ok(Self::build(index, argument))
        }
    }

    const fn build(index: u8, argument: u32) -> Self {
        let head = (1u64 << 38) | (((index & CommandIndex::MAX) as u64) << 32) | argument as u64;
        let crc = Crc7::calculate_bits(head, 40).into_u8() as u64;

        Self((head << 8) | (crc << 1) | 1)
    }

    /// Creates the `GO_IDLE_STATE` command (CMD0).
    pub const fn go_idle_state() -> Self {
        Self::new(CommandIndex::GoIdleState, 0)
    }

    /// Creates the `SEND_RELATIVE_ADDR` command (CMD3).
    pub const fn send_relative_addr() -> Self {
        Self::new(CommandIndex::SendRelativeAddr, 0)
    }

    /// Creates the `IO_SEND_OP_COND` command (CMD5).
    pub const fn io_send_op_cond(arg: Cmd5) -> Self {
        Self::new(CommandIndex::IoSendOpCond, arg.into_u32())
    }

    /// Creates the `SELECT/DESELECT_CARD` command (CMD7).
    pub const fn select_card(rca: u16) -> Self {
        Self::new(CommandIndex::SelectCard, (rca as u32) << 16)
    }

    /// Creates the `SEND_IF_COND` command (CMD8).
    pub const fn send_if_cond(arg: Cmd8) -> Self {
        Self::new(CommandIndex::SendIfCond, arg.into_u32())
    }

    /// Creates the `IO_RW_DIRECT` command (CMD52).
    pub const fn io_rw_direct(arg: Cmd52) -> Self {
        Self::new(CommandIndex::IoRwDirect, arg.into_u32())
    }

    /// Creates the `IO_RW_EXTENDED` command (CMD53).
    pub const fn io_rw_extended(arg: Cmd53) -> Self {
        Self::new(CommandIndex::IoRwExtended, arg.into_u32())
    }

    /// Attempts to get the [CommandIndex] of the frame.
    pub fn index(&self) -> Result<CommandIndex, Error> {
        CommandIndex::try_from_inner(self.raw_index())
    }

    /// Gets the CRC field of the frame.
    pub fn crc(&self) -> Crc7 {
        Crc7::from_u8(self.raw_crc())
    }

    /// Recomputes the CRC over the first 40 bits and compares it with the CRC field.
    pub fn verify_crc(&self) -> bool {
        Crc7::calculate_bits(self.0 >> 8, 40) == self.crc()
    }

    /// Encodes the frame into the bit sequence driven on the CMD line.
    pub const fn encode(&self) -> BitSeq {
        BitSeq::from_u64(self.0, Self::BITS)
    }

    /// Attempts to decode a frame sampled from the CMD line.
    pub fn try_from_bits(bits: &BitSeq) -> Result<Self, Error> {
        if bits.len() != Self::BITS {
            return Err(Error::Framing);
        }

        match Self(bits.value()) {
            cmd if cmd.start() || !cmd.transmission() || !cmd.end() => Err(Error::Framing),
            cmd if !cmd.verify_crc() => Err(Error::CrcMismatch),
            cmd => Ok(cmd),
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CMD{}({:#010x})", self.raw_index(), self.argument())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_idle_frame() {
        let cmd = Command::go_idle_state();

        assert_eq!(cmd.encode().value(), 0x40_0000_0000_95);
        assert_eq!(cmd.encode().len(), 48);
        assert!(cmd.verify_crc());
    }

    #[test]
    fn test_cmd52_frame() {
        let arg = Cmd52::new(
            FunctionNumber::Io1,
            0x100,
            RwFlag::Write,
            RawFlag::WriteOnly,
            0xab,
        )
        .unwrap();
        let cmd = Command::io_rw_direct(arg);
        let bits = cmd.encode();

        assert_eq!(bits.bit(0), Some(false));
        assert_eq!(bits.bit(1), Some(true));
        assert_eq!(bits.bit(47), Some(true));
        assert_eq!(cmd.raw_index(), 52);
        assert_eq!(cmd.argument(), 0x9002_00ab);
        assert_eq!(cmd.index(), Ok(CommandIndex::IoRwDirect));
        assert_eq!(Command::try_from_bits(&bits), Ok(cmd));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let bits = Command::select_card(0x0001).encode();

        for i in 2..47 {
            let mut corrupt = bits;
            corrupt.flip(i);
            assert_eq!(Command::try_from_bits(&corrupt), Err(Error::CrcMismatch), "bit {i}");
        }

        let mut corrupt = bits;
        corrupt.flip(47);
        assert_eq!(Command::try_from_bits(&corrupt), Err(Error::Framing));

        let short = BitSeq::from_u64(bits.value() >> 1, 47);
        assert_eq!(Command::try_from_bits(&short), Err(Error::Framing));
    }

    #[test]
    fn test_raw_index() {
        assert!(Command::try_new_raw(63, 0).is_ok());
        assert_eq!(
            Command::try_new_raw(64, 0),
            Err(Error::invalid_argument(Argument::CommandIndex(64)))
        );
    }
}
