//! Argument layouts of the SDIO commands.

use super::{BlockMode, FunctionNumber, OpCode, RawFlag, RwFlag};
use crate::{Argument, Error, io_ocr::IoOcr};

/// Largest register address reachable through the 17-bit address field.
pub const REGISTER_ADDRESS_MAX: u32 = 0x1_ffff;

const fn check_address(address: u32) -> Result<u32, Error> {
    if address > REGISTER_ADDRESS_MAX {
        Err(Error::invalid_argument(Argument::RegisterAddress(address)))
    } else {
        Ok(address)
    }
}

bitfield::bitfield! {
    /// Represents the argument of the I/O Read/Write Direct command (CMD52).
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Cmd52(u32);
    impl Debug;
    u8;
    raw_rw, set_raw_rw: 31;
    /// Represents the function number field.
    pub raw_function, set_raw_function: 30, 28;
    raw_raw, set_raw_raw: 27;
    /// Represents the register address field.
    pub u32, register_address, set_register_address: 25, 9;
    /// Represents the write data, or stuff bits on reads.
    pub data, set_data: 7, 0;
}

impl Cmd52 {
    /// Creates a new [Cmd52] argument, rejecting addresses outside the 17-bit range.
    pub fn new(
        function: FunctionNumber,
        register_address: u32,
        rw: RwFlag,
        raw: RawFlag,
        data: u8,
    ) -> Result<Self, Error> {
        let mut arg = Self(0);

        arg.set_raw_rw(rw.into_bool());
        arg.set_raw_function(function.into_u8());
        arg.set_raw_raw(raw.into_bool());
        arg.set_register_address(check_address(register_address)?);
        arg.set_data(data);

        Ok(arg)
    }

    /// Converts a [`u32`] into a [Cmd52].
    pub const fn from_u32(val: u32) -> Self {
        Self(val)
    }

    /// Converts the [Cmd52] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Gets the read-write flag.
    pub fn rw_flag(&self) -> RwFlag {
        self.raw_rw().into()
    }

    /// Gets the read-after-write flag.
    pub fn raw_flag(&self) -> RawFlag {
        self.raw_raw().into()
    }

    /// Gets the function number.
    pub fn function(&self) -> FunctionNumber {
        FunctionNumber::try_from_u8(self.raw_function()).unwrap_or_default()
    }
}

bitfield::bitfield! {
    /// Represents the argument of the I/O Read/Write Extended command (CMD53).
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Cmd53(u32);
    impl Debug;
    u8;
    raw_rw, set_raw_rw: 31;
    /// Represents the function number field.
    pub raw_function, set_raw_function: 30, 28;
    raw_block_mode, set_raw_block_mode: 27;
    raw_op_code, set_raw_op_code: 26;
    /// Represents the register address field.
    pub u32, register_address, set_register_address: 25, 9;
    /// Represents the raw byte or block count field.
    pub u16, raw_count, set_raw_count: 8, 0;
}

impl Cmd53 {
    /// Largest byte count of a byte mode transfer.
    pub const MAX_BYTE_COUNT: u16 = 512;
    /// Largest block count of a block mode transfer.
    pub const MAX_BLOCK_COUNT: u16 = 511;

    /// Creates a new [Cmd53] argument.
    ///
    /// In byte mode `count` is 1..=512, with 512 encoded as zero. In block mode `count` is
    /// 1..=511; infinite block transfers are not supported.
    pub fn new(
        function: FunctionNumber,
        register_address: u32,
        rw: RwFlag,
        block_mode: BlockMode,
        op_code: OpCode,
        count: u16,
    ) -> Result<Self, Error> {
        let raw_count = match block_mode {
            BlockMode::Byte if count == 0 || count > Self::MAX_BYTE_COUNT => {
                return Err(Error::invalid_argument(Argument::ByteCount(count)));
            }
            BlockMode::Block if count == 0 || count > Self::MAX_BLOCK_COUNT => {
                return Err(Error::invalid_argument(Argument::BlockCount(count)));
            }
            _ => count & 0x1ff,
        };

        let mut arg = Self(0);

        arg.set_raw_rw(rw.into_bool());
        arg.set_raw_function(function.into_u8());
        arg.set_raw_block_mode(block_mode.into_bool());
        arg.set_raw_op_code(op_code.into_bool());
        arg.set_register_address(check_address(register_address)?);
        arg.set_raw_count(raw_count);

        Ok(arg)
    }

    /// Converts a [`u32`] into a [Cmd53].
    pub const fn from_u32(val: u32) -> Self {
        Self(val)
    }

    /// Converts the [Cmd53] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Gets the read-write flag.
    pub fn rw_flag(&self) -> RwFlag {
        self.raw_rw().into()
    }

    /// Gets the block mode.
    pub fn block_mode(&self) -> BlockMode {
        self.raw_block_mode().into()
    }

    /// Gets the address mode.
    pub fn op_code(&self) -> OpCode {
        self.raw_op_code().into()
    }

    /// Gets the function number.
    pub fn function(&self) -> FunctionNumber {
        FunctionNumber::try_from_u8(self.raw_function()).unwrap_or_default()
    }

    /// Gets the decoded byte or block count.
    ///
    /// A zero byte count means 512 bytes; a zero block count means an infinite transfer and is
    /// returned as zero.
    pub fn count(&self) -> u16 {
        match (self.block_mode(), self.raw_count()) {
            (BlockMode::Byte, 0) => Self::MAX_BYTE_COUNT,
            (_, count) => count,
        }
    }
}

bitfield::bitfield! {
    /// Represents the argument of the `IO_SEND_OP_COND` command (CMD5).
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Cmd5(u32);
    impl Debug;
    /// Represents the switching to 1.8V request.
    pub s18r, set_s18r: 24;
    /// Represents the I/O OCR voltage window.
    pub u32, raw_io_ocr, set_raw_io_ocr: 23, 0;
}

impl Cmd5 {
    /// Creates a new [Cmd5] argument. An empty window probes the card OCR.
    pub fn new(io_ocr: IoOcr) -> Self {
        let mut arg = Self(0);
        arg.set_raw_io_ocr(io_ocr.into_u32());
        arg
    }

    /// Converts a [`u32`] into a [Cmd5].
    pub const fn from_u32(val: u32) -> Self {
        Self(val)
    }

    /// Converts the [Cmd5] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Gets the requested I/O OCR.
    pub fn io_ocr(&self) -> IoOcr {
        IoOcr::from_u32(self.raw_io_ocr())
    }
}

bitfield::bitfield! {
    /// Represents the argument of the `SEND_IF_COND` command (CMD8).
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Cmd8(u32);
    impl Debug;
    u8;
    /// Represents the supplied voltage field.
    pub voltage_supplied, set_voltage_supplied: 11, 8;
    /// Represents the echo-back check pattern.
    pub check_pattern, set_check_pattern: 7, 0;
}

impl Cmd8 {
    /// Voltage supplied code for 2.7-3.6V.
    pub const VHS_27_36: u8 = 0b0001;
    /// Recommended check pattern.
    pub const CHECK_PATTERN: u8 = 0xaa;

    /// Creates a new [Cmd8] argument for the 2.7-3.6V range.
    pub fn new(check_pattern: u8) -> Self {
        let mut arg = Self(0);
        arg.set_voltage_supplied(Self::VHS_27_36);
        arg.set_check_pattern(check_pattern);
        arg
    }

    /// Converts a [`u32`] into a [Cmd8].
    pub const fn from_u32(val: u32) -> Self {
        Self(val)
    }

    /// Converts the [Cmd8] into a [`u32`].
    pub const fn into_u32(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd52_layout() {
        let arg = Cmd52::new(
            FunctionNumber::Io1,
            0x100,
            RwFlag::Write,
            RawFlag::WriteOnly,
            0xab,
        )
        .unwrap();

        assert_eq!(arg.into_u32(), (1 << 31) | (1 << 28) | (0x100 << 9) | 0xab);
        assert_eq!(arg.into_u32() >> 31, 1);
        assert_eq!((arg.into_u32() >> 28) & 0b111, 1);
        assert_eq!((arg.into_u32() >> 27) & 1, 0);
        assert_eq!((arg.into_u32() >> 9) & 0x1_ffff, 0x100);
        assert_eq!(arg.into_u32() & 0xff, 0xab);

        assert_eq!(arg.rw_flag(), RwFlag::Write);
        assert_eq!(arg.raw_flag(), RawFlag::WriteOnly);
        assert_eq!(arg.function(), FunctionNumber::Io1);
        assert_eq!(arg.register_address(), 0x100);
        assert_eq!(arg.data(), 0xab);
    }

    #[test]
    fn test_cmd52_address_range() {
        assert!(Cmd52::new(FunctionNumber::Registers, 0x1_ffff, RwFlag::Read, RawFlag::WriteOnly, 0).is_ok());
        assert_eq!(
            Cmd52::new(FunctionNumber::Registers, 0x2_0000, RwFlag::Read, RawFlag::WriteOnly, 0),
            Err(Error::invalid_argument(Argument::RegisterAddress(0x2_0000)))
        );
    }

    #[test]
    fn test_cmd53_counts() {
        let full = Cmd53::new(
            FunctionNumber::Io1,
            0,
            RwFlag::Read,
            BlockMode::Byte,
            OpCode::IncrementingAddress,
            512,
        )
        .unwrap();
        assert_eq!(full.raw_count(), 0);
        assert_eq!(full.count(), 512);
        assert_eq!(full.op_code(), OpCode::IncrementingAddress);

        let blocks = Cmd53::new(
            FunctionNumber::Io2,
            0x1_0000,
            RwFlag::Write,
            BlockMode::Block,
            OpCode::FixedAddress,
            511,
        )
        .unwrap();
        assert_eq!(blocks.count(), 511);
        assert_eq!(blocks.block_mode(), BlockMode::Block);
        assert_eq!(blocks.function(), FunctionNumber::Io2);
        assert_eq!(blocks.register_address(), 0x1_0000);
        assert_eq!(blocks.into_u32() >> 31, 1);

        let reject = |mode, count| {
            Cmd53::new(FunctionNumber::Io1, 0, RwFlag::Read, mode, OpCode::FixedAddress, count)
        };
        assert_eq!(
            reject(BlockMode::Byte, 0),
            Err(Error::invalid_argument(Argument::ByteCount(0)))
        );
        assert_eq!(
            reject(BlockMode::Byte, 513),
            Err(Error::invalid_argument(Argument::ByteCount(513)))
        );
        assert_eq!(
            reject(BlockMode::Block, 0),
            Err(Error::invalid_argument(Argument::BlockCount(0)))
        );
        assert_eq!(
            reject(BlockMode::Block, 512),
            Err(Error::invalid_argument(Argument::BlockCount(512)))
        );
    }

    #[test]
    fn test_cmd5_cmd8() {
        let arg = Cmd5::new(IoOcr::from_u32(0x00ff_8000));
        assert_eq!(arg.into_u32(), 0x00ff_8000);
        assert_eq!(Cmd5::new(IoOcr::new()).into_u32(), 0);

        assert_eq!(Cmd8::new(Cmd8::CHECK_PATTERN).into_u32(), 0x1aa);
    }
}
