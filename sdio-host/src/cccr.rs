//! Common I/O Area: CCCR and FBR register maps and CIS tuple parsing.

use crate::FunctionNumber;

/// CCCR/SDIO revision register.
pub const REVISION: u32 = 0x00;
/// SD specification revision register.
pub const SD_REVISION: u32 = 0x01;
/// I/O enable register, one bit per function.
pub const IO_ENABLE: u32 = 0x02;
/// I/O ready register, one bit per function.
pub const IO_READY: u32 = 0x03;
/// Interrupt enable register.
pub const INT_ENABLE: u32 = 0x04;
/// Interrupt pending register.
pub const INT_PENDING: u32 = 0x05;
/// I/O abort register.
pub const IO_ABORT: u32 = 0x06;
/// Bus interface control register.
pub const BUS_INTERFACE: u32 = 0x07;
/// Card capability register.
pub const CARD_CAPABILITY: u32 = 0x08;
/// First byte of the common CIS pointer.
pub const CIS_POINTER: u32 = 0x09;
/// First byte of the function 0 block size.
pub const FN0_BLOCK_SIZE: u32 = 0x10;

/// Reset bit of the I/O abort register.
pub const IO_ABORT_RES: u8 = 1 << 3;
/// Abort select field of the I/O abort register.
pub const IO_ABORT_AS_MASK: u8 = 0b111;
/// Bus width field of the bus interface control register.
pub const BUS_WIDTH_MASK: u8 = 0b11;

/// Offset of the CIS pointer within an FBR.
pub const FBR_CIS_POINTER: u32 = 0x09;
/// Offset of the I/O block size within an FBR.
pub const FBR_BLOCK_SIZE: u32 = 0x10;

/// Base address of the CIS area.
pub const CIS_BASE: u32 = 0x1000;

/// Null tuple, a single byte without link.
pub const CISTPL_NULL: u8 = 0x00;
/// Manufacturer identification tuple.
pub const CISTPL_MANFID: u8 = 0x20;
/// Function identification tuple.
pub const CISTPL_FUNCID: u8 = 0x21;
/// Function extension tuple.
pub const CISTPL_FUNCE: u8 = 0x22;
/// End of chain tuple.
pub const CISTPL_END: u8 = 0xff;

/// Describes a register for diagnostics dumps.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Register {
    /// Register name.
    pub name: &'static str,
    /// Offset from the CCCR or FBR base.
    pub offset: u32,
    /// Whether the value is best read as bit flags.
    pub flags: bool,
}

const fn reg(name: &'static str, offset: u32, flags: bool) -> Register {
    Register {
        name,
        offset,
        flags,
    }
}

/// Card Common Control Registers.
pub const CCCR_REGISTERS: [Register; 23] = [
    reg("CCCR/SDIO revision", 0x00, false),
    reg("SD spec revision", 0x01, false),
    reg("I/O enables", 0x02, true),
    reg("I/O ready", 0x03, true),
    reg("Int enable", 0x04, true),
    reg("Int pending", 0x05, true),
    reg("I/O abort", 0x06, true),
    reg("Bus interface control", 0x07, true),
    reg("Card capability", 0x08, true),
    reg("Common CIS pointer byte 0", 0x09, false),
    reg("Common CIS pointer byte 1", 0x0a, false),
    reg("Common CIS pointer byte 2", 0x0b, false),
    reg("Bus suspend", 0x0c, true),
    reg("Function select", 0x0d, false),
    reg("Exec flags", 0x0e, true),
    reg("Ready flags", 0x0f, true),
    reg("FN0 block size byte 0", 0x10, false),
    reg("FN0 block size byte 1", 0x11, false),
    reg("Power control", 0x12, true),
    reg("Bus speed select", 0x13, true),
    reg("UHS-I support", 0x14, false),
    reg("Driver strength", 0x15, true),
    reg("Interrupt extension", 0x16, true),
];

/// Function Basic Registers, relative to the function's FBR base.
pub const FBR_REGISTERS: [Register; 11] = [
    reg("Standard function code", 0x00, false),
    reg("Standard function code extended", 0x01, false),
    reg("Power state support", 0x02, true),
    reg("Function CIS pointer byte 0", 0x09, false),
    reg("Function CIS pointer byte 1", 0x0a, false),
    reg("Function CIS pointer byte 2", 0x0b, false),
    reg("Function CSA pointer byte 0", 0x0c, false),
    reg("Function CSA pointer byte 1", 0x0d, false),
    reg("Function CSA pointer byte 2", 0x0e, false),
    reg("Function I/O block size byte 0", 0x10, false),
    reg("Function I/O block size byte 1", 0x11, false),
];

/// Gets the address of the block size register pair of `function`.
pub const fn block_size_address(function: FunctionNumber) -> u32 {
    match function {
        FunctionNumber::Registers => FN0_BLOCK_SIZE,
        f => f.fbr_base() + FBR_BLOCK_SIZE,
    }
}

/// Gets the address of the CIS pointer of `function`.
pub const fn cis_pointer_address(function: FunctionNumber) -> u32 {
    match function {
        FunctionNumber::Registers => CIS_POINTER,
        f => f.fbr_base() + FBR_CIS_POINTER,
    }
}

bitfield::bitfield! {
    /// Represents the card capability register (CCCR 0x08).
    #[derive(Clone, Copy, Default, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Capabilities(u8);
    impl Debug;
    /// Supports direct commands during data transfer.
    pub sdc, _: 0;
    /// Supports multi-block transfers.
    pub smb, _: 1;
    /// Supports read wait.
    pub srw, _: 2;
    /// Supports bus control (suspend/resume).
    pub sbs, _: 3;
    /// Supports interrupts between blocks in 4-bit mode.
    pub s4mi, _: 4;
    /// Interrupts between blocks in 4-bit mode are enabled.
    pub e4mi, _: 5;
    /// Low-speed card.
    pub lsc, _: 6;
    /// Low-speed card supports 4-bit mode.
    pub b4ls, _: 7;
}

impl Capabilities {
    /// Converts a [`u8`] into [Capabilities].
    pub const fn from_u8(val: u8) -> Self {
        Self(val)
    }

    /// Converts the [Capabilities] into a [`u8`].
    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// Gets whether the card supports the 4-bit data bus.
    pub fn supports_four_bit(&self) -> bool {
        !self.lsc() || self.b4ls()
    }
}

/// Represents a CIS tuple borrowed from the CIS buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tuple<'a> {
    /// Tuple code.
    pub code: u8,
    /// Tuple body, excluding the code and link bytes.
    pub body: &'a [u8],
}

impl Tuple<'_> {
    /// Gets the `(manufacturer, card)` IDs of a `CISTPL_MANFID` tuple.
    pub fn manufacturer_id(&self) -> Option<(u16, u16)> {
        match (self.code, self.body) {
            (CISTPL_MANFID, [m0, m1, c0, c1, ..]) => {
                Some((u16::from_le_bytes([*m0, *m1]), u16::from_le_bytes([*c0, *c1])))
            }
            _ => None,
        }
    }

    /// Gets the maximum block size of a `CISTPL_FUNCE` tuple.
    ///
    /// Function 0 carries it in body bytes 1..2, I/O functions in body bytes 12..13.
    pub fn max_block_size(&self, function: FunctionNumber) -> Option<u16> {
        if self.code != CISTPL_FUNCE {
            return None;
        }

        let offset = match function {
            FunctionNumber::Registers => 1,
            _ => 12,
        };

        match self.body.get(offset..offset + 2) {
            Some([lo, hi]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

/// Iterates over the tuples of a CIS chain.
///
/// Stops at `CISTPL_END`, at a link of `0xff`, or when a tuple runs past the buffer.
#[derive(Clone, Debug)]
pub struct Tuples<'a> {
    cis: &'a [u8],
    pos: usize,
}

impl<'a> Tuples<'a> {
    /// Creates a tuple iterator over a CIS buffer starting at a tuple boundary.
    pub const fn new(cis: &'a [u8]) -> Self {
        Self { cis, pos: 0 }
    }
}

impl<'a> Iterator for Tuples<'a> {
    type Item = Tuple<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let code = *self.cis.get(self.pos)?;

            match code {
                CISTPL_END => {
                    self.pos = self.cis.len();
                    return None;
                }
                CISTPL_NULL => self.pos += 1,
                _ => {
                    let link = *self.cis.get(self.pos + 1)?;
                    if link == 0xff {
                        self.pos = self.cis.len();
                        return None;
                    }

                    let start = self.pos + 2;
                    let end = start + link as usize;
                    let Some(body) = self.cis.get(start..end) else {
                        warn!("CIS tuple {:#04x} runs past the end of the buffer", code);
                        self.pos = self.cis.len();
                        return None;
                    };

                    self.pos = end;
                    return Some(Tuple { code, body });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIS: [u8; 20] = [
        CISTPL_MANFID, 4, 0x96, 0x02, 0x89, 0x53,
        CISTPL_NULL,
        CISTPL_FUNCID, 2, 0x0c, 0x00,
        CISTPL_FUNCE, 4, 0x00, 0x00, 0x02, 0x32,
        CISTPL_END, 0x00, 0x00,
    ];

    #[test]
    fn test_tuple_chain() {
        let tuples: heapless::Vec<Tuple<'_>, 8> = Tuples::new(&CIS).collect();

        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[0].manufacturer_id(), Some((0x0296, 0x5389)));
        assert_eq!(tuples[1].code, CISTPL_FUNCID);
        assert_eq!(tuples[1].body, &[0x0c, 0x00]);
        assert_eq!(tuples[2].max_block_size(FunctionNumber::Registers), Some(512));
    }

    #[test]
    fn test_function_funce() {
        let mut cis = [0u8; 48];
        cis[0] = CISTPL_FUNCE;
        cis[1] = 42;
        cis[2] = 0x01;
        cis[2 + 12] = 0x00;
        cis[2 + 13] = 0x01;
        cis[44] = CISTPL_END;

        let tuple = Tuples::new(&cis).next().unwrap();
        assert_eq!(tuple.max_block_size(FunctionNumber::Io1), Some(256));
        assert_eq!(Tuples::new(&cis).count(), 1);
    }

    #[test]
    fn test_truncated_chain() {
        let cis = [CISTPL_MANFID, 8, 0x01, 0x02];
        assert_eq!(Tuples::new(&cis).count(), 0);

        let cis = [CISTPL_FUNCID, 0xff, 0x01];
        assert_eq!(Tuples::new(&cis).count(), 0);
    }

    #[test]
    fn test_register_addresses() {
        assert_eq!(block_size_address(FunctionNumber::Registers), 0x10);
        assert_eq!(block_size_address(FunctionNumber::Io2), 0x210);
        assert_eq!(cis_pointer_address(FunctionNumber::Io1), 0x109);
        assert_eq!(CCCR_REGISTERS.last().map(|r| r.offset), Some(0x16));
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::from_u8(0b0001_0011);
        assert!(caps.sdc() && caps.smb() && caps.s4mi());
        assert!(caps.supports_four_bit());
        assert!(!Capabilities::from_u8(0b0100_0000).supports_four_bit());
    }
}
