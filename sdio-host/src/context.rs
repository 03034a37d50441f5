//! Card state learned during initialization.

use fugit::HertzU32;

use crate::{BusWidth, FunctionNumber, IoOcr, cccr::Capabilities};

/// Maximum number of I/O functions a card can report.
pub const MAX_FUNCTIONS: usize = 7;

/// Represents what the host knows about the attached card.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardContext {
    rca: u16,
    bus_width: BusWidth,
    clock_rate: u32,
    initialized: bool,
    function_count: u8,
    io_ocr: IoOcr,
    memory_present: bool,
    block_sizes: [u16; MAX_FUNCTIONS + 1],
}

impl CardContext {
    /// Creates a new [CardContext] for an uninitialized card.
    pub const fn new() -> Self {
        Self {
            rca: 0,
            bus_width: BusWidth::One,
            clock_rate: 0,
            initialized: false,
            function_count: 0,
            io_ocr: IoOcr::new(),
            memory_present: false,
            block_sizes: [0; MAX_FUNCTIONS + 1],
        }
    }

    /// Gets the relative card address published by CMD3.
    pub const fn rca(&self) -> u16 {
        self.rca
    }

    pub(crate) fn set_rca(&mut self, rca: u16) {
        self.rca = rca;
    }

    /// Gets the data bus width.
    pub const fn bus_width(&self) -> BusWidth {
        self.bus_width
    }

    pub(crate) fn set_bus_width(&mut self, width: BusWidth) {
        self.bus_width = width;
    }

    /// Gets the bus clock rate.
    pub const fn clock_rate(&self) -> HertzU32 {
        HertzU32::from_raw(self.clock_rate)
    }

    pub(crate) fn set_clock_rate(&mut self, rate: HertzU32) {
        self.clock_rate = rate.raw();
    }

    /// Gets whether the initialization sequence completed.
    pub const fn initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Gets the number of I/O functions reported by the card.
    pub const fn function_count(&self) -> u8 {
        self.function_count
    }

    /// Gets the I/O OCR reported by the card.
    pub const fn io_ocr(&self) -> IoOcr {
        self.io_ocr
    }

    /// Gets whether the card also contains SD memory.
    pub const fn memory_present(&self) -> bool {
        self.memory_present
    }

    pub(crate) fn set_op_cond(&mut self, function_count: u8, memory_present: bool, io_ocr: IoOcr) {
        self.function_count = function_count;
        self.memory_present = memory_present;
        self.io_ocr = io_ocr;
    }

    /// Gets the configured block size of `function`, or zero if never set.
    pub const fn block_size(&self, function: FunctionNumber) -> u16 {
        self.block_sizes[function.into_u8() as usize]
    }

    pub(crate) fn set_block_size(&mut self, function: FunctionNumber, size: u16) {
        self.block_sizes[function.into_u8() as usize] = size;
    }

    /// Gets whether `function` is reported by the card.
    pub const fn has_function(&self, function: FunctionNumber) -> bool {
        function.into_u8() <= self.function_count
    }
}

/// Per-function information read from the FBR and the function CIS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FunctionInfo {
    /// The I/O function.
    pub function: FunctionNumber,
    /// Standard function interface code (FBR byte 0, low nibble).
    pub interface_code: u8,
    /// Address of the function CIS.
    pub cis_pointer: u32,
    /// Maximum block size from `CISTPL_FUNCE`, if present.
    pub max_block_size: Option<u16>,
}

/// Card information read from the Common I/O Area.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CardInfo {
    /// CCCR format and SDIO specification revision (CCCR 0x00).
    pub cccr_revision: u8,
    /// SD physical layer revision (CCCR 0x01).
    pub sd_revision: u8,
    /// Card capabilities (CCCR 0x08).
    pub capabilities: Capabilities,
    /// Address of the common CIS.
    pub cis_pointer: u32,
    /// `(manufacturer, card)` IDs from `CISTPL_MANFID`.
    pub manufacturer: Option<(u16, u16)>,
    /// Function 0 maximum block size from `CISTPL_FUNCE`.
    pub max_block_size: Option<u16>,
    /// Per-function information.
    pub functions: heapless::Vec<FunctionInfo, MAX_FUNCTIONS>,
}

impl CardInfo {
    /// Gets the information recorded for `function`.
    pub fn function(&self, function: FunctionNumber) -> Option<&FunctionInfo> {
        self.functions.iter().find(|info| info.function == function)
    }

    /// Gets the maximum block size of `function`, if known.
    pub fn max_block_size(&self, function: FunctionNumber) -> Option<u16> {
        match function {
            FunctionNumber::Registers => self.max_block_size,
            f => self.function(f).and_then(|info| info.max_block_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes() {
        let mut ctx = CardContext::new();
        ctx.set_block_size(FunctionNumber::Io1, 64);

        assert_eq!(ctx.block_size(FunctionNumber::Io1), 64);
        assert_eq!(ctx.block_size(FunctionNumber::Registers), 0);
        assert!(!ctx.has_function(FunctionNumber::Io1));

        ctx.set_op_cond(1, false, IoOcr::from_u32(0x00ff_8000));
        assert!(ctx.has_function(FunctionNumber::Io1));
        assert!(!ctx.has_function(FunctionNumber::Io2));
    }

    #[test]
    fn test_card_info_lookup() {
        let mut info = CardInfo {
            max_block_size: Some(512),
            ..Default::default()
        };
        info.functions
            .push(FunctionInfo {
                function: FunctionNumber::Io1,
                interface_code: 0,
                cis_pointer: 0x1100,
                max_block_size: Some(64),
            })
            .unwrap();

        assert_eq!(info.max_block_size(FunctionNumber::Registers), Some(512));
        assert_eq!(info.max_block_size(FunctionNumber::Io1), Some(64));
        assert_eq!(info.max_block_size(FunctionNumber::Io2), None);
    }
}
