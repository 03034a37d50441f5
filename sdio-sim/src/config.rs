//! Configuration of the simulated card.

// Low-speed card bit of the card capability register.
const LSC: u8 = 0x40;

/// Represents the configuration of the simulated card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CardConfig {
    functions: u8,
    memory_present: bool,
    io_ocr: u32,
    rca: u16,
    ready_after: u16,
    manufacturer: (u16, u16),
    interface_code: u8,
    capabilities: u8,
    max_block_size: u16,
    ram_size: usize,
    four_bit: bool,
    answer_if_cond: bool,
    response_delay: usize,
    data_delay: usize,
    busy_cycles: usize,
}

impl CardConfig {
    /// Default I/O OCR (2.7-3.6V).
    pub const IO_OCR: u32 = 0x00ff_8000;
    /// Default relative card address.
    pub const RCA: u16 = 0x0001;
    /// Default card capabilities: SDC, SMB and S4MI.
    pub const CAPABILITIES: u8 = 0x13;

    /// Creates a new [CardConfig].
    pub const fn new() -> Self {
        Self {
            functions: 1,
            memory_present: false,
            io_ocr: Self::IO_OCR,
            rca: Self::RCA,
            ready_after: 1,
            manufacturer: (0x0296, 0x5347),
            interface_code: 0,
            capabilities: Self::CAPABILITIES,
            max_block_size: 512,
            ram_size: 0x1000,
            four_bit: true,
            answer_if_cond: false,
            response_delay: 2,
            data_delay: 2,
            busy_cycles: 4,
        }
    }

    /// Number of I/O functions.
    pub const fn functions(&self) -> u8 {
        self.functions
    }

    /// Set the number of I/O functions (at most 7).
    pub fn with_functions(mut self, functions: u8) -> Self {
        self.functions = functions.min(7);
        self
    }

    /// Whether the card reports SD memory.
    pub const fn memory_present(&self) -> bool {
        self.memory_present
    }

    /// Set whether the card reports SD memory.
    pub fn with_memory_present(mut self, memory_present: bool) -> Self {
        self.memory_present = memory_present;
        self
    }

    /// I/O OCR reported by CMD5.
    pub const fn io_ocr(&self) -> u32 {
        self.io_ocr
    }

    /// Set the I/O OCR reported by CMD5.
    pub fn with_io_ocr(mut self, io_ocr: u32) -> Self {
        self.io_ocr = io_ocr;
        self
    }

    /// Relative card address published by CMD3.
    pub const fn rca(&self) -> u16 {
        self.rca
    }

    /// Set the relative card address published by CMD3.
    pub fn with_rca(mut self, rca: u16) -> Self {
        self.rca = rca;
        self
    }

    /// Number of CMD5 commands with a voltage window before the card reports ready.
    pub const fn ready_after(&self) -> u16 {
        self.ready_after
    }

    /// Set the number of CMD5 commands with a voltage window before the card reports ready.
    pub fn with_ready_after(mut self, polls: u16) -> Self {
        self.ready_after = polls;
        self
    }

    /// `(manufacturer, card)` IDs of the `CISTPL_MANFID` tuple.
    pub const fn manufacturer(&self) -> (u16, u16) {
        self.manufacturer
    }

    /// Set the `(manufacturer, card)` IDs of the `CISTPL_MANFID` tuple.
    pub fn with_manufacturer(mut self, manufacturer: u16, card: u16) -> Self {
        self.manufacturer = (manufacturer, card);
        self
    }

    /// Standard interface code of every function.
    pub const fn interface_code(&self) -> u8 {
        self.interface_code
    }

    /// Set the standard interface code of every function.
    pub fn with_interface_code(mut self, code: u8) -> Self {
        self.interface_code = code;
        self
    }

    /// Card capability register.
    pub const fn capabilities(&self) -> u8 {
        self.capabilities
    }

    /// Set the card capability register.
    ///
    /// The low-speed bit follows [CardConfig::with_four_bit].
    pub fn with_capabilities(mut self, capabilities: u8) -> Self {
        self.capabilities = match self.four_bit {
            true => capabilities & !LSC,
            false => capabilities | LSC,
        };
        self
    }

    /// Maximum block size reported by `CISTPL_FUNCE`.
    pub const fn max_block_size(&self) -> u16 {
        self.max_block_size
    }

    /// Set the maximum block size reported by `CISTPL_FUNCE`.
    pub fn with_max_block_size(mut self, size: u16) -> Self {
        self.max_block_size = size;
        self
    }

    /// Bytes of memory behind every I/O function.
    pub const fn ram_size(&self) -> usize {
        self.ram_size
    }

    /// Set the bytes of memory behind every I/O function.
    pub fn with_ram_size(mut self, size: usize) -> Self {
        self.ram_size = size;
        self
    }

    /// Whether the card supports the 4-bit data bus.
    pub const fn four_bit(&self) -> bool {
        self.four_bit
    }

    /// Set whether the card supports the 4-bit data bus. Without it the card is a low-speed
    /// card limited to 1-bit.
    pub fn with_four_bit(mut self, four_bit: bool) -> Self {
        self.four_bit = four_bit;
        self.capabilities = match four_bit {
            true => self.capabilities & !LSC,
            false => self.capabilities | LSC,
        };
        self
    }

    /// Whether the card answers CMD8.
    pub const fn answer_if_cond(&self) -> bool {
        self.answer_if_cond
    }

    /// Set whether the card answers CMD8.
    pub fn with_answer_if_cond(mut self, answer: bool) -> Self {
        self.answer_if_cond = answer;
        self
    }

    /// Clock cycles between the end of a command and the response.
    pub const fn response_delay(&self) -> usize {
        self.response_delay
    }

    /// Set the clock cycles between the end of a command and the response (at least 2).
    pub fn with_response_delay(mut self, cycles: usize) -> Self {
        self.response_delay = cycles.max(2);
        self
    }

    /// Clock cycles between the end of a response or block and the next read block.
    pub const fn data_delay(&self) -> usize {
        self.data_delay
    }

    /// Set the clock cycles between the end of a response or block and the next read block.
    pub fn with_data_delay(mut self, cycles: usize) -> Self {
        self.data_delay = cycles.max(1);
        self
    }

    /// Clock cycles the card signals busy after R1b responses and written blocks.
    pub const fn busy_cycles(&self) -> usize {
        self.busy_cycles
    }

    /// Set the clock cycles the card signals busy.
    pub fn with_busy_cycles(mut self, cycles: usize) -> Self {
        self.busy_cycles = cycles;
        self
    }
}

impl Default for CardConfig {
    fn default() -> Self {
        Self::new()
    }
}
