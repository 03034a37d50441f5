//! Common I/O Area and function memory of the simulated card.

use sdio_host::{
    BusWidth,
    FunctionNumber,
    command::REGISTER_ADDRESS_MAX,
    cccr::{
        self,
        CISTPL_END,
        CISTPL_FUNCE,
        CISTPL_FUNCID,
        CISTPL_MANFID,
    },
};

use crate::CardConfig;

/// CCCR and SDIO revision: CCCR format 2.00, SDIO 2.00.
const CCCR_REVISION: u8 = 0x32;
/// SD physical layer revision 2.00.
const SD_REVISION: u8 = 0x02;
/// Function code of SDIO cards without a standard interface.
const FUNCID_SDIO: u8 = 0x0c;
/// Maximum transfer rate code of 25 Mb/s.
const TRAN_SPEED: u8 = 0x32;
/// Body length of a function `CISTPL_FUNCE` tuple.
const FUNCE_FN_LEN: u8 = 42;

/// Reasons an access was rejected by the card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessError {
    /// The function does not exist.
    Function,
    /// The address is outside the function's address space.
    OutOfRange,
}

/// Register file and memory of the simulated card.
#[derive(Clone, Debug)]
pub struct Memory {
    cccr: [u8; 0x100],
    fbr: [[u8; 0x100]; 7],
    cis: Vec<u8>,
    ram: Vec<Vec<u8>>,
    four_bit: bool,
}

impl Memory {
    /// Creates the memory of a card with the given configuration.
    pub fn new(config: &CardConfig) -> Self {
        let functions = config.functions().min(7) as usize;

        let mut cccr = [0u8; 0x100];
        cccr[cccr::REVISION as usize] = CCCR_REVISION;
        cccr[cccr::SD_REVISION as usize] = SD_REVISION;
        cccr[cccr::CARD_CAPABILITY as usize] = config.capabilities();
        cccr[cccr::CIS_POINTER as usize..][..3]
            .copy_from_slice(&cccr::CIS_BASE.to_le_bytes()[..3]);

        let mut fbr = [[0u8; 0x100]; 7];
        for (n, regs) in fbr.iter_mut().enumerate().take(functions) {
            let pointer = cccr::CIS_BASE + 0x100 * (n as u32 + 1);
            regs[0] = config.interface_code() & 0x0f;
            regs[cccr::FBR_CIS_POINTER as usize..][..3]
                .copy_from_slice(&pointer.to_le_bytes()[..3]);
        }

        Self {
            cccr,
            fbr,
            cis: build_cis(config, functions),
            ram: vec![vec![0; config.ram_size()]; functions],
            four_bit: config.four_bit(),
        }
    }

    fn ram(&self, function: FunctionNumber) -> Result<&Vec<u8>, AccessError> {
        let n = function.into_u8() as usize;
        self.ram.get(n.wrapping_sub(1)).ok_or(AccessError::Function)
    }

    /// Gets whether `function` exists.
    pub fn has_function(&self, function: FunctionNumber) -> bool {
        function == FunctionNumber::Registers || self.ram(function).is_ok()
    }

    /// Reads one byte.
    pub fn read(&self, function: FunctionNumber, address: u32) -> Result<u8, AccessError> {
        if function != FunctionNumber::Registers {
            return self
                .ram(function)?
                .get(address as usize)
                .copied()
                .ok_or(AccessError::OutOfRange);
        }

        let address = address as usize;
        let value = match address {
            0x000..=0x0ff => match address as u32 {
                cccr::IO_ABORT => 0,
                _ => self.cccr[address],
            },
            0x100..=0x7ff => self.fbr[(address >> 8) - 1][address & 0xff],
            0x1000..=0x17ff => self.cis.get(address - 0x1000).copied().unwrap_or(0),
            _ => 0,
        };

        Ok(value)
    }

    /// Writes one byte. Read-only registers ignore the write.
    pub fn write(&mut self, function: FunctionNumber, address: u32, value: u8) -> Result<(), AccessError> {
        if function != FunctionNumber::Registers {
            let n = function.into_u8() as usize;
            let ram = self
                .ram
                .get_mut(n.wrapping_sub(1))
                .ok_or(AccessError::Function)?;
            let byte = ram.get_mut(address as usize).ok_or(AccessError::OutOfRange)?;
            *byte = value;
            return Ok(());
        }

        match address {
            cccr::IO_ENABLE => {
                let mask = ((1u16 << (self.ram.len() + 1)) - 2) as u8;
                self.cccr[cccr::IO_ENABLE as usize] = value & mask;
                self.cccr[cccr::IO_READY as usize] = value & mask;
            }
            cccr::INT_ENABLE => self.cccr[cccr::INT_ENABLE as usize] = value,
            cccr::IO_ABORT if value & cccr::IO_ABORT_RES != 0 => self.io_reset(),
            cccr::IO_ABORT => log::debug!("card: abort F{}", value & cccr::IO_ABORT_AS_MASK),
            cccr::BUS_INTERFACE => {
                let reg = &mut self.cccr[cccr::BUS_INTERFACE as usize];
                let width = match value & cccr::BUS_WIDTH_MASK {
                    0b10 if self.four_bit => 0b10,
                    0b00 => 0b00,
                    _ => *reg & cccr::BUS_WIDTH_MASK,
                };
                *reg = (value & !cccr::BUS_WIDTH_MASK) | width;
            }
            cccr::FN0_BLOCK_SIZE | 0x11 => self.cccr[address as usize] = value,
            0x110..=0x7ff if address & 0xff == 0x10 || address & 0xff == 0x11 => {
                let n = (address >> 8) as usize;
                if n > self.ram.len() {
                    return Err(AccessError::Function);
                }
                self.fbr[n - 1][(address & 0xff) as usize] = value;
            }
            _ if address > REGISTER_ADDRESS_MAX => return Err(AccessError::OutOfRange),
            _ => {}
        }

        Ok(())
    }

    /// Resets the I/O portion of the card.
    pub fn io_reset(&mut self) {
        log::debug!("card: I/O reset");

        for address in [cccr::IO_ENABLE, cccr::IO_READY, cccr::INT_ENABLE, cccr::BUS_INTERFACE] {
            self.cccr[address as usize] = 0;
        }
        self.cccr[0x10] = 0;
        self.cccr[0x11] = 0;
        for regs in self.fbr.iter_mut() {
            regs[0x10] = 0;
            regs[0x11] = 0;
        }
    }

    /// Gets the data bus width selected in the CCCR.
    pub fn bus_width(&self) -> BusWidth {
        match self.cccr[cccr::BUS_INTERFACE as usize] & cccr::BUS_WIDTH_MASK {
            0b10 => BusWidth::Four,
            _ => BusWidth::One,
        }
    }

    /// Gets the block size configured for `function`.
    pub fn block_size(&self, function: FunctionNumber) -> u16 {
        let regs = match function {
            FunctionNumber::Registers => &self.cccr,
            f => &self.fbr[f.into_u8() as usize - 1],
        };

        u16::from_le_bytes([regs[0x10], regs[0x11]])
    }

    /// Gets the bytes of `function` memory in `address..address + len`, for inspection.
    pub fn peek(&self, function: FunctionNumber, address: u32, len: usize) -> Vec<u8> {
        (address..address + len as u32)
            .map(|a| self.read(function, a).unwrap_or(0))
            .collect()
    }
}

fn build_cis(config: &CardConfig, functions: usize) -> Vec<u8> {
    let mut cis = vec![CISTPL_END; 0x100 * (functions + 1)];
    let (manufacturer, card) = config.manufacturer();
    let [m0, m1] = manufacturer.to_le_bytes();
    let [c0, c1] = card.to_le_bytes();
    let [b0, b1] = config.max_block_size().to_le_bytes();

    let common = [
        CISTPL_MANFID, 4, m0, m1, c0, c1,
        CISTPL_FUNCID, 2, FUNCID_SDIO, 0x00,
        CISTPL_FUNCE, 4, 0x00, b0, b1, TRAN_SPEED,
        CISTPL_END,
    ];
    cis[..common.len()].copy_from_slice(&common);

    for n in 1..=functions {
        let mut tuples = vec![CISTPL_FUNCID, 2, FUNCID_SDIO, 0x00, CISTPL_FUNCE, FUNCE_FN_LEN];
        let mut body = [0u8; FUNCE_FN_LEN as usize];
        body[0] = 0x01;
        body[12] = b0;
        body[13] = b1;
        tuples.extend_from_slice(&body);
        tuples.push(CISTPL_END);

        cis[0x100 * n..][..tuples.len()].copy_from_slice(&tuples);
    }

    cis
}
