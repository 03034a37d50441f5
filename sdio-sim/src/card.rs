//! Pin-level model of an SDIO card.
//!
//! The card samples the bus on rising edges and changes its outputs on falling edges. Commands
//! are accepted on CMD (MOSI in SPI mode); responses, read blocks and write status tokens are
//! scheduled on a [Timeline] as soon as the triggering bit has been sampled.

use std::collections::VecDeque;

use sdio_host::{
    BitSeq,
    BlockMode,
    BusWidth,
    Command,
    FunctionNumber,
    IoOcr,
    OpCode,
    Response,
    command::{Cmd5, Cmd8, Cmd52, Cmd53, RawFlag, RwFlag},
    data::{CRC_SYMBOLS, data_symbols, decode_data_block, encode_data_block},
    phy::Line,
    response::{CardStatus, Flags, IoCurrentState, sd, spi},
};

use crate::{
    CardConfig,
    fault::Faults,
    memory::{AccessError, Memory},
    wire::{Drive, Timeline, Wire},
};

/// Clock cycles between the end of an SPI command and its response (N<sub>CR</sub>, one byte).
const SPI_RESPONSE_DELAY: usize = 8;
/// SPI start token of single block transfers.
const START_TOKEN: u8 = 0xfe;
/// Support read wait bit of the card capability register.
const SRW: u8 = 0x04;
/// Write status token of an accepted block.
const STATUS_ACCEPTED: u8 = 0b010;
/// Write status token of a block with a CRC error.
const STATUS_CRC_ERROR: u8 = 0b101;

/// Command received by the card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandRecord {
    /// Command index.
    pub index: u8,
    /// Command argument.
    pub argument: u32,
    /// Whether the card was in SPI mode.
    pub spi: bool,
}

#[derive(Debug)]
struct Reply {
    response: Response,
    busy: bool,
    blocks: Vec<Vec<u8>>,
}

impl Reply {
    fn new(response: Response) -> Self {
        Self {
            response,
            busy: false,
            blocks: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct WriteRx {
    function: FunctionNumber,
    address: u32,
    increment: bool,
    block_len: usize,
    remaining: u16,
    offset: u32,
    symbols: Option<Vec<u8>>,
}

/// Simulated SDIO card.
#[derive(Debug)]
pub struct SimCard {
    config: CardConfig,
    memory: Memory,
    faults: Faults,
    spi: bool,
    ready: bool,
    polls: u16,
    rca: u16,
    selected: bool,
    command_rx: Option<BitSeq>,
    write: Option<WriteRx>,
    read_blocks: VecDeque<Vec<u8>>,
    timeline: Timeline,
    log: Vec<CommandRecord>,
}

impl SimCard {
    /// Creates a powered-up card in SD mode.
    pub fn new(config: CardConfig) -> Self {
        Self {
            memory: Memory::new(&config),
            config,
            faults: Faults::new(),
            spi: false,
            ready: false,
            polls: 0,
            rca: 0,
            selected: false,
            command_rx: None,
            write: None,
            read_blocks: VecDeque::new(),
            timeline: Timeline::new(),
            log: Vec::new(),
        }
    }

    /// Gets the card configuration.
    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    /// Gets the card memory.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Gets the card memory mutably.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Gets the injected faults.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Gets the injected faults mutably.
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    /// Gets whether the card switched to SPI mode.
    pub fn is_spi(&self) -> bool {
        self.spi
    }

    /// Gets whether the card finished its power up sequence.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Gets the published relative card address.
    pub fn rca(&self) -> u16 {
        self.rca
    }

    /// Gets whether the card is selected.
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Gets the CMD5 commands with a voltage window received since CMD0.
    pub fn polls(&self) -> u16 {
        self.polls
    }

    /// Gets every command received so far, including ignored ones.
    pub fn commands(&self) -> &[CommandRecord] {
        &self.log
    }

    pub(crate) fn on_falling(&mut self) -> [Drive; crate::wire::LINES] {
        self.timeline.advance()
    }

    pub(crate) fn on_rising(&mut self, wire: &Wire) {
        if self.spi && wire.bit(Line::Dat3) {
            // chip select released
            self.command_rx = None;
            self.write = None;
            self.read_blocks.clear();
            return;
        }

        if !self.read_blocks.is_empty() && self.timeline.is_quiet() {
            self.send_next_block(wire);
        }

        if self.write.is_some() {
            self.receive_data(wire);

            if self.spi {
                return;
            }
        }

        if self.spi || self.timeline.cmd_quiet() {
            self.receive_command(wire);
        }
    }

    fn receive_command(&mut self, wire: &Wire) {
        let bit = wire.bit(Line::Cmd);

        let Some(frame) = self.command_rx.as_mut() else {
            if !bit {
                self.command_rx = Some(BitSeq::from_u64(0, 1));
            }
            return;
        };

        frame.push(bit);
        if frame.len() < Command::BITS {
            return;
        }
        let frame = *frame;

        self.command_rx = None;
        self.on_command(&frame, wire);
    }

    fn on_command(&mut self, frame: &BitSeq, wire: &Wire) {
        let command = match Command::try_from_bits(frame) {
            Ok(command) => command,
            Err(err) => {
                log::warn!("card: dropped command frame {:#014x}: {err}", frame.value());
                return;
            }
        };

        let index = command.raw_index();
        let argument = command.argument();

        if index == 0 && !self.spi && !wire.bit(Line::Dat3) {
            log::info!("card: CMD0 with CS asserted, switching to SPI mode");
            self.spi = true;
        }

        self.log.push(CommandRecord {
            index,
            argument,
            spi: self.spi,
        });
        log::debug!("card: received {command}");

        if Faults::take(&mut self.faults.ignore_commands) {
            log::debug!("card: ignoring CMD{index}");
            return;
        }

        // a new command abandons any transfer in progress
        self.write = None;
        self.read_blocks.clear();
        self.timeline.clear();

        let reply = match index {
            0 => self.go_idle(),
            3 => self.send_relative_addr(),
            5 => self.io_send_op_cond(Cmd5::from_u32(argument)),
            7 => self.select_card((argument >> 16) as u16),
            8 => self.send_if_cond(Cmd8::from_u32(argument)),
            52 => self.io_rw_direct(Cmd52::from_u32(argument)),
            53 => self.io_rw_extended(Cmd53::from_u32(argument)),
            _ => self.illegal(index),
        };

        if let Some(reply) = reply {
            self.schedule(reply);
        }
    }

    fn status(&self) -> CardStatus {
        let mut status = CardStatus::from_u32(0);
        status.set_current_state(CardStatus::IO_STATE);
        status
    }

    fn modified_r1(&self) -> spi::ModifiedR1 {
        let mut r1 = spi::ModifiedR1::new();
        r1.set_idle(!self.ready);
        r1
    }

    fn illegal(&mut self, index: u8) -> Option<Reply> {
        log::warn!("card: unsupported CMD{index}");

        match self.spi {
            true => {
                let mut r1 = self.modified_r1();
                r1.set_illegal_command(true);
                Some(Reply::new(Response::SpiR1(r1)))
            }
            false => None,
        }
    }

    fn go_idle(&mut self) -> Option<Reply> {
        self.ready = false;
        self.polls = 0;
        self.rca = 0;
        self.selected = false;

        match self.spi {
            true => Some(Reply::new(Response::SpiR1(self.modified_r1()))),
            false => None,
        }
    }

    fn io_send_op_cond(&mut self, arg: Cmd5) -> Option<Reply> {
        let card_ocr = IoOcr::from_u32(self.config.io_ocr());
        let requested = arg.io_ocr();

        if !requested.is_empty() {
            if requested.intersect(card_ocr).is_empty() {
                log::warn!(
                    "card: no common voltage with {:#08x}, going inactive",
                    requested.into_u32()
                );
                return None;
            }

            self.polls = self.polls.saturating_add(1);
            if !self.faults.never_ready && self.polls >= self.config.ready_after() {
                self.ready = true;
            }
        }

        let functions = self.config.functions();
        let memory = self.config.memory_present();

        let response = match self.spi {
            true => Response::SpiR4(spi::R4::new(
                self.modified_r1(),
                self.ready,
                functions,
                memory,
                card_ocr,
            )),
            false => Response::R4(sd::R4::new(self.ready, functions, memory, card_ocr)),
        };

        Some(Reply::new(response))
    }

    fn send_relative_addr(&mut self) -> Option<Reply> {
        if self.spi {
            return self.illegal(3);
        }

        if !self.ready {
            log::warn!("card: CMD3 before the card is ready");
            return None;
        }

        // every CMD3 publishes a new address
        self.rca = match self.rca {
            0 => self.config.rca(),
            rca => rca % 0xffff + 1,
        };
        Some(Reply::new(Response::R6(sd::R6::new(3, self.rca, self.status()))))
    }

    fn select_card(&mut self, rca: u16) -> Option<Reply> {
        if self.spi {
            return self.illegal(7);
        }

        if self.rca == 0 || rca != self.rca {
            self.selected = false;
            return None;
        }

        self.selected = true;
        Some(Reply {
            busy: true,
            ..Reply::new(Response::R1(sd::R1::new(7, self.status())))
        })
    }

    fn send_if_cond(&mut self, arg: Cmd8) -> Option<Reply> {
        if !self.config.answer_if_cond() {
            return None;
        }

        let voltage = arg.voltage_supplied();
        let pattern = arg.check_pattern();

        let response = match self.spi {
            true => Response::SpiR7(spi::R7::new(self.modified_r1(), voltage, pattern)),
            false => Response::R7(sd::R7::new(8, voltage, pattern)),
        };

        Some(Reply::new(response))
    }

    /// Gets whether the card accepts I/O commands.
    fn io_enabled(&self) -> bool {
        match self.spi {
            true => self.ready,
            false => self.selected,
        }
    }

    fn r5(&self, index: u8, state: IoCurrentState, error: Option<AccessError>, data: u8) -> Response {
        match self.spi {
            true => {
                let mut r1 = self.modified_r1();
                match error {
                    Some(AccessError::Function) => r1.set_function_number_error(true),
                    Some(AccessError::OutOfRange) => r1.set_parameter_error(true),
                    None => {}
                }
                Response::SpiR5(spi::R5::new(r1, data))
            }
            false => {
                let mut flags = Flags::new(state);
                match error {
                    Some(AccessError::Function) => flags.set_function_number(true),
                    Some(AccessError::OutOfRange) => flags.set_out_of_range(true),
                    None => {}
                }
                Response::R5(sd::R5::new(index, flags, data))
            }
        }
    }

    fn io_rw_direct(&mut self, arg: Cmd52) -> Option<Reply> {
        if !self.io_enabled() {
            log::warn!("card: CMD52 before the card is selected");
            return match self.spi {
                true => self.illegal(52),
                false => None,
            };
        }

        let function = arg.function();
        let address = arg.register_address();

        let result = match arg.rw_flag() {
            RwFlag::Read => self.memory.read(function, address),
            RwFlag::Write => self
                .memory
                .write(function, address, arg.data())
                .and_then(|_| match arg.raw_flag() {
                    RawFlag::ReadAfterWrite => self.memory.read(function, address),
                    RawFlag::WriteOnly => Ok(arg.data()),
                }),
        };

        let response = match result {
            Ok(data) => self.r5(52, IoCurrentState::Command, None, data),
            Err(err) => {
                log::warn!("card: CMD52 {function} @ {address:#x} rejected: {err:?}");
                self.r5(52, IoCurrentState::Command, Some(err), 0)
            }
        };

        Some(Reply::new(response))
    }

    fn io_rw_extended(&mut self, arg: Cmd53) -> Option<Reply> {
        if !self.io_enabled() {
            log::warn!("card: CMD53 before the card is selected");
            return match self.spi {
                true => self.illegal(53),
                false => None,
            };
        }

        let function = arg.function();
        let address = arg.register_address();
        let increment = arg.op_code() == OpCode::IncrementingAddress;

        if !self.memory.has_function(function) {
            return Some(Reply::new(self.r5(
                53,
                IoCurrentState::Command,
                Some(AccessError::Function),
                0,
            )));
        }

        let (block_len, blocks) = match arg.block_mode() {
            BlockMode::Byte => (arg.count() as usize, 1u16),
            BlockMode::Block => (self.memory.block_size(function) as usize, arg.count()),
        };

        if block_len == 0 || blocks == 0 {
            log::warn!("card: CMD53 with block length {block_len} and {blocks} block(s)");
            return Some(Reply::new(self.r5(
                53,
                IoCurrentState::Command,
                Some(AccessError::OutOfRange),
                0,
            )));
        }

        let target = |offset: usize| match increment {
            true => address + offset as u32,
            false => address,
        };

        match arg.rw_flag() {
            RwFlag::Read => {
                let total = block_len * blocks as usize;
                let bytes: Result<Vec<u8>, AccessError> = (0..total)
                    .map(|offset| self.memory.read(function, target(offset)))
                    .collect();

                match bytes {
                    Ok(bytes) => Some(Reply {
                        blocks: bytes.chunks(block_len).map(<[u8]>::to_vec).collect(),
                        ..Reply::new(self.r5(53, IoCurrentState::Transfer, None, 0))
                    }),
                    Err(err) => Some(Reply::new(self.r5(
                        53,
                        IoCurrentState::Command,
                        Some(err),
                        0,
                    ))),
                }
            }
            RwFlag::Write => {
                self.write = Some(WriteRx {
                    function,
                    address,
                    increment,
                    block_len,
                    remaining: blocks,
                    offset: 0,
                    symbols: None,
                });

                Some(Reply::new(self.r5(53, IoCurrentState::Transfer, None, 0)))
            }
        }
    }

    fn data_width(&self) -> BusWidth {
        match self.spi {
            true => BusWidth::One,
            false => self.memory.bus_width(),
        }
    }

    fn schedule(&mut self, reply: Reply) {
        let line = match self.spi {
            true => Line::Dat0,
            false => Line::Cmd,
        };

        let mut slot = match self.spi {
            true => SPI_RESPONSE_DELAY,
            false => self.config.response_delay(),
        };

        for _ in 0..self.faults.turnaround_unknown {
            self.timeline.set(slot, line, Drive::Unknown);
            slot += 1;
        }

        let mut bits = reply.response.encode();
        if !self.spi && Faults::take(&mut self.faults.corrupt_responses) {
            log::debug!("card: corrupting response CRC");
            bits.flip(bits.len() - 2);
        }

        for bit in bits.iter() {
            self.timeline.set(slot, line, Drive::from_bool(bit));
            slot += 1;
        }

        if reply.busy {
            for _ in 0..self.config.busy_cycles() {
                self.timeline.set(slot, Line::Dat0, Drive::Low);
                slot += 1;
            }
        }

        let mut blocks = VecDeque::from(reply.blocks);
        if let Some(block) = blocks.pop_front() {
            slot += self.config.data_delay();
            self.schedule_block(slot, &block);
        }
        self.read_blocks = blocks;
    }

    /// Gets whether the card honours read wait on DAT2.
    fn read_wait_supported(&self) -> bool {
        !self.spi && self.config.capabilities() & SRW != 0
    }

    fn send_next_block(&mut self, wire: &Wire) {
        if self.read_wait_supported() && !wire.bit(Line::Dat2) {
            log::trace!("card: read wait asserted");
            return;
        }

        if let Some(block) = self.read_blocks.pop_front() {
            self.schedule_block(self.config.data_delay(), &block);
        }
    }

    fn schedule_block(&mut self, mut slot: usize, block: &[u8]) {
        let width = self.data_width();
        let mut symbols: Vec<u8> = match encode_data_block(block, width) {
            Ok(symbols) => symbols.collect(),
            Err(err) => {
                log::error!("card: cannot send a block of {} bytes: {err}", block.len());
                return;
            }
        };

        if Faults::take(&mut self.faults.corrupt_read_blocks) {
            log::debug!("card: corrupting read block");
            symbols[0] ^= 1;
        }

        let lanes = &Line::DATA[..width.lines()];

        if self.spi {
            for i in (0..8).rev() {
                self.timeline
                    .set(slot, Line::Dat0, Drive::from_bool((START_TOKEN >> i) & 1 != 0));
                slot += 1;
            }
        } else {
            for &lane in lanes {
                self.timeline.set(slot, lane, Drive::Low);
            }
            slot += 1;
        }

        for symbol in symbols {
            for (i, &lane) in lanes.iter().enumerate() {
                self.timeline
                    .set(slot, lane, Drive::from_bool((symbol >> i) & 1 != 0));
            }
            slot += 1;
        }

        if !self.spi {
            for &lane in lanes {
                self.timeline.set(slot, lane, Drive::High);
            }
        }
    }

    fn receive_data(&mut self, wire: &Wire) {
        if !self.timeline.is_quiet() {
            return;
        }

        let width = self.data_width();
        let spi = self.spi;
        let Some(rx) = self.write.as_mut() else {
            return;
        };

        if rx.symbols.is_none() {
            let start = match spi {
                true => !wire.bit(Line::Cmd),
                false => !wire.bit(Line::Dat0),
            };
            if start {
                rx.symbols = Some(Vec::new());
            }
            return;
        }

        let symbol = match spi {
            true => wire.bit(Line::Cmd) as u8,
            false => Line::DATA[..width.lines()]
                .iter()
                .enumerate()
                .fold(0, |acc, (i, &lane)| acc | ((wire.bit(lane) as u8) << i)),
        };
        let block_len = rx.block_len;
        let Some(symbols) = rx.symbols.as_mut() else {
            return;
        };
        symbols.push(symbol);

        let end_symbols = match spi {
            true => 0,
            false => 1,
        };
        if symbols.len() == data_symbols(block_len, width) + CRC_SYMBOLS + end_symbols {
            self.finish_block();
        }
    }

    fn finish_block(&mut self) {
        let width = self.data_width();
        let Some(mut rx) = self.write.take() else {
            return;
        };
        let symbols = rx.symbols.take().unwrap_or_default();

        let mut block = vec![0u8; rx.block_len];
        let decoded = decode_data_block(&mut symbols.iter().copied(), width, &mut block);
        if let Err(err) = decoded {
            log::warn!("card: write block rejected: {err}");
        }

        let accepted = decoded.is_ok() && !Faults::take(&mut self.faults.reject_writes);

        if accepted {
            for (i, &byte) in block.iter().enumerate() {
                let address = match rx.increment {
                    true => rx.address + rx.offset + i as u32,
                    false => rx.address,
                };
                if let Err(err) = self.memory.write(rx.function, address, byte) {
                    log::warn!("card: write to {} @ {address:#x} failed: {err:?}", rx.function);
                }
            }
            rx.offset += rx.block_len as u32;
            rx.remaining -= 1;
        }

        self.schedule_status(accepted);

        if accepted && rx.remaining > 0 {
            self.write = Some(rx);
        }
    }

    fn schedule_status(&mut self, accepted: bool) {
        let status = match accepted {
            true => STATUS_ACCEPTED,
            false => STATUS_CRC_ERROR,
        };

        let mut slot = match self.spi {
            true => 1,
            false => 2,
        };

        self.timeline.set(slot, Line::Dat0, Drive::Low);
        slot += 1;
        for i in (0..3).rev() {
            self.timeline
                .set(slot, Line::Dat0, Drive::from_bool((status >> i) & 1 != 0));
            slot += 1;
        }
        self.timeline.set(slot, Line::Dat0, Drive::High);
        slot += 1;

        if accepted {
            for _ in 0..self.config.busy_cycles() {
                self.timeline.set(slot, Line::Dat0, Drive::Low);
                slot += 1;
            }
        }
    }

    /// Gets the number of output slots still scheduled.
    pub fn pending_slots(&self) -> usize {
        self.timeline.len()
    }
}
