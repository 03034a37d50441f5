//! SDIO host protocol engine.

use fugit::HertzU32;
use strum::IntoEnumIterator;

use crate::{
    Argument,
    BlockMode,
    BusWidth,
    Command,
    Config,
    Error,
    Fault,
    FunctionNumber,
    IoOcr,
    Mode,
    OpCode,
    Response,
    ResponseKind,
    State,
    cccr::{self, Capabilities, Tuples},
    command::{Cmd5, Cmd8, Cmd52, Cmd53, RawFlag, RwFlag},
    context::{CardContext, CardInfo, FunctionInfo},
    data::MAX_BLOCK_LEN,
    fmt::Bytes,
    init::{InitError, InitSequence},
    phy::Phy,
    response::OpCond,
};

/// Data direction and buffer of a CMD53 transfer.
#[derive(Debug)]
pub enum TransferData<'a> {
    /// Reads from the card into the buffer.
    Read(&'a mut [u8]),
    /// Writes the buffer to the card.
    Write(&'a [u8]),
}

impl TransferData<'_> {
    /// Gets the direction of the transfer.
    pub const fn rw_flag(&self) -> RwFlag {
        match self {
            Self::Read(_) => RwFlag::Read,
            Self::Write(_) => RwFlag::Write,
        }
    }

    /// Gets the length of the transfer buffer.
    pub const fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }

    /// Gets whether the transfer buffer is empty.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SDIO host driving one card through a [Phy].
///
/// Every operation runs to completion before returning; the engine owns the transport
/// exclusively, so operations are issued in strict order.
#[derive(Debug)]
pub struct SdioHost<P> {
    phy: P,
    config: Config,
    context: CardContext,
    state: State,
    card_info: CardInfo,
}

impl<P: Phy> SdioHost<P> {
    /// Creates a new [SdioHost] and starts the bus clock at the initialization rate.
    pub fn new(mut phy: P, config: Config) -> Result<Self, Error> {
        let rate = config.init_clock();
        phy.set_clock_rate(rate)?;

        let mut context = CardContext::new();
        context.set_clock_rate(rate);
        context.set_bus_width(phy.bus_width());

        Ok(Self {
            phy,
            config,
            context,
            state: State::new(),
            card_info: CardInfo::default(),
        })
    }

    /// Gets the bus mode of the transport.
    pub fn mode(&self) -> Mode {
        self.phy.mode()
    }

    /// Gets the host configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the card context.
    pub const fn context(&self) -> &CardContext {
        &self.context
    }

    /// Gets the card information read by the last register dump.
    pub const fn card_info(&self) -> &CardInfo {
        &self.card_info
    }

    /// Gets the transaction state.
    pub const fn state(&self) -> State {
        self.state
    }

    /// Gets the transport.
    pub const fn phy(&self) -> &P {
        &self.phy
    }

    /// Gets the transport mutably.
    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Releases the transport.
    pub fn release(self) -> P {
        self.phy
    }

    pub(crate) fn context_mut(&mut self) -> &mut CardContext {
        &mut self.context
    }

    pub(crate) fn set_card_info(&mut self, info: CardInfo) {
        self.card_info = info;
    }

    fn transition(&mut self, state: State) -> Result<(), Error> {
        self.state.valid_transition(state)?;
        self.state = state;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), Error> {
        match self.state {
            State::Idle => Ok(()),
            state => Err(Error::invalid_transition(state, State::Idle)),
        }
    }

    /// Runs `op` as one bus transaction, retrying on transport faults.
    ///
    /// The transport is released after every attempt.
    fn transact<T>(&mut self, mut op: impl FnMut(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        self.ensure_idle()?;

        let attempts = self.config.command_attempts().max(1);
        let mut last = Fault::Timeout;

        for attempt in 1..=attempts {
            self.transition(State::Command)?;
            let result = op(self);
            let finished = self.phy.finish();
            self.state = State::Idle;

            let err = match result.and_then(|val| finished.map(|_| val)) {
                Ok(val) => return Ok(val),
                Err(err) => err,
            };

            match err.fault() {
                Some(fault) => {
                    warn!("attempt {}/{} failed: {}", attempt, attempts, err);
                    last = fault;
                    self.phy.idle(self.config.command_gap())?;
                }
                None => return Err(err),
            }
        }

        error!("giving up after {} attempts, last fault: {}", attempts, last);
        Err(Error::RetriesExhausted { attempts, last })
    }

    /// Sends `command` and receives its response, within a transaction.
    fn command(&mut self, command: Command) -> Result<Response, Error> {
        let mode = self.phy.mode();
        let index = command.index()?;
        let kind = index.response_kind(mode);

        trace!("sending {}", command);
        self.phy.send_command(&command.encode())?;

        if kind == ResponseKind::None {
            return Ok(Response::None);
        }

        let bits = self
            .phy
            .receive_response(kind.bits(mode), self.config.response_timeout())?;
        let response = Response::decode_for(mode, &bits, kind);

        if let Some(reason) = response.invalid() {
            debug!("invalid response to {}: {:?}", command, reason);
            return Err(reason.fault().into());
        }

        match response.command_index() {
            Some(received) if received != index.into_inner() => {
                return Err(Error::UnexpectedResponseType {
                    expected: index.into_inner(),
                    received,
                });
            }
            _ => {}
        }

        trace!("{} -> {}", command, response);
        response.check_status()?;

        if kind.has_busy() {
            self.phy.wait_busy(self.config.busy_timeout())?;
        }

        Ok(response)
    }

    fn data_timeout(&self) -> u32 {
        self.config.data_timeout(self.phy.clock_rate())
    }

    /// Sends CMD0 (`GO_IDLE_STATE`).
    ///
    /// No response is expected on the SD bus. In SPI mode the card answers with an R1 once it
    /// has switched to SPI.
    pub fn cmd_go_idle(&mut self) -> Result<Response, Error> {
        self.transact(|host| host.command(Command::go_idle_state()))
    }

    /// Sends CMD8 (`SEND_IF_COND`) with `check_pattern`.
    ///
    /// I/O-only cards do not answer CMD8, so a timeout yields `Ok(None)`.
    pub fn cmd_send_if_cond(&mut self, check_pattern: u8) -> Result<Option<Response>, Error> {
        let command = Command::send_if_cond(Cmd8::new(check_pattern));

        match self.transact(|host| host.command(command)) {
            Ok(response) => Ok(Some(response)),
            Err(Error::RetriesExhausted {
                last: Fault::Timeout,
                ..
            }) => {
                debug!("no answer to CMD8, assuming an I/O-only card");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends CMD5 (`IO_SEND_OP_COND`) with the given voltage window.
    ///
    /// An empty window probes the card OCR without starting initialization.
    pub fn cmd_io_send_op_cond(&mut self, io_ocr: IoOcr) -> Result<OpCond, Error> {
        let command = Command::io_send_op_cond(Cmd5::new(io_ocr));

        self.transact(|host| {
            let response = host.command(command)?;
            response.op_cond().ok_or(Error::Framing)
        })
    }

    /// Sends CMD3 (`SEND_RELATIVE_ADDR`) and stores the published RCA.
    pub fn cmd_send_relative_addr(&mut self) -> Result<u16, Error> {
        if self.phy.mode() == Mode::Spi {
            return Err(Error::Unsupported);
        }

        let rca = self.transact(|host| match host.command(Command::send_relative_addr())? {
            Response::R6(r6) => Ok(r6.rca()),
            _ => Err(Error::Framing),
        })?;

        debug!("card published RCA {:#06x}", rca);
        self.context.set_rca(rca);
        Ok(rca)
    }

    /// Sends CMD7 (`SELECT/DESELECT_CARD`) with `rca`.
    ///
    /// The card must report the I/O current state in its R1.
    pub fn cmd_select_card(&mut self, rca: u16) -> Result<(), Error> {
        if self.phy.mode() == Mode::Spi {
            return Err(Error::Unsupported);
        }

        self.transact(|host| host.command(Command::select_card(rca)))?;

        Ok(())
    }

    /// Performs an `IO_RW_DIRECT` (CMD52) access of a single register.
    ///
    /// For writes with [RawFlag::ReadAfterWrite] the response carries the value read back
    /// after the write. Transport faults are retried up to [Config::command_attempts] times.
    pub fn cmd_io_rw_direct(
        &mut self,
        function: u8,
        register_address: u32,
        rw: RwFlag,
        data: u8,
        raw: RawFlag,
    ) -> Result<Response, Error> {
        let function = FunctionNumber::try_from_u8(function)?;
        let arg = Cmd52::new(function, register_address, rw, raw, data)?;
        let command = Command::io_rw_direct(arg);

        self.transact(|host| host.command(command))
    }

    /// Performs an `IO_RW_EXTENDED` (CMD53) transfer.
    ///
    /// In byte mode `count` is the number of bytes (1..=512) and the buffer must be exactly that
    /// long. In block mode `count` is the number of blocks (1..=511) of the function's configured
    /// block size. Every block is CRC checked; a failed block fails the whole transfer, which is
    /// then retried as a unit.
    ///
    /// On the SD bus a non-zero [Config::read_wait] pauses multi-block reads between blocks.
    pub fn cmd_io_rw_extended(
        &mut self,
        function: u8,
        register_address: u32,
        block_mode: BlockMode,
        op_code: OpCode,
        count: u16,
        mut data: TransferData<'_>,
    ) -> Result<Response, Error> {
        let function = FunctionNumber::try_from_u8(function)?;
        let arg = Cmd53::new(function, register_address, data.rw_flag(), block_mode, op_code, count)?;

        let block_len = match block_mode {
            BlockMode::Byte => count as usize,
            BlockMode::Block => {
                let size = self.context.block_size(function) as usize;
                if size == 0 || size > MAX_BLOCK_LEN {
                    return Err(Error::invalid_argument(Argument::BlockLength(size)));
                }
                size
            }
        };

        let blocks = match block_mode {
            BlockMode::Byte => 1,
            BlockMode::Block => count as usize,
        };

        if data.len() != block_len * blocks {
            return Err(Error::invalid_argument(Argument::BufferLength(data.len())));
        }

        let command = Command::io_rw_extended(arg);
        let timeout = self.data_timeout();
        let read_wait = match self.phy.mode() {
            Mode::Sd => self.config.read_wait(),
            Mode::Spi => 0,
        };

        self.transact(|host| {
            let response = host.command(command)?;
            host.transition(State::Transfer)?;

            match &mut data {
                TransferData::Read(buf) => {
                    for (i, block) in buf.chunks_mut(block_len).enumerate() {
                        if i > 0 && read_wait > 0 {
                            host.phy.read_wait(read_wait)?;
                        }
                        host.phy.receive_data_block(block, timeout)?;
                    }
                }
                TransferData::Write(buf) => {
                    for block in buf.chunks(block_len) {
                        host.phy.send_data_block(block, timeout)?;
                    }
                }
            }

            Ok(response)
        })
    }

    /// Reads a register of the given function with CMD52.
    pub fn read_reg(&mut self, function: FunctionNumber, address: u32) -> Result<u8, Error> {
        let response = self.cmd_io_rw_direct(
            function.into_u8(),
            address,
            RwFlag::Read,
            0,
            RawFlag::WriteOnly,
        )?;

        response.data().ok_or(Error::Framing)
    }

    /// Writes a register of the given function with CMD52 and returns the value read back.
    pub fn write_reg(&mut self, function: FunctionNumber, address: u32, data: u8) -> Result<u8, Error> {
        let response = self.cmd_io_rw_direct(
            function.into_u8(),
            address,
            RwFlag::Write,
            data,
            RawFlag::ReadAfterWrite,
        )?;

        response.data().ok_or(Error::Framing)
    }

    fn read_pointer(&mut self, address: u32) -> Result<u32, Error> {
        let mut pointer = 0;
        for i in 0..3 {
            let byte = self.read_reg(FunctionNumber::Registers, address + i)?;
            pointer |= (byte as u32) << (8 * i);
        }

        Ok(pointer)
    }

    fn require_io_function(function: FunctionNumber) -> Result<u8, Error> {
        match function {
            FunctionNumber::Registers => {
                Err(Error::invalid_argument(Argument::FunctionNumber(0)))
            }
            f => Ok(1 << f.into_u8()),
        }
    }

    /// Enables an I/O function and waits for the card to report it ready.
    pub fn enable_function(&mut self, function: FunctionNumber) -> Result<(), Error> {
        let bit = Self::require_io_function(function)?;

        let enables = self.read_reg(FunctionNumber::Registers, cccr::IO_ENABLE)?;
        self.write_reg(FunctionNumber::Registers, cccr::IO_ENABLE, enables | bit)?;

        for _ in 0..self.config.ready_attempts() {
            if self.read_reg(FunctionNumber::Registers, cccr::IO_READY)? & bit != 0 {
                debug!("{} ready", function);
                return Ok(());
            }

            self.phy.idle(self.config.command_gap())?;
        }

        warn!("{} did not become ready", function);
        Err(Error::CardNotReady)
    }

    /// Disables an I/O function.
    pub fn disable_function(&mut self, function: FunctionNumber) -> Result<(), Error> {
        let bit = Self::require_io_function(function)?;

        let enables = self.read_reg(FunctionNumber::Registers, cccr::IO_ENABLE)?;
        self.write_reg(FunctionNumber::Registers, cccr::IO_ENABLE, enables & !bit)?;

        Ok(())
    }

    /// Aborts a transfer in progress on `function`.
    pub fn send_abort(&mut self, function: FunctionNumber) -> Result<(), Error> {
        let value = function.into_u8() & cccr::IO_ABORT_AS_MASK;
        self.cmd_io_rw_direct(
            FunctionNumber::Registers.into_u8(),
            cccr::IO_ABORT,
            RwFlag::Write,
            value,
            RawFlag::WriteOnly,
        )?;

        Ok(())
    }

    /// Resets the I/O portion of the card.
    ///
    /// The card may reset before answering, so a missing response is not an error. The card
    /// context is cleared and the transport returns to a 1-bit bus.
    pub fn soft_reset(&mut self) -> Result<(), Error> {
        let result = self.cmd_io_rw_direct(
            FunctionNumber::Registers.into_u8(),
            cccr::IO_ABORT,
            RwFlag::Write,
            cccr::IO_ABORT_RES,
            RawFlag::WriteOnly,
        );

        match result {
            Ok(_)
            | Err(Error::RetriesExhausted {
                last: Fault::Timeout,
                ..
            }) => {}
            Err(err) => return Err(err),
        }

        self.phy.set_bus_width(BusWidth::One)?;

        let rate = self.context.clock_rate();
        self.context = CardContext::new();
        self.context.set_clock_rate(rate);
        self.card_info = CardInfo::default();

        info!("card I/O reset");
        Ok(())
    }

    /// Sets the block size used by block mode CMD53 transfers of `function`.
    pub fn set_block_size(&mut self, function: FunctionNumber, size: u16) -> Result<(), Error> {
        let max = self
            .card_info
            .max_block_size(function)
            .map_or(MAX_BLOCK_LEN, |max| (max as usize).min(MAX_BLOCK_LEN));

        if size == 0 || size as usize > max {
            return Err(Error::invalid_argument(Argument::BlockLength(size as usize)));
        }

        let address = cccr::block_size_address(function);
        let [lo, hi] = size.to_le_bytes();
        self.write_reg(FunctionNumber::Registers, address, lo)?;
        self.write_reg(FunctionNumber::Registers, address + 1, hi)?;

        debug!("{} block size set to {}", function, size);
        self.context.set_block_size(function, size);
        Ok(())
    }

    /// Reads every CCCR register and logs them.
    pub fn dump_cccr(&mut self) -> Result<[u8; cccr::CCCR_REGISTERS.len()], Error> {
        let mut values = [0; cccr::CCCR_REGISTERS.len()];

        info!("CCCR:");
        for (reg, value) in cccr::CCCR_REGISTERS.iter().zip(values.iter_mut()) {
            *value = self.read_reg(FunctionNumber::Registers, reg.offset)?;
            log_register(reg, reg.offset, *value);
        }

        Ok(values)
    }

    /// Reads every FBR register of `function` and logs them.
    pub fn dump_fbr(
        &mut self,
        function: FunctionNumber,
    ) -> Result<[u8; cccr::FBR_REGISTERS.len()], Error> {
        Self::require_io_function(function)?;

        let base = function.fbr_base();
        let mut values = [0; cccr::FBR_REGISTERS.len()];

        info!("{} FBR:", function);
        for (reg, value) in cccr::FBR_REGISTERS.iter().zip(values.iter_mut()) {
            *value = self.read_reg(FunctionNumber::Registers, base + reg.offset)?;
            log_register(reg, base + reg.offset, *value);
        }

        Ok(values)
    }

    fn read_cis<'a>(&mut self, pointer: u32, buf: &'a mut [u8; MAX_BLOCK_LEN]) -> Result<&'a [u8], Error> {
        let len = self.config.cis_read_len().clamp(1, MAX_BLOCK_LEN as u16);
        let cis = &mut buf[..len as usize];

        self.cmd_io_rw_extended(
            FunctionNumber::Registers.into_u8(),
            pointer,
            BlockMode::Byte,
            OpCode::IncrementingAddress,
            len,
            TransferData::Read(cis),
        )?;

        Ok(&buf[..len as usize])
    }

    /// Reads the Common I/O Area and the CIS of every function.
    ///
    /// With `dump` set, the CCCR, FBRs and CIS contents are logged.
    pub fn read_card_info(&mut self, dump: bool) -> Result<CardInfo, Error> {
        let mut info = CardInfo::default();
        let mut buf = [0u8; MAX_BLOCK_LEN];

        if dump {
            self.dump_cccr()?;
        }

        info.cccr_revision = self.read_reg(FunctionNumber::Registers, cccr::REVISION)?;
        info.sd_revision = self.read_reg(FunctionNumber::Registers, cccr::SD_REVISION)?;
        info.capabilities =
            Capabilities::from_u8(self.read_reg(FunctionNumber::Registers, cccr::CARD_CAPABILITY)?);
        info.cis_pointer = self.read_pointer(cccr::CIS_POINTER)?;

        let cis = self.read_cis(info.cis_pointer, &mut buf)?;
        if dump {
            info!("common CIS @ {:#07x}: {:02x}", info.cis_pointer, Bytes(cis));
        }

        for tuple in Tuples::new(cis) {
            if let Some(ids) = tuple.manufacturer_id() {
                info.manufacturer = Some(ids);
            }
            if let Some(size) = tuple.max_block_size(FunctionNumber::Registers) {
                info.max_block_size = Some(size);
            }
        }

        let count = self.context.function_count() as usize;
        for function in FunctionNumber::iter().skip(1).take(count) {
            if dump {
                self.dump_fbr(function)?;
            }

            let code = self.read_reg(FunctionNumber::Registers, function.fbr_base())? & 0x0f;
            let pointer = self.read_pointer(cccr::cis_pointer_address(function))?;

            let cis = self.read_cis(pointer, &mut buf)?;
            if dump {
                info!("{} CIS @ {:#07x}: {:02x}", function, pointer, Bytes(cis));
            }

            let max_block_size = Tuples::new(cis).find_map(|tuple| tuple.max_block_size(function));
            if max_block_size.is_none() {
                warn!("{} CIS has no CISTPL_FUNCE", function);
            }

            let fn_info = FunctionInfo {
                function,
                interface_code: code,
                cis_pointer: pointer,
                max_block_size,
            };

            if info.functions.push(fn_info).is_err() {
                break;
            }
        }

        Ok(info)
    }

    /// Runs the initialization sequence to completion.
    ///
    /// With `dump_regs` set, the Common I/O Area is read, logged and recorded in
    /// [card_info](Self::card_info).
    pub fn sdio_init(&mut self, dump_regs: bool) -> Result<CardContext, InitError> {
        let mut sequence = InitSequence::new(dump_regs);

        while !sequence.is_done() {
            sequence.step(self)?;
        }

        Ok(self.context)
    }

    /// Switches the data bus width.
    ///
    /// On the SD bus the bus width field of the CCCR bus interface control register is updated
    /// and verified before the transport is reconfigured.
    pub fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error> {
        self.ensure_idle()?;

        if self.phy.mode() == Mode::Spi {
            self.phy.set_bus_width(width)?;
            self.context.set_bus_width(width);
            return Ok(());
        }

        let current = self.read_reg(FunctionNumber::Registers, cccr::BUS_INTERFACE)?;
        let value = (current & !cccr::BUS_WIDTH_MASK) | width.cccr_bits();
        let readback = self.write_reg(FunctionNumber::Registers, cccr::BUS_INTERFACE, value)?;

        if readback & cccr::BUS_WIDTH_MASK != width.cccr_bits() {
            warn!("card kept bus interface control at {:#04x}", readback);
            return Err(Error::Unsupported);
        }

        self.phy.set_bus_width(width)?;
        self.context.set_bus_width(width);

        info!("bus width set to {}", width.lines());
        Ok(())
    }

    /// Stops and restarts the bus clock at `rate`.
    pub fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error> {
        self.ensure_idle()?;

        self.phy.set_clock_rate(rate)?;
        self.context.set_clock_rate(rate);

        info!("bus clock set to {} kHz", rate.to_kHz());
        Ok(())
    }

    /// Gets the number of unknown bus samples seen so far.
    pub fn unknown_samples(&self) -> u32 {
        self.phy.unknown_samples()
    }

    pub(crate) fn probe_op_cond(&mut self) -> Result<OpCond, Error> {
        let op_cond = self.cmd_io_send_op_cond(IoOcr::new())?;
        self.context
            .set_op_cond(op_cond.number_of_functions, op_cond.memory_present, op_cond.io_ocr);
        Ok(op_cond)
    }
}

fn log_register(reg: &cccr::Register, address: u32, value: u8) {
    if reg.flags {
        info!("{:#05x} {}: {:#010b}", address, reg.name, value);
    } else {
        info!("{:#05x} {}: {:#04x}", address, reg.name, value);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, vec::Vec};

    use super::*;
    use crate::{
        BitSeq,
        response::{CardStatus, Flags, IoCurrentState, sd},
    };

    /// Transport that records command frames and replays scripted responses.
    #[derive(Debug, Default)]
    struct ScriptedPhy {
        width: BusWidth,
        rate: u32,
        frames: Vec<Command>,
        responses: VecDeque<Result<BitSeq, Error>>,
        blocks: VecDeque<Result<Vec<u8>, Error>>,
        written: Vec<Vec<u8>>,
        read_waits: Vec<u32>,
        finished: usize,
    }

    impl ScriptedPhy {
        fn respond(&mut self, response: Response) {
            self.responses.push_back(Ok(response.encode()));
        }

        fn r5(&mut self, index: u8, data: u8) {
            self.respond(Response::R5(sd::R5::new(
                index,
                Flags::new(IoCurrentState::Command),
                data,
            )));
        }

        fn indices(&self) -> Vec<u8> {
            self.frames.iter().map(|c| c.raw_index()).collect()
        }
    }

    impl Phy for ScriptedPhy {
        fn mode(&self) -> Mode {
            Mode::Sd
        }

        fn bus_width(&self) -> BusWidth {
            self.width
        }

        fn set_bus_width(&mut self, width: BusWidth) -> Result<(), Error> {
            self.width = width;
            Ok(())
        }

        fn clock_rate(&self) -> HertzU32 {
            HertzU32::from_raw(self.rate)
        }

        fn set_clock_rate(&mut self, rate: HertzU32) -> Result<(), Error> {
            self.rate = rate.raw();
            Ok(())
        }

        fn send_command(&mut self, frame: &BitSeq) -> Result<(), Error> {
            self.frames.push(Command::try_from_bits(frame)?);
            Ok(())
        }

        fn receive_response(&mut self, _bits: usize, _timeout: u32) -> Result<BitSeq, Error> {
            self.responses.pop_front().unwrap_or(Err(Error::TransportTimeout))
        }

        fn wait_busy(&mut self, _timeout: u32) -> Result<(), Error> {
            Ok(())
        }

        fn send_data_block(&mut self, data: &[u8], _timeout: u32) -> Result<(), Error> {
            self.written.push(data.to_vec());
            Ok(())
        }

        fn receive_data_block(&mut self, buf: &mut [u8], _timeout: u32) -> Result<(), Error> {
            let block = self.blocks.pop_front().unwrap_or(Err(Error::TransportTimeout))?;
            buf.copy_from_slice(&block);
            Ok(())
        }

        fn idle(&mut self, _cycles: u32) -> Result<(), Error> {
            Ok(())
        }

        fn read_wait(&mut self, cycles: u32) -> Result<(), Error> {
            self.read_waits.push(cycles);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), Error> {
            self.finished += 1;
            Ok(())
        }

        fn unknown_samples(&self) -> u32 {
            0
        }
    }

    fn host(phy: ScriptedPhy) -> SdioHost<ScriptedPhy> {
        SdioHost::new(phy, Config::new()).unwrap()
    }

    #[test]
    fn test_cmd52_write_argument() {
        let mut phy = ScriptedPhy::default();
        phy.r5(52, 0xab);
        let mut host = host(phy);

        let response = host
            .cmd_io_rw_direct(1, 0x100, RwFlag::Write, 0xab, RawFlag::WriteOnly)
            .unwrap();

        assert_eq!(response.data(), Some(0xab));
        assert_eq!(host.phy().frames.len(), 1);
        assert_eq!(host.phy().frames[0].argument(), 0x9002_00ab);
        assert_eq!(host.phy().finished, 1);
        assert_eq!(host.state(), State::Idle);
    }

    #[test]
    fn test_retry_bound() {
        let mut host = host(ScriptedPhy::default());

        let err = host
            .cmd_io_rw_direct(0, 0x00, RwFlag::Read, 0, RawFlag::WriteOnly)
            .unwrap_err();

        assert_eq!(
            err,
            Error::RetriesExhausted {
                attempts: 3,
                last: Fault::Timeout
            }
        );
        assert_eq!(host.phy().frames.len(), 3);
        assert_eq!(host.phy().finished, 3);
    }

    #[test]
    fn test_retry_recovers_from_crc_error() {
        let mut phy = ScriptedPhy::default();
        let mut corrupted = Response::R5(sd::R5::new(52, Flags::new(IoCurrentState::Command), 0x32))
            .encode();
        corrupted.flip(20);
        phy.responses.push_back(Ok(corrupted));
        phy.r5(52, 0x32);
        let mut host = host(phy);

        assert_eq!(host.read_reg(FunctionNumber::Registers, 0x00), Ok(0x32));
        assert_eq!(host.phy().frames.len(), 2);
    }

    #[test]
    fn test_invalid_arguments_never_reach_the_bus() {
        let mut host = host(ScriptedPhy::default());

        assert_eq!(
            host.cmd_io_rw_direct(8, 0x00, RwFlag::Read, 0, RawFlag::WriteOnly),
            Err(Error::invalid_argument(Argument::FunctionNumber(8)))
        );
        assert_eq!(
            host.cmd_io_rw_direct(0, 0x2_0000, RwFlag::Read, 0, RawFlag::WriteOnly),
            Err(Error::invalid_argument(Argument::RegisterAddress(0x2_0000)))
        );

        let mut buf = [0u8; 16];
        assert_eq!(
            host.cmd_io_rw_extended(
                1,
                0x00,
                BlockMode::Byte,
                OpCode::IncrementingAddress,
                0,
                TransferData::Read(&mut buf)
            ),
            Err(Error::invalid_argument(Argument::ByteCount(0)))
        );
        assert_eq!(
            host.cmd_io_rw_extended(
                1,
                0x00,
                BlockMode::Byte,
                OpCode::IncrementingAddress,
                8,
                TransferData::Read(&mut buf)
            ),
            Err(Error::invalid_argument(Argument::BufferLength(16)))
        );
        assert_eq!(
            host.cmd_io_rw_extended(
                1,
                0x00,
                BlockMode::Block,
                OpCode::IncrementingAddress,
                1,
                TransferData::Write(&buf)
            ),
            Err(Error::invalid_argument(Argument::BlockLength(0)))
        );

        assert!(host.phy().frames.is_empty());
    }

    #[test]
    fn test_unexpected_response_index() {
        let mut phy = ScriptedPhy::default();
        phy.r5(53, 0x00);
        let mut host = host(phy);

        assert_eq!(
            host.read_reg(FunctionNumber::Registers, 0x00),
            Err(Error::UnexpectedResponseType {
                expected: 52,
                received: 53
            })
        );
        assert_eq!(host.phy().frames.len(), 1);
    }

    #[test]
    fn test_io_status_error() {
        let mut phy = ScriptedPhy::default();
        let mut flags = Flags::new(IoCurrentState::Command);
        flags.set_out_of_range(true);
        phy.respond(Response::R5(sd::R5::new(52, flags, 0x00)));
        let mut host = host(phy);

        assert_eq!(
            host.read_reg(FunctionNumber::Io1, 0x1_ffff),
            Err(Error::IoStatus(flags))
        );
    }

    #[test]
    fn test_extended_write_blocks() {
        let mut phy = ScriptedPhy::default();
        phy.r5(52, 0x08);
        phy.r5(52, 0x00);
        phy.r5(53, 0x00);
        let mut host = host(phy);

        host.set_block_size(FunctionNumber::Io1, 8).unwrap();

        let data: Vec<u8> = (0..24).collect();
        host.cmd_io_rw_extended(
            1,
            0x20,
            BlockMode::Block,
            OpCode::FixedAddress,
            3,
            TransferData::Write(&data),
        )
        .unwrap();

        let phy = host.phy();
        assert_eq!(phy.indices(), [52, 52, 53]);
        assert_eq!(phy.frames[0].argument() >> 9 & 0x1_ffff, 0x110);
        assert_eq!(phy.frames[2].argument() & 0x1ff, 3);
        assert_eq!(phy.written.len(), 3);
        assert_eq!(phy.written[2], [16, 17, 18, 19, 20, 21, 22, 23]);
    }

    #[test]
    fn test_extended_read_crc_failure_retries_whole_transfer() {
        let mut phy = ScriptedPhy::default();
        phy.r5(53, 0x00);
        phy.blocks.push_back(Err(Error::CrcMismatch));
        phy.r5(53, 0x00);
        phy.blocks.push_back(Ok([0x5a; 4].to_vec()));
        let mut host = host(phy);

        let mut buf = [0u8; 4];
        host.cmd_io_rw_extended(
            1,
            0x00,
            BlockMode::Byte,
            OpCode::IncrementingAddress,
            4,
            TransferData::Read(&mut buf),
        )
        .unwrap();

        assert_eq!(buf, [0x5a; 4]);
        assert_eq!(host.phy().indices(), [53, 53]);
    }

    #[test]
    fn test_read_wait_between_blocks() {
        let mut phy = ScriptedPhy::default();
        phy.r5(52, 0x04);
        phy.r5(52, 0x00);
        phy.r5(53, 0x00);
        phy.blocks.extend((0..3u8).map(|i| Ok([i; 4].to_vec())));
        let mut host = SdioHost::new(phy, Config::new().with_read_wait(16)).unwrap();

        host.set_block_size(FunctionNumber::Io1, 4).unwrap();

        let mut buf = [0u8; 12];
        host.cmd_io_rw_extended(
            1,
            0x00,
            BlockMode::Block,
            OpCode::IncrementingAddress,
            3,
            TransferData::Read(&mut buf),
        )
        .unwrap();

        assert_eq!(buf, [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(host.phy().read_waits, [16, 16]);
    }

    #[test]
    fn test_set_bus_width() {
        let mut phy = ScriptedPhy::default();
        phy.r5(52, 0x80);
        phy.r5(52, 0x82);
        let mut host = host(phy);

        host.set_bus_width(BusWidth::Four).unwrap();

        assert_eq!(host.phy().bus_width(), BusWidth::Four);
        assert_eq!(host.context().bus_width(), BusWidth::Four);
        assert_eq!(host.phy().frames[1].argument() & 0xff, 0x82);
    }

    #[test]
    fn test_set_bus_width_rejected_by_card() {
        let mut phy = ScriptedPhy::default();
        phy.r5(52, 0x00);
        phy.r5(52, 0x00);
        let mut host = host(phy);

        assert_eq!(host.set_bus_width(BusWidth::Four), Err(Error::Unsupported));
        assert_eq!(host.phy().bus_width(), BusWidth::One);
    }

    #[test]
    fn test_select_card() {
        let mut phy = ScriptedPhy::default();
        let mut status = CardStatus::from_u32(0);
        status.set_current_state(CardStatus::IO_STATE);
        phy.respond(Response::R1(sd::R1::new(7, status)));
        let mut host = host(phy);

        host.cmd_select_card(0x0001).unwrap();
        assert_eq!(host.phy().frames[0].argument(), 0x0001_0000);
    }
}
