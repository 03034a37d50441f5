//! Card initialization state machine.

use crate::{Error, FunctionNumber, IoOcr, Mode, SdioHost, cccr, command::Cmd8, phy::Phy};

/// Stage of the initialization sequence that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::IntoStaticStr, strum::EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStage {
    /// Optional I/O reset through the CCCR.
    #[strum(serialize = "IO-reset")]
    Reset,
    /// CMD0.
    #[strum(serialize = "CMD0")]
    GoIdle,
    /// Optional CMD8.
    #[strum(serialize = "CMD8")]
    IfCond,
    /// CMD5 with an empty voltage window.
    #[strum(serialize = "CMD5-probe")]
    Cmd5Probe,
    /// CMD5 polling until the card is ready.
    #[strum(serialize = "CMD5-negotiate")]
    Cmd5Negotiate,
    /// CMD3.
    #[strum(serialize = "CMD3")]
    SendRelativeAddr,
    /// CMD7.
    #[strum(serialize = "CMD7")]
    SelectCard,
    /// Reading the Common I/O Area.
    #[strum(serialize = "read-registers")]
    ReadRegisters,
}

impl core::fmt::Display for InitStage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Initialization failure, tagged with the stage that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitError {
    /// The failed stage.
    pub stage: InitStage,
    /// The error that stopped the sequence.
    pub reason: Error,
}

impl InitError {
    /// Creates a new [InitError].
    pub const fn new(stage: InitStage, reason: Error) -> Self {
        Self { stage, reason }
    }
}

impl core::fmt::Display for InitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "initialization failed at {}: {}", self.stage, self.reason)
    }
}

impl core::error::Error for InitError {}

impl From<InitError> for Error {
    fn from(val: InitError) -> Self {
        val.reason
    }
}

/// State of the initialization sequence.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    /// Nothing sent yet.
    #[default]
    Reset,
    /// Sending CMD0.
    GoIdle,
    /// Sending CMD8.
    IfCond,
    /// Probing the card OCR with CMD5.
    ProbeOpCond,
    /// Polling CMD5 with the negotiated voltage window.
    NegotiateOpCond,
    /// Asking the card to publish its RCA.
    SendRelativeAddr,
    /// Selecting the card.
    SelectCard,
    /// Reading the Common I/O Area.
    ReadRegisters,
    /// The card is ready for I/O.
    Ready,
    /// The sequence stopped.
    Failed(InitError),
}

/// Steppable initialization sequence.
///
/// Each [step](Self::step) performs one stage (one CMD5 poll during negotiation), so a caller
/// may abandon the sequence between steps. Once failed, the sequence keeps reporting the
/// failure until [reset](Self::reset).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InitSequence {
    state: InitState,
    dump_regs: bool,
    polls: u16,
    window: IoOcr,
}

impl InitSequence {
    /// Creates a new [InitSequence].
    pub const fn new(dump_regs: bool) -> Self {
        Self {
            state: InitState::Reset,
            dump_regs,
            polls: 0,
            window: IoOcr::new(),
        }
    }

    /// Gets the current state.
    pub const fn state(&self) -> InitState {
        self.state
    }

    /// Gets the number of CMD5 polls made during negotiation.
    pub const fn polls(&self) -> u16 {
        self.polls
    }

    /// Gets whether the sequence reached [InitState::Ready].
    pub const fn is_done(&self) -> bool {
        matches!(self.state, InitState::Ready)
    }

    /// Restarts the sequence from [InitState::Reset].
    pub fn reset(&mut self) {
        *self = Self::new(self.dump_regs);
    }

    /// Performs the next stage of the sequence and returns the new state.
    pub fn step<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let next = match self.state {
            InitState::Reset => self.io_reset(host),
            InitState::GoIdle => self.go_idle(host),
            InitState::IfCond => self.if_cond(host),
            InitState::ProbeOpCond => self.probe(host),
            InitState::NegotiateOpCond => self.negotiate(host),
            InitState::SendRelativeAddr => self.send_relative_addr(host),
            InitState::SelectCard => self.select_card(host),
            InitState::ReadRegisters => self.read_registers(host),
            InitState::Ready => Ok(InitState::Ready),
            InitState::Failed(err) => return Err(err),
        };

        match next {
            Ok(state) => {
                if state != self.state {
                    trace!("init: {:?} -> {:?}", self.state, state);
                }
                self.state = state;
                Ok(state)
            }
            Err(err) => {
                error!("{}", err);
                self.state = InitState::Failed(err);
                Err(err)
            }
        }
    }

    fn io_reset<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        if host.config().io_reset() {
            // the card may not answer before CMD5, so any failure is ignored
            if let Err(err) = host.write_reg(
                FunctionNumber::Registers,
                cccr::IO_ABORT,
                cccr::IO_ABORT_RES,
            ) {
                debug!("I/O reset not acknowledged: {}", err);
            }
        }

        Ok(InitState::GoIdle)
    }

    fn go_idle<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        host.cmd_go_idle()
            .map_err(|err| InitError::new(InitStage::GoIdle, err))?;

        match host.config().send_if_cond() {
            true => Ok(InitState::IfCond),
            false => Ok(InitState::ProbeOpCond),
        }
    }

    fn if_cond<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        host.cmd_send_if_cond(Cmd8::CHECK_PATTERN)
            .map_err(|err| InitError::new(InitStage::IfCond, err))?;

        Ok(InitState::ProbeOpCond)
    }

    fn probe<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let fail = |err| InitError::new(InitStage::Cmd5Probe, err);

        let op_cond = host.probe_op_cond().map_err(fail)?;
        let host_window = host.config().voltage_window();

        info!(
            "card OCR {:#08x}, {} function(s), memory: {}",
            op_cond.io_ocr.into_u32(),
            op_cond.number_of_functions,
            op_cond.memory_present
        );

        let window = op_cond.io_ocr.intersect(host_window);
        if window.is_empty() {
            return Err(fail(Error::VoltageMismatch {
                card: op_cond.io_ocr.into_u32(),
                host: host_window.into_u32(),
            }));
        }

        self.window = window;
        self.polls = 0;
        Ok(InitState::NegotiateOpCond)
    }

    fn negotiate<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let fail = |err| InitError::new(InitStage::Cmd5Negotiate, err);

        if self.polls >= host.config().op_cond_attempts() {
            warn!("card not ready after {} CMD5 polls", self.polls);
            return Err(fail(Error::CardNotReady));
        }

        self.polls += 1;
        let op_cond = host.cmd_io_send_op_cond(self.window).map_err(fail)?;

        if !op_cond.ready {
            let poll = host.config().op_cond_poll();
            host.phy_mut().idle(poll).map_err(fail)?;
            return Ok(InitState::NegotiateOpCond);
        }

        debug!("card ready after {} CMD5 poll(s)", self.polls);
        host.context_mut().set_op_cond(
            op_cond.number_of_functions,
            op_cond.memory_present,
            op_cond.io_ocr,
        );

        match host.mode() {
            Mode::Sd => Ok(InitState::SendRelativeAddr),
            Mode::Spi => Ok(self.after_select(host)),
        }
    }

    fn send_relative_addr<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let fail = |err| InitError::new(InitStage::SendRelativeAddr, err);

        let mut rca = host.cmd_send_relative_addr().map_err(fail)?;

        // the card publishes a new address for every repeated CMD3
        for _ in 0..host.config().rca_changes() {
            let previous = rca;
            rca = host.cmd_send_relative_addr().map_err(fail)?;
            debug!("RCA changed from {:#06x} to {:#06x}", previous, rca);
        }

        match host.config().select_card() {
            true => Ok(InitState::SelectCard),
            false => Ok(self.after_select(host)),
        }
    }

    fn select_card<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let rca = host.context().rca();
        host.cmd_select_card(rca)
            .map_err(|err| InitError::new(InitStage::SelectCard, err))?;

        Ok(self.after_select(host))
    }

    fn read_registers<P: Phy>(&mut self, host: &mut SdioHost<P>) -> Result<InitState, InitError> {
        let info = host
            .read_card_info(true)
            .map_err(|err| InitError::new(InitStage::ReadRegisters, err))?;

        host.set_card_info(info);
        Ok(self.ready(host))
    }

    fn after_select<P: Phy>(&self, host: &mut SdioHost<P>) -> InitState {
        match self.dump_regs {
            true => InitState::ReadRegisters,
            false => self.ready(host),
        }
    }

    fn ready<P: Phy>(&self, host: &mut SdioHost<P>) -> InitState {
        host.context_mut().set_initialized(true);
        info!("card ready, RCA {:#06x}", host.context().rca());
        InitState::Ready
    }
}

impl Default for InitSequence {
    fn default() -> Self {
        Self::new(false)
    }
}
