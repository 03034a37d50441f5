use fugit::HertzU32;

use crate::io_ocr::IoOcr;

/// Represents SDIO host configuration parameters.
///
/// Timeouts are counted in bus clock cycles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    command_attempts: u8,
    response_timeout: u32,
    data_timeout: Option<u32>,
    busy_timeout: u32,
    command_gap: u32,
    op_cond_attempts: u16,
    op_cond_poll: u32,
    ready_attempts: u16,
    voltage_window: IoOcr,
    init_clock: HertzU32,
    send_if_cond: bool,
    io_reset: bool,
    select_card: bool,
    rca_changes: u8,
    read_wait: u32,
    cis_read_len: u16,
}

impl Config {
    /// Default number of attempts for a command before giving up.
    pub const COMMAND_ATTEMPTS: u8 = 3;
    /// Default response timeout in clock cycles.
    pub const RESPONSE_TIMEOUT: u32 = 1000;
    /// Lower bound of the derived data timeout in clock cycles.
    pub const MIN_DATA_TIMEOUT: u32 = 1000;
    /// Default write busy timeout in clock cycles.
    pub const BUSY_TIMEOUT: u32 = 4000;
    /// Default number of idle cycles between commands.
    pub const COMMAND_GAP: u32 = 8;
    /// Default number of CMD5 polls before the card is declared not ready.
    pub const OP_COND_ATTEMPTS: u16 = 100;
    /// Default number of idle cycles between CMD5 polls.
    pub const OP_COND_POLL: u32 = 1000;
    /// Default number of IO_READY polls after enabling a function.
    pub const READY_ATTEMPTS: u16 = 100;
    /// Default host voltage window (2.7-3.6V).
    pub const VOLTAGE_WINDOW: u32 = 0x00ff_8000;
    /// Default number of CIS bytes read per function.
    pub const CIS_READ_LEN: u16 = 256;

    /// Creates a new [Config].
    pub const fn new() -> Self {
        Self {
            command_attempts: Self::COMMAND_ATTEMPTS,
            response_timeout: Self::RESPONSE_TIMEOUT,
            data_timeout: None,
            busy_timeout: Self::BUSY_TIMEOUT,
            command_gap: Self::COMMAND_GAP,
            op_cond_attempts: Self::OP_COND_ATTEMPTS,
            op_cond_poll: Self::OP_COND_POLL,
            ready_attempts: Self::READY_ATTEMPTS,
            voltage_window: IoOcr::from_u32(Self::VOLTAGE_WINDOW),
            init_clock: HertzU32::kHz(400),
            send_if_cond: false,
            io_reset: false,
            select_card: true,
            rca_changes: 0,
            read_wait: 0,
            cis_read_len: Self::CIS_READ_LEN,
        }
    }

    /// Gets the number of attempts made for a command before giving up.
    pub const fn command_attempts(&self) -> u8 {
        self.command_attempts
    }

    /// Sets the number of attempts made for a command before giving up.
    pub fn set_command_attempts(&mut self, attempts: u8) {
        self.command_attempts = attempts.max(1);
    }

    /// Builder function that sets the number of attempts made for a command.
    pub fn with_command_attempts(self, attempts: u8) -> Self {
        Self {
            command_attempts: attempts.max(1),
            ..self
        }
    }

    /// Gets the response timeout in clock cycles.
    pub const fn response_timeout(&self) -> u32 {
        self.response_timeout
    }

    /// Sets the response timeout in clock cycles.
    pub fn set_response_timeout(&mut self, cycles: u32) {
        self.response_timeout = cycles;
    }

    /// Builder function that sets the response timeout in clock cycles.
    pub fn with_response_timeout(self, cycles: u32) -> Self {
        Self {
            response_timeout: cycles,
            ..self
        }
    }

    /// Gets the data timeout in clock cycles for the given bus clock rate.
    ///
    /// Unless set explicitly, the timeout is 1 ms worth of cycles, bounded below by
    /// [MIN_DATA_TIMEOUT](Self::MIN_DATA_TIMEOUT).
    pub fn data_timeout(&self, rate: HertzU32) -> u32 {
        self.data_timeout
            .unwrap_or_else(|| (rate.raw() / 1000).max(Self::MIN_DATA_TIMEOUT))
    }

    /// Sets an explicit data timeout in clock cycles.
    pub fn set_data_timeout(&mut self, cycles: Option<u32>) {
        self.data_timeout = cycles;
    }

    /// Builder function that sets an explicit data timeout in clock cycles.
    pub fn with_data_timeout(self, cycles: u32) -> Self {
        Self {
            data_timeout: Some(cycles),
            ..self
        }
    }

    /// Gets the write busy timeout in clock cycles.
    pub const fn busy_timeout(&self) -> u32 {
        self.busy_timeout
    }

    /// Builder function that sets the write busy timeout in clock cycles.
    pub fn with_busy_timeout(self, cycles: u32) -> Self {
        Self {
            busy_timeout: cycles,
            ..self
        }
    }

    /// Gets the number of idle cycles clocked between commands.
    pub const fn command_gap(&self) -> u32 {
        self.command_gap
    }

    /// Builder function that sets the number of idle cycles between commands.
    pub fn with_command_gap(self, cycles: u32) -> Self {
        Self {
            command_gap: cycles,
            ..self
        }
    }

    /// Gets the number of CMD5 polls made before the card is declared not ready.
    pub const fn op_cond_attempts(&self) -> u16 {
        self.op_cond_attempts
    }

    /// Builder function that sets the number of CMD5 polls.
    pub fn with_op_cond_attempts(self, attempts: u16) -> Self {
        Self {
            op_cond_attempts: attempts.max(1),
            ..self
        }
    }

    /// Gets the number of idle cycles between CMD5 polls.
    pub const fn op_cond_poll(&self) -> u32 {
        self.op_cond_poll
    }

    /// Builder function that sets the number of idle cycles between CMD5 polls.
    pub fn with_op_cond_poll(self, cycles: u32) -> Self {
        Self {
            op_cond_poll: cycles,
            ..self
        }
    }

    /// Gets the number of IO_READY polls after enabling a function.
    pub const fn ready_attempts(&self) -> u16 {
        self.ready_attempts
    }

    /// Builder function that sets the number of IO_READY polls.
    pub fn with_ready_attempts(self, attempts: u16) -> Self {
        Self {
            ready_attempts: attempts.max(1),
            ..self
        }
    }

    /// Gets the host voltage window offered during CMD5 negotiation.
    pub const fn voltage_window(&self) -> IoOcr {
        self.voltage_window
    }

    /// Builder function that sets the host voltage window.
    pub fn with_voltage_window(self, voltage_window: IoOcr) -> Self {
        Self {
            voltage_window,
            ..self
        }
    }

    /// Gets the bus clock rate used during initialization.
    pub const fn init_clock(&self) -> HertzU32 {
        self.init_clock
    }

    /// Builder function that sets the bus clock rate used during initialization.
    pub fn with_init_clock(self, init_clock: HertzU32) -> Self {
        Self { init_clock, ..self }
    }

    /// Gets whether CMD8 is sent during initialization.
    pub const fn send_if_cond(&self) -> bool {
        self.send_if_cond
    }

    /// Builder function that sets whether CMD8 is sent during initialization.
    pub fn with_send_if_cond(self, send_if_cond: bool) -> Self {
        Self {
            send_if_cond,
            ..self
        }
    }

    /// Gets whether the I/O portion is reset through the CCCR before initialization.
    pub const fn io_reset(&self) -> bool {
        self.io_reset
    }

    /// Builder function that sets whether the I/O portion is reset before initialization.
    pub fn with_io_reset(self, io_reset: bool) -> Self {
        Self { io_reset, ..self }
    }

    /// Gets whether the card is selected with CMD7 during initialization.
    pub const fn select_card(&self) -> bool {
        self.select_card
    }

    /// Builder function that sets whether the card is selected during initialization.
    pub fn with_select_card(self, select_card: bool) -> Self {
        Self {
            select_card,
            ..self
        }
    }

    /// Gets the number of extra CMD3 requests made before the card is selected.
    pub const fn rca_changes(&self) -> u8 {
        self.rca_changes
    }

    /// Builder function that sets the number of extra CMD3 requests made during
    /// initialization. The card publishes a new RCA for each and the last one is selected.
    pub fn with_rca_changes(self, rca_changes: u8) -> Self {
        Self {
            rca_changes,
            ..self
        }
    }

    /// Gets the read wait in clock cycles held between blocks of a multi-block read.
    ///
    /// Zero disables read wait. Only cards reporting SRW in their capability register honour
    /// it.
    pub const fn read_wait(&self) -> u32 {
        self.read_wait
    }

    /// Sets the read wait in clock cycles held between blocks of a multi-block read.
    pub fn set_read_wait(&mut self, cycles: u32) {
        self.read_wait = cycles;
    }

    /// Builder function that sets the read wait in clock cycles.
    pub fn with_read_wait(self, cycles: u32) -> Self {
        Self {
            read_wait: cycles,
            ..self
        }
    }

    /// Gets the number of CIS bytes read per function.
    pub const fn cis_read_len(&self) -> u16 {
        self.cis_read_len
    }

    /// Builder function that sets the number of CIS bytes read per function.
    pub fn with_cis_read_len(self, len: u16) -> Self {
        Self {
            cis_read_len: len.clamp(1, 512),
            ..self
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_timeout() {
        let config = Config::new();

        assert_eq!(config.data_timeout(HertzU32::MHz(50)), 50_000);
        assert_eq!(config.data_timeout(HertzU32::kHz(400)), Config::MIN_DATA_TIMEOUT);
        assert_eq!(
            config.with_data_timeout(123).data_timeout(HertzU32::MHz(50)),
            123
        );
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_command_attempts(0)
            .with_op_cond_attempts(5)
            .with_send_if_cond(true);

        assert_eq!(config.command_attempts(), 1);
        assert_eq!(config.op_cond_attempts(), 5);
        assert!(config.send_if_cond());
        assert!(config.select_card());
        assert_eq!(config.rca_changes(), 0);
        assert_eq!(config.read_wait(), 0);
        assert_eq!(config.voltage_window().into_u32(), 0x00ff_8000);
    }
}
