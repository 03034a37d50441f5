use crate::Error;

/// Represents the transaction states of the SDIO host.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Represents the idle state.
    ///
    /// No command is in flight; the bus may be reconfigured.
    Idle,
    /// Represents the command state.
    ///
    /// A command has been issued and its response is outstanding.
    Command,
    /// Represents the transfer state.
    ///
    /// A CMD53 data phase is in progress and owns the data lines.
    Transfer,
}

impl State {
    /// Creates a new [State].
    pub const fn new() -> Self {
        Self::Idle
    }

    /// Checks if the [State] transition is valid.
    pub const fn valid_transition(self, state: Self) -> Result<(), Error> {
        match (self, state) {
            (Self::Idle, Self::Command) => Ok(()),
            (Self::Command, Self::Idle | Self::Transfer) => Ok(()),
            (Self::Transfer, Self::Idle) => Ok(()),
            _ => Err(Error::invalid_transition(self, state)),
        }
    }

    /// Gets whether no command is in flight.
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for State {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Command => write!(f, "command"),
            Self::Transfer => write!(f, "transfer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(State::Idle.valid_transition(State::Command).is_ok());
        assert!(State::Command.valid_transition(State::Transfer).is_ok());
        assert!(State::Transfer.valid_transition(State::Idle).is_ok());

        assert_eq!(
            State::Idle.valid_transition(State::Transfer),
            Err(Error::invalid_transition(State::Idle, State::Transfer))
        );
        assert!(State::Command.valid_transition(State::Command).is_err());
    }
}
