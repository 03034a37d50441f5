//! Faults injected into the simulated card.

/// Fault injection counters.
///
/// Counted faults apply to the next matching events and then clear themselves.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Faults {
    /// Responses sent with a corrupted CRC7.
    pub corrupt_responses: u32,
    /// Read blocks sent with a corrupted data bit.
    pub corrupt_read_blocks: u32,
    /// Written blocks answered with a CRC error status.
    pub reject_writes: u32,
    /// Commands left unanswered.
    pub ignore_commands: u32,
    /// CMD5 never reports the card ready.
    pub never_ready: bool,
    /// Cycles of undefined level driven on the response line before every response.
    pub turnaround_unknown: usize,
}

impl Faults {
    /// Creates a new [Faults] with nothing injected.
    pub const fn new() -> Self {
        Self {
            corrupt_responses: 0,
            corrupt_read_blocks: 0,
            reject_writes: 0,
            ignore_commands: 0,
            never_ready: false,
            turnaround_unknown: 0,
        }
    }

    pub(crate) fn take(counter: &mut u32) -> bool {
        match *counter {
            0 => false,
            _ => {
                *counter -= 1;
                true
            }
        }
    }
}
