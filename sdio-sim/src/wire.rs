//! Bus lines shared by the host pins and the simulated card.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use sdio_host::phy::{Level, Line, Pins};

use crate::World;

/// Number of bus lines (CMD and DAT0..DAT3).
pub const LINES: usize = 5;

/// Gets the index of `line` in per-line arrays.
pub const fn line_index(line: Line) -> usize {
    match line {
        Line::Cmd => 0,
        Line::Dat0 => 1,
        Line::Dat1 => 2,
        Line::Dat2 => 3,
        Line::Dat3 => 4,
    }
}

/// Output state of one side of a line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Drive {
    /// Not driving.
    #[default]
    Release,
    /// Driving low.
    Low,
    /// Driving high.
    High,
    /// Driving an undefined level.
    Unknown,
}

impl Drive {
    /// Converts a bit into a [Drive].
    pub const fn from_bool(high: bool) -> Self {
        match high {
            true => Self::High,
            false => Self::Low,
        }
    }
}

/// Resolves host and card outputs into line levels. Released lines are pulled up.
#[derive(Clone, Debug, Default)]
pub struct Wire {
    host: [Drive; LINES],
    card: [Drive; LINES],
    conflicts: u32,
}

impl Wire {
    /// Creates a new [Wire] with every line released.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_host(&mut self, line: Line, drive: Drive) {
        self.host[line_index(line)] = drive;
    }

    pub(crate) fn set_card(&mut self, outputs: [Drive; LINES]) {
        self.card = outputs;
    }

    /// Gets the number of edges at which host and card drove a line to opposite levels.
    pub fn conflicts(&self) -> u32 {
        self.conflicts
    }

    pub(crate) fn check_conflicts(&mut self) {
        let clash = self
            .host
            .iter()
            .zip(self.card.iter())
            .any(|pair| matches!(pair, (Drive::Low, Drive::High) | (Drive::High, Drive::Low)));

        if clash {
            self.conflicts += 1;
        }
    }

    /// Gets the resolved level of `line`.
    pub fn level(&self, line: Line) -> Level {
        let i = line_index(line);

        match (self.host[i], self.card[i]) {
            (Drive::Release, Drive::Release) => Level::High,
            (Drive::Unknown, _) | (_, Drive::Unknown) => Level::Unknown,
            (Drive::Low, Drive::High) | (Drive::High, Drive::Low) => Level::Unknown,
            (Drive::Low, _) | (_, Drive::Low) => Level::Low,
            (Drive::High, _) | (_, Drive::High) => Level::High,
        }
    }

    /// Gets the level of `line` as a bit, reading unknown levels as 1.
    pub fn bit(&self, line: Line) -> bool {
        self.level(line) != Level::Low
    }
}

/// Card outputs scheduled one slot per falling edge.
#[derive(Clone, Debug, Default)]
pub(crate) struct Timeline {
    slots: VecDeque<[Drive; LINES]>,
    current: [Drive; LINES],
    cmd_slots: usize,
}

impl Timeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules `drive` on `line` at `slot` falling edges from now (0 is the next one).
    pub(crate) fn set(&mut self, slot: usize, line: Line, drive: Drive) {
        while self.slots.len() <= slot {
            self.slots.push_back([Drive::Release; LINES]);
        }

        self.slots[slot][line_index(line)] = drive;

        if line == Line::Cmd && drive != Drive::Release {
            self.cmd_slots = self.cmd_slots.max(slot + 1);
        }
    }

    /// Gets the number of scheduled slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Pops the outputs for the current falling edge.
    pub(crate) fn advance(&mut self) -> [Drive; LINES] {
        self.current = self.slots.pop_front().unwrap_or_default();
        self.cmd_slots = self.cmd_slots.saturating_sub(1);
        self.current
    }

    /// Gets whether the card neither drives nor has scheduled anything.
    pub(crate) fn is_quiet(&self) -> bool {
        self.slots.is_empty() && self.current == [Drive::Release; LINES]
    }

    /// Gets whether the card neither drives nor has scheduled anything on CMD.
    pub(crate) fn cmd_quiet(&self) -> bool {
        self.cmd_slots == 0 && self.current[line_index(Line::Cmd)] == Drive::Release
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.cmd_slots = 0;
    }
}

/// Host side of the bus lines.
#[derive(Clone, Debug)]
pub struct SimPins {
    world: Rc<RefCell<World>>,
}

impl SimPins {
    pub(crate) fn new(world: Rc<RefCell<World>>) -> Self {
        Self { world }
    }
}

impl Pins for SimPins {
    fn drive(&mut self, line: Line, high: bool) {
        self.world
            .borrow_mut()
            .wire
            .set_host(line, Drive::from_bool(high));
    }

    fn release(&mut self, line: Line) {
        self.world.borrow_mut().wire.set_host(line, Drive::Release);
    }

    fn sample(&self, line: Line) -> Level {
        self.world.borrow().wire.level(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution() {
        let mut wire = Wire::new();
        assert_eq!(wire.level(Line::Cmd), Level::High);

        wire.set_host(Line::Cmd, Drive::Low);
        assert_eq!(wire.level(Line::Cmd), Level::Low);

        let mut card = [Drive::Release; LINES];
        card[line_index(Line::Cmd)] = Drive::High;
        wire.set_card(card);
        assert_eq!(wire.level(Line::Cmd), Level::Unknown);
        wire.check_conflicts();
        assert_eq!(wire.conflicts(), 1);

        wire.set_host(Line::Cmd, Drive::Release);
        card[line_index(Line::Dat0)] = Drive::Unknown;
        wire.set_card(card);
        assert_eq!(wire.level(Line::Cmd), Level::High);
        assert_eq!(wire.level(Line::Dat0), Level::Unknown);
        assert!(wire.bit(Line::Dat0));
    }

    #[test]
    fn test_timeline() {
        let mut timeline = Timeline::new();
        assert!(timeline.is_quiet());

        timeline.set(2, Line::Cmd, Drive::Low);
        timeline.set(4, Line::Dat0, Drive::Low);
        assert_eq!(timeline.len(), 5);
        assert!(!timeline.cmd_quiet());

        assert_eq!(timeline.advance(), [Drive::Release; LINES]);
        timeline.advance();
        assert_eq!(timeline.advance()[0], Drive::Low);
        assert!(!timeline.cmd_quiet());
        timeline.advance();
        assert!(timeline.cmd_quiet());
        assert!(!timeline.is_quiet());

        timeline.advance();
        assert!(!timeline.is_quiet());
        timeline.advance();
        assert!(timeline.is_quiet());
    }
}
