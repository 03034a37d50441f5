//! # SDIO card simulation
//!
//! ## Overview
//!
//! A cycle-level model of an SDIO 2.0 card wired to the host through simulated bus lines. The
//! [Simulation] owns the world (lines, card and time); the host side gets a [SimClock] and
//! [SimPins] pair implementing the `sdio-host` PHY traits, so the real host engine talks to
//! the card bit by bit.
//!
//! Each clock edge advances the world: on rising edges the card samples the lines, on falling
//! edges it updates its outputs. Released lines are pulled up, opposite drives resolve to an
//! unknown level.
//!
//! ## Example
//!
//! ```rust, no_run
//! use sdio_host::{Config, Mode};
//! use sdio_sim::{CardConfig, Simulation};
//!
//! let sim = Simulation::new(CardConfig::new());
//! let mut host = sim.host(Mode::Sd, Config::new()).unwrap();
//! let card = host.sdio_init(false).unwrap();
//! assert!(card.initialized());
//! ```

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use sdio_host::{
    Config,
    Mode,
    SdioHost,
    phy::{AnyPhy, Edge},
};

mod card;
mod clock;
mod config;
mod fault;
mod memory;
mod wire;

pub use card::{CommandRecord, SimCard};
pub use clock::SimClock;
pub use config::CardConfig;
pub use fault::Faults;
pub use memory::{AccessError, Memory};
pub use wire::{Drive, SimPins, Wire};

/// Transport wired to the simulated bus.
pub type SimPhy = AnyPhy<SimClock, SimPins>;

/// Host engine wired to the simulated bus.
pub type SimHost = SdioHost<SimPhy>;

/// Shared state of the simulated bus.
#[derive(Debug)]
pub(crate) struct World {
    pub(crate) wire: Wire,
    pub(crate) card: SimCard,
    clock_high: bool,
    edges: u64,
    elapsed_ps: u64,
}

impl World {
    fn new(config: CardConfig) -> Self {
        Self {
            wire: Wire::new(),
            card: SimCard::new(config),
            clock_high: false,
            edges: 0,
            elapsed_ps: 0,
        }
    }

    /// Runs clock edges until the next `edge` has happened.
    pub(crate) fn advance_to(&mut self, edge: Edge, half_period_ps: u64) {
        loop {
            let next = match self.clock_high {
                true => Edge::Falling,
                false => Edge::Rising,
            };

            self.edges += 1;
            self.elapsed_ps += half_period_ps;

            match next {
                Edge::Rising => {
                    self.clock_high = true;
                    self.wire.check_conflicts();
                    self.card.on_rising(&self.wire);
                }
                Edge::Falling => {
                    self.clock_high = false;
                    let outputs = self.card.on_falling();
                    self.wire.set_card(outputs);
                }
            }

            if next == edge {
                break;
            }
        }
    }
}

/// Simulated card and bus, shared with the host through [SimClock] and [SimPins].
#[derive(Clone, Debug)]
pub struct Simulation {
    world: Rc<RefCell<World>>,
}

impl Simulation {
    /// Creates a simulation with a powered-up card.
    pub fn new(config: CardConfig) -> Self {
        log::debug!("sim: card {config:?}");

        Self {
            world: Rc::new(RefCell::new(World::new(config))),
        }
    }

    /// Creates a stopped clock driving this simulation.
    pub fn clock(&self) -> SimClock {
        SimClock::new(self.world.clone())
    }

    /// Creates host pins attached to this simulation.
    pub fn pins(&self) -> SimPins {
        SimPins::new(self.world.clone())
    }

    /// Creates a transport for `mode` attached to this simulation.
    pub fn phy(&self, mode: Mode) -> SimPhy {
        AnyPhy::new(mode, self.clock(), self.pins())
    }

    /// Creates a host engine for `mode` attached to this simulation.
    pub fn host(&self, mode: Mode, config: Config) -> Result<SimHost, sdio_host::Error> {
        SdioHost::new(self.phy(mode), config)
    }

    /// Borrows the card.
    ///
    /// The borrow must end before the host drives the bus again.
    pub fn card(&self) -> Ref<'_, SimCard> {
        Ref::map(self.world.borrow(), |world| &world.card)
    }

    /// Borrows the card mutably.
    ///
    /// The borrow must end before the host drives the bus again.
    pub fn card_mut(&self) -> RefMut<'_, SimCard> {
        RefMut::map(self.world.borrow_mut(), |world| &mut world.card)
    }

    /// Replaces the injected faults.
    pub fn set_faults(&self, faults: Faults) {
        *self.card_mut().faults_mut() = faults;
    }

    /// Gets the injected faults not consumed yet.
    pub fn faults(&self) -> Faults {
        *self.card().faults()
    }

    /// Gets every command the card received.
    pub fn commands(&self) -> Vec<CommandRecord> {
        self.card().commands().to_vec()
    }

    /// Gets the indices of every command the card received.
    pub fn command_indices(&self) -> Vec<u8> {
        self.card().commands().iter().map(|c| c.index).collect()
    }

    /// Gets the number of full clock cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.world.borrow().edges / 2
    }

    /// Gets the simulated time in picoseconds.
    pub fn elapsed_ps(&self) -> u64 {
        self.world.borrow().elapsed_ps
    }

    /// Gets the number of edges at which host and card drove a line to opposite levels.
    pub fn conflicts(&self) -> u32 {
        self.world.borrow().wire.conflicts()
    }
}

#[cfg(test)]
mod tests {
    use sdio_host::phy::{Clock, Line, Pins};

    use super::*;

    #[test]
    fn test_edges_alternate() {
        let sim = Simulation::new(CardConfig::new());
        let mut clock = sim.clock();
        clock.start(fugit::HertzU32::kHz(400));

        clock.wait_edge(Edge::Falling);
        assert_eq!(sim.world.borrow().edges, 2);
        clock.wait_edge(Edge::Rising);
        clock.wait_edge(Edge::Falling);
        assert_eq!(sim.cycles(), 2);
        assert_eq!(sim.elapsed_ps(), 4 * 1_250_000);
    }

    #[test]
    fn test_pins_see_pull_ups() {
        let sim = Simulation::new(CardConfig::new());
        let mut pins = sim.pins();

        assert_eq!(pins.sample(Line::Dat0), sdio_host::phy::Level::High);
        pins.drive(Line::Dat0, false);
        assert_eq!(pins.sample(Line::Dat0), sdio_host::phy::Level::Low);
        pins.release(Line::Dat0);
        assert_eq!(pins.sample(Line::Dat0), sdio_host::phy::Level::High);
    }
}
