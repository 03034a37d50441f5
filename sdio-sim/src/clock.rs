//! Bus clock of the simulation.

use std::{cell::RefCell, rc::Rc};

use fugit::HertzU32;
use sdio_host::phy::{Clock, Edge};

use crate::World;

/// Clock that advances the simulated world one half period per edge.
#[derive(Clone, Debug)]
pub struct SimClock {
    world: Rc<RefCell<World>>,
    rate: HertzU32,
    running: bool,
}

impl SimClock {
    pub(crate) fn new(world: Rc<RefCell<World>>) -> Self {
        Self {
            world,
            rate: HertzU32::from_raw(0),
            running: false,
        }
    }

    fn half_period_ps(&self) -> u64 {
        500_000_000_000 / u64::from(self.rate.raw().max(1))
    }
}

impl Clock for SimClock {
    fn start(&mut self, rate: HertzU32) {
        log::trace!("clock: start at {} Hz", rate.raw());
        self.rate = rate;
        self.running = true;
    }

    fn stop(&mut self) {
        log::trace!("clock: stop");
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn rate(&self) -> HertzU32 {
        self.rate
    }

    fn wait_edge(&mut self, edge: Edge) {
        let half_period = self.half_period_ps();
        self.world.borrow_mut().advance_to(edge, half_period);
    }
}
