//! Memory Latency Models.
//!
//! The main memory asks its controller how long each access takes. Two
//! models are provided: a fixed latency, and a DRAM model with a single open
//! row that makes row-buffer hits cheaper than misses.

use crate::common::{Addr, Tick};
use crate::config::{MemoryConfig, MemoryController as ControllerKind};

/// Bytes covered by one DRAM row.
const ROW_BYTES: u64 = 2048;

/// Latency model for main memory accesses.
pub trait MemoryController {
    /// Returns the latency of an access to `addr` and updates model state.
    ///
    /// # Arguments
    ///
    /// * `addr` - The physical address being accessed.
    ///
    /// # Returns
    ///
    /// The latency in cycles, never zero.
    fn access_latency(&mut self, addr: Addr) -> Tick;

    /// Short model name for reports.
    fn kind(&self) -> &'static str;
}

/// Instantiates the configured latency model.
pub fn build(config: &MemoryConfig) -> Box<dyn MemoryController> {
    match config.controller {
        ControllerKind::Simple => Box::new(SimpleController::new(config.row_miss_latency)),
        ControllerKind::Dram => Box::new(DramController::new(
            config.t_cas,
            config.t_ras,
            config.t_pre,
        )),
    }
}

/// Every access takes the same number of cycles.
pub struct SimpleController {
    latency: Tick,
}

impl SimpleController {
    /// Creates a fixed-latency model.
    pub fn new(latency: Tick) -> Self {
        Self {
            latency: latency.max(1),
        }
    }
}

impl MemoryController for SimpleController {
    fn access_latency(&mut self, _addr: Addr) -> Tick {
        self.latency
    }

    fn kind(&self) -> &'static str {
        "Simple"
    }
}

/// DRAM timing with one open row.
///
/// * **Row hit:** `t_cas`.
/// * **Row conflict:** `t_pre + t_ras + t_cas`.
/// * **No open row:** `t_ras + t_cas`.
pub struct DramController {
    open_row: Option<u64>,
    t_cas: Tick,
    t_ras: Tick,
    t_pre: Tick,
}

impl DramController {
    /// Creates a DRAM model with every row closed.
    pub fn new(t_cas: Tick, t_ras: Tick, t_pre: Tick) -> Self {
        Self {
            open_row: None,
            t_cas: t_cas.max(1),
            t_ras,
            t_pre,
        }
    }
}

impl MemoryController for DramController {
    fn access_latency(&mut self, addr: Addr) -> Tick {
        let row = addr / ROW_BYTES;
        let latency = match self.open_row {
            Some(open) if open == row => self.t_cas,
            Some(_) => self.t_pre + self.t_ras + self.t_cas,
            None => self.t_ras + self.t_cas,
        };
        self.open_row = Some(row);
        latency
    }

    fn kind(&self) -> &'static str {
        "Dram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dram_rewards_row_locality() {
        let mut dram = DramController::new(14, 14, 14);
        assert_eq!(dram.access_latency(0x0), 28);
        assert_eq!(dram.access_latency(0x40), 14);
        assert_eq!(dram.access_latency(0x1000), 42);
    }
}
