//! Main Memory.
//!
//! The endpoint at the bottom of the hierarchy. It serves one address range
//! through a single response port, one request at a time, after the latency
//! its controller model reports. Contents live in a sparse map of blocks so
//! that large ranges cost nothing until touched; untouched bytes read as
//! zero.

pub mod controller;

use self::controller::MemoryController;
use crate::common::{Addr, AddrRange, MemCmd, Packet, ProtocolViolation, SimError};
use crate::soc::builder::SimContext;
use crate::soc::interconnect::{PortId, RespResult};
use crate::soc::traits::{Functional, LocalEvent, MemObject, RangeSource};
use crate::stats::MemoryStats;
use log::{debug, trace};
use std::collections::HashMap;

/// Blocking main memory endpoint.
pub struct MainMemory {
    name: String,
    range: AddrRange,
    block_size: usize,
    port: PortId,
    controller: Box<dyn MemoryController>,
    blocks: HashMap<Addr, Vec<u8>>,
    stats: MemoryStats,
}

impl MainMemory {
    /// Creates an empty memory serving `range` on `port`.
    pub fn new(
        name: &str,
        range: AddrRange,
        block_size: usize,
        port: PortId,
        controller: Box<dyn MemoryController>,
    ) -> Self {
        debug!(
            "[Memory] {} serving {} with {} timing",
            name,
            range,
            controller.kind()
        );
        Self {
            name: name.to_string(),
            range,
            block_size,
            port,
            controller,
            blocks: HashMap::new(),
            stats: MemoryStats::default(),
        }
    }

    /// The served address range.
    pub fn range(&self) -> AddrRange {
        self.range
    }

    /// The response port.
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Access counters.
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    fn check(&self, addr: Addr, size: usize) -> Result<(), ProtocolViolation> {
        if self.range.contains(addr, size as u64) {
            Ok(())
        } else {
            Err(ProtocolViolation::UnmappedAddress { addr, size })
        }
    }

    /// Copies bytes starting at `addr` into `buf`.
    pub fn read_bytes(&self, addr: Addr, buf: &mut [u8]) {
        let bs = self.block_size as u64;
        for (i, byte) in buf.iter_mut().enumerate() {
            let a = addr + i as u64;
            *byte = self
                .blocks
                .get(&(a & !(bs - 1)))
                .map_or(0, |block| block[(a & (bs - 1)) as usize]);
        }
    }

    /// Stores `data` starting at `addr`.
    pub fn write_bytes(&mut self, addr: Addr, data: &[u8]) {
        let bs = self.block_size as u64;
        for (i, byte) in data.iter().enumerate() {
            let a = addr + i as u64;
            let block = self
                .blocks
                .entry(a & !(bs - 1))
                .or_insert_with(|| vec![0; self.block_size]);
            block[(a & (bs - 1)) as usize] = *byte;
        }
    }

    /// Reads `size` bytes at `addr` without timing.
    pub fn peek(&self, addr: Addr, size: usize) -> Vec<u8> {
        let mut buf = vec![0; size];
        self.read_bytes(addr, &mut buf);
        buf
    }

    fn apply(&mut self, pkt: &mut Packet) {
        match pkt.cmd {
            MemCmd::ReadReq => {
                let mut data = vec![0; pkt.size];
                self.read_bytes(pkt.addr, &mut data);
                pkt.data = data;
                self.stats.reads += 1;
                self.stats.bytes_read += pkt.size as u64;
            }
            MemCmd::WriteReq | MemCmd::WritebackDirty => {
                self.write_bytes(pkt.addr, &pkt.data[..pkt.size]);
                if pkt.cmd == MemCmd::WriteReq {
                    self.stats.writes += 1;
                } else {
                    self.stats.writebacks += 1;
                }
                self.stats.bytes_written += pkt.size as u64;
            }
            MemCmd::ReadResp | MemCmd::WriteResp => {}
        }
    }
}

impl MemObject for MainMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn recv_timing_req(
        &mut self,
        port: PortId,
        mut pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        self.check(pkt.addr, pkt.size)?;
        let latency = self.controller.access_latency(pkt.addr);
        self.apply(&mut pkt);
        trace!("{} servicing {} in {} cycles", self.name, pkt, latency);

        let response = if pkt.needs_response() {
            pkt.make_response();
            Some(pkt)
        } else {
            None
        };
        ctx.schedule_after(latency, LocalEvent::Complete { port, response });
        Ok(())
    }

    fn recv_timing_resp(
        &mut self,
        port: PortId,
        _pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        Err(ProtocolViolation::WrongDirection {
            port: ctx.port_name(port).to_string(),
        }
        .into())
    }

    fn recv_resp_sent(&mut self, _port: PortId, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        ctx.release();
        Ok(())
    }

    fn process(&mut self, event: LocalEvent, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        if let LocalEvent::Complete { port, response } = event {
            match response {
                Some(resp) => {
                    if ctx.send_response(port, resp)? == RespResult::Accepted {
                        ctx.release();
                    }
                }
                None => {
                    ctx.finish_request(port)?;
                    ctx.release();
                }
            }
        }
        Ok(())
    }

    fn recv_functional(&mut self, _port: PortId, pkt: &mut Packet) -> Result<Functional, SimError> {
        self.check(pkt.addr, pkt.size)?;
        if pkt.cmd.is_read() {
            let mut data = vec![0; pkt.size];
            self.read_bytes(pkt.addr, &mut data);
            pkt.data = data;
        } else {
            self.write_bytes(pkt.addr, &pkt.data[..pkt.size]);
        }
        Ok(Functional::Done)
    }

    fn addr_ranges(&self) -> RangeSource {
        RangeSource::Own(vec![self.range])
    }

    fn as_memory(&self) -> Option<&MainMemory> {
        Some(self)
    }
}
