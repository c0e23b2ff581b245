//! Trace-Driven Requester.
//!
//! Stands in for the CPU: each request port replays a script of accesses,
//! one at a time, issuing the next access `issue_gap` cycles after the
//! previous one completes. Every completion is recorded with its issue and
//! completion ticks so latencies can be checked after a run.

use crate::common::{Addr, AddrRange, Packet, PacketId, ProtocolViolation, SimError, Tick};
use crate::soc::builder::SimContext;
use crate::soc::interconnect::{PortId, SendResult};
use crate::soc::traits::{Functional, LocalEvent, MemObject, RangeSource};
use crate::stats::RequesterStats;
use log::{debug, trace};
use std::collections::{HashMap, VecDeque};

/// Read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// One scripted memory access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Access {
    /// Load or store.
    pub kind: AccessKind,
    /// Target address.
    pub addr: Addr,
    /// Bytes accessed.
    pub size: usize,
    /// Store data; empty for loads.
    pub data: Vec<u8>,
}

impl Access {
    /// A load of `size` bytes.
    pub fn read(addr: Addr, size: usize) -> Self {
        Self {
            kind: AccessKind::Read,
            addr,
            size,
            data: Vec::new(),
        }
    }

    /// A store of `data`.
    pub fn write(addr: Addr, data: Vec<u8>) -> Self {
        Self {
            kind: AccessKind::Write,
            addr,
            size: data.len(),
            data,
        }
    }

    fn to_packet(&self, id: PacketId) -> Packet {
        match self.kind {
            AccessKind::Read => Packet::read(id, self.addr, self.size),
            AccessKind::Write => Packet::write(id, self.addr, self.data.clone()),
        }
    }
}

/// A finished access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Index of the port the access used.
    pub port: usize,
    /// The access as scripted.
    pub access: Access,
    /// Tick the request was sent.
    pub issued_at: Tick,
    /// Tick the response arrived.
    pub completed_at: Tick,
    /// Data returned by a load.
    pub data: Vec<u8>,
}

impl Completion {
    /// Cycles from issue to response.
    pub fn latency(&self) -> Tick {
        self.completed_at - self.issued_at
    }
}

struct InFlight {
    id: PacketId,
    access: Access,
    issued_at: Tick,
}

/// Replays access scripts on its request ports.
pub struct Requester {
    name: String,
    ports: Vec<PortId>,
    scripts: Vec<VecDeque<Access>>,
    in_flight: Vec<Option<InFlight>>,
    completions: Vec<Completion>,
    ranges: HashMap<PortId, Vec<AddrRange>>,
    issue_gap: Tick,
    response_delay: Tick,
    stats: RequesterStats,
}

impl Requester {
    /// Creates a requester; missing scripts are treated as empty.
    pub fn new(name: &str, ports: Vec<PortId>, scripts: Vec<Vec<Access>>, issue_gap: Tick) -> Self {
        let mut scripts: Vec<VecDeque<Access>> = scripts.into_iter().map(VecDeque::from).collect();
        scripts.resize_with(ports.len(), VecDeque::new);
        Self {
            name: name.to_string(),
            in_flight: ports.iter().map(|_| None).collect(),
            ports,
            scripts,
            completions: Vec::new(),
            ranges: HashMap::new(),
            issue_gap,
            response_delay: 0,
            stats: RequesterStats::default(),
        }
    }

    /// Keeps each port's response gate closed for `cycles` after every
    /// request, so that early responses must be retried.
    pub fn with_response_delay(mut self, cycles: Tick) -> Self {
        self.response_delay = cycles;
        self
    }

    /// Request ports, in script order.
    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Finished accesses in completion order.
    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    /// Issue and latency counters.
    pub fn stats(&self) -> &RequesterStats {
        &self.stats
    }

    fn port_index(&self, port: PortId) -> Option<usize> {
        self.ports.iter().position(|&p| p == port)
    }

    fn issue(&mut self, idx: usize, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        if self.in_flight[idx].is_some() {
            return Ok(());
        }
        let Some(access) = self.scripts[idx].pop_front() else {
            return Ok(());
        };

        let port = self.ports[idx];
        if let Some(ranges) = self.ranges.get(&port) {
            if !ranges.iter().any(|r| r.contains(access.addr, access.size as u64)) {
                return Err(ProtocolViolation::UnmappedAddress {
                    addr: access.addr,
                    size: access.size,
                }
                .into());
            }
        }

        let id = ctx.new_packet_id();
        let pkt = access.to_packet(id);
        self.in_flight[idx] = Some(InFlight {
            id,
            access,
            issued_at: ctx.now(),
        });
        self.stats.issued += 1;

        if self.response_delay > 0 {
            ctx.set_response_gate(port, false);
            ctx.schedule_after(self.response_delay, LocalEvent::OpenGate { port });
        }

        debug!("{} issuing {}", self.name, pkt);
        if ctx.send_request(port, pkt)? == SendResult::Busy {
            trace!("{} blocked on {}", self.name, ctx.port_name(port));
        }
        Ok(())
    }
}

impl MemObject for Requester {
    fn name(&self) -> &str {
        &self.name
    }

    fn startup(&mut self, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        for (idx, &port) in self.ports.iter().enumerate() {
            if !self.scripts[idx].is_empty() {
                ctx.schedule_after(0, LocalEvent::Issue { port });
            }
        }
        Ok(())
    }

    fn recv_timing_req(
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

    fn recv_timing_resp(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        let unexpected = || ProtocolViolation::UnexpectedResponse {
            component: self.name.clone(),
            id: pkt.id,
            addr: pkt.addr,
        };
        let idx = self.port_index(port).ok_or_else(unexpected)?;
        let matches = self.in_flight[idx].as_ref().map(|f| f.id) == Some(pkt.id);
        if !matches {
            return Err(unexpected().into());
        }
        let Some(done) = self.in_flight[idx].take() else {
            return Err(unexpected().into());
        };

        let completion = Completion {
            port: idx,
            access: done.access,
            issued_at: done.issued_at,
            completed_at: ctx.now(),
            data: pkt.data,
        };
        debug!(
            "{} completed {:#x} after {} cycles",
            self.name,
            completion.access.addr,
            completion.latency()
        );
        self.stats.completed += 1;
        self.stats.latency.sample(completion.latency());
        self.completions.push(completion);

        if !self.scripts[idx].is_empty() {
            ctx.schedule_after(self.issue_gap, LocalEvent::Issue { port });
        }
        Ok(())
    }

    fn process(&mut self, event: LocalEvent, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        match event {
            LocalEvent::Issue { port } => match self.port_index(port) {
                Some(idx) => self.issue(idx, ctx),
                None => Ok(()),
            },
            LocalEvent::OpenGate { port } => {
                ctx.set_response_gate(port, true);
                Ok(())
            }
            LocalEvent::Complete { .. } => Ok(()),
        }
    }

    fn recv_functional(&mut self, port: PortId, _pkt: &mut Packet) -> Result<Functional, SimError> {
        Err(ProtocolViolation::WrongDirection {
            port: port.to_string(),
        }
        .into())
    }

    fn addr_ranges(&self) -> RangeSource {
        RangeSource::Own(Vec::new())
    }

    fn set_reachable_ranges(&mut self, port: PortId, ranges: &[AddrRange]) {
        self.ranges.insert(port, ranges.to_vec());
    }

    fn is_done(&self) -> bool {
        self.scripts.iter().all(|s| s.is_empty()) && self.in_flight.iter().all(|f| f.is_none())
    }

    fn as_requester(&self) -> Option<&Requester> {
        Some(self)
    }
}
