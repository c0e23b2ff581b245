//! System Builder and Event Dispatch.
//!
//! This module defines the `System` structure, which owns every component,
//! the port transport and the event queue. It wires a hierarchy from the
//! configuration, runs the event loop and collects statistics.
//!
//! Components are stored as trait objects indexed by `ComponentId`. When an
//! event fires, the system lends the target component a `SimContext` built
//! from disjoint borrows of the queue and the transport; all cross-component
//! effects go back through the transport and come out as new events.

use super::interconnect::{
    Delivery, PendingRequest, PortId, PortRole, PortState, RespResult, SendResult, Transport,
};
use super::memory::controller::{self, MemoryController};
use super::memory::MainMemory;
use super::traits::{ComponentId, Functional, LocalEvent, MemObject, RangeSource};
use crate::cache::CacheController;
use crate::common::{AddrRange, ConfigError, Packet, PacketId, ProtocolViolation, SimError, Tick};
use crate::config::{CacheParams, Config};
use crate::core::{Access, Requester};
use crate::sim::EventQueue;
use crate::stats::SimStats;
use log::{debug, info, warn};
use std::fmt;

/// Entries of the global event queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Hand a transport delivery to the owner of its port.
    Deliver(Delivery),
    /// A component's self-scheduled event.
    Local {
        target: ComponentId,
        event: LocalEvent,
    },
}

/// Per-callback view of the simulator lent to a component.
pub struct SimContext<'a> {
    id: ComponentId,
    queue: &'a mut EventQueue<Event>,
    transport: &'a mut Transport,
    next_packet_id: &'a mut u64,
}

impl<'a> SimContext<'a> {
    /// Current simulated tick.
    pub fn now(&self) -> Tick {
        self.queue.now()
    }

    /// Id of the component holding this context.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Schedules `event` for this component `cycles` ticks from now.
    pub fn schedule_after(&mut self, cycles: Tick, event: LocalEvent) {
        self.queue.schedule_after(
            cycles,
            Event::Local {
                target: self.id,
                event,
            },
        );
    }

    /// Allocates a fresh packet id.
    pub fn new_packet_id(&mut self) -> PacketId {
        *self.next_packet_id += 1;
        PacketId(*self.next_packet_id)
    }

    /// Sends a request on request port `port`.
    pub fn send_request(&mut self, port: PortId, pkt: Packet) -> Result<SendResult, SimError> {
        let now = self.now();
        let result = self.transport.try_send(port, pkt, now)?;
        self.flush();
        Ok(result)
    }

    /// Sends the response for the request pending on response port `port`.
    pub fn send_response(&mut self, port: PortId, pkt: Packet) -> Result<RespResult, SimError> {
        let result = self.transport.try_send_response(port, pkt)?;
        self.flush();
        Ok(result)
    }

    /// Resolves a request on `port` that is not answered.
    pub fn finish_request(&mut self, port: PortId) -> Result<(), SimError> {
        self.transport.finish_request(port)?;
        Ok(())
    }

    /// Reopens this component's input gate, letting refused senders retry.
    pub fn release(&mut self) {
        let now = self.now();
        self.transport.release(self.id, now);
        self.flush();
    }

    /// Opens or closes the response gate of request port `port`.
    pub fn set_response_gate(&mut self, port: PortId, open: bool) {
        self.transport.set_response_gate(port, open);
        self.flush();
    }

    /// State of a port.
    pub fn port_state(&self, port: PortId) -> PortState {
        self.transport.state(port)
    }

    /// Name of a port.
    pub fn port_name(&self, port: PortId) -> &str {
        self.transport.name(port)
    }

    /// Request pending on a port.
    pub fn pending(&self, port: PortId) -> Option<&PendingRequest> {
        self.transport.pending(port)
    }

    fn flush(&mut self) {
        while let Some(delivery) = self.transport.take_delivery() {
            self.queue.schedule_after(0, Event::Deliver(delivery));
        }
    }
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCause {
    /// Every component finished its work.
    WorkloadComplete,
    /// The tick limit was reached with events still pending.
    TickLimit,
    /// No events are left but some component is still waiting.
    Stalled,
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitCause::WorkloadComplete => "workload complete",
            ExitCause::TickLimit => "simulate() limit reached",
            ExitCause::Stalled => "no events left with work outstanding",
        };
        f.write_str(text)
    }
}

/// Outcome of `System::run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Tick the run stopped at.
    pub tick: Tick,
    /// Why it stopped.
    pub cause: ExitCause,
}

/// Ports of a cache added with `System::add_cache`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePorts {
    /// The cache's component id.
    pub id: ComponentId,
    /// Upstream response ports.
    pub cpu_side: Vec<PortId>,
    /// Downstream request port.
    pub mem_side: PortId,
}

/// Simulated system: components, transport and clock.
#[derive(Default)]
pub struct System {
    components: Vec<Box<dyn MemObject>>,
    transport: Transport,
    queue: EventQueue<Event>,
    next_packet_id: u64,
    started: bool,
    requester: Option<ComponentId>,
    requester_ports: Vec<PortId>,
}

impl System {
    /// Creates an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the hierarchy described by `config`.
    ///
    /// The requester drives one script per CPU port through the L1, the
    /// optional L2 and main memory.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated against every construction rule here.
    /// * `workload` - Per-port access scripts.
    pub fn from_config(config: &Config, workload: Vec<Vec<Access>>) -> Result<Self, SimError> {
        let mut sys = System::new();
        let cpu_ports = config.system.cpu_ports;
        if cpu_ports == 0 {
            return Err(ConfigError::NoPorts("cpu".to_string()).into());
        }
        if workload.len() > cpu_ports {
            return Err(ConfigError::UnsupportedTopology(format!(
                "workload uses {} ports but the requester has {}",
                workload.len(),
                cpu_ports
            ))
            .into());
        }

        let range = config.memory.range()?;
        config.memory.validate_latency()?;

        let (_, mut upstream) = sys.add_requester("cpu", cpu_ports, workload, config.general.issue_gap);

        if config.l1.enabled {
            let params = CacheParams::new("l1", &config.l1, &config.system, upstream.len())?;
            let l1 = sys.add_cache(params);
            for (master, slave) in upstream.iter().zip(&l1.cpu_side) {
                sys.connect(*master, *slave)?;
            }
            upstream = vec![l1.mem_side];
        }

        if config.l2.enabled {
            if upstream.len() != 1 {
                return Err(ConfigError::UnsupportedTopology(
                    "several CPU ports need an L1 in front of the L2".to_string(),
                )
                .into());
            }
            let params = CacheParams::new("l2", &config.l2, &config.system, 1)?;
            let l2 = sys.add_cache(params);
            sys.connect(upstream[0], l2.cpu_side[0])?;
            upstream = vec![l2.mem_side];
        }

        if upstream.len() != 1 {
            return Err(ConfigError::UnsupportedTopology(
                "several CPU ports need a cache in front of memory".to_string(),
            )
            .into());
        }

        let (_, mem_port) = sys.add_memory(
            "memory",
            range,
            config.system.block_size,
            controller::build(&config.memory),
        );
        sys.connect(upstream[0], mem_port)?;

        Ok(sys)
    }

    /// Id the next added component will receive.
    pub fn next_component_id(&self) -> ComponentId {
        self.components.len()
    }

    /// Registers a port for a component that is about to be added.
    pub fn add_port(&mut self, owner: ComponentId, name: &str, role: PortRole) -> PortId {
        self.transport.add_port(owner, name, role)
    }

    /// Adds a component whose ports were registered under
    /// `next_component_id()`.
    pub fn add_component(&mut self, component: Box<dyn MemObject>) -> ComponentId {
        let id = self.components.len();
        info!("[System] Registered component: {:<8} (id {})", component.name(), id);
        self.components.push(component);
        id
    }

    /// Binds request port `master` to response port `slave`.
    pub fn connect(&mut self, master: PortId, slave: PortId) -> Result<(), ConfigError> {
        self.transport.connect(master, slave)
    }

    /// Adds a cache controller with `params.cpu_ports` upstream ports.
    pub fn add_cache(&mut self, params: CacheParams) -> CachePorts {
        let id = self.next_component_id();
        let cpu_side: Vec<PortId> = (0..params.cpu_ports)
            .map(|i| {
                let name = format!("{}.cpu_side[{}]", params.name, i);
                self.add_port(id, &name, PortRole::Response)
            })
            .collect();
        let mem_side = self.add_port(id, &format!("{}.mem_side", params.name), PortRole::Request);
        let cache = CacheController::new(params, cpu_side.clone(), mem_side);
        self.add_component(Box::new(cache));
        CachePorts {
            id,
            cpu_side,
            mem_side,
        }
    }

    /// Adds a main memory serving `range`.
    pub fn add_memory(
        &mut self,
        name: &str,
        range: AddrRange,
        block_size: usize,
        controller: Box<dyn MemoryController>,
    ) -> (ComponentId, PortId) {
        let id = self.next_component_id();
        let port = self.add_port(id, &format!("{}.port", name), PortRole::Response);
        let memory = MainMemory::new(name, range, block_size, port, controller);
        self.add_component(Box::new(memory));
        (id, port)
    }

    /// Adds a requester with `ports` request ports and their scripts.
    pub fn add_requester(
        &mut self,
        name: &str,
        ports: usize,
        scripts: Vec<Vec<Access>>,
        issue_gap: Tick,
    ) -> (ComponentId, Vec<PortId>) {
        let id = self.next_component_id();
        let port_ids: Vec<PortId> = (0..ports)
            .map(|i| self.add_port(id, &format!("{}.port[{}]", name, i), PortRole::Request))
            .collect();
        let requester = Requester::new(name, port_ids.clone(), scripts, issue_gap);
        self.add_component(Box::new(requester));
        if self.requester.is_none() {
            self.requester = Some(id);
            self.requester_ports = port_ids.clone();
        }
        (id, port_ids)
    }

    /// Current simulated tick.
    pub fn now(&self) -> Tick {
        self.queue.now()
    }

    /// The port transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Mutable access to the transport, for driving ports by hand.
    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// A component by id.
    pub fn component(&self, id: ComponentId) -> &dyn MemObject {
        self.components[id].as_ref()
    }

    /// Finds a component by name.
    pub fn find(&self, name: &str) -> Option<&dyn MemObject> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// The cache called `name`.
    pub fn cache(&self, name: &str) -> Option<&CacheController> {
        self.find(name).and_then(|c| c.as_cache())
    }

    /// The first requester added.
    pub fn requester(&self) -> Option<&Requester> {
        self.requester
            .and_then(|id| self.components[id].as_requester())
    }

    /// The main memory called `name`.
    pub fn memory(&self, name: &str) -> Option<&MainMemory> {
        self.find(name).and_then(|c| c.as_memory())
    }

    fn with_component<R>(
        &mut self,
        id: ComponentId,
        f: impl FnOnce(&mut dyn MemObject, &mut SimContext<'_>) -> R,
    ) -> R {
        let System {
            components,
            transport,
            queue,
            next_packet_id,
            ..
        } = self;
        let mut ctx = SimContext {
            id,
            queue,
            transport,
            next_packet_id,
        };
        f(components[id].as_mut(), &mut ctx)
    }

    /// Address ranges reachable through request port `master`.
    pub fn ranges_behind(&self, master: PortId) -> Result<Vec<AddrRange>, SimError> {
        let mut port = master;
        for _ in 0..=self.components.len() {
            let slave = self.transport.peer(port)?;
            match self.components[self.transport.owner(slave)].addr_ranges() {
                RangeSource::Own(ranges) => return Ok(ranges),
                RangeSource::Behind(next) => port = next,
            }
        }
        Err(ProtocolViolation::UnconnectedPort {
            port: self.transport.name(master).to_string(),
        }
        .into())
    }

    fn start(&mut self) -> Result<(), SimError> {
        for id in 0..self.components.len() {
            for port in self.transport.ports_of(id) {
                if self.transport.role(port) != PortRole::Request {
                    continue;
                }
                let ranges = self.ranges_behind(port)?;
                self.components[id].set_reachable_ranges(port, &ranges);
            }
        }
        for id in 0..self.components.len() {
            self.with_component(id, |c, ctx| c.startup(ctx))?;
        }
        self.started = true;
        Ok(())
    }

    /// Runs until the workload completes, the queue drains or the next event
    /// lies beyond `max_ticks`.
    pub fn run(&mut self, max_ticks: Option<Tick>) -> Result<RunSummary, SimError> {
        if !self.started {
            self.start()?;
        }

        while let Some(tick) = self.queue.peek_tick() {
            if let Some(limit) = max_ticks {
                if tick > limit {
                    return Ok(RunSummary {
                        tick: limit,
                        cause: ExitCause::TickLimit,
                    });
                }
            }
            let Some(fired) = self.queue.pop() else {
                break;
            };
            self.dispatch(fired.event)?;
        }

        let cause = if self.components.iter().all(|c| c.is_done()) {
            ExitCause::WorkloadComplete
        } else {
            for c in self.components.iter().filter(|c| !c.is_done()) {
                warn!("[System] {} still busy with no events left", c.name());
            }
            ExitCause::Stalled
        };
        Ok(RunSummary {
            tick: self.queue.now(),
            cause,
        })
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        match event {
            Event::Deliver(Delivery::Request { port, pkt }) => {
                let owner = self.transport.owner(port);
                debug!("{} <- {}", self.transport.name(port), pkt);
                self.with_component(owner, |c, ctx| c.recv_timing_req(port, pkt, ctx))
            }
            Event::Deliver(Delivery::Response { port, pkt }) => {
                let owner = self.transport.owner(port);
                debug!("{} <- {}", self.transport.name(port), pkt);
                self.with_component(owner, |c, ctx| c.recv_timing_resp(port, pkt, ctx))
            }
            Event::Deliver(Delivery::RequestSent { port }) => {
                let owner = self.transport.owner(port);
                self.with_component(owner, |c, ctx| c.recv_req_sent(port, ctx))
            }
            Event::Deliver(Delivery::ResponseSent { port }) => {
                let owner = self.transport.owner(port);
                self.with_component(owner, |c, ctx| c.recv_resp_sent(port, ctx))
            }
            Event::Local { target, event } => {
                self.with_component(target, |c, ctx| c.process(event, ctx))
            }
        }
    }

    /// Performs an untimed access through request port `master`.
    ///
    /// Reads return the most recent value anywhere in the hierarchy; writes
    /// update every copy on the way down to memory.
    pub fn functional_access(&mut self, master: PortId, pkt: &mut Packet) -> Result<(), SimError> {
        let mut port = master;
        for _ in 0..=self.components.len() {
            let slave = self.transport.peer(port)?;
            let owner = self.transport.owner(slave);
            match self.components[owner].recv_functional(slave, pkt)? {
                Functional::Done => return Ok(()),
                Functional::Forward(next) => port = next,
            }
        }
        Err(ProtocolViolation::UnmappedAddress {
            addr: pkt.addr,
            size: pkt.size,
        }
        .into())
    }

    /// Functional read through the requester's first port.
    pub fn functional_read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>, SimError> {
        let port = self.first_requester_port()?;
        let mut pkt = Packet::read(PacketId(0), addr, size);
        self.functional_access(port, &mut pkt)?;
        Ok(pkt.data)
    }

    /// Functional write through the requester's first port.
    pub fn functional_write(&mut self, addr: u64, data: &[u8]) -> Result<(), SimError> {
        let port = self.first_requester_port()?;
        let mut pkt = Packet::write(PacketId(0), addr, data.to_vec());
        self.functional_access(port, &mut pkt)
    }

    fn first_requester_port(&self) -> Result<PortId, SimError> {
        self.requester_ports
            .first()
            .copied()
            .ok_or_else(|| ConfigError::NoPorts("cpu".to_string()).into())
    }

    /// Collects the statistics of every component.
    pub fn stats(&self) -> SimStats {
        let mut stats = SimStats::default();
        stats.ticks = self.queue.now();
        for component in &self.components {
            if let Some(cache) = component.cache_stats() {
                stats.caches.push(cache.clone());
            }
            if let Some(memory) = component.as_memory() {
                stats.memory = memory.stats().clone();
            }
            if let Some(requester) = component.as_requester() {
                stats.requester = requester.stats().clone();
            }
        }
        stats
    }

    /// Drops pending events and returns the final statistics.
    pub fn finish(mut self) -> SimStats {
        self.queue.clear();
        self.stats()
    }
}
