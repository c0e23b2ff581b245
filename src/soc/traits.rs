//! Memory Object Traits.
//!
//! This module defines the interface every component of the hierarchy
//! implements: requesters, caches and memory endpoints. The system drives
//! components exclusively through these callbacks, each of which receives a
//! `SimContext` to read the clock, schedule its own events and talk to the
//! transport.

use super::builder::SimContext;
use super::interconnect::PortId;
use crate::cache::CacheController;
use crate::common::{AddrRange, Packet, SimError};
use crate::core::Requester;
use crate::soc::memory::MainMemory;
use crate::stats::CacheStats;

/// Index of a component in the system.
pub type ComponentId = usize;

/// Events a component schedules for itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalEvent {
    /// Servicing of the request accepted on `port` is complete.
    ///
    /// Carries the response to send, or `None` for requests that are not
    /// answered.
    Complete {
        port: PortId,
        response: Option<Packet>,
    },
    /// The requester may issue its next access on `port`.
    Issue { port: PortId },
    /// The requester reopens the response gate of `port`.
    OpenGate { port: PortId },
}

/// Result of a functional access at one component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Functional {
    /// The access was fully served here.
    Done,
    /// Continue the access on this request port.
    Forward(PortId),
}

/// Where a component's address ranges come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RangeSource {
    /// The component serves these ranges itself.
    Own(Vec<AddrRange>),
    /// The component forwards whatever is reachable through this port.
    Behind(PortId),
}

/// A component attached to the port transport.
///
/// Handlers return `Err` only for protocol violations or other fatal
/// conditions; backpressure is handled through the transport.
pub trait MemObject {
    /// Returns the instance name.
    fn name(&self) -> &str;

    /// Called once before the first event is processed.
    fn startup(&mut self, _ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        Ok(())
    }

    /// A request was accepted on response port `port`.
    fn recv_timing_req(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError>;

    /// A response arrived on request port `port`.
    fn recv_timing_resp(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError>;

    /// A request held on `port` was accepted after a retry.
    fn recv_req_sent(&mut self, _port: PortId, _ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        Ok(())
    }

    /// A response held on `port` was accepted after a retry.
    fn recv_resp_sent(
        &mut self,
        _port: PortId,
        _ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        Ok(())
    }

    /// A self-scheduled event fired.
    fn process(&mut self, event: LocalEvent, ctx: &mut SimContext<'_>) -> Result<(), SimError>;

    /// Serves a functional (untimed) access arriving on `port`.
    fn recv_functional(&mut self, port: PortId, pkt: &mut Packet) -> Result<Functional, SimError>;

    /// Address ranges served through this component's response ports.
    fn addr_ranges(&self) -> RangeSource;

    /// Receives the ranges reachable downstream of each of its request
    /// ports, once wiring is complete.
    fn set_reachable_ranges(&mut self, _port: PortId, _ranges: &[AddrRange]) {}

    /// Returns `true` once the component has no outstanding work.
    fn is_done(&self) -> bool {
        true
    }

    /// Cache statistics, if the component is a cache.
    fn cache_stats(&self) -> Option<&CacheStats> {
        None
    }

    /// Downcasts the component to a cache controller if applicable.
    fn as_cache(&self) -> Option<&CacheController> {
        None
    }

    /// Downcasts the component to a requester if applicable.
    fn as_requester(&self) -> Option<&Requester> {
        None
    }

    /// Downcasts the component to the main memory if applicable.
    fn as_memory(&self) -> Option<&MainMemory> {
        None
    }
}
