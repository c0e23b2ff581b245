//! Port Transport.
//!
//! Components never hold references to each other. Every port lives in the
//! transport's table, which records who owns it, which port it is bound to
//! and what it is currently doing. Sending a packet is a synchronous
//! handshake answered from that table:
//!
//! * A request is accepted only if the response port is idle and its owner
//!   has its input gate open. Acceptance closes the gate; the owner reopens
//!   it with `release` once it is ready for more work.
//! * A refused request is held on the sending port. The refusing port owes
//!   a retry, and on `release` the transport resends the held packet on the
//!   sender's behalf.
//! * A response is accepted only if the request port is waiting for exactly
//!   that packet id and has its response gate open. A refused response is
//!   held and resent when the gate reopens.
//!
//! Accepted packets are not handed over directly. They are queued as
//! `Delivery` records that the system turns into same-tick events, so a
//! component never runs inside another component's handler.

use super::traits::ComponentId;
use crate::common::{Addr, ConfigError, MemCmd, Packet, PacketId, ProtocolViolation, Tick};
use log::{debug, info, trace};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Handle of a port in the transport table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub usize);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// Direction of a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRole {
    /// Sends requests downstream and receives responses (master side).
    Request,
    /// Receives requests from upstream and sends responses (slave side).
    Response,
}

/// What a port is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    /// Nothing in flight.
    Idle,
    /// A request port waits for its response; a response port owes one.
    RequestOutstanding,
    /// A packet on this port was refused and is held until a retry.
    WaitingRetry,
}

/// Answer to a request send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendResult {
    /// The peer took the request.
    Accepted,
    /// The peer is occupied; the request is held and resent on retry.
    Busy,
}

/// Answer to a response send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespResult {
    /// The requester took the response.
    Accepted,
    /// The requester cannot take it yet; it is held and resent later.
    Retry,
}

/// A request accepted on a port and not yet resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    /// Packet id the eventual response must carry.
    pub id: PacketId,
    /// Request command.
    pub cmd: MemCmd,
    /// Target address.
    pub addr: Addr,
    /// Access size in bytes.
    pub size: usize,
    /// Tick the request was accepted.
    pub accepted_at: Tick,
}

/// Work the transport hands to a port owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// A request accepted on response port `port`.
    Request { port: PortId, pkt: Packet },
    /// A response accepted on request port `port`.
    Response { port: PortId, pkt: Packet },
    /// The request held on `port` was accepted on retry.
    RequestSent { port: PortId },
    /// The response held on `port` was accepted on retry.
    ResponseSent { port: PortId },
}

struct PortEntry {
    name: String,
    owner: ComponentId,
    role: PortRole,
    peer: Option<PortId>,
    state: PortState,
    pending: Option<PendingRequest>,
    held: Option<Packet>,
    owes_retry: bool,
    accepts_responses: bool,
}

/// Table of every port in the system.
#[derive(Default)]
pub struct Transport {
    ports: Vec<PortEntry>,
    closed: HashSet<ComponentId>,
    outbox: VecDeque<Delivery>,
}

impl Transport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a port owned by `owner`.
    pub fn add_port(&mut self, owner: ComponentId, name: &str, role: PortRole) -> PortId {
        let id = PortId(self.ports.len());
        self.ports.push(PortEntry {
            name: name.to_string(),
            owner,
            role,
            peer: None,
            state: PortState::Idle,
            pending: None,
            held: None,
            owes_retry: false,
            accepts_responses: true,
        });
        id
    }

    /// Binds a request port to a response port.
    pub fn connect(&mut self, master: PortId, slave: PortId) -> Result<(), ConfigError> {
        let (m, s) = (&self.ports[master.0], &self.ports[slave.0]);
        if m.role != PortRole::Request || s.role != PortRole::Response {
            return Err(ConfigError::PortRoleMismatch {
                master: m.name.clone(),
                slave: s.name.clone(),
            });
        }
        if m.peer.is_some() {
            return Err(ConfigError::PortAlreadyConnected(m.name.clone()));
        }
        if s.peer.is_some() {
            return Err(ConfigError::PortAlreadyConnected(s.name.clone()));
        }
        info!("[Transport] Connected {} -> {}", m.name, s.name);
        self.ports[master.0].peer = Some(slave);
        self.ports[slave.0].peer = Some(master);
        Ok(())
    }

    /// Number of registered ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns `true` if no ports are registered.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Full name of a port.
    pub fn name(&self, port: PortId) -> &str {
        &self.ports[port.0].name
    }

    /// Component owning a port.
    pub fn owner(&self, port: PortId) -> ComponentId {
        self.ports[port.0].owner
    }

    /// Ports owned by `owner`, in registration order.
    pub fn ports_of(&self, owner: ComponentId) -> Vec<PortId> {
        (0..self.ports.len())
            .map(PortId)
            .filter(|p| self.ports[p.0].owner == owner)
            .collect()
    }

    /// Direction of a port.
    pub fn role(&self, port: PortId) -> PortRole {
        self.ports[port.0].role
    }

    /// Current state of a port.
    pub fn state(&self, port: PortId) -> PortState {
        self.ports[port.0].state
    }

    /// Request accepted (response port) or outstanding (request port).
    pub fn pending(&self, port: PortId) -> Option<&PendingRequest> {
        self.ports[port.0].pending.as_ref()
    }

    /// Port bound to `port`.
    pub fn peer(&self, port: PortId) -> Result<PortId, ProtocolViolation> {
        self.ports[port.0]
            .peer
            .ok_or_else(|| ProtocolViolation::UnconnectedPort {
                port: self.ports[port.0].name.clone(),
            })
    }

    /// Returns `true` if the response port refused a request it must retry.
    pub fn owes_retry(&self, port: PortId) -> bool {
        self.ports[port.0].owes_retry
    }

    /// Returns `true` if `owner` currently accepts requests.
    pub fn is_gate_open(&self, owner: ComponentId) -> bool {
        !self.closed.contains(&owner)
    }

    /// Takes the oldest queued delivery.
    pub fn take_delivery(&mut self) -> Option<Delivery> {
        self.outbox.pop_front()
    }

    fn violation_port(&self, port: PortId) -> String {
        self.ports[port.0].name.clone()
    }

    /// Sends a request on request port `master`.
    ///
    /// # Returns
    ///
    /// `Accepted` if the peer took it, `Busy` if it is now held for retry.
    /// Sending on a port that already has a request in flight is a protocol
    /// violation.
    pub fn try_send(
        &mut self,
        master: PortId,
        pkt: Packet,
        now: Tick,
    ) -> Result<SendResult, ProtocolViolation> {
        if self.ports[master.0].role != PortRole::Request || !pkt.cmd.is_request() {
            return Err(ProtocolViolation::WrongDirection {
                port: self.violation_port(master),
            });
        }
        if self.ports[master.0].state != PortState::Idle {
            return Err(ProtocolViolation::PortOccupied {
                port: self.violation_port(master),
            });
        }
        let slave = self.peer(master)?;
        Ok(self.offer(master, slave, pkt, now))
    }

    fn offer(&mut self, master: PortId, slave: PortId, pkt: Packet, now: Tick) -> SendResult {
        let owner = self.ports[slave.0].owner;
        let s = &self.ports[slave.0];

        if s.state != PortState::Idle || !self.is_gate_open(owner) {
            trace!(
                "{} refused {} from {}",
                s.name,
                pkt,
                self.ports[master.0].name
            );
            self.ports[slave.0].owes_retry = true;
            let m = &mut self.ports[master.0];
            m.state = PortState::WaitingRetry;
            m.held = Some(pkt);
            return SendResult::Busy;
        }

        let pending = PendingRequest {
            id: pkt.id,
            cmd: pkt.cmd,
            addr: pkt.addr,
            size: pkt.size,
            accepted_at: now,
        };

        let m = &mut self.ports[master.0];
        m.held = None;
        if pkt.needs_response() {
            m.state = PortState::RequestOutstanding;
            m.pending = Some(pending.clone());
        } else {
            m.state = PortState::Idle;
            m.pending = None;
        }

        let s = &mut self.ports[slave.0];
        s.state = PortState::RequestOutstanding;
        s.pending = Some(pending);
        self.closed.insert(owner);

        trace!("{} accepted {}", self.ports[slave.0].name, pkt);
        self.outbox.push_back(Delivery::Request { port: slave, pkt });
        SendResult::Accepted
    }

    /// Sends the response to the request accepted on response port `slave`.
    pub fn try_send_response(
        &mut self,
        slave: PortId,
        pkt: Packet,
    ) -> Result<RespResult, ProtocolViolation> {
        if self.ports[slave.0].role != PortRole::Response || !pkt.cmd.is_response() {
            return Err(ProtocolViolation::WrongDirection {
                port: self.violation_port(slave),
            });
        }
        let master = self.peer(slave)?;

        let m = &self.ports[master.0];
        let awaited = m.state == PortState::RequestOutstanding
            && m.pending.as_ref().map(|p| p.id) == Some(pkt.id);
        if !awaited {
            return Err(ProtocolViolation::UnexpectedResponse {
                component: m.name.clone(),
                id: pkt.id,
                addr: pkt.addr,
            });
        }

        let s = &self.ports[slave.0];
        let owed = s.state == PortState::RequestOutstanding
            && s.pending.as_ref().map(|p| p.id) == Some(pkt.id);
        if !owed {
            return Err(ProtocolViolation::NoPendingRequest {
                port: s.name.clone(),
                id: pkt.id,
            });
        }

        if !self.ports[master.0].accepts_responses {
            trace!("{} deferred {}", self.ports[master.0].name, pkt);
            let s = &mut self.ports[slave.0];
            s.state = PortState::WaitingRetry;
            s.held = Some(pkt);
            return Ok(RespResult::Retry);
        }

        self.complete_response(master, slave, pkt);
        Ok(RespResult::Accepted)
    }

    fn complete_response(&mut self, master: PortId, slave: PortId, pkt: Packet) {
        let s = &mut self.ports[slave.0];
        s.state = PortState::Idle;
        s.pending = None;
        s.held = None;

        let m = &mut self.ports[master.0];
        m.state = PortState::Idle;
        m.pending = None;

        self.outbox.push_back(Delivery::Response { port: master, pkt });
    }

    /// Resolves a fire-and-forget request accepted on `slave`.
    pub fn finish_request(&mut self, slave: PortId) -> Result<(), ProtocolViolation> {
        let s = &mut self.ports[slave.0];
        let fire_and_forget = s.state == PortState::RequestOutstanding
            && s.pending.as_ref().is_some_and(|p| !p.cmd.needs_response());
        if !fire_and_forget {
            return Err(ProtocolViolation::NoPendingRequest {
                port: s.name.clone(),
                id: s.pending.as_ref().map_or(PacketId(0), |p| p.id),
            });
        }
        s.state = PortState::Idle;
        s.pending = None;
        Ok(())
    }

    /// Opens or closes the response gate of request port `master`.
    ///
    /// Opening it delivers a response the peer is holding.
    pub fn set_response_gate(&mut self, master: PortId, open: bool) {
        self.ports[master.0].accepts_responses = open;
        if !open {
            return;
        }
        let Some(slave) = self.ports[master.0].peer else {
            return;
        };
        if self.ports[slave.0].state != PortState::WaitingRetry {
            return;
        }
        if let Some(pkt) = self.ports[slave.0].held.take() {
            debug!("{} retrying {}", self.ports[slave.0].name, pkt);
            self.complete_response(master, slave, pkt);
            self.outbox
                .push_back(Delivery::ResponseSent { port: slave });
        }
    }

    /// Reopens the input gate of `owner` and retries refused requests.
    ///
    /// Response ports are served in registration order; once one retried
    /// request is accepted the gate is closed again and the remaining ports
    /// keep owing their retry.
    pub fn release(&mut self, owner: ComponentId, now: Tick) {
        self.closed.remove(&owner);

        let owed: Vec<PortId> = (0..self.ports.len())
            .map(PortId)
            .filter(|&p| {
                let e = &self.ports[p.0];
                e.owner == owner && e.role == PortRole::Response && e.owes_retry
            })
            .collect();

        for slave in owed {
            if !self.is_gate_open(owner) {
                break;
            }
            self.ports[slave.0].owes_retry = false;
            let Some(master) = self.ports[slave.0].peer else {
                continue;
            };
            if self.ports[master.0].state != PortState::WaitingRetry {
                continue;
            }
            let Some(pkt) = self.ports[master.0].held.take() else {
                continue;
            };
            debug!("{} retrying {}", self.ports[master.0].name, pkt);
            if self.offer(master, slave, pkt, now) == SendResult::Accepted {
                self.outbox
                    .push_back(Delivery::RequestSent { port: master });
            }
        }
    }
}
