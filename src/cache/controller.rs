//! Blocking Cache Controller.
//!
//! The controller serves one request at a time. While it is busy its input
//! gate stays closed, so the transport refuses further requests and replays
//! them once the controller releases.
//!
//! The state machine:
//!
//! 1. **Idle:** A request arrives on a CPU-side port and is looked up at
//!    once.
//! 2. **Hit:** The access is applied to the line and the response leaves
//!    `latency` cycles later (`RespondingToCpu`).
//! 3. **Miss:** A block-sized fill is sent on the memory-side port
//!    (`WaitingOnFill`). When it returns the block is installed, a dirty
//!    victim is written back, and the response leaves `latency` cycles
//!    later.
//! 4. **Release:** Once the response is accepted and no write-back is left
//!    waiting on the memory-side port, the controller goes back to idle and
//!    reopens its gate.
//!
//! Write-backs arriving from an upper level are absorbed into the store and
//! keep the controller occupied for `latency` cycles without a response.

use super::store::{BlockStore, EvictedLine};
use crate::common::{MemCmd, Packet, PacketId, ProtocolViolation, SimError, Tick};
use crate::config::CacheParams;
use crate::soc::builder::SimContext;
use crate::soc::interconnect::{PortId, PortState, RespResult};
use crate::soc::traits::{Functional, LocalEvent, MemObject, RangeSource};
use crate::stats::CacheStats;
use log::{debug, trace};

/// Position of the controller in its request cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// Ready for a request.
    Idle,
    /// A request is being looked up.
    LookupInProgress,
    /// A miss is waiting for the next level.
    WaitingOnFill {
        /// CPU-side port the request came in on.
        port: PortId,
        /// The original request, when the downstream packet is a fill.
        request: Option<Packet>,
        /// Id of the downstream packet.
        outstanding: PacketId,
        /// Tick the miss was detected.
        since: Tick,
    },
    /// The outcome is known and the request is being completed.
    RespondingToCpu {
        /// CPU-side port the request came in on.
        port: PortId,
    },
}

/// A blocking cache with Bunker indexing.
pub struct CacheController {
    params: CacheParams,
    store: BlockStore,
    cpu_side: Vec<PortId>,
    mem_side: PortId,
    state: ControllerState,
    release_pending: bool,
    stats: CacheStats,
}

impl CacheController {
    /// Creates an empty cache attached to the given ports.
    ///
    /// # Arguments
    ///
    /// * `params` - Validated geometry, latency and policy.
    /// * `cpu_side` - Upstream response ports.
    /// * `mem_side` - Downstream request port.
    pub fn new(params: CacheParams, cpu_side: Vec<PortId>, mem_side: PortId) -> Self {
        debug!(
            "[Cache] {}: {} bytes, {} indices x {} slots, stride {}, latency {}",
            params.name,
            params.size(),
            params.indexer.indices(),
            params.indexer.radix(),
            params.indexer.stride(),
            params.latency
        );
        Self {
            store: BlockStore::new(params.indexer, params.policy, params.seed),
            stats: CacheStats::new(&params.name),
            params,
            cpu_side,
            mem_side,
            state: ControllerState::Idle,
            release_pending: false,
        }
    }

    /// Construction parameters.
    pub fn params(&self) -> &CacheParams {
        &self.params
    }

    /// Line storage.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Current state.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Upstream response ports.
    pub fn cpu_side(&self) -> &[PortId] {
        &self.cpu_side
    }

    /// Downstream request port.
    pub fn mem_side(&self) -> PortId {
        self.mem_side
    }

    /// Hit, miss and write-back counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn block_size(&self) -> usize {
        self.params.block_size()
    }

    /// Applies a demand access to its resident line.
    fn satisfy(&mut self, pkt: &mut Packet) {
        match pkt.cmd {
            MemCmd::ReadReq => {
                let mut data = vec![0; pkt.size];
                self.store.read(pkt.addr, &mut data);
                pkt.data = data;
            }
            MemCmd::WriteReq => {
                self.store.write(pkt.addr, &pkt.data[..pkt.size]);
            }
            _ => {}
        }
    }

    fn respond_after_latency(&mut self, port: PortId, mut pkt: Packet, ctx: &mut SimContext<'_>) {
        pkt.make_response();
        self.state = ControllerState::RespondingToCpu { port };
        ctx.schedule_after(
            self.params.latency,
            LocalEvent::Complete {
                port,
                response: Some(pkt),
            },
        );
    }

    fn handle_victim(
        &mut self,
        victim: Option<EvictedLine>,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        let Some(victim) = victim else {
            return Ok(());
        };
        self.stats.evictions += 1;
        if !victim.dirty {
            trace!("{} dropping clean {:#x}", self.params.name, victim.addr);
            return Ok(());
        }
        self.stats.writebacks += 1;
        let wb = Packet::writeback(ctx.new_packet_id(), victim.addr, victim.data);
        debug!("{} writing back {}", self.params.name, wb);
        ctx.send_request(self.mem_side, wb)?;
        Ok(())
    }

    fn handle_access(
        &mut self,
        port: PortId,
        mut pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        if self.store.lookup(pkt.addr).is_hit() {
            self.stats.hits += 1;
            debug!("{} hit {}", self.params.name, pkt);
            self.satisfy(&mut pkt);
            self.respond_after_latency(port, pkt, ctx);
            return Ok(());
        }

        self.stats.misses += 1;
        let since = ctx.now();

        if pkt.cmd == MemCmd::WriteReq && !self.params.write_allocate {
            debug!("{} write miss, forwarding {}", self.params.name, pkt);
            self.state = ControllerState::WaitingOnFill {
                port,
                request: None,
                outstanding: pkt.id,
                since,
            };
            ctx.send_request(self.mem_side, pkt)?;
            return Ok(());
        }

        let bs = self.block_size();
        let fill = Packet::read(ctx.new_packet_id(), pkt.block_addr(bs), bs);
        debug!("{} miss {}, fetching {}", self.params.name, pkt, fill);
        self.state = ControllerState::WaitingOnFill {
            port,
            request: Some(pkt),
            outstanding: fill.id,
            since,
        };
        ctx.send_request(self.mem_side, fill)?;
        Ok(())
    }

    fn handle_writeback(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        self.stats.writebacks_received += 1;
        let bs = self.block_size();

        if self.store.probe(pkt.addr) {
            trace!("{} absorbing {}", self.params.name, pkt);
            self.store.write(pkt.addr, &pkt.data[..pkt.size]);
        } else if pkt.is_whole_block(bs) {
            trace!("{} installing {}", self.params.name, pkt);
            let victim = self.store.install(pkt.addr, pkt.data, true);
            self.handle_victim(victim, ctx)?;
        } else {
            trace!("{} passing on partial {}", self.params.name, pkt);
            ctx.send_request(self.mem_side, pkt)?;
        }

        self.state = ControllerState::RespondingToCpu { port };
        ctx.schedule_after(
            self.params.latency,
            LocalEvent::Complete {
                port,
                response: None,
            },
        );
        Ok(())
    }

    /// Goes idle and reopens the gate unless a write-back still occupies
    /// the memory-side port.
    fn try_release(&mut self, ctx: &mut SimContext<'_>) {
        if ctx.port_state(self.mem_side) == PortState::Idle {
            self.release_pending = false;
            self.state = ControllerState::Idle;
            ctx.release();
        } else {
            self.release_pending = true;
        }
    }

    fn port_name(&self, port: PortId, ctx: &SimContext<'_>) -> String {
        ctx.port_name(port).to_string()
    }
}

impl MemObject for CacheController {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn recv_timing_req(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        if self.state != ControllerState::Idle {
            return Err(ProtocolViolation::PortOccupied {
                port: self.port_name(port, ctx),
            }
            .into());
        }
        let bs = self.block_size();
        if !pkt.fits_in_block(bs) {
            return Err(ProtocolViolation::SpansBlocks {
                addr: pkt.addr,
                size: pkt.size,
                block_size: bs,
            }
            .into());
        }

        self.state = ControllerState::LookupInProgress;
        match pkt.cmd {
            MemCmd::ReadReq | MemCmd::WriteReq => self.handle_access(port, pkt, ctx),
            MemCmd::WritebackDirty => self.handle_writeback(port, pkt, ctx),
            MemCmd::ReadResp | MemCmd::WriteResp => Err(ProtocolViolation::WrongDirection {
                port: self.port_name(port, ctx),
            }
            .into()),
        }
    }

    fn recv_timing_resp(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        let state = std::mem::replace(&mut self.state, ControllerState::LookupInProgress);
        match state {
            ControllerState::WaitingOnFill {
                port: cpu_port,
                request,
                outstanding,
                since,
            } if port == self.mem_side && pkt.id == outstanding => {
                self.stats.miss_latency.sample(ctx.now() - since);
                match request {
                    Some(mut req) => {
                        debug!("{} filled {:#x}", self.params.name, pkt.addr);
                        let victim = self.store.install(pkt.addr, pkt.data, false);
                        self.handle_victim(victim, ctx)?;
                        self.satisfy(&mut req);
                        self.respond_after_latency(cpu_port, req, ctx);
                    }
                    None => self.respond_after_latency(cpu_port, pkt, ctx),
                }
                Ok(())
            }
            other => {
                self.state = other;
                Err(ProtocolViolation::UnexpectedResponse {
                    component: self.params.name.clone(),
                    id: pkt.id,
                    addr: pkt.addr,
                }
                .into())
            }
        }
    }

    fn recv_req_sent(&mut self, port: PortId, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        trace!("{} retry accepted on {}", self.params.name, ctx.port_name(port));
        if port == self.mem_side && self.release_pending {
            self.try_release(ctx);
        }
        Ok(())
    }

    fn recv_resp_sent(&mut self, _port: PortId, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        self.try_release(ctx);
        Ok(())
    }

    fn process(&mut self, event: LocalEvent, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        let LocalEvent::Complete { port, response } = event else {
            return Ok(());
        };
        match response {
            Some(resp) => {
                if ctx.send_response(port, resp)? == RespResult::Accepted {
                    self.try_release(ctx);
                } else {
                    trace!("{} response deferred on {}", self.params.name, ctx.port_name(port));
                }
            }
            None => {
                ctx.finish_request(port)?;
                self.try_release(ctx);
            }
        }
        Ok(())
    }

    fn recv_functional(&mut self, port: PortId, pkt: &mut Packet) -> Result<Functional, SimError> {
        if port == self.mem_side {
            return Err(ProtocolViolation::WrongDirection {
                port: format!("{}.mem_side", self.params.name),
            }
            .into());
        }
        let bs = self.block_size();
        if !pkt.fits_in_block(bs) {
            return Err(ProtocolViolation::SpansBlocks {
                addr: pkt.addr,
                size: pkt.size,
                block_size: bs,
            }
            .into());
        }

        if pkt.cmd.is_read() {
            let mut data = vec![0; pkt.size];
            if self.store.read(pkt.addr, &mut data) {
                pkt.data = data;
                return Ok(Functional::Done);
            }
        } else {
            self.store.patch(pkt.addr, &pkt.data[..pkt.size]);
        }
        Ok(Functional::Forward(self.mem_side))
    }

    fn addr_ranges(&self) -> RangeSource {
        RangeSource::Behind(self.mem_side)
    }

    fn is_done(&self) -> bool {
        self.state == ControllerState::Idle
    }

    fn cache_stats(&self) -> Option<&CacheStats> {
        Some(&self.stats)
    }

    fn as_cache(&self) -> Option<&CacheController> {
        Some(self)
    }
}
