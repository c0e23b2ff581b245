//! End-to-end tests of the requester, L1, L2 and memory hierarchy.

use bunker_cache::common::{
    AddrRange, ConfigError, Packet, PacketId, ProtocolViolation, SimError,
};
use bunker_cache::config::{CacheConfig, CacheParams, Config, MemSize, MemoryController};
use bunker_cache::core::{Access, AccessKind, Completion, Requester};
use bunker_cache::soc::memory::controller::SimpleController;
use bunker_cache::soc::{
    ExitCause, Functional, LocalEvent, MemObject, PortId, PortRole, RangeSource, SimContext, System,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::HashMap;

const KB: u64 = 1024;
const L1_LAT: u64 = 1;
const L2_LAT: u64 = 3;
const MEM_LAT: u64 = 100;

const A: u64 = 0x1000;
/// Maps to the same L1 index as `A` but a different L2 index.
const A_ALIAS: u64 = A + 128 * KB;

/// Creates the reference hierarchy: 128kB L1, optional 1024kB L2.
fn config(with_l2: bool) -> Config {
    let mut config = Config::default();
    config.l1 = CacheConfig {
        size: MemSize(128 * KB),
        latency: L1_LAT,
        ..CacheConfig::default()
    };
    config.l2 = CacheConfig {
        enabled: with_l2,
        size: MemSize(1024 * KB),
        latency: L2_LAT,
        ..CacheConfig::default()
    };
    config.memory.row_miss_latency = MEM_LAT;
    config
}

/// Builds and runs a single-port system to completion.
fn run(config: &Config, script: Vec<Access>) -> System {
    let mut sys = System::from_config(config, vec![script]).unwrap();
    let summary = sys.run(None).unwrap();
    assert_eq!(summary.cause, ExitCause::WorkloadComplete);
    sys
}

fn completions(sys: &System) -> Vec<Completion> {
    sys.requester().unwrap().completions().to_vec()
}

fn latencies(sys: &System) -> Vec<u64> {
    completions(sys).iter().map(Completion::latency).collect()
}

fn word(v: u64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

// ══════════════════════════════════════════════════════════
// Single level
// ══════════════════════════════════════════════════════════

/// Tests miss-then-fill, hit, dirtying write and read-back on a 128kB L1.
#[test]
fn test_l1_miss_hit_write_read() {
    let v = word(0xfeed_face_cafe_beef);
    let sys = run(
        &config(false),
        vec![
            Access::read(A, 8),
            Access::read(A, 8),
            Access::write(A, v.clone()),
            Access::read(A, 8),
        ],
    );

    assert_eq!(latencies(&sys), vec![L1_LAT + MEM_LAT, L1_LAT, L1_LAT, L1_LAT]);
    assert_eq!(completions(&sys)[3].data, v);

    let l1 = sys.cache("l1").unwrap();
    assert_eq!(l1.stats().hits, 3);
    assert_eq!(l1.stats().misses, 1);
    assert_eq!(l1.stats().writebacks, 0);
    assert_eq!(l1.store().line(A).map(|l| l.dirty), Some(true));
    assert_eq!(sys.memory("memory").unwrap().stats().reads, 1);
}

/// Tests that a hit completes exactly `latency` cycles after issue.
#[rstest]
#[case(1)]
#[case(2)]
#[case(7)]
fn test_hit_latency(#[case] latency: u64) {
    let mut config = config(false);
    config.l1.latency = latency;
    let sys = run(&config, vec![Access::read(A, 4), Access::read(A + 4, 4)]);
    let done = completions(&sys);
    assert_eq!(done[0].latency(), latency + MEM_LAT);
    assert_eq!(done[1].latency(), latency);
    assert_eq!(done[1].issued_at, done[0].completed_at);
}

/// Tests that the issue gap separates consecutive requests.
#[test]
fn test_issue_gap() {
    let mut config = config(false);
    config.general.issue_gap = 5;
    let sys = run(&config, vec![Access::read(A, 8), Access::read(A, 8)]);
    let done = completions(&sys);
    assert_eq!(done[1].issued_at, done[0].completed_at + 5);
}

/// Tests that a dirty victim is written back exactly once.
#[test]
fn test_dirty_victim_written_back_to_memory() {
    let v = word(42);
    let sys = run(
        &config(false),
        vec![Access::write(A, v.clone()), Access::read(A_ALIAS, 8)],
    );

    let l1 = sys.cache("l1").unwrap();
    assert_eq!(l1.stats().evictions, 1);
    assert_eq!(l1.stats().writebacks, 1);

    let memory = sys.memory("memory").unwrap();
    assert_eq!(memory.stats().writebacks, 1);
    assert_eq!(memory.peek(A, 8), v);
}

/// Tests that without write allocation a write miss bypasses the L1.
#[test]
fn test_write_no_allocate() {
    let mut config = config(false);
    config.l1.write_allocate = false;
    let v = word(7);
    let sys = run(&config, vec![Access::write(A, v.clone()), Access::read(A, 8)]);

    assert_eq!(latencies(&sys), vec![L1_LAT + MEM_LAT, L1_LAT + MEM_LAT]);
    assert_eq!(completions(&sys)[1].data, v);

    let memory = sys.memory("memory").unwrap();
    assert_eq!(memory.stats().writes, 1);
    assert_eq!(memory.stats().reads, 1);
}

/// Tests that the DRAM timing model drives the miss latency.
#[test]
fn test_dram_controller() {
    let mut config = config(false);
    config.memory.controller = MemoryController::Dram;
    let sys = run(&config, vec![Access::read(A, 8), Access::read(A + 64, 8)]);
    let t = config.memory.t_cas;
    assert_eq!(
        latencies(&sys),
        vec![L1_LAT + config.memory.t_ras + t, L1_LAT + t]
    );
}

// ══════════════════════════════════════════════════════════
// Two levels
// ══════════════════════════════════════════════════════════

/// Tests that an L1 miss hitting in the L2 costs L1 plus L2 latency and
/// reaches the L2 exactly once.
#[test]
fn test_l1_miss_l2_hit_latency() {
    let sys = run(
        &config(true),
        vec![
            Access::read(A, 8),
            Access::read(A_ALIAS, 8),
            Access::read(A, 8),
        ],
    );

    let cold = L1_LAT + L2_LAT + MEM_LAT;
    assert_eq!(latencies(&sys), vec![cold, cold, L1_LAT + L2_LAT]);

    let l2 = sys.cache("l2").unwrap().stats();
    assert_eq!((l2.hits, l2.misses), (1, 2));
    assert_eq!(sys.memory("memory").unwrap().stats().reads, 2);

    let l1 = sys.cache("l1").unwrap().stats();
    assert_eq!((l1.hits, l1.misses, l1.evictions), (0, 3, 2));
}

/// Tests that an L1 write-back lands in the L2 and stays there.
#[test]
fn test_l1_writeback_absorbed_by_l2() {
    let v = word(0xabcd);
    let mut sys = run(
        &config(true),
        vec![Access::write(A, v.clone()), Access::read(A_ALIAS, 8)],
    );

    assert_eq!(sys.cache("l1").unwrap().stats().writebacks, 1);
    let l2 = sys.cache("l2").unwrap();
    assert_eq!(l2.stats().writebacks_received, 1);
    assert_eq!(l2.store().line(A).map(|l| l.dirty), Some(true));

    assert_eq!(sys.memory("memory").unwrap().peek(A, 8), vec![0; 8]);
    assert_eq!(sys.functional_read(A, 8).unwrap(), v);
}

/// Tests a Bunker L2 with radix and stride against a flat reference model
/// under heavy aliasing.
#[test]
fn test_hierarchy_matches_reference_model() {
    let mut config = config(true);
    config.l2 = CacheConfig {
        enabled: true,
        size: MemSize(256 * KB),
        latency: L2_LAT,
        radix: 2,
        stride: 3,
        ..CacheConfig::default()
    };

    let mut rng = fastrand::Rng::with_seed(2024);
    let mut model: HashMap<u64, u64> = HashMap::new();
    let mut script = Vec::new();
    let mut expected = Vec::new();
    for _ in 0..400 {
        let addr = 0x4000 + rng.u64(0..12) * 128 * KB + rng.u64(0..8) * 8;
        if rng.bool() {
            let value = rng.u64(..);
            model.insert(addr, value);
            script.push(Access::write(addr, word(value)));
        } else {
            expected.push(word(model.get(&addr).copied().unwrap_or(0)));
            script.push(Access::read(addr, 8));
        }
    }

    let mut sys = run(&config, script);
    let loads: Vec<Vec<u8>> = completions(&sys)
        .into_iter()
        .filter(|c| c.access.kind == AccessKind::Read)
        .map(|c| c.data)
        .collect();
    assert_eq!(loads, expected);

    let l2 = sys.cache("l2").unwrap().stats().clone();
    assert!(l2.evictions > 0);
    assert!(l2.writebacks > 0);

    for (addr, value) in model {
        assert_eq!(sys.functional_read(addr, 8).unwrap(), word(value));
    }
}

// ══════════════════════════════════════════════════════════
// Blocking and retry
// ══════════════════════════════════════════════════════════

/// Tests that a request refused while the L1 is busy is replayed when the
/// L1 releases.
#[test]
fn test_second_port_retried_after_release() {
    let mut config = config(false);
    config.system.cpu_ports = 2;
    let mut sys = System::from_config(
        &config,
        vec![vec![Access::read(A, 8)], vec![Access::read(A + 0x4000, 8)]],
    )
    .unwrap();
    assert_eq!(sys.run(None).unwrap().cause, ExitCause::WorkloadComplete);

    let done = completions(&sys);
    assert_eq!(done.len(), 2);
    assert_eq!((done[0].port, done[0].completed_at), (0, L1_LAT + MEM_LAT));
    assert_eq!(done[1].port, 1);
    assert_eq!(done[1].issued_at, 0);
    assert_eq!(done[1].completed_at, 2 * (L1_LAT + MEM_LAT));
}

/// Tests that an L1 fill refused while the L2 absorbs a write-back is
/// replayed once the L2 releases.
#[test]
fn test_fill_retried_while_l2_absorbs_writeback() {
    let v = word(0x0bad_cafe);
    let sys = run(
        &config(true),
        vec![
            Access::write(A, v.clone()),
            Access::read(A_ALIAS, 8),
            Access::read(A, 8),
        ],
    );

    let done = completions(&sys);
    // The write-back reaches the L2 as the alias fill completes and keeps
    // it busy for L2_LAT cycles, one of which overlaps the L1 response.
    let wait = L2_LAT - L1_LAT;
    assert_eq!(done[2].latency(), L1_LAT + wait + L2_LAT);
    assert_eq!(done[2].latency(), 6);
    assert_eq!(done[2].data, v);

    let l2 = sys.cache("l2").unwrap().stats();
    assert_eq!(l2.writebacks_received, 1);
    assert_eq!((l2.hits, l2.misses), (1, 2));
    assert_eq!(sys.memory("memory").unwrap().stats().reads, 2);
}

/// Tests that a response refused by the requester is retried when its
/// gate reopens.
#[test]
fn test_response_retry() {
    let mut sys = System::new();
    let cpu = sys.next_component_id();
    let port = sys.add_port(cpu, "cpu.port[0]", PortRole::Request);
    let script = vec![Access::read(A, 8), Access::read(A, 8)];
    sys.add_component(Box::new(
        Requester::new("cpu", vec![port], vec![script], 0).with_response_delay(10),
    ));

    let params = CacheParams::new("l1", &config(false).l1, &Default::default(), 1).unwrap();
    let l1 = sys.add_cache(params);
    let (_, mem_port) = sys.add_memory(
        "memory",
        AddrRange::new(0, 1 << 30),
        64,
        Box::new(SimpleController::new(MEM_LAT)),
    );
    sys.connect(port, l1.cpu_side[0]).unwrap();
    sys.connect(l1.mem_side, mem_port).unwrap();

    assert_eq!(sys.run(None).unwrap().cause, ExitCause::WorkloadComplete);

    let done = sys.component(cpu).as_requester().unwrap().completions().to_vec();
    assert_eq!(done[0].latency(), L1_LAT + MEM_LAT);
    assert_eq!(done[1].latency(), 10);
    assert!(sys.component(l1.id).is_done());
}

/// Tests that a run stopped at the tick limit can be resumed.
#[test]
fn test_tick_limit_and_resume() {
    let mut sys = System::from_config(&config(false), vec![vec![Access::read(A, 8)]]).unwrap();
    let first = sys.run(Some(50)).unwrap();
    assert_eq!(first.cause, ExitCause::TickLimit);
    assert_eq!(first.tick, 50);
    assert!(completions(&sys).is_empty());

    let second = sys.run(None).unwrap();
    assert_eq!(second.cause, ExitCause::WorkloadComplete);
    assert_eq!(second.tick, L1_LAT + MEM_LAT);
}

// ══════════════════════════════════════════════════════════
// Functional access
// ══════════════════════════════════════════════════════════

/// Tests that a functional write is observed by a later timing read.
#[test]
fn test_functional_write_then_timing_read() {
    let v = word(0x5555);
    let mut sys = System::from_config(&config(true), vec![vec![Access::read(A, 8)]]).unwrap();
    sys.functional_write(A, &v).unwrap();
    sys.run(None).unwrap();
    assert_eq!(completions(&sys)[0].data, v);
}

/// Tests that functional writes update cached copies too.
#[test]
fn test_functional_write_updates_cached_copy() {
    let mut sys = run(&config(true), vec![Access::read(A, 8)]);
    let v = word(99);
    sys.functional_write(A, &v).unwrap();
    let l1 = sys.cache("l1").unwrap();
    let mut buf = [0u8; 8];
    assert!(l1.store().read(A, &mut buf));
    assert_eq!(buf.to_vec(), v);
    assert_eq!(sys.memory("memory").unwrap().peek(A, 8), v);
}

// ══════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════

/// Answers every request with a response carrying the wrong packet id.
struct RogueMemory;

impl MemObject for RogueMemory {
    fn name(&self) -> &str {
        "rogue"
    }

    fn recv_timing_req(
        &mut self,
        port: PortId,
        mut pkt: Packet,
        ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        pkt.make_response();
        pkt.id = PacketId(pkt.id.0 + 100);
        ctx.schedule_after(
            5,
            LocalEvent::Complete {
                port,
                response: Some(pkt),
            },
        );
        Ok(())
    }

    fn recv_timing_resp(
        &mut self,
        _port: PortId,
        _pkt: Packet,
        _ctx: &mut SimContext<'_>,
    ) -> Result<(), SimError> {
        Ok(())
    }

    fn process(&mut self, event: LocalEvent, ctx: &mut SimContext<'_>) -> Result<(), SimError> {
        if let LocalEvent::Complete {
            port,
            response: Some(resp),
        } = event
        {
            ctx.send_response(port, resp)?;
        }
        Ok(())
    }

    fn recv_functional(&mut self, _port: PortId, _pkt: &mut Packet) -> Result<Functional, SimError> {
        Ok(Functional::Done)
    }

    fn addr_ranges(&self) -> RangeSource {
        RangeSource::Own(vec![AddrRange::new(0, 1 << 20)])
    }
}

/// Tests that a response for a request nobody sent aborts the run.
#[test]
fn test_unexpected_response_is_fatal() {
    let mut sys = System::new();
    let (_, ports) = sys.add_requester("cpu", 1, vec![vec![Access::read(A, 8)]], 0);
    let params = CacheParams::new("l1", &config(false).l1, &Default::default(), 1).unwrap();
    let l1 = sys.add_cache(params);
    let rogue = sys.next_component_id();
    let rogue_port = sys.add_port(rogue, "rogue.port", PortRole::Response);
    sys.add_component(Box::new(RogueMemory));
    sys.connect(ports[0], l1.cpu_side[0]).unwrap();
    sys.connect(l1.mem_side, rogue_port).unwrap();

    match sys.run(None) {
        Err(SimError::Protocol(ProtocolViolation::UnexpectedResponse { component, .. })) => {
            assert_eq!(component, "l1.mem_side");
        }
        other => panic!("expected an unexpected-response violation, got {:?}", other),
    }
}

/// Tests that an access outside memory is rejected.
#[test]
fn test_unmapped_address() {
    let mut config = config(false);
    config.memory.range_size = MemSize(1 << 20);
    let mut sys = System::from_config(&config, vec![vec![Access::read(0x20_0000, 8)]]).unwrap();
    assert_eq!(
        sys.run(None),
        Err(SimError::Protocol(ProtocolViolation::UnmappedAddress {
            addr: 0x20_0000,
            size: 8
        }))
    );
}

/// Tests that an access straddling two blocks is rejected by the cache.
#[test]
fn test_access_spanning_blocks() {
    let mut sys = System::from_config(&config(false), vec![vec![Access::read(0x3c, 8)]]).unwrap();
    assert_eq!(
        sys.run(None),
        Err(SimError::Protocol(ProtocolViolation::SpansBlocks {
            addr: 0x3c,
            size: 8,
            block_size: 64
        }))
    );
}

/// Tests that several CPU ports without an L1 cannot be wired.
#[test]
fn test_multi_port_without_l1() {
    let mut config = config(true);
    config.l1.enabled = false;
    config.system.cpu_ports = 2;
    assert!(matches!(
        System::from_config(&config, Vec::new()),
        Err(SimError::Config(ConfigError::UnsupportedTopology(_)))
    ));
}

/// Tests that invalid cache geometry surfaces as a configuration error.
#[test]
fn test_invalid_geometry_rejected_at_build() {
    let mut config = config(true);
    config.l2.stride = 2;
    assert!(matches!(
        System::from_config(&config, Vec::new()),
        Err(SimError::Config(ConfigError::InvalidStride { .. }))
    ));
}

/// Tests the collected statistics and their JSON form.
#[test]
fn test_stats_collection() {
    let sys = run(&config(true), vec![Access::read(A, 8), Access::read(A, 8)]);
    let stats = sys.finish();
    assert_eq!(stats.requester.completed, 2);
    assert_eq!(stats.caches.len(), 2);
    assert_eq!(stats.cache("l1").map(|c| c.hits), Some(1));
    assert_eq!(stats.cache("l2").map(|c| c.misses), Some(1));
    assert_eq!(stats.cache("l1").map(|c| c.hit_ratio()), Some(0.5));

    let json: serde_json::Value = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
    assert_eq!(json["caches"][0]["name"], "l1");
    assert_eq!(json["memory"]["reads"], 1);
}
