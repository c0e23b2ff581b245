//! System-on-Chip plumbing.
//!
//! * `interconnect`: the port transport enforcing the blocking protocol.
//! * `traits`: the `MemObject` interface every component implements.
//! * `memory`: the main memory endpoint and its latency models.
//! * `builder`: the `System` container and event dispatch.

pub mod builder;
pub mod interconnect;
pub mod memory;
pub mod traits;

pub use builder::{CachePorts, Event, ExitCause, RunSummary, SimContext, System};
pub use interconnect::{
    Delivery, PendingRequest, PortId, PortRole, PortState, RespResult, SendResult, Transport,
};
pub use traits::{ComponentId, Functional, LocalEvent, MemObject, RangeSource};
