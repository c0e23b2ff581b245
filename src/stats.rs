//! Simulation statistics collection and reporting.
//!
//! Each component keeps its own counters; `SimStats` gathers them at the end
//! of a run for the text report and the optional JSON dump.

use crate::common::Tick;
use serde::Serialize;
use std::time::Instant;

/// Number of buckets in a latency histogram.
pub const HISTOGRAM_BUCKETS: usize = 16;

/// Fixed bucket-count histogram whose bucket width doubles as samples grow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Histogram {
    /// Width of each bucket in cycles.
    pub bucket_size: u64,
    /// Sample count per bucket.
    pub buckets: Vec<u64>,
    /// Number of samples.
    pub samples: u64,
    /// Sum of all samples.
    pub total: u64,
    /// Smallest sample.
    pub min: Option<u64>,
    /// Largest sample.
    pub max: Option<u64>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            bucket_size: 1,
            buckets: vec![0; HISTOGRAM_BUCKETS],
            samples: 0,
            total: 0,
            min: None,
            max: None,
        }
    }
}

impl Histogram {
    /// Records one sample.
    pub fn sample(&mut self, value: u64) {
        while value >= self.bucket_size * self.buckets.len() as u64 {
            self.grow();
        }
        self.buckets[(value / self.bucket_size) as usize] += 1;
        self.samples += 1;
        self.total += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    /// Doubles the bucket width, merging neighbouring buckets.
    fn grow(&mut self) {
        let n = self.buckets.len();
        let mut merged = vec![0; n];
        for (i, count) in self.buckets.iter().enumerate() {
            merged[i / 2] += count;
        }
        self.buckets = merged;
        self.bucket_size *= 2;
    }

    /// Mean of all samples, or zero.
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total as f64 / self.samples as f64
        }
    }
}

/// Counters of one cache controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Instance name.
    pub name: String,
    /// Requests served from a resident line.
    pub hits: u64,
    /// Requests that needed the next level.
    pub misses: u64,
    /// Valid lines displaced by a fill.
    pub evictions: u64,
    /// Dirty lines written to the next level.
    pub writebacks: u64,
    /// Write-backs received from the upper level.
    pub writebacks_received: u64,
    /// Cycles from miss detection to fill arrival.
    pub miss_latency: Histogram,
}

impl CacheStats {
    /// Creates zeroed counters for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Demand accesses (hits plus misses).
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of accesses that hit, or zero without accesses.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Counters of the main memory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// Read requests served.
    pub reads: u64,
    /// Write requests served.
    pub writes: u64,
    /// Write-backs absorbed.
    pub writebacks: u64,
    /// Bytes read.
    pub bytes_read: u64,
    /// Bytes written, write-backs included.
    pub bytes_written: u64,
}

/// Counters of the requester.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequesterStats {
    /// Accesses issued.
    pub issued: u64,
    /// Accesses answered.
    pub completed: u64,
    /// Issue-to-response latency.
    pub latency: Histogram,
}

/// Statistics of a whole run.
#[derive(Clone, Debug, Serialize)]
pub struct SimStats {
    #[serde(skip)]
    start_time: Instant,
    /// Simulated ticks.
    pub ticks: Tick,
    /// Requester counters.
    pub requester: RequesterStats,
    /// Per-cache counters, upstream first.
    pub caches: Vec<CacheStats>,
    /// Main memory counters.
    pub memory: MemoryStats,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: 0,
            requester: RequesterStats::default(),
            caches: Vec::new(),
            memory: MemoryStats::default(),
        }
    }
}

impl SimStats {
    /// Finds the counters of the cache called `name`.
    pub fn cache(&self, name: &str) -> Option<&CacheStats> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Serializes the statistics as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Prints a formatted summary of the run.
    pub fn print(&self) {
        let seconds = self.start_time.elapsed().as_secs_f64();

        println!("\n==========================================================");
        println!("CACHE HIERARCHY SIMULATION STATISTICS");
        println!("==========================================================");
        println!("host_seconds             {:.4} s", seconds);
        println!("sim_ticks                {}", self.ticks);
        println!("requests_issued          {}", self.requester.issued);
        println!("requests_completed       {}", self.requester.completed);
        println!("avg_request_latency      {:.2}", self.requester.latency.mean());

        for cache in &self.caches {
            let key = |stat: &str| format!("{}.{}", cache.name, stat);
            println!("----------------------------------------------------------");
            println!("{:<25}{}", key("hits"), cache.hits);
            println!("{:<25}{}", key("misses"), cache.misses);
            println!("{:<25}{:.4}", key("hit_ratio"), cache.hit_ratio());
            println!("{:<25}{}", key("evictions"), cache.evictions);
            println!("{:<25}{}", key("writebacks"), cache.writebacks);
            println!("{:<25}{:.2}", key("avg_miss_latency"), cache.miss_latency.mean());
        }

        println!("----------------------------------------------------------");
        println!("memory.reads             {}", self.memory.reads);
        println!("memory.writes            {}", self.memory.writes);
        println!("memory.writebacks        {}", self.memory.writebacks);
        println!("==========================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_widens_buckets_instead_of_dropping_samples() {
        let mut h = Histogram::default();
        h.sample(3);
        h.sample(100);
        assert_eq!(h.samples, 2);
        assert_eq!(h.bucket_size, 8);
        assert_eq!(h.buckets.iter().sum::<u64>(), 2);
        assert_eq!(h.max, Some(100));
        assert_eq!(h.min, Some(3));
    }

    #[test]
    fn hit_ratio_without_accesses_is_zero() {
        assert_eq!(CacheStats::new("l1").hit_ratio(), 0.0);
    }
}
