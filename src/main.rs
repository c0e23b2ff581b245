//! Bunker Cache Hierarchy Simulator CLI.
//!
//! The main executable for the simulator. It parses the command line, loads
//! the TOML configuration and the access trace, builds the hierarchy and
//! runs it to completion.
//!
//! # Usage
//!
//! ```text
//! bunker-sim --config configs/default.toml --trace workload.trace
//! ```

use clap::Parser;
use env_logger::Env;
use std::{fs, process};

use bunker_cache::config::{CacheConfig, Config};
use bunker_cache::sim::loader;
use bunker_cache::soc::{ExitCause, System};

/// Command-line arguments for the cache hierarchy simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Bunker Cache Hierarchy Simulator")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, default_value = "configs/default.toml")]
    config: String,

    /// Access trace replayed by the requester.
    #[arg(short, long)]
    trace: String,

    /// Stop after this tick.
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Write statistics as JSON to this file.
    #[arg(long)]
    stats_json: Option<String>,

    /// Log every packet (same as `[general] trace = true`).
    #[arg(short, long)]
    verbose: bool,
}

fn describe_cache(label: &str, cache: &CacheConfig) {
    println!(
        "  {:<20}{} ({}, latency {}, radix {}, stride {}, {:?})",
        format!("{}:", label),
        if cache.enabled { "Enabled" } else { "Disabled" },
        cache.size,
        cache.latency,
        cache.radix,
        cache.stride,
        cache.policy
    );
}

fn fatal(message: impl std::fmt::Display) -> ! {
    eprintln!("\n[!] FATAL: {}", message);
    process::exit(1);
}

/// Main entry point for the simulator.
///
/// # Behavior
///
/// 1. **Configuration**: Parses arguments and loads the TOML configuration.
/// 2. **Workload**: Reads the trace into one script per CPU port.
/// 3. **Initialization**: Wires requester, L1, L2 and memory.
/// 4. **Simulation**: Runs the event loop until the workload completes or
///    the tick limit is reached.
/// 5. **Teardown**: Prints statistics and optionally writes them as JSON.
fn main() {
    let args = Args::parse();

    let config_content = fs::read_to_string(&args.config)
        .unwrap_or_else(|e| fatal(format!("could not read config '{}': {}", args.config, e)));
    let config: Config = toml::from_str(&config_content)
        .unwrap_or_else(|e| fatal(format!("could not parse config '{}': {}", args.config, e)));

    let default_level = if args.verbose || config.general.trace {
        "debug"
    } else {
        "warn"
    };
    env_logger::init_from_env(Env::default().filter_or("BUNKER_LOG", default_level));

    println!("Global Configuration");
    println!("--------------------");
    println!("System:");
    println!("  Block Size:         {} bytes", config.system.block_size);
    println!("  Address Bits:       {}", config.system.address_bits);
    println!("  CPU Ports:          {}", config.system.cpu_ports);
    println!("Cache Hierarchy:");
    describe_cache("L1", &config.l1);
    describe_cache("L2", &config.l2);
    println!("Memory:");
    println!("  Controller:         {:?}", config.memory.controller);
    println!(
        "  Range:              {:#x} + {}",
        config.memory.range_base, config.memory.range_size
    );
    println!("--------------------");

    let workload = loader::load_trace(&args.trace, config.system.cpu_ports).unwrap_or_else(|e| fatal(e));
    println!(
        "[Loader] {} accesses from {}",
        workload.iter().map(Vec::len).sum::<usize>(),
        args.trace
    );

    let mut system = System::from_config(&config, workload).unwrap_or_else(|e| fatal(e));
    let max_ticks = args.max_ticks.or(config.general.max_ticks);

    let summary = match system.run(max_ticks) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("\n[!] FATAL @ tick {}: {}", system.now(), e);
            system.stats().print();
            process::exit(1);
        }
    };

    println!("\nExiting @ tick {} because {}", summary.tick, summary.cause);
    let stats = system.finish();
    stats.print();

    if let Some(path) = args.stats_json {
        let json = stats.to_json().unwrap_or_else(|e| fatal(e));
        fs::write(&path, json).unwrap_or_else(|e| fatal(format!("could not write '{}': {}", path, e)));
    }

    if summary.cause == ExitCause::Stalled {
        process::exit(2);
    }
}
