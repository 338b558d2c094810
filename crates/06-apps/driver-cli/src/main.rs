//! Drives the simulated sorter through a complete lot cycle and prints the
//! verdict of every logical operation.
//!
//! Useful for watching the retry engine and the bin resolution work end to
//! end: run with `RUST_LOG=debug` to see the transaction-level chatter.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use frame::DriverConfig;
use link_codecs::srq;
use log::info;
use sim::{make_bench, SimBench};

/// Configuration used when no file is given: two sites, hardbin remap with
/// a retest wildcard.
const DEFAULT_CONFIG: &str = r#"{
    "bin_mode": "mapped-hardbins",
    "handler_site_ids": ["A", "B"],
    "handler_bin_ids": ["good", "retest", "fail-a", "fail-b"],
    "handler_retest_bins": [1],
    "hardbin_map": [[1], [], [2, 3], [4]],
    "escalation": {
        "device": { "timeout_secs": 5.0, "action": "continue" }
    }
}"#;

#[derive(Parser)]
#[command(name = "driver-cli", about = "Run a simulated handler lot cycle")]
struct Args {
    /// JSON driver configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of device cycles to run.
    #[arg(long, default_value_t = 3)]
    devices: u32,

    /// Tester hardbin reported for every device.
    #[arg(long, default_value_t = 1)]
    bin: i64,

    /// Dump the link traffic at the end.
    #[arg(long)]
    traffic: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config: DriverConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => serde_json::from_str(DEFAULT_CONFIG).expect("built-in configuration"),
    };
    let sites = config.num_sites();
    let mask = (1u32 << sites) - 1;

    let mut bench = make_bench(config);
    info!("bench assembled with {sites} sites");

    bench.link.push_receive(Ok(b"ID GSORT-2000 rev 4\r\n"));
    let (verdict, ident) = bench.session.equipment_id();
    println!("equipment id : {verdict:?} ({})", ident.as_deref().unwrap_or("?"));

    bench.link.push_event(srq::LOT_STARTED);
    println!("lot start    : {:?}", bench.session.lot_start());

    for cycle in 0..args.devices {
        script_device_cycle(&bench, mask, args.bin);

        println!("device start : {:?} [cycle {cycle}]", bench.session.device_start());
        println!("device done  : {:?} [cycle {cycle}]", bench.session.device_done());
    }

    bench.link.push_no_event();
    println!("lot done     : {:?}", bench.session.lot_done());

    if args.traffic {
        println!("link traffic:");
        for line in bench.link.sent() {
            println!("  > {}", line.trim_end());
        }
    }
    Ok(())
}

/// Queues the equipment answers and tester results for one device cycle.
fn script_device_cycle(bench: &SimBench, mask: u32, bin: i64) {
    bench.link.push_event(srq::DEVICE_READY);
    bench
        .link
        .push_receive(Ok(format!("FULLSITES {mask:08x}\r\n").as_bytes()));

    for site in 0..mask.count_ones() as i64 {
        bench.flags.stage_site_passed(site + 1, bin == 1);
        bench.flags.stage_site_bin(site + 1, bin, "");
    }

    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(srq::BIN_DONE);
}
