//! Shared bench helpers for the integration tests.

use frame::DriverConfig;
use sim::{make_bench, SimBench};

/// Two sites, raw binning, retest wildcard on equipment bin 0, short
/// device timeouts so waiting tests finish quickly.
pub fn raw_config() -> DriverConfig {
    serde_json::from_str(
        r#"{
            "bin_mode": "default",
            "handler_site_ids": ["A", "B"],
            "handler_bin_ids": ["0", "1", "2", "3", "4", "5", "6", "7"],
            "handler_retest_bins": [0],
            "escalation": {
                "device": { "timeout_secs": 0.0, "action": "continue" },
                "general": { "timeout_secs": 0.0, "action": "continue" },
                "lot": { "timeout_secs": 0.0, "action": "continue" }
            }
        }"#,
    )
    .expect("raw test configuration")
}

/// Bench over [`raw_config`].
pub fn raw_bench() -> SimBench {
    make_bench(raw_config())
}

/// Stages a passing device with the given tester bin at every site.
pub fn stage_all_sites(bench: &SimBench, bin: i64) {
    for site in 1..=2 {
        bench.flags.stage_site_passed(site, true);
        bench.flags.stage_site_bin(site, bin, "");
        bench.flags.stage_site_reprobe(site, false);
    }
}

/// Queues a complete, well-behaved device-start answer set.
pub fn script_device_ready(bench: &SimBench, mask: u32) {
    bench.link.push_event(link_codecs::srq::DEVICE_READY);
    bench
        .link
        .push_receive(Ok(format!("FULLSITES {mask:08x}\r\n").as_bytes()));
}

/// Queues a complete, well-behaved bin answer set.
pub fn script_bin_done(bench: &SimBench) {
    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(link_codecs::srq::BIN_DONE);
}
