//! Explicit and implicit reprobe flows.

use driver_abi::{SiteUsage, SystemFlag, TesterBridge, Verdict};
use frame::{ReprobeCause, ReprobeMode};
use link::LinkError;
use link_codecs::srq;
use sim::make_bench;

use crate::support::{raw_bench, raw_config, script_device_ready};

#[test]
fn explicit_reprobe_recontacts_the_devices() {
    let mut bench = raw_bench();
    script_device_ready(&bench, 0x3);
    assert_eq!(bench.session.device_start(), Verdict::Pass);

    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(srq::DEVICE_READY);
    assert_eq!(
        bench.session.try_reprobe(ReprobeCause::Explicit),
        Verdict::Pass
    );
    assert_eq!(bench.link.sent()[1], "REPROBE\r\n");
}

#[test]
fn implicit_reprobe_is_skipped_when_auto_reprobe_is_off() {
    let mut bench = raw_bench();
    assert_eq!(
        bench.session.try_reprobe(ReprobeCause::AfterBin),
        Verdict::Pass
    );
    assert!(bench.link.sent().is_empty(), "no hardware exchange happened");
}

#[test]
fn per_site_reprobe_bins_the_sites_not_flagged() {
    let mut config = raw_config();
    config.auto_reprobe = ReprobeMode::PerSite;
    let mut bench = make_bench(config);

    script_device_ready(&bench, 0x3);
    assert_eq!(bench.session.device_start(), Verdict::Pass);

    // Site A wants a reprobe; site B was tested and bins to 4.
    bench.flags.stage_site_reprobe(1, true);
    bench.flags.stage_site_reprobe(2, false);
    bench.flags.stage_site_passed(2, true);
    bench.flags.stage_site_bin(2, 4, "");

    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(srq::DEVICE_READY);
    assert_eq!(
        bench.session.try_reprobe(ReprobeCause::AfterBin),
        Verdict::Pass
    );

    assert_eq!(bench.link.sent()[1], "BINRP 0:R 1:4\r\n");
    assert_eq!(
        bench.estate.site_usage(),
        vec![SiteUsage::Populated, SiteUsage::Empty],
        "reprobed site keeps its device, the binned one empties"
    );
}

#[test]
fn paused_equipment_is_unpaused_around_an_explicit_reprobe() {
    let mut config = raw_config();
    config.auto_reprobe = ReprobeMode::All;
    let mut bench = make_bench(config);
    bench.estate.set_equipment_paused(true);

    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(srq::DEVICE_READY);
    assert_eq!(
        bench.session.try_reprobe(ReprobeCause::AfterStart),
        Verdict::Pass
    );
    assert!(
        bench.estate.equipment_paused(),
        "equipment goes back into pause after the reprobe"
    );
}

#[test]
fn failed_implicit_reprobe_requests_a_pause() {
    let mut config = raw_config();
    config.auto_reprobe = ReprobeMode::All;
    let mut bench = make_bench(config);
    bench.link.push_send_fault(LinkError::fault("wire broke"));

    assert_eq!(
        bench.session.try_reprobe(ReprobeCause::AfterBin),
        Verdict::Error
    );
    assert_eq!(bench.flags.flag(SystemFlag::Pause), 1);
}
