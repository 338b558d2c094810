//! Complete lot cycles against the simulated sorter.

use driver_abi::{SiteUsage, Verdict};
use link_codecs::srq;

use crate::support::{raw_bench, script_bin_done, script_device_ready, stage_all_sites};

#[test]
fn lot_cycle_end_to_end() {
    let mut bench = raw_bench();

    bench.link.push_receive(Ok(b"ID GSORT-2000 rev 4\r\n"));
    let (verdict, ident) = bench.session.equipment_id();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(ident.as_deref(), Some("GSORT-2000 rev 4"));

    bench.link.push_event(srq::LOT_STARTED);
    assert_eq!(bench.session.lot_start(), Verdict::Pass);
    assert!(bench.estate.lot_active());

    script_device_ready(&bench, 0x3);
    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert_eq!(
        bench.estate.site_usage(),
        vec![SiteUsage::Populated, SiteUsage::Populated]
    );
    assert!(bench.flags.site_inserted(1));
    assert!(bench.flags.site_inserted(2));

    stage_all_sites(&bench, 5);
    script_bin_done(&bench);
    assert_eq!(bench.session.device_done(), Verdict::Pass);
    assert_eq!(
        bench.estate.site_usage(),
        vec![SiteUsage::Empty, SiteUsage::Empty]
    );
    assert!(!bench.flags.site_inserted(1), "site setup cleared");

    assert_eq!(bench.session.lot_done(), Verdict::Pass);
    assert!(!bench.estate.lot_active());

    let sent = bench.link.sent();
    assert_eq!(
        sent,
        vec![
            "ID?\r\n".to_owned(),
            "FULLSITES?\r\n".to_owned(),
            "BINON 0:5 1:5\r\n".to_owned(),
        ]
    );
}

#[test]
fn partially_populated_start_binds_only_full_sites() {
    let mut bench = raw_bench();
    script_device_ready(&bench, 0x1);
    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert_eq!(
        bench.estate.site_usage(),
        vec![SiteUsage::Populated, SiteUsage::Empty]
    );
    assert!(bench.flags.site_inserted(1));
    assert!(!bench.flags.site_inserted(2));

    stage_all_sites(&bench, 4);
    script_bin_done(&bench);
    assert_eq!(bench.session.device_done(), Verdict::Pass);

    // The empty site goes out unresolved.
    assert_eq!(bench.link.sent()[1], "BINON 0:4 1:-\r\n");
}

#[test]
fn jam_during_device_start_yields_the_jam_verdict() {
    let mut bench = raw_bench();
    bench.link.push_event(srq::JAM);

    assert_eq!(bench.session.device_start(), Verdict::Jam);
}

#[test]
fn lot_done_signal_overrides_the_device_start_verdict() {
    let mut bench = raw_bench();
    bench.link.push_event(srq::LOT_DONE);

    assert_eq!(bench.session.device_start(), Verdict::LotDone);
}

#[test]
fn lot_start_signal_during_binning_overrides_the_verdict() {
    let mut bench = raw_bench();
    script_device_ready(&bench, 0x3);
    assert_eq!(bench.session.device_start(), Verdict::Pass);

    stage_all_sites(&bench, 5);
    bench.link.push_receive(Ok(b"OK\r\n"));
    bench.link.push_event(srq::LOT_STARTED);

    assert_eq!(bench.session.device_done(), Verdict::LotStart);
}
