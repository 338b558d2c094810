//! Idempotent resumption of multi-step dialogs across retry entries.

use driver_abi::Verdict;
use link::LinkError;
use link_codecs::srq;

use crate::support::{raw_bench, script_bin_done, stage_all_sites};

#[test]
fn timeout_resumes_without_reissuing_completed_steps() {
    // Three-step get-device dialog: interrupt wait, site query, answer.
    // The answer times out on the first attempt; the second attempt (same
    // call identity) must perform only the remaining step.
    let mut bench = raw_bench();
    bench.link.push_event(srq::DEVICE_READY);
    bench.link.push_receive(Err(LinkError::Timeout));
    bench.link.push_receive(Ok(b"FULLSITES 00000003\r\n"));

    let verdict = bench.session.device_start();
    assert_eq!(verdict, Verdict::Pass);

    assert_eq!(
        bench.link.sent(),
        vec!["FULLSITES?\r\n".to_owned()],
        "the site query must be sent exactly once across both attempts"
    );
    assert_eq!(bench.link.event_calls(), 1, "interrupt consumed once");
    assert_eq!(bench.link.receive_calls(), 2, "one timeout, one answer");

    assert!(bench.flags.site_inserted(1));
    assert!(bench.flags.site_inserted(2));
}

#[test]
fn a_new_call_identity_starts_with_clean_progress() {
    let mut bench = raw_bench();
    bench.link.push_event(srq::DEVICE_READY);
    bench.link.push_receive(Ok(b"FULLSITES 00000003\r\n"));
    assert_eq!(bench.session.device_start(), Verdict::Pass);

    // The bin call runs all of its own steps even though the previous
    // call left a fully completed progress record behind.
    stage_all_sites(&bench, 5);
    script_bin_done(&bench);
    assert_eq!(bench.session.device_done(), Verdict::Pass);

    let sent = bench.link.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], "BINON 0:5 1:5\r\n");
}

#[test]
fn repeated_timeouts_keep_the_call_resumable() {
    // Two timeouts in a row; the third attempt completes. The send still
    // happens only once.
    let mut bench = raw_bench();
    bench.link.push_event(srq::DEVICE_READY);
    bench.link.push_receive(Err(LinkError::Timeout));
    bench.link.push_receive(Err(LinkError::Timeout));
    bench.link.push_receive(Ok(b"FULLSITES 00000001\r\n"));

    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert_eq!(bench.link.sent().len(), 1);
    assert_eq!(bench.link.receive_calls(), 3);
}
