//! Wait/escalation policy behavior seen from the outside.

use driver_abi::{DialogReply, SystemFlag, TesterBridge, Verdict, BUTTON_QUIT};
use frame::EscalationAction;
use link::LinkError;
use link_codecs::srq;
use sim::make_bench;

use crate::support::{raw_bench, raw_config};

#[test]
fn external_abort_flag_ends_the_wait_with_a_pass_verdict() {
    let mut bench = raw_bench();
    bench.flags.set_flag(SystemFlag::Abort, 1);

    // Nothing is scripted, so the plugin keeps waiting; the abort flag is
    // observed at the top of the first wait round.
    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert!(bench.operator.titles().is_empty());
}

#[test]
fn ask_escalation_poses_the_timeout_question() {
    let mut config = raw_config();
    config.escalation.device.action = EscalationAction::AskOperator;
    let mut bench = make_bench(config);
    bench.operator.push_reply(DialogReply::button(BUTTON_QUIT));

    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert_eq!(bench.flags.flag(SystemFlag::Quit), 1);
    assert_eq!(bench.operator.titles(), ["Equipment driver: Timeout"]);
}

#[test]
fn skip_escalation_completes_the_call() {
    let mut config = raw_config();
    config.escalation.device.action = EscalationAction::Skip;
    let mut bench = make_bench(config);

    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert!(
        bench.operator.titles().is_empty(),
        "skip resolves without the operator"
    );
}

#[test]
fn interface_fault_without_an_operator_fails_the_call() {
    let mut bench = raw_bench();
    bench.link.push_event_fault(LinkError::fault("bus error"));

    assert_eq!(bench.session.device_start(), Verdict::Error);
    assert_eq!(
        bench.operator.titles(),
        ["Equipment driver: Interface Error"]
    );
}

#[test]
fn garbled_answer_forces_an_error_verdict() {
    let mut bench = raw_bench();
    bench.link.push_event(srq::DEVICE_READY);
    bench.link.push_receive(Ok(b"WHAT 00000003\r\n"));

    assert_eq!(bench.session.device_start(), Verdict::Error);
    assert_eq!(
        bench.operator.titles(),
        ["Equipment driver: Answer not understood"]
    );
}

#[test]
fn unexpected_interrupt_byte_is_an_answer_problem() {
    let mut bench = raw_bench();
    // 0x13 has no registered handler and is not expected anywhere.
    bench.link.push_event(0x13);

    assert_eq!(bench.session.device_start(), Verdict::Error);
}

#[test]
fn disabled_diagnose_window_passes_even_fatal_conditions() {
    let mut config = raw_config();
    config.enable_diagnose_window = false;
    let mut bench = make_bench(config);
    bench.link.push_event_fault(LinkError::fault("bus error"));

    // The documented trade-off: unattended equipment never blocks and the
    // caller sees a pass-equivalent verdict.
    assert_eq!(bench.session.device_start(), Verdict::Pass);
    assert!(bench.operator.titles().is_empty());
}
