//! Frame-level tests: outcome classification, bin resolution, escalation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use driver_abi::{
    CallOutcome, Capabilities, DialogReply, DriverCall, EquipHandle, EquipState, LinkFamily,
    OperatorGateway, SharedFlags, SiteUsage, SystemFlag, TesterBridge, Verdict, BUTTON_CONTINUE,
    BUTTON_QUIT,
};

use crate::config::{BinMode, DriverConfig, EscalationAction, EscalationConfig, ReprobeMode};
use crate::retry::Flow;
use crate::session::{DriverSession, SkipMode};

#[derive(Default)]
struct Journal {
    bins: Mutex<Vec<Vec<i64>>>,
}

struct StubPlugin {
    caps: Capabilities,
    script: VecDeque<CallOutcome>,
    journal: Arc<Journal>,
}

impl StubPlugin {
    fn new(script: &[CallOutcome], journal: Arc<Journal>) -> Self {
        Self {
            caps: [DriverCall::Init, DriverCall::Start, DriverCall::Bin]
                .into_iter()
                .collect(),
            script: script.iter().copied().collect(),
            journal,
        }
    }

    fn next(&mut self) -> CallOutcome {
        self.script.pop_front().unwrap_or(CallOutcome::Ok)
    }
}

impl driver_abi::Plugin for StubPlugin {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn init(&mut self) -> CallOutcome {
        self.next()
    }

    fn device_start(&mut self) -> CallOutcome {
        self.next()
    }

    fn bin_device(&mut self, bins: &[i64]) -> CallOutcome {
        self.journal.bins.lock().unwrap().push(bins.to_vec());
        self.next()
    }
}

#[derive(Default)]
struct AutoOperator {
    replies: Mutex<VecDeque<DialogReply>>,
    titles: Mutex<Vec<String>>,
}

impl AutoOperator {
    fn with_replies(replies: &[DialogReply]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().cloned().collect()),
            titles: Mutex::new(Vec::new()),
        })
    }
}

impl OperatorGateway for AutoOperator {
    fn show(
        &self,
        request: &driver_abi::DialogRequest,
        _timeout: Option<std::time::Duration>,
    ) -> Option<DialogReply> {
        self.titles.lock().unwrap().push(request.title.clone());
        self.replies.lock().unwrap().pop_front()
    }
}

fn config(sites: usize) -> DriverConfig {
    DriverConfig {
        bin_mode: BinMode::Raw,
        handler_site_ids: (0..sites).map(|s| format!("S{s}")).collect(),
        site_map: None,
        handler_bin_ids: (0..8).map(|b| format!("{b}")).collect(),
        handler_retest_bins: vec![],
        hardbin_map: vec![],
        softbin_map: vec![],
        dont_trust_binning: false,
        enable_diagnose_window: true,
        auto_reprobe: ReprobeMode::Off,
        auto_reprobe_on_retest: false,
        auto_reprobe_on_check: false,
        max_retest_count: 1,
        escalation: EscalationConfig::default(),
    }
}

struct Harness {
    session: DriverSession,
    flags: Arc<SharedFlags>,
    estate: EquipHandle,
    operator: Arc<AutoOperator>,
    journal: Arc<Journal>,
}

fn harness(config: DriverConfig, script: &[CallOutcome], replies: &[DialogReply]) -> Harness {
    let flags = SharedFlags::new();
    let estate = EquipState::new(config.num_sites());
    let operator = AutoOperator::with_replies(replies);
    let journal = Arc::new(Journal::default());
    let plugin = StubPlugin::new(script, Arc::clone(&journal));

    let session = DriverSession::builder()
        .config(config)
        .tester(flags.clone())
        .operator(operator.clone())
        .estate(Arc::clone(&estate))
        .plugin(Box::new(plugin))
        .build()
        .expect("session build");

    Harness {
        session,
        flags,
        estate,
        operator,
        journal,
    }
}

fn classify(outcome: CallOutcome, call: DriverCall) -> (Flow, Verdict, Harness) {
    let mut h = harness(config(2), &[], &[]);
    h.session.begin_operation();
    let mut verdict = Verdict::Pass;
    let flow = h.session.handle_plugin_result(outcome, call, &mut verdict);
    (flow, verdict, h)
}

#[test]
fn verdict_closure_over_all_outcomes() {
    // Every outcome maps to exactly one documented (completed, success,
    // verdict) triple.
    let cases: &[(CallOutcome, DriverCall, bool, bool, Verdict)] = &[
        (CallOutcome::Ok, DriverCall::Start, true, true, Verdict::Pass),
        (CallOutcome::Jam, DriverCall::Start, true, false, Verdict::Jam),
        (
            CallOutcome::LotStart,
            DriverCall::Start,
            true,
            false,
            Verdict::LotStart,
        ),
        (
            CallOutcome::LotDone,
            DriverCall::Start,
            true,
            false,
            Verdict::LotDone,
        ),
        (
            CallOutcome::DeviceStart,
            DriverCall::Bin,
            true,
            false,
            Verdict::DeviceStart,
        ),
        (
            CallOutcome::NotInit,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::InvalidHandle,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::NotApplicable,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::Memory,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::Config,
            DriverCall::Start,
            true,
            false,
            Verdict::Pass,
        ),
        (
            CallOutcome::Binning,
            DriverCall::Bin,
            true,
            false,
            Verdict::Pass,
        ),
        (
            CallOutcome::Waiting,
            DriverCall::Start,
            false,
            false,
            Verdict::Pass,
        ),
        (
            CallOutcome::LinkFault(LinkFamily::Gpib),
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::LinkFault(LinkFamily::Lan),
            DriverCall::Start,
            true,
            false,
            Verdict::Pass,
        ),
        (
            CallOutcome::Aborted,
            DriverCall::Start,
            true,
            false,
            Verdict::Pass,
        ),
        (
            CallOutcome::Answer,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
        (
            CallOutcome::Fatal,
            DriverCall::Start,
            true,
            false,
            Verdict::Error,
        ),
    ];

    for (outcome, call, completed, success, verdict) in cases {
        let (flow, got, _) = classify(*outcome, *call);
        assert_eq!(flow.completed, *completed, "completed for {outcome:?}");
        assert_eq!(flow.success, *success, "success for {outcome:?}");
        assert_eq!(got, *verdict, "verdict for {outcome:?}");
    }
}

#[test]
fn boundary_signal_matching_its_own_call_keeps_the_verdict() {
    let (flow, verdict, _) = classify(CallOutcome::LotStart, DriverCall::LotStart);
    assert!(flow.completed);
    assert_eq!(verdict, Verdict::Pass);

    let (_, verdict, _) = classify(CallOutcome::DeviceStart, DriverCall::Start);
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn lan_fault_forces_the_abort_flag() {
    let (_, _, h) = classify(CallOutcome::LinkFault(LinkFamily::Lan), DriverCall::Start);
    assert_eq!(h.flags.flag(SystemFlag::Abort), 1);

    let (_, _, h) = classify(CallOutcome::LinkFault(LinkFamily::Gpib), DriverCall::Start);
    assert_eq!(h.flags.flag(SystemFlag::Abort), 0);
}

#[test]
fn aborted_outcome_sets_the_abort_flag() {
    let (_, _, h) = classify(CallOutcome::Aborted, DriverCall::Start);
    assert_eq!(h.flags.flag(SystemFlag::Abort), 1);
}

#[test]
fn disabled_diagnose_window_forces_a_pass_verdict() {
    let mut cfg = config(2);
    cfg.enable_diagnose_window = false;
    let mut h = harness(cfg, &[], &[]);
    h.session.begin_operation();

    let mut verdict = Verdict::Pass;
    let flow = h
        .session
        .handle_plugin_result(CallOutcome::Fatal, DriverCall::Start, &mut verdict);
    assert!(flow.completed);
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn abort_flag_ends_a_waiting_loop_with_a_pass_verdict() {
    let mut h = harness(
        config(2),
        &[CallOutcome::Waiting, CallOutcome::Waiting],
        &[],
    );
    h.flags.set_flag(SystemFlag::Abort, 1);

    let verdict = h.session.device_start();
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn skip_escalation_treats_the_call_as_handled() {
    let mut cfg = config(1);
    cfg.escalation.device.timeout_secs = 0.0;
    cfg.escalation.device.action = EscalationAction::Skip;
    let mut h = harness(cfg, &[CallOutcome::Waiting], &[]);

    // One waiting round fires the zero timeout, the skip action completes
    // the call successfully without any dialog.
    let verdict = h.session.device_start();
    assert_eq!(verdict, Verdict::Pass);
    assert!(h.operator.titles.lock().unwrap().is_empty());
}

#[test]
fn ask_escalation_lets_the_operator_quit() {
    let mut cfg = config(1);
    cfg.escalation.device.timeout_secs = 0.0;
    cfg.escalation.device.action = EscalationAction::AskOperator;
    let mut h = harness(
        cfg,
        &[CallOutcome::Waiting, CallOutcome::Waiting],
        &[DialogReply::button(BUTTON_QUIT)],
    );

    let verdict = h.session.device_start();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(h.flags.flag(SystemFlag::Quit), 1);
    assert_eq!(
        h.operator.titles.lock().unwrap().as_slice(),
        &["Equipment driver: Timeout"]
    );
}

#[test]
fn keep_waiting_answer_loops_until_success() {
    let mut cfg = config(1);
    cfg.escalation.device.timeout_secs = 0.0;
    let mut h = harness(
        cfg,
        &[CallOutcome::Waiting, CallOutcome::Ok],
        &[DialogReply::button(BUTTON_CONTINUE)],
    );
    h.estate.set_site(0, SiteUsage::Populated);

    let verdict = h.session.device_start();
    assert_eq!(verdict, Verdict::Pass);
    assert!(h.flags.site_inserted(1), "site setup announced on success");
}

#[test]
fn empty_and_deactivated_sites_stay_neutral() {
    let mut h = harness(config(4), &[], &[]);
    h.estate.set_site_usage(vec![
        SiteUsage::Empty,
        SiteUsage::Deactivated,
        SiteUsage::Empty,
        SiteUsage::Deactivated,
    ]);
    // Stage results that must NOT be consulted.
    for site in 1..=4 {
        h.flags.stage_site_passed(site, false);
        h.flags.stage_site_bin(site, 5, "xx");
    }

    for skip in [SkipMode::Normal, SkipMode::SkipCurrent] {
        h.session.set_skip_mode(skip);
        h.session.prepare_binning().unwrap();
        assert_eq!(h.session.device_bins(), &[-1, -1, -1, -1]);
        assert_eq!(h.session.device_passed(), &[true, true, true, true]);
    }
}

#[test]
fn raw_mode_passes_the_tester_bin_through() {
    // Scenario A: raw binning, reported bin 7, upstream fail flag.
    let mut h = harness(config(1), &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, false);
    h.flags.stage_site_bin(1, 7, "");

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[7]);
    assert_eq!(h.session.device_passed(), &[false]);
}

#[test]
fn raw_mode_routes_the_retest_sentinel_through_the_wildcard() {
    let mut cfg = config(1);
    cfg.handler_retest_bins = vec![2];
    let mut h = harness(cfg, &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, -1, "");

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[2]);
}

#[test]
fn hard_remap_falls_back_to_the_wildcard_with_a_warning_only() {
    // Scenario B: map (5→2), wildcard (−1→0); bin 5 resolves to 2, absent
    // bin 9 resolves to 0 without a panic prompt.
    let mut cfg = config(2);
    cfg.bin_mode = BinMode::HardMap;
    cfg.hardbin_map = vec![vec![], vec![], vec![5]];
    cfg.handler_retest_bins = vec![0];
    let mut h = harness(cfg, &[], &[]);
    h.estate
        .set_site_usage(vec![SiteUsage::Populated, SiteUsage::Populated]);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, 5, "");
    h.flags.stage_site_passed(2, true);
    h.flags.stage_site_bin(2, 9, "");

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[2, 0]);
    assert!(
        h.operator.titles.lock().unwrap().is_empty(),
        "wildcard fallback must not panic"
    );
}

#[test]
fn soft_remap_uses_the_packed_text_code() {
    // Scenario C: softbin map ("db"→3).
    let mut cfg = config(1);
    cfg.bin_mode = BinMode::SoftMap;
    cfg.softbin_map = vec![vec![], vec![], vec![], vec!["db".into()]];
    let mut h = harness(cfg, &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, 12, "db");

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[3]);
}

#[test]
fn skip_current_overrides_tested_results() {
    let mut cfg = config(1);
    cfg.handler_retest_bins = vec![4];
    let mut h = harness(cfg, &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, false);
    h.flags.stage_site_bin(1, 6, "");

    h.session.set_skip_mode(SkipMode::SkipCurrent);
    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[4]);
    assert_eq!(h.session.device_passed(), &[true], "skip forces pass");
}

#[test]
fn dont_trust_binning_short_circuits_everything() {
    let mut cfg = config(2);
    cfg.dont_trust_binning = true;
    let mut h = harness(cfg, &[], &[]);
    h.estate
        .set_site_usage(vec![SiteUsage::Populated, SiteUsage::Populated]);

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[-1, -1]);
    assert_eq!(h.session.device_passed(), &[true, true]);
}

#[test]
fn missing_wildcard_for_skipped_devices_raises_one_aggregated_panic() {
    let mut h = harness(
        config(2),
        &[],
        &[DialogReply::button(BUTTON_CONTINUE)],
    );
    h.estate
        .set_site_usage(vec![SiteUsage::Populated, SiteUsage::Populated]);
    h.session.set_skip_mode(SkipMode::SkipCurrent);

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[-1, -1]);
    let titles = h.operator.titles.lock().unwrap();
    assert_eq!(
        titles.as_slice(),
        &["Equipment driver PANIC"],
        "two failing sites, one aggregated prompt"
    );
}

#[test]
fn panic_quit_stops_the_operation_and_sets_abort() {
    let mut h = harness(config(1), &[], &[DialogReply::button(BUTTON_QUIT)]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.session.set_skip_mode(SkipMode::SkipCurrent);

    assert_eq!(h.session.prepare_binning(), Err(Verdict::Error));
    assert_eq!(h.flags.flag(SystemFlag::Abort), 1);
}

#[test]
fn device_done_bins_through_the_plugin() {
    let mut h = harness(config(2), &[CallOutcome::Ok], &[]);
    h.estate
        .set_site_usage(vec![SiteUsage::Populated, SiteUsage::Empty]);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, 3, "");

    let verdict = h.session.device_done();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(*h.journal.bins.lock().unwrap(), vec![vec![3, -1]]);
    assert!(!h.flags.site_inserted(1), "site setup cleared after binning");
}

#[test]
fn auto_reprobe_on_retest_schedules_a_bounded_retest() {
    let mut cfg = config(1);
    cfg.auto_reprobe_on_retest = true;
    cfg.handler_retest_bins = vec![2];
    cfg.max_retest_count = 1;
    let mut h = harness(cfg, &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, 2, "");

    // First device-done: the device went to the retest bin, binning is
    // skipped and a retest cycle is scheduled.
    let verdict = h.session.device_done();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(h.session.tester_mode(), crate::TesterMode::Retest);
    assert_eq!(h.session.retest_attempts(), 1);
    assert!(h.journal.bins.lock().unwrap().is_empty());

    // The next device-start consumes the retest cycle.
    let verdict = h.session.device_start();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(h.session.tester_mode(), crate::TesterMode::Normal);

    // The retest budget is exhausted: the second device-done really bins.
    let verdict = h.session.device_done();
    assert_eq!(verdict, Verdict::Pass);
    assert_eq!(*h.journal.bins.lock().unwrap(), vec![vec![2]]);
}

#[test]
fn reconfigure_swaps_the_bin_map_atomically() {
    let mut h = harness(config(1), &[], &[]);
    h.estate.set_site(0, SiteUsage::Populated);
    h.flags.stage_site_passed(1, true);
    h.flags.stage_site_bin(1, -1, "");

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[-1], "no retest bins configured");

    let mut cfg = config(1);
    cfg.handler_retest_bins = vec![5];
    h.session.reconfigure(cfg).unwrap();

    h.session.prepare_binning().unwrap();
    assert_eq!(h.session.device_bins(), &[5]);
}
