//! Logical driver operations.
//!
//! Each operation wraps one capability-module entry point in the retry
//! loop: start the timers, invoke the plugin until the classification says
//! the call completed, then translate the final state into the verdict
//! returned to the calling test system.

use binmap::BinCode;
use driver_abi::{CallOutcome, DriverCall, Plugin, SiteUsage, SystemFlag, Verdict};
use log::{error, info, warn};

use crate::config::{BinMode, ReprobeMode};
use crate::retry::Flow;
use crate::session::{DriverSession, TesterMode};

/// Why a reprobe operation was entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReprobeCause {
    /// The operator requested a reprobe.
    Explicit,
    /// Implicitly entered while starting a retest/check cycle.
    AfterStart,
    /// Implicitly entered when devices were binned to retest.
    AfterBin,
}

impl DriverSession {
    /// Initializes the equipment session.
    pub fn init(&mut self) -> Verdict {
        self.begin_operation();
        let mut verdict = Verdict::Pass;
        match self.run_plugin_loop(DriverCall::Init, &mut verdict, false, |p| p.init()) {
            Err(v) => v,
            Ok(true) => {
                info!(
                    "equipment initialized after {:.1} seconds",
                    self.total_timer.elapsed_secs()
                );
                verdict
            }
            Ok(false) => {
                error!("equipment initialization stopped unsuccessfully");
                verdict
            }
        }
    }

    /// Waits for devices to be in place for test.
    pub fn device_start(&mut self) -> Verdict {
        self.begin_operation();
        let mut verdict = Verdict::Pass;

        match self.tester_mode {
            TesterMode::Retest => {
                info!(
                    "retesting device(s),\n\
                     no new devices are requested from the equipment now"
                );
                self.tester_mode = TesterMode::Normal;
                if !self.set_site_setup() {
                    return Verdict::Error;
                }
                return if self.config.auto_reprobe_on_retest {
                    self.try_reprobe_inner(ReprobeCause::AfterStart)
                } else {
                    verdict
                };
            }
            TesterMode::Check => {
                info!(
                    "checking device(s),\n\
                     no new devices are requested from the equipment now"
                );
                self.tester_mode = TesterMode::Normal;
                if !self.set_site_setup() {
                    return Verdict::Error;
                }
                return if self.config.auto_reprobe_on_check {
                    self.try_reprobe_inner(ReprobeCause::AfterStart)
                } else {
                    verdict
                };
            }
            TesterMode::Normal => {}
        }

        let success =
            match self.run_plugin_loop(DriverCall::Start, &mut verdict, false, |p| {
                p.device_start()
            }) {
                Err(v) => return v,
                Ok(success) => success,
            };
        info!(
            "stopped waiting for device(s) after {:.1} seconds",
            self.total_timer.elapsed_secs()
        );

        if success {
            info!("got device(s)");
            if !self.set_site_setup() {
                verdict = Verdict::Error;
            }
        }
        verdict
    }

    /// Bins the tested devices.
    pub fn device_done(&mut self) -> Verdict {
        self.begin_operation();
        let mut verdict = Verdict::Pass;

        self.refresh_tester_mode();
        match self.tester_mode {
            TesterMode::Retest => {
                info!(
                    "device(s) scheduled for retest,\n\
                     no devices are binned now"
                );
                return verdict;
            }
            TesterMode::Check => {
                info!(
                    "device(s) scheduled for check,\n\
                     no devices are binned now"
                );
                return verdict;
            }
            TesterMode::Normal => {}
        }

        if let Err(v) = self.prepare_binning() {
            return v;
        }

        self.total_timer.restart();
        self.short_timer.restart();
        let bins = self.device_bins.clone();
        let success = match self.run_plugin_loop(DriverCall::Bin, &mut verdict, true, move |p| {
            p.bin_device(&bins)
        }) {
            Err(v) => return v,
            Ok(success) => success,
        };
        info!(
            "stopped binning device(s) after {:.1} seconds",
            self.total_timer.elapsed_secs()
        );

        if success {
            info!("binned device(s)");
            if !self.clear_site_setup() {
                verdict = Verdict::Error;
            }
        } else {
            error!("binning device(s) stopped unsuccessfully");
        }
        verdict
    }

    /// Reprobes the current devices, if possible.
    pub fn try_reprobe(&mut self, cause: ReprobeCause) -> Verdict {
        self.begin_operation();
        self.try_reprobe_inner(cause)
    }

    /// Waits for the equipment to start a new lot.
    pub fn lot_start(&mut self) -> Verdict {
        self.begin_operation();
        let mut verdict = Verdict::Pass;
        // A fresh lot gets a fresh automatic-retest budget.
        self.retest_attempts = 0;

        if !self.caps.supports(DriverCall::LotStart) {
            warn!("lot-start is not available for the current equipment driver");
            return verdict;
        }
        match self.run_plugin_loop(DriverCall::LotStart, &mut verdict, false, |p| p.lot_start()) {
            Err(v) => v,
            Ok(success) => {
                if success {
                    self.estate.set_lot_active(true);
                    info!("lot started");
                }
                verdict
            }
        }
    }

    /// Finishes the current lot at the equipment.
    pub fn lot_done(&mut self) -> Verdict {
        self.begin_operation();
        let mut verdict = Verdict::Pass;

        if !self.caps.supports(DriverCall::LotDone) {
            warn!("lot-done is not available for the current equipment driver");
            return verdict;
        }
        match self.run_plugin_loop(DriverCall::LotDone, &mut verdict, false, |p| p.lot_done()) {
            Err(v) => v,
            Ok(success) => {
                if success {
                    self.estate.set_lot_active(false);
                    info!("lot finished");
                }
                verdict
            }
        }
    }

    /// Queries the equipment identity.
    pub fn equipment_id(&mut self) -> (Verdict, Option<String>) {
        self.begin_operation();
        let mut verdict = Verdict::Pass;
        let mut ident = None;

        if !self.caps.supports(DriverCall::EquipId) {
            warn!("get-equipment-id is not available for the current equipment driver");
            return (verdict, None);
        }
        match self.run_plugin_loop(DriverCall::EquipId, &mut verdict, false, |p| {
            let (outcome, id) = p.equip_id();
            if id.is_some() {
                ident = id;
            }
            outcome
        }) {
            Err(v) => (v, None),
            Ok(_) => (verdict, ident),
        }
    }

    /// The reprobe work horse, shared by the explicit and implicit paths.
    fn try_reprobe_inner(&mut self, cause: ReprobeCause) -> Verdict {
        let mut verdict = Verdict::Pass;
        let implicit = cause != ReprobeCause::Explicit;

        if implicit && self.config.auto_reprobe == ReprobeMode::Off {
            warn!("reprobe is not performed due to the configured automatic reprobe mode");
            return verdict;
        }

        self.total_timer.restart();
        self.short_timer.restart();

        let success;
        if !implicit || self.config.auto_reprobe == ReprobeMode::All {
            // Reprobe everything; the site population the test system knows
            // about does not change.
            if !self.caps.supports(DriverCall::Reprobe) {
                warn!("reprobe is not available for the current equipment driver");
                return verdict;
            }

            let mut put_back_in_pause = false;
            if self.estate.equipment_paused() && self.caps.supports(DriverCall::Unpause) {
                if let Err(v) =
                    self.run_plugin_loop(DriverCall::Unpause, &mut verdict, false, |p| {
                        p.st_unpaused()
                    })
                {
                    return v;
                }
                put_back_in_pause = true;
            }

            success = match self
                .run_plugin_loop(DriverCall::Reprobe, &mut verdict, true, |p| p.reprobe())
            {
                Err(v) => return v,
                Ok(success) => success,
            };

            if put_back_in_pause && self.caps.supports(DriverCall::Pause) {
                if let Err(v) = self.run_plugin_loop(DriverCall::Pause, &mut verdict, false, |p| {
                    p.st_paused()
                }) {
                    return v;
                }
            }
        } else {
            // Implicit per-site reprobe: some devices are reprobed, the
            // rest are binned in the same exchange.
            if !self.caps.supports(DriverCall::BinReprobe) {
                warn!(
                    "reprobe with implicit binning is not available for the \
                     current equipment driver"
                );
                return verdict;
            }

            if let Err(v) = self.prepare_reprobe_binning() {
                return v;
            }
            let reprobe = self.device_reprobe.clone();
            let bins = self.device_bins.clone();
            success = match self.run_plugin_loop(
                DriverCall::BinReprobe,
                &mut verdict,
                true,
                move |p| p.bin_and_reprobe(&reprobe, &bins),
            ) {
                Err(v) => return v,
                Ok(success) => success,
            };
        }

        info!(
            "stopped reprobing device(s) after {:.1} seconds",
            self.total_timer.elapsed_secs()
        );

        if success {
            info!("reprobed device(s)");
            if !self.set_site_setup() {
                verdict = Verdict::Error;
            }
        } else if implicit {
            error!("reprobing device(s) stopped unsuccessfully, will enter pause");
            self.tester.set_flag(SystemFlag::Pause, 1);
        } else {
            error!("reprobing device(s) stopped unsuccessfully");
        }
        verdict
    }

    /// Runs one plugin call until the classification reports completion.
    ///
    /// `severe_binning` raises the severe panic prompt on a binning-failure
    /// outcome; `Err` carries a verdict demanding immediate return.
    fn run_plugin_loop(
        &mut self,
        call: DriverCall,
        verdict: &mut Verdict,
        severe_binning: bool,
        mut f: impl FnMut(&mut (dyn Plugin + Send)) -> CallOutcome,
    ) -> Result<bool, Verdict> {
        let mut flow = Flow::default();
        while !flow.completed && !flow.success {
            let outcome = f(self.plugin.as_mut());
            flow = self.handle_plugin_result(outcome, call, verdict);

            if severe_binning && outcome == CallOutcome::Binning {
                if self.panic_prompt("SEVERE ERROR WHICH MIGHT AFFECT DEVICE TEST QUALITY") {
                    return Err(Verdict::Error);
                }
            }
        }
        Ok(flow.success)
    }

    /// Switches to retest mode when devices were binned to the retest bin
    /// and automatic reprobe-on-retest is configured.
    fn refresh_tester_mode(&mut self) {
        if self.tester_mode != TesterMode::Normal {
            return;
        }
        if !self.config.auto_reprobe_on_retest {
            return;
        }
        if self.retest_attempts >= self.config.max_retest_count {
            self.retest_attempts = 0;
            return;
        }

        let map = self.bin_map.load_full();
        let Some(retest_slot) = map.lookup(BinCode::WILDCARD) else {
            return;
        };

        let usage = self.estate.site_usage();
        for site in 0..self.num_sites() {
            if !usage
                .get(site)
                .copied()
                .unwrap_or(SiteUsage::Empty)
                .holds_device()
            {
                continue;
            }
            let Ok(bin) = self.tester.site_bin(self.config.tester_site(site)) else {
                return;
            };
            let slot = match self.config.bin_mode {
                BinMode::Raw => bin.number,
                BinMode::HardMap => match map.lookup(BinCode(bin.number)) {
                    Some(slot) => slot,
                    None => return,
                },
                BinMode::SoftMap => match map.lookup(BinCode::from_text(&bin.code)) {
                    Some(slot) => slot,
                    None => return,
                },
            };
            if slot == retest_slot {
                info!(
                    "device(s) bin to the retest bin, scheduling automatic \
                     retest round {}",
                    self.retest_attempts + 1
                );
                self.tester_mode = TesterMode::Retest;
                self.retest_attempts += 1;
                break;
            }
        }
    }
}
