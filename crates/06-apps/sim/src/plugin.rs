//! Capability module for the simulated sorter family.
//!
//! A complete plugin: every logical operation is expressed as an ordered
//! list of transaction-protocol steps against the sorter's ASCII dialect,
//! so a re-entered call resumes exactly where its predecessor stopped.

use driver_abi::{
    CallOutcome, Capabilities, DriverCall, EquipHandle, Plugin, SiteUsage,
};
use link::{LinkSession, Timeouts};
use link_codecs::{
    srq, Ack, BinOn, BinReprobe, FullSites, FullSitesQuery, IdQuery, IdReply, Reprobe,
};
use log::debug;
use transact::{EquipSignal, StepError, StepResult, TransactionStack};

/// Simulated sorter capability module.
pub struct SimPlugin<L: LinkSession> {
    link: L,
    ta: TransactionStack<DriverCall>,
    estate: EquipHandle,
    num_sites: usize,
    ident: Option<String>,
    last_mask: u32,
}

impl<L: LinkSession> SimPlugin<L> {
    /// Creates the module over an open link session.
    pub fn new(link: L, estate: EquipHandle, timeouts: Timeouts) -> Self {
        let num_sites = estate.num_sites();
        let mut ta = TransactionStack::new(timeouts);
        // Unsolicited boundary and jam notifications can arrive in the
        // middle of any dialog.
        ta.on_interrupt(
            srq::LOT_DONE,
            Box::new(|_| Err(StepError::Signal(EquipSignal::LotDone))),
        );
        ta.on_interrupt(
            srq::LOT_STARTED,
            Box::new(|_| Err(StepError::Signal(EquipSignal::LotStarted))),
        );
        ta.on_interrupt(
            srq::JAM,
            Box::new(|_| Err(StepError::Signal(EquipSignal::Jammed))),
        );
        Self {
            link,
            ta,
            estate,
            num_sites,
            ident: None,
            last_mask: 0,
        }
    }

    /// Access to the transaction stack, for abort scheduling.
    pub fn transactions(&mut self) -> &mut TransactionStack<DriverCall> {
        &mut self.ta
    }

    fn enter(&mut self, call: DriverCall) -> Option<CallOutcome> {
        self.ta.set_call(call);
        if self.ta.ask_abort() {
            self.ta.stop();
            return Some(CallOutcome::Aborted);
        }
        self.ta.start();
        None
    }

    /// Maps a failed step onto the call-outcome vocabulary.
    ///
    /// Progress is kept for retryable and escalating conditions so the
    /// frame can resume the call; terminal conditions clear the context.
    fn leave(&mut self, err: StepError) -> CallOutcome {
        let outcome = CallOutcome::from_step(err, self.link.family());
        match outcome {
            CallOutcome::Waiting
            | CallOutcome::LinkFault(_)
            | CallOutcome::Answer => {}
            _ => self.ta.stop(),
        }
        outcome
    }

    fn done(&mut self) -> CallOutcome {
        self.ta.stop();
        CallOutcome::Ok
    }

    fn identity_dialog(&mut self) -> StepResult<String> {
        self.ta.send(&mut self.link, &IdQuery)?;
        let reply: IdReply = self.ta.receive(&mut self.link)?;
        Ok(reply.ident)
    }

    fn start_dialog(&mut self) -> StepResult<()> {
        self.ta.expect_interrupt(&mut self.link, &[srq::DEVICE_READY])?;
        self.ta.send(&mut self.link, &FullSitesQuery)?;
        let sites: FullSites = self.ta.receive(&mut self.link)?;
        self.last_mask = sites.mask;

        for site in 0..self.num_sites {
            let usage = if sites.is_full(site) {
                SiteUsage::Populated
            } else {
                SiteUsage::Empty
            };
            self.estate.set_site(site, usage);
        }
        debug!("sorter reports site mask 0x{:08x}", sites.mask);
        Ok(())
    }

    fn bin_dialog(&mut self, bins: &[i64]) -> StepResult<()> {
        self.ta.send(
            &mut self.link,
            &BinOn {
                slots: bins.to_vec(),
            },
        )?;
        let _: Ack = self.ta.receive(&mut self.link)?;
        self.ta.expect_interrupt(&mut self.link, &[srq::BIN_DONE])?;

        for site in 0..self.num_sites {
            self.estate.set_site(site, SiteUsage::Empty);
        }
        Ok(())
    }

    fn reprobe_dialog(&mut self) -> StepResult<()> {
        self.ta.send(&mut self.link, &Reprobe)?;
        let _: Ack = self.ta.receive(&mut self.link)?;
        self.ta.expect_interrupt(&mut self.link, &[srq::DEVICE_READY])?;
        Ok(())
    }

    fn bin_reprobe_dialog(&mut self, reprobe: &[bool], bins: &[i64]) -> StepResult<()> {
        self.ta.send(
            &mut self.link,
            &BinReprobe {
                reprobe: reprobe.to_vec(),
                slots: bins.to_vec(),
            },
        )?;
        let _: Ack = self.ta.receive(&mut self.link)?;
        self.ta.expect_interrupt(&mut self.link, &[srq::DEVICE_READY])?;

        for site in 0..self.num_sites {
            if !reprobe.get(site).copied().unwrap_or(false) {
                self.estate.set_site(site, SiteUsage::Empty);
            }
        }
        Ok(())
    }

    fn lot_start_dialog(&mut self) -> StepResult<()> {
        self.ta.expect_interrupt(&mut self.link, &[srq::LOT_STARTED])?;
        Ok(())
    }

    fn lot_done_dialog(&mut self) -> StepResult<()> {
        // Drain a possibly pending late interrupt; none arriving is fine.
        self.ta.poll_interrupt(&mut self.link)?;
        for site in 0..self.num_sites {
            self.estate.set_site(site, SiteUsage::Empty);
        }
        Ok(())
    }
}

impl<L: LinkSession + Send> Plugin for SimPlugin<L> {
    fn capabilities(&self) -> Capabilities {
        [
            DriverCall::Init,
            DriverCall::Start,
            DriverCall::Bin,
            DriverCall::Reprobe,
            DriverCall::BinReprobe,
            DriverCall::Pause,
            DriverCall::Unpause,
            DriverCall::EquipId,
            DriverCall::Diag,
            DriverCall::LotStart,
            DriverCall::LotDone,
        ]
        .into_iter()
        .collect()
    }

    fn init(&mut self) -> CallOutcome {
        if let Some(outcome) = self.enter(DriverCall::Init) {
            return outcome;
        }
        match self.identity_dialog() {
            Ok(ident) => {
                self.ident = Some(ident);
                self.done()
            }
            Err(err) => self.leave(err),
        }
    }

    fn device_start(&mut self) -> CallOutcome {
        if let Some(outcome) = self.enter(DriverCall::Start) {
            return outcome;
        }
        match self.start_dialog() {
            Ok(()) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn bin_device(&mut self, bins: &[i64]) -> CallOutcome {
        if bins.len() != self.num_sites {
            return CallOutcome::Binning;
        }
        if let Some(outcome) = self.enter(DriverCall::Bin) {
            return outcome;
        }
        match self.bin_dialog(bins) {
            Ok(()) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn reprobe(&mut self) -> CallOutcome {
        if let Some(outcome) = self.enter(DriverCall::Reprobe) {
            return outcome;
        }
        match self.reprobe_dialog() {
            Ok(()) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn bin_and_reprobe(&mut self, reprobe: &[bool], bins: &[i64]) -> CallOutcome {
        if bins.len() != self.num_sites || reprobe.len() != self.num_sites {
            return CallOutcome::Binning;
        }
        if let Some(outcome) = self.enter(DriverCall::BinReprobe) {
            return outcome;
        }
        match self.bin_reprobe_dialog(reprobe, bins) {
            Ok(()) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn st_paused(&mut self) -> CallOutcome {
        self.estate.set_equipment_paused(true);
        CallOutcome::Ok
    }

    fn st_unpaused(&mut self) -> CallOutcome {
        self.estate.set_equipment_paused(false);
        CallOutcome::Ok
    }

    fn lot_start(&mut self) -> CallOutcome {
        if let Some(outcome) = self.enter(DriverCall::LotStart) {
            return outcome;
        }
        match self.lot_start_dialog() {
            Ok(()) => self.done(),
            Err(StepError::Signal(EquipSignal::LotStarted)) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn lot_done(&mut self) -> CallOutcome {
        if let Some(outcome) = self.enter(DriverCall::LotDone) {
            return outcome;
        }
        match self.lot_done_dialog() {
            Ok(()) => self.done(),
            Err(err) => self.leave(err),
        }
    }

    fn equip_id(&mut self) -> (CallOutcome, Option<String>) {
        if let Some(outcome) = self.enter(DriverCall::EquipId) {
            return (outcome, None);
        }
        match self.identity_dialog() {
            Ok(ident) => {
                self.ident = Some(ident.clone());
                (self.done(), Some(ident))
            }
            Err(err) => (self.leave(err), None),
        }
    }

    fn diag(&mut self) -> Option<String> {
        Some(format!(
            "simulated sorter {}, last site mask 0x{:08x}",
            self.ident.as_deref().unwrap_or("(not identified)"),
            self.last_mask
        ))
    }
}
