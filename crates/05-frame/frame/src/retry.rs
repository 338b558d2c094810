//! Plugin-call outcome classification.
//!
//! The single point where a capability-module outcome is turned into
//! `(completed, success, verdict)`. No other component invents a
//! caller-visible verdict.

use driver_abi::{CallOutcome, DriverCall, LinkFamily, SystemFlag, Verdict};
use log::{error, info};

use crate::session::DriverSession;

/// Loop state derived from one classified plugin outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Flow {
    /// The logical call is finished (successfully or not) or was aborted.
    pub completed: bool,
    /// The call (or its exception handling) succeeded.
    pub success: bool,
}

/// Result of one problem-handler round, mirroring the operator-event
/// vocabulary: nothing happened, keep going, call handled, or abort with a
/// proposed verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProblemResult {
    Void,
    Continue,
    Handled,
    Abort(Verdict),
}

impl DriverSession {
    /// Classifies one plugin outcome and updates the proposed verdict.
    pub(crate) fn handle_plugin_result(
        &mut self,
        outcome: CallOutcome,
        call: DriverCall,
        verdict: &mut Verdict,
    ) -> Flow {
        let mut flow = Flow::default();

        match outcome {
            CallOutcome::Ok => {
                flow.completed = true;
                flow.success = true;
            }
            CallOutcome::Jam => {
                info!(
                    "equipment has reported a jam during execution of {}",
                    call.name()
                );
                *verdict = Verdict::Jam;
                flow.completed = true;
            }
            CallOutcome::LotStart => {
                info!(
                    "equipment has reported lot start during execution of {}",
                    call.name()
                );
                if call != DriverCall::LotStart {
                    *verdict = Verdict::LotStart;
                }
                flow.completed = true;
            }
            CallOutcome::LotDone => {
                info!(
                    "equipment has reported lot end during execution of {}",
                    call.name()
                );
                if call != DriverCall::LotDone {
                    *verdict = Verdict::LotDone;
                }
                flow.completed = true;
            }
            CallOutcome::DeviceStart => {
                info!(
                    "equipment has reported device start during execution of {}",
                    call.name()
                );
                if call != DriverCall::Start {
                    *verdict = Verdict::DeviceStart;
                }
                flow.completed = true;
            }
            CallOutcome::NotInit
            | CallOutcome::InvalidHandle
            | CallOutcome::NotApplicable
            | CallOutcome::Memory => {
                error!(
                    "potential internal error of the equipment driver framework.\n\
                     plugin call could not be completed, outcome {outcome:?} during {}\n\
                     giving up",
                    call.name()
                );
                *verdict = Verdict::Error;
                flow.completed = true;
            }
            CallOutcome::Config | CallOutcome::Binning => {
                error!("{} plugin call failed", call.name());
                flow.completed = true;
            }
            CallOutcome::Waiting => {
                match self.waiting_handler(call) {
                    ProblemResult::Void | ProblemResult::Continue => {
                        // go on waiting
                    }
                    ProblemResult::Abort(proposed) => {
                        *verdict = proposed;
                        flow.completed = true;
                    }
                    ProblemResult::Handled => {
                        flow.completed = true;
                        flow.success = true;
                    }
                }
            }
            CallOutcome::LinkFault(family) => {
                if family == LinkFamily::Lan {
                    // A broken LAN attachment cannot be recovered in place.
                    self.tester.set_flag(SystemFlag::Abort, 1);
                }
                match self.interface_problem(call) {
                    ProblemResult::Void => {
                        // fatal, nobody handled the interface fault
                        *verdict = Verdict::Error;
                        flow.completed = true;
                    }
                    ProblemResult::Abort(proposed) => {
                        *verdict = proposed;
                        flow.completed = true;
                    }
                    ProblemResult::Continue | ProblemResult::Handled => {
                        // solved, but the plugin call still has to finish
                    }
                }
            }
            CallOutcome::Aborted => {
                error!("{} was aborted", call.name());
                flow.completed = true;
                self.tester.set_flag(SystemFlag::Abort, 1);
            }
            CallOutcome::Answer => {
                error!(
                    "{} plugin call received an unexpected answer from the equipment",
                    call.name()
                );
                match self.answer_problem(call) {
                    ProblemResult::Void | ProblemResult::Abort(_) => {
                        *verdict = Verdict::Error;
                        flow.completed = true;
                    }
                    ProblemResult::Continue | ProblemResult::Handled => {
                        // solved, but the plugin call still has to finish
                    }
                }
            }
            CallOutcome::Fatal => {
                error!(
                    "plugin call {} ended in a fatal situation, giving up",
                    call.name()
                );
                *verdict = Verdict::Error;
                flow.completed = true;
            }
        }

        // With the diagnose window disabled the driver must never block the
        // test flow; the documented trade-off is a pass verdict even for
        // unresolved conditions.
        if !self.config.enable_diagnose_window {
            *verdict = Verdict::Pass;
        }

        flow
    }
}
