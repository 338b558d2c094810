//! Wait/escalation policy and the operator-facing problem handlers.
//!
//! Retryable conditions stay silent below the configured timeout; above it
//! the per-call-class action decides between waiting on, skipping, or asking
//! the operator. Abort/reset/quit flags set from outside override everything
//! at the top of every round.

use driver_abi::{
    DialogReply, DialogRequest, DriverCall, SystemFlag, Verdict, BUTTON_CONTINUE, BUTTON_QUIT,
};
use log::{debug, info, warn};

use crate::config::EscalationAction;
use crate::retry::ProblemResult;
use crate::session::DriverSession;

impl DriverSession {
    /// Handles one "still waiting" round of the current call.
    pub(crate) fn waiting_handler(&mut self, call: DriverCall) -> ProblemResult {
        debug!("waiting for operation to complete, heartbeat timeout");

        if self.operator_wants_stop() {
            info!("aborting current operation due to set system flags");
            return ProblemResult::Abort(Verdict::Pass);
        }

        let total_elapsed = self.total_timer.elapsed_secs();
        let short_elapsed = self.short_timer.elapsed_secs();

        let policy = self.config.escalation.class(call.class());
        let pause = self.tester.flag(SystemFlag::Pause) != 0;
        let pause_triggered = pause && !self.initial_pause;
        let timed_out = pause_triggered || short_elapsed > policy.timeout_secs;
        if !timed_out {
            return ProblemResult::Void;
        }

        let mut result = if pause {
            // An operator pause always surfaces the question.
            self.timeout_dialog(call, total_elapsed)
        } else {
            match policy.action {
                EscalationAction::Continue => ProblemResult::Void,
                EscalationAction::Skip => ProblemResult::Handled,
                EscalationAction::AskOperator => self.timeout_dialog(call, total_elapsed),
            }
        };

        // The operator may have set the abort flag while the dialog was up.
        if self.tester.flag(SystemFlag::Abort) != 0 {
            result = ProblemResult::Abort(Verdict::Pass);
            return result;
        }

        // Consume a pause raised during the wait, so the pause actions do
        // not additionally run in the test cell client.
        if pause_triggered {
            self.tester.set_flag(SystemFlag::Pause, 0);
        }

        self.short_timer.restart();
        result
    }

    /// Handles a hard interface fault of the current call.
    pub(crate) fn interface_problem(&mut self, call: DriverCall) -> ProblemResult {
        if self.operator_wants_stop() {
            info!("aborting current operation due to set system flags");
            return ProblemResult::Abort(Verdict::Pass);
        }

        let result = self.problem_dialog(
            "Equipment driver: Interface Error",
            call,
            false,
        );

        if self.tester.flag(SystemFlag::Abort) != 0 {
            return ProblemResult::Abort(Verdict::Pass);
        }
        result
    }

    /// Handles an unexpected-answer condition of the current call.
    pub(crate) fn answer_problem(&mut self, call: DriverCall) -> ProblemResult {
        if self.operator_wants_stop() {
            info!("aborting current operation due to set system flags");
            return ProblemResult::Abort(Verdict::Pass);
        }

        let result = self.problem_dialog(
            "Equipment driver: Answer not understood",
            call,
            true,
        );

        if self.tester.flag(SystemFlag::Abort) != 0 {
            return ProblemResult::Abort(Verdict::Pass);
        }
        result
    }

    /// Poses the keep-waiting/quit question after a timeout.
    fn timeout_dialog(&mut self, call: DriverCall, total_elapsed: f64) -> ProblemResult {
        if !self.config.enable_diagnose_window {
            warn!(
                "the {} operation has not completed after {total_elapsed:.0} seconds; \
                 waiting on (diagnose window disabled)",
                call.name()
            );
            return ProblemResult::Void;
        }

        let message = format!(
            "The \"{}\" operation has not yet been completed.\n\
             \n\
             Please choose one of the following options...\n\
             \n\
             KEEP WAITING... to carry on waiting for the operation to finish\n\
             QUIT... to quit the test program\n",
            call.name()
        );
        let request = DialogRequest::new("Equipment driver: Timeout", message)
            .button(BUTTON_QUIT, "QUIT")
            .button(BUTTON_CONTINUE, "KEEP WAITING");
        info!(
            "Event Handling Dialog: Timeout, the {} operation has not yet been completed",
            call.name()
        );

        match self.operator.show(&request, None) {
            Some(DialogReply { button, .. }) if button == BUTTON_QUIT => {
                info!("operator pressed QUIT");
                // Accept the quit, but propose a pass verdict so the test
                // cell client does not raise an additional error.
                self.tester.set_flag(SystemFlag::Quit, 1);
                ProblemResult::Abort(Verdict::Pass)
            }
            Some(_) => ProblemResult::Continue,
            None => ProblemResult::Void,
        }
    }

    /// Poses the interface/answer problem dialog.
    ///
    /// Answer problems only offer QUIT; an operator cannot sensibly wait
    /// out a protocol mismatch.
    fn problem_dialog(&mut self, title: &str, call: DriverCall, quit_only: bool) -> ProblemResult {
        if !self.config.enable_diagnose_window {
            warn!(
                "{title}: the {} operation failed; diagnose window disabled, \
                 failing the call",
                call.name()
            );
            return ProblemResult::Void;
        }

        let diagnostics = match self.plugin.diag() {
            Some(text) if !text.is_empty() => text,
            _ => "<not available>".to_owned(),
        };

        let mut message = format!(
            "The \"{}\" operation has not yet been completed.\n",
            call.name()
        );
        if !quit_only {
            message.push_str(
                "\nPlease choose one of the following options...\n\
                 \n\
                 KEEP WAITING... to carry on waiting for the operation to finish\n",
            );
        }
        message.push_str("QUIT... to quit the test program\n");
        message.push_str(&format!("\nDiagnostics:\n{diagnostics}\n"));

        let mut request = DialogRequest::new(title, message).button(BUTTON_QUIT, "QUIT");
        if !quit_only {
            request = request.button(BUTTON_CONTINUE, "KEEP WAITING");
        }
        info!("Event Handling Dialog: {title} during {}", call.name());

        match self.operator.show(&request, None) {
            Some(DialogReply { button, .. }) if button == BUTTON_QUIT => {
                info!("operator pressed QUIT");
                self.tester.set_flag(SystemFlag::Quit, 1);
                ProblemResult::Abort(Verdict::Pass)
            }
            Some(_) if !quit_only => ProblemResult::Continue,
            Some(_) => ProblemResult::Void,
            None => ProblemResult::Void,
        }
    }
}
