//! Panic-class condition handling.
//!
//! A panic means the driver cannot determine a required value at all (no
//! wildcard mapping when one is needed, inconsistent site table, unreadable
//! tester value). The operator decides between dumping state, continuing,
//! or quitting; with the diagnose window disabled the driver logs at the
//! highest severity and proceeds as if CONTINUE had been chosen, so
//! unattended equipment is never blocked.

use driver_abi::{DialogRequest, SystemFlag, BUTTON_CONTINUE, BUTTON_QUIT};
use log::{debug, error, info};

use crate::session::DriverSession;

/// Dialog position of the dump-trace button.
const BUTTON_DUMP: u8 = 7;

impl DriverSession {
    /// Raises a panic prompt.
    ///
    /// Returns true when the current operation must stop (operator chose
    /// QUIT); the abort flag is set in that case.
    pub(crate) fn panic_prompt(&mut self, message: &str) -> bool {
        error!("PANIC!\n\n{message}\n\nPlease read the error report above for more information");

        if !self.config.enable_diagnose_window {
            error!("equipment driver PANIC, proceeding as CONTINUE (diagnose window disabled)");
            return false;
        }

        let mut was_dumped = false;
        loop {
            let mut text = format!(
                "Equipment driver PANIC:\n\
                 \n\
                 {message}\n\
                 \n\
                 Please read the error report in the report window for more information\n\
                 \n\
                 Do you want to...\n"
            );
            if !was_dumped {
                text.push_str("DUMP the driver's internal state for later analysis,\n");
            }
            text.push_str(
                "QUIT the testprogram now, or try to\n\
                 CONTINUE the testprogram ?",
            );

            let mut request = DialogRequest::new("Equipment driver PANIC", text)
                .button(BUTTON_QUIT, "QUIT")
                .button(BUTTON_CONTINUE, "CONTINUE");
            if !was_dumped {
                request = request.button(BUTTON_DUMP, "DUMP");
            }

            match self.operator.show(&request, None) {
                Some(reply) if reply.button == BUTTON_DUMP && !was_dumped => {
                    self.dump_state();
                    was_dumped = true;
                }
                Some(reply) if reply.button == BUTTON_QUIT => {
                    self.tester.set_flag(SystemFlag::Abort, 1);
                    return true;
                }
                Some(_) => return false,
                None => {
                    // No front end answered; same safe default as the
                    // disabled diagnose window.
                    error!("panic prompt unanswered, proceeding as CONTINUE");
                    return false;
                }
            }
        }
    }

    /// Writes a state snapshot into the log for later analysis.
    fn dump_state(&self) {
        info!("dumping driver state on operator request");
        debug!(
            "tester mode {:?}, skip mode {:?}, retest attempts {}",
            self.tester_mode, self.skip_mode, self.retest_attempts
        );
        debug!(
            "site usage {:?}, bins {:?}, passed {:?}, reprobe {:?}",
            self.estate.site_usage(),
            self.device_bins,
            self.device_passed,
            self.device_reprobe
        );
        debug!(
            "bin map: {} entries for {} equipment bins",
            self.bin_map.load().len(),
            self.bin_map.load().capacity()
        );
    }
}
