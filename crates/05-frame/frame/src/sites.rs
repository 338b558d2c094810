//! Site-setup bookkeeping towards the test system.

use driver_abi::SiteUsage;
use log::debug;

use crate::session::DriverSession;

impl DriverSession {
    /// Announces the stored site population to the test system.
    ///
    /// Returns false when the site table is inconsistent and the operator
    /// asked to stop.
    pub(crate) fn set_site_setup(&mut self) -> bool {
        let usage = self.estate.site_usage();
        if usage.len() != self.num_sites()
            && self.panic_prompt("the driver's internal site control is inconsistent")
        {
            return false;
        }

        for site in 0..self.num_sites() {
            let site_usage = usage.get(site).copied().unwrap_or(SiteUsage::Empty);
            let tester_site = self.config.tester_site(site);
            let name = self.config.site_name(site);
            if site_usage.holds_device() {
                self.tester.set_site_inserted(tester_site, true);
                debug!("equipment site \"{name}\" (tester site {tester_site}) populated");
            } else {
                self.tester.set_site_inserted(tester_site, false);
                debug!("equipment site \"{name}\" (tester site {tester_site}) currently not used");
            }
        }
        true
    }

    /// Marks every site as not inserted once binning is confirmed.
    pub(crate) fn clear_site_setup(&mut self) -> bool {
        for site in 0..self.num_sites() {
            self.tester
                .set_site_inserted(self.config.tester_site(site), false);
        }
        true
    }
}
