//! Per-site bin resolution.
//!
//! Once per "device done" cycle every site gets a determinate destination
//! bin and pass flag; "unresolved" (−1) always means "send to the
//! equipment's own default retest position", never "leave the unit
//! unclassified". Resolution failures are counted and surfaced as one
//! aggregated panic after the per-site pass.

use binmap::{BinCode, BinMap};
use driver_abi::{SiteUsage, Verdict};
use log::{debug, error, info, warn};

use crate::config::BinMode;
use crate::session::{DriverSession, SkipMode};

impl DriverSession {
    /// Resolves destination bin and pass flag for every site.
    pub(crate) fn prepare_binning(&mut self) -> Result<(), Verdict> {
        let skip = self.skip_mode;
        let usage = self.estate.site_usage();
        let map = self.bin_map.load_full();
        let mut panics = 0u32;

        for site in 0..self.num_sites() {
            let site_usage = usage.get(site).copied().unwrap_or(SiteUsage::Empty);
            if !self.prepare_bin_one_site(site, skip, site_usage, &map, &mut panics) {
                return Err(Verdict::Error);
            }
        }

        self.aggregated_bin_panic(panics)
    }

    /// Resolves reprobe requests, binning the sites that are not reprobed.
    pub(crate) fn prepare_reprobe_binning(&mut self) -> Result<(), Verdict> {
        let skip = self.skip_mode;
        let usage = self.estate.site_usage();
        let map = self.bin_map.load_full();
        let mut panics = 0u32;

        for site in 0..self.num_sites() {
            let site_usage = usage.get(site).copied().unwrap_or(SiteUsage::Empty);
            if !self.prepare_reprobe_one_site(site, skip, site_usage) {
                return Err(Verdict::Error);
            }
            if !self.device_reprobe[site] {
                if !self.prepare_bin_one_site(site, skip, site_usage, &map, &mut panics) {
                    return Err(Verdict::Error);
                }
            }
        }

        self.aggregated_bin_panic(panics)
    }

    fn aggregated_bin_panic(&mut self, panics: u32) -> Result<(), Verdict> {
        if panics > 0
            && self.panic_prompt(
                "Couldn't determine the correct equipment bin for device(s).\n\
                 On CONTINUE the devices are sent to the equipment's default\n\
                 retest position, if existent.\n\
                 This operation may fail and another panic message would show up",
            )
        {
            return Err(Verdict::Error);
        }
        Ok(())
    }

    /// Resolves one site. Returns false when a panic prompt asked to stop.
    fn prepare_bin_one_site(
        &mut self,
        site: usize,
        skip: SkipMode,
        usage: SiteUsage,
        map: &BinMap,
        panics: &mut u32,
    ) -> bool {
        let tester_site = self.config.tester_site(site);

        if self.config.dont_trust_binning {
            self.device_bins[site] = -1;
            self.device_passed[site] = true;
        } else if !usage.holds_device() {
            self.device_bins[site] = -1;
            self.device_passed[site] = true;
        } else if skip.current_tested() {
            let passed = match self.tester.site_passed(tester_site) {
                Ok(passed) => passed,
                Err(_) => {
                    if self.panic_prompt(
                        "couldn't get the pass/fail result from the test system, \
                         assuming 'passed'",
                    ) {
                        return false;
                    }
                    true
                }
            };
            self.device_passed[site] = passed;

            match self.config.bin_mode {
                BinMode::Raw | BinMode::HardMap => {
                    let number = match self.tester.site_bin(tester_site) {
                        Ok(bin) => bin.number,
                        Err(_) => {
                            if self.panic_prompt(
                                "couldn't get the bin number from the test system, \
                                 assuming '-1'",
                            ) {
                                return false;
                            }
                            -1
                        }
                    };

                    if self.config.bin_mode == BinMode::Raw {
                        if number != -1 {
                            // The tester bin number is the equipment bin.
                            self.device_bins[site] = number;
                        } else if self.config.handler_retest_bins.is_empty() {
                            self.device_bins[site] = -1;
                        } else {
                            match map.lookup(BinCode::WILDCARD) {
                                Some(slot) => self.device_bins[site] = slot,
                                None => {
                                    error!(
                                        "the tester retest bin cannot be remapped \
                                         to an equipment bin"
                                    );
                                    *panics += 1;
                                    self.device_bins[site] = -1;
                                }
                            }
                        }
                    } else {
                        self.remap(
                            site,
                            BinCode(number),
                            &format!("tester bin number {number}"),
                            map,
                            panics,
                        );
                    }
                }
                BinMode::SoftMap => {
                    let code = match self.tester.site_bin(tester_site) {
                        Ok(bin) => bin.code,
                        Err(_) => {
                            if self.panic_prompt(
                                "couldn't get the bin code from the test system, trying 'db'",
                            ) {
                                return false;
                            }
                            "db".to_owned()
                        }
                    };
                    self.remap(
                        site,
                        BinCode::from_text(&code),
                        &format!("tester bin code \"{code}\""),
                        map,
                        panics,
                    );
                }
            }
        } else {
            // The current devices were skipped: no test data exists, send
            // them to the retest bin and report pass.
            self.device_passed[site] = true;
            match map.lookup(BinCode::WILDCARD) {
                Some(slot) => {
                    info!(
                        "the device at site \"{}\" was not tested (skipped), \
                         binning to the configured retest bin",
                        self.config.site_name(site)
                    );
                    self.device_bins[site] = slot;
                }
                None => {
                    error!(
                        "the device at site \"{}\" was not tested (skipped) \
                         and retest bins were not configured",
                        self.config.site_name(site)
                    );
                    *panics += 1;
                    self.device_bins[site] = -1;
                }
            }
        }

        self.log_bin_data_of_site(site, usage);
        true
    }

    /// Looks up a mapped bin, falling back to the wildcard with a warning.
    fn remap(&mut self, site: usize, code: BinCode, what: &str, map: &BinMap, panics: &mut u32) {
        match map.lookup(code) {
            Some(slot) => self.device_bins[site] = slot,
            None => match map.lookup(BinCode::WILDCARD) {
                Some(slot) => {
                    warn!(
                        "{what} of the current device not found in the bin mapping.\n\
                         Trying to bin to the configured retest bin."
                    );
                    self.device_bins[site] = slot;
                }
                None => {
                    error!(
                        "{what} of the current device not found in the bin mapping\n\
                         and retest bins were not configured"
                    );
                    *panics += 1;
                    self.device_bins[site] = -1;
                }
            },
        }
    }

    /// Resolves the reprobe request of one site.
    fn prepare_reprobe_one_site(&mut self, site: usize, skip: SkipMode, usage: SiteUsage) -> bool {
        let tester_site = self.config.tester_site(site);

        if self.config.dont_trust_binning || !usage.holds_device() {
            self.device_reprobe[site] = false;
        } else if skip.current_tested() {
            self.device_reprobe[site] = match self.tester.site_reprobe(tester_site) {
                Ok(reprobe) => reprobe,
                Err(_) => {
                    if self.panic_prompt(
                        "couldn't get the reprobe flag from the test system, \
                         assuming 'don't reprobe'",
                    ) {
                        return false;
                    }
                    false
                }
            };
        } else {
            // Skipped devices are never reprobed.
            self.device_reprobe[site] = false;
        }

        self.log_reprobe_data_of_site(site, usage);
        true
    }

    fn log_bin_data_of_site(&self, site: usize, usage: SiteUsage) {
        let name = self.config.site_name(site);
        let tester_site = self.config.tester_site(site);

        if !usage.holds_device() {
            debug!(
                "equipment site \"{name}\" (tester site {tester_site}) \
                 currently not used, not binned"
            );
            return;
        }

        let bin = self.device_bins[site];
        let ids = &self.config.handler_bin_ids;
        if bin >= 0 && !ids.is_empty() && bin as usize >= ids.len() {
            warn!(
                "bin number {bin} is out of range for the configured equipment bin ids\n\
                 Will try to pass the bin number to the equipment anyway"
            );
        }
        match ids.get(bin.max(0) as usize) {
            Some(id) if bin >= 0 => debug!(
                "will bin device at equipment site \"{name}\" \
                 (tester site {tester_site}) to equipment bin \"{id}\""
            ),
            _ => debug!(
                "will bin device at equipment site \"{name}\" \
                 (tester site {tester_site}) to equipment bin {bin}"
            ),
        }
    }

    fn log_reprobe_data_of_site(&self, site: usize, usage: SiteUsage) {
        let name = self.config.site_name(site);
        let tester_site = self.config.tester_site(site);

        if !usage.holds_device() {
            debug!(
                "equipment site \"{name}\" (tester site {tester_site}) \
                 currently not used, not reprobed"
            );
            return;
        }

        debug!(
            "will {} device at equipment site \"{name}\" (tester site {tester_site})",
            if self.device_reprobe[site] {
                "reprobe"
            } else {
                "not reprobe"
            }
        );
    }
}
