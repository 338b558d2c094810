//! Flag and per-site value interface towards the calling test system.
//!
//! The driver treats these named flags as the single source of truth for
//! "what just happened" and "what should happen next"; the test system (or
//! an operator process) may set them from outside at any time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Named boolean/long flags shared with the test system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum SystemFlag {
    /// Abort the current operation and the test program.
    Abort,
    /// Quit the test program at the next opportunity.
    Quit,
    /// Pause was requested.
    Pause,
    /// Reset was requested.
    Reset,
}

/// Tester-assigned bin identity for one site.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiteBin {
    /// Numeric bin, −1 meaning "retest".
    pub number: i64,
    /// Short text bin code (soft bin), may be empty.
    pub code: String,
}

/// Failure to read a per-site value from the test system.
#[derive(Debug, thiserror::Error)]
#[error("tester value for site {site} unavailable")]
pub struct TcomError {
    /// Tester site number whose value could not be read.
    pub site: i64,
}

/// Interface to the test system's flag and per-site value store.
pub trait TesterBridge: Send + Sync {
    /// Reads a named flag (0 = clear).
    fn flag(&self, flag: SystemFlag) -> i64;

    /// Writes a named flag.
    fn set_flag(&self, flag: SystemFlag, value: i64);

    /// Pass/fail result the test system recorded for a tester site.
    fn site_passed(&self, site: i64) -> Result<bool, TcomError>;

    /// Bin identity the test system assigned to a tester site.
    fn site_bin(&self, site: i64) -> Result<SiteBin, TcomError>;

    /// Whether the test system asks for a reprobe of a tester site.
    fn site_reprobe(&self, site: i64) -> Result<bool, TcomError>;

    /// Tells the test system whether a device is inserted at a tester site.
    fn set_site_inserted(&self, site: i64, inserted: bool);
}

/// Shared handle to the tester bridge.
pub type TesterHandle = Arc<dyn TesterBridge>;

#[derive(Debug, Default)]
struct FlagStore {
    flags: HashMap<SystemFlag, i64>,
    passed: HashMap<i64, bool>,
    bins: HashMap<i64, SiteBin>,
    reprobe: HashMap<i64, bool>,
    inserted: HashMap<i64, bool>,
}

/// In-process implementation of [`TesterBridge`].
///
/// Used by the simulator, the CLI and the tests; a production deployment
/// bridges to the test executive instead.
#[derive(Debug, Default)]
pub struct SharedFlags {
    store: Mutex<FlagStore>,
}

impl SharedFlags {
    /// Creates an empty flag store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Primes the pass/fail result for a tester site.
    pub fn stage_site_passed(&self, site: i64, passed: bool) {
        self.store.lock().passed.insert(site, passed);
    }

    /// Primes the bin identity for a tester site.
    pub fn stage_site_bin(&self, site: i64, number: i64, code: &str) {
        self.store.lock().bins.insert(
            site,
            SiteBin {
                number,
                code: code.to_owned(),
            },
        );
    }

    /// Primes the reprobe request for a tester site.
    pub fn stage_site_reprobe(&self, site: i64, reprobe: bool) {
        self.store.lock().reprobe.insert(site, reprobe);
    }

    /// Removes all per-site values, keeping the named flags.
    pub fn clear_site_data(&self) {
        let mut store = self.store.lock();
        store.passed.clear();
        store.bins.clear();
        store.reprobe.clear();
    }

    /// Reads back the inserted state last announced for a site.
    pub fn site_inserted(&self, site: i64) -> bool {
        self.store.lock().inserted.get(&site).copied().unwrap_or(false)
    }
}

impl TesterBridge for SharedFlags {
    fn flag(&self, flag: SystemFlag) -> i64 {
        self.store.lock().flags.get(&flag).copied().unwrap_or(0)
    }

    fn set_flag(&self, flag: SystemFlag, value: i64) {
        self.store.lock().flags.insert(flag, value);
    }

    fn site_passed(&self, site: i64) -> Result<bool, TcomError> {
        self.store
            .lock()
            .passed
            .get(&site)
            .copied()
            .ok_or(TcomError { site })
    }

    fn site_bin(&self, site: i64) -> Result<SiteBin, TcomError> {
        self.store
            .lock()
            .bins
            .get(&site)
            .cloned()
            .ok_or(TcomError { site })
    }

    fn site_reprobe(&self, site: i64) -> Result<bool, TcomError> {
        self.store
            .lock()
            .reprobe
            .get(&site)
            .copied()
            .ok_or(TcomError { site })
    }

    fn set_site_inserted(&self, site: i64, inserted: bool) {
        self.store.lock().inserted.insert(site, inserted);
    }
}
