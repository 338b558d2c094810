//! Driver configuration surface.
//!
//! The configuration grammar and file handling live outside the core; this
//! module consumes an already-deserialized value and turns the bin-mapping
//! tables into an installable [`BinMap`].

use binmap::{BinCode, BinMap, BinMapError};
use driver_abi::CallClass;
use log::debug;
use serde::Deserialize;

/// How tester bin identities translate into equipment bins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum BinMode {
    /// Tester hardbin numbers go to the equipment unchanged; only the
    /// retest bin −1 is remapped.
    #[default]
    #[serde(rename = "default")]
    Raw,
    /// Tester hardbin numbers run through the hardbin map.
    #[serde(rename = "mapped-hardbins")]
    HardMap,
    /// Tester softbin text codes run through the softbin map.
    #[serde(rename = "mapped-softbins")]
    SoftMap,
}

/// Automatic reprobe behavior for implicit reprobe requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReprobeMode {
    /// Implicit reprobes are not performed.
    #[default]
    Off,
    /// All current devices are reprobed.
    All,
    /// Only devices flagged by the test system are reprobed; the rest are
    /// binned in the same exchange.
    PerSite,
}

/// What to do when a call-class timeout fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationAction {
    /// Keep waiting without involving the operator.
    Continue,
    /// Pose the keep-waiting/quit question to the operator.
    #[default]
    AskOperator,
    /// Treat the call as completed and move on.
    Skip,
}

/// Timeout threshold and escalation action for one call class.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ClassPolicy {
    /// Seconds of no progress before the policy fires.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Action taken when the timeout fires.
    #[serde(default)]
    pub action: EscalationAction,
}

fn default_timeout_secs() -> f64 {
    120.0
}

impl Default for ClassPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            action: EscalationAction::default(),
        }
    }
}

/// Per-class wait/escalation configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct EscalationConfig {
    /// Lot-level operations (equipment setup, lot boundaries).
    #[serde(default)]
    pub lot: ClassPolicy,
    /// Device-level operations (start, bin, reprobe).
    #[serde(default)]
    pub device: ClassPolicy,
    /// Everything else.
    #[serde(default)]
    pub general: ClassPolicy,
}

impl EscalationConfig {
    /// Policy for the given call class.
    pub fn class(&self, class: CallClass) -> ClassPolicy {
        match class {
            CallClass::Lot => self.lot,
            CallClass::Device => self.device,
            CallClass::General => self.general,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retest_count() -> u32 {
    1
}

/// Complete configuration consumed by the driver session.
#[derive(Clone, Debug, Deserialize)]
pub struct DriverConfig {
    /// Binning mode selector.
    #[serde(default)]
    pub bin_mode: BinMode,

    /// Equipment site identifiers, one per parallel site.
    pub handler_site_ids: Vec<String>,

    /// Tester site number per equipment site; defaults to 1..=N.
    #[serde(default)]
    pub site_map: Option<Vec<i64>>,

    /// Ordered equipment bin identifiers; their count is the declared bin
    /// capacity.
    #[serde(default)]
    pub handler_bin_ids: Vec<String>,

    /// Equipment bins used for retest; the first one backs the wildcard
    /// entry.
    #[serde(default)]
    pub handler_retest_bins: Vec<i64>,

    /// Hardbin map: entry N lists the tester hardbins routed to equipment
    /// bin N.
    #[serde(default)]
    pub hardbin_map: Vec<Vec<i64>>,

    /// Softbin map: entry N lists the tester softbin codes routed to
    /// equipment bin N.
    #[serde(default)]
    pub softbin_map: Vec<Vec<String>>,

    /// Diagnostic mode: never trust tester binning, pass everything
    /// through unresolved.
    #[serde(default)]
    pub dont_trust_binning: bool,

    /// Whether blocking diagnose/panic dialogs may be shown at all.
    #[serde(default = "default_true")]
    pub enable_diagnose_window: bool,

    /// Automatic reprobe behavior for implicit reprobe requests.
    #[serde(default)]
    pub auto_reprobe: ReprobeMode,

    /// Reprobe automatically when devices are scheduled for retest.
    #[serde(default)]
    pub auto_reprobe_on_retest: bool,

    /// Reprobe automatically when devices are scheduled for check.
    #[serde(default)]
    pub auto_reprobe_on_check: bool,

    /// Upper bound on automatic retest rounds per lot.
    #[serde(default = "default_retest_count")]
    pub max_retest_count: u32,

    /// Wait/escalation policy per call class.
    #[serde(default)]
    pub escalation: EscalationConfig,
}

/// Configuration consistency failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No sites configured.
    #[error("configuration declares no equipment sites")]
    NoSites,

    /// Site map length does not match the site list.
    #[error("site map has {map} entries for {sites} configured sites")]
    SiteMapMismatch {
        /// Entries in the site map.
        map: usize,
        /// Configured sites.
        sites: usize,
    },

    /// A mapping table entry failed to install.
    #[error("bin mapping table rejected: {0}")]
    BinMap(#[from] BinMapError),
}

impl DriverConfig {
    /// Number of configured equipment sites.
    pub fn num_sites(&self) -> usize {
        self.handler_site_ids.len()
    }

    /// Tester site number of an equipment site.
    pub fn tester_site(&self, site: usize) -> i64 {
        match &self.site_map {
            Some(map) => map.get(site).copied().unwrap_or(site as i64 + 1),
            None => site as i64 + 1,
        }
    }

    /// Equipment site name used in log lines.
    pub fn site_name(&self, site: usize) -> &str {
        self.handler_site_ids
            .get(site)
            .map(String::as_str)
            .unwrap_or("?")
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handler_site_ids.is_empty() {
            return Err(ConfigError::NoSites);
        }
        if let Some(map) = &self.site_map {
            if map.len() != self.handler_site_ids.len() {
                return Err(ConfigError::SiteMapMismatch {
                    map: map.len(),
                    sites: self.handler_site_ids.len(),
                });
            }
        }
        self.build_bin_map().map(|_| ())
    }

    /// Builds the bin mapping table for the configured mode.
    ///
    /// Rebuilt wholesale whenever the configuration is reloaded; the caller
    /// installs the result atomically.
    pub fn build_bin_map(&self) -> Result<BinMap, ConfigError> {
        let mut map = BinMap::with_capacity(self.handler_bin_ids.len());

        match self.bin_mode {
            BinMode::Raw => {}
            BinMode::HardMap => {
                for (slot, tester_bins) in self.hardbin_map.iter().enumerate() {
                    for bin in tester_bins {
                        map.enter(BinCode(*bin), slot as i64)?;
                    }
                }
            }
            BinMode::SoftMap => {
                for (slot, codes) in self.softbin_map.iter().enumerate() {
                    for code in codes {
                        map.enter(BinCode::from_text(code), slot as i64)?;
                    }
                }
            }
        }

        if let Some(first) = self.handler_retest_bins.first() {
            map.enter(BinCode::WILDCARD, *first)?;
            if self.handler_retest_bins.len() > 1 {
                debug!(
                    "only the first configured retest bin is used, ignoring {:?}",
                    &self.handler_retest_bins[1..]
                );
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> DriverConfig {
        DriverConfig {
            bin_mode: BinMode::Raw,
            handler_site_ids: vec!["A".into(), "B".into()],
            site_map: None,
            handler_bin_ids: vec!["1".into(), "2".into(), "3".into(), "4".into()],
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

    #[test]
    fn hardbin_tables_index_by_equipment_bin() {
        let mut config = base_config();
        config.bin_mode = BinMode::HardMap;
        config.hardbin_map = vec![vec![1, 2], vec![5], vec![], vec![9]];

        let map = config.build_bin_map().unwrap();
        assert_eq!(map.lookup(BinCode(5)), Some(1));
        assert_eq!(map.lookup(BinCode(2)), Some(0));
        assert_eq!(map.lookup(BinCode(9)), Some(3));
    }

    #[test]
    fn first_retest_bin_becomes_the_wildcard() {
        let mut config = base_config();
        config.handler_retest_bins = vec![2, 3];

        let map = config.build_bin_map().unwrap();
        assert_eq!(map.lookup(BinCode::WILDCARD), Some(2));
    }

    #[test]
    fn oversized_map_tables_are_rejected() {
        let mut config = base_config();
        config.bin_mode = BinMode::HardMap;
        config.hardbin_map = vec![vec![1], vec![2], vec![3], vec![4], vec![5]];

        assert!(matches!(
            config.build_bin_map(),
            Err(ConfigError::BinMap(BinMapError::SlotRange { slot: 4, .. }))
        ));
    }

    #[test]
    fn site_map_length_is_checked() {
        let mut config = base_config();
        config.site_map = Some(vec![1]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SiteMapMismatch { map: 1, sites: 2 })
        ));
    }

    #[test]
    fn config_deserializes_from_external_form() {
        let json = r#"{
            "bin_mode": "mapped-softbins",
            "handler_site_ids": ["A", "B"],
            "handler_bin_ids": ["1", "2", "3"],
            "handler_retest_bins": [0],
            "softbin_map": [["aa"], ["db", "dc"]],
            "escalation": {
                "device": { "timeout_secs": 5.0, "action": "continue" }
            }
        }"#;
        let config: DriverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bin_mode, BinMode::SoftMap);
        assert_eq!(config.escalation.device.action, EscalationAction::Continue);
        assert_eq!(config.escalation.lot.action, EscalationAction::AskOperator);
        let map = config.build_bin_map().unwrap();
        assert_eq!(map.lookup(BinCode::from_text("db")), Some(1));
    }
}
