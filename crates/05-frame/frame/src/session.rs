//! Driver session assembly and shared session state.

use anyhow::{anyhow, bail, Result};
use arc_swap::ArcSwap;
use binmap::BinMap;
use driver_abi::{
    Capabilities, EquipHandle, OperatorHandle, PluginHandle, SystemFlag, TesterHandle,
};
use log::info;
use std::sync::Arc;

use crate::config::DriverConfig;
use crate::timer::Stopwatch;

/// Which unit-handling behavior the test system currently demands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TesterMode {
    /// Regular test/bin flow.
    #[default]
    Normal,
    /// Devices are scheduled for retest; no new devices, no binning.
    Retest,
    /// Devices are scheduled for a check pass; no new devices, no binning.
    Check,
}

/// Operator-initiated exemption of units from normal processing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SkipMode {
    /// No exemption.
    #[default]
    Normal,
    /// The next unit is exempted; the current one is processed normally.
    SkipNext,
    /// The current unit was not tested at all.
    SkipCurrent,
    /// Both the current and the next unit are exempted.
    SkipNextAndCurrent,
}

impl SkipMode {
    /// Returns whether the current unit carries trustworthy test results.
    pub fn current_tested(self) -> bool {
        matches!(self, SkipMode::Normal | SkipMode::SkipNext)
    }
}

/// The driver session: one attached equipment, one capability module.
///
/// Owns the bin map, the per-site result arrays and the two wait timers;
/// collaborators (test system, operator front end, equipment state) are
/// reached through the narrow handles collected at build time.
pub struct DriverSession {
    pub(crate) config: DriverConfig,
    pub(crate) tester: TesterHandle,
    pub(crate) operator: OperatorHandle,
    pub(crate) estate: EquipHandle,
    pub(crate) plugin: PluginHandle,
    pub(crate) caps: Capabilities,
    pub(crate) bin_map: ArcSwap<BinMap>,
    pub(crate) device_bins: Vec<i64>,
    pub(crate) device_passed: Vec<bool>,
    pub(crate) device_reprobe: Vec<bool>,
    pub(crate) total_timer: Stopwatch,
    pub(crate) short_timer: Stopwatch,
    pub(crate) tester_mode: TesterMode,
    pub(crate) skip_mode: SkipMode,
    /// Automatic retest rounds used in the current lot.
    pub(crate) retest_attempts: u32,
    /// Quit flag state captured when the current operation entered.
    pub(crate) initial_quit: bool,
    /// Pause flag state captured when the current operation entered.
    pub(crate) initial_pause: bool,
}

impl DriverSession {
    /// Starts assembling a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Number of configured sites.
    pub fn num_sites(&self) -> usize {
        self.config.num_sites()
    }

    /// Resolved destination bin per site (−1 = unresolved/retest).
    pub fn device_bins(&self) -> &[i64] {
        &self.device_bins
    }

    /// Pass flag per site.
    pub fn device_passed(&self) -> &[bool] {
        &self.device_passed
    }

    /// Reprobe request per site.
    pub fn device_reprobe(&self) -> &[bool] {
        &self.device_reprobe
    }

    /// Currently active configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Current tester mode.
    pub fn tester_mode(&self) -> TesterMode {
        self.tester_mode
    }

    /// Overrides the tester mode (retest/check scheduling).
    pub fn set_tester_mode(&mut self, mode: TesterMode) {
        self.tester_mode = mode;
    }

    /// Current skip mode.
    pub fn skip_mode(&self) -> SkipMode {
        self.skip_mode
    }

    /// Sets the skip mode for the coming cycles.
    pub fn set_skip_mode(&mut self, mode: SkipMode) {
        self.skip_mode = mode;
    }

    /// Automatic retest rounds used in the current lot.
    pub fn retest_attempts(&self) -> u32 {
        self.retest_attempts
    }

    /// Replaces the configuration and atomically installs the rebuilt bin
    /// map; concurrent readers keep the old table until the swap.
    pub fn reconfigure(&mut self, config: DriverConfig) -> Result<()> {
        config.validate()?;
        if config.num_sites() != self.num_sites() {
            bail!(
                "reconfiguration changes the site count from {} to {}",
                self.num_sites(),
                config.num_sites()
            );
        }
        let map = config.build_bin_map()?;
        self.bin_map.store(Arc::new(map));
        self.config = config;
        info!("driver reconfigured, new bin mapping installed");
        Ok(())
    }

    /// Captures the flag situation and restarts both timers; called at the
    /// top of every logical operation.
    pub(crate) fn begin_operation(&mut self) {
        self.initial_quit = self.tester.flag(SystemFlag::Quit) != 0;
        self.initial_pause = self.tester.flag(SystemFlag::Pause) != 0;
        self.total_timer.restart();
        self.short_timer.restart();
    }

    /// Abort/reset/quit situation that unconditionally ends a wait loop.
    pub(crate) fn operator_wants_stop(&self) -> bool {
        self.tester.flag(SystemFlag::Abort) != 0
            || self.tester.flag(SystemFlag::Reset) != 0
            || (self.tester.flag(SystemFlag::Quit) != 0 && !self.initial_quit)
    }
}

/// Builder collecting the session collaborators.
pub struct SessionBuilder {
    config: Option<DriverConfig>,
    tester: Option<TesterHandle>,
    operator: Option<OperatorHandle>,
    estate: Option<EquipHandle>,
    plugin: Option<PluginHandle>,
}

impl SessionBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            config: None,
            tester: None,
            operator: None,
            estate: None,
            plugin: None,
        }
    }

    /// Sets the driver configuration.
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the tester flag bridge.
    pub fn tester(mut self, tester: TesterHandle) -> Self {
        self.tester = Some(tester);
        self
    }

    /// Sets the operator-dialog gateway.
    pub fn operator(mut self, operator: OperatorHandle) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Sets the shared equipment state.
    pub fn estate(mut self, estate: EquipHandle) -> Self {
        self.estate = Some(estate);
        self
    }

    /// Sets the capability module.
    pub fn plugin(mut self, plugin: PluginHandle) -> Self {
        self.plugin = Some(plugin);
        self
    }

    /// Builds the session, checking configuration consistency and the
    /// module's minimum capability set.
    pub fn build(self) -> Result<DriverSession> {
        let config = self
            .config
            .ok_or_else(|| anyhow!("missing driver configuration"))?;
        config.validate()?;

        let tester = self.tester.ok_or_else(|| anyhow!("missing tester bridge"))?;
        let operator = self
            .operator
            .ok_or_else(|| anyhow!("missing operator gateway"))?;
        let estate = self
            .estate
            .ok_or_else(|| anyhow!("missing equipment state"))?;
        let plugin = self
            .plugin
            .ok_or_else(|| anyhow!("missing capability module"))?;

        let caps = plugin.capabilities();
        if !caps.has_minimum() {
            bail!("capability module lacks the minimum init/start/bin set");
        }
        if estate.num_sites() != config.num_sites() {
            bail!(
                "equipment state has {} sites, configuration declares {}",
                estate.num_sites(),
                config.num_sites()
            );
        }

        let map = config.build_bin_map()?;
        let sites = config.num_sites();
        Ok(DriverSession {
            config,
            tester,
            operator,
            estate,
            plugin,
            caps,
            bin_map: ArcSwap::from_pointee(map),
            device_bins: vec![-1; sites],
            device_passed: vec![true; sites],
            device_reprobe: vec![false; sites],
            total_timer: Stopwatch::new(),
            short_timer: Stopwatch::new(),
            tester_mode: TesterMode::Normal,
            skip_mode: SkipMode::Normal,
            retest_attempts: 0,
            initial_quit: false,
            initial_pause: false,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
