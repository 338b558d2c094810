//! Shared equipment state.
//!
//! The capability module is the only component that learns about physical
//! site population and equipment pauses, but the frame must read both to
//! drive bin resolution. This shared handle is the narrow meeting point.

use std::sync::Arc;

use parking_lot::Mutex;

/// Population state of one parallel test site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum SiteUsage {
    /// A device sits at this site, ready for test or binning.
    Populated,
    /// The site is active but currently holds no device.
    Empty,
    /// The site is temporarily taken out of use.
    Deactivated,
    /// A device is still present but the site is being taken out of use.
    PopulatedDeactivating,
}

impl SiteUsage {
    /// Returns whether a device is physically present.
    pub fn holds_device(self) -> bool {
        matches!(self, SiteUsage::Populated | SiteUsage::PopulatedDeactivating)
    }
}

#[derive(Debug)]
struct Inner {
    sites: Vec<SiteUsage>,
    equipment_paused: bool,
    lot_active: bool,
}

/// Equipment state shared between the frame and the capability module.
#[derive(Debug)]
pub struct EquipState {
    inner: Mutex<Inner>,
}

/// Shared handle to the equipment state.
pub type EquipHandle = Arc<EquipState>;

impl EquipState {
    /// Creates the state for `num_sites` sites, all empty.
    pub fn new(num_sites: usize) -> EquipHandle {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                sites: vec![SiteUsage::Empty; num_sites],
                equipment_paused: false,
                lot_active: false,
            }),
        })
    }

    /// Number of configured sites.
    pub fn num_sites(&self) -> usize {
        self.inner.lock().sites.len()
    }

    /// Snapshot of the per-site population.
    pub fn site_usage(&self) -> Vec<SiteUsage> {
        self.inner.lock().sites.clone()
    }

    /// Replaces the per-site population wholesale.
    pub fn set_site_usage(&self, sites: Vec<SiteUsage>) {
        self.inner.lock().sites = sites;
    }

    /// Updates the population of one site.
    pub fn set_site(&self, site: usize, usage: SiteUsage) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.sites.get_mut(site) {
            *slot = usage;
        }
    }

    /// Whether the equipment itself is in the paused state.
    pub fn equipment_paused(&self) -> bool {
        self.inner.lock().equipment_paused
    }

    /// Records the equipment pause state.
    pub fn set_equipment_paused(&self, paused: bool) {
        self.inner.lock().equipment_paused = paused;
    }

    /// Whether a lot is currently active at the equipment.
    pub fn lot_active(&self) -> bool {
        self.inner.lock().lot_active
    }

    /// Records lot start/end.
    pub fn set_lot_active(&self, active: bool) {
        self.inner.lock().lot_active = active;
    }
}
