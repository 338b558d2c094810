//! Ready-to-run session assembly over the simulated backend.

use std::sync::Arc;

use driver_abi::{EquipHandle, EquipState, SharedFlags};
use frame::{DriverConfig, DriverSession};
use link::{LinkFamily, Timeouts};

use crate::operator::ScriptedOperator;
use crate::plugin::SimPlugin;
use crate::scripted::{ScriptHandle, ScriptedLink};

/// A fully wired simulated test cell.
pub struct SimBench {
    /// The driver session under test.
    pub session: DriverSession,
    /// Flag store shared with the "test system".
    pub flags: Arc<SharedFlags>,
    /// Equipment state shared with the plugin.
    pub estate: EquipHandle,
    /// Script/journal handle of the equipment link.
    pub link: ScriptHandle,
    /// Scripted operator front end.
    pub operator: Arc<ScriptedOperator>,
}

/// Builds a simulated bench for the given configuration.
///
/// The link speaks GPIB and starts with an empty script, so every dialog
/// times out until the test (or CLI) feeds answers.
pub fn make_bench(config: DriverConfig) -> SimBench {
    let flags = SharedFlags::new();
    let estate = EquipState::new(config.num_sites());
    let operator = ScriptedOperator::new();
    let (link, handle) = ScriptedLink::new(LinkFamily::Gpib);
    let plugin = SimPlugin::new(link, Arc::clone(&estate), Timeouts::default());

    let session = DriverSession::builder()
        .config(config)
        .tester(flags.clone())
        .operator(operator.clone())
        .estate(Arc::clone(&estate))
        .plugin(Box::new(plugin))
        .build()
        .expect("simulated bench assembly");

    SimBench {
        session,
        flags,
        estate,
        link: handle,
        operator,
    }
}
