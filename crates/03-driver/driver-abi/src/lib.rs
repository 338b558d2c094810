//! Driver ABI types shared between the frame and capability modules.
//!
//! This crate defines the protocol boundary between the driver frame (layer
//! 05) and the vendor capability modules that service one specific equipment
//! family, with no frame-specific dependencies.

mod estate;
mod operator;
mod tester;

pub use estate::{EquipHandle, EquipState, SiteUsage};
pub use operator::{
    ChannelGateway, DialogPort, DialogReply, DialogRequest, OperatorGateway, OperatorHandle,
    BUTTON_CONTINUE, BUTTON_QUIT,
};
pub use tester::{SharedFlags, SiteBin, SystemFlag, TcomError, TesterBridge, TesterHandle};

pub use link::LinkFamily;

use transact::{EquipSignal, StepError};

/// Logical operations a capability module may implement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum DriverCall {
    /// Attach and initialize the equipment session.
    Init,
    /// Push changed configuration down to the equipment.
    Reconfigure,
    /// Reset the equipment session.
    Reset,
    /// Query the capability module identity.
    DriverId,
    /// Query the equipment identity.
    EquipId,
    /// Wait until devices are in place for test.
    Start,
    /// Route the tested devices to their destination bins.
    Bin,
    /// Re-contact the current devices.
    Reprobe,
    /// Combined bin/reprobe for mixed per-site decisions.
    BinReprobe,
    /// Follow the test system into the paused state.
    Pause,
    /// Leave the paused state.
    Unpause,
    /// Fetch a diagnostics text for operator dialogs.
    Diag,
    /// Wait for the equipment to start a new lot.
    LotStart,
    /// Tell the equipment the current lot is finished.
    LotDone,
}

impl DriverCall {
    /// Human-readable operation name used in log and dialog text.
    pub fn name(self) -> &'static str {
        match self {
            DriverCall::Init => "init-plugin",
            DriverCall::Reconfigure => "reconfigure-plugin",
            DriverCall::Reset => "reset-plugin",
            DriverCall::DriverId => "get-driver-id",
            DriverCall::EquipId => "get-equipment-id",
            DriverCall::Start => "get-device",
            DriverCall::Bin => "bin-device",
            DriverCall::Reprobe => "reprobe",
            DriverCall::BinReprobe => "bin-and-reprobe-device",
            DriverCall::Pause => "pause",
            DriverCall::Unpause => "unpause",
            DriverCall::Diag => "diagnostic",
            DriverCall::LotStart => "lot-start",
            DriverCall::LotDone => "lot-done",
        }
    }

    /// Timeout/escalation class of this operation.
    pub fn class(self) -> CallClass {
        match self {
            DriverCall::Init => CallClass::Lot,
            DriverCall::Start | DriverCall::Bin | DriverCall::Reprobe | DriverCall::BinReprobe => {
                CallClass::Device
            }
            _ => CallClass::General,
        }
    }

    fn mask(self) -> u32 {
        1 << self as u32
    }
}

/// Escalation class used to pick timeout values and operator actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallClass {
    /// Lot-level waiting (equipment setup, lot boundaries).
    Lot,
    /// Device-level waiting (start, bin, reprobe).
    Device,
    /// Everything else.
    General,
}

/// Set of logical operations implemented by a capability module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(u32);

impl Capabilities {
    /// The empty capability set.
    pub fn none() -> Self {
        Self(0)
    }

    /// Adds one operation to the set.
    pub fn with(self, call: DriverCall) -> Self {
        Self(self.0 | call.mask())
    }

    /// Returns whether the module implements `call`.
    pub fn supports(self, call: DriverCall) -> bool {
        self.0 & call.mask() != 0
    }

    /// Returns whether the minimum functional set (init, start, bin) is
    /// present.
    pub fn has_minimum(self) -> bool {
        self.supports(DriverCall::Init)
            && self.supports(DriverCall::Start)
            && self.supports(DriverCall::Bin)
    }
}

impl FromIterator<DriverCall> for Capabilities {
    fn from_iter<I: IntoIterator<Item = DriverCall>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

/// Discriminated result of one capability-module invocation.
///
/// This is the sole input to the retry engine's classification step; no
/// other value a plugin produces influences the verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// The logical call completed.
    Ok,
    /// Equipment reported a jammed state.
    Jam,
    /// Equipment signalled the start of a lot.
    LotStart,
    /// Equipment signalled the end of the lot.
    LotDone,
    /// Equipment signalled devices ready for test.
    DeviceStart,
    /// The module was never initialized.
    NotInit,
    /// The passed handle is not valid.
    InvalidHandle,
    /// The operation is not available for this equipment family.
    NotApplicable,
    /// Out of memory.
    Memory,
    /// Invalid configuration for this operation.
    Config,
    /// Binning-specific failure (invalid bin request).
    Binning,
    /// The call is still in progress; retry later.
    Waiting,
    /// Hard fault on the given interface family.
    LinkFault(LinkFamily),
    /// The call was aborted on request.
    Aborted,
    /// A received answer was not understood.
    Answer,
    /// The equipment is in a fatal state.
    Fatal,
}

impl CallOutcome {
    /// Maps a transaction step failure onto the call outcome vocabulary.
    pub fn from_step(err: StepError, family: LinkFamily) -> Self {
        match err {
            StepError::Waiting => CallOutcome::Waiting,
            StepError::Link(_) => CallOutcome::LinkFault(family),
            StepError::Answer => CallOutcome::Answer,
            StepError::Aborted => CallOutcome::Aborted,
            StepError::Signal(EquipSignal::LotStarted) => CallOutcome::LotStart,
            StepError::Signal(EquipSignal::LotDone) => CallOutcome::LotDone,
            StepError::Signal(EquipSignal::DeviceStarted) => CallOutcome::DeviceStart,
            StepError::Signal(EquipSignal::Jammed) => CallOutcome::Jam,
        }
    }
}

/// Verdict vocabulary returned to the calling test system.
///
/// A closed enumeration; the driver core never invents new values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Verdict {
    /// Operation completed, test flow continues.
    Pass,
    /// Operation failed; the test system raises an error.
    Error,
    /// The test flow should break out of the current level.
    Break,
    /// Equipment jam; operator attention required.
    Jam,
    /// A lot start was signalled during the operation.
    LotStart,
    /// A lot end was signalled during the operation.
    LotDone,
    /// A device start was signalled during the operation.
    DeviceStart,
}

/// One vendor capability module servicing a specific equipment family.
///
/// Every method services exactly one logical operation and returns one
/// [`CallOutcome`] per invocation. Repeated invocations for the same logical
/// operation must be safe any number of times: modules drive their hardware
/// dialogs through the transaction protocol, which replays completed steps.
pub trait Plugin {
    /// The set of operations this module implements, queried once at attach.
    fn capabilities(&self) -> Capabilities;

    /// Attach and initialize the equipment session.
    fn init(&mut self) -> CallOutcome;

    /// Wait until devices are in place for test.
    fn device_start(&mut self) -> CallOutcome;

    /// Route the current devices to the given destination bins
    /// (−1 = equipment default retest position).
    fn bin_device(&mut self, bins: &[i64]) -> CallOutcome;

    /// Re-contact the current devices.
    fn reprobe(&mut self) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Combined per-site reprobe/bin operation.
    fn bin_and_reprobe(&mut self, _reprobe: &[bool], _bins: &[i64]) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Follow the test system into the paused state.
    fn st_paused(&mut self) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Leave the paused state.
    fn st_unpaused(&mut self) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Wait for the equipment to start a new lot.
    fn lot_start(&mut self) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Tell the equipment the current lot is finished.
    fn lot_done(&mut self) -> CallOutcome {
        CallOutcome::NotApplicable
    }

    /// Identity of the capability module itself.
    fn driver_id(&mut self) -> (CallOutcome, Option<String>) {
        (CallOutcome::NotApplicable, None)
    }

    /// Identity string reported by the equipment.
    fn equip_id(&mut self) -> (CallOutcome, Option<String>) {
        (CallOutcome::NotApplicable, None)
    }

    /// Diagnostics text for operator dialogs, if the family provides one.
    fn diag(&mut self) -> Option<String> {
        None
    }
}

/// Owning handle to an attached capability module.
pub type PluginHandle = Box<dyn Plugin + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_and_minimum() {
        let caps: Capabilities = [DriverCall::Init, DriverCall::Start, DriverCall::Bin]
            .into_iter()
            .collect();
        assert!(caps.supports(DriverCall::Init));
        assert!(!caps.supports(DriverCall::Reprobe));
        assert!(caps.has_minimum());
        assert!(!Capabilities::none().has_minimum());
    }

    #[test]
    fn call_classes_follow_the_operation_kind() {
        assert_eq!(DriverCall::Init.class(), CallClass::Lot);
        assert_eq!(DriverCall::Start.class(), CallClass::Device);
        assert_eq!(DriverCall::Bin.class(), CallClass::Device);
        assert_eq!(DriverCall::EquipId.class(), CallClass::General);
    }

    #[test]
    fn step_errors_map_onto_outcomes() {
        use link::LinkError;
        use transact::EquipSignal;

        assert_eq!(
            CallOutcome::from_step(StepError::Waiting, LinkFamily::Gpib),
            CallOutcome::Waiting
        );
        assert_eq!(
            CallOutcome::from_step(StepError::Link(LinkError::fault("x")), LinkFamily::Lan),
            CallOutcome::LinkFault(LinkFamily::Lan)
        );
        assert_eq!(
            CallOutcome::from_step(
                StepError::Signal(EquipSignal::LotDone),
                LinkFamily::Rs232
            ),
            CallOutcome::LotDone
        );
    }
}
