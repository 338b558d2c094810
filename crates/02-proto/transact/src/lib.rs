//! Resumable transaction protocol for multi-step equipment dialogs.
//!
//! A logical driver call ("get device", "bin device", ...) is serviced by an
//! ordered list of primitive link operations. When the same call is entered
//! again after a timeout, primitives that already succeeded are replayed from
//! the transaction context instead of being re-issued on the wire, so a
//! dialog resumes exactly where it left off.
//!
//! The protocol is generic over the call-identity type; the driver ABI layer
//! instantiates it with its logical-call enum.

mod context;
mod stack;

pub use context::{StepRecord, Transaction};
pub use stack::TransactionStack;

use link::LinkError;

/// Out-of-band condition signalled by the equipment during a dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquipSignal {
    /// Equipment announced the start of a new lot.
    LotStarted,
    /// Equipment announced that the current lot ran empty.
    LotDone,
    /// Equipment announced devices ready for test.
    DeviceStarted,
    /// Equipment reported a jam.
    Jammed,
}

/// Failure of one primitive transaction step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The step did not complete yet; retry the call later.
    #[error("still waiting for the equipment")]
    Waiting,

    /// Hard link fault; needs interface-level escalation, not a retry.
    #[error("link fault during transaction step: {0}")]
    Link(LinkError),

    /// A received answer or interrupt byte was not understood.
    #[error("unexpected answer from the equipment")]
    Answer,

    /// A previously requested abort was consumed by this call.
    #[error("transaction aborted on request")]
    Aborted,

    /// Out-of-band equipment signal that ends the current call.
    #[error("equipment signal: {0:?}")]
    Signal(EquipSignal),
}

/// Result type used by all transaction primitives.
pub type StepResult<T> = Result<T, StepError>;

impl From<LinkError> for StepError {
    fn from(err: LinkError) -> Self {
        if err.is_timeout() {
            StepError::Waiting
        } else {
            StepError::Link(err)
        }
    }
}

/// Handler invoked for a registered unsolicited interrupt byte.
///
/// Returning `Ok(())` means the byte was serviced and the dialog goes on;
/// returning an error (typically [`StepError::Signal`]) ends the call with
/// that condition.
pub type InterruptHandler = Box<dyn FnMut(u8) -> StepResult<()> + Send>;
