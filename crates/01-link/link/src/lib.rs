//! Hardware-link session contract shared by the transaction protocol and the
//! concrete wire backends.
//!
//! A link session exposes the three primitive exchanges the driver core needs
//! (send a message, receive an answer, wait for an interrupt byte), each
//! guarded by a caller-supplied timeout. Timeouts are a distinguished,
//! retryable result; every other failure is a hard fault that the frame
//! escalates instead of silently retrying.

mod message;

pub use message::{Command, ParseError, Response};

use std::time::Duration;

/// Physical interface family carrying a link session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkFamily {
    /// IEEE-488 bus with service-request interrupt bytes.
    Gpib,
    /// Point-to-point serial line.
    Rs232,
    /// TCP/LAN attachment.
    Lan,
}

/// Asynchronous event delivered by the equipment outside the
/// command/response rhythm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkEvent {
    /// Raw interrupt byte (e.g. a GPIB SRQ status byte).
    pub byte: u8,
}

impl LinkEvent {
    /// Wraps a raw interrupt byte.
    pub fn new(byte: u8) -> Self {
        Self { byte }
    }
}

/// Errors surfaced by a link session.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The operation did not complete within its timeout. Retryable.
    #[error("link operation timed out")]
    Timeout,

    /// The session was closed underneath the driver.
    #[error("link session closed")]
    Closed,

    /// Any other interface-level fault reported by the wire backend.
    #[error("link fault: {0}")]
    Fault(String),
}

impl LinkError {
    /// Builds a hard fault from a backend message.
    pub fn fault(msg: impl Into<String>) -> Self {
        LinkError::Fault(msg.into())
    }

    /// Returns whether this error only means "keep waiting".
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout)
    }
}

/// Send/receive timeouts configured for one equipment attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for one outgoing message.
    pub send: Duration,
    /// Budget for one answer or interrupt wait.
    pub receive: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            send: Duration::from_secs(5),
            receive: Duration::from_secs(1),
        }
    }
}

/// One open session to a piece of handling equipment.
///
/// Implementations wrap a real GPIB/RS232/LAN driver or a scripted test
/// double; the transaction protocol is written purely against this trait.
pub trait LinkSession {
    /// Interface family of this session.
    fn family(&self) -> LinkFamily;

    /// Transmits one complete message within `timeout`.
    fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), LinkError>;

    /// Receives one complete answer within `timeout`.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, LinkError>;

    /// Waits up to `timeout` for one interrupt event.
    ///
    /// Returns `Ok(None)` when no event arrived in time; that is not an
    /// error, merely "none pending yet".
    fn wait_event(&mut self, timeout: Duration) -> Result<Option<LinkEvent>, LinkError>;
}
