//! Operator-dialog contract.
//!
//! The real dialog front end is a separate process; the driver core only
//! knows this request/reply shape and a timeout-guarded rendezvous. Button
//! 1 is conventionally "quit", button 8 "continue".

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::warn;

/// Conventional index of the quit button.
pub const BUTTON_QUIT: u8 = 1;
/// Conventional index of the continue button.
pub const BUTTON_CONTINUE: u8 = 8;

/// One question posed to the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogRequest {
    /// Window title.
    pub title: String,
    /// Message body.
    pub message: String,
    /// Labeled buttons, each with its position index 1–8.
    pub buttons: Vec<(u8, String)>,
    /// Initial content of the optional free-text field.
    pub input: Option<String>,
}

impl DialogRequest {
    /// Builds a request with the given title and message and no buttons.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            buttons: Vec::new(),
            input: None,
        }
    }

    /// Adds a button at position `index` (1–8).
    pub fn button(mut self, index: u8, label: impl Into<String>) -> Self {
        self.buttons.push((index, label.into()));
        self
    }
}

/// The operator's answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogReply {
    /// Selected button index 1–8.
    pub button: u8,
    /// Content of the free-text field, if one was shown.
    pub text: Option<String>,
}

impl DialogReply {
    /// Builds a plain button answer.
    pub fn button(button: u8) -> Self {
        Self { button, text: None }
    }
}

/// Gateway to the operator-dialog front end.
pub trait OperatorGateway: Send + Sync {
    /// Poses a question, waiting at most `timeout` (forever when `None`).
    ///
    /// `None` means no answer arrived in time (or no front end is
    /// attached); the caller applies its documented per-condition default.
    fn show(&self, request: &DialogRequest, timeout: Option<Duration>) -> Option<DialogReply>;
}

/// Shared handle to the operator gateway.
pub type OperatorHandle = Arc<dyn OperatorGateway>;

/// Front-end side of a [`ChannelGateway`].
pub struct DialogPort {
    /// Questions posed by the driver.
    pub requests: Receiver<DialogRequest>,
    /// Answers returned by the front end.
    pub replies: Sender<DialogReply>,
}

/// Channel-backed gateway implementation.
///
/// The dialog front end (GUI subprocess pump or a scripted stand-in) holds
/// the [`DialogPort`]; a dead front end degrades to "no answer".
pub struct ChannelGateway {
    requests: Sender<DialogRequest>,
    replies: Receiver<DialogReply>,
}

impl ChannelGateway {
    /// Creates the gateway and its front-end port.
    pub fn new() -> (Self, DialogPort) {
        let (req_tx, req_rx) = bounded(1);
        let (rep_tx, rep_rx) = bounded(1);
        (
            Self {
                requests: req_tx,
                replies: rep_rx,
            },
            DialogPort {
                requests: req_rx,
                replies: rep_tx,
            },
        )
    }
}

impl OperatorGateway for ChannelGateway {
    fn show(&self, request: &DialogRequest, timeout: Option<Duration>) -> Option<DialogReply> {
        if self.requests.send(request.clone()).is_err() {
            warn!("operator front end is gone, dialog unanswered: {}", request.title);
            return None;
        }
        match timeout {
            Some(limit) => match self.replies.recv_timeout(limit) {
                Ok(reply) => Some(reply),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("operator dialog timed out: {}", request.title);
                    None
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.replies.recv().ok(),
        }
    }
}
