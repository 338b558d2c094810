//! Scripted operator front end.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use driver_abi::{DialogReply, DialogRequest, OperatorGateway};
use parking_lot::Mutex;

/// Operator gateway answering from a queued script.
///
/// An empty queue behaves like an absent front end ("no answer"), which
/// exercises the driver's documented non-interactive defaults.
#[derive(Default)]
pub struct ScriptedOperator {
    replies: Mutex<VecDeque<DialogReply>>,
    requests: Mutex<Vec<DialogRequest>>,
}

impl ScriptedOperator {
    /// Creates an operator with no queued answers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the answer for the next question.
    pub fn push_reply(&self, reply: DialogReply) {
        self.replies.lock().push_back(reply);
    }

    /// Every question posed so far.
    pub fn requests(&self) -> Vec<DialogRequest> {
        self.requests.lock().clone()
    }

    /// Titles of the questions posed so far.
    pub fn titles(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.title.clone()).collect()
    }
}

impl OperatorGateway for ScriptedOperator {
    fn show(&self, request: &DialogRequest, _timeout: Option<Duration>) -> Option<DialogReply> {
        self.requests.lock().push(request.clone());
        self.replies.lock().pop_front()
    }
}
