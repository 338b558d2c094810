//! Scripted link session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use link::{LinkError, LinkEvent, LinkFamily, LinkSession};
use parking_lot::Mutex;

#[derive(Default)]
struct ScriptInner {
    sent: Vec<String>,
    send_faults: VecDeque<LinkError>,
    receives: VecDeque<Result<Vec<u8>, LinkError>>,
    receive_calls: usize,
    events: VecDeque<Result<Option<LinkEvent>, LinkError>>,
    event_calls: usize,
}

/// Shared script/journal handle of a [`ScriptedLink`].
///
/// The link itself moves into the capability module; this handle stays with
/// the test (or CLI) to feed answers and inspect the traffic.
#[derive(Clone, Default)]
pub struct ScriptHandle {
    inner: Arc<Mutex<ScriptInner>>,
}

impl ScriptHandle {
    /// Queues the result of the next unscripted send (default: success).
    pub fn push_send_fault(&self, fault: LinkError) {
        self.inner.lock().send_faults.push_back(fault);
    }

    /// Queues one receive result; an empty queue times out.
    pub fn push_receive(&self, result: Result<&[u8], LinkError>) {
        self.inner
            .lock()
            .receives
            .push_back(result.map(|bytes| bytes.to_vec()));
    }

    /// Queues one interrupt byte.
    pub fn push_event(&self, byte: u8) {
        self.inner.lock().events.push_back(Ok(Some(LinkEvent::new(byte))));
    }

    /// Queues one empty event poll ("nothing arrived").
    pub fn push_no_event(&self) {
        self.inner.lock().events.push_back(Ok(None));
    }

    /// Queues a hard fault for the next event wait.
    pub fn push_event_fault(&self, fault: LinkError) {
        self.inner.lock().events.push_back(Err(fault));
    }

    /// Everything sent so far, in order, lossily decoded.
    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().sent.clone()
    }

    /// Number of receive attempts made against the link.
    pub fn receive_calls(&self) -> usize {
        self.inner.lock().receive_calls
    }

    /// Number of event waits made against the link.
    pub fn event_calls(&self) -> usize {
        self.inner.lock().event_calls
    }
}

/// Link session backed by scripted answers.
///
/// Unscripted receives and event waits behave like timeouts, which is
/// exactly what a silent piece of equipment looks like.
pub struct ScriptedLink {
    family: LinkFamily,
    handle: ScriptHandle,
}

impl ScriptedLink {
    /// Creates a scripted link of the given family plus its script handle.
    pub fn new(family: LinkFamily) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (
            Self {
                family,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl LinkSession for ScriptedLink {
    fn family(&self) -> LinkFamily {
        self.family
    }

    fn send(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), LinkError> {
        let mut inner = self.handle.inner.lock();
        inner.sent.push(String::from_utf8_lossy(bytes).into_owned());
        match inner.send_faults.pop_front() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>, LinkError> {
        let mut inner = self.handle.inner.lock();
        inner.receive_calls += 1;
        inner.receives.pop_front().unwrap_or(Err(LinkError::Timeout))
    }

    fn wait_event(&mut self, _timeout: Duration) -> Result<Option<LinkEvent>, LinkError> {
        let mut inner = self.handle.inner.lock();
        inner.event_calls += 1;
        inner.events.pop_front().unwrap_or(Ok(None))
    }
}
