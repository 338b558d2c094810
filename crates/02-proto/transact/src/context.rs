//! One transaction context frame.

/// Replay record of one completed primitive step.
///
/// Completed receive and interrupt steps keep the bytes they consumed, so a
/// re-entered call can hand the same data back to the caller without
/// touching the link again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepRecord {
    /// A message was sent.
    Sent,
    /// An answer was received; raw bytes kept for replay decoding.
    Received(Vec<u8>),
    /// An interrupt byte was consumed.
    Event(u8),
    /// A non-blocking interrupt poll completed, with or without an event.
    Polled(Option<u8>),
}

/// Progress state of one logical call's primitive steps.
#[derive(Debug)]
pub struct Transaction<C> {
    pub(crate) last_call: Option<C>,
    pub(crate) current_call: Option<C>,
    pub(crate) step: u32,
    pub(crate) steps_done: u32,
    pub(crate) do_abort: bool,
    pub(crate) records: Vec<StepRecord>,
}

impl<C: Copy + PartialEq> Transaction<C> {
    pub(crate) fn new() -> Self {
        Self {
            last_call: None,
            current_call: None,
            step: 0,
            steps_done: 0,
            do_abort: false,
            records: Vec::new(),
        }
    }

    pub(crate) fn clone_frame(&self) -> Self {
        Self {
            last_call: self.last_call,
            current_call: self.current_call,
            step: self.step,
            steps_done: self.steps_done,
            do_abort: self.do_abort,
            records: self.records.clone(),
        }
    }

    /// Identity of the call currently in progress.
    pub fn current_call(&self) -> Option<C> {
        self.current_call
    }

    /// Identity of the previous logical call.
    pub fn last_call(&self) -> Option<C> {
        self.last_call
    }

    /// Ordinal of the step about to be attempted.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Number of steps already known to have succeeded for this call.
    pub fn steps_done(&self) -> u32 {
        self.steps_done
    }

    pub(crate) fn clear_progress(&mut self) {
        self.steps_done = 0;
        self.records.clear();
    }
}
