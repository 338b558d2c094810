//! Transaction context stack and the step-skipping link primitives.

use std::fmt::Debug;

use link::{Command, LinkEvent, LinkSession, Response, Timeouts};
use log::{debug, trace, warn};
use smallvec::SmallVec;

use crate::context::{StepRecord, Transaction};
use crate::{InterruptHandler, StepError, StepResult};

/// Stack of transaction contexts owned by one capability-module handle.
///
/// The bottom frame carries the normal call flow; nested sub-dialogs run
/// against a pushed copy via [`TransactionStack::nested`] so their progress
/// bookkeeping cannot disturb the outer call.
pub struct TransactionStack<C> {
    frames: Vec<Transaction<C>>,
    hooks: SmallVec<[(u8, InterruptHandler); 2]>,
    timeouts: Timeouts,
}

impl<C: Copy + PartialEq + Debug> TransactionStack<C> {
    /// Creates the stack with one root context.
    pub fn new(timeouts: Timeouts) -> Self {
        trace!("transaction control initialized");
        Self {
            frames: vec![Transaction::new()],
            hooks: SmallVec::new(),
            timeouts,
        }
    }

    /// Read access to the active context.
    pub fn top(&self) -> &Transaction<C> {
        self.frames.last().expect("transaction stack never empty")
    }

    fn top_mut(&mut self) -> &mut Transaction<C> {
        self.frames.last_mut().expect("transaction stack never empty")
    }

    /// Link timeouts used by the primitives.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Registers a handler for an unsolicited interrupt byte.
    ///
    /// Handlers are consulted when an interrupt arrives that is not in the
    /// expected set of the waiting primitive.
    pub fn on_interrupt(&mut self, byte: u8, handler: InterruptHandler) {
        self.hooks.push((byte, handler));
    }

    /// Runs `f` against a pushed copy of the active context.
    ///
    /// The copy is always popped when `f` returns, so an error return from a
    /// nested sub-dialog cannot leak a stale context frame.
    pub fn nested<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let frame = self.top().clone_frame();
        self.frames.push(frame);
        let out = f(self);
        self.frames.pop();
        out
    }

    /// Announces the logical call about to be serviced.
    ///
    /// A genuinely new call (different from the previous one) starts with a
    /// clean progress record; re-announcing the identical call keeps
    /// `steps_done` so the finished steps replay on this entry.
    pub fn set_call(&mut self, call: C) {
        let top = self.top_mut();
        top.last_call = top.current_call;
        top.current_call = Some(call);
        top.step = 0;
        if top.last_call != top.current_call {
            trace!("transaction control reset for new call {call:?}");
            top.clear_progress();
        } else {
            trace!("transaction control reset for repeated call {call:?}");
        }
    }

    /// Opens a dialog bracket.
    pub fn start(&mut self) {
        trace!("transaction started");
        let top = self.top_mut();
        top.step = 0;
        top.do_abort = false;
    }

    /// Closes a dialog bracket once the logical call is fully done.
    pub fn stop(&mut self) {
        trace!("transaction stopped");
        let top = self.top_mut();
        top.step = 0;
        top.do_abort = false;
        top.clear_progress();
    }

    /// Schedules an abort for the next re-entry of the current call.
    pub fn request_abort(&mut self) {
        trace!("transaction control schedule abort");
        self.top_mut().do_abort = true;
    }

    /// Consumes a pending abort request.
    ///
    /// Reports true only when the call being checked is still the call that
    /// was active when the abort was requested; a stale request from a
    /// previous call never leaks into a new one.
    pub fn ask_abort(&mut self) -> bool {
        let top = self.top_mut();
        if !top.do_abort {
            return false;
        }
        top.do_abort = false;
        if top.last_call == top.current_call {
            trace!("transaction control perform abort");
            true
        } else {
            false
        }
    }

    /// Discards all progress of the current call.
    pub fn reset(&mut self) {
        trace!("transaction control reset");
        let top = self.top_mut();
        top.step = 0;
        top.do_abort = false;
        top.clear_progress();
    }

    /// Rolls back exactly one completed step.
    pub fn remove_step(&mut self) {
        trace!("transaction control removed last step");
        let top = self.top_mut();
        top.step = top.step.saturating_sub(1);
        top.steps_done = top.steps_done.saturating_sub(1);
        top.records.truncate(top.steps_done as usize);
    }

    /// Sends one typed message, skipping the wire if this step already
    /// succeeded on a previous entry of the same call.
    pub fn send<L: LinkSession, M: Command>(&mut self, link: &mut L, cmd: &M) -> StepResult<()> {
        let bytes = cmd.encode();
        let timeout = self.timeouts.send;
        let top = self.top_mut();
        top.step += 1;
        if top.steps_done >= top.step {
            trace!(
                "NOT sending message, was already sent: {:?}",
                String::from_utf8_lossy(&bytes)
            );
            return Ok(());
        }

        debug!(
            "trying to send message to equipment: {:?}",
            String::from_utf8_lossy(&bytes)
        );
        match link.send(&bytes, timeout) {
            Ok(()) => {
                top.steps_done += 1;
                top.records.push(StepRecord::Sent);
                debug!("message sent");
                Ok(())
            }
            Err(err) if err.is_timeout() => {
                warn!("sending message to equipment timed out");
                Err(StepError::Waiting)
            }
            Err(err) => {
                warn!("link fault while sending: {err}");
                Err(StepError::Link(err))
            }
        }
    }

    /// Receives and parses one typed answer.
    ///
    /// A step completed on a previous entry replays from the recorded bytes;
    /// the link is not touched again.
    pub fn receive<L: LinkSession, R: Response>(&mut self, link: &mut L) -> StepResult<R> {
        let timeout = self.timeouts.receive;
        let top = self.top_mut();
        top.step += 1;
        if top.steps_done >= top.step {
            trace!("NOT receiving message from equipment, already received");
            return match &top.records[(top.step - 1) as usize] {
                StepRecord::Received(bytes) => R::parse(bytes).map_err(|err| {
                    warn!("replayed answer no longer parses: {err}");
                    StepError::Answer
                }),
                other => {
                    warn!("transaction replay mismatch at step {}: {other:?}", top.step);
                    Err(StepError::Answer)
                }
            };
        }

        debug!("trying to receive message from equipment");
        match link.receive(timeout) {
            Ok(bytes) => {
                debug!(
                    "received from equipment: {:?}",
                    String::from_utf8_lossy(&bytes)
                );
                // The step counts as consumed even when the answer does not
                // parse; the answer problem is escalated, not retried.
                top.steps_done += 1;
                let parsed = R::parse(&bytes);
                top.records.push(StepRecord::Received(bytes));
                parsed.map_err(|err| {
                    warn!("message from equipment not understood: {err}");
                    StepError::Answer
                })
            }
            Err(err) if err.is_timeout() => {
                warn!("receiving message from equipment timed out");
                Err(StepError::Waiting)
            }
            Err(err) => {
                warn!("link fault while receiving: {err}");
                Err(StepError::Link(err))
            }
        }
    }

    /// Blocks for one interrupt byte out of `expected`.
    ///
    /// A byte outside the expected set is first offered to the registered
    /// handler for that exact code; if nobody services it and the expected
    /// set is non-empty, the byte counts as an unexpected answer.
    pub fn expect_interrupt<L: LinkSession>(
        &mut self,
        link: &mut L,
        expected: &[u8],
    ) -> StepResult<u8> {
        let timeout = self.timeouts.receive;
        let top = self.frames.last_mut().expect("transaction stack never empty");
        top.step += 1;
        if top.steps_done >= top.step {
            trace!("NOT waiting for interrupt, already received");
            return match top.records[(top.step - 1) as usize] {
                StepRecord::Event(byte) | StepRecord::Polled(Some(byte)) => Ok(byte),
                ref other => {
                    warn!("transaction replay mismatch at step {}: {other:?}", top.step);
                    Err(StepError::Answer)
                }
            };
        }

        debug!("waiting for interrupt from equipment");
        let event = match link.wait_event(timeout) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!("waiting for interrupt from equipment timed out");
                return Err(StepError::Waiting);
            }
            Err(err) if err.is_timeout() => {
                warn!("waiting for interrupt from equipment timed out");
                return Err(StepError::Waiting);
            }
            Err(err) => {
                warn!("link fault while waiting for interrupt: {err}");
                return Err(StepError::Link(err));
            }
        };

        let byte = event.byte;
        top.steps_done += 1;
        top.records.push(StepRecord::Event(byte));
        debug!("received from equipment: interrupt 0x{byte:02x}");

        if expected.contains(&byte) {
            return Ok(byte);
        }

        // Give registered out-of-band handlers a chance before failing.
        for (code, handler) in self.hooks.iter_mut() {
            if *code == byte {
                handler(byte)?;
                return Ok(byte);
            }
        }

        if expected.is_empty() {
            Ok(byte)
        } else {
            warn!(
                "interrupt from equipment not understood, got 0x{byte:02x}, expected {expected:02x?}"
            );
            Err(StepError::Answer)
        }
    }

    /// Non-blocking check for one more interrupt byte.
    ///
    /// Nothing arriving within the timeout is not an error, merely
    /// `Ok(None)`; the step still counts as consumed so replay stays aligned.
    pub fn poll_interrupt<L: LinkSession>(&mut self, link: &mut L) -> StepResult<Option<u8>> {
        let timeout = self.timeouts.receive;
        let top = self.frames.last_mut().expect("transaction stack never empty");
        top.step += 1;
        if top.steps_done >= top.step {
            trace!("NOT polling for interrupt, already decided");
            return match top.records[(top.step - 1) as usize] {
                StepRecord::Polled(byte) => Ok(byte),
                StepRecord::Event(byte) => Ok(Some(byte)),
                StepRecord::Sent | StepRecord::Received(_) => {
                    warn!("transaction replay mismatch at step {}", top.step);
                    Err(StepError::Answer)
                }
            };
        }

        debug!("polling for additional interrupt from equipment");
        let event = match link.wait_event(timeout) {
            Ok(Some(event)) => Some(event),
            Ok(None) => None,
            Err(err) if err.is_timeout() => None,
            Err(err) => {
                warn!("link fault while polling for interrupt: {err}");
                return Err(StepError::Link(err));
            }
        };

        match event {
            Some(LinkEvent { byte }) => {
                top.steps_done += 1;
                top.records.push(StepRecord::Polled(Some(byte)));
                debug!("received from equipment: interrupt 0x{byte:02x}");
                for (code, handler) in self.hooks.iter_mut() {
                    if *code == byte {
                        handler(byte)?;
                        break;
                    }
                }
                Ok(Some(byte))
            }
            None => {
                debug!("no additional interrupt pending");
                top.steps_done += 1;
                top.records.push(StepRecord::Polled(None));
                Ok(None)
            }
        }
    }
}
