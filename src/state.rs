//! Capture state machine
//!
//! [`transition`] is a pure function from the current [`CaptureState`] and an
//! inbound [`Event`] to the next state plus the [`Effect`]s the session must
//! carry out, in order. Every frame request carries a [`RequestId`]; frames
//! and outcomes tagged with anything but the request currently in flight are
//! stale and dropped, which is what keeps at most one decode in flight.

use crate::decoder::DecodeOutcome;
use crate::frame::Frame;

/// Tag attached to one frame request and everything that flows from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// `request` was issued and its outcome has not been observed yet.
    /// `dispatched` is set once its frame went to the decode worker.
    Preview { request: RequestId, dispatched: bool },
    /// Idle after a result; waits for an explicit restart. `last` is the most
    /// recent request issued.
    Success { last: RequestId },
    /// Shut down. Terminal.
    Done,
}

impl CaptureState {
    /// State of a freshly built session, before the first restart.
    pub fn initial() -> Self {
        Self::Success {
            last: RequestId::default(),
        }
    }

    /// The request whose outcome is still pending, if any.
    pub fn in_flight(&self) -> Option<RequestId> {
        match self {
            Self::Preview { request, .. } => Some(*request),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum Event {
    /// Re-arm after a success or an explicit user retry.
    Restart,
    /// The frame source answered a request.
    FrameReady { request: RequestId, frame: Frame },
    /// The decode worker finished the frame for `request`.
    Decoded {
        request: RequestId,
        outcome: DecodeOutcome,
    },
    /// Tear the session down.
    Shutdown,
}

/// Side effects requested by a transition, executed in order.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Ask the frame source for exactly one frame.
    RequestFrame(RequestId),
    /// Hand a frame to the decode worker.
    Dispatch { request: RequestId, frame: Frame },
    /// Surface decoded text to the result sink.
    NotifySuccess(String),
    /// Tell the result sink an attempt found nothing.
    NotifyFailure,
    /// Stop the camera preview stream.
    StopPreview,
    /// Ask the decode worker to exit.
    StopWorker,
    /// Block (bounded) until the decode worker has exited.
    AwaitWorker,
    /// Discard every message already queued for the session.
    PurgeInbox,
}

/// Compute the next state and the effects to run for `event`.
pub fn transition(state: CaptureState, event: Event) -> (CaptureState, Vec<Effect>) {
    use CaptureState::*;

    match (state, event) {
        (Done, _) => (Done, Vec::new()),

        (_, Event::Shutdown) => (
            Done,
            vec![
                Effect::StopPreview,
                Effect::StopWorker,
                Effect::AwaitWorker,
                Effect::PurgeInbox,
            ],
        ),

        (Success { last }, Event::Restart) => {
            let request = last.next();
            (
                Preview {
                    request,
                    dispatched: false,
                },
                vec![Effect::RequestFrame(request)],
            )
        }

        (
            Preview {
                request,
                dispatched: false,
            },
            Event::FrameReady {
                request: tag,
                frame,
            },
        ) if tag == request => (
            Preview {
                request,
                dispatched: true,
            },
            vec![Effect::Dispatch { request, frame }],
        ),

        (
            Preview {
                request,
                dispatched: true,
            },
            Event::Decoded {
                request: tag,
                outcome,
            },
        ) if tag == request => {
            match outcome {
                DecodeOutcome::Success(text) => (
                    Success { last: request },
                    vec![Effect::NotifySuccess(text)],
                ),
                DecodeOutcome::Failure => {
                    let next = request.next();
                    (
                        Preview {
                            request: next,
                            dispatched: false,
                        },
                        vec![Effect::NotifyFailure, Effect::RequestFrame(next)],
                    )
                }
            }
        }

        // Restart while a request is pending, a second frame for the same
        // request, or a stale frame/outcome.
        (state, _) => (state, Vec::new()),
    }
}
