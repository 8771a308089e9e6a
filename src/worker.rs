//! Decode worker
//!
//! A single dedicated thread owning the [`Decoder`]. Frames arrive one at a
//! time through a private inbox; every outcome goes back to the session as an
//! [`Event::Decoded`] on the session's own inbox, in dispatch order.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use crate::config::DecodePath;
use crate::decoder::{decode_once, DecodeOutcome, Decoder};
use crate::frame::{Frame, ScanRegion};
use crate::luminance::LuminanceImage;
use crate::state::{Event, RequestId};
use crate::{Error, Result};

const WORKER_THREAD_NAME: &str = "qrcapture-decode";

enum WorkerMessage {
    Decode {
        request: RequestId,
        frame: Frame,
        region: Option<ScanRegion>,
    },
    Quit,
}

/// State living on the worker thread.
pub struct DecodeWorker<D> {
    decoder: D,
    path: DecodePath,
    inbox: Receiver<WorkerMessage>,
    outcomes: Sender<Event>,
    // Dropped when the thread ends, which is what `join_timeout` waits on.
    _exit_guard: Sender<()>,
}

impl<D: Decoder + 'static> DecodeWorker<D> {
    /// Start the worker thread.
    ///
    /// Outcomes are delivered as [`Event::Decoded`] on `outcomes`.
    pub fn spawn(decoder: D, path: DecodePath, outcomes: Sender<Event>) -> Result<WorkerHandle> {
        let (inbox_tx, inbox_rx) = unbounded();
        let (exit_tx, exit_rx) = crossbeam_channel::bounded(0);

        let worker = DecodeWorker {
            decoder,
            path,
            inbox: inbox_rx,
            outcomes,
            _exit_guard: exit_tx,
        };
        let thread = spawn_thread(WORKER_THREAD_NAME, move || worker.run()).map_err(|err| {
            Error::Spawn {
                reason: err.to_string(),
            }
        })?;

        Ok(WorkerHandle {
            inbox: inbox_tx,
            exited: exit_rx,
            thread: Some(thread),
            stopping: false,
        })
    }
}

impl<D: Decoder> DecodeWorker<D> {
    fn run(mut self) {
        debug!(path = ?self.path, "decode worker started");
        while let Ok(message) = self.inbox.recv() {
            match message {
                WorkerMessage::Decode {
                    request,
                    frame,
                    region,
                } => {
                    let outcome = self.decode(frame, region);
                    trace!(request = request.0, success = outcome.is_success(), "decode finished");
                    if self.outcomes.send(Event::Decoded { request, outcome }).is_err() {
                        debug!("session inbox closed; stopping decode worker");
                        break;
                    }
                }
                WorkerMessage::Quit => break,
            }
        }
        debug!("decode worker stopped");
    }

    /// One attempt. The frame is consumed and dropped here.
    fn decode(&mut self, frame: Frame, region: Option<ScanRegion>) -> DecodeOutcome {
        match LuminanceImage::for_path(&frame, self.path, region) {
            Ok(image) => decode_once(&mut self.decoder, &image),
            Err(err) => {
                debug!("skipping frame: {err}");
                self.decoder.reset();
                DecodeOutcome::Failure
            }
        }
    }
}

/// Session-side handle to a running [`DecodeWorker`].
pub struct WorkerHandle {
    inbox: Sender<WorkerMessage>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    stopping: bool,
}

impl WorkerHandle {
    /// Queue a frame for decoding.
    ///
    /// Fails with [`Error::Closed`] once [`WorkerHandle::stop`] was called or
    /// the worker thread is gone.
    pub fn submit(
        &self,
        request: RequestId,
        frame: Frame,
        region: Option<ScanRegion>,
    ) -> Result<()> {
        if self.stopping {
            return Err(Error::Closed);
        }
        self.inbox
            .send(WorkerMessage::Decode {
                request,
                frame,
                region,
            })
            .map_err(|_| Error::Closed)
    }

    /// Ask the worker to exit after the decode in progress, if any.
    ///
    /// Frames still queued behind the stop request are discarded.
    pub fn stop(&mut self) {
        if !self.stopping {
            self.stopping = true;
            let _ = self.inbox.send(WorkerMessage::Quit);
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Wait up to `timeout` for the worker thread to exit.
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<()> {
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(Error::ShutdownTimeout { waited: timeout }),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!("decode worker thread panicked");
                    }
                }
                Ok(())
            }
        }
    }

    /// [`stop`](Self::stop) followed by a bounded [`join_timeout`](Self::join_timeout).
    pub fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        self.stop();
        self.join_timeout(timeout)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Never block here; a slow decode just finishes on its own.
        self.stop();
    }
}

/// Spawn a named thread that inherits the caller's `tracing` dispatcher.
fn spawn_thread<F, T>(name: &str, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
