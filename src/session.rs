//! Capture session
//!
//! [`CaptureSession`] is the coordinator between a [`FrameSource`], the decode
//! worker and a [`ResultSink`]. It lives on the caller's (UI/camera callback)
//! context and is purely reactive: frames and decode outcomes land on its
//! inbox and are handled one at a time by [`CaptureSession::poll`]. The only
//! blocking operation is [`CaptureSession::shutdown`], bounded by
//! [`ScanConfig::shutdown_wait`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use qrcapture::{CaptureSession, Frame, FrameReady, FrameSource, Rect, ResultSink, ScanConfig};
//!
//! struct Camera;
//!
//! impl FrameSource for Camera {
//!     fn start_preview(&mut self) -> qrcapture::Result<()> {
//!         Ok(())
//!     }
//!     fn stop_preview(&mut self) {}
//!     fn request_one_frame(&mut self, ready: FrameReady) {
//!         // Hand `ready` to the camera callback; it calls `deliver` once.
//!         ready.deliver(Frame::new(vec![0; 640 * 480], 640, 480));
//!     }
//! }
//!
//! struct Screen;
//!
//! impl ResultSink for Screen {
//!     fn crop_rectangle(&self) -> Option<Rect> {
//!         Some(Rect::from_xywh(170, 90, 300, 300))
//!     }
//!     fn on_decode_success(&mut self, text: &str) {
//!         println!("{text}");
//!     }
//! }
//!
//! let mut session = CaptureSession::start(Camera, Screen, ScanConfig::new())?;
//! session.run_until_idle(Duration::from_millis(100));
//! session.shutdown();
//! # Ok::<(), qrcapture::Error>(())
//! ```

use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, select, unbounded, Receiver, Sender};
use tracing::{debug, info, trace, warn};

use crate::config::{DecodePath, Feedback, ScanConfig};
use crate::decoder::Decoder;
use crate::frame::{Frame, Rect, ScanRegion};
use crate::state::{transition, CaptureState, Effect, Event, RequestId};
use crate::worker::{DecodeWorker, WorkerHandle};
use crate::{Error, Result};

/// Supplies camera frames, one per request.
pub trait FrameSource {
    /// Start the preview stream. Errors are reported as camera failures.
    fn start_preview(&mut self) -> Result<()>;

    fn stop_preview(&mut self);

    /// Arrange for exactly one frame to be delivered through `ready`.
    ///
    /// `ready` may be moved to another thread and delivered later. A source
    /// that has no frame to give may drop it.
    fn request_one_frame(&mut self, ready: FrameReady);
}

/// One-shot delivery slot handed to [`FrameSource::request_one_frame`].
#[derive(Debug)]
pub struct FrameReady {
    request: RequestId,
    inbox: Sender<Event>,
}

impl FrameReady {
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Post the frame to the session. Returns `false` if the session is gone.
    pub fn deliver(self, frame: Frame) -> bool {
        self.inbox
            .send(Event::FrameReady {
                request: self.request,
                frame,
            })
            .is_ok()
    }
}

/// Consumer of scan results: usually the UI.
pub trait ResultSink {
    /// Crop rectangle of the viewfinder, in window coordinates.
    ///
    /// `None` decodes the whole frame.
    fn crop_rectangle(&self) -> Option<Rect>;

    fn on_decode_success(&mut self, text: &str);

    fn on_decode_failure(&mut self) {}

    fn on_camera_ready(&mut self) {}

    fn on_camera_error(&mut self, _error: &Error) {}

    /// Play success feedback (beep, vibration) before the result is shown.
    fn play_feedback(&mut self, _feedback: Feedback) {}
}

impl<R: ResultSink + ?Sized> ResultSink for &mut R {
    fn crop_rectangle(&self) -> Option<Rect> {
        (**self).crop_rectangle()
    }

    fn on_decode_success(&mut self, text: &str) {
        (**self).on_decode_success(text)
    }

    fn on_decode_failure(&mut self) {
        (**self).on_decode_failure()
    }

    fn on_camera_ready(&mut self) {
        (**self).on_camera_ready()
    }

    fn on_camera_error(&mut self, error: &Error) {
        (**self).on_camera_error(error)
    }

    fn play_feedback(&mut self, feedback: Feedback) {
        (**self).play_feedback(feedback)
    }
}

/// Platform measurements needed to map UI coordinates onto frames.
pub trait PlatformMetrics {
    /// Height of the system status bar above the viewfinder, in pixels.
    fn status_bar_height(&self) -> u32;
}

/// Metrics for a full-screen surface with no insets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInsets;

impl PlatformMetrics for NoInsets {
    fn status_bar_height(&self) -> u32 {
        0
    }
}

enum RegionCache {
    Unresolved,
    Resolved(Option<ScanRegion>),
}

/// Builder for a [`CaptureSession`] with non-default collaborators.
pub struct SessionBuilder<S, R> {
    source: S,
    sink: R,
    config: ScanConfig,
    decoder: Option<Box<dyn Decoder>>,
    metrics: Box<dyn PlatformMetrics>,
}

impl<S: FrameSource, R: ResultSink> SessionBuilder<S, R> {
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `decoder` instead of the bundled QR decoder.
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Box::new(decoder));
        self
    }

    pub fn metrics(mut self, metrics: impl PlatformMetrics + 'static) -> Self {
        self.metrics = Box::new(metrics);
        self
    }

    /// Start the preview, spawn the decode worker and request the first frame.
    ///
    /// A preview that fails to start is reported through
    /// [`ResultSink::on_camera_error`] and returned as
    /// [`Error::DriverFailure`].
    pub fn start(self) -> Result<CaptureSession<S, R>> {
        let SessionBuilder {
            mut source,
            mut sink,
            config,
            decoder,
            metrics,
        } = self;

        let decoder = match decoder {
            Some(decoder) => decoder,
            None => default_decoder(&config)?,
        };

        if let Err(err) = source.start_preview() {
            let err = match err {
                Error::DriverFailure { .. } => err,
                other => Error::driver(other),
            };
            warn!("camera preview failed to start: {err}");
            sink.on_camera_error(&err);
            return Err(err);
        }

        let (inbox_tx, inbox_rx) = unbounded();
        let worker = match DecodeWorker::spawn(decoder, config.path(), inbox_tx.clone()) {
            Ok(worker) => worker,
            Err(err) => {
                source.stop_preview();
                sink.on_camera_error(&err);
                return Err(err);
            }
        };

        // Window coordinates to preview coordinates.
        let inset = metrics.status_bar_height().min(i32::MAX as u32) as i32;
        let crop = sink.crop_rectangle().map(|rect| rect.offset(0, -inset));
        debug!(?crop, path = ?config.path(), "capture session starting");

        let mut session = CaptureSession {
            source,
            sink,
            config,
            state: CaptureState::initial(),
            worker,
            inbox_tx,
            inbox_rx,
            crop,
            region: RegionCache::Unresolved,
            restart_timer: None,
        };
        session.sink.on_camera_ready();
        session.restart_preview_and_decode(None);
        Ok(session)
    }
}

#[cfg(feature = "qr")]
fn default_decoder(config: &ScanConfig) -> Result<Box<dyn Decoder>> {
    Ok(Box::new(crate::decoder::qr::QrDecoder::new(
        config.decode_hints().clone(),
    )))
}

#[cfg(not(feature = "qr"))]
fn default_decoder(_config: &ScanConfig) -> Result<Box<dyn Decoder>> {
    Err(Error::Spawn {
        reason: "no decoder configured and the `qr` feature is disabled".to_string(),
    })
}

enum Wake {
    Inbox(Event),
    Timer,
    Idle,
}

/// One live scan: frame requests, decode dispatch and result delivery.
pub struct CaptureSession<S: FrameSource, R: ResultSink> {
    source: S,
    sink: R,
    config: ScanConfig,
    state: CaptureState,
    worker: WorkerHandle,
    inbox_tx: Sender<Event>,
    inbox_rx: Receiver<Event>,
    crop: Option<Rect>,
    region: RegionCache,
    restart_timer: Option<Receiver<Instant>>,
}

impl<S: FrameSource, R: ResultSink> CaptureSession<S, R> {
    pub fn builder(source: S, sink: R) -> SessionBuilder<S, R> {
        SessionBuilder {
            source,
            sink,
            config: ScanConfig::new(),
            decoder: None,
            metrics: Box::new(NoInsets),
        }
    }

    /// Start a continuous scan with the bundled decoder.
    pub fn start(source: S, sink: R, config: ScanConfig) -> Result<Self> {
        Self::builder(source, sink).config(config).start()
    }

    /// Start a continuous scan with a caller-supplied decoder.
    pub fn start_with_decoder(
        source: S,
        sink: R,
        config: ScanConfig,
        decoder: impl Decoder + 'static,
    ) -> Result<Self> {
        Self::builder(source, sink)
            .config(config)
            .decoder(decoder)
            .start()
    }

    /// Re-arm after a success or an explicit user retry.
    ///
    /// With a non-zero `delay` the restart fires from [`poll`](Self::poll)
    /// once the delay has passed. Ignored unless the session is idle after a
    /// result.
    pub fn restart_preview_and_decode(&mut self, delay: Option<Duration>) {
        match delay {
            Some(delay) if !delay.is_zero() => {
                if !self.state.is_done() {
                    self.restart_timer = Some(after(delay));
                }
            }
            _ => self.handle(Event::Restart),
        }
    }

    /// Wait up to `timeout` for one event and handle it.
    ///
    /// Returns `false` if nothing arrived or the session is shut down.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        if self.state.is_done() {
            return false;
        }

        let timer = self.restart_timer.clone().unwrap_or_else(never);
        let wake = select! {
            recv(self.inbox_rx) -> event => match event {
                Ok(event) => Wake::Inbox(event),
                Err(_) => Wake::Idle,
            },
            recv(timer) -> _ => Wake::Timer,
            default(timeout) => Wake::Idle,
        };

        match wake {
            Wake::Inbox(event) => self.handle(event),
            Wake::Timer => {
                self.restart_timer = None;
                self.handle(Event::Restart);
            }
            Wake::Idle => return false,
        }
        true
    }

    /// Keep handling events until none arrives for `idle`.
    ///
    /// Returns the number of events handled.
    pub fn run_until_idle(&mut self, idle: Duration) -> usize {
        let mut handled = 0;
        while self.poll(idle) {
            handled += 1;
        }
        handled
    }

    /// Tear the session down.
    ///
    /// Stops the preview, stops the decode worker and waits for it at most
    /// [`ScanConfig::shutdown_wait`]; a worker that does not stop in time is
    /// logged and abandoned. Nothing reaches the result sink after this
    /// returns. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        self.handle(Event::Shutdown);
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The region frames are decoded against, once the first frame arrived.
    pub fn scan_region(&self) -> Option<ScanRegion> {
        match self.region {
            RegionCache::Resolved(region) => region,
            RegionCache::Unresolved => None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }

    fn handle(&mut self, event: Event) {
        let (next, effects) = transition(self.state, event);
        if next != self.state {
            trace!(from = ?self.state, to = ?next, "capture state");
        }
        self.state = next;
        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::RequestFrame(request) => {
                self.source.request_one_frame(FrameReady {
                    request,
                    inbox: self.inbox_tx.clone(),
                });
            }
            Effect::Dispatch { request, frame } => {
                let region = self.region_for(&frame);
                if let Err(err) = self.worker.submit(request, frame, region) {
                    warn!("could not dispatch frame {}: {err}", request.0);
                }
            }
            Effect::NotifySuccess(text) => {
                info!(bytes = text.len(), "barcode decoded");
                let feedback = self.config.feedback_effects();
                if feedback.is_enabled() {
                    self.sink.play_feedback(feedback);
                }
                self.sink.on_decode_success(&text);
            }
            Effect::NotifyFailure => self.sink.on_decode_failure(),
            Effect::StopPreview => self.source.stop_preview(),
            Effect::StopWorker => self.worker.stop(),
            Effect::AwaitWorker => {
                if let Err(err) = self.worker.join_timeout(self.config.shutdown_wait()) {
                    warn!("{err}; continuing teardown");
                }
            }
            Effect::PurgeInbox => {
                self.restart_timer = None;
                let purged = self.inbox_rx.try_iter().count();
                debug!(purged, "capture session shut down");
            }
        }
    }

    /// Resolve the scan region on the first frame and reuse it afterwards.
    fn region_for(&mut self, frame: &Frame) -> Option<ScanRegion> {
        if self.config.path() == DecodePath::FullFrame {
            return None;
        }
        if let RegionCache::Resolved(region) = self.region {
            return region;
        }

        let region = self.crop.and_then(|crop| {
            let region = ScanRegion::from_crop(
                crop,
                self.config.crop_scale_factor(),
                frame.width,
                frame.height,
            );
            if region.is_none() {
                warn!(
                    ?crop,
                    "crop rectangle lies outside the {}x{} frame; decoding the full frame",
                    frame.width,
                    frame.height
                );
            }
            region
        });
        debug!(?region, "scan region resolved");
        self.region = RegionCache::Resolved(region);
        region
    }
}

impl<S: FrameSource, R: ResultSink> Drop for CaptureSession<S, R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
