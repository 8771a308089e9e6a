//! Integration tests for live capture sessions
//!
//! These drive a full session (frame source, decode worker, QR backend and
//! result sink) with synthetic camera frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::Luma;
use qrcapture::{
    CaptureSession, CaptureState, Decoder, Error, Feedback, Frame, FrameReady,
    FrameSource, LuminanceImage, PlatformMetrics, Rect, ResultSink, ScanConfig,
};
use qrcode::QrCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const IDLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq)]
enum Call {
    CameraReady,
    CameraError,
    Feedback,
    Success(String),
    Failure,
}

/// Sink recording every callback; the log stays readable after the session is gone.
#[derive(Clone, Default)]
struct SharedSink {
    crop: Option<Rect>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl SharedSink {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ResultSink for SharedSink {
    fn crop_rectangle(&self) -> Option<Rect> {
        self.crop
    }

    fn on_decode_success(&mut self, text: &str) {
        self.push(Call::Success(text.to_string()));
    }

    fn on_decode_failure(&mut self) {
        self.push(Call::Failure);
    }

    fn on_camera_ready(&mut self) {
        self.push(Call::CameraReady);
    }

    fn on_camera_error(&mut self, _error: &Error) {
        self.push(Call::CameraError);
    }

    fn play_feedback(&mut self, _feedback: Feedback) {
        self.push(Call::Feedback);
    }
}

/// Camera stand-in that answers each request from a callback thread.
struct ThreadedCamera {
    frames: VecDeque<Frame>,
    latency: Duration,
    stopped: Arc<Mutex<bool>>,
    fail_start: bool,
}

impl ThreadedCamera {
    fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            latency: Duration::from_millis(5),
            stopped: Arc::new(Mutex::new(false)),
            fail_start: false,
        }
    }
}

impl FrameSource for ThreadedCamera {
    fn start_preview(&mut self) -> qrcapture::Result<()> {
        if self.fail_start {
            return Err(Error::driver("Fail to connect to camera service"));
        }
        Ok(())
    }

    fn stop_preview(&mut self) {
        *self.stopped.lock().unwrap() = true;
    }

    fn request_one_frame(&mut self, ready: FrameReady) {
        if let Some(frame) = self.frames.pop_front() {
            let latency = self.latency;
            thread::spawn(move || {
                thread::sleep(latency);
                ready.deliver(frame);
            });
        }
    }
}

struct StatusBar(u32);

impl PlatformMetrics for StatusBar {
    fn status_bar_height(&self) -> u32 {
        self.0
    }
}

fn qr_gray(data: &str) -> image::GrayImage {
    let code = QrCode::new(data.as_bytes()).expect("Failed to generate QR code");
    code.render::<Luma<u8>>().quiet_zone(true).build()
}

fn qr_frame(data: &str) -> Frame {
    let img = qr_gray(data);
    let (width, height) = img.dimensions();
    Frame::new(img.into_raw(), width, height)
}

fn noise_frame(rng: &mut StdRng, width: u32, height: u32) -> Frame {
    let data = (0..width * height).map(|_| rng.gen::<u8>()).collect();
    Frame::new(data, width, height)
}

/// A white frame with the QR code pasted at (`left`, `top`).
fn framed_qr(data: &str, left: u32, top: u32, width: u32, height: u32) -> (Frame, u32, u32) {
    let qr = qr_gray(data);
    let mut pixels = vec![255u8; (width * height) as usize];
    for (x, y, px) in qr.enumerate_pixels() {
        pixels[((top + y) * width + left + x) as usize] = px.0[0];
    }
    (Frame::new(pixels, width, height), qr.width(), qr.height())
}

#[test]
fn test_scan_sequence_reports_every_attempt_in_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let frames = vec![
        noise_frame(&mut rng, 240, 240),
        noise_frame(&mut rng, 240, 240),
        qr_frame("hello"),
        noise_frame(&mut rng, 240, 240),
    ];
    let sink = SharedSink::default();
    let config = ScanConfig::new().feedback(Feedback::NONE);
    let mut session = CaptureSession::start(ThreadedCamera::new(frames), sink.clone(), config)
        .expect("session should start");

    session.run_until_idle(IDLE);
    assert_eq!(
        sink.calls(),
        vec![
            Call::CameraReady,
            Call::Failure,
            Call::Failure,
            Call::Success("hello".to_string()),
        ]
    );

    // Idle after a result until restarted.
    assert!(session.state().in_flight().is_none());
    session.restart_preview_and_decode(None);
    session.run_until_idle(IDLE);
    assert_eq!(sink.calls().last(), Some(&Call::Failure));

    let calls = sink.calls();
    let successes = calls.iter().filter(|c| matches!(c, Call::Success(_))).count();
    let failures = calls.iter().filter(|c| **c == Call::Failure).count();
    assert_eq!((successes, failures), (1, 3));

    session.shutdown();
    assert_eq!(session.state(), CaptureState::Done);
}

#[test]
fn test_feedback_plays_before_result() {
    let sink = SharedSink::default();
    let mut session = CaptureSession::start(
        ThreadedCamera::new(vec![qr_frame("beep")]),
        sink.clone(),
        ScanConfig::new(),
    )
    .unwrap();
    session.run_until_idle(IDLE);
    assert_eq!(
        sink.calls(),
        vec![
            Call::CameraReady,
            Call::Feedback,
            Call::Success("beep".to_string())
        ]
    );
}

#[test]
fn test_crop_selects_region_under_viewfinder() {
    let status_bar = 24;
    let (frame, qr_w, qr_h) = framed_qr("in the box", 120, 100, 480, 420);

    // Viewfinder over the code, in window coordinates.
    let on_target = SharedSink {
        crop: Some(Rect::from_xywh(120, 100 + status_bar, qr_w as i32, qr_h as i32)),
        ..Default::default()
    };
    let mut session =
        CaptureSession::builder(ThreadedCamera::new(vec![frame.clone()]), on_target.clone())
            .config(ScanConfig::new().feedback(Feedback::NONE))
            .metrics(StatusBar(status_bar as u32))
            .start()
            .unwrap();
    session.run_until_idle(IDLE);
    assert_eq!(
        on_target.calls(),
        vec![Call::CameraReady, Call::Success("in the box".to_string())]
    );
    let region = session.scan_region().expect("region resolved");
    assert!(region.fits_within(480, 420));
    assert!(region.left < 120 && region.top < 100);

    // Viewfinder over blank paper.
    let off_target = SharedSink {
        crop: Some(Rect::from_xywh(0, status_bar, 60, 60)),
        ..Default::default()
    };
    let mut session = CaptureSession::builder(ThreadedCamera::new(vec![frame]), off_target.clone())
        .metrics(StatusBar(status_bar as u32))
        .start()
        .unwrap();
    session.run_until_idle(IDLE);
    assert_eq!(off_target.calls(), vec![Call::CameraReady, Call::Failure]);
}

#[test]
fn test_full_frame_path_decodes_rotated_code() {
    let sink = SharedSink::default();
    let config = ScanConfig::new()
        .decode_path(qrcapture::DecodePath::FullFrame)
        .feedback(Feedback::NONE);
    let mut session =
        CaptureSession::start(ThreadedCamera::new(vec![qr_frame("portrait")]), sink.clone(), config)
            .unwrap();
    session.run_until_idle(IDLE);
    assert_eq!(
        sink.calls(),
        vec![Call::CameraReady, Call::Success("portrait".to_string())]
    );
}

#[test]
fn test_camera_failure_is_reported() {
    let mut camera = ThreadedCamera::new(vec![]);
    camera.fail_start = true;
    let sink = SharedSink::default();

    let result = CaptureSession::start(camera, sink.clone(), ScanConfig::new());
    match result {
        Err(Error::DriverFailure { reason }) => {
            assert!(reason.contains("camera service"), "reason: {reason}")
        }
        Err(other) => panic!("expected a driver failure, got {other}"),
        Ok(_) => panic!("session started without a camera"),
    }
    assert_eq!(sink.calls(), vec![Call::CameraError]);
}

struct SlowDecoder {
    delay: Duration,
}

impl Decoder for SlowDecoder {
    fn decode(&mut self, _image: &LuminanceImage) -> qrcapture::Result<String> {
        thread::sleep(self.delay);
        Ok("too late".to_string())
    }

    fn reset(&mut self) {}
}

#[test]
fn test_shutdown_is_bounded_and_silences_results() {
    let camera = ThreadedCamera::new(vec![qr_frame("slow")]);
    let stopped = camera.stopped.clone();
    let sink = SharedSink::default();
    let mut session = CaptureSession::builder(camera, sink.clone())
        .decoder(SlowDecoder {
            delay: Duration::from_millis(800),
        })
        .start()
        .unwrap();

    // Handle the frame so the slow decode is in progress.
    assert!(session.poll(Duration::from_secs(5)));
    assert!(matches!(
        session.state(),
        CaptureState::Preview {
            dispatched: true,
            ..
        }
    ));
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    session.shutdown();
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(450), "waited {waited:?}");
    assert!(waited < Duration::from_millis(780), "waited {waited:?}");
    assert!(*stopped.lock().unwrap());

    // The abandoned decode finishes, but its result goes nowhere.
    thread::sleep(Duration::from_millis(500));
    assert!(!session.poll(Duration::from_millis(50)));
    drop(session);
    assert_eq!(sink.calls(), vec![Call::CameraReady]);
}

#[test]
fn test_delayed_restart_waits() {
    let sink = SharedSink::default();
    let mut session = CaptureSession::start(
        ThreadedCamera::new(vec![qr_frame("first"), qr_frame("second")]),
        sink.clone(),
        ScanConfig::new().feedback(Feedback::NONE),
    )
    .unwrap();
    session.run_until_idle(IDLE);
    assert_eq!(sink.calls().len(), 2);

    let delay = Duration::from_millis(400);
    let armed = Instant::now();
    session.restart_preview_and_decode(Some(delay));
    assert!(!session.poll(Duration::from_millis(100)));
    assert_eq!(sink.calls().len(), 2);

    while sink.calls().len() < 3 && armed.elapsed() < Duration::from_secs(5) {
        session.poll(Duration::from_millis(50));
    }
    assert!(armed.elapsed() >= delay);
    assert_eq!(sink.calls().last(), Some(&Call::Success("second".to_string())));
}

#[test]
fn test_restart_timer_does_not_fire_after_shutdown() {
    let sink = SharedSink::default();
    let mut session = CaptureSession::start(
        ThreadedCamera::new(vec![qr_frame("once"), qr_frame("never")]),
        sink.clone(),
        ScanConfig::new().feedback(Feedback::NONE),
    )
    .unwrap();
    session.run_until_idle(IDLE);
    session.restart_preview_and_decode(Some(Duration::from_millis(50)));
    session.shutdown();

    thread::sleep(Duration::from_millis(100));
    assert!(!session.poll(Duration::from_millis(100)));
    assert_eq!(
        sink.calls(),
        vec![Call::CameraReady, Call::Success("once".to_string())]
    );
}
