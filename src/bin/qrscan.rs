//! Command-line QR scanner
//!
//! Decodes QR codes from image files. By default every file is decoded as a
//! still image. With `--session` the files are fed as camera frames through a
//! capture session instead, the way a live camera would, stopping at the
//! first code found.

use std::collections::VecDeque;
use std::process;
use std::time::Duration;

use clap::Parser;
use qrcapture::{
    decode_static_image_with, CaptureSession, DecodeHints, DecodePath, Error, Feedback, Frame,
    FrameReady, FrameSource, Rect, ResultSink, ScanConfig,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Scan and decode QR codes from one or more image files
#[derive(Parser)]
#[command(name = "qrscan")]
#[command(version)]
#[command(about = "Scan and decode QR codes from one or more image files", long_about = None)]
struct Args {
    /// Minimal output, only print decoded data
    #[arg(short, long)]
    quiet: bool,

    /// Feed the files as camera frames through a capture session
    #[arg(long)]
    session: bool,

    /// Decode the whole frame, rotated to portrait (session mode)
    #[arg(long)]
    full_frame: bool,

    /// Viewfinder crop as LEFT,TOP,WIDTH,HEIGHT (session mode)
    #[arg(long, value_parser = parse_crop)]
    crop: Option<Rect>,

    /// Character set of the encoded text
    #[arg(long, default_value = "utf-8")]
    charset: String,

    /// Do not retry on the inverted image
    #[arg(long)]
    no_try_harder: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Image files to scan
    #[arg(required = true)]
    files: Vec<String>,
}

fn parse_crop(value: &str) -> Result<Rect, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid crop '{value}': {e}"))?;
    match parts[..] {
        [left, top, width, height] if width > 0 && height > 0 => {
            Ok(Rect::from_xywh(left, top, width, height))
        }
        _ => Err(format!(
            "invalid crop '{value}': expected LEFT,TOP,WIDTH,HEIGHT with a positive size"
        )),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_gray(filename: &str) -> Result<(Vec<u8>, u32, u32), String> {
    let img = ::image::ImageReader::open(filename)
        .map_err(|e| format!("Failed to open image '{}': {}", filename, e))?
        .decode()
        .map_err(|e| format!("Failed to decode image '{}': {}", filename, e))?;
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();
    Ok((gray.into_raw(), width, height))
}

/// Serves the given images as camera frames, one per request.
struct ImageFrames {
    frames: VecDeque<Frame>,
}

impl FrameSource for ImageFrames {
    fn start_preview(&mut self) -> qrcapture::Result<()> {
        if self.frames.is_empty() {
            return Err(Error::driver("no frames to preview"));
        }
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.frames.clear();
    }

    fn request_one_frame(&mut self, ready: FrameReady) {
        match self.frames.pop_front() {
            Some(frame) => {
                ready.deliver(frame);
            }
            None => debug!(request = ready.request().0, "out of frames"),
        }
    }
}

struct PrintSink {
    crop: Option<Rect>,
    quiet: bool,
    decoded: usize,
}

impl ResultSink for PrintSink {
    fn crop_rectangle(&self) -> Option<Rect> {
        self.crop
    }

    fn on_decode_success(&mut self, text: &str) {
        self.decoded += 1;
        if self.quiet {
            println!("{}", text);
        } else {
            println!("QR-Code:{}", text);
        }
    }

    fn on_camera_error(&mut self, error: &Error) {
        if !self.quiet {
            eprintln!("Camera error: {}", error);
        }
    }
}

fn run_session(args: &Args, config: ScanConfig, images: Vec<(Vec<u8>, u32, u32)>) -> usize {
    let source = ImageFrames {
        frames: images
            .into_iter()
            .map(|(data, width, height)| Frame::new(data, width, height))
            .collect(),
    };
    let sink = PrintSink {
        crop: args.crop,
        quiet: args.quiet,
        decoded: 0,
    };

    let mut session = match CaptureSession::start(source, sink, config.feedback(Feedback::NONE)) {
        Ok(session) => session,
        Err(_) => return 0,
    };

    // Runs until the first success or until the frames run out.
    session.run_until_idle(Duration::from_millis(250));
    session.shutdown();
    session.sink().decoded
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let hints = DecodeHints::new()
        .character_set(args.charset.clone())
        .try_harder(!args.no_try_harder);
    let path = if args.full_frame {
        DecodePath::FullFrame
    } else {
        DecodePath::Cropped
    };
    let config = ScanConfig::new().hints(hints).decode_path(path);

    let mut images = Vec::with_capacity(args.files.len());
    for filename in &args.files {
        match load_gray(filename) {
            Ok(image) => images.push(image),
            Err(e) => {
                if !args.quiet {
                    eprintln!("{}", e);
                }
                process::exit(1);
            }
        }
    }

    let total = if args.session {
        run_session(&args, config, images)
    } else {
        if args.crop.is_some() || args.full_frame {
            warn!("--crop and --full-frame only apply with --session");
        }
        let mut total = 0;
        for (filename, (data, width, height)) in args.files.iter().zip(&images) {
            let text = decode_static_image_with(&config, data, *width, *height);
            if text.is_empty() {
                debug!("no QR code in '{}'", filename);
                continue;
            }
            total += 1;
            if args.quiet {
                println!("{}", text);
            } else {
                println!("QR-Code:{}", text);
            }
        }
        total
    };

    if total == 0 {
        if !args.quiet {
            eprintln!("No QR codes found");
        }
        process::exit(1);
    }
    if !args.quiet {
        eprintln!(
            "scanned {} QR code(s) from {} image(s)",
            total,
            args.files.len()
        );
    }
}
