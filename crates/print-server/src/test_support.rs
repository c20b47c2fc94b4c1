//! Shared fakes for unit tests.

use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use wsprint_printer::{PageBounds, PrintError, PrintFuture, PrintJob, PrinterSink};

/// What the fake sink saw for one job.
#[derive(Debug, Clone)]
pub(crate) struct RecordedJob {
    pub document_name: String,
    pub width: u32,
    pub height: u32,
    pub first_pixel: [u8; 3],
}

/// Sink that records every job instead of printing.
pub(crate) struct RecordingPrinter {
    jobs: Mutex<Vec<RecordedJob>>,
    fail: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingPrinter {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// A sink whose driver always fails (jobs are still recorded).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PrinterSink for RecordingPrinter {
    fn name(&self) -> &str {
        "recording"
    }

    fn print(&self, job: PrintJob) -> PrintFuture<'_> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let rgb = job.image.to_rgb8();
            self.jobs.lock().unwrap().push(RecordedJob {
                document_name: job.document_name,
                width: rgb.width(),
                height: rgb.height(),
                first_pixel: rgb.get_pixel(0, 0).0,
            });

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                Err(PrintError::Driver("paper jam".into()))
            } else {
                Ok(())
            }
        })
    }
}

pub(crate) fn test_job(name: &str, width: u32, height: u32) -> PrintJob {
    PrintJob {
        document_name: name.into(),
        image: DynamicImage::new_rgb8(width, height),
        page: PageBounds::default(),
    }
}

/// Base64 of a solid red PNG.
pub(crate) fn red_png_base64(width: u32, height: u32) -> String {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 0, 0]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf)
}

/// A complete `print` message for a 10x10 red PNG.
pub(crate) fn print_message(file_name: &str) -> String {
    serde_json::json!({
        "action": "print",
        "imageData": red_png_base64(10, 10),
        "fileName": file_name,
    })
    .to_string()
}
