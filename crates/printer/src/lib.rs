//! Printer sinks for the wsprint agent.
//!
//! The server hands a fully decoded image to a [`PrinterSink`]; the sink
//! owns device selection, page geometry and driver invocation. Two sinks
//! ship with the crate:
//!
//! - [`SystemPrinter`]: renders onto the page and submits to the system
//!   default printer (CUPS `lp` on Unix).
//! - [`LogPrinter`]: logs the job and reports success (dry run).

mod render;
mod system;

#[cfg(unix)]
mod cups;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use image::DynamicImage;

pub use render::{encode_png, render_to_page};
pub use system::SystemPrinter;

/// A boxed future returned by [`PrinterSink::print`].
pub type PrintFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PrintError>> + Send + 'a>>;

/// Errors produced by a printer sink.
#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("no default printer configured")]
    NoDefaultPrinter,

    #[error("print driver failed: {0}")]
    Driver(String),

    #[error("printing is not supported on {0}")]
    Unsupported(&'static str),

    #[error("print timed out after {0:?}")]
    Timeout(Duration),

    #[error("printer still busy after {0:?}")]
    Busy(Duration),
}

/// Printable page area in hundredths of an inch, plus the raster
/// resolution used when rendering onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl PageBounds {
    /// US Letter at 300 DPI.
    pub const LETTER: Self = Self {
        width: 850,
        height: 1100,
        dpi: 300,
    };

    /// ISO A4 at 300 DPI.
    pub const A4: Self = Self {
        width: 827,
        height: 1169,
        dpi: 300,
    };

    /// Page size in device pixels (never zero).
    pub fn pixel_size(&self) -> (u32, u32) {
        let scale = |hundredths: u32| (u64::from(hundredths) * u64::from(self.dpi) / 100).max(1);
        let w = scale(self.width).min(u64::from(u32::MAX)) as u32;
        let h = scale(self.height).min(u64::from(u32::MAX)) as u32;
        (w, h)
    }
}

impl Default for PageBounds {
    fn default() -> Self {
        Self::LETTER
    }
}

/// A single print job.
#[derive(Debug, Clone)]
pub struct PrintJob {
    /// Display name shown in the print queue. Never used to pick a device.
    pub document_name: String,
    pub image: DynamicImage,
    pub page: PageBounds,
}

/// The printing device as seen by the server.
///
/// Implementations must tolerate being called from any task; the server
/// serializes calls so only one job is in flight at a time.
pub trait PrinterSink: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Prints one job. Completion means the driver accepted the job, not
    /// that paper came out.
    fn print(&self, job: PrintJob) -> PrintFuture<'_>;
}

/// Dry-run sink: logs the job and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPrinter;

impl PrinterSink for LogPrinter {
    fn name(&self) -> &str {
        "log"
    }

    fn print(&self, job: PrintJob) -> PrintFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                document = %job.document_name,
                width = job.image.width(),
                height = job.image.height(),
                "dry run: print job accepted"
            );
            Ok(())
        })
    }
}
