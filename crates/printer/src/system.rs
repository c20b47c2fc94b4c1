//! Printing to the system default printer.

use crate::{PrintError, PrintFuture, PrintJob, PrinterSink};

/// Sink that targets whatever printer the OS reports as default.
///
/// The default is looked up per job, so changing it takes effect without
/// restarting the agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrinter;

impl PrinterSink for SystemPrinter {
    fn name(&self) -> &str {
        "system"
    }

    fn print(&self, job: PrintJob) -> PrintFuture<'_> {
        Box::pin(print_job(job))
    }
}

#[cfg(unix)]
async fn print_job(job: PrintJob) -> Result<(), PrintError> {
    let printer = crate::cups::default_destination().await?;
    tracing::info!(%printer, document = %job.document_name, "submitting print job");

    let PrintJob {
        document_name,
        image,
        page,
    } = job;

    // Resampling a full page is CPU-bound; keep it off the runtime threads.
    let png = tokio::task::spawn_blocking(move || {
        let rendered = crate::render_to_page(&image, page);
        crate::encode_png(&rendered)
    })
    .await
    .map_err(|e| PrintError::Driver(format!("render task failed: {e}")))??;

    crate::cups::submit(&printer, &document_name, png).await
}

#[cfg(not(unix))]
async fn print_job(job: PrintJob) -> Result<(), PrintError> {
    tracing::warn!(document = %job.document_name, "no print backend for this platform");
    Err(PrintError::Unsupported(std::env::consts::OS))
}
