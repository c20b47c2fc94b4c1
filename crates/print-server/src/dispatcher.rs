//! Routes decoded requests to the printer and builds the reply.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use wsprint_printer::{PageBounds, PrintError, PrintJob};
use wsprint_protocol::{OutboundResponse, PrintRequest, decode_request, log_prefix};

use crate::printer::SharedPrinter;

/// Which failures are reported back to the client.
///
/// Malformed JSON is never answered. Base64 and image decoding failures
/// are always answered with an `error` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPolicy {
    /// Unknown actions, incomplete `print` requests and printer failures
    /// are logged only.
    #[default]
    Quiet,
    /// Every well-formed message gets exactly one response.
    Verbose,
}

impl ReplyPolicy {
    fn is_verbose(self) -> bool {
        self == Self::Verbose
    }
}

/// Failure on the print path of a valid request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("image decoding task failed: {0}")]
    Decode(#[from] tokio::task::JoinError),

    #[error("print failed: {0}")]
    Print(#[from] PrintError),
}

/// Turns one complete message into at most one response.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    printer: SharedPrinter,
    page: PageBounds,
    policy: ReplyPolicy,
}

impl Dispatcher {
    pub fn new(printer: SharedPrinter, page: PageBounds, policy: ReplyPolicy) -> Self {
        Self {
            printer,
            page,
            policy,
        }
    }

    /// Decodes, validates and executes `text`.
    ///
    /// Returns the response to send, or `None` when the message is dropped
    /// silently.
    pub async fn handle_message(&self, text: &str) -> Option<OutboundResponse> {
        let request = match decode_request(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, prefix = log_prefix(text), "dropping malformed message");
                return None;
            }
        };

        let print = match request.validate() {
            Ok(print) => print,
            Err(failure) => {
                tracing::warn!(
                    %failure,
                    prefix = log_prefix(text),
                    "invalid or unhandled message"
                );
                return self
                    .policy
                    .is_verbose()
                    .then(|| OutboundResponse::error(failure.to_string()));
            }
        };

        let file_name = print.file_name.clone();
        match self.print(print).await {
            Ok(()) => Some(OutboundResponse::print_success()),
            Err(e @ DispatchError::Print(_)) => {
                tracing::error!(%file_name, "{e}");
                self.policy
                    .is_verbose()
                    .then(|| OutboundResponse::error(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(%file_name, "rejecting print request: {e}");
                Some(OutboundResponse::error(e.to_string()))
            }
        }
    }

    /// Decodes the image in `request` and prints it on the shared printer.
    ///
    /// Base64 and image decoding run on the blocking pool; a payload can be
    /// tens of megabytes.
    pub async fn print(&self, request: PrintRequest) -> Result<(), DispatchError> {
        let (request, image) = tokio::task::spawn_blocking(move || {
            let image = decode_image(&request);
            (request, image)
        })
        .await?;
        let image = image?;
        let file_name = request.file_name;
        tracing::debug!(
            %file_name,
            width = image.width(),
            height = image.height(),
            "image decoded"
        );

        let job = PrintJob {
            document_name: file_name.clone(),
            image,
            page: self.page,
        };
        self.printer.print(job).await?;

        tracing::info!(%file_name, printer = self.printer.name(), "print completed");
        Ok(())
    }
}

fn decode_image(request: &PrintRequest) -> Result<DynamicImage, DispatchError> {
    let bytes = request.image_bytes()?;
    Ok(image::load_from_memory(&bytes)?)
}
