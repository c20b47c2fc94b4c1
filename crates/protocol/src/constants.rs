use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default listen host (loopback only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum reassembled message size in bytes (32 MB).
///
/// A base64 payload is ~4/3 the size of the image it carries, so this
/// admits images of roughly 24 MB.
pub const WS_MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// How often the server pings an idle client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Read deadline: if nothing arrives within this window (no message, no
/// pong), the session is considered dead.
pub const WS_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a single print call. Printers are external devices and
/// may hang indefinitely.
pub const PRINT_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of characters of an offending message quoted in logs.
pub const LOG_PREFIX_CHARS: usize = 100;

/// Action tag requesting a print.
pub const ACTION_PRINT: &str = "print";

/// Wire name of the image payload field.
pub const FIELD_IMAGE_DATA: &str = "imageData";

/// Wire name of the display name field.
pub const FIELD_FILE_NAME: &str = "fileName";

/// Detail text sent with a successful print.
pub const PRINT_SUCCESS_DETAIL: &str = "print succeeded";

/// Action tag of an outbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseAction {
    #[serde(rename = "printSuccess")]
    PrintSuccess,
    #[serde(rename = "error")]
    Error,
}
