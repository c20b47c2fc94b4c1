//! CUPS backend: `lpstat` for the default destination, `lp` for submission.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;

use crate::PrintError;

/// Resolves the system default destination via `lpstat -d`.
pub async fn default_destination() -> Result<String, PrintError> {
    let output = tokio::process::Command::new("lpstat")
        .arg("-d")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_default_destination(&stdout).ok_or(PrintError::NoDefaultPrinter)
}

/// Extracts the printer name from `lpstat -d` output.
///
/// CUPS prints `system default destination: NAME`, or
/// `no system default destination` when none is set.
fn parse_default_destination(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, name) = line.split_once("default destination:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_owned())
    })
}

/// Submits a PNG document to `printer`, reading the data from stdin.
pub async fn submit(printer: &str, title: &str, png: Vec<u8>) -> Result<(), PrintError> {
    let mut child = tokio::process::Command::new("lp")
        .args(["-d", printer, "-t", title, "-o", "fit-to-page"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&png).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PrintError::Driver(format!(
            "lp exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    tracing::debug!(
        printer,
        response = %String::from_utf8_lossy(&output.stdout).trim(),
        "lp accepted job"
    );
    Ok(())
}
