//! Application orchestrator: wires the printer, dispatcher and server.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use wsprint_printer::{LogPrinter, PrinterSink, SystemPrinter};
use wsprint_server::{Dispatcher, PrintServer, SharedPrinter};

use crate::config::{Config, PrinterBackend};

/// Runs the agent until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    serve(config, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {e}"),
        }
    })
    .await
}

/// Runs the server until `shutdown` resolves or the server fails.
async fn serve<F>(config: Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let sink: Arc<dyn PrinterSink> = match config.printer {
        PrinterBackend::System => Arc::new(SystemPrinter),
        PrinterBackend::Log => Arc::new(LogPrinter),
    };
    let printer = SharedPrinter::new(sink, config.print_timeout());
    tracing::info!(printer = printer.name(), "printer sink ready");

    let dispatcher = Dispatcher::new(printer, config.page.bounds(), config.reply_policy);
    let server = PrintServer::new(config.server_config(), dispatcher);

    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    tokio::select! {
        () = shutdown => {}
        result = &mut server_task => {
            // The server only returns early if it could not start.
            result
                .context("print server task panicked")?
                .context("print server failed")?;
            return Ok(());
        }
    }

    server.shutdown();
    server_task
        .await
        .context("print server task panicked")?
        .context("print server failed")?;
    Ok(())
}
