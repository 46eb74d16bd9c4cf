//! Process lifecycle
//!
//! Turns OS termination signals into the shutdown future accepted by
//! [`Server::run`](crate::Server::run).

use std::future::Future;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Installed handlers for SIGINT, SIGQUIT and SIGTERM (Ctrl-C elsewhere)
#[derive(Debug)]
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    quit: Signal,
    #[cfg(unix)]
    terminate: Signal,
}

impl ShutdownSignal {
    /// Install the handlers. Must be called inside a tokio runtime; from
    /// here on the signals no longer terminate the process.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                quit: signal(SignalKind::quit())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal and return its name
    pub async fn recv(&mut self) -> std::io::Result<&'static str> {
        #[cfg(unix)]
        {
            let name = tokio::select! {
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.quit.recv() => "SIGQUIT",
                _ = self.terminate.recv() => "SIGTERM",
            };
            Ok(name)
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("ctrl-c")
        }
    }
}

/// Wait for SIGINT, SIGQUIT or SIGTERM (Ctrl-C elsewhere).
///
/// Returns the name of the signal received. Fails if the handlers cannot
/// be installed.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    ShutdownSignal::install()?.recv().await
}

/// Future that resolves when the process should stop serving.
///
/// Handlers are installed when this is called, not when the future is
/// first polled. A failure to install them is logged and the future
/// resolves immediately.
pub fn shutdown_signal() -> impl Future<Output = ()> {
    let installed = ShutdownSignal::install();
    async move {
        let received = match installed {
            Ok(mut signals) => signals.recv().await,
            Err(err) => Err(err),
        };
        match received {
            Ok(name) => tracing::info!(signal = name, "received OS signal, shutting down"),
            Err(err) => tracing::error!(error = %err, "failed to wait for OS signals"),
        }
    }
}
