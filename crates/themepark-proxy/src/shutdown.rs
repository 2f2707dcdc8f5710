//! Shutdown coordination between the OS signal listener and the accept loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

/// One-shot, cloneable shutdown flag that can also be awaited
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Untriggered signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver notified on the first trigger
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Request shutdown; later calls are no-ops
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(());
        tracing::info!("Shutdown requested, no longer accepting connections");
    }

    /// Whether shutdown was requested
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown is requested, immediately if it already was
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // checked after subscribing so a concurrent trigger is not missed
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns SIGINT/SIGTERM (Ctrl+C elsewhere) into a [`ShutdownSignal`] trigger
#[derive(Debug)]
pub struct SignalHandler {
    signal: ShutdownSignal,
}

impl SignalHandler {
    /// Listener that will trigger `signal`
    pub fn new(signal: ShutdownSignal) -> Self {
        Self { signal }
    }

    /// Wait for the first OS signal, then trigger shutdown.
    ///
    /// If the listeners cannot be installed the proxy keeps running and
    /// must be stopped some other way.
    pub async fn run(self) {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(err), _) | (_, Err(err)) => {
                        tracing::error!(error = %err, "Failed to install signal handlers");
                        return;
                    }
                };

            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            tracing::info!(signal = name, "Received signal");
            self.signal.trigger();
        }

        #[cfg(not(unix))]
        {
            match signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!(signal = "ctrl-c", "Received signal");
                    self.signal.trigger();
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to listen for Ctrl+C");
                }
            }
        }
    }
}
