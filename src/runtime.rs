//! Runtime - Graceful shutdown and signal handling

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

/// Shutdown signal broadcaster
#[derive(Clone)]
pub struct Shutdown {
    sender: broadcast::Sender<()>,
    triggered: Arc<RwLock<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender, triggered: Arc::new(RwLock::new(false)) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> { self.sender.subscribe() }

    /// Idempotent
    pub async fn trigger(&self) {
        let mut triggered = self.triggered.write().await;
        if !*triggered {
            *triggered = true;
            let _ = self.sender.send(());
        }
    }

    pub async fn is_triggered(&self) -> bool { *self.triggered.read().await }
}

/// SIGINT / SIGTERM (Ctrl+C elsewhere) trigger the returned handle.
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        handle.trigger().await;
    });

    shutdown
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "signal handlers unavailable, falling back to Ctrl+C");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() { wait_for_ctrl_c().await }

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C"),
        Err(e) => error!(error = %e, "Ctrl+C handler failed"),
    }
}
