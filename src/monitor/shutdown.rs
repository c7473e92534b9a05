//! Broadcast stop signal shared by the supervisor, every checker loop and the sink.
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Sending side of the stop signal. Owned by the supervisor.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side of the stop signal. Cheap to clone; one per loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Creates a connected trigger/receiver pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Requests shutdown. Calling it again is a no-op.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown was requested or the trigger was dropped.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the trigger is gone, which is a stop request as well.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Resolves on Ctrl+C, or on SIGTERM where the platform has it.
pub async fn wait_for_os_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C; waiting for SIGTERM only.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
        _ = terminate => info!("SIGTERM received, initiating graceful shutdown."),
    }
}
