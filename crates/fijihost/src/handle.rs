//! Lazily initialized, launch-once handle to the imaging host.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::companion::{Companion, HostLauncher};
use crate::error::HostError;

/// Owns the connection to one host instance.
///
/// The first [`acquire`](Self::acquire) runs the launcher; every later call
/// returns the same companion. Concurrent first callers wait on the one
/// in-flight launch instead of starting their own. A failed launch is not
/// cached, so the next caller tries again.
pub struct HostHandle {
    launcher: Arc<dyn HostLauncher>,
    companion: OnceCell<Arc<dyn Companion>>,
    launch_attempts: AtomicUsize,
}

impl HostHandle {
    pub fn new(launcher: Arc<dyn HostLauncher>) -> Self {
        Self {
            launcher,
            companion: OnceCell::new(),
            launch_attempts: AtomicUsize::new(0),
        }
    }

    /// Get the companion, launching the host on first use.
    pub async fn acquire(&self) -> Result<Arc<dyn Companion>, HostError> {
        let companion = self
            .companion
            .get_or_try_init(|| async {
                let attempt = self.launch_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let started = Instant::now();
                info!(
                    host = %self.launcher.describe(),
                    attempt,
                    "Initializing host instance..."
                );

                match self.launcher.launch().await {
                    Ok(companion) => {
                        info!(
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Host instance initialized"
                        );
                        Ok(companion)
                    }
                    Err(e) => {
                        error!(attempt, "Host initialization failed: {}", e);
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(companion))
    }

    /// Human-readable name of the host behind this handle.
    pub fn describe(&self) -> String {
        self.launcher.describe()
    }

    /// Whether a launch has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.companion.initialized()
    }

    /// How many times the launcher has been invoked.
    pub fn launch_attempts(&self) -> usize {
        self.launch_attempts.load(Ordering::SeqCst)
    }

    /// Ask an initialized host to exit. Never launches one.
    pub async fn shutdown(&self) {
        if let Some(companion) = self.companion.get() {
            info!("Shutting down host instance");
            if let Err(e) = companion.shutdown().await {
                warn!("Host shutdown failed: {}", e);
            }
        }
    }
}
