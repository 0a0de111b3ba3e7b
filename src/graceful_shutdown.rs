//! Graceful shutdown coordinator (§10.6): broadcasts a stop signal, drains
//! registered components with a timeout, then persists the live ranking
//! state so restarts don't throw away accumulated statistics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::resolver::Resolver;

/// Graceful shutdown coordinator, grounded on the teacher's
/// `GracefulShutdown` (broadcast-signal + registered-component-with-timeout
/// pattern), with the final "save cache" step replaced by a state snapshot
/// save (§4.G, §10.5).
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<()>,
    components: Arc<Mutex<Vec<ShutdownComponent>>>,
    resolver: Arc<Resolver>,
}

type ShutdownResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type ShutdownFn = Box<dyn Fn() -> tokio::task::JoinHandle<ShutdownResult> + Send + Sync>;

struct ShutdownComponent {
    name: String,
    shutdown_fn: ShutdownFn,
}

impl GracefulShutdown {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            components: Arc::new(Mutex::new(Vec::new())),
            resolver,
        }
    }

    /// Get a shutdown receiver for components to listen on.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register a component for graceful shutdown.
    pub async fn register_component<F, Fut>(&self, name: String, shutdown_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ShutdownResult> + Send + 'static,
    {
        let component = ShutdownComponent {
            name,
            shutdown_fn: Box::new(move || {
                let fut = shutdown_fn();
                tokio::spawn(fut)
            }),
        };
        self.components.lock().await.push(component);
    }

    /// Initiate graceful shutdown: signal, drain, persist, exit.
    pub async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("initiating graceful shutdown");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("failed to send shutdown signal: {e}");
        }

        info!("waiting for in-flight queries to complete");
        tokio::time::sleep(Duration::from_millis(500)).await;

        let components = self.components.lock().await;
        let mut handles = Vec::new();
        for component in components.iter() {
            info!(component = %component.name, "shutting down component");
            let handle = (component.shutdown_fn)();
            handles.push((component.name.clone(), handle));
        }
        drop(components);

        for (name, handle) in handles {
            match timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(Ok(()))) => info!(component = %name, "component shut down"),
                Ok(Ok(Err(e))) => error!(component = %name, error = %e, "component shutdown failed"),
                Ok(Err(e)) => error!(component = %name, error = %e, "component shutdown task panicked"),
                Err(_) => warn!(component = %name, "component shutdown timed out"),
            }
        }

        if let Some(path) = self.resolver.config().state_file.clone() {
            info!(path = %path.display(), "saving state snapshot before exit");
            if let Err(e) = crate::snapshot::save(&self.resolver, &path) {
                error!(error = %e, "failed to save state snapshot during shutdown");
            }
        }

        info!("graceful shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::bind::BindParams;
    use crate::algs::Params;
    use crate::config::Config;

    fn test_config(state_file: Option<std::path::PathBuf>) -> Config {
        Config {
            servers: vec!["a".to_string()],
            rules: vec![],
            timeout_min: 0.01,
            timeout_max: 1.0,
            retries_max: 1,
            tcp: false,
            params: Params::Bind(BindParams::default()),
            anomalies: vec![],
            state_file,
            autosave_secs: None,
        }
    }

    #[tokio::test]
    async fn shutdown_saves_snapshot_when_state_file_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        let resolver = Arc::new(Resolver::new(test_config(Some(path.clone()))));
        let gs = GracefulShutdown::new(resolver);
        gs.shutdown().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn shutdown_without_state_file_still_completes() {
        let resolver = Arc::new(Resolver::new(test_config(None)));
        let gs = GracefulShutdown::new(resolver);
        assert!(gs.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn registered_components_run_on_shutdown() {
        let resolver = Arc::new(Resolver::new(test_config(None)));
        let gs = GracefulShutdown::new(resolver);
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        gs.register_component("test".to_string(), move || {
            let flag = flag.clone();
            async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        gs.shutdown().await.unwrap();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
