//! # Mock KMS Service
//!
//! A KMS plugin that performs no cryptography, for exercising envelope
//! encryption integration in tests.
//!
//! The plugin serves the `v1beta1` KMS plugin contract on a unix socket.
//! Encrypt and decrypt return their input unchanged after an artificial,
//! randomly sampled delay; the `ping` liveness probe is never delayed.
//!
//! ## Lifecycle
//!
//! The service moves through three states:
//! - **Created**: configured, nothing bound
//! - **Running**: listening and serving RPCs
//! - **Stopped**: listener closed, socket file removed
//!
//! [`PluginService::start`] blocks until serving ends, so it is normally
//! spawned on a task while the owner waits for a shutdown trigger and then
//! calls [`PluginService::graceful_stop`] or [`PluginService::force_stop`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
mod handler;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_stream::Stream;
use tonic::transport::server::Connected;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use mock_kms_api::KeyManagementServiceServer;
use mock_kms_latency::LatencySimulator;

pub use config::{
    parse_duration, parse_endpoint, ServiceConfig, DEFAULT_LISTEN_ADDR, DEFAULT_TIMEOUT,
};
pub use error::{ConfigError, ServiceError};
pub use handler::{RUNTIME_NAME, RUNTIME_VERSION};

use handler::KmsHandler;

/// Lifecycle state of a plugin service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Constructed, never started.
    Created,
    /// Listening and serving RPCs.
    Running,
    /// Serving has ended.
    Stopped,
}

/// How a running server is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopMode {
    /// Stop accepting, let in-flight RPCs finish.
    Graceful,
    /// Abandon in-flight RPCs.
    Force,
}

enum Lifecycle {
    Created,
    Running(RunningServer),
    Stopped,
}

/// Control handles for the server owned by a running `start` call.
struct RunningServer {
    stop: watch::Sender<Option<StopMode>>,
    done: watch::Receiver<bool>,
}

/// The mock KMS plugin service.
///
/// Share it behind an `Arc` to stop it from another task while `start` is
/// serving.
pub struct PluginService {
    config: ServiceConfig,
    simulator: LatencySimulator,
    lifecycle: Mutex<Lifecycle>,
}

impl PluginService {
    /// Creates a service sampling latencies from an OS-seeded source.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_simulator(config, LatencySimulator::default())
    }

    /// Creates a service sampling latencies from `simulator`.
    pub fn with_simulator(config: ServiceConfig, simulator: LatencySimulator) -> Self {
        info!(
            socket = %config.socket_path().display(),
            timeout = ?config.timeout(),
            "KMS plugin configured"
        );

        Self {
            config,
            simulator,
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    pub fn status(&self) -> ServiceStatus {
        match *self.lifecycle() {
            Lifecycle::Created => ServiceStatus::Created,
            Lifecycle::Running(_) => ServiceStatus::Running,
            Lifecycle::Stopped => ServiceStatus::Stopped,
        }
    }

    // State transitions never leave the lock half-updated.
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds the socket and serves RPCs until stopped.
    ///
    /// Returns `Ok(())` once [`graceful_stop`](Self::graceful_stop) or
    /// [`force_stop`](Self::force_stop) has ended serving.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AlreadyRunning`] if another `start` is serving
    /// - [`ServiceError::Bind`] if the socket cannot be bound
    /// - [`ServiceError::Serve`] or [`ServiceError::ListenerClosed`] if
    ///   serving ends without a stop request
    pub async fn start(&self) -> Result<(), ServiceError> {
        self.serve(|path| UnixListener::bind(path).map(UnixListenerStream::new))
            .await
    }

    /// Serves connections from the stream returned by `bind`.
    ///
    /// `bind` runs under the lifecycle lock, so a concurrent stop either sees
    /// the service running or not at all.
    async fn serve<I, IO, IE, B>(&self, bind: B) -> Result<(), ServiceError>
    where
        B: FnOnce(&Path) -> std::io::Result<I>,
        I: Stream<Item = Result<IO, IE>> + Send + 'static,
        IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
        IO::ConnectInfo: Clone + Send + Sync + 'static,
        IE: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (incoming, stop, done) = {
            let mut lifecycle = self.lifecycle();
            if matches!(*lifecycle, Lifecycle::Running(_)) {
                return Err(ServiceError::AlreadyRunning);
            }

            let path = self.config.socket_path();
            let incoming = match bind(path) {
                Ok(incoming) => incoming,
                Err(source) => {
                    *lifecycle = Lifecycle::Stopped;
                    return Err(ServiceError::Bind {
                        path: path.to_path_buf(),
                        source,
                    });
                },
            };

            let (stop_tx, stop_rx) = watch::channel(None);
            let (done_tx, done_rx) = watch::channel(false);
            *lifecycle = Lifecycle::Running(RunningServer {
                stop: stop_tx,
                done: done_rx,
            });
            (incoming, stop_rx, done_tx)
        };

        // Runs even if this future is dropped mid-serve.
        let _serving = ServingGuard {
            service: self,
            done,
        };

        info!(socket = %self.config.socket_path().display(), "kms plugin serving");

        let handler = KmsHandler::new(
            self.simulator.clone(),
            self.config.encrypt_latency(),
            self.config.decrypt_latency(),
            stop.clone(),
        );

        let requested = stop.clone();
        let mut graceful = stop.clone();
        let mut forced = stop;
        let timeout = self.config.timeout();

        let server = Server::builder()
            .http2_keepalive_interval(Some(timeout))
            .http2_keepalive_timeout(Some(timeout))
            .add_service(KeyManagementServiceServer::new(handler))
            .serve_with_incoming_shutdown(incoming, async move {
                let _ = graceful.wait_for(Option::is_some).await;
            });

        tokio::select! {
            result = server => {
                result?;
                if requested.borrow().is_none() {
                    return Err(ServiceError::ListenerClosed);
                }
                info!("kms plugin stopped");
                Ok(())
            }
            Ok(_) = forced.wait_for(|mode| *mode == Some(StopMode::Force)) => {
                info!("kms plugin force stopped");
                Ok(())
            }
        }
    }

    /// Stops accepting connections and waits for in-flight RPCs to finish.
    ///
    /// Resolves once `start` has returned. No-op unless running.
    pub async fn graceful_stop(&self) {
        self.stop(StopMode::Graceful).await;
    }

    /// Closes the listener and abandons in-flight RPCs.
    ///
    /// Delayed RPCs fail with `UNAVAILABLE`. Resolves once `start` has
    /// returned. No-op unless running.
    pub async fn force_stop(&self) {
        self.stop(StopMode::Force).await;
    }

    async fn stop(&self, mode: StopMode) {
        let mut done = {
            let lifecycle = self.lifecycle();
            let Lifecycle::Running(server) = &*lifecycle else {
                debug!(?mode, "kms plugin not running, nothing to stop");
                return;
            };

            info!(
                socket = %self.config.socket_path().display(),
                ?mode,
                "kms plugin shutdown"
            );

            // A forced stop is never downgraded.
            server.stop.send_if_modified(|current| {
                if *current == Some(StopMode::Force) || *current == Some(mode) {
                    return false;
                }
                *current = Some(mode);
                true
            });
            server.done.clone()
        };

        // Errors only if `start` was dropped, which also ends serving.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Marks the service stopped and removes its socket when serving ends.
struct ServingGuard<'a> {
    service: &'a PluginService,
    done: watch::Sender<bool>,
}

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        let path = self.service.config.socket_path();
        match std::fs::remove_file(path) {
            Ok(()) => debug!(socket = %path.display(), "removed kms plugin socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                warn!(socket = %path.display(), error = %e, "failed to remove kms plugin socket")
            },
        }

        *self.service.lifecycle() = Lifecycle::Stopped;
        self.done.send_replace(true);
    }
}
