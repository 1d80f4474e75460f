//! Integration tests for the mock KMS plugin.
//!
//! These tests talk to the plugin over a real unix socket, either in-process
//! through `PluginService` or against the built `mock-kms-plugin` binary.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

use mock_kms_api::KeyManagementServiceClient;
use mock_kms_latency::{LatencySimulator, LatencyWindow};
use mock_kms_service::{PluginService, ServiceConfig, ServiceError, ServiceStatus};

/// gRPC client connected to a plugin socket.
pub type KmsClient = KeyManagementServiceClient<Channel>;

// ============================================================================
// In-process Plugin
// ============================================================================

/// A plugin service running on a background task with its own socket directory.
pub struct TestPlugin {
    pub service: Arc<PluginService>,
    serving: Option<JoinHandle<Result<(), ServiceError>>>,
    _dir: TempDir,
}

impl TestPlugin {
    /// Start a plugin with the given latency bounds (min, max).
    pub async fn start(
        encrypt: (Duration, Duration),
        decrypt: (Duration, Duration),
    ) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let config = ServiceConfig::from_bounds(
            &listen_addr(&dir),
            Duration::from_secs(5),
            encrypt,
            decrypt,
        )?;
        Self::run(dir, PluginService::new(config)).await
    }

    /// Start a plugin whose encrypt latency is drawn from `simulator`.
    pub async fn start_with_simulator(
        encrypt: LatencyWindow,
        simulator: LatencySimulator,
    ) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let config = ServiceConfig::new(
            &listen_addr(&dir),
            Duration::from_secs(5),
            encrypt,
            LatencyWindow::ZERO,
        )?;
        Self::run(dir, PluginService::with_simulator(config, simulator)).await
    }

    async fn run(dir: TempDir, service: PluginService) -> Result<Self> {
        let service = Arc::new(service);

        let serving = tokio::spawn({
            let service = service.clone();
            async move { service.start().await }
        });

        for _ in 0..100 {
            if service.status() == ServiceStatus::Running {
                return Ok(Self {
                    service,
                    serving: Some(serving),
                    _dir: dir,
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        bail!("Plugin failed to start within 1 second")
    }

    /// Socket path the plugin listens on.
    pub fn socket_path(&self) -> &Path {
        self.service.config().socket_path()
    }

    /// Open a new client connection.
    pub async fn client(&self) -> Result<KmsClient> {
        Ok(mock_kms_api::connect(self.socket_path()).await?)
    }

    /// Gracefully stop the plugin and return the result of serving.
    pub async fn stop(&mut self) -> Result<()> {
        self.service.graceful_stop().await;
        if let Some(serving) = self.serving.take() {
            serving.await??;
        }
        Ok(())
    }
}

fn listen_addr(dir: &TempDir) -> String {
    format!("unix://{}", dir.path().join("kms.sock").display())
}

impl Drop for TestPlugin {
    fn drop(&mut self) {
        if let Some(serving) = self.serving.take() {
            serving.abort();
        }
    }
}

// ============================================================================
// Plugin Process
// ============================================================================

/// A `mock-kms-plugin` child process.
pub struct PluginProcess {
    process: Child,
    pub socket_path: PathBuf,
    _dir: TempDir,
}

impl PluginProcess {
    /// Spawn the plugin binary with extra arguments and wait for its socket.
    pub async fn start(args: &[&str]) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let socket_path = dir.path().join("kms.sock");
        let binary = find_plugin_binary()?;

        let process = Command::new(&binary)
            .arg("--listen-addr")
            .arg(format!("unix://{}", socket_path.display()))
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start plugin: {:?}", binary))?;

        let plugin = Self {
            process,
            socket_path,
            _dir: dir,
        };
        plugin.wait_for_ready().await?;
        Ok(plugin)
    }

    async fn wait_for_ready(&self) -> Result<()> {
        for _ in 0..50 {
            if mock_kms_api::connect(&self.socket_path).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        bail!("Plugin failed to start within 5 seconds")
    }

    /// Open a new client connection.
    pub async fn client(&self) -> Result<KmsClient> {
        Ok(mock_kms_api::connect(&self.socket_path).await?)
    }

    /// Send SIGTERM and wait for the process to exit.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(self.process.id().to_string())
            .status()
            .context("Failed to run kill")?;
        if !status.success() {
            bail!("kill exited with {status}");
        }
        wait_for_exit(&mut self.process).await
    }
}

impl Drop for PluginProcess {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

async fn wait_for_exit(process: &mut Child) -> Result<ExitStatus> {
    for _ in 0..100 {
        if let Some(status) = process.try_wait()? {
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    bail!("Plugin did not exit within 5 seconds")
}

/// Find the plugin binary in the target directory.
pub fn find_plugin_binary() -> Result<PathBuf> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());

    // Try debug build first, then release
    let candidates = [
        Path::new(&manifest_dir).join("../../target/debug/mock-kms-plugin"),
        Path::new(&manifest_dir).join("../../target/release/mock-kms-plugin"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.canonicalize()?);
        }
    }

    bail!(
        "Could not find mock-kms-plugin binary. Run 'cargo build -p mock-kms-plugin' first. Searched in: {:?}",
        candidates
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use mock_kms_api::{DecryptRequest, EncryptRequest, VersionRequest};
    use mock_kms_latency::SeededSource;

    const NO_LATENCY: (Duration, Duration) = (Duration::ZERO, Duration::ZERO);

    fn encrypt_request(plain: &[u8]) -> EncryptRequest {
        EncryptRequest {
            version: "v1beta1".into(),
            plain: plain.to_vec(),
        }
    }

    fn decrypt_request(cipher: &[u8]) -> DecryptRequest {
        DecryptRequest {
            version: "v1beta1".into(),
            cipher: cipher.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_version_then_graceful_stop() {
        let mut plugin = TestPlugin::start(NO_LATENCY, NO_LATENCY).await.unwrap();
        let mut client = plugin.client().await.unwrap();

        let version = client
            .version(VersionRequest {
                version: "v1beta1".into(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(version.version, "v1beta1");
        assert_eq!(version.runtime_name, "mock-kms-plugin");
        assert!(!version.runtime_version.is_empty());

        drop(client);
        plugin.stop().await.unwrap();

        assert_eq!(plugin.service.status(), ServiceStatus::Stopped);
        assert!(plugin.client().await.is_err());

        // A second stop is a no-op.
        plugin.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_encrypt_latency_window() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(200);
        let plugin = TestPlugin::start((min, max), NO_LATENCY).await.unwrap();
        let client = plugin.client().await.unwrap();

        let mut calls = tokio::task::JoinSet::new();
        for _ in 0..50 {
            let mut client = client.clone();
            calls.spawn(async move {
                let started = Instant::now();
                let response = client.encrypt(encrypt_request(b"hello")).await;
                (started.elapsed(), response)
            });
        }

        while let Some(result) = calls.join_next().await {
            let (elapsed, response) = result.unwrap();
            assert_eq!(response.unwrap().into_inner().cipher, b"hello");
            assert!(elapsed >= min, "call took {elapsed:?}, below {min:?}");
            // Allow for scheduling and transport overhead above the sampled delay.
            assert!(
                elapsed < max + Duration::from_millis(150),
                "call took {elapsed:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_seeded_latency_is_reproducible() {
        let window =
            LatencyWindow::new(Duration::from_millis(50), Duration::from_millis(150)).unwrap();
        let plugin =
            TestPlugin::start_with_simulator(window, LatencySimulator::new(SeededSource::new(7)))
                .await
                .unwrap();
        let mut client = plugin.client().await.unwrap();

        // Same seed, same sequence of delays.
        let expected = LatencySimulator::new(SeededSource::new(7));

        for _ in 0..5 {
            let latency = expected.sample(&window);

            let started = Instant::now();
            let cipher = client
                .encrypt(encrypt_request(b"hello"))
                .await
                .unwrap()
                .into_inner()
                .cipher;
            let elapsed = started.elapsed();

            assert_eq!(cipher, b"hello");
            assert!(elapsed >= latency, "call took {elapsed:?}, expected {latency:?}");
            assert!(
                elapsed < latency + Duration::from_millis(100),
                "call took {elapsed:?}, expected {latency:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_identity_round_trip() {
        let plugin = TestPlugin::start(NO_LATENCY, NO_LATENCY).await.unwrap();
        let mut client = plugin.client().await.unwrap();

        let payloads: [&[u8]; 4] = [
            b"",
            b"k8s:enc:kms:v1:secret",
            &[0, 1, 2, 255],
            &[42; 64 * 1024],
        ];
        for payload in payloads {
            let cipher = client
                .encrypt(encrypt_request(payload))
                .await
                .unwrap()
                .into_inner()
                .cipher;
            assert_eq!(cipher, payload);

            let plain = client
                .decrypt(decrypt_request(&cipher))
                .await
                .unwrap()
                .into_inner()
                .plain;
            assert_eq!(plain, payload);
        }
    }

    #[tokio::test]
    async fn test_liveness_probe_is_fast() {
        let slow = (Duration::from_secs(5), Duration::from_secs(5));
        let plugin = TestPlugin::start(slow, slow).await.unwrap();
        let mut client = plugin.client().await.unwrap();

        // Warm up the connection; version is never delayed.
        client.version(VersionRequest::default()).await.unwrap();

        let started = Instant::now();
        let cipher = client
            .encrypt(encrypt_request(b"ping"))
            .await
            .unwrap()
            .into_inner()
            .cipher;
        let plain = client
            .decrypt(decrypt_request(b"ping"))
            .await
            .unwrap()
            .into_inner()
            .plain;

        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(cipher, b"ping");
        assert_eq!(plain, b"ping");
    }

    #[tokio::test]
    async fn test_delayed_calls_run_concurrently() {
        let latency = Duration::from_millis(300);
        let plugin = TestPlugin::start((latency, latency), (latency, latency))
            .await
            .unwrap();
        let client = plugin.client().await.unwrap();

        let started = Instant::now();
        let mut calls = tokio::task::JoinSet::new();
        for i in 0..10u8 {
            let mut client = client.clone();
            calls.spawn(async move {
                if i % 2 == 0 {
                    client.encrypt(encrypt_request(&[i])).await.map(|_| ())
                } else {
                    client.decrypt(decrypt_request(&[i])).await.map(|_| ())
                }
            });
        }
        while let Some(result) = calls.join_next().await {
            result.unwrap().unwrap();
        }

        assert!(started.elapsed() < latency * 3);
    }

    #[tokio::test]
    async fn test_version_is_not_delayed_by_in_flight_encrypt() {
        let slow = (Duration::from_secs(2), Duration::from_secs(2));
        let plugin = TestPlugin::start(slow, NO_LATENCY).await.unwrap();
        let mut client = plugin.client().await.unwrap();

        let mut slow_client = client.clone();
        let pending =
            tokio::spawn(async move { slow_client.encrypt(encrypt_request(b"x")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        client.version(VersionRequest::default()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        pending.abort();
    }

    #[tokio::test]
    async fn test_plugin_binary_serves_and_exits_on_sigterm() {
        if find_plugin_binary().is_err() {
            eprintln!("skipping: mock-kms-plugin binary not built");
            return;
        }

        let mut plugin = PluginProcess::start(&["--encryption-latency-max", "10ms"])
            .await
            .unwrap();
        let mut client = plugin.client().await.unwrap();

        let version = client
            .version(VersionRequest::default())
            .await
            .unwrap()
            .into_inner();
        assert_eq!(version.runtime_name, "mock-kms-plugin");

        let cipher = client
            .encrypt(encrypt_request(b"hello"))
            .await
            .unwrap()
            .into_inner()
            .cipher;
        assert_eq!(cipher, b"hello");
        drop(client);

        let status = plugin.terminate().await.unwrap();
        assert!(status.success(), "plugin exited with {status}");
        assert!(!plugin.socket_path.exists());
    }

    #[tokio::test]
    async fn test_plugin_binary_rejects_inverted_latency() {
        let Ok(binary) = find_plugin_binary() else {
            eprintln!("skipping: mock-kms-plugin binary not built");
            return;
        };
        let dir = TempDir::new().unwrap();

        let mut process = Command::new(binary)
            .arg("--listen-addr")
            .arg(format!("unix://{}", dir.path().join("kms.sock").display()))
            .args(["--decryption-latency-min", "2s", "--decryption-latency-max", "1s"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let status = wait_for_exit(&mut process).await.unwrap();
        assert!(!status.success());
        assert!(!dir.path().join("kms.sock").exists());
    }
}
