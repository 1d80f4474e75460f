//! `v1beta1.KeyManagementService` request handlers.
//!
//! Encrypt and decrypt are identity transforms delayed by a sampled latency.
//! Version is never delayed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use mock_kms_api::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyManagementService,
    VersionRequest, VersionResponse, API_VERSION,
};
use mock_kms_latency::{is_liveness_probe, LatencySimulator, LatencyWindow};

use crate::StopMode;

/// Runtime name reported by `Version`.
pub const RUNTIME_NAME: &str = "mock-kms-plugin";

/// Runtime version reported by `Version`.
pub const RUNTIME_VERSION: &str = "0.0.1";

/// Handles KMS plugin RPCs for one serving run.
#[derive(Debug, Clone)]
pub(crate) struct KmsHandler {
    simulator: LatencySimulator,
    encrypt_latency: LatencyWindow,
    decrypt_latency: LatencyWindow,
    stop: watch::Receiver<Option<StopMode>>,
}

impl KmsHandler {
    pub(crate) fn new(
        simulator: LatencySimulator,
        encrypt_latency: LatencyWindow,
        decrypt_latency: LatencyWindow,
        stop: watch::Receiver<Option<StopMode>>,
    ) -> Self {
        Self {
            simulator,
            encrypt_latency,
            decrypt_latency,
            stop,
        }
    }

    /// Sleeps for `latency` unless the payload is a liveness probe.
    ///
    /// A forced stop abandons the delay and fails the call.
    async fn delay(&self, payload: &[u8], latency: Duration) -> Result<(), Status> {
        if is_liveness_probe(payload) || latency.is_zero() {
            return Ok(());
        }

        let mut stop = self.stop.clone();
        tokio::select! {
            () = tokio::time::sleep(latency) => Ok(()),
            Ok(_) = stop.wait_for(|mode| *mode == Some(StopMode::Force)) => {
                debug!("abandoning delayed request on forced stop");
                Err(Status::unavailable("kms plugin is shutting down"))
            }
        }
    }
}

#[async_trait]
impl KeyManagementService for KmsHandler {
    async fn version(
        &self,
        request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        info!(version = %request.get_ref().version, "Received version request");

        Ok(Response::new(VersionResponse {
            version: API_VERSION.to_string(),
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
        }))
    }

    async fn decrypt(
        &self,
        request: Request<DecryptRequest>,
    ) -> Result<Response<DecryptResponse>, Status> {
        let request = request.into_inner();
        let latency = self.simulator.sample(&self.decrypt_latency);

        info!(
            cipher_len = request.cipher.len(),
            latency = ?latency,
            "Received decrypt request"
        );

        self.delay(&request.cipher, latency).await?;

        Ok(Response::new(DecryptResponse {
            plain: request.cipher,
        }))
    }

    async fn encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let request = request.into_inner();
        let latency = self.simulator.sample(&self.encrypt_latency);

        info!(
            plain_len = request.plain.len(),
            latency = ?latency,
            "Received encrypt request"
        );

        self.delay(&request.plain, latency).await?;

        Ok(Response::new(EncryptResponse {
            cipher: request.plain,
        }))
    }
}
