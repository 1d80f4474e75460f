//! # Mock KMS API
//!
//! The KMS plugin `v1beta1` gRPC contract spoken between the orchestrator's
//! API server and a KMS plugin.
//!
//! ## Methods
//!
//! - `/v1beta1.KeyManagementService/Version`
//! - `/v1beta1.KeyManagementService/Decrypt`
//! - `/v1beta1.KeyManagementService/Encrypt`
//!
//! Plugins listen on a unix domain socket; [`connect`] opens a client
//! channel to one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod v1beta1;

use std::path::{Path, PathBuf};

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

pub use v1beta1::key_management_service_client::KeyManagementServiceClient;
pub use v1beta1::key_management_service_server::{
    KeyManagementService, KeyManagementServiceServer,
};
pub use v1beta1::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, VersionRequest,
    VersionResponse,
};

/// Version string of the KMS plugin contract.
pub const API_VERSION: &str = "v1beta1";

/// Connects to a KMS plugin listening on the unix socket at `path`.
///
/// The connection is established eagerly, so a missing or refused socket
/// is reported here rather than on the first call.
pub async fn connect(
    path: impl AsRef<Path>,
) -> Result<KeyManagementServiceClient<Channel>, tonic::transport::Error> {
    let path: PathBuf = path.as_ref().to_path_buf();

    // The URI is ignored by the connector; it only has to parse.
    let channel = Endpoint::from_static("http://[::]:50051")
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(path).await?)) }
        }))
        .await?;

    Ok(KeyManagementServiceClient::new(channel))
}
