//! Generates the `v1beta1.KeyManagementService` server and client stubs.
//!
//! Message types are hand-written `prost` structs in `src/v1beta1.rs`, so
//! the manual builder is used and no `protoc` is required.

use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::v1beta1::{input}"))
        .output_type(format!("crate::v1beta1::{output}"))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let service = Service::builder()
        .name("KeyManagementService")
        .package("v1beta1")
        .method(method("version", "Version", "VersionRequest", "VersionResponse"))
        .method(method("decrypt", "Decrypt", "DecryptRequest", "DecryptResponse"))
        .method(method("encrypt", "Encrypt", "EncryptRequest", "EncryptResponse"))
        .build();

    Builder::new().compile(&[service]);
}
