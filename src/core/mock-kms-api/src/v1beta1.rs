//! `v1beta1` message types and generated service stubs.
//!
//! Field tags follow the published `k8s.io/kms/apis/v1beta1` contract.

#![allow(missing_docs)]

/// Version negotiation request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionRequest {
    /// Version of the contract the caller speaks.
    #[prost(string, tag = "1")]
    pub version: String,
}

/// Version negotiation response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionResponse {
    /// Version of the contract the plugin speaks.
    #[prost(string, tag = "1")]
    pub version: String,
    /// Name of the plugin runtime.
    #[prost(string, tag = "2")]
    pub runtime_name: String,
    /// Version of the plugin runtime.
    #[prost(string, tag = "3")]
    pub runtime_version: String,
}

/// Decrypt request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptRequest {
    #[prost(string, tag = "1")]
    pub version: String,
    /// Data to decrypt.
    #[prost(bytes = "vec", tag = "2")]
    pub cipher: Vec<u8>,
}

/// Decrypt response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptResponse {
    /// Decrypted data.
    #[prost(bytes = "vec", tag = "1")]
    pub plain: Vec<u8>,
}

/// Encrypt request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptRequest {
    #[prost(string, tag = "1")]
    pub version: String,
    /// Data to encrypt.
    #[prost(bytes = "vec", tag = "2")]
    pub plain: Vec<u8>,
}

/// Encrypt response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptResponse {
    /// Encrypted data.
    #[prost(bytes = "vec", tag = "1")]
    pub cipher: Vec<u8>,
}

include!(concat!(env!("OUT_DIR"), "/v1beta1.KeyManagementService.rs"));
