//! Plugin configuration.
//!
//! Addresses and durations are accepted in the same textual forms as the
//! flags of other KMS plugins: `unix:///path/to/socket` and Go-style
//! durations such as `250ms` or `1m30s`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mock_kms_latency::LatencyWindow;

use crate::error::ConfigError;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "unix:///tmp/kms.socket";

/// Default connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const UNIX_SCHEME: &str = "unix";

/// Immutable plugin service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    socket_path: PathBuf,
    timeout: Duration,
    encrypt_latency: LatencyWindow,
    decrypt_latency: LatencyWindow,
}

impl ServiceConfig {
    /// Creates a configuration from a `unix://` listen address.
    pub fn new(
        listen_addr: &str,
        timeout: Duration,
        encrypt_latency: LatencyWindow,
        decrypt_latency: LatencyWindow,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            socket_path: parse_endpoint(listen_addr)?,
            timeout,
            encrypt_latency,
            decrypt_latency,
        })
    }

    /// Creates a configuration from raw latency bounds.
    ///
    /// Fails if either pair has `min > max`.
    pub fn from_bounds(
        listen_addr: &str,
        timeout: Duration,
        encrypt: (Duration, Duration),
        decrypt: (Duration, Duration),
    ) -> Result<Self, ConfigError> {
        let encrypt_latency =
            LatencyWindow::new(encrypt.0, encrypt.1).map_err(|source| ConfigError::Latency {
                operation: "encryption",
                source,
            })?;
        let decrypt_latency =
            LatencyWindow::new(decrypt.0, decrypt.1).map_err(|source| ConfigError::Latency {
                operation: "decryption",
                source,
            })?;
        Self::new(listen_addr, timeout, encrypt_latency, decrypt_latency)
    }

    /// Path of the unix socket to listen on.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connection-level timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Latency window applied to encrypt calls.
    pub fn encrypt_latency(&self) -> LatencyWindow {
        self.encrypt_latency
    }

    /// Latency window applied to decrypt calls.
    pub fn decrypt_latency(&self) -> LatencyWindow {
        self.decrypt_latency
    }
}

/// Extracts the socket path from a `unix://` listen address.
///
/// # Errors
///
/// Fails on an empty address, any scheme other than `unix`, a missing path,
/// or a linux abstract-namespace name (`unix:///@name`).
pub fn parse_endpoint(endpoint: &str) -> Result<PathBuf, ConfigError> {
    if endpoint.is_empty() {
        return Err(ConfigError::EmptyEndpoint);
    }

    let path = match endpoint.split_once("://") {
        Some((scheme, path)) if scheme.eq_ignore_ascii_case(UNIX_SCHEME) => path,
        Some((scheme, _)) => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
        None => return Err(ConfigError::UnsupportedScheme(String::new())),
    };

    if path.is_empty() || path == "/" {
        return Err(ConfigError::MissingPath(endpoint.to_string()));
    }
    if path.starts_with('@') || path.starts_with("/@") {
        return Err(ConfigError::AbstractSocket(endpoint.to_string()));
    }

    Ok(PathBuf::from(path))
}

/// Parses a Go-style duration string.
///
/// A duration is a sequence of decimal numbers, each with an optional
/// fraction and a unit suffix: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
/// The bare string `0` and a single leading `+` are also accepted. Negative
/// durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(unit_nanos).ok_or_else(invalid)?;

        let mut scale = unit_nanos;
        for digit in fraction.bytes() {
            scale /= 10;
            nanos = nanos
                .checked_add(u128::from(digit - b'0') * scale)
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid())?;
    // Always below one billion.
    let subsec = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}
