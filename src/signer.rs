use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::errors::Error;

type HmacSha256 = Hmac<Sha256>;

/// Request path signed during the WebSocket login handshake. The venue
/// expects the same HMAC scheme as REST but over this fixed literal.
pub const LOGIN_SIGN_PATH: &str = "/users/self/verify";

/// HMAC-SHA256 signer shared between the REST dispatcher and the WebSocket
/// login handshake.
///
/// The prehash string is `timestamp + method + request_path + body` and the
/// signature is the Base64 encoding of the MAC. Timestamps can be offset by a
/// previously measured skew against the server clock so signed requests stay
/// valid when the local clock drifts.
pub struct Signer {
    secret_key: Secret<String>,
    /// Clock offset in milliseconds, interior-mutable so a shared
    /// `Arc<Signer>` can be adjusted after a server-time query.
    offset_ms: AtomicI64,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("offset_ms", &self.offset_ms.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Signer {
    #[must_use]
    pub fn new(secret_key: Secret<String>) -> Self {
        Self {
            secret_key,
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Record a measured skew against the venue's clock. Positive values mean
    /// the server is ahead of us.
    pub fn set_clock_offset(&self, offset: Duration) {
        self.offset_ms
            .store(offset.num_milliseconds(), Ordering::Relaxed);
    }

    pub fn clock_offset(&self) -> Duration {
        Duration::milliseconds(self.offset_ms.load(Ordering::Relaxed))
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset()
    }

    /// ISO-8601 UTC timestamp with millisecond precision, as required for
    /// REST auth headers.
    pub fn iso_timestamp(&self) -> String {
        self.now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    /// Unix-epoch seconds, as required by the WebSocket login frame.
    pub fn epoch_timestamp(&self) -> String {
        self.now().timestamp().to_string()
    }

    /// Sign `timestamp + method + request_path + body` with HMAC-SHA256 and
    /// return the Base64 signature. Pure function of its inputs and the
    /// stored secret.
    pub fn sign(
        &self,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> Result<String, Error> {
        let prehash = format!("{timestamp}{method}{request_path}{body}");

        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|e| Error::Auth(format!("failed to create HMAC: {e}")))?;
        mac.update(prehash.as_bytes());

        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Signature for the WebSocket login frame, fixed over
    /// `GET /users/self/verify` with an empty body.
    pub fn sign_login(&self, timestamp: &str) -> Result<String, Error> {
        self.sign(timestamp, "GET", LOGIN_SIGN_PATH, "")
    }
}
