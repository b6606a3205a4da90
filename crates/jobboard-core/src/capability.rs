//! Job-scoped capability tokens.
//!
//! A capability authorizes state, log and delete calls on exactly one job
//! id. The token format is `<expiry-unix-seconds>.<hex hmac-sha256>` where
//! the MAC covers the job id and the expiry.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Error, JobId, Result};

/// Mints and verifies capability tokens bound to a single job id.
pub trait CapabilityAuthority: Send + Sync {
    /// Mint a fresh token for `job_id`.
    fn mint(&self, job_id: &JobId) -> Result<String>;

    /// Check that `token` authorizes operations on `job_id`.
    ///
    /// Fails with [`Error::Forbidden`] on any mismatch.
    fn verify(&self, job_id: &JobId, token: &str) -> Result<()>;
}

/// HMAC-SHA256 capability authority with a shared secret.
#[derive(Clone)]
pub struct HmacCapabilityAuthority {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for HmacCapabilityAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacCapabilityAuthority")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl HmacCapabilityAuthority {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    fn mac(&self, job_id: &JobId, expires: i64) -> Result<Hmac<Sha256>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("capability key: {}", e)))?;
        mac.update(job_id.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn mint_at(&self, job_id: &JobId, now: DateTime<Utc>) -> Result<String> {
        let expires = (now + self.ttl).timestamp();
        let tag = self.mac(job_id, expires)?.finalize().into_bytes();
        Ok(format!("{}.{}", expires, hex::encode(tag)))
    }

    pub fn verify_at(&self, job_id: &JobId, token: &str, now: DateTime<Utc>) -> Result<()> {
        let token = strip_bearer(token);
        let (expires, tag) = token
            .split_once('.')
            .ok_or_else(|| Error::Forbidden("malformed capability".to_string()))?;
        let expires: i64 = expires
            .parse()
            .map_err(|_| Error::Forbidden("malformed capability expiry".to_string()))?;
        let tag = hex::decode(tag)
            .map_err(|_| Error::Forbidden("malformed capability signature".to_string()))?;

        self.mac(job_id, expires)?
            .verify_slice(&tag)
            .map_err(|_| Error::Forbidden(format!("capability does not match job {}", job_id)))?;

        if expires < now.timestamp() {
            return Err(Error::Forbidden("capability expired".to_string()));
        }
        Ok(())
    }
}

impl CapabilityAuthority for HmacCapabilityAuthority {
    fn mint(&self, job_id: &JobId) -> Result<String> {
        self.mint_at(job_id, Utc::now())
    }

    fn verify(&self, job_id: &JobId, token: &str) -> Result<()> {
        self.verify_at(job_id, token, Utc::now())
    }
}

/// Strip the "Bearer " prefix from a token if present.
fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    match token.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => token[7..].trim(),
        _ => token,
    }
}
