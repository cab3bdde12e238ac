//! Robot callback signatures.
//!
//! The platform sends `timestamp` (epoch millis) and `sign` headers, where
//! `sign = base64(hmac_sha256(secret, "{timestamp}\n{secret}"))`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Callbacks older or newer than this are rejected.
pub const MAX_CLOCK_SKEW_MS: i64 = 60 * 60 * 1000;

pub fn sign(secret: &str, timestamp: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{timestamp}\n{secret}").as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a callback's `timestamp`/`sign` pair against `secret`.
pub fn verify(secret: &str, timestamp: &str, signature: &str, now_ms: i64) -> bool {
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        tracing::warn!(timestamp, "callback timestamp is not a number");
        return false;
    };
    if now_ms.abs_diff(ts) > MAX_CLOCK_SKEW_MS.unsigned_abs() {
        tracing::warn!(timestamp, now_ms, "callback timestamp outside the allowed window");
        return false;
    }

    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        tracing::warn!("callback signature is not base64");
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}\n{secret}", timestamp.trim()).as_bytes());
    mac.verify_slice(&provided).is_ok()
}
