//! Stripe-style webhook signatures.
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`
//! where each `v1` is `HMAC-SHA256(secret, "<t>.<payload>")`. Several `v1`
//! entries appear while a secret is being rolled.

use chrono::{DateTime, Utc};
use enrollment_core::{GatewayError, GatewayResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> GatewayResult<HmacSha256> {
    if secret.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "webhook secret is not configured".to_string(),
        ));
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(format!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex signature for `payload` signed at `timestamp`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidSignature`] if `secret` is empty.
pub fn compute(secret: &str, timestamp: i64, payload: &[u8]) -> GatewayResult<String> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete `Stripe-Signature` header value.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidSignature`] if `secret` is empty.
pub fn header(secret: &str, timestamp: i64, payload: &[u8]) -> GatewayResult<String> {
    Ok(format!("t={timestamp},v1={}", compute(secret, timestamp, payload)?))
}

/// Verify a `Stripe-Signature` header against `payload`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidSignature`] if the secret is empty, the
/// header is malformed, the timestamp is outside `tolerance` of `now` or no
/// `v1` entry matches.
pub fn verify(
    header: &str,
    payload: &[u8],
    secret: &str,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> GatewayResult<()> {
    if secret.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "webhook secret is not configured".to_string(),
        ));
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "no v1 signature present".to_string(),
        ));
    }

    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    if (now.timestamp() - timestamp).abs() > tolerance {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mac = keyed_mac(secret, timestamp, payload)?;
    let matched = candidates
        .iter()
        .filter_map(|c| hex::decode(c).ok())
        .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());
    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}
