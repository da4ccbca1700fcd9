//! `Paddle-Signature` verification.
//!
//! Header format: `ts=<unix seconds>;h1=<hex hmac>[;h1=<hex hmac>...]`. The
//! signed content is `"{ts}:{raw body}"`, keyed with the notification
//! destination's secret. Several `h1` values appear while a secret is being
//! rotated; any one matching is enough.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Option<ParsedHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(';') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "ts" => timestamp = Some(value.parse::<i64>().ok()?),
            "h1" => signatures.push(value),
            _ => {}
        }
    }

    if signatures.is_empty() {
        return None;
    }
    Some(ParsedHeader {
        timestamp: timestamp?,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, raw_body: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b":");
    mac.update(raw_body.as_bytes());
    Some(mac)
}

/// True when `header` carries a valid signature of `raw_body`.
///
/// `max_age_secs == 0` disables the timestamp window. Never panics on
/// malformed input.
pub fn verify(
    raw_body: &str,
    header: &str,
    secret: &str,
    now: DateTime<Utc>,
    max_age_secs: u64,
) -> bool {
    let Some(parsed) = parse_header(header) else {
        return false;
    };

    if max_age_secs > 0 {
        let age = now.timestamp().saturating_sub(parsed.timestamp);
        if age.unsigned_abs() > max_age_secs {
            tracing::warn!(age_secs = age, "Paddle signature timestamp outside window");
            return false;
        }
    }

    let Some(mac) = mac_for(secret, parsed.timestamp, raw_body) else {
        return false;
    };

    parsed.signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    })
}

/// Build a header the way Paddle does. Used by tests and local tooling.
pub fn sign(raw_body: &str, secret: &str, timestamp: i64) -> String {
    let signature = mac_for(secret, timestamp, raw_body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("ts={};h1={}", timestamp, signature)
}
