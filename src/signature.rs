//! GitHub webhook signature verification (`X-Hub-Signature`, HMAC-SHA1)

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_PREFIX: &str = "sha1=";
/// `sha1=` followed by the hex encoding of a 20 byte digest
const SIGNATURE_LENGTH: usize = 45;

/// Verify a GitHub `X-Hub-Signature` header against the raw request body.
///
/// Headers that are not exactly `sha1=` plus 40 lowercase hex digits are
/// rejected before any MAC is computed. Digests are compared in constant time.
pub fn verify_signature(secret: &[u8], signature_header: &str, payload: &[u8]) -> bool {
    if signature_header.len() != SIGNATURE_LENGTH || !signature_header.starts_with(SIGNATURE_PREFIX)
    {
        debug!("Malformed signature header ({} bytes)", signature_header.len());
        return false;
    }

    let hex_digest = &signature_header[SIGNATURE_PREFIX.len()..];
    if !hex_digest
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        debug!("Signature header is not lowercase hex");
        return false;
    }

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    match hmac_digest(secret, payload) {
        Some(computed) => computed.as_slice().ct_eq(expected.as_slice()).into(),
        None => false,
    }
}

fn hmac_digest(secret: &[u8], payload: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha1::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Produce the `X-Hub-Signature` header value GitHub would send for `payload`.
pub fn sign_body(secret: &[u8], payload: &[u8]) -> String {
    hmac_digest(secret, payload)
        .map(|digest| format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest)))
        .unwrap_or_default()
}
