use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Value for the signature header, `sha256=<hex>`.
pub fn signature_header(secret: &str, body: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, compute_signature(secret, body))
}

/// Receiver-side check of a signature header against the raw body.
pub fn verify_signature_header(header: &str, secret: &str, body: &[u8]) -> bool {
    let Some(provided) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let expected = compute_signature(secret, body);
    provided
        .to_ascii_lowercase()
        .as_bytes()
        .ct_eq(expected.as_bytes())
        .into()
}
