//! Signature check for payment provider callbacks.
use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

/// Hex HMAC-SHA512 of `payload` under `secret`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = match sign_payload(payload, secret) {
        Ok(expected) => expected,
        Err(_) => return false,
    };
    let signature = signature.trim().to_ascii_lowercase();

    // Compare in constant time
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_signature() {
        let body = br#"{"bidId":"b1","reference":"pay_1"}"#;
        let signature = sign_payload(body, "whsec").unwrap();
        assert_eq!(signature.len(), 128);
        assert!(verify_signature(body, &signature, "whsec"));
        assert!(verify_signature(body, &signature.to_uppercase(), "whsec"));
    }

    #[test]
    fn rejects_tampered_body_or_secret() {
        let body = br#"{"bidId":"b1","reference":"pay_1"}"#;
        let signature = sign_payload(body, "whsec").unwrap();
        assert!(!verify_signature(br#"{"bidId":"b2","reference":"pay_1"}"#, &signature, "whsec"));
        assert!(!verify_signature(body, &signature, "other"));
        assert!(!verify_signature(body, "", "whsec"));
    }
}
