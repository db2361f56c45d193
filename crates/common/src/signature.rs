//! HMAC-SHA256 payload signing for outbound business events.
//!
//! Every business-event POST carries an `X-Signature` header: the lowercase
//! hex HMAC-SHA256 of the raw request body under the receiving endpoint's
//! secret. Receivers recompute the tag over the bytes they received and
//! compare. [`verify`] uses ring's constant-time comparison.

use ring::hmac;

/// Sign a payload with HMAC-SHA256 and return the lowercase hex tag.
#[must_use]
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, payload);
    hex::encode(tag.as_ref())
}

/// Verify a lowercase hex HMAC-SHA256 tag against a payload.
///
/// Returns `false` for malformed hex as well as for a mismatched tag.
#[must_use]
pub fn verify(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, payload, &provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_lowercase_hex() {
        let tag = sign(b"secret", b"payload");

        // SHA-256 tag is 32 bytes, 64 hex chars
        assert_eq!(tag.len(), 64);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tag, tag.to_lowercase());
    }

    #[test]
    fn test_sign_is_deterministic() {
        assert_eq!(sign(b"k", b"body"), sign(b"k", b"body"));
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let tag = sign(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            tag,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_round_trip() {
        let tag = sign(b"secret", b"payload");
        assert!(verify(b"secret", b"payload", &tag));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let tag = sign(b"secret", b"payload");
        assert!(!verify(b"secret", b"payload2", &tag));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let tag = sign(b"secret", b"payload");
        assert!(!verify(b"other", b"payload", &tag));
    }

    #[test]
    fn test_verify_rejects_malformed_hex() {
        assert!(!verify(b"secret", b"payload", "not-hex!"));
        assert!(!verify(b"secret", b"payload", ""));
    }
}
