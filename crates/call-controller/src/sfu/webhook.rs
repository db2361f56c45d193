//! Inbound SFU webhook authentication.
//!
//! Each callback carries `Authorization: Bearer <jwt>`, HS256-signed under
//! the shared SFU API secret. The token's `sha256` claim is the digest of
//! the raw request body, encoded as either hex or base64 depending on the
//! SFU build. Verification recomputes the digest and requires equality;
//! any mismatch rejects the request before it can touch state.

use crate::errors::CallError;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use ring::digest;
use serde::Deserialize;

/// Upper bound on bearer token size; larger tokens are rejected unparsed.
const MAX_TOKEN_SIZE_BYTES: usize = 8192;

#[derive(Debug, Deserialize)]
struct SfuTokenClaims {
    sha256: String,
}

/// Verifies signed SFU callbacks.
#[derive(Clone)]
pub struct WebhookVerifier {
    api_secret: SecretString,
}

impl WebhookVerifier {
    #[must_use]
    pub fn new(api_secret: SecretString) -> Self {
        Self { api_secret }
    }

    /// Verify `Authorization` against the raw request body.
    ///
    /// # Errors
    ///
    /// [`CallError::SignatureInvalid`] on any verification failure;
    /// [`CallError::Misconfigured`] when no SFU secret is configured.
    pub fn verify(&self, auth_header: Option<&str>, body: &[u8]) -> Result<(), CallError> {
        if self.api_secret.expose_secret().is_empty() {
            return Err(CallError::Misconfigured(
                "SFU API secret is not configured".to_string(),
            ));
        }

        let header = auth_header.ok_or_else(|| {
            CallError::SignatureInvalid("missing Authorization header".to_string())
        })?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        if token.is_empty() {
            return Err(CallError::SignatureInvalid("empty bearer token".to_string()));
        }
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(CallError::SignatureInvalid("bearer token too large".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<SfuTokenClaims>(
            token,
            &DecodingKey::from_secret(self.api_secret.expose_secret().as_bytes()),
            &validation,
        )
        .map_err(|e| CallError::SignatureInvalid(format!("token verification failed: {e}")))?;

        let body_digest = digest::digest(&digest::SHA256, body);

        if !digest_claim_matches(&data.claims.sha256, body_digest.as_ref()) {
            return Err(CallError::SignatureInvalid(
                "body digest does not match sha256 claim".to_string(),
            ));
        }

        Ok(())
    }
}

/// Compare the `sha256` claim against the computed digest, accepting the
/// hex and base64 encodings SFU deployments are known to send.
fn digest_claim_matches(claim: &str, computed: &[u8]) -> bool {
    let computed_hex = hex::encode(computed);
    if claim.eq_ignore_ascii_case(&computed_hex) {
        return true;
    }

    let decoded = STANDARD
        .decode(claim)
        .or_else(|_| STANDARD_NO_PAD.decode(claim));
    match decoded {
        Ok(bytes) => bytes == computed,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "sfu-shared-secret";

    #[derive(Serialize)]
    struct TestClaims {
        sha256: String,
        exp: i64,
    }

    fn sign_token(sha256: String, secret: &str) -> String {
        let claims = TestClaims {
            sha256,
            exp: chrono::Utc::now().timestamp() + 300,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("sign")
    }

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from(SECRET))
    }

    fn body_digest(body: &[u8]) -> Vec<u8> {
        digest::digest(&digest::SHA256, body).as_ref().to_vec()
    }

    #[test]
    fn test_verify_accepts_hex_digest() {
        let body = br#"{"event":"room_started","id":"EV_1"}"#;
        let token = sign_token(hex::encode(body_digest(body)), SECRET);

        let result = verifier().verify(Some(&format!("Bearer {token}")), body);
        assert!(result.is_ok());
    }

    #[test]
    fn test_verify_accepts_base64_digest() {
        let body = br#"{"event":"room_finished","id":"EV_2"}"#;
        let token = sign_token(STANDARD.encode(body_digest(body)), SECRET);

        let result = verifier().verify(Some(&format!("Bearer {token}")), body);
        assert!(result.is_ok());
    }

    #[test]
    fn test_verify_accepts_token_without_bearer_prefix() {
        let body = b"payload";
        let token = sign_token(hex::encode(body_digest(body)), SECRET);

        assert!(verifier().verify(Some(&token), body).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let body = br#"{"event":"room_started","id":"EV_1"}"#;
        let token = sign_token(hex::encode(body_digest(body)), SECRET);

        let tampered = br#"{"event":"room_started","id":"EV_other"}"#;
        let result = verifier().verify(Some(&format!("Bearer {token}")), tampered);
        assert!(matches!(result, Err(CallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let body = b"payload";
        let token = sign_token(hex::encode(body_digest(body)), "other-secret");

        let result = verifier().verify(Some(&format!("Bearer {token}")), body);
        assert!(matches!(result, Err(CallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_verify_rejects_missing_header() {
        let result = verifier().verify(None, b"payload");
        assert!(matches!(result, Err(CallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_verify_rejects_garbage_token() {
        let result = verifier().verify(Some("Bearer not.a.jwt"), b"payload");
        assert!(matches!(result, Err(CallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_verify_rejects_oversized_token() {
        let huge = format!("Bearer {}", "a".repeat(MAX_TOKEN_SIZE_BYTES + 1));
        let result = verifier().verify(Some(&huge), b"payload");
        assert!(matches!(result, Err(CallError::SignatureInvalid(_))));
    }

    #[test]
    fn test_verify_without_secret_is_misconfigured() {
        let verifier = WebhookVerifier::new(SecretString::from(""));
        let result = verifier.verify(Some("Bearer x"), b"payload");
        assert!(matches!(result, Err(CallError::Misconfigured(_))));
    }

    #[test]
    fn test_digest_claim_matches_is_case_insensitive_for_hex() {
        let computed = body_digest(b"abc");
        let upper = hex::encode(&computed).to_uppercase();
        assert!(digest_claim_matches(&upper, &computed));
    }
}
