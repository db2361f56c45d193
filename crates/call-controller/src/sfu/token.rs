//! SFU access-token minting.
//!
//! Tokens are HS256 JWTs under the shared SFU API secret, granting join and
//! create on exactly one room. The bearer is identified by `sub` = uid, the
//! device type rides along as opaque JSON metadata, and validity is a fixed
//! one hour.

use crate::errors::CallError;
use chrono::Utc;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed validity of minted access tokens.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Room grant embedded in the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub room_create: bool,
}

/// Claims of a minted access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer: the SFU API key.
    pub iss: String,
    /// Bearer identity: the participant uid.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub video: VideoGrant,
    /// Opaque participant metadata (JSON).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
}

/// A minted credential plus the connection details clients need.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub client_url: String,
    pub ttl_seconds: u64,
}

/// Mints SFU access tokens for (room, identity, device) tuples.
#[derive(Clone)]
pub struct TokenMinter {
    api_key: String,
    api_secret: SecretString,
    client_url: String,
}

impl TokenMinter {
    #[must_use]
    pub fn new(api_key: String, api_secret: SecretString, client_url: String) -> Self {
        Self {
            api_key,
            api_secret,
            client_url,
        }
    }

    /// Mint a token granting join and create on `room_id` for `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Misconfigured`] when the SFU credentials are
    /// absent, [`CallError::Internal`] if signing fails.
    pub fn mint(
        &self,
        room_id: &str,
        uid: &str,
        device_type: &str,
    ) -> Result<MintedToken, CallError> {
        if self.api_key.is_empty() || self.api_secret.expose_secret().is_empty() {
            return Err(CallError::Misconfigured(
                "SFU API credentials are not configured".to_string(),
            ));
        }

        let metadata = if device_type.is_empty() {
            String::new()
        } else {
            serde_json::json!({ "device_type": device_type }).to_string()
        };

        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            iss: self.api_key.clone(),
            sub: uid.to_string(),
            iat: now,
            exp: now + TOKEN_TTL.as_secs() as i64,
            video: VideoGrant {
                room: room_id.to_string(),
                room_join: true,
                room_create: true,
            },
            metadata,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_secret.expose_secret().as_bytes()),
        )
        .map_err(|e| CallError::Internal(format!("failed to sign access token: {e}")))?;

        Ok(MintedToken {
            token,
            client_url: self.client_url.clone(),
            ttl_seconds: TOKEN_TTL.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn minter() -> TokenMinter {
        TokenMinter::new(
            "APIkey".to_string(),
            SecretString::from("test-secret"),
            "wss://sfu.example.com".to_string(),
        )
    }

    fn decode_claims(token: &str) -> AccessClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .expect("token should verify")
        .claims
    }

    #[test]
    fn test_mint_carries_room_grant_and_identity() {
        let minted = minter().mint("r-1", "alice", "ios").expect("mint");
        let claims = decode_claims(&minted.token);

        assert_eq!(claims.iss, "APIkey");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.video.room, "r-1");
        assert!(claims.video.room_join);
        assert!(claims.video.room_create);
        assert_eq!(claims.metadata, r#"{"device_type":"ios"}"#);
    }

    #[test]
    fn test_mint_returns_client_url_and_ttl() {
        let minted = minter().mint("r-1", "alice", "").expect("mint");

        assert_eq!(minted.client_url, "wss://sfu.example.com");
        assert_eq!(minted.ttl_seconds, 3600);
    }

    #[test]
    fn test_mint_validity_window() {
        let minted = minter().mint("r-1", "alice", "").expect("mint");
        let claims = decode_claims(&minted.token);

        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_mint_without_device_type_omits_metadata() {
        let minted = minter().mint("r-1", "alice", "").expect("mint");
        let claims = decode_claims(&minted.token);
        assert!(claims.metadata.is_empty());
    }

    #[test]
    fn test_mint_without_credentials_is_misconfigured() {
        let minter = TokenMinter::new(
            String::new(),
            SecretString::from(""),
            "wss://sfu.example.com".to_string(),
        );

        let result = minter.mint("r-1", "alice", "");
        assert!(matches!(result, Err(CallError::Misconfigured(_))));
    }
}
