//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. `SecretString` implements `Debug`
//! with redaction, so any struct that derives `Debug` while holding one gets
//! safe logging behaviour for free, and the value is zeroized on drop.
//!
//! Use `SecretString` for SFU API secrets, endpoint signing keys, and
//! database credentials. Access the inner value only at the point of use via
//! [`ExposeSecret::expose_secret`].

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("sfu-api-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("sfu-api-secret"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("endpoint-key");
        assert_eq!(secret.expose_secret(), "endpoint-key");
    }

    #[test]
    fn test_deserialize_from_json() {
        #[derive(Debug, Deserialize)]
        struct Endpoint {
            url: String,
            secret: SecretString,
        }

        let json = r#"{"url": "https://example.com/hook", "secret": "s3cret"}"#;
        let endpoint: Endpoint = serde_json::from_str(json).expect("deserialize");

        assert_eq!(endpoint.url, "https://example.com/hook");
        assert_eq!(endpoint.secret.expose_secret(), "s3cret");

        let debug = format!("{endpoint:?}");
        assert!(!debug.contains("s3cret"));
    }
}
