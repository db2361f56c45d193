//! Request-language extraction.
//!
//! Selection order: `X-Language` header, `lang` query parameter,
//! `Accept-Language` header; the configured default applies when none is
//! present or the requested language is unsupported.

use crate::i18n;
use crate::routes::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;

/// The caller's negotiated language.
#[derive(Debug, Clone)]
pub struct Language(pub String);

impl FromRequestParts<Arc<AppState>> for Language {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let requested = parts
            .headers
            .get("x-language")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .or_else(|| query_param(parts.uri.query(), "lang"))
            .or_else(|| {
                parts
                    .headers
                    .get("accept-language")
                    .and_then(|v| v.to_str().ok())
            })
            .unwrap_or("");

        let lang = i18n::negotiate(requested, &state.config.default_language);
        Ok(Language(lang.to_string()))
    }
}

fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}
