//! Service error types and their HTTP mapping.
//!
//! Business errors are returned to API callers as HTTP 400 with a stable
//! string code and a message localised to the caller's negotiated language;
//! the localisation happens at the facade (where the language is known) via
//! [`CallError::into_api_error`]. Storage and other unexpected failures map
//! to 500 with a generic body; details stay in the server-side logs.

use crate::i18n::{self, MessageKey};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Call-controller error type.
#[derive(Debug, Error)]
pub enum CallError {
    // Business errors (HTTP 400, localised).
    #[error("room already exists: {0}")]
    RoomAlreadyExists(String),

    #[error("channel already has an active room")]
    ChannelHasActiveRoom,

    #[error("creator is already in a call")]
    CreatorInAnotherCall,

    #[error("participant {0} is already in a call")]
    ParticipantInCall(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room is no longer active")]
    RoomNotActive,

    #[error("room is full")]
    RoomFull,

    #[error("participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("participant is not invited")]
    NotInvited,

    // Infrastructure errors.
    #[error("invalid webhook signature: {0}")]
    SignatureInvalid(String),

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// True for errors a client can act on; these are never retried
    /// internally and surface as HTTP 400.
    #[must_use]
    pub fn is_business(&self) -> bool {
        self.message_key().is_some()
    }

    /// The i18n key for business errors, with the message argument if any.
    #[must_use]
    pub fn message_key(&self) -> Option<(MessageKey, Option<&str>)> {
        match self {
            CallError::RoomAlreadyExists(id) => {
                Some((MessageKey::RoomAlreadyExists, Some(id.as_str())))
            }
            CallError::ChannelHasActiveRoom => {
                Some((MessageKey::ChannelHasActiveRoom, None))
            }
            CallError::CreatorInAnotherCall => {
                Some((MessageKey::CreatorInAnotherCall, None))
            }
            CallError::ParticipantInCall(uid) => {
                Some((MessageKey::ParticipantInCall, Some(uid.as_str())))
            }
            CallError::RoomNotFound(id) => Some((MessageKey::RoomNotFound, Some(id.as_str()))),
            CallError::RoomNotActive => Some((MessageKey::RoomNotActive, None)),
            CallError::RoomFull => Some((MessageKey::RoomFull, None)),
            CallError::ParticipantNotFound(uid) => {
                Some((MessageKey::ParticipantNotFound, Some(uid.as_str())))
            }
            CallError::NotInvited => Some((MessageKey::ParticipantNotInvited, None)),
            _ => None,
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            CallError::SignatureInvalid(_) => 401,
            CallError::Misconfigured(_) | CallError::Database(_) | CallError::Internal(_) => {
                500
            }
            _ => 400,
        }
    }

    /// Resolve this error into a response body for the given language.
    #[must_use]
    pub fn into_api_error(self, lang: &str) -> ApiError {
        if let Some((key, arg)) = self.message_key() {
            return ApiError {
                status: StatusCode::BAD_REQUEST,
                code: key.as_str().to_string(),
                message: i18n::translate(lang, key, arg),
            };
        }

        match self {
            CallError::SignatureInvalid(reason) => {
                tracing::warn!(target: "cc.api", reason = %reason, "Webhook signature rejected");
                ApiError {
                    status: StatusCode::UNAUTHORIZED,
                    code: "signature_invalid".to_string(),
                    message: "signature verification failed".to_string(),
                }
            }
            other => {
                tracing::error!(target: "cc.api", error = %other, "Request failed");
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: MessageKey::InternalError.as_str().to_string(),
                    message: i18n::translate(lang, MessageKey::InternalError, None),
                }
            }
        }
    }
}

impl From<sqlx::Error> for CallError {
    fn from(err: sqlx::Error) -> Self {
        CallError::Database(err.to_string())
    }
}

/// A fully resolved error response: status plus `{code, message}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// The localised "invalid parameters" response for body/query rejects.
    #[must_use]
    pub fn invalid_parameters(lang: &str) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            code: MessageKey::InvalidParameters.as_str().to_string(),
            message: i18n::translate(lang, MessageKey::InvalidParameters, None),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_business_errors_map_to_400() {
        assert_eq!(CallError::RoomNotActive.status_code(), 400);
        assert_eq!(CallError::RoomFull.status_code(), 400);
        assert_eq!(CallError::NotInvited.status_code(), 400);
        assert_eq!(CallError::RoomAlreadyExists("r".into()).status_code(), 400);
        assert_eq!(CallError::ChannelHasActiveRoom.status_code(), 400);
        assert_eq!(CallError::CreatorInAnotherCall.status_code(), 400);
        assert_eq!(CallError::ParticipantInCall("u".into()).status_code(), 400);
    }

    #[test]
    fn test_signature_invalid_maps_to_401() {
        assert_eq!(
            CallError::SignatureInvalid("bad digest".into()).status_code(),
            401
        );
    }

    #[test]
    fn test_infrastructure_errors_map_to_500() {
        assert_eq!(CallError::Database("down".into()).status_code(), 500);
        assert_eq!(CallError::Internal("boom".into()).status_code(), 500);
        assert_eq!(CallError::Misconfigured("no key".into()).status_code(), 500);
    }

    #[test]
    fn test_is_business() {
        assert!(CallError::RoomFull.is_business());
        assert!(!CallError::Database("x".into()).is_business());
        assert!(!CallError::SignatureInvalid("x".into()).is_business());
    }

    #[tokio::test]
    async fn test_business_error_body_is_localised() {
        let err = CallError::RoomNotFound("r-9".into()).into_api_error("en-US");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let response = err.into_response();
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["code"], "room_not_found");
        assert_eq!(body["message"], "Room not found: r-9");
    }

    #[tokio::test]
    async fn test_business_error_body_in_chinese() {
        let err = CallError::RoomNotActive.into_api_error("zh-CN");
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["code"], "room_not_active");
        assert_eq!(body["message"], "房间已结束或已取消，无法加入");
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let err =
            CallError::Database("connection refused to db-internal:5432".into())
                .into_api_error("en-US");
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["code"], "internal_error");
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_invalid_parameters_body() {
        let response = ApiError::invalid_parameters("ja-JP").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["code"], "invalid_parameters");
        assert_eq!(body["message"], "無効なパラメータ");
    }
}
