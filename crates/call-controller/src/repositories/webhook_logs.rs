//! Failure log for outbound business events.
//!
//! Only failed deliveries are recorded; a 2xx response leaves no row.
//! Retries are explicit: a caller that re-sends does so with an incremented
//! retry counter, producing a fresh row on a fresh failure.

use sqlx::PgExecutor;

/// One failed delivery attempt.
#[derive(Debug, Clone)]
pub struct WebhookFailure<'a> {
    pub event_type: &'a str,
    pub event_id: &'a str,
    pub url: &'a str,
    /// HTTP status of the response, 0 for transport errors.
    pub status: i32,
    pub request: &'a str,
    pub response: &'a str,
    pub error: &'a str,
    pub retry: i32,
}

/// Business webhook log repository.
pub struct WebhookLogsRepository;

impl WebhookLogsRepository {
    /// Record a failed delivery.
    pub async fn insert<'e, E>(ex: E, failure: &WebhookFailure<'_>) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO business_webhook_log (
                event_type, event_id, url, status, request, response, error, retry
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(failure.event_type)
        .bind(failure.event_id)
        .bind(failure.url)
        .bind(failure.status)
        .bind(failure.request)
        .bind(failure.response)
        .bind(failure.error)
        .bind(failure.retry)
        .execute(ex)
        .await?;
        Ok(())
    }
}
