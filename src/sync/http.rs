//! REST implementation of the domain API contract.
//!
//! - create: `POST {base}/{resource}`
//! - update: `PUT {base}/{resource}/{id}`
//! - delete: `DELETE {base}/{resource}/{id}`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;

use super::change::TargetDomain;
use super::client::{ApplyError, DomainApi, DomainRouter};
use crate::error::DaybookError;

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 200;

/// REST collection path of a domain.
#[must_use]
pub const fn resource(domain: TargetDomain) -> &'static str {
    match domain {
        TargetDomain::Task => "tasks",
        TargetDomain::Habit => "habits",
        TargetDomain::Mood => "moods",
        TargetDomain::Journal => "journal",
        TargetDomain::CalendarEvent => "calendar-events",
    }
}

/// HTTP client for one domain's REST collection.
pub struct HttpDomainApi {
    http: reqwest::Client,
    collection_url: String,
}

impl HttpDomainApi {
    /// Client for `domain` under `base_url`, sharing `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, domain: TargetDomain) -> Self {
        Self {
            http,
            collection_url: format!("{}/{}", base_url.trim_end_matches('/'), resource(domain)),
        }
    }

    /// Router with an HTTP client registered for every domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn router(base_url: &str, timeout: Duration) -> Result<DomainRouter, DaybookError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(TargetDomain::ALL
            .into_iter()
            .fold(DomainRouter::new(), |router, domain| {
                router.with(domain, Arc::new(Self::new(http.clone(), base_url, domain)))
            }))
    }

    /// Item URL with `id` escaped as a single path segment.
    fn item_url(&self, payload: &Value, action: &str) -> Result<Url, ApplyError> {
        let id = match payload.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ApplyError::Permanent(format!(
                    "{action} payload has no id"
                )))
            }
        };
        let mut url = Url::parse(&self.collection_url)
            .map_err(|e| ApplyError::Permanent(format!("invalid API URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ApplyError::Permanent("API URL cannot have a path".to_string()))?
            .push(&id);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(), ApplyError> {
        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl DomainApi for HttpDomainApi {
    async fn create(&self, payload: &Value) -> Result<(), ApplyError> {
        self.send(self.http.post(&self.collection_url).json(payload)).await
    }

    async fn update(&self, payload: &Value) -> Result<(), ApplyError> {
        let url = self.item_url(payload, "update")?;
        self.send(self.http.put(url).json(payload)).await
    }

    async fn delete(&self, payload: &Value) -> Result<(), ApplyError> {
        let url = self.item_url(payload, "delete")?;
        self.send(self.http.delete(url)).await
    }
}

fn classify_transport(e: &reqwest::Error) -> ApplyError {
    if e.is_builder() {
        ApplyError::Permanent(format!("invalid request: {e}"))
    } else {
        ApplyError::Transient(format!("request failed: {e}"))
    }
}

/// 408, 429 and 5xx are retryable; every other non-success status is not.
fn classify_status(status: StatusCode, body: &str) -> ApplyError {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("HTTP {status}: {snippet}")
    };

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        ApplyError::Transient(message)
    } else {
        ApplyError::Permanent(message)
    }
}
