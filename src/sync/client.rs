//! Domain API client contract.
//!
//! The engine never talks to the backend itself: each dashboard domain has an
//! injected [`DomainApi`] and the [`DomainRouter`] picks the method from the
//! change's operation kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::change::{OperationKind, PendingChange, TargetDomain};

/// Outcome class of a failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Worth retrying: network failure, timeout, 5xx, throttling.
    #[error("{0}")]
    Transient(String),
    /// Retrying cannot help: validation failure, unknown record, no route.
    #[error("{0}")]
    Permanent(String),
}

impl ApplyError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The underlying message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Remote API of one dashboard domain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainApi: Send + Sync {
    /// Create the item described by `payload`.
    async fn create(&self, payload: &Value) -> Result<(), ApplyError>;

    /// Update the item identified by `payload["id"]`.
    async fn update(&self, payload: &Value) -> Result<(), ApplyError>;

    /// Delete the item identified by `payload["id"]`.
    async fn delete(&self, payload: &Value) -> Result<(), ApplyError>;
}

/// Maps each target domain to its API client.
#[derive(Clone, Default)]
pub struct DomainRouter {
    clients: HashMap<TargetDomain, Arc<dyn DomainApi>>,
}

impl DomainRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` for `domain`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, domain: TargetDomain, client: Arc<dyn DomainApi>) -> Self {
        self.clients.insert(domain, client);
        self
    }

    /// Register one client for every domain.
    #[must_use]
    pub fn with_all(mut self, client: Arc<dyn DomainApi>) -> Self {
        for domain in TargetDomain::ALL {
            self.clients.insert(domain, Arc::clone(&client));
        }
        self
    }

    /// Whether `domain` has a client.
    #[must_use]
    pub fn handles(&self, domain: TargetDomain) -> bool {
        self.clients.contains_key(&domain)
    }

    /// Apply `change` through its domain's client.
    ///
    /// # Errors
    ///
    /// Returns the client's error, or a permanent error if no client is
    /// registered for the change's domain.
    pub async fn dispatch(&self, change: &PendingChange) -> Result<(), ApplyError> {
        let client = self.clients.get(&change.target_domain).ok_or_else(|| {
            ApplyError::Permanent(format!(
                "no API client registered for {}",
                change.target_domain
            ))
        })?;

        match change.operation_kind {
            OperationKind::Create => client.create(&change.payload).await,
            OperationKind::Update => client.update(&change.payload).await,
            OperationKind::Delete => client.delete(&change.payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::predicate::eq;
    use serde_json::json;

    fn change(kind: OperationKind, domain: TargetDomain, payload: Value) -> PendingChange {
        PendingChange::new(kind, domain, payload, Utc::now())
    }

    #[tokio::test]
    async fn test_dispatch_selects_method_by_kind() {
        let mut api = MockDomainApi::new();
        api.expect_create().times(1).returning(|_| Ok(()));
        api.expect_update()
            .with(eq(json!({"id": "h-1", "done": true})))
            .times(1)
            .returning(|_| Ok(()));
        api.expect_delete()
            .times(1)
            .returning(|_| Err(ApplyError::Permanent("HTTP 404".to_string())));

        let router = DomainRouter::new().with(TargetDomain::Habit, Arc::new(api));

        router
            .dispatch(&change(OperationKind::Create, TargetDomain::Habit, json!({"name": "Run"})))
            .await
            .unwrap();
        router
            .dispatch(&change(
                OperationKind::Update,
                TargetDomain::Habit,
                json!({"id": "h-1", "done": true}),
            ))
            .await
            .unwrap();
        let err = router
            .dispatch(&change(OperationKind::Delete, TargetDomain::Habit, json!({"id": "h-1"})))
            .await
            .unwrap_err();
        assert_eq!(err, ApplyError::Permanent("HTTP 404".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_without_client_is_permanent() {
        let router = DomainRouter::new();
        let err = router
            .dispatch(&change(OperationKind::Create, TargetDomain::Mood, json!({"score": 4})))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(err.message(), "no API client registered for mood");
    }

    #[test]
    fn test_with_all_registers_every_domain() {
        let router = DomainRouter::new().with_all(Arc::new(MockDomainApi::new()));
        for domain in TargetDomain::ALL {
            assert!(router.handles(domain));
        }
    }
}
