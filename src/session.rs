//! Session-scoped caller identity and the remote service built for it.

use crate::error::JobError;
use crate::remote::RemoteJobService;
use std::fmt;
use std::sync::Arc;

/// Opaque credential obtained from the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Returns `None` for blank tokens.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallerIdentity(<redacted>)")
    }
}

#[derive(Clone, Default)]
pub struct Session {
    service: Option<Arc<dyn RemoteJobService>>,
}

impl Session {
    /// No identity is available; every remote operation reports `NotReady`.
    pub fn anonymous() -> Self {
        Self { service: None }
    }

    pub fn connected(service: Arc<dyn RemoteJobService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    pub fn service(&self) -> Result<Arc<dyn RemoteJobService>, JobError> {
        self.service
            .clone()
            .ok_or_else(|| JobError::NotReady("no authenticated session".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_some()
    }
}
