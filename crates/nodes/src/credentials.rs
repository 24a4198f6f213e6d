//! Resolved credentials handed to handlers for one run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Access tokens keyed by service name (`gmail`, `notion`, ...).
///
/// Tokens arrive already resolved; refreshing them is the caller's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: impl Into<String>, token: impl Into<String>) -> Self {
        self.insert(service, token);
        self
    }

    pub fn insert(&mut self, service: impl Into<String>, token: impl Into<String>) {
        self.0.insert(service.into(), token.into());
    }

    /// Token for `service`; empty strings count as absent.
    pub fn token(&self, service: &str) -> Option<&str> {
        self.0
            .get(service)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
