//! Host identity for per-host connection limits.

use std::collections::HashMap;
use std::sync::Arc;

use super::budget::ConnectionBudget;

/// `(scheme, host, port)` of a URL; different paths on one origin share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    /// Host key of `url`, or None when it has no host or known port.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        Some(Self {
            scheme: parsed.scheme().to_string(),
            host: parsed.host_str()?.to_ascii_lowercase(),
            port: parsed.port_or_known_default()?,
        })
    }
}

/// One budget per host, created on first use.
#[derive(Debug)]
pub struct HostBudgets {
    per_host: usize,
    budgets: HashMap<Option<HostKey>, Arc<ConnectionBudget>>,
}

impl HostBudgets {
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host,
            budgets: HashMap::new(),
        }
    }

    /// Budget for the host of `url`. Unparsable URLs share one budget.
    pub fn for_url(&mut self, url: &str) -> Arc<ConnectionBudget> {
        let per_host = self.per_host;
        Arc::clone(
            self.budgets
                .entry(HostKey::from_url(url))
                .or_insert_with(|| ConnectionBudget::new(per_host)),
        )
    }
}
