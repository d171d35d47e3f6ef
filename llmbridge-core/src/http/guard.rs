//! Local-only network guard

use crate::providers::error::{ProviderError, ProviderResult};
use url::{Host, Url};

/// Refuses requests to anything but the loopback interface when enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkGuard {
    local_only: bool,
}

impl NetworkGuard {
    /// Create a guard; a disabled guard lets every URL through
    pub fn new(local_only: bool) -> Self {
        Self { local_only }
    }

    /// Whether the guard is enforcing loopback-only targets
    pub fn is_enforcing(&self) -> bool {
        self.local_only
    }

    /// Check a target URL before any I/O is attempted
    pub fn ensure_local(&self, target: &str) -> ProviderResult<()> {
        if !self.local_only {
            return Ok(());
        }

        let url = Url::parse(target)
            .map_err(|e| ProviderError::InvalidConfig(format!("invalid URL '{}': {}", target, e)))?;

        let allowed = match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(addr)) => addr.is_loopback(),
            Some(Host::Ipv6(addr)) => addr.is_loopback(),
            None => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(ProviderError::NetworkBlocked(target.to_string()))
        }
    }
}
