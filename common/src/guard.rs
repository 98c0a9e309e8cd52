use crate::config::AccessConfig;

/// Single-address allow-list.
///
/// Trusts the network: the caller address is whatever the transport reports,
/// and anyone who can reach the device from the allowed address (or spoof it)
/// passes. There is no credential, token, or rate limit behind this check.
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    allowed_caller: Option<String>,
}

impl AccessGuard {
    pub fn new(config: &AccessConfig) -> Self {
        Self {
            allowed_caller: config.allowed_caller.clone(),
        }
    }

    /// Exact string comparison, no CIDR or address normalization. An unknown
    /// caller is refused once an allow-list is configured.
    pub fn is_allowed(&self, caller: Option<&str>) -> bool {
        match (&self.allowed_caller, caller) {
            (None, _) => true,
            (Some(allowed), Some(caller)) => allowed == caller,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guarded(address: &str) -> AccessGuard {
        AccessGuard::new(&AccessConfig {
            allowed_caller: Some(address.to_string()),
        })
    }

    #[test]
    fn open_mode_allows_everyone() {
        let guard = AccessGuard::new(&AccessConfig::default());
        assert!(guard.is_allowed(Some("10.1.2.3")));
        assert!(guard.is_allowed(None));
    }

    #[test]
    fn allow_list_matches_exactly() {
        let guard = guarded("192.168.1.20");
        assert!(guard.is_allowed(Some("192.168.1.20")));
        assert!(!guard.is_allowed(Some("192.168.1.21")));
        assert!(!guard.is_allowed(Some("192.168.1.200")));
        assert!(!guard.is_allowed(Some(" 192.168.1.20")));
    }

    #[test]
    fn missing_caller_is_refused_when_guarded() {
        assert!(!guarded("192.168.1.20").is_allowed(None));
    }

    #[test]
    fn no_normalization_between_address_forms() {
        let guard = guarded("192.168.1.20");
        assert!(!guard.is_allowed(Some("::ffff:192.168.1.20")));
    }
}
